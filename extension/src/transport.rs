// Browser native-messaging framing: every message is a 4-byte little-endian
// length followed by that many bytes of UTF-8 JSON.

use extension_router::{Envelope, PortClient, Reply};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame either side may send.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("frame of {0} bytes exceeds the 1 MiB limit")]
    FrameTooLarge(usize),

    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read one frame. `Ok(None)` on a clean end of stream.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, TransportError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(body.len()));
    }

    writer.write_all(&(body.len() as u32).to_le_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Serve envelopes from `reader` until it closes, writing one reply per
/// envelope to `writer`.
///
/// A frame that is not a valid envelope gets an `invalid-envelope` reply and
/// the loop continues; an oversized or truncated frame ends the session.
pub async fn serve<R, W>(port: &PortClient, reader: &mut R, writer: &mut W) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let frame: Option<serde_json::Value> = read_frame(reader).await?;
        let Some(frame) = frame else {
            tracing::info!("Native messaging stream closed");
            return Ok(());
        };

        let reply = match serde_json::from_value::<Envelope>(frame) {
            Ok(envelope) => {
                tracing::debug!("Received {}/{}", envelope.route, envelope.kind);
                port.request(envelope)
                    .await
                    .unwrap_or_else(|e| Reply::failure(e.code(), e.to_string()))
            }
            Err(e) => {
                tracing::warn!("Rejected malformed envelope: {}", e);
                Reply::failure("invalid-envelope", e.to_string())
            }
        };

        write_frame(writer, &reply).await?;
    }
}

/// [`serve`] over the process's stdin and stdout.
pub async fn serve_stdio(port: &PortClient) -> Result<(), TransportError> {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    serve(port, &mut stdin, &mut stdout).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use extension_router::{spawn_port, HandlerError, HandlerMap, Message, Router};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    impl Message for Ping {
        const KIND: &'static str = "ping";
        const ROUTE: &'static str = "test";
        type Response = u32;
    }

    fn port() -> PortClient {
        let mut router = Router::new();
        router.register_message::<Ping>().unwrap();
        router
            .add_handler(
                "test",
                HandlerMap::new().on(|p: Ping| async move { Ok::<_, HandlerError>(p.n + 1) }),
            )
            .unwrap();
        spawn_port(Arc::new(router), 4).0
    }

    #[tokio::test]
    async fn test_frame_layout() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &json!({ "a": 1 })).await.unwrap();
        assert_eq!(&buf[..4], &7u32.to_le_bytes());
        assert_eq!(&buf[4..], br#"{"a":1}"#);

        let mut reader = &buf[..];
        let value: Option<serde_json::Value> = read_frame(&mut reader).await.unwrap();
        assert_eq!(value, Some(json!({ "a": 1 })));
        let end: Option<serde_json::Value> = read_frame(&mut reader).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_oversize_frame_is_rejected() {
        let mut buf = ((MAX_FRAME_LEN + 1) as u32).to_le_bytes().to_vec();
        buf.extend_from_slice(b"{}");
        let mut reader = &buf[..];
        let err = read_frame::<_, serde_json::Value>(&mut reader)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn test_serve_replies_per_envelope() {
        let mut input = Vec::new();
        write_frame(&mut input, &json!({ "route": "test", "kind": "ping", "payload": { "n": 41 } }))
            .await
            .unwrap();
        write_frame(&mut input, &json!({ "nonsense": true })).await.unwrap();
        write_frame(&mut input, &json!({ "route": "test", "kind": "pong", "payload": {} }))
            .await
            .unwrap();

        let port = port();
        let mut reader = &input[..];
        let mut output = Vec::new();
        serve(&port, &mut reader, &mut output).await.unwrap();

        let mut replies = &output[..];
        let first: Reply = read_frame(&mut replies).await.unwrap().unwrap();
        assert_eq!(first, Reply::success(json!(42)));
        let second: Reply = read_frame(&mut replies).await.unwrap().unwrap();
        assert_eq!(second.error.unwrap().code, "invalid-envelope");
        let third: Reply = read_frame(&mut replies).await.unwrap().unwrap();
        assert_eq!(third.error.unwrap().code, "unregistered-message-kind");
    }
}
