// Cross-context port: the background context runs the router on its own task
// and other contexts talk to it only through channels.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::RouterError;
use crate::message::{Envelope, Message, Reply};
use crate::router::Router;

struct PortRequest {
    envelope: Envelope,
    reply: oneshot::Sender<Reply>,
}

/// Handle held by a calling context.
#[derive(Clone)]
pub struct PortClient {
    tx: mpsc::Sender<PortRequest>,
}

impl PortClient {
    /// Send an envelope and wait for its reply.
    pub async fn request(&self, envelope: Envelope) -> Result<Reply, RouterError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PortRequest {
                envelope,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RouterError::Disconnected)?;
        reply_rx.await.map_err(|_| RouterError::Disconnected)
    }

    pub async fn send<M: Message>(&self, msg: M) -> Result<M::Response, RouterError> {
        let envelope = Envelope::from_message(&msg)?;
        self.request(envelope).await?.into_response::<M>()
    }
}

/// Start the background loop serving `router`.
///
/// Envelopes are dispatched one at a time in arrival order; the loop ends
/// when every [`PortClient`] has been dropped.
pub fn spawn_port(router: Arc<Router>, capacity: usize) -> (PortClient, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<PortRequest>(capacity);

    let handle = tokio::spawn(async move {
        tracing::info!("Background port listening");
        while let Some(PortRequest { envelope, reply }) = rx.recv().await {
            let result = router.dispatch(envelope).await;
            if reply.send(Reply::from(result)).is_err() {
                tracing::warn!("Caller went away before its reply was delivered");
            }
        }
        tracing::info!("Background port closed");
    });

    (PortClient { tx }, handle)
}
