use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("failed to reach node: {0}")]
    Transport(String),

    #[error("node returned an error: {0}")]
    Node(String),

    #[error("transaction rejected with code {code}: {log}")]
    Rejected { code: u32, log: String },
}

/// Result of a broadcast, as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub hash: String,
    pub code: u32,
    #[serde(default)]
    pub log: String,
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, tx: &[u8]) -> Result<TxReceipt, RpcError>;
}

/// Uppercase hex SHA-256 of the raw transaction, as the node reports it.
pub fn tx_hash(tx: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(tx))
}

/// JSON-RPC client for a Tendermint-style node.
pub struct RpcClient {
    url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: BroadcastParams<'a>,
}

#[derive(Serialize)]
struct BroadcastParams<'a> {
    tx: &'a str,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<BroadcastResult>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct BroadcastResult {
    code: u32,
    hash: String,
    #[serde(default)]
    log: String,
}

#[derive(Deserialize)]
struct JsonRpcError {
    message: String,
    #[serde(default)]
    data: Option<String>,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Broadcaster for RpcClient {
    async fn broadcast(&self, tx: &[u8]) -> Result<TxReceipt, RpcError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(tx);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "broadcast_tx_sync",
            params: BroadcastParams { tx: &encoded },
        };

        tracing::debug!("Broadcasting {} bytes to {}", tx.len(), self.url);
        let response: JsonRpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if let Some(error) = response.error {
            let detail = match error.data {
                Some(data) => format!("{} ({})", error.message, data),
                None => error.message,
            };
            return Err(RpcError::Node(detail));
        }
        let result = response
            .result
            .ok_or_else(|| RpcError::Node("response carried neither result nor error".into()))?;

        if result.code != 0 {
            return Err(RpcError::Rejected {
                code: result.code,
                log: result.log,
            });
        }

        tracing::info!("Transaction {} accepted", result.hash);
        Ok(TxReceipt {
            hash: result.hash,
            code: result.code,
            log: result.log,
        })
    }
}
