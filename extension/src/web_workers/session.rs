use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::types::{SubmitTransferMessageData, WorkerSignal};
use crate::sdk::Sdk;
use crate::storage::PrefixedStore;

/// Key of the persisted SDK state inside the `sdk` prefix.
pub const SDK_STORE_KEY: &str = "sdk-store";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Uninitialized,
    Initializing,
    Ready,
    Signing,
    Terminated,
}

/// The worker's SDK instance and its lifecycle.
pub struct SigningSession<S> {
    sdk: S,
    status: watch::Sender<SessionStatus>,
    params_loaded: bool,
    restored: bool,
}

impl<S: Sdk> SigningSession<S> {
    pub fn new(sdk: S, status: watch::Sender<SessionStatus>) -> Self {
        Self {
            sdk,
            status,
            params_loaded: false,
            restored: false,
        }
    }

    /// Load masp params and restore any persisted SDK state. The session
    /// stays in `Initializing` until [`SigningSession::mark_ready`].
    pub async fn initialize(&mut self, store: &PrefixedStore) -> anyhow::Result<()> {
        self.set_status(SessionStatus::Initializing);

        self.sdk.load_masp_params().await?;
        self.params_loaded = true;

        if let Some(state) = store.get(SDK_STORE_KEY).await? {
            self.sdk.decode(&state)?;
            self.restored = true;
        }
        Ok(())
    }

    pub fn mark_ready(&self) {
        self.set_status(SessionStatus::Ready);
    }

    /// Run one transfer to completion. Every failure collapses into
    /// `TRANSFER_FAILED`; the cause is only logged.
    pub async fn sign(&mut self, request: SubmitTransferMessageData) -> WorkerSignal {
        self.set_status(SessionStatus::Signing);

        let result = match BASE64.decode(&request.tx_msg) {
            Ok(tx_msg) => {
                self.sdk
                    .submit_transfer(&tx_msg, &request.password, &request.xsk)
                    .await
            }
            Err(e) => Err(anyhow::anyhow!("txMsg is not base64: {}", e)),
        };

        let signal = match result {
            Ok(receipt) => {
                tracing::info!("Transfer submitted: {}", receipt.hash);
                WorkerSignal::TransferSuccessful
            }
            Err(e) => {
                tracing::warn!("Transfer failed: {:#}", e);
                WorkerSignal::TransferFailed
            }
        };

        self.set_status(SessionStatus::Ready);
        signal
    }

    pub fn terminate(&self) {
        self.set_status(SessionStatus::Terminated);
    }

    pub fn params_loaded(&self) -> bool {
        self.params_loaded
    }

    pub fn restored(&self) -> bool {
        self.restored
    }

    fn set_status(&self, status: SessionStatus) {
        // send_replace works with no receivers left.
        self.status.send_replace(status);
    }
}
