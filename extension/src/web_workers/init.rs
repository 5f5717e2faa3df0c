use std::sync::Arc;

use extension_router::{HandlerError, HandlerMap, Message, Router, RouterError};
use serde::{Deserialize, Serialize};

use super::submit_transfer::TransferWorker;
use super::types::{SubmitTransferMessageData, WorkerSignal};

pub const ROUTE: &str = "transfer";

/// Router-facing form of a worker request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmitTransferMsg(pub SubmitTransferMessageData);

impl Message for SubmitTransferMsg {
    const KIND: &'static str = "submit-transfer";
    const ROUTE: &'static str = ROUTE;
    type Response = WorkerSignal;

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.0.tx_msg.is_empty(), "txMsg is required");
        anyhow::ensure!(!self.0.xsk.is_empty(), "xsk is required");
        Ok(())
    }
}

pub fn get_handler(worker: Arc<TransferWorker>) -> HandlerMap {
    HandlerMap::new().on::<SubmitTransferMsg, _, _>(move |msg: SubmitTransferMsg| {
        let worker = worker.clone();
        async move {
            worker
                .submit(msg.0)
                .await
                .map_err(|e| {
                    tracing::warn!("{} rejected: {}", SubmitTransferMsg::KIND, e);
                    HandlerError::new(e.code(), e)
                })
        }
    })
}

/// Expose the transfer worker under the `transfer` route.
pub fn init(router: &mut Router, worker: Arc<TransferWorker>) -> Result<(), RouterError> {
    router.register_message::<SubmitTransferMsg>()?;
    router.add_handler(ROUTE, get_handler(worker))
}
