// Isolated workers spawned by the background context.

pub mod init;
pub mod session;
pub mod submit_transfer;
pub mod types;

pub use session::{SessionStatus, SigningSession, SDK_STORE_KEY};
pub use submit_transfer::{spawn, TransferWorker, WorkerError};
pub use types::{SubmitTransferMessageData, WorkerSignal};
