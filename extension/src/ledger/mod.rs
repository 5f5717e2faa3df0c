// Ledger (hardware wallet) accounts and transaction signing.
// Everything here is reached through the "ledger" route of the router.

pub mod device;
pub mod handler;
pub mod init;
pub mod messages;
pub mod service;
pub mod store;
pub mod tx;

pub use device::{DeviceError, DisconnectedLedger, EmulatedLedger, LedgerDevice};
pub use init::init;
pub use service::LedgerService;
pub use store::{AccountTree, LedgerAccount};

use crate::rpc::RpcError;
use crate::storage::StorageError;

pub const ROUTE: &str = "ledger";

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger account {0} not found")]
    AccountNotFound(String),

    #[error("ledger account {id} still has {children} child account(s)")]
    HasChildren { id: String, children: usize },

    #[error("parent {parent_id} already has a child at index {index}")]
    IndexCollision { parent_id: String, index: u32 },

    #[error("invalid derivation path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("signature does not match the account key")]
    InvalidSignature,

    #[error("transaction serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("broadcast failed: {0}")]
    Broadcast(#[from] RpcError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::AccountNotFound(_) => "account-not-found",
            LedgerError::HasChildren { .. } => "account-has-children",
            LedgerError::IndexCollision { .. } => "derivation-index-collision",
            LedgerError::InvalidPath { .. } => "invalid-path",
            LedgerError::MalformedSignature(_) => "malformed-signature",
            LedgerError::InvalidSignature => "invalid-signature",
            LedgerError::Serialization(_) => "serialization-failed",
            LedgerError::Device(DeviceError::NotConnected) => "device-not-connected",
            LedgerError::Device(DeviceError::UserRejected) => "device-rejected",
            LedgerError::Device(DeviceError::Timeout(_)) => "device-timeout",
            LedgerError::Device(_) => "device-error",
            LedgerError::Broadcast(_) => "broadcast-failed",
            LedgerError::Storage(_) => "storage-error",
        }
    }
}
