use extension_router::Message;
use serde::{Deserialize, Serialize};

use super::store::LedgerAccount;
use super::tx::{TxBytes, UnsignedTx};
use super::ROUTE;
use crate::rpc::TxReceipt;

/// Acknowledgement returned by requests without a richer result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLedgerParentAccountMsg {
    pub path: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl Message for AddLedgerParentAccountMsg {
    const KIND: &'static str = "add-ledger-parent-account";
    const ROUTE: &'static str = ROUTE;
    type Response = LedgerAccount;

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.path.trim().is_empty(), "path is required");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLedgerAccountMsg {
    pub parent_id: String,
    pub index: u32,
    #[serde(default)]
    pub alias: Option<String>,
}

impl Message for AddLedgerAccountMsg {
    const KIND: &'static str = "add-ledger-account";
    const ROUTE: &'static str = ROUTE;
    type Response = LedgerAccount;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteLedgerAccountMsg {
    pub id: String,
}

impl Message for DeleteLedgerAccountMsg {
    const KIND: &'static str = "delete-ledger-account";
    const ROUTE: &'static str = ROUTE;
    type Response = Ack;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTxBytesMsg {
    pub account_id: String,
    pub tx: UnsignedTx,
}

impl Message for GetTxBytesMsg {
    const KIND: &'static str = "get-tx-bytes";
    const ROUTE: &'static str = ROUTE;
    type Response = TxBytes;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRevealPkBytesMsg {
    pub account_id: String,
}

impl Message for GetRevealPkBytesMsg {
    const KIND: &'static str = "get-reveal-pk-bytes";
    const ROUTE: &'static str = ROUTE;
    type Response = TxBytes;
}

/// Device-signed transaction coming back from the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSignedTxMsg {
    pub account_id: String,
    /// Bytes exactly as returned by `get-tx-bytes`, base64.
    pub bytes: String,
    /// Compact signature, hex.
    pub signature: String,
}

impl Message for SubmitSignedTxMsg {
    const KIND: &'static str = "submit-signed-tx";
    const ROUTE: &'static str = ROUTE;
    type Response = TxReceipt;

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.bytes.is_empty(), "bytes are required");
        anyhow::ensure!(!self.signature.is_empty(), "signature is required");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSignedRevealPkMsg {
    pub account_id: String,
    pub bytes: String,
    pub signature: String,
}

impl Message for SubmitSignedRevealPkMsg {
    const KIND: &'static str = "submit-signed-reveal-pk";
    const ROUTE: &'static str = ROUTE;
    type Response = TxReceipt;

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.bytes.is_empty(), "bytes are required");
        anyhow::ensure!(!self.signature.is_empty(), "signature is required");
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryLedgerAccountsMsg {}

impl Message for QueryLedgerAccountsMsg {
    const KIND: &'static str = "query-ledger-accounts";
    const ROUTE: &'static str = ROUTE;
    type Response = Vec<LedgerAccount>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameLedgerAccountMsg {
    pub id: String,
    pub alias: String,
}

impl Message for RenameLedgerAccountMsg {
    const KIND: &'static str = "rename-ledger-account";
    const ROUTE: &'static str = ROUTE;
    type Response = LedgerAccount;

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.alias.trim().is_empty(), "alias must not be empty");
        Ok(())
    }
}
