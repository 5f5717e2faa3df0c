use std::fmt;

use serde::{Deserialize, Serialize};

/// Host to worker: one transfer to sign and submit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTransferMessageData {
    /// Serialized transfer message, base64.
    pub tx_msg: String,
    pub password: String,
    /// Id of the extended spending key in the keystore.
    pub xsk: String,
}

impl fmt::Debug for SubmitTransferMessageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitTransferMessageData")
            .field("tx_msg", &self.tx_msg)
            .field("password", &"<redacted>")
            .field("xsk", &self.xsk)
            .finish()
    }
}

/// Worker to host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerSignal {
    #[serde(rename = "INIT")]
    Init,
    #[serde(rename = "TRANSFER_SUCCESSFUL")]
    TransferSuccessful,
    #[serde(rename = "TRANSFER_FAILED")]
    TransferFailed,
}

impl WorkerSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerSignal::Init => "INIT",
            WorkerSignal::TransferSuccessful => "TRANSFER_SUCCESSFUL",
            WorkerSignal::TransferFailed => "TRANSFER_FAILED",
        }
    }
}

impl fmt::Display for WorkerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        assert_eq!(
            serde_json::to_string(&WorkerSignal::TransferFailed).unwrap(),
            "\"TRANSFER_FAILED\""
        );
        let data: SubmitTransferMessageData =
            serde_json::from_str(r#"{"txMsg":"AQI=","password":"pw","xsk":"xsk1"}"#).unwrap();
        assert_eq!(data.tx_msg, "AQI=");
        assert!(!format!("{:?}", data).contains("pw\""));
    }
}
