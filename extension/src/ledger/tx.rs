// Transaction bytes handed to the device for signing.
// The encoding is borsh so the bytes are canonical: the same description
// always produces the same bytes and the same sign hash.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::device::sign_digest;
use super::LedgerError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum TxType {
    Transfer,
    Bond,
    Unbond,
    Withdraw,
    IbcTransfer,
    RevealPk,
}

/// Unsigned transaction as described by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTx {
    pub tx_type: TxType,
    /// Kind-specific payload, base64.
    pub data: String,
    pub fee_amount: u64,
    pub gas_limit: u64,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TxEnvelope {
    pub chain_id: String,
    pub tx_type: TxType,
    /// Compressed public key of the signer.
    pub signer: Vec<u8>,
    pub fee_amount: u64,
    pub gas_limit: u64,
    pub data: Vec<u8>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignedTx {
    pub tx: Vec<u8>,
    /// 64-byte compact ECDSA signature over the tx sign hash.
    pub signature: Vec<u8>,
}

/// Bytes ready to be signed on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxBytes {
    /// Borsh-encoded [`TxEnvelope`], base64.
    pub bytes: String,
    /// SHA-256 of the bytes, hex. This is what the device signs.
    pub sign_hash: String,
    /// Derivation path of the signing key.
    pub path: String,
}

impl TxEnvelope {
    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        borsh::to_vec(self).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LedgerError> {
        borsh::from_slice(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    pub fn from_unsigned(
        chain_id: &str,
        signer: Vec<u8>,
        tx: &UnsignedTx,
    ) -> Result<Self, LedgerError> {
        if tx.tx_type == TxType::RevealPk {
            return Err(LedgerError::Serialization(
                "reveal-pk transactions are built from the account, not from a description"
                    .to_string(),
            ));
        }
        let data = BASE64
            .decode(&tx.data)
            .map_err(|e| LedgerError::Serialization(format!("tx data is not base64: {}", e)))?;

        Ok(Self {
            chain_id: chain_id.to_string(),
            tx_type: tx.tx_type,
            signer,
            fee_amount: tx.fee_amount,
            gas_limit: tx.gas_limit,
            data,
            memo: tx.memo.clone(),
        })
    }

    pub fn reveal_pk(chain_id: &str, public_key: Vec<u8>) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            tx_type: TxType::RevealPk,
            signer: public_key.clone(),
            fee_amount: 0,
            gas_limit: 0,
            data: public_key,
            memo: None,
        }
    }

    pub fn to_tx_bytes(&self, path: &str) -> Result<TxBytes, LedgerError> {
        let bytes = self.encode()?;
        Ok(TxBytes {
            sign_hash: hex::encode(sign_digest(&bytes)),
            bytes: BASE64.encode(bytes),
            path: path.to_string(),
        })
    }
}

impl SignedTx {
    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        borsh::to_vec(self).map_err(|e| LedgerError::Serialization(e.to_string()))
    }
}
