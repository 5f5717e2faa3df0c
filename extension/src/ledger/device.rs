use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::{ecdsa, All, Message, PublicKey, Secp256k1};
use bitcoin::Network;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("ledger device is not connected")]
    NotConnected,

    #[error("request was rejected on the device")]
    UserRejected,

    #[error("device did not answer within {0:?}")]
    Timeout(Duration),

    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("device transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub connected: bool,
    pub app_name: String,
    pub app_version: String,
}

/// Logical contract with the hardware wallet.
///
/// Implementations sit on top of the physical transport (USB/HID framing,
/// WebHID) and only speak in derivation paths, keys and signatures.
#[async_trait]
pub trait LedgerDevice: Send + Sync {
    async fn status(&self) -> Result<DeviceStatus, DeviceError>;

    /// Fetch the public key at `path`. With `confirm` set, the user has to
    /// approve the key on the device screen.
    async fn get_public_key(
        &self,
        path: &DerivationPath,
        confirm: bool,
    ) -> Result<PublicKey, DeviceError>;

    /// Sign the SHA-256 digest of `message` with the key at `path`.
    async fn sign(
        &self,
        path: &DerivationPath,
        message: &[u8],
    ) -> Result<ecdsa::Signature, DeviceError>;

    fn description(&self) -> String;
}

/// Digest that devices sign and the service verifies.
pub fn sign_digest(message: &[u8]) -> [u8; 32] {
    Sha256::digest(message).into()
}

/// Software device deriving keys from a BIP-32 seed.
///
/// Stands in for the hardware during development and tests, the same way
/// SoftHSM stands in for a token. Connection and on-device approval can be
/// toggled to exercise the failure paths.
pub struct EmulatedLedger {
    master: Xpriv,
    secp: Secp256k1<All>,
    connected: AtomicBool,
    approve: AtomicBool,
}

impl EmulatedLedger {
    pub fn from_seed(seed: &[u8]) -> Result<Self, DeviceError> {
        let master = Xpriv::new_master(Network::Bitcoin, seed)
            .map_err(|e| DeviceError::Transport(format!("invalid seed: {}", e)))?;
        Ok(Self {
            master,
            secp: Secp256k1::new(),
            connected: AtomicBool::new(true),
            approve: AtomicBool::new(true),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_auto_approve(&self, approve: bool) {
        self.approve.store(approve, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> Result<(), DeviceError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }

    fn ensure_approved(&self) -> Result<(), DeviceError> {
        if self.approve.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DeviceError::UserRejected)
        }
    }

    fn derive(&self, path: &DerivationPath) -> Result<Xpriv, DeviceError> {
        self.master
            .derive_priv(&self.secp, path)
            .map_err(|e| DeviceError::InvalidPath(e.to_string()))
    }
}

#[async_trait]
impl LedgerDevice for EmulatedLedger {
    async fn status(&self) -> Result<DeviceStatus, DeviceError> {
        Ok(DeviceStatus {
            connected: self.connected.load(Ordering::SeqCst),
            app_name: "Emulated".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    async fn get_public_key(
        &self,
        path: &DerivationPath,
        confirm: bool,
    ) -> Result<PublicKey, DeviceError> {
        self.ensure_connected()?;
        if confirm {
            self.ensure_approved()?;
        }
        let xpriv = self.derive(path)?;
        Ok(PublicKey::from_secret_key(&self.secp, &xpriv.private_key))
    }

    async fn sign(
        &self,
        path: &DerivationPath,
        message: &[u8],
    ) -> Result<ecdsa::Signature, DeviceError> {
        self.ensure_connected()?;
        self.ensure_approved()?;
        let xpriv = self.derive(path)?;
        let digest = Message::from_digest(sign_digest(message));
        Ok(self.secp.sign_ecdsa(&digest, &xpriv.private_key))
    }

    fn description(&self) -> String {
        format!("Emulated ledger (fingerprint={})", self.master.fingerprint(&self.secp))
    }
}

/// Placeholder used when no device transport is configured.
pub struct DisconnectedLedger;

#[async_trait]
impl LedgerDevice for DisconnectedLedger {
    async fn status(&self) -> Result<DeviceStatus, DeviceError> {
        Ok(DeviceStatus {
            connected: false,
            app_name: String::new(),
            app_version: String::new(),
        })
    }

    async fn get_public_key(
        &self,
        _path: &DerivationPath,
        _confirm: bool,
    ) -> Result<PublicKey, DeviceError> {
        Err(DeviceError::NotConnected)
    }

    async fn sign(
        &self,
        _path: &DerivationPath,
        _message: &[u8],
    ) -> Result<ecdsa::Signature, DeviceError> {
        Err(DeviceError::NotConnected)
    }

    fn description(&self) -> String {
        "No ledger device".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn device() -> EmulatedLedger {
        EmulatedLedger::from_seed(&[7u8; 32]).unwrap()
    }

    #[tokio::test]
    async fn test_public_key_is_deterministic_per_path() {
        let device = device();
        let a = DerivationPath::from_str("m/44'/877'/0'").unwrap();
        let b = DerivationPath::from_str("m/44'/877'/1'").unwrap();

        let pk_a = device.get_public_key(&a, true).await.unwrap();
        assert_eq!(pk_a, device.get_public_key(&a, false).await.unwrap());
        assert_ne!(pk_a, device.get_public_key(&b, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_signature_verifies_against_public_key() {
        let device = device();
        let path = DerivationPath::from_str("m/44'/877'/0'/0'/3'").unwrap();
        let pk = device.get_public_key(&path, false).await.unwrap();
        let sig = device.sign(&path, b"tx bytes").await.unwrap();

        let secp = Secp256k1::verification_only();
        let digest = Message::from_digest(sign_digest(b"tx bytes"));
        assert!(secp.verify_ecdsa(&digest, &sig, &pk).is_ok());
    }

    #[tokio::test]
    async fn test_disconnected_and_rejected() {
        let device = device();
        let path = DerivationPath::from_str("m/44'/877'/0'").unwrap();

        device.set_auto_approve(false);
        assert!(matches!(
            device.get_public_key(&path, true).await,
            Err(DeviceError::UserRejected)
        ));
        // Unconfirmed reads do not prompt.
        assert!(device.get_public_key(&path, false).await.is_ok());

        device.set_connected(false);
        assert!(matches!(
            device.get_public_key(&path, false).await,
            Err(DeviceError::NotConnected)
        ));
        assert!(!device.status().await.unwrap().connected);
    }
}
