// Cryptographic SDK owned by the transfer worker.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ledger::device::sign_digest;
use crate::ledger::tx::SignedTx;
use crate::rpc::{Broadcaster, TxReceipt};

/// Parameter files the shielded pool needs before anything can be signed.
pub const MASP_PARAM_FILES: [&str; 3] = [
    "masp-spend.params",
    "masp-output.params",
    "masp-convert.params",
];

/// Operations the worker performs on its SDK instance.
///
/// The instance is owned by exactly one worker task, hence `&mut self`.
#[async_trait]
pub trait Sdk: Send + 'static {
    async fn load_masp_params(&mut self) -> Result<()>;

    /// Restore state previously persisted by the wallet.
    fn decode(&mut self, state: &[u8]) -> Result<()>;

    /// Build, sign and broadcast a transfer described by `tx_msg`.
    async fn submit_transfer(&mut self, tx_msg: &[u8], password: &str, xsk: &str)
        -> Result<TxReceipt>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaspParams {
    pub name: String,
    pub len: usize,
    /// SHA-256 of the file contents, hex.
    pub fingerprint: String,
}

/// A spending key sealed with AES-256-GCM under a password-derived key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKey {
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

impl EncryptedKey {
    pub fn seal(secret: &SecretKey, password: &str) -> Result<Self> {
        let mut salt = [0u8; 16];
        let mut nonce = [0u8; 12];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let cipher = Aes256Gcm::new(&password_key(&salt, password).into());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), secret.secret_bytes().as_ref())
            .map_err(|e| anyhow::anyhow!("Encryption failed: {:?}", e))?;

        Ok(Self {
            salt: hex::encode(salt),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        })
    }

    pub fn open(&self, password: &str) -> Result<SecretKey> {
        let salt = hex::decode(&self.salt).context("Invalid salt encoding")?;
        let nonce = hex::decode(&self.nonce).context("Invalid nonce encoding")?;
        let ciphertext = hex::decode(&self.ciphertext).context("Invalid ciphertext encoding")?;
        anyhow::ensure!(nonce.len() == 12, "Nonce must be 12 bytes, got {}", nonce.len());

        let cipher = Aes256Gcm::new(&password_key(&salt, password).into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| anyhow::anyhow!("Decryption failed: wrong password"))?;

        SecretKey::from_slice(&plaintext).context("Decrypted key is not a valid secret key")
    }
}

fn password_key(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// Persisted SDK state: encrypted spending keys by key id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keystore {
    pub keys: BTreeMap<String, EncryptedKey>,
}

impl Keystore {
    pub fn insert(&mut self, xsk: impl Into<String>, secret: &SecretKey, password: &str) -> Result<()> {
        self.keys.insert(xsk.into(), EncryptedKey::seal(secret, password)?);
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to encode keystore")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to decode keystore")
    }
}

/// SDK backed by masp parameter files on disk and a chain node.
pub struct NodeSdk {
    params_dir: PathBuf,
    params: Vec<MaspParams>,
    keystore: Keystore,
    broadcaster: Arc<dyn Broadcaster>,
}

impl NodeSdk {
    pub fn new(params_dir: impl Into<PathBuf>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            params_dir: params_dir.into(),
            params: Vec::new(),
            keystore: Keystore::default(),
            broadcaster,
        }
    }

    pub fn params(&self) -> &[MaspParams] {
        &self.params
    }

    pub fn keystore(&self) -> &Keystore {
        &self.keystore
    }
}

#[async_trait]
impl Sdk for NodeSdk {
    async fn load_masp_params(&mut self) -> Result<()> {
        let mut params = Vec::with_capacity(MASP_PARAM_FILES.len());
        for name in MASP_PARAM_FILES {
            let path = self.params_dir.join(name);
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read masp params {}", path.display()))?;
            let fingerprint = hex::encode(Sha256::digest(&bytes));
            tracing::debug!("Loaded {} ({} bytes, sha256={})", name, bytes.len(), fingerprint);
            params.push(MaspParams {
                name: name.to_string(),
                len: bytes.len(),
                fingerprint,
            });
        }
        self.params = params;
        tracing::info!("MASP params loaded from {}", self.params_dir.display());
        Ok(())
    }

    fn decode(&mut self, state: &[u8]) -> Result<()> {
        self.keystore = Keystore::decode(state)?;
        tracing::info!("Restored SDK state with {} key(s)", self.keystore.keys.len());
        Ok(())
    }

    async fn submit_transfer(
        &mut self,
        tx_msg: &[u8],
        password: &str,
        xsk: &str,
    ) -> Result<TxReceipt> {
        anyhow::ensure!(!self.params.is_empty(), "MASP params are not loaded");
        anyhow::ensure!(!tx_msg.is_empty(), "Empty transfer message");

        let sealed = self
            .keystore
            .keys
            .get(xsk)
            .with_context(|| format!("Unknown spending key {}", xsk))?;
        let secret = sealed.open(password)?;

        let secp = Secp256k1::signing_only();
        let signature = secp.sign_ecdsa(&Message::from_digest(sign_digest(tx_msg)), &secret);
        let signed = SignedTx {
            tx: tx_msg.to_vec(),
            signature: signature.serialize_compact().to_vec(),
        }
        .encode()?;

        let receipt = self
            .broadcaster
            .broadcast(&signed)
            .await
            .context("Failed to broadcast transfer")?;
        Ok(receipt)
    }
}
