use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bitcoin::bip32::{ChildNumber, DerivationPath};
use bitcoin::secp256k1::{ecdsa, Message, PublicKey, Secp256k1};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::device::{sign_digest, DeviceError, LedgerDevice};
use super::store::{AccountTree, LedgerAccount};
use super::tx::{SignedTx, TxBytes, TxEnvelope, TxType, UnsignedTx};
use super::LedgerError;
use crate::rpc::{Broadcaster, TxReceipt};
use crate::storage::PrefixedStore;

const ACCOUNTS_KEY: &str = "accounts";

pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(60);

/// Ledger account lifecycle and the sign/submit round trip.
///
/// The account tree is only mutated here, under one lock, so add and delete
/// requests are applied strictly one after another. A mutation is persisted
/// before it becomes visible; if persisting fails the tree is unchanged.
pub struct LedgerService {
    device: Arc<dyn LedgerDevice>,
    broadcaster: Arc<dyn Broadcaster>,
    store: PrefixedStore,
    accounts: Mutex<AccountTree>,
    chain_id: String,
    device_timeout: Duration,
}

impl LedgerService {
    /// Load persisted accounts and build the service.
    pub async fn load(
        device: Arc<dyn LedgerDevice>,
        broadcaster: Arc<dyn Broadcaster>,
        store: PrefixedStore,
        chain_id: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        let persisted: Vec<LedgerAccount> = store.get_json(ACCOUNTS_KEY).await?.unwrap_or_default();
        let tree = AccountTree::from_accounts(persisted);
        tracing::info!(
            "Ledger service ready with {} account(s) using {}",
            tree.len(),
            device.description()
        );

        Ok(Self {
            device,
            broadcaster,
            store,
            accounts: Mutex::new(tree),
            chain_id: chain_id.into(),
            device_timeout: DEFAULT_DEVICE_TIMEOUT,
        })
    }

    pub fn with_device_timeout(mut self, timeout: Duration) -> Self {
        self.device_timeout = timeout;
        self
    }

    pub async fn add_parent_account(
        &self,
        path: &str,
        alias: Option<String>,
    ) -> Result<LedgerAccount, LedgerError> {
        let derivation = parse_path(path)?;
        let mut tree = self.accounts.lock().await;

        let public_key = self
            .with_timeout(self.device.get_public_key(&derivation, true))
            .await?;

        let id = uuid::Uuid::new_v4().to_string();
        let account = new_account(
            id.clone(),
            None,
            None,
            &derivation,
            &public_key,
            alias.unwrap_or_else(|| format!("Ledger {}", format_path(&derivation))),
        );

        let mut next = tree.clone();
        next.insert(account.clone())?;
        self.persist(&next).await?;
        *tree = next;

        tracing::info!("Added ledger parent account {} at {}", id, account.path);
        Ok(account)
    }

    pub async fn add_account(
        &self,
        parent_id: &str,
        index: u32,
        alias: Option<String>,
    ) -> Result<LedgerAccount, LedgerError> {
        let mut tree = self.accounts.lock().await;
        tree.check_child_slot(parent_id, index)?;
        let parent = tree.require(parent_id)?.clone();

        let child = ChildNumber::from_hardened_idx(index).map_err(|e| LedgerError::InvalidPath {
            path: format!("{}/{}'", parent.path, index),
            reason: e.to_string(),
        })?;
        let derivation = parse_path(&parent.path)?.child(child);

        let public_key = self
            .with_timeout(self.device.get_public_key(&derivation, true))
            .await?;

        let id = uuid::Uuid::new_v4().to_string();
        let account = new_account(
            id.clone(),
            Some(parent.id.clone()),
            Some(index),
            &derivation,
            &public_key,
            alias.unwrap_or_else(|| format!("{} #{}", parent.alias, index)),
        );

        let mut next = tree.clone();
        next.insert(account.clone())?;
        self.persist(&next).await?;
        *tree = next;

        tracing::info!(
            "Added ledger account {} under {} at index {}",
            id,
            parent.id,
            index
        );
        Ok(account)
    }

    /// Delete a leaf account. Parents must have their children deleted first.
    pub async fn delete_account(&self, id: &str) -> Result<(), LedgerError> {
        let mut tree = self.accounts.lock().await;

        let mut next = tree.clone();
        next.remove(id)?;
        self.persist(&next).await?;
        *tree = next;

        tracing::info!("Deleted ledger account {}", id);
        Ok(())
    }

    pub async fn rename_account(&self, id: &str, alias: String) -> Result<LedgerAccount, LedgerError> {
        let mut tree = self.accounts.lock().await;

        let mut next = tree.clone();
        let account = next.rename(id, alias)?.clone();
        self.persist(&next).await?;
        *tree = next;

        Ok(account)
    }

    pub async fn accounts(&self) -> Vec<LedgerAccount> {
        self.accounts.lock().await.snapshot()
    }

    pub async fn account(&self, id: &str) -> Result<LedgerAccount, LedgerError> {
        Ok(self.accounts.lock().await.require(id)?.clone())
    }

    pub async fn get_tx_bytes(
        &self,
        account_id: &str,
        tx: &UnsignedTx,
    ) -> Result<TxBytes, LedgerError> {
        let account = self.account(account_id).await?;
        let signer = decode_public_key(&account)?.serialize().to_vec();
        TxEnvelope::from_unsigned(&self.chain_id, signer, tx)?.to_tx_bytes(&account.path)
    }

    pub async fn get_reveal_pk_bytes(&self, account_id: &str) -> Result<TxBytes, LedgerError> {
        let account = self.account(account_id).await?;
        let public_key = decode_public_key(&account)?.serialize().to_vec();
        TxEnvelope::reveal_pk(&self.chain_id, public_key).to_tx_bytes(&account.path)
    }

    pub async fn submit_signed_tx(
        &self,
        account_id: &str,
        bytes: &str,
        signature: &str,
    ) -> Result<TxReceipt, LedgerError> {
        self.submit(account_id, bytes, signature, false).await
    }

    pub async fn submit_signed_reveal_pk(
        &self,
        account_id: &str,
        bytes: &str,
        signature: &str,
    ) -> Result<TxReceipt, LedgerError> {
        self.submit(account_id, bytes, signature, true).await
    }

    async fn submit(
        &self,
        account_id: &str,
        bytes: &str,
        signature: &str,
        reveal_pk: bool,
    ) -> Result<TxReceipt, LedgerError> {
        let account = self.account(account_id).await?;
        let public_key = decode_public_key(&account)?;

        let tx = BASE64
            .decode(bytes)
            .map_err(|e| LedgerError::Serialization(format!("tx bytes are not base64: {}", e)))?;
        let envelope = TxEnvelope::decode(&tx)?;
        if envelope.chain_id != self.chain_id {
            return Err(LedgerError::Serialization(format!(
                "transaction is for chain {}, expected {}",
                envelope.chain_id, self.chain_id
            )));
        }
        if (envelope.tx_type == TxType::RevealPk) != reveal_pk {
            return Err(LedgerError::Serialization(format!(
                "unexpected {:?} transaction",
                envelope.tx_type
            )));
        }
        if envelope.signer != public_key.serialize() {
            return Err(LedgerError::InvalidSignature);
        }

        let signature = parse_signature(signature)?;
        verify(&public_key, &tx, &signature)?;

        let signed = SignedTx {
            tx,
            signature: signature.serialize_compact().to_vec(),
        }
        .encode()?;

        let receipt = self.broadcaster.broadcast(&signed).await?;
        tracing::info!(
            "Submitted {:?} for ledger account {}: {}",
            envelope.tx_type,
            account_id,
            receipt.hash
        );
        Ok(receipt)
    }

    async fn persist(&self, tree: &AccountTree) -> Result<(), LedgerError> {
        self.store.set_json(ACCOUNTS_KEY, &tree.snapshot()).await?;
        Ok(())
    }

    async fn with_timeout<T>(
        &self,
        request: impl Future<Output = Result<T, DeviceError>>,
    ) -> Result<T, LedgerError> {
        match tokio::time::timeout(self.device_timeout, request).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DeviceError::Timeout(self.device_timeout).into()),
        }
    }
}

fn parse_path(path: &str) -> Result<DerivationPath, LedgerError> {
    let derivation = DerivationPath::from_str(path).map_err(|e| LedgerError::InvalidPath {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    if derivation.is_empty() {
        return Err(LedgerError::InvalidPath {
            path: path.to_string(),
            reason: "path has no components".to_string(),
        });
    }
    Ok(derivation)
}

/// `m/44'/877'/0'` style rendering.
pub fn format_path(path: &DerivationPath) -> String {
    let mut out = String::from("m");
    for child in path {
        out.push('/');
        out.push_str(&child.to_string());
    }
    out
}

fn new_account(
    id: String,
    parent_id: Option<String>,
    index: Option<u32>,
    path: &DerivationPath,
    public_key: &PublicKey,
    alias: String,
) -> LedgerAccount {
    let key_bytes = public_key.serialize();
    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    LedgerAccount {
        id,
        parent_id,
        index,
        path: format_path(path),
        public_key: hex::encode(key_bytes),
        public_key_hash: hex::encode(&Sha256::digest(key_bytes)[..20]),
        alias,
        created_at,
    }
}

fn decode_public_key(account: &LedgerAccount) -> Result<PublicKey, LedgerError> {
    let bytes = hex::decode(&account.public_key)
        .map_err(|e| LedgerError::Serialization(format!("stored public key: {}", e)))?;
    PublicKey::from_slice(&bytes)
        .map_err(|e| LedgerError::Serialization(format!("stored public key: {}", e)))
}

fn parse_signature(signature: &str) -> Result<ecdsa::Signature, LedgerError> {
    let bytes =
        hex::decode(signature).map_err(|e| LedgerError::MalformedSignature(e.to_string()))?;
    if bytes.len() != 64 {
        return Err(LedgerError::MalformedSignature(format!(
            "expected 64 bytes, got {}",
            bytes.len()
        )));
    }
    ecdsa::Signature::from_compact(&bytes).map_err(|e| LedgerError::MalformedSignature(e.to_string()))
}

fn verify(public_key: &PublicKey, tx: &[u8], signature: &ecdsa::Signature) -> Result<(), LedgerError> {
    let secp = Secp256k1::verification_only();
    let digest = Message::from_digest(sign_digest(tx));
    secp.verify_ecdsa(&digest, signature, public_key)
        .map_err(|_| LedgerError::InvalidSignature)
}
