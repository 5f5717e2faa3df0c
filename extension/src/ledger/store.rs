use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::LedgerError;

/// A key identity derived from the connected hardware wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Child index under the parent, `None` for root accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub path: String,
    /// Compressed secp256k1 public key, hex.
    pub public_key: String,
    /// First 20 bytes of SHA-256 over the public key, hex.
    pub public_key_hash: String,
    pub alias: String,
    pub created_at: u64,
}

impl LedgerAccount {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Parent/child account tree.
///
/// Every mutation checks the tree invariants first and leaves the tree
/// untouched when a check fails.
#[derive(Debug, Clone, Default)]
pub struct AccountTree {
    accounts: BTreeMap<String, LedgerAccount>,
}

impl AccountTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted snapshot; orphans are dropped.
    pub fn from_accounts(accounts: Vec<LedgerAccount>) -> Self {
        let mut tree = Self::new();
        let mut pending = accounts;
        loop {
            let before = pending.len();
            let (ready, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(|a| {
                a.parent_id
                    .as_deref()
                    .map_or(true, |parent| tree.get(parent).is_some())
            });
            for account in ready {
                let id = account.id.clone();
                if let Err(e) = tree.insert(account) {
                    tracing::warn!("Dropping persisted ledger account {}: {}", id, e);
                }
            }
            pending = rest;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }
        for orphan in pending {
            tracing::warn!("Dropping orphaned ledger account {}", orphan.id);
        }
        tree
    }

    pub fn get(&self, id: &str) -> Option<&LedgerAccount> {
        self.accounts.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&LedgerAccount, LedgerError> {
        self.get(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))
    }

    pub fn children_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a LedgerAccount> {
        self.accounts
            .values()
            .filter(move |a| a.parent_id.as_deref() == Some(id))
    }

    /// Check that a child with `index` could be added under `parent_id`.
    pub fn check_child_slot(&self, parent_id: &str, index: u32) -> Result<(), LedgerError> {
        if self.get(parent_id).is_none() {
            return Err(LedgerError::AccountNotFound(parent_id.to_string()));
        }
        if self.children_of(parent_id).any(|c| c.index == Some(index)) {
            return Err(LedgerError::IndexCollision {
                parent_id: parent_id.to_string(),
                index,
            });
        }
        Ok(())
    }

    pub fn insert(&mut self, account: LedgerAccount) -> Result<(), LedgerError> {
        if let Some(parent_id) = &account.parent_id {
            let index = account.index.ok_or_else(|| {
                LedgerError::Serialization(format!("child account {} has no index", account.id))
            })?;
            self.check_child_slot(parent_id, index)?;
        }
        self.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    /// Remove a leaf account. Accounts with children are not removed.
    pub fn remove(&mut self, id: &str) -> Result<LedgerAccount, LedgerError> {
        self.require(id)?;
        let children = self.children_of(id).count();
        if children > 0 {
            return Err(LedgerError::HasChildren {
                id: id.to_string(),
                children,
            });
        }
        self.accounts
            .remove(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))
    }

    pub fn rename(&mut self, id: &str, alias: String) -> Result<&LedgerAccount, LedgerError> {
        let account = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))?;
        account.alias = alias;
        Ok(account)
    }

    /// All accounts, every parent before its children.
    pub fn snapshot(&self) -> Vec<LedgerAccount> {
        let mut ordered: Vec<LedgerAccount> =
            self.accounts.values().filter(|a| a.is_root()).cloned().collect();
        let mut cursor = 0;
        while cursor < ordered.len() {
            let id = ordered[cursor].id.clone();
            ordered.extend(self.children_of(&id).cloned());
            cursor += 1;
        }
        ordered
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
