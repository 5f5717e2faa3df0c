use std::collections::BTreeSet;

use crate::error::RouterError;
use crate::message::Message;

/// The set of message kinds the router accepts.
#[derive(Debug, Default, Clone)]
pub struct MessageRegistry {
    kinds: BTreeSet<String>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: Message>(&mut self) -> Result<(), RouterError> {
        self.register_kind(M::KIND)
    }

    pub fn register_kind(&mut self, kind: &str) -> Result<(), RouterError> {
        if !self.kinds.insert(kind.to_string()) {
            return Err(RouterError::DuplicateRegistration(kind.to_string()));
        }
        tracing::debug!("Registered message kind {}", kind);
        Ok(())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
