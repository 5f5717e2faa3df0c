use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    pub chain: ChainConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub chain_id: String,
    pub rpc_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String, // "memory" or "rocksdb"
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_storage_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_masp_params_dir")]
    pub masp_params_dir: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            masp_params_dir: default_masp_params_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Seed of the emulated device. Without it no device is connected.
    #[serde(default)]
    pub emulated_seed_hex: Option<String>,
    #[serde(default = "default_auto_approve")]
    pub auto_approve: bool,
    #[serde(default = "default_device_timeout_secs")]
    pub device_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            emulated_seed_hex: None,
            auto_approve: default_auto_approve(),
            device_timeout_secs: default_device_timeout_secs(),
        }
    }
}

impl LedgerConfig {
    pub fn emulated_seed(&self) -> Result<Option<Vec<u8>>> {
        self.emulated_seed_hex
            .as_deref()
            .map(|seed| hex::decode(seed).context("Failed to decode emulated ledger seed"))
            .transpose()
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_storage_path() -> String {
    "./data/extension".to_string()
}

fn default_masp_params_dir() -> String {
    "./masp-params".to_string()
}

fn default_auto_approve() -> bool {
    true
}

fn default_device_timeout_secs() -> u64 {
    60
}

impl ConfigFile {
    pub fn load(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain.chain_id.trim().is_empty() {
            anyhow::bail!("[chain] chain_id must not be empty");
        }
        if !self.chain.rpc_url.starts_with("http://") && !self.chain.rpc_url.starts_with("https://")
        {
            anyhow::bail!("[chain] rpc_url must be an http(s) URL: {}", self.chain.rpc_url);
        }
        match self.storage.backend.as_str() {
            "memory" => {}
            "rocksdb" => {
                if !cfg!(feature = "rocksdb-store") {
                    anyhow::bail!("Storage backend 'rocksdb' requires the rocksdb-store feature");
                }
            }
            other => anyhow::bail!(
                "Invalid storage backend: {}. Must be 'memory' or 'rocksdb'",
                other
            ),
        }
        if let Some(seed) = self.ledger.emulated_seed()? {
            if !(16..=64).contains(&seed.len()) {
                anyhow::bail!(
                    "[ledger] emulated_seed_hex must be 16 to 64 bytes, got {}",
                    seed.len()
                );
            }
        }
        if self.ledger.device_timeout_secs == 0 {
            anyhow::bail!("[ledger] device_timeout_secs must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[chain]
chain_id = "namada-test.0123"
rpc_url = "http://127.0.0.1:26657"
"#;

    #[test]
    fn test_defaults() {
        let config = ConfigFile::parse(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.worker.masp_params_dir, "./masp-params");
        assert!(config.ledger.emulated_seed().unwrap().is_none());
        assert!(config.ledger.auto_approve);
    }

    #[test]
    fn test_full_config() {
        let config = ConfigFile::parse(&format!(
            "{}\n[storage]\nbackend = \"rocksdb\"\npath = \"/tmp/ext\"\n\n[ledger]\nemulated_seed_hex = \"{}\"\nauto_approve = false\n",
            MINIMAL,
            "ab".repeat(32)
        ))
        .unwrap();
        assert_eq!(config.storage.path, "/tmp/ext");
        assert_eq!(config.ledger.emulated_seed().unwrap().unwrap().len(), 32);
        assert!(!config.ledger.auto_approve);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ConfigFile::parse(MINIMAL).unwrap();
        config.storage.backend = "indexeddb".to_string();
        assert!(config.validate().is_err());

        let mut config = ConfigFile::parse(MINIMAL).unwrap();
        config.chain.rpc_url = "127.0.0.1:26657".to_string();
        assert!(config.validate().is_err());

        let mut config = ConfigFile::parse(MINIMAL).unwrap();
        config.ledger.emulated_seed_hex = Some("abcd".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_chain_section() {
        assert!(ConfigFile::parse("[storage]\nbackend = \"memory\"\n").is_err());
    }
}
