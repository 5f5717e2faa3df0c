// Startup wiring of the background context.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use extension_router::{spawn_port, PortClient, Router};
use tokio::task::JoinHandle;

use crate::config::ConfigFile;
use crate::ledger::{self, DisconnectedLedger, EmulatedLedger, LedgerDevice, LedgerService};
use crate::rpc::{Broadcaster, RpcClient};
use crate::sdk::NodeSdk;
use crate::storage::{KvPrefix, KvStore, MemoryKvStore, PrefixedStore};
use crate::web_workers::{self, TransferWorker};

const PORT_CAPACITY: usize = 64;

/// Everything the background context owns once started.
pub struct BackgroundContext {
    pub router: Arc<Router>,
    pub ledger: Arc<LedgerService>,
    pub worker: Arc<TransferWorker>,
    pub port: PortClient,
    port_handle: JoinHandle<()>,
}

impl BackgroundContext {
    /// Build the stores, collaborators, router and worker from `config`.
    pub async fn init(config: &ConfigFile) -> Result<Self> {
        let store = open_store(config)?;
        let device = open_device(config)?;
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(RpcClient::new(&config.chain.rpc_url));
        tracing::info!("Chain {} via {}", config.chain.chain_id, config.chain.rpc_url);

        Self::with_collaborators(config, store, device, broadcaster).await
    }

    /// Same as [`BackgroundContext::init`] with the external collaborators
    /// supplied by the caller.
    pub async fn with_collaborators(
        config: &ConfigFile,
        store: Arc<dyn KvStore>,
        device: Arc<dyn LedgerDevice>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Result<Self> {
        let ledger_service = LedgerService::load(
            device,
            broadcaster.clone(),
            PrefixedStore::new(store.clone(), KvPrefix::LedgerAccounts),
            config.chain.chain_id.clone(),
        )
        .await
        .context("Failed to load ledger accounts")?
        .with_device_timeout(Duration::from_secs(config.ledger.device_timeout_secs));
        let ledger_service = Arc::new(ledger_service);

        let sdk = NodeSdk::new(&config.worker.masp_params_dir, broadcaster);
        let worker = Arc::new(web_workers::spawn(
            sdk,
            PrefixedStore::new(store, KvPrefix::Sdk),
        ));

        let mut router = Router::new();
        ledger::init(&mut router, ledger_service.clone()).context("Failed to register ledger route")?;
        web_workers::init::init(&mut router, worker.clone())
            .context("Failed to register transfer route")?;
        router.validate().context("Router validation failed")?;
        let router = Arc::new(router);

        let (port, port_handle) = spawn_port(router.clone(), PORT_CAPACITY);
        tracing::info!("✅ Background context initialized");

        Ok(Self {
            router,
            ledger: ledger_service,
            worker,
            port,
            port_handle,
        })
    }

    /// Stop the worker and the port loop.
    pub async fn shutdown(self) {
        self.worker.shutdown().await;

        let Self {
            port, port_handle, ..
        } = self;
        drop(port);
        if let Err(e) = port_handle.await {
            tracing::error!("Port task failed: {}", e);
        }
        tracing::info!("Background context stopped");
    }
}

fn open_store(config: &ConfigFile) -> Result<Arc<dyn KvStore>> {
    match config.storage.backend.as_str() {
        #[cfg(feature = "rocksdb-store")]
        "rocksdb" => {
            let store = crate::storage::RocksKvStore::open(&config.storage.path)
                .with_context(|| format!("Failed to open store at {}", config.storage.path))?;
            tracing::info!("Using RocksDB store at {}", config.storage.path);
            Ok(Arc::new(store))
        }
        "memory" => {
            tracing::warn!("Using in-memory store, nothing will be persisted");
            Ok(Arc::new(MemoryKvStore::new()))
        }
        other => anyhow::bail!("Unsupported storage backend: {}", other),
    }
}

fn open_device(config: &ConfigFile) -> Result<Arc<dyn LedgerDevice>> {
    match config.ledger.emulated_seed()? {
        Some(seed) => {
            let device = EmulatedLedger::from_seed(&seed).context("Invalid emulated ledger seed")?;
            device.set_auto_approve(config.ledger.auto_approve);
            tracing::info!("Using {}", device.description());
            Ok(Arc::new(device))
        }
        None => {
            tracing::warn!("No ledger device configured");
            Ok(Arc::new(DisconnectedLedger))
        }
    }
}
