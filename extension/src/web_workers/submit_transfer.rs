// Transfer worker: an isolated task that owns the SDK and signs transfers
// one at a time. The host only sees the request and signal channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use super::session::{SessionStatus, SigningSession};
use super::types::{SubmitTransferMessageData, WorkerSignal};
use crate::sdk::Sdk;
use crate::storage::PrefixedStore;

const REQUEST_CAPACITY: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("transfer worker has not signalled INIT yet")]
    NotInitialized,

    #[error("transfer worker has terminated")]
    Terminated,
}

impl WorkerError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkerError::NotInitialized => "worker-not-initialized",
            WorkerError::Terminated => "worker-terminated",
        }
    }
}

/// A request as queued for the worker. Submitted requests carry their own
/// reply channel; posted ones report on the shared signal channel.
struct Job {
    request: SubmitTransferMessageData,
    reply: Option<oneshot::Sender<WorkerSignal>>,
}

/// Host-side handle to a running transfer worker.
pub struct TransferWorker {
    requests: StdMutex<Option<mpsc::Sender<Job>>>,
    signals: Mutex<mpsc::UnboundedReceiver<WorkerSignal>>,
    status: watch::Receiver<SessionStatus>,
    // Set by the worker right before it emits INIT.
    initialized: Arc<AtomicBool>,
    handle: StdMutex<Option<JoinHandle<()>>>,
}

/// Start a worker owning `sdk`. Its persisted state is read from `store`.
pub fn spawn<S: Sdk>(sdk: S, store: PrefixedStore) -> TransferWorker {
    let (request_tx, request_rx) = mpsc::channel(REQUEST_CAPACITY);
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(SessionStatus::Uninitialized);
    let initialized = Arc::new(AtomicBool::new(false));

    let session = SigningSession::new(sdk, status_tx);
    let handle = tokio::spawn(run(
        session,
        store,
        request_rx,
        signal_tx,
        initialized.clone(),
    ));

    TransferWorker {
        requests: StdMutex::new(Some(request_tx)),
        signals: Mutex::new(signal_rx),
        status: status_rx,
        initialized,
        handle: StdMutex::new(Some(handle)),
    }
}

async fn run<S: Sdk>(
    mut session: SigningSession<S>,
    store: PrefixedStore,
    mut requests: mpsc::Receiver<Job>,
    signals: mpsc::UnboundedSender<WorkerSignal>,
    initialized: Arc<AtomicBool>,
) {
    tracing::info!("Transfer worker starting");
    if let Err(e) = session.initialize(&store).await {
        tracing::error!("Transfer worker failed to initialize: {:#}", e);
        session.terminate();
        return;
    }

    let mut dropped = 0usize;
    while requests.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        tracing::warn!("Dropped {} request(s) received before INIT", dropped);
    }

    initialized.store(true, Ordering::SeqCst);
    session.mark_ready();
    if signals.send(WorkerSignal::Init).is_err() {
        tracing::warn!("Transfer worker host is gone");
        session.terminate();
        return;
    }
    tracing::info!(
        "Transfer worker ready (restored state: {})",
        session.restored()
    );

    while let Some(job) = requests.recv().await {
        let signal = session.sign(job.request).await;
        match job.reply {
            Some(reply) => {
                if reply.send(signal).is_err() {
                    tracing::debug!("Submitter went away before {} was delivered", signal);
                }
            }
            None => {
                if signals.send(signal).is_err() {
                    tracing::warn!("Transfer worker host is gone");
                    break;
                }
            }
        }
    }

    session.terminate();
    tracing::info!("Transfer worker terminated");
}

impl TransferWorker {
    /// Wait until the worker has emitted `INIT`.
    pub async fn wait_for_init(&self) -> Result<(), WorkerError> {
        let mut status = self.status.clone();
        // The final status stays readable after the worker is gone.
        let _ = status
            .wait_for(|s| !matches!(s, SessionStatus::Uninitialized | SessionStatus::Initializing))
            .await;
        if self.is_initialized() {
            Ok(())
        } else {
            Err(WorkerError::Terminated)
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Submit one transfer and wait for its own terminal signal.
    ///
    /// Dropping the returned future abandons only this request's result.
    pub async fn submit(
        &self,
        request: SubmitTransferMessageData,
    ) -> Result<WorkerSignal, WorkerError> {
        if !self.is_initialized() {
            return Err(WorkerError::NotInitialized);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.enqueue(Job {
            request,
            reply: Some(reply_tx),
        })
        .await?;
        reply_rx.await.map_err(|_| WorkerError::Terminated)
    }

    /// Hand a request to the worker without waiting for its signal. The
    /// signal arrives through [`TransferWorker::recv_signal`].
    ///
    /// Requests posted before `INIT` are discarded by the worker.
    pub async fn post(&self, request: SubmitTransferMessageData) -> Result<(), WorkerError> {
        self.enqueue(Job {
            request,
            reply: None,
        })
        .await
    }

    /// Next signal on the shared channel (`INIT` and results of posted
    /// requests), `None` once the worker has terminated.
    pub async fn recv_signal(&self) -> Option<WorkerSignal> {
        self.signals.lock().await.recv().await
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Close the request channel and wait for the worker to finish whatever
    /// it has queued.
    pub async fn shutdown(&self) {
        let sender = self.requests.lock().ok().and_then(|mut s| s.take());
        drop(sender);

        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Transfer worker panicked: {}", e);
            }
        }
    }

    async fn enqueue(&self, job: Job) -> Result<(), WorkerError> {
        let sender = self
            .requests
            .lock()
            .map_err(|_| WorkerError::Terminated)?
            .clone()
            .ok_or(WorkerError::Terminated)?;
        sender.send(job).await.map_err(|_| WorkerError::Terminated)
    }
}
