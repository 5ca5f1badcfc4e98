use std::{fmt, sync::Arc};

use tokio::{
    sync::{Mutex, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info};

use super::{
    DetailsConfig, FetchError, Fetcher, HandlerError,
    messages::{SchedulerCommand, SchedulerSnapshot},
    scheduler::scheduler_loop,
};
use crate::Package;

/// Result handed to the caller of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome<D> {
    /// Details in package order, then submission order within each package.
    /// On failure, whatever was collected before it (or nothing, depending on configuration).
    pub details: Vec<D>,
    /// The first fetch failure of the run.
    pub error: Option<FetchError>,
}

impl<D> RunOutcome<D> {
    /// The details on success, the failure otherwise.
    pub fn into_result(self) -> Result<Vec<D>, FetchError> {
        match self.error {
            None => Ok(self.details),
            Some(error) => Err(error),
        }
    }
}

/// Pending outcome of a run started with [`DetailsHandler::start_awaitable`].
pub struct RunTicket<D> {
    rx: oneshot::Receiver<RunOutcome<D>>,
}

impl<D> RunTicket<D> {
    /// Waits for the run to end. Resolves to `None` if the run was superseded
    /// by a later `start` or the handler shut down first.
    pub async fn wait(self) -> Option<RunOutcome<D>> {
        self.rx.await.ok()
    }
}

impl<D> fmt::Debug for RunTicket<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunTicket").finish_non_exhaustive()
    }
}

/// Handle to the coordinator that fetches item details package by package.
///
/// Clones share the same coordinator. At most one run is live at a time:
/// [`start`](Self::start) supersedes whatever was running before, and the
/// superseded run's callback is dropped without being called.
pub struct DetailsHandler<D> {
    cmd_tx: mpsc::Sender<SchedulerCommand<D>>,
    scheduler_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<D> Clone for DetailsHandler<D> {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            scheduler_handle: self.scheduler_handle.clone(),
        }
    }
}

impl<D> fmt::Debug for DetailsHandler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetailsHandler")
            .field("closed", &self.cmd_tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl<D: Send + 'static> DetailsHandler<D> {
    /// Spawns the coordinator onto the current tokio runtime.
    pub fn spawn<F>(fetcher: F, config: DetailsConfig) -> Self
    where
        F: Fetcher<Detail = D>,
    {
        info!(?config, "initializing details handler");

        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer.max(1));
        let scheduler_handle = tokio::spawn(scheduler_loop(Arc::new(fetcher), config, cmd_rx));

        Self {
            cmd_tx,
            scheduler_handle: Arc::new(Mutex::new(Some(scheduler_handle))),
        }
    }

    /// Starts a new run over `packages`, superseding the live one.
    ///
    /// `callback` is invoked at most once, on the coordinator task, when the run
    /// completes or hits its first fetch failure. It is never invoked if the
    /// run is superseded first.
    pub async fn start<C>(&self, packages: Vec<Package>, callback: C) -> Result<(), HandlerError>
    where
        C: FnOnce(Vec<D>, Option<FetchError>) + Send + 'static,
    {
        debug!(packages = packages.len(), "submitting details run");

        self.send(SchedulerCommand::Start {
            packages,
            callback: Box::new(callback),
        })
        .await
    }

    /// Like [`start`](Self::start), delivering the outcome through a [`RunTicket`].
    pub async fn start_awaitable(&self, packages: Vec<Package>) -> Result<RunTicket<D>, HandlerError> {
        let (tx, rx) = oneshot::channel();

        self.start(packages, move |details, error| {
            let _ = tx.send(RunOutcome { details, error });
        })
        .await?;

        Ok(RunTicket { rx })
    }

    /// Moves `packages` ahead of the live run's queue without touching work in flight.
    ///
    /// Does nothing when no run is live.
    pub async fn bring_forward(&self, packages: Vec<Package>) -> Result<(), HandlerError> {
        debug!(packages = packages.len(), "submitting bring forward");

        self.send(SchedulerCommand::BringForward { packages }).await
    }

    /// Current queue and run state, after every previously sent command has been applied.
    pub async fn snapshot(&self) -> Result<SchedulerSnapshot, HandlerError> {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| HandlerError::Closed)
    }

    /// Stops the coordinator and waits for in-flight fetches to settle, at most
    /// [`DetailsConfig::shutdown_grace_ms`]; slower fetches are left running.
    ///
    /// A live run is dropped without calling back. Later calls on any clone
    /// return [`HandlerError::Closed`].
    pub async fn shutdown(&self) {
        info!("details handler shutdown initiated");

        let _ = self.cmd_tx.send(SchedulerCommand::Shutdown).await;

        if let Some(handle) = self.scheduler_handle.lock().await.take() {
            let _ = handle.await;
        }

        info!("details handler shutdown complete");
    }

    async fn send(&self, cmd: SchedulerCommand<D>) -> Result<(), HandlerError> {
        self.cmd_tx.send(cmd).await.map_err(|_| HandlerError::Closed)
    }
}
