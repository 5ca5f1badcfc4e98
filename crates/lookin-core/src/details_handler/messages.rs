use serde::Serialize;
use tokio::sync::oneshot;

use super::FetchError;
use crate::{ItemId, Package, PackageId};

/// Receives a run's details, or the details gathered so far plus the failure.
pub(crate) type DetailsCallback<D> = Box<dyn FnOnce(Vec<D>, Option<FetchError>) + Send + 'static>;

pub(crate) enum SchedulerCommand<D> {
    Start {
        packages: Vec<Package>,
        callback: DetailsCallback<D>,
    },
    BringForward {
        packages: Vec<Package>,
    },
    Snapshot {
        reply: oneshot::Sender<SchedulerSnapshot>,
    },
    Shutdown,
}

/// Outcome of one fetch, tagged with the run and slot it was dispatched for.
#[derive(Debug)]
pub(crate) struct TaskResolution<D> {
    pub(crate) generation: u64,
    pub(crate) package_id: PackageId,
    pub(crate) slot: usize,
    pub(crate) item_id: ItemId,
    pub(crate) result: Result<D, FetchError>,
}

/// Counters accumulated over the lifetime of a handler.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Runs begun by `start`.
    pub runs_started: u64,
    /// Runs that delivered every detail.
    pub runs_completed: u64,
    /// Runs that ended on a fetch failure.
    pub runs_failed: u64,
    /// Runs abandoned because a newer run started.
    pub runs_superseded: u64,
    /// Tasks handed to the fetcher.
    pub tasks_dispatched: u64,
    /// Tasks cancelled by a failure or a supersession.
    pub tasks_cancelled: u64,
    /// Fetch resolutions ignored because their run was no longer live.
    pub stale_resolutions: u64,
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    /// Generation of the most recent `start`; 0 before the first.
    pub generation: u64,
    /// Whether a run is live.
    pub live: bool,
    /// Package whose tasks are currently dispatched.
    pub current_package: Option<PackageId>,
    /// Packages waiting to be dispatched, head first.
    pub queued_packages: Vec<PackageId>,
    /// Tasks of the current package still awaiting the fetcher.
    pub in_flight: usize,
    /// Lifetime counters.
    pub stats: SchedulerStats,
}
