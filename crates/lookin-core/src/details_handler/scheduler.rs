use std::{panic::AssertUnwindSafe, sync::Arc};

use futures_util::FutureExt;
use tokio::{sync::mpsc, time::timeout};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::{
    DetailsConfig, FetchError, Fetcher,
    messages::{DetailsCallback, SchedulerCommand, SchedulerSnapshot, SchedulerStats, TaskResolution},
    run::{Resolved, Run, Step},
};
use crate::{ItemId, Package, PackageId};

/// State owned by the coordinator task. Only `scheduler_loop` touches it.
struct Coordinator<F: Fetcher> {
    fetcher: Arc<F>,
    config: DetailsConfig,
    generation: u64,
    run: Option<Run<F::Detail>>,
    stats: SchedulerStats,
    resolved_tx: mpsc::UnboundedSender<TaskResolution<F::Detail>>,
    tracker: TaskTracker,
}

pub(crate) async fn scheduler_loop<F: Fetcher>(
    fetcher: Arc<F>,
    config: DetailsConfig,
    mut cmd_rx: mpsc::Receiver<SchedulerCommand<F::Detail>>,
) {
    let (resolved_tx, mut resolved_rx) = mpsc::unbounded_channel();
    let tracker = TaskTracker::new();

    let mut coordinator = Coordinator {
        fetcher,
        config,
        generation: 0,
        run: None,
        stats: SchedulerStats::default(),
        resolved_tx,
        tracker: tracker.clone(),
    };

    info!("details scheduler started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SchedulerCommand::Start { packages, callback }) => {
                        coordinator.start(packages, callback);
                    }

                    Some(SchedulerCommand::BringForward { packages }) => {
                        coordinator.bring_forward(packages);
                    }

                    Some(SchedulerCommand::Snapshot { reply }) => {
                        let _ = reply.send(coordinator.snapshot());
                    }

                    Some(SchedulerCommand::Shutdown) | None => break,
                }
            }

            Some(resolution) = resolved_rx.recv() => {
                coordinator.on_resolution(resolution);
            }
        }
    }

    coordinator.abandon_live_run();
    let grace = coordinator.config.shutdown_grace();
    drop(coordinator);

    tracker.close();
    debug!(outstanding = tracker.len(), ?grace, "waiting for outstanding fetches");
    if timeout(grace, tracker.wait()).await.is_err() {
        warn!(outstanding = tracker.len(), "fetches still pending after shutdown grace, leaving them behind");
    }

    info!("details scheduler exited");
}

impl<F: Fetcher> Coordinator<F> {
    fn start(&mut self, packages: Vec<Package>, callback: DetailsCallback<F::Detail>) {
        self.generation += 1;
        self.abandon_live_run();

        info!(
            generation = self.generation,
            packages = packages.len(),
            "starting details run"
        );

        self.stats.runs_started += 1;
        self.run = Some(Run::new(self.generation, packages, callback));
        self.advance();
    }

    fn bring_forward(&mut self, packages: Vec<Package>) {
        if packages.is_empty() {
            return;
        }

        let Some(run) = self.run.as_mut() else {
            debug!(packages = packages.len(), "no live run, ignoring bring forward");
            return;
        };

        let promoted = run.bring_forward(packages);
        debug!(generation = run.generation(), promoted, "packages brought forward");
    }

    fn on_resolution(&mut self, resolution: TaskResolution<F::Detail>) {
        let TaskResolution {
            generation,
            package_id,
            slot,
            item_id,
            result,
        } = resolution;

        if let Err(ref error) = result {
            warn!(generation, %item_id, %error, "detail fetch failed");
        }

        let Some(run) = self.run.as_mut().filter(|run| run.generation() == generation) else {
            self.stats.stale_resolutions += 1;
            debug!(generation, live = self.generation, %item_id, "discarding resolution from retired run");
            return;
        };

        match run.resolve(&package_id, slot, result) {
            Ok(Resolved::Pending) => {}

            Ok(Resolved::PackageSettled) => {
                debug!(generation, %package_id, "package settled");
                self.advance();
            }

            Ok(Resolved::Failed { cancelled }) => {
                self.stats.tasks_cancelled += cancelled;
                self.finish();
            }

            Ok(Resolved::Stale) => {
                self.stats.stale_resolutions += 1;
                warn!(generation, %package_id, slot, %item_id, "resolution does not match an in-flight task");
            }

            Err(transition) => {
                error!(generation, %item_id, %transition, "task transition rejected");
            }
        }
    }

    /// Dispatches the next package of the live run, or finishes it when none remain.
    fn advance(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let generation = run.generation();

        match run.next_step() {
            Ok(Step::Dispatch {
                package_id,
                index,
                requests,
            }) => {
                debug!(generation, %package_id, index, tasks = requests.len(), "dispatching package");
                self.dispatch(generation, package_id, requests);
            }

            Ok(Step::Exhausted) => self.finish(),

            Err(transition) => {
                error!(generation, %transition, "cannot dispatch package, dropping run");
                self.abandon_live_run();
            }
        }
    }

    fn dispatch(&mut self, generation: u64, package_id: PackageId, requests: Vec<(usize, ItemId)>) {
        for (slot, item_id) in requests {
            let fetcher = &self.fetcher;
            let fetch = match std::panic::catch_unwind(AssertUnwindSafe(|| fetcher.fetch_detail(item_id))) {
                Ok(fetch) => fetch,
                Err(_) => futures_util::future::err::<F::Detail, _>(FetchError::new(item_id, "fetch panicked")).boxed(),
            };
            let resolved_tx = self.resolved_tx.clone();
            let package_id = package_id.clone();

            self.tracker.spawn(async move {
                let result = match AssertUnwindSafe(fetch).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::new(item_id, "fetch panicked")),
                };
                // the coordinator may already be gone
                let _ = resolved_tx.send(TaskResolution {
                    generation,
                    package_id,
                    slot,
                    item_id,
                    result,
                });
            });

            self.stats.tasks_dispatched += 1;
        }
    }

    fn finish(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        let generation = run.generation();

        if run.deliver(self.config.partial_on_failure) {
            self.stats.runs_completed += 1;
            info!(generation, "details run completed");
        } else {
            self.stats.runs_failed += 1;
            info!(generation, "details run failed");
        }
    }

    fn abandon_live_run(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        let generation = run.generation();

        match run.supersede() {
            Ok(cancelled) => {
                self.stats.tasks_cancelled += cancelled;
                self.stats.runs_superseded += 1;
                info!(generation, cancelled, "details run superseded");
            }
            Err(transition) => {
                error!(generation, %transition, "failed to cancel superseded run");
            }
        }
    }

    fn snapshot(&self) -> SchedulerSnapshot {
        let run = self.run.as_ref();

        SchedulerSnapshot {
            generation: self.generation,
            live: run.is_some(),
            current_package: run.and_then(Run::current_package).cloned(),
            queued_packages: run
                .map(|run| run.queued_packages().cloned().collect())
                .unwrap_or_default(),
            in_flight: run.map_or(0, Run::in_flight),
            stats: self.stats.clone(),
        }
    }
}
