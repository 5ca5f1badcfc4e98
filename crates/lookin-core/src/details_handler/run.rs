use std::collections::{HashSet, VecDeque};

use tracing::debug;

use super::{FetchError, messages::DetailsCallback};
use crate::{ItemId, Package, PackageId, Task, TaskState, TaskTransitionError, sort_by_priority};

/// The package whose tasks are currently with the fetcher.
struct ActivePackage<D> {
    id: PackageId,
    tasks: Vec<Task>,
    // resolved details waiting for their predecessors
    slots: Vec<Option<D>>,
    emitted: usize,
}

impl<D> ActivePackage<D> {
    fn is_settled(&self) -> bool {
        self.tasks.iter().all(|task| task.state.is_terminal())
    }

    fn in_flight(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.state == TaskState::InFlight)
            .count()
    }
}

/// What the coordinator has to do after asking a run for more work.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Dispatch {
        package_id: PackageId,
        index: i64,
        requests: Vec<(usize, ItemId)>,
    },
    Exhausted,
}

/// Effect of applying one fetch resolution to a run.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Resolved {
    /// Siblings in the current package are still in flight.
    Pending,
    /// Every task of the current package has resolved.
    PackageSettled,
    /// First failure of the run; outstanding tasks were cancelled.
    Failed { cancelled: u64 },
    /// The resolution does not match any in-flight task of this run.
    Stale,
}

/// One execution started by `start`, tagged with its generation.
pub(crate) struct Run<D> {
    generation: u64,
    queue: VecDeque<Package>,
    current: Option<ActivePackage<D>>,
    collected: Vec<D>,
    first_error: Option<FetchError>,
    callback: DetailsCallback<D>,
}

impl<D> Run<D> {
    pub(crate) fn new(generation: u64, packages: Vec<Package>, callback: DetailsCallback<D>) -> Self {
        Self {
            generation,
            queue: sort_by_priority(packages).into(),
            current: None,
            collected: Vec::new(),
            first_error: None,
            callback,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn current_package(&self) -> Option<&PackageId> {
        self.current.as_ref().map(|active| &active.id)
    }

    pub(crate) fn queued_packages(&self) -> impl Iterator<Item = &PackageId> + '_ {
        self.queue.iter().map(Package::id)
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.current.as_ref().map_or(0, ActivePackage::in_flight)
    }

    /// Pops the next non-empty package off the queue and marks its tasks in flight.
    ///
    /// Must only be called while no package is active.
    pub(crate) fn next_step(&mut self) -> Result<Step, TaskTransitionError> {
        while let Some(package) = self.queue.pop_front() {
            let (id, index, mut tasks) = package.into_parts();
            if tasks.is_empty() {
                debug!(generation = self.generation, package_id = %id, index, "skipping empty package");
                continue;
            }

            let mut requests = Vec::with_capacity(tasks.len());
            for (slot, task) in tasks.iter_mut().enumerate() {
                task.dispatch()?;
                requests.push((slot, task.item_id));
            }

            let slots = tasks.iter().map(|_| None).collect();
            self.current = Some(ActivePackage {
                id: id.clone(),
                tasks,
                slots,
                emitted: 0,
            });

            return Ok(Step::Dispatch {
                package_id: id,
                index,
                requests,
            });
        }

        Ok(Step::Exhausted)
    }

    /// Applies the outcome of the task at `slot` of `package_id`.
    pub(crate) fn resolve(
        &mut self,
        package_id: &PackageId,
        slot: usize,
        result: Result<D, FetchError>,
    ) -> Result<Resolved, TaskTransitionError> {
        let Some(active) = self.current.as_mut().filter(|active| &active.id == package_id) else {
            return Ok(Resolved::Stale);
        };
        let Some(task) = active.tasks.get_mut(slot) else {
            return Ok(Resolved::Stale);
        };
        if task.state != TaskState::InFlight {
            return Ok(Resolved::Stale);
        }

        match result {
            Ok(detail) => {
                task.complete()?;
                active.slots[slot] = Some(detail);

                while let Some(detail) = active.slots.get_mut(active.emitted).and_then(Option::take) {
                    self.collected.push(detail);
                    active.emitted += 1;
                }

                if active.is_settled() {
                    self.current = None;
                    Ok(Resolved::PackageSettled)
                } else {
                    Ok(Resolved::Pending)
                }
            }
            Err(error) => {
                task.fail()?;
                self.first_error = Some(error);
                let cancelled = self.cancel_outstanding()?;
                Ok(Resolved::Failed { cancelled })
            }
        }
    }

    /// Moves `packages` to the head of the queue, keeping their relative order.
    ///
    /// Queued packages are relocated as they are; unknown packages are added as
    /// new work. The package currently in flight is left alone. Returns how many
    /// packages now sit ahead of the previous head.
    pub(crate) fn bring_forward(&mut self, packages: Vec<Package>) -> usize {
        let mut seen = HashSet::new();
        let mut promoted = Vec::with_capacity(packages.len());

        for package in packages {
            if !seen.insert(package.id().clone()) {
                continue;
            }
            if self.current_package() == Some(package.id()) {
                debug!(generation = self.generation, package_id = %package.id(), "package already in flight");
                continue;
            }

            match self.queue.iter().position(|queued| queued.id() == package.id()) {
                Some(position) => promoted.extend(self.queue.remove(position)),
                None => promoted.push(package),
            }
        }

        let count = promoted.len();
        for package in promoted.into_iter().rev() {
            self.queue.push_front(package);
        }
        count
    }

    /// Drops the run without reporting anything to its caller.
    pub(crate) fn supersede(mut self) -> Result<u64, TaskTransitionError> {
        self.cancel_outstanding()
    }

    /// Hands the outcome to the caller. Returns true when the run succeeded.
    pub(crate) fn deliver(self, partial_on_failure: bool) -> bool {
        let Run {
            collected,
            first_error,
            callback,
            ..
        } = self;

        let succeeded = first_error.is_none();
        let details = if succeeded || partial_on_failure {
            collected
        } else {
            Vec::new()
        };

        callback(details, first_error);
        succeeded
    }

    fn cancel_outstanding(&mut self) -> Result<u64, TaskTransitionError> {
        let mut cancelled = 0;

        let current = self.current.iter_mut().flat_map(|active| active.tasks.iter_mut());
        let queued = self.queue.iter_mut().flat_map(|package| package.tasks_mut());
        for task in current.chain(queued) {
            if !task.state.is_terminal() {
                task.cancel()?;
                cancelled += 1;
            }
        }

        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    type Delivered = Arc<Mutex<Vec<(Vec<u64>, Option<FetchError>)>>>;

    fn package(index: i64, items: &[u64]) -> Package {
        Package::new(index, items.iter().copied().map(ItemId::new))
    }

    fn run_with(packages: Vec<Package>) -> (Run<u64>, Delivered) {
        let delivered: Delivered = Arc::default();
        let sink = delivered.clone();
        let run = Run::new(
            1,
            packages,
            Box::new(move |details, error| sink.lock().unwrap().push((details, error))),
        );
        (run, delivered)
    }

    fn dispatched(step: Step) -> (PackageId, Vec<u64>) {
        match step {
            Step::Dispatch {
                package_id,
                requests,
                ..
            } => (package_id, requests.into_iter().map(|(_, id)| id.get()).collect()),
            Step::Exhausted => panic!("expected a dispatch"),
        }
    }

    #[test]
    fn dispatches_packages_by_descending_index() {
        let (mut run, _) = run_with(vec![package(1, &[5, 6]), package(5, &[1, 2]), package(3, &[3, 4])]);

        let (p5, items) = dispatched(run.next_step().unwrap());
        assert_eq!(items, vec![1, 2]);
        assert_eq!(run.in_flight(), 2);

        assert_eq!(run.resolve(&p5, 0, Ok(10)).unwrap(), Resolved::Pending);
        assert_eq!(run.resolve(&p5, 1, Ok(20)).unwrap(), Resolved::PackageSettled);

        let (_, items) = dispatched(run.next_step().unwrap());
        assert_eq!(items, vec![3, 4]);
    }

    #[test]
    fn out_of_order_resolutions_are_collected_in_submission_order() {
        let (mut run, delivered) = run_with(vec![package(2, &[1, 2, 3])]);
        let (id, _) = dispatched(run.next_step().unwrap());

        assert_eq!(run.resolve(&id, 2, Ok(3)).unwrap(), Resolved::Pending);
        assert_eq!(run.resolve(&id, 1, Ok(2)).unwrap(), Resolved::Pending);
        assert!(run.collected.is_empty());
        assert_eq!(run.resolve(&id, 0, Ok(1)).unwrap(), Resolved::PackageSettled);
        assert_eq!(run.next_step().unwrap(), Step::Exhausted);

        assert!(run.deliver(true));
        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.as_slice(), &[(vec![1, 2, 3], None)]);
    }

    #[test]
    fn first_failure_cancels_siblings_and_queued_packages() {
        let (mut run, delivered) = run_with(vec![package(5, &[1, 2]), package(3, &[3, 4]), package(1, &[5, 6])]);

        let (p5, _) = dispatched(run.next_step().unwrap());
        run.resolve(&p5, 0, Ok(1)).unwrap();
        run.resolve(&p5, 1, Ok(2)).unwrap();

        let (p3, _) = dispatched(run.next_step().unwrap());
        let error = FetchError::new(ItemId::new(3), "gone");
        assert_eq!(
            run.resolve(&p3, 0, Err(error.clone())).unwrap(),
            Resolved::Failed { cancelled: 3 }
        );

        // sibling finishing late is ignored
        assert_eq!(run.resolve(&p3, 1, Ok(4)).unwrap(), Resolved::Stale);

        assert!(!run.deliver(true));
        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.as_slice(), &[(vec![1, 2], Some(error))]);
    }

    #[test]
    fn failure_without_partial_results_delivers_nothing() {
        let (mut run, delivered) = run_with(vec![package(1, &[1, 2])]);
        let (id, _) = dispatched(run.next_step().unwrap());

        run.resolve(&id, 0, Ok(1)).unwrap();
        run.resolve(&id, 1, Err(FetchError::new(ItemId::new(2), "boom")))
            .unwrap();

        assert!(!run.deliver(false));
        let delivered = delivered.lock().unwrap();
        assert!(delivered[0].0.is_empty());
        assert!(delivered[0].1.is_some());
    }

    #[test]
    fn bring_forward_relocates_queued_packages_in_input_order() {
        let p5 = package(5, &[1]);
        let p3 = package(3, &[2]);
        let p2 = package(2, &[3]);
        let p1 = package(1, &[4]);
        let (mut run, _) = run_with(vec![p5.clone(), p3.clone(), p2.clone(), p1.clone()]);
        run.next_step().unwrap();

        assert_eq!(run.bring_forward(vec![p1.clone(), p2.clone()]), 2);

        let order: Vec<&PackageId> = run.queued_packages().collect();
        assert_eq!(order, vec![p1.id(), p2.id(), p3.id()]);
        assert_eq!(run.current_package(), Some(p5.id()));
    }

    #[test]
    fn bring_forward_inserts_unknown_packages_and_skips_the_active_one() {
        let p5 = package(5, &[1]);
        let p3 = package(3, &[2]);
        let fresh = package(0, &[9]);
        let (mut run, _) = run_with(vec![p5.clone(), p3.clone()]);
        run.next_step().unwrap();

        assert_eq!(run.bring_forward(vec![p5.clone(), fresh.clone(), fresh.clone()]), 1);

        let order: Vec<&PackageId> = run.queued_packages().collect();
        assert_eq!(order, vec![fresh.id(), p3.id()]);
    }

    #[test]
    fn resolutions_for_other_packages_or_slots_are_stale() {
        let (mut run, _) = run_with(vec![package(1, &[1])]);
        let (id, _) = dispatched(run.next_step().unwrap());

        assert_eq!(run.resolve(&PackageId::new(), 0, Ok(1)).unwrap(), Resolved::Stale);
        assert_eq!(run.resolve(&id, 7, Ok(1)).unwrap(), Resolved::Stale);
        assert_eq!(run.resolve(&id, 0, Ok(1)).unwrap(), Resolved::PackageSettled);
        assert_eq!(run.resolve(&id, 0, Ok(1)).unwrap(), Resolved::Stale);
    }

    #[test]
    fn empty_packages_are_skipped() {
        let (mut run, _) = run_with(vec![package(9, &[]), package(1, &[4])]);

        let (_, items) = dispatched(run.next_step().unwrap());
        assert_eq!(items, vec![4]);
    }

    #[test]
    fn superseded_run_never_calls_back() {
        let (mut run, delivered) = run_with(vec![package(2, &[1, 2]), package(1, &[3])]);
        run.next_step().unwrap();

        assert_eq!(run.supersede().unwrap(), 3);
        assert!(delivered.lock().unwrap().is_empty());
    }
}
