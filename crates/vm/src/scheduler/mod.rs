mod task;

pub use task::TaskId;
pub(crate) use task::{Registration, Task, WaitSet};

use crate::{Completion, ExecutionState, FutureId, VMFuture};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use itertools::Itertools;
use log::{debug, error, trace, warn};
use quill_core::{VMError, Value};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

type Waiters = Arc<Vec<Arc<Registration>>>;

const CONTENTION_WARNING: u64 = 64;

/// Counters describing scheduler activity since creation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub suspended: u64,
    pub resumed: u64,
    pub completed: u64,
    /// Waiter list updates that lost a race and were retried
    pub retries: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    suspended: AtomicU64,
    resumed: AtomicU64,
    completed: AtomicU64,
    retries: AtomicU64,
}

struct SchedulerState {
    handle: Handle,
    waiters: DashMap<FutureId, Waiters>,
    counters: Counters,
}

/// Runs tasks on a bounded worker pool and resumes suspended tasks once everything they
/// wait on has settled.
///
/// A task that suspends is parked: one registration per awaited future is appended to that
/// future's waiter list. Settling a future through [`Scheduler::complete`] fires its waiters,
/// and the registration that fires last resubmits the task. A parked-on future also remembers
/// the scheduler, so settling it directly through [`VMFuture::settle`] wakes the same way.
/// Registering re-checks the future afterwards, a settlement racing with registration
/// therefore still wakes the task.
#[derive(Clone)]
pub struct Scheduler(Arc<SchedulerState>);

impl Debug for Scheduler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("parked", &self.0.waiters.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Scheduler {
    pub(crate) fn new(handle: Handle) -> Self {
        Scheduler(Arc::new(SchedulerState {
            handle,
            waiters: DashMap::new(),
            counters: Counters::default(),
        }))
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.0.counters;
        SchedulerStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            suspended: c.suspended.load(Ordering::Relaxed),
            resumed: c.resumed.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
        }
    }

    /// Futures that currently have at least one parked waiter.
    pub fn parked_futures(&self) -> usize {
        self.0.waiters.len()
    }

    /// Schedules `state`, its final result settles the returned blocking future.
    pub fn submit(&self, state: ExecutionState) -> VMFuture {
        let result = VMFuture::blocking();
        self.submit_with(state, result.clone());
        result
    }

    pub(crate) fn submit_with(&self, state: ExecutionState, result: VMFuture) {
        let task = Arc::new(Task::new(state, result));
        self.0.counters.submitted.fetch_add(1, Ordering::Relaxed);
        trace!("submitting {} for {}", task.id, task.result.id());
        self.spawn(task);
    }

    /// Continues a state that suspended on `futures` while running inline, its final result
    /// settles `result`.
    pub(crate) fn adopt(&self, state: ExecutionState, result: VMFuture, futures: Vec<VMFuture>) {
        let task = Arc::new(Task::new(state, result));
        self.0.counters.submitted.fetch_add(1, Ordering::Relaxed);
        debug!("{} continues inline state for {} as a task", task.id, task.result.id());
        self.park(task, futures);
    }

    /// Settles `future` and resumes every task parked on it.
    pub fn complete(&self, future: &VMFuture, result: Result<Value, VMError>) -> Result<(), VMError> {
        future.settle(result)?;
        self.wake(future.id());
        Ok(())
    }

    fn spawn(&self, task: Arc<Task>) {
        let scheduler = self.clone();
        self.0.handle.spawn(async move { scheduler.run_task(task) });
    }

    fn run_task(&self, task: Arc<Task>) {
        match task.resume() {
            Ok(Completion::Done(v)) => self.finish(&task, Ok(v)),
            Ok(Completion::Suspended(futures)) => self.park(task, futures),
            Err(e) => {
                if e.is_abort() {
                    debug!("{} aborted", task.id);
                } else {
                    debug!("{} failed: {e}", task.id);
                }
                self.finish(&task, Err(e))
            }
        }
    }

    fn finish(&self, task: &Task, result: Result<Value, VMError>) {
        if matches!(task.result.poll(), Some(Err(e)) if e.is_abort()) {
            debug!("{} finished after {} was aborted", task.id, task.result.id());
            return;
        }
        self.0.counters.completed.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = task.result.settle(result) {
            error!("{} settled {} twice: {e}", task.id, task.result.id());
            panic!("scheduler bookkeeping is corrupt, {} settled twice", task.result.id());
        }
        self.wake(task.result.id());
    }

    fn park(&self, task: Arc<Task>, futures: Vec<VMFuture>) {
        let futures: Vec<_> = futures.into_iter().unique_by(|f| f.id()).collect();
        self.0.counters.suspended.fetch_add(1, Ordering::Relaxed);
        if futures.is_empty() {
            warn!("{} suspended without waiting on anything", task.id);
            self.resubmit(task);
            return;
        }
        trace!(
            "parking {} on {}",
            task.id,
            futures.iter().map(|f| f.id()).join(", ")
        );
        let wait = Arc::new(WaitSet::new(task, futures.len()));
        for future in &futures {
            self.register(future.id(), Arc::new(Registration::new(wait.clone())));
            future.watch(self);
            fence(Ordering::SeqCst);
            if future.is_settled() {
                self.wake(future.id());
            }
        }
    }

    /// Appends to the waiter list of `id` by compare-and-swap on the list snapshot.
    fn register(&self, id: FutureId, registration: Arc<Registration>) {
        let mut attempts = 0;
        loop {
            let current = self.0.waiters.get(&id).map(|w| w.value().clone());
            let mut next = current.as_deref().cloned().unwrap_or_default();
            next.push(registration.clone());
            let next = Arc::new(next);

            let swapped = match self.0.waiters.entry(id) {
                Entry::Occupied(mut e) => match &current {
                    Some(c) if Arc::ptr_eq(c, e.get()) => {
                        e.insert(next);
                        true
                    }
                    _ => false,
                },
                Entry::Vacant(e) if current.is_none() => {
                    e.insert(next);
                    true
                }
                Entry::Vacant(_) => false,
            };
            if swapped {
                break;
            }
            attempts += 1;
            self.0.counters.retries.fetch_add(1, Ordering::Relaxed);
            if attempts % CONTENTION_WARNING == 0 {
                warn!("waiter list of {id} contended, {attempts} retries");
            }
        }
    }

    /// Fires every registration parked on `id`.
    pub(crate) fn wake(&self, id: FutureId) {
        let Some((_, waiters)) = self.0.waiters.remove(&id) else {
            return;
        };
        for registration in waiters.iter() {
            if let Some(task) = registration.fire() {
                self.resubmit(task);
            }
        }
    }

    fn resubmit(&self, task: Arc<Task>) {
        self.0.counters.resumed.fetch_add(1, Ordering::Relaxed);
        trace!("resuming {}", task.id);
        self.spawn(task);
    }
}
