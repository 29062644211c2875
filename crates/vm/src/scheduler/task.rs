use crate::{Completion, ExecutionState, VMFuture};
use quill_core::VMError;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A continuation: an execution state plus the future its final result settles.
#[derive(Debug)]
pub(crate) struct Task {
    pub(crate) id: TaskId,
    state: Mutex<ExecutionState>,
    pub(crate) result: VMFuture,
}

impl Task {
    pub(crate) fn new(state: ExecutionState, result: VMFuture) -> Self {
        Task {
            id: TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)),
            state: Mutex::new(state),
            result,
        }
    }

    /// Runs until completion or the next suspension. Only ever entered by one worker at a
    /// time, a task is resubmitted only after every future it waits on fired.
    pub(crate) fn resume(&self) -> Result<Completion, VMError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.run()
    }
}

/// The futures one suspension waits on, resubmitting the task when the last one fires.
#[derive(Debug)]
pub(crate) struct WaitSet {
    pub(crate) task: Arc<Task>,
    remaining: AtomicUsize,
}

impl WaitSet {
    pub(crate) fn new(task: Arc<Task>, futures: usize) -> Self {
        WaitSet {
            task,
            remaining: AtomicUsize::new(futures),
        }
    }

    /// True for exactly one caller, the one that fired the last outstanding future.
    fn count_down(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

/// One entry in a future's waiter list.
#[derive(Debug)]
pub(crate) struct Registration {
    fired: AtomicBool,
    pub(crate) wait: Arc<WaitSet>,
}

impl Registration {
    pub(crate) fn new(wait: Arc<WaitSet>) -> Self {
        Registration {
            fired: AtomicBool::new(false),
            wait,
        }
    }

    /// Marks this registration fired, returning the task when it is now runnable.
    /// Repeated calls are no-ops.
    pub(crate) fn fire(&self) -> Option<Arc<Task>> {
        if self.fired.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.wait.count_down().then(|| self.wait.task.clone())
    }
}
