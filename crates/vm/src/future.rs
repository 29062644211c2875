use crate::Scheduler;
use log::trace;
use quill_core::{VMError, VMObject, Value};
use std::any::Any;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

static NEXT_FUTURE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FutureId(u64);

impl Display for FutureId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "f{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FutureKind {
    /// A thread outside the scheduler may park on `get` until settled
    Blocking,
    /// Poll-only, used as a suspension handle
    NonBlocking,
}

/// A settle-once result slot.
///
/// Settling twice is rejected with [`VMError::IllegalState`], except when the second
/// settlement is the abort sentinel, which is dropped silently. Once a task has parked on a
/// future, settling it by any path resumes the task.
#[derive(Clone)]
pub struct VMFuture(Arc<FutureState>);

struct FutureState {
    id: FutureId,
    kind: FutureKind,
    result: OnceLock<Result<Value, VMError>>,
    lock: Mutex<()>,
    ready: Condvar,
    /// Scheduler with tasks parked on this future
    watcher: OnceLock<Scheduler>,
}

impl VMFuture {
    fn with_kind(kind: FutureKind) -> Self {
        let id = FutureId(NEXT_FUTURE_ID.fetch_add(1, Ordering::Relaxed));
        VMFuture(Arc::new(FutureState {
            id,
            kind,
            result: OnceLock::new(),
            lock: Mutex::new(()),
            ready: Condvar::new(),
            watcher: OnceLock::new(),
        }))
    }

    pub fn blocking() -> Self {
        Self::with_kind(FutureKind::Blocking)
    }

    pub fn pending() -> Self {
        Self::with_kind(FutureKind::NonBlocking)
    }

    /// An already settled non-blocking future.
    pub fn ready(value: Value) -> Self {
        let f = Self::pending();
        let _ = f.0.result.set(Ok(value));
        f
    }

    #[inline]
    pub fn id(&self) -> FutureId {
        self.0.id
    }

    #[inline]
    pub fn kind(&self) -> FutureKind {
        self.0.kind
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.0.result.get().is_some()
    }

    /// The settled result, if any. Every call after settlement yields the same result.
    #[inline]
    pub fn poll(&self) -> Option<Result<Value, VMError>> {
        self.0.result.get().cloned()
    }

    pub fn set_result(&self, value: Value) -> Result<(), VMError> {
        self.settle(Ok(value))
    }

    pub fn set_failure(&self, error: VMError) -> Result<(), VMError> {
        self.settle(Err(error))
    }

    pub fn settle(&self, result: Result<Value, VMError>) -> Result<(), VMError> {
        let abort = matches!(&result, Err(e) if e.is_abort());
        match self.0.result.set(result) {
            Ok(()) => {
                trace!("settled {}", self.0.id);
                if self.0.kind == FutureKind::Blocking {
                    let _guard = self.0.lock.lock().unwrap_or_else(PoisonError::into_inner);
                    self.0.ready.notify_all();
                }
                // pairs with the fence in `Scheduler::park`
                fence(Ordering::SeqCst);
                if let Some(scheduler) = self.0.watcher.get() {
                    scheduler.wake(self.0.id);
                }
                Ok(())
            }
            Err(_) if abort => {
                trace!("ignoring abort of already settled {}", self.0.id);
                Ok(())
            }
            Err(rejected) => Err(VMError::IllegalState(format!(
                "{} is already settled, rejected {rejected:?}",
                self.0.id
            ))),
        }
    }

    /// Routes later settlements to `scheduler`. The first scheduler to watch a future keeps it.
    pub(crate) fn watch(&self, scheduler: &Scheduler) {
        let _ = self.0.watcher.set(scheduler.clone());
    }

    /// Parks the calling thread until settled. Only blocking futures support this, worker
    /// threads must never call it.
    pub fn get(&self, timeout: Option<Duration>) -> Result<Value, VMError> {
        if self.0.kind == FutureKind::NonBlocking {
            return Err(VMError::UnsupportedOperation(format!(
                "{} is non-blocking, poll it instead of calling get",
                self.0.id
            )));
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.0.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = self.0.result.get() {
                return result.clone();
            }
            guard = match deadline {
                None => self
                    .0
                    .ready
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(VMError::TimeoutError(format!(
                            "{} not settled after {:?}",
                            self.0.id,
                            timeout.unwrap_or_default()
                        )));
                    }
                    self.0
                        .ready
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

impl PartialEq for VMFuture {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for VMFuture {}

impl Debug for VMFuture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VMFuture")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .field("result", &self.0.result.get())
            .finish()
    }
}

impl Display for VMFuture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let status = if self.is_settled() { "settled" } else { "pending" };
        write!(f, "<future {} {status}>", self.0.id)
    }
}

impl VMObject for VMFuture {
    fn type_name(&self) -> &'static str {
        "Future"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test(unsupported = test)]
    fn settled_reads_are_idempotent() {
        let f = VMFuture::pending();
        assert_eq!(f.poll(), None);
        f.set_result(5.into()).unwrap();
        for _ in 0..3 {
            assert_eq!(f.poll(), Some(Ok(5.into())));
        }
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn double_settle_is_rejected() {
        let f = VMFuture::pending();
        f.set_result(1.into()).unwrap();
        let second = f.set_result(2.into());
        assert!(matches!(second, Err(VMError::IllegalState(_))));
        let failure = f.set_failure(VMError::RuntimeError("late".into()));
        assert!(matches!(failure, Err(VMError::IllegalState(_))));
        assert_eq!(f.poll(), Some(Ok(1.into())));
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn abort_after_settle_is_swallowed() {
        let f = VMFuture::pending();
        f.set_result(1.into()).unwrap();
        assert_eq!(f.set_failure(VMError::Aborted), Ok(()));
        assert_eq!(f.poll(), Some(Ok(1.into())));

        let aborted = VMFuture::pending();
        aborted.set_failure(VMError::Aborted).unwrap();
        assert!(aborted.poll().unwrap().unwrap_err().is_abort());
    }

    #[test]
    fn blocking_get_waits_for_other_thread() {
        let f = VMFuture::blocking();
        let setter = f.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set_result("done".into()).unwrap();
        });
        assert_eq!(f.get(None), Ok("done".into()));
        t.join().unwrap();
    }

    #[test]
    fn blocking_get_times_out() {
        let f = VMFuture::blocking();
        let r = f.get(Some(Duration::from_millis(10)));
        assert!(matches!(r, Err(VMError::TimeoutError(_))));
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn non_blocking_get_is_unsupported() {
        let f = VMFuture::ready(1.into());
        assert!(matches!(
            f.get(None),
            Err(VMError::UnsupportedOperation(_))
        ));
    }
}
