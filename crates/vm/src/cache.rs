use crate::{FutureId, ProgramId, VMFuture};
use crossbeam::queue::SegQueue;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::trace;
use log_derive::logfn;
use quill_core::Value;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CacheTier {
    /// Evicted oldest first once the cache holds more than its capacity
    #[default]
    Bounded,
    /// Never evicted
    Permanent,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallKey {
    program: ProgramId,
    args: Vec<Value>,
}

impl CallKey {
    pub fn new(program: ProgramId, args: Vec<Value>) -> Self {
        CallKey { program, args }
    }
}

fn is_aborted(future: &VMFuture) -> bool {
    matches!(future.poll(), Some(Err(e)) if e.is_abort())
}

/// Memoized call results, keyed by callee and arguments.
///
/// Entries are futures, so a call that is still running is shared by every caller asking
/// for the same key. Failed results stay cached, aborted ones are recomputed. Eviction only
/// ever removes settled entries.
#[derive(Debug)]
pub struct ResultCache {
    permanent: DashMap<CallKey, VMFuture>,
    bounded: DashMap<CallKey, VMFuture>,
    /// Bounded insertions oldest first, the id tells a live entry from a replaced one
    order: SegQueue<(CallKey, FutureId)>,
    capacity: usize,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        ResultCache {
            permanent: DashMap::new(),
            bounded: DashMap::new(),
            order: SegQueue::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.permanent.len() + self.bounded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn peek(&self, key: &CallKey) -> Option<VMFuture> {
        self.permanent
            .get(key)
            .or_else(|| self.bounded.get(key))
            .map(|f| f.value().clone())
    }

    /// The cached future for `key`, or a fresh placeholder handed to `compute` first.
    ///
    /// `compute` runs at most once per placeholder and outside of any map lock, it is
    /// responsible for settling the placeholder.
    pub fn get_result<F>(&self, key: CallKey, tier: CacheTier, compute: F) -> VMFuture
    where
        F: FnOnce(VMFuture),
    {
        if let Some(hit) = self.peek(&key) {
            if !is_aborted(&hit) {
                trace!("cache hit {}", hit.id());
                return hit;
            }
        }

        let map = match tier {
            CacheTier::Bounded => &self.bounded,
            CacheTier::Permanent => &self.permanent,
        };
        let (future, created) = match map.entry(key.clone()) {
            Entry::Occupied(mut e) if is_aborted(e.get()) => {
                let f = VMFuture::pending();
                e.insert(f.clone());
                (f, true)
            }
            Entry::Occupied(e) => (e.get().clone(), false),
            Entry::Vacant(e) => {
                let f = VMFuture::pending();
                e.insert(f.clone());
                (f, true)
            }
        };

        if created {
            trace!("cache miss, computing into {}", future.id());
            if tier == CacheTier::Bounded {
                self.order.push((key, future.id()));
                self.evict();
            }
            compute(future.clone());
        }
        future
    }

    /// Removes the oldest settled bounded entries until the tier fits its capacity. Entries
    /// still computing go back in the queue, each queued insertion is looked at once per call.
    #[logfn(Trace)]
    fn evict(&self) -> usize {
        let mut evicted = 0;
        let mut budget = self.order.len();
        while self.bounded.len() > self.capacity && budget > 0 {
            budget -= 1;
            let Some((key, id)) = self.order.pop() else {
                break;
            };
            let removed = self
                .bounded
                .remove_if(&key, |_, f| f.id() == id && f.is_settled());
            if removed.is_some() {
                evicted += 1;
                continue;
            }
            let live = matches!(self.bounded.get(&key), Some(f) if f.id() == id);
            if live {
                self.order.push((key, id));
            }
        }
        evicted
    }

    pub fn clear(&self) {
        self.permanent.clear();
        self.bounded.clear();
        while self.order.pop().is_some() {}
    }
}
