use crate::{Scheduler, VMFuture};
use log::{error, trace};
use log_derive::logfn;
use quill_core::{VMError, VMObject, Value};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

pub enum ChannelRead {
    Ready(Value),
    /// Settled by the next write, or with [`Value::EndOfStream`] on close
    Pending(VMFuture),
}

/// Unbounded multi-producer multi-consumer queue between execution states.
///
/// At most one of the value queue and the reader queue is non-empty at any time.
#[derive(Clone)]
pub struct Channel(Arc<ChannelState>);

struct ChannelState {
    id: u64,
    queues: Mutex<Queues>,
    scheduler: Option<Scheduler>,
}

#[derive(Default)]
struct Queues {
    values: VecDeque<Value>,
    readers: VecDeque<VMFuture>,
    closed: bool,
}

impl Channel {
    /// Readers parked on this channel are resumed through `scheduler` when present.
    pub fn new(scheduler: Option<Scheduler>) -> Self {
        Channel(Arc::new(ChannelState {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            queues: Mutex::new(Queues::default()),
            scheduler,
        }))
    }

    fn queues(&self) -> MutexGuard<'_, Queues> {
        self.0.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read(&self) -> ChannelRead {
        let mut queues = self.queues();
        if queues.closed {
            return ChannelRead::Ready(Value::EndOfStream);
        }
        if let Some(v) = queues.values.pop_front() {
            return ChannelRead::Ready(v);
        }
        let reader = VMFuture::pending();
        trace!("{self} reader {} waiting", reader.id());
        queues.readers.push_back(reader.clone());
        ChannelRead::Pending(reader)
    }

    pub fn write(&self, value: Value) -> Result<(), VMError> {
        let reader = {
            let mut queues = self.queues();
            if queues.closed {
                return Err(VMError::ChannelClosed(format!("Cannot write to closed {self}")));
            }
            match queues.readers.pop_front() {
                Some(reader) => reader,
                None => {
                    queues.values.push_back(value);
                    return Ok(());
                }
            }
        };
        self.deliver(&reader, value);
        Ok(())
    }

    /// Closes the channel, settling every waiting reader with end of stream. Buffered values
    /// are no longer readable. Returns the number of readers released.
    #[logfn(Trace)]
    pub fn close(&self) -> usize {
        let readers = {
            let mut queues = self.queues();
            queues.closed = true;
            std::mem::take(&mut queues.readers)
        };
        for reader in &readers {
            self.deliver(reader, Value::EndOfStream);
        }
        readers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.queues().closed
    }

    pub fn buffered(&self) -> usize {
        self.queues().values.len()
    }

    pub fn waiting_readers(&self) -> usize {
        self.queues().readers.len()
    }

    fn deliver(&self, reader: &VMFuture, value: Value) {
        let settled = match &self.0.scheduler {
            Some(scheduler) => scheduler.complete(reader, Ok(value)),
            None => reader.set_result(value),
        };
        if let Err(e) = settled {
            error!("{self} failed to deliver to {}: {e}", reader.id());
        }
    }
}

impl Debug for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let queues = self.queues();
        f.debug_struct("Channel")
            .field("id", &self.0.id)
            .field("values", &queues.values)
            .field("readers", &queues.readers.len())
            .field("closed", &queues.closed)
            .finish()
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<channel c{}>", self.0.id)
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl VMObject for Channel {
    fn type_name(&self) -> &'static str {
        "Channel"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
