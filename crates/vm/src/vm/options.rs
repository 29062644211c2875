use quill_core::MathContext;
use std::thread::available_parallelism;
use std::time::Duration;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VMOptions {
    /// Deepest call chain before a call fails with a stack overflow
    pub max_depth: usize,
    pub workers: usize,
    pub worker_stack_size: usize,
    /// Entries kept in the bounded tier of the result cache
    pub cache_capacity: usize,
    /// Significant digits kept by arithmetic, unlimited when `None`
    pub precision: Option<u32>,
    /// Longest [`crate::VM::execute`] waits on an asynchronous program
    pub timeout: Option<Duration>,
}

impl Default for VMOptions {
    fn default() -> Self {
        VMOptions {
            max_depth: 1024,
            workers: available_parallelism().map_or(4, |n| n.get()),
            worker_stack_size: 8 * 1024 * 1024,
            cache_capacity: 1024,
            precision: None,
            timeout: None,
        }
    }
}

impl VMOptions {
    pub fn math_context(&self) -> MathContext {
        match self.precision {
            None => MathContext::UNLIMITED,
            Some(p) => MathContext::new(p),
        }
    }
}
