mod builder;
mod cache;
mod channel;
mod future;
mod instructions;
mod io;
mod macros;
mod memory;
mod program;
mod scheduler;
mod stack;
mod state;
mod vm;

pub use builder::ProgramBuilder;
pub use cache::{CacheTier, CallKey, ResultCache};
pub use channel::{Channel, ChannelRead};
pub use future::{FutureId, FutureKind, VMFuture};
pub use instructions::*;
pub use io::{CapturedOutput, Input, Output, VMIo};
pub use memory::GlobalMemory;
pub use program::{ExecutionType, Program, ProgramId};
pub use scheduler::{Scheduler, SchedulerStats, TaskId};
pub use stack::{StackValue, VMStack};
pub use state::{Completion, ExecutionState, InvocationContext};
pub use vm::*;

pub use quill_core::{
    BinaryOperation, MathContext, Number, SourceLocation, TraceFrame, UnaryOperation, VMError,
    VMObject, Value,
};
