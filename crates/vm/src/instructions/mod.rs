mod call;
mod channel;
mod runner;

use crate::{CacheTier, ExecutionState, Program, VMFuture};
use quill_core::{BinaryOperation, UnaryOperation, VMError, Value};
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Why an instruction stopped the dispatch loop without producing an ip delta.
#[derive(Debug)]
pub enum Interrupt {
    /// The instruction needs these futures settled; it will be executed again on resumption
    Suspend(Vec<VMFuture>),
    Fail(VMError),
}

impl From<VMError> for Interrupt {
    #[inline]
    fn from(value: VMError) -> Self {
        Interrupt::Fail(value)
    }
}

/// Signed instruction pointer delta, or the reason execution stopped.
pub type Step = Result<isize, Interrupt>;

/// Host supplied instruction.
///
/// An operation that suspends is executed again once the futures it waited on settle, so it
/// must call [`ExecutionState::materialize`] before mutating the stack.
pub trait Operation: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, state: &mut ExecutionState) -> Step;
}

#[derive(Clone, Debug)]
pub enum CallTarget {
    Program(Arc<Program>),
    /// The program currently executing, resolved at call time
    Recurse,
}

impl Display for CallTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CallTarget::Program(p) => write!(f, "{}", p.name()),
            CallTarget::Recurse => write!(f, "self"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Instruction {
    Load(Value),
    Pop,
    Dup,
    GetLocal(usize),
    SetLocal(usize),
    GetGlobal(usize),
    SetGlobal(usize),
    Binary(BinaryOperation),
    Unary(UnaryOperation),
    Jump(isize),
    /// Pops the condition, jumps by the offset when it is falsy
    JumpIfFalse(isize),
    Call {
        target: CallTarget,
        args: usize,
        tier: CacheTier,
    },
    /// Materializes the top `n` slots, suspending until all of them settle
    Await(usize),
    /// Pops a future object and pushes it as a pending slot
    Wait,
    NewChannel,
    /// `[channel, value] -> []`
    Send,
    /// `[channel] -> [value]`, pending while the channel is empty
    Receive,
    Close,
    Print,
    ReadLine,
    Abort,
    Custom(Arc<dyn Operation>),
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Load(v) => write!(f, "load {v}"),
            Instruction::Pop => write!(f, "pop"),
            Instruction::Dup => write!(f, "dup"),
            Instruction::GetLocal(s) => write!(f, "get_local {s}"),
            Instruction::SetLocal(s) => write!(f, "set_local {s}"),
            Instruction::GetGlobal(s) => write!(f, "get_global {s}"),
            Instruction::SetGlobal(s) => write!(f, "set_global {s}"),
            Instruction::Binary(op) => write!(f, "binary {op}"),
            Instruction::Unary(op) => write!(f, "unary {op}"),
            Instruction::Jump(o) => write!(f, "jump {o:+}"),
            Instruction::JumpIfFalse(o) => write!(f, "jump_if_false {o:+}"),
            Instruction::Call { target, args, tier } => {
                write!(f, "call {target}/{args}")?;
                if *tier == CacheTier::Permanent {
                    write!(f, " permanent")?;
                }
                Ok(())
            }
            Instruction::Await(n) => write!(f, "await {n}"),
            Instruction::Wait => write!(f, "wait"),
            Instruction::NewChannel => write!(f, "new_channel"),
            Instruction::Send => write!(f, "send"),
            Instruction::Receive => write!(f, "receive"),
            Instruction::Close => write!(f, "close"),
            Instruction::Print => write!(f, "print"),
            Instruction::ReadLine => write!(f, "read_line"),
            Instruction::Abort => write!(f, "abort"),
            Instruction::Custom(op) => write!(f, "custom {}", op.name()),
        }
    }
}
