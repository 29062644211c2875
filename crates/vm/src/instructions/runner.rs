use crate::{ExecutionState, Instruction, Interrupt, Step, VMFuture};
use quill_core::{VMError, Value};

impl Instruction {
    /// Runs one instruction against `state`.
    ///
    /// Instructions that read the stack materialize their operands first, a suspension
    /// therefore leaves the stack untouched and the same instruction runs again on resumption.
    pub fn execute(&self, state: &mut ExecutionState) -> Step {
        match self {
            Instruction::Load(v) => state.push(v.clone()),
            Instruction::Pop => {
                state.discard()?;
            }
            Instruction::Dup => {
                state.materialize(1)?;
                let v = state.pop()?;
                state.push(v.clone());
                state.push(v);
            }
            Instruction::GetLocal(slot) => {
                let v = state.local(*slot)?;
                state.push(v);
            }
            Instruction::SetLocal(slot) => {
                state.materialize(1)?;
                let v = state.pop()?;
                state.set_local(*slot, v)?;
            }
            Instruction::GetGlobal(slot) => {
                let v = state.global(*slot)?;
                state.push(v);
            }
            Instruction::SetGlobal(slot) => {
                state.materialize(1)?;
                let v = state.pop()?;
                state.set_global(*slot, v)?;
            }
            Instruction::Binary(op) => {
                state.materialize(2)?;
                let rhs = state.pop()?;
                let lhs = state.pop()?;
                let v = lhs.binary(*op, &rhs, &state.math())?;
                state.push(v);
            }
            Instruction::Unary(op) => {
                state.materialize(1)?;
                let v = state.pop()?.unary(*op, &state.math())?;
                state.push(v);
            }
            Instruction::Jump(offset) => return Ok(*offset),
            Instruction::JumpIfFalse(offset) => {
                state.materialize(1)?;
                if !state.pop()?.is_truthy() {
                    return Ok(*offset);
                }
            }
            Instruction::Call { target, args, tier } => {
                return self.call(state, target, *args, *tier);
            }
            Instruction::Await(n) => state.materialize(*n)?,
            Instruction::Wait => {
                state.materialize(1)?;
                match state.pop()? {
                    Value::Object(o) => match o.as_any().downcast_ref::<VMFuture>() {
                        Some(f) => state.push_pending(f.clone()),
                        None => state.push(Value::Object(o)),
                    },
                    v => state.push(v),
                }
            }
            Instruction::NewChannel => self.new_channel(state),
            Instruction::Send => self.send(state)?,
            Instruction::Receive => self.receive(state)?,
            Instruction::Close => self.close(state)?,
            Instruction::Print => {
                state.materialize(1)?;
                let v = state.pop()?;
                state.io().write_line(&v.to_string())?;
            }
            Instruction::ReadLine => {
                let v = match state.io().read_line()? {
                    Some(line) => Value::String(line),
                    None => Value::EndOfStream,
                };
                state.push(v);
            }
            Instruction::Abort => return Err(Interrupt::Fail(VMError::Aborted)),
            Instruction::Custom(op) => return op.execute(state),
        }
        Ok(1)
    }
}
