use crate::{Channel, ChannelRead, ExecutionState, Instruction, Interrupt};
use quill_core::{VMError, Value};

fn expect_channel(value: &Value) -> Result<&Channel, VMError> {
    value.downcast::<Channel>().ok_or_else(|| {
        VMError::UnsupportedOperation(format!("Expected Channel, received {}", value.type_name()))
    })
}

impl Instruction {
    pub(crate) fn new_channel(&self, state: &mut ExecutionState) {
        let channel = Channel::new(state.scheduler().cloned());
        state.push(Value::object(channel));
    }

    pub(crate) fn send(&self, state: &mut ExecutionState) -> Result<(), Interrupt> {
        state.materialize(2)?;
        let value = state.pop()?;
        let channel = state.pop()?;
        expect_channel(&channel)?.write(value)?;
        Ok(())
    }

    pub(crate) fn receive(&self, state: &mut ExecutionState) -> Result<(), Interrupt> {
        state.materialize(1)?;
        let channel = state.pop()?;
        match expect_channel(&channel)?.read() {
            ChannelRead::Ready(v) => state.push(v),
            ChannelRead::Pending(f) => state.push_pending(f),
        }
        Ok(())
    }

    pub(crate) fn close(&self, state: &mut ExecutionState) -> Result<(), Interrupt> {
        state.materialize(1)?;
        let channel = state.pop()?;
        expect_channel(&channel)?.close();
        Ok(())
    }
}
