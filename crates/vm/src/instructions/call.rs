use crate::{CacheTier, CallTarget, ExecutionState, Instruction, Step};

impl Instruction {
    pub(crate) fn call(
        &self,
        state: &mut ExecutionState,
        target: &CallTarget,
        args: usize,
        tier: CacheTier,
    ) -> Step {
        state.materialize(args)?;
        let callee = match target {
            CallTarget::Program(p) => p.clone(),
            CallTarget::Recurse => state.program().clone(),
        };
        let args = state.pop_n(args)?;
        let result = state.call(callee, args, tier)?;
        match result.poll() {
            None => state.push_pending(result),
            Some(Ok(v)) => state.push(v),
            Some(Err(e)) => return Err(e.into()),
        }
        Ok(1)
    }
}
