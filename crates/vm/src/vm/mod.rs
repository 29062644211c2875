mod options;

pub use options::VMOptions;

use crate::{
    ExecutionState, GlobalMemory, InvocationContext, Program, ResultCache, Scheduler, VMFuture,
    VMIo,
};
use log::{debug, error, info};
use quill_core::{VMError, Value};
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

/// Entry point for running programs.
///
/// Owns the worker pool unless it was created inside a multi-threaded tokio runtime, in which
/// case that runtime's workers are borrowed. Every root invocation gets its own result cache,
/// shared only with the call tree below it.
pub struct VM {
    scheduler: Scheduler,
    options: VMOptions,
    runtime: Option<Runtime>,
}

impl std::fmt::Debug for VM {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VM")
            .field("scheduler", &self.scheduler)
            .field("options", &self.options)
            .field("owns_runtime", &self.runtime.is_some())
            .finish()
    }
}

impl VM {
    pub fn new() -> Result<Self, VMError> {
        Self::create(VMOptions::default())
    }

    pub fn create(options: VMOptions) -> Result<Self, VMError> {
        let (handle, runtime) = match Handle::try_current() {
            Ok(h) if h.runtime_flavor() == RuntimeFlavor::MultiThread => (h, None),
            _ => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(options.workers.max(1))
                    .thread_stack_size(options.worker_stack_size)
                    .thread_name("quill-worker")
                    .build()
                    .map_err(|e| {
                        VMError::RuntimeError(format!("Failed to create tokio runtime {e}"))
                    })?;
                (runtime.handle().clone(), Some(runtime))
            }
        };
        info!(
            "vm started, {} worker(s), cache capacity {}",
            options.workers, options.cache_capacity
        );
        Ok(VM {
            scheduler: Scheduler::new(handle),
            options,
            runtime,
        })
    }

    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[inline]
    pub fn options(&self) -> &VMOptions {
        &self.options
    }

    fn context(
        &self,
        globals: GlobalMemory,
        io: VMIo,
        scheduler: Option<Scheduler>,
    ) -> Arc<InvocationContext> {
        Arc::new(InvocationContext::new(
            globals,
            io,
            Arc::new(ResultCache::new(self.options.cache_capacity)),
            scheduler,
            self.options,
        ))
    }

    /// A root state for `program` that runs through this VM's scheduler, with fresh globals
    /// and the process streams.
    pub fn state(&self, program: Arc<Program>, args: Vec<Value>) -> Result<ExecutionState, VMError> {
        let globals = GlobalMemory::for_program(&program);
        let context = self.context(globals, VMIo::default(), Some(self.scheduler.clone()));
        ExecutionState::new(program, context, args, 0)
    }

    /// Schedules `program` and returns a blocking future of its result.
    pub fn submit(
        &self,
        program: Arc<Program>,
        globals: GlobalMemory,
        io: VMIo,
        args: Vec<Value>,
    ) -> Result<VMFuture, VMError> {
        debug!("submitting {program}");
        let context = self.context(globals, io, Some(self.scheduler.clone()));
        let state = ExecutionState::new(program, context, args, 0)?;
        Ok(self.scheduler.submit(state))
    }

    /// Runs `program` to completion. Synchronous programs run on the calling thread without
    /// the scheduler, asynchronous ones are submitted and waited on.
    pub fn execute(
        &self,
        program: Arc<Program>,
        globals: GlobalMemory,
        io: VMIo,
        args: Vec<Value>,
    ) -> Result<Value, VMError> {
        let name = program.name().to_string();
        let result = if program.is_asynchronous() {
            self.submit(program, globals, io, args)
                .and_then(|f| f.get(self.options.timeout))
        } else {
            let context = self.context(globals, io, None);
            ExecutionState::new(program, context, args, 0).and_then(|mut s| s.run_to_completion())
        };
        if let Err(e) = &result {
            if e.is_abort() {
                debug!("{name} aborted");
            } else {
                error!("{name} failed: {e}");
            }
        }
        result
    }

    /// Executes `program` with fresh globals, the process streams and no arguments.
    pub fn eval(&self, program: Arc<Program>) -> Result<Value, VMError> {
        let globals = GlobalMemory::for_program(&program);
        self.execute(program, globals, VMIo::default(), vec![])
    }
}

impl Drop for VM {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProgramBuilder;
    use pretty_assertions::assert_eq;

    #[test]
    fn eval_synchronous() {
        let vm = VM::new().unwrap();
        let mut builder = ProgramBuilder::new();
        builder
            .add_load_instruction("a".into())
            .add_load_instruction("b".into())
            .add_add_instruction();
        assert_eq!(vm.eval(builder.build()), Ok("ab".into()));
    }

    #[test]
    fn eval_asynchronous() {
        let vm = VM::new().unwrap();
        let mut builder = ProgramBuilder::new();
        builder
            .asynchronous()
            .add_load_instruction(4.into())
            .add_unary_instruction(quill_core::UnaryOperation::Neg);
        assert_eq!(vm.eval(builder.build()), Ok((-4).into()));
        assert_eq!(vm.scheduler().stats().submitted, 1);
    }

    #[test]
    fn execute_times_out() {
        let vm = VM::create(VMOptions {
            timeout: Some(std::time::Duration::from_millis(20)),
            ..Default::default()
        })
        .unwrap();
        let mut builder = ProgramBuilder::new();
        builder
            .asynchronous()
            .add_load_instruction(Value::object(VMFuture::pending()))
            .add_wait_instruction()
            .add_await_instruction(1);
        let err = vm.eval(builder.build()).unwrap_err();
        assert!(matches!(err, VMError::TimeoutError(_)), "{err}");
    }

    #[test]
    fn precision_applies_to_arithmetic() {
        let vm = VM::create(VMOptions {
            precision: Some(2),
            ..Default::default()
        })
        .unwrap();
        let mut builder = ProgramBuilder::new();
        builder
            .add_load_instruction(1.0.into())
            .add_load_instruction(3.into())
            .add_div_instruction();
        assert_eq!(vm.eval(builder.build()), Ok(0.33.into()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn borrows_enclosing_runtime() {
        let vm = VM::new().unwrap();
        assert!(vm.runtime.is_none());
        let mut builder = ProgramBuilder::new();
        builder.asynchronous().add_load_instruction(1.into());
        let result = vm
            .submit(builder.build(), GlobalMemory::default(), VMIo::default(), vec![])
            .unwrap();
        let value = tokio::task::spawn_blocking(move || result.get(None))
            .await
            .unwrap();
        assert_eq!(value, Ok(1.into()));
    }

    #[test]
    fn each_execution_has_its_own_cache() {
        let vm = VM::new().unwrap();
        let mut read_x = ProgramBuilder::named("read_x");
        read_x.define_global("x", 0).add_get_global_instruction("x");
        let mut main = ProgramBuilder::named("main");
        main.deterministic()
            .define_global("x", 0)
            .add_call_instruction(read_x.build(), 0);
        let main = main.build();

        for x in [1, 2] {
            let globals = GlobalMemory::with_bindings(&main, [("x", x)]).unwrap();
            let result = vm.execute(main.clone(), globals, VMIo::default(), vec![]);
            assert_eq!(result, Ok(x.into()));
        }
    }
}
