use crate::{
    CacheTier, CallKey, GlobalMemory, Interrupt, Program, ResultCache, Scheduler, StackValue,
    VMFuture, VMIo, VMOptions, VMStack,
};
use log::{debug, error, trace};
use log_derive::logfn_inputs;
use quill_core::{MathContext, VMError, Value};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Everything execution states descended from one root invocation share.
#[derive(Debug)]
pub struct InvocationContext {
    pub(crate) globals: GlobalMemory,
    pub(crate) io: VMIo,
    pub(crate) cache: Arc<ResultCache>,
    /// Absent for synchronous invocations, which never suspend
    pub(crate) scheduler: Option<Scheduler>,
    pub(crate) options: VMOptions,
}

impl InvocationContext {
    pub fn new(
        globals: GlobalMemory,
        io: VMIo,
        cache: Arc<ResultCache>,
        scheduler: Option<Scheduler>,
        options: VMOptions,
    ) -> Self {
        InvocationContext {
            globals,
            io,
            cache,
            scheduler,
            options,
        }
    }

    fn settle(&self, future: &VMFuture, result: Result<Value, VMError>) {
        let settled = match &self.scheduler {
            Some(s) => s.complete(future, result),
            None => future.settle(result),
        };
        if let Err(e) = settled {
            error!("failed to settle {}: {e}", future.id());
        }
    }
}

#[derive(Debug)]
pub enum Completion {
    Done(Value),
    /// Execution stopped on these unsettled futures and can be resumed with another `run`
    Suspended(Vec<VMFuture>),
}

/// One in-flight invocation of a program: instruction pointer, operand stack, locals and a
/// handle to the state shared with the rest of the call tree.
#[derive(Debug)]
pub struct ExecutionState {
    program: Arc<Program>,
    ip: usize,
    stack: VMStack,
    locals: Vec<Value>,
    context: Arc<InvocationContext>,
    /// Present only when the program is deterministic
    cache: Option<Arc<ResultCache>>,
    math: MathContext,
    depth: usize,
    waiting: Vec<VMFuture>,
}

impl Display for ExecutionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ip {}", self.program, self.ip)
    }
}

impl ExecutionState {
    /// Binds `args` to the program's parameters in order, missing arguments are `None`.
    pub fn new(
        program: Arc<Program>,
        context: Arc<InvocationContext>,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Self, VMError> {
        let max_depth = context.options.max_depth;
        if depth > max_depth {
            return Err(VMError::RuntimeError(format!(
                "Stack overflow: exceeded {max_depth}"
            )));
        }
        let parameters = program.parameters();
        if args.len() > parameters.len() {
            return Err(VMError::RuntimeError(format!(
                "{program} expects {} arguments, received {}",
                parameters.len(),
                args.len()
            )));
        }
        let mut locals = vec![Value::None; program.local_count()];
        for (name, value) in parameters.iter().zip(args) {
            let slot = program.local_slot(name).ok_or_else(|| {
                VMError::VariableDoesNotExist(format!("{program} has no local for parameter {name}"))
            })?;
            locals[slot] = value;
        }
        let cache = program
            .is_deterministic()
            .then(|| context.cache.clone());
        let math = context.options.math_context();
        Ok(ExecutionState {
            program,
            ip: 0,
            stack: VMStack::default(),
            locals,
            context,
            cache,
            math,
            depth,
            waiting: Vec::new(),
        })
    }

    /// A root state with its own globals, cache and process streams, and no scheduler.
    pub fn standalone(program: Arc<Program>, args: Vec<Value>) -> Result<Self, VMError> {
        Self::standalone_with_options(program, args, VMOptions::default())
    }

    pub fn standalone_with_options(
        program: Arc<Program>,
        args: Vec<Value>,
        options: VMOptions,
    ) -> Result<Self, VMError> {
        let context = InvocationContext::new(
            GlobalMemory::for_program(&program),
            VMIo::default(),
            Arc::new(ResultCache::new(options.cache_capacity)),
            None,
            options,
        );
        Self::new(program, Arc::new(context), args, 0)
    }

    #[inline]
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    #[inline]
    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn set_ip(&mut self, ip: usize) -> Result<(), VMError> {
        if ip > self.program.instructions().len() {
            return Err(VMError::RuntimeError(format!(
                "Instruction pointer {ip} is outside of {}",
                self.program
            )));
        }
        self.ip = ip;
        Ok(())
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub fn math(&self) -> MathContext {
        self.math
    }

    #[inline]
    pub fn io(&self) -> &VMIo {
        &self.context.io
    }

    #[inline]
    pub fn globals(&self) -> &GlobalMemory {
        &self.context.globals
    }

    #[inline]
    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.context.scheduler.as_ref()
    }

    /// The result cache, only available to deterministic programs.
    #[inline]
    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_deref()
    }

    /// Futures the last suspension waited on, empty while runnable.
    pub fn waiting(&self) -> &[VMFuture] {
        &self.waiting
    }

    #[inline]
    pub fn push<T: Into<Value>>(&mut self, value: T) {
        self.stack.push(StackValue::Value(value.into()))
    }

    #[inline]
    pub fn push_pending(&mut self, future: VMFuture) {
        self.stack.push(StackValue::Pending(future))
    }

    /// Ensures the top `n` slots hold values.
    ///
    /// Settled futures are replaced in place, a failed one fails the instruction. When any slot
    /// is still pending nothing is consumed and the instruction suspends on every pending slot.
    pub fn materialize(&mut self, n: usize) -> Result<(), Interrupt> {
        if self.stack.len() < n {
            return Err(VMError::EmptyStack(format!(
                "{} needs {n} values, stack holds {}",
                self,
                self.stack.len()
            ))
            .into());
        }
        let mut pending = Vec::new();
        for depth in 0..n {
            let Some(slot) = self.stack.peek_mut(depth) else {
                break;
            };
            let (polled, future) = match &*slot {
                StackValue::Value(_) => continue,
                StackValue::Pending(f) => (f.poll(), f.clone()),
            };
            match polled {
                None => pending.push(future),
                Some(Ok(v)) => *slot = StackValue::Value(v),
                Some(Err(e)) => return Err(Interrupt::Fail(e)),
            }
        }
        if pending.is_empty() {
            Ok(())
        } else {
            Err(Interrupt::Suspend(pending))
        }
    }

    /// Pops the top slot, which must already be materialized.
    pub fn pop(&mut self) -> Result<Value, VMError> {
        let location = self.to_string();
        match self.stack.next_value(location)? {
            StackValue::Value(v) => Ok(v),
            StackValue::Pending(f) => match f.poll() {
                Some(result) => result,
                None => Err(VMError::IllegalState(format!(
                    "{} popped unsettled {}",
                    self,
                    f.id()
                ))),
            },
        }
    }

    /// Pops `n` materialized values, returned in push order.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, VMError> {
        let mut values = (0..n).map(|_| self.pop()).collect::<Result<Vec<_>, _>>()?;
        values.reverse();
        Ok(values)
    }

    /// Drops the top slot whether or not it has settled.
    pub fn discard(&mut self) -> Result<(), VMError> {
        let location = self.to_string();
        self.stack.next_value(location).map(|_| ())
    }

    pub fn local(&self, slot: usize) -> Result<Value, VMError> {
        self.locals.get(slot).cloned().ok_or_else(|| {
            VMError::VariableDoesNotExist(format!("{} has no local slot {slot}", self.program))
        })
    }

    pub fn set_local(&mut self, slot: usize, value: Value) -> Result<(), VMError> {
        match self.locals.get_mut(slot) {
            Some(l) => {
                *l = value;
                Ok(())
            }
            None => Err(VMError::VariableDoesNotExist(format!(
                "{} has no local slot {slot}",
                self.program
            ))),
        }
    }

    #[inline]
    pub fn global(&self, slot: usize) -> Result<Value, VMError> {
        Ok(self.context.globals.get(slot))
    }

    #[inline]
    pub fn set_global(&self, slot: usize, value: Value) -> Result<(), VMError> {
        self.context.globals.set(slot, value);
        Ok(())
    }

    /// Starts `callee` as a child of this state and returns the future of its result.
    ///
    /// Deterministic callers memoize the call. Without a scheduler every callee runs inline
    /// before this returns. With one, asynchronous callees become their own task and
    /// synchronous callees start inline, continuing as a task if they have to wait.
    #[logfn_inputs(Trace, fmt = "call(state={} callee={} args={:?} tier={:?})")]
    pub fn call(
        &self,
        callee: Arc<Program>,
        args: Vec<Value>,
        tier: CacheTier,
    ) -> Result<VMFuture, VMError> {
        let context = self.context.clone();
        let depth = self.depth + 1;
        let future = match &self.cache {
            Some(cache) => {
                let key = CallKey::new(callee.id(), args.clone());
                cache.get_result(key, tier, |placeholder| {
                    Self::start(context, callee, args, depth, placeholder)
                })
            }
            None => {
                let future = VMFuture::pending();
                Self::start(context, callee, args, depth, future.clone());
                future
            }
        };
        Ok(future)
    }

    fn start(
        context: Arc<InvocationContext>,
        program: Arc<Program>,
        args: Vec<Value>,
        depth: usize,
        result: VMFuture,
    ) {
        let mut child = match ExecutionState::new(program.clone(), context.clone(), args, depth) {
            Ok(child) => child,
            Err(e) => return context.settle(&result, Err(e)),
        };
        match &context.scheduler {
            Some(scheduler) if program.is_asynchronous() => scheduler.submit_with(child, result),
            Some(scheduler) => match child.run() {
                Ok(Completion::Done(v)) => context.settle(&result, Ok(v)),
                Ok(Completion::Suspended(futures)) => scheduler.adopt(child, result, futures),
                Err(e) => context.settle(&result, Err(e)),
            },
            None => {
                let outcome = child.run_to_completion();
                context.settle(&result, outcome)
            }
        }
    }

    /// Runs without the option of suspending, as invocations without a scheduler must.
    pub fn run_to_completion(&mut self) -> Result<Value, VMError> {
        match self.run()? {
            Completion::Done(v) => Ok(v),
            Completion::Suspended(futures) => {
                let waiting = futures.iter().map(|f| f.id().to_string()).collect::<Vec<_>>();
                Err(VMError::IllegalState(format!(
                    "{} cannot suspend outside of the scheduler, waiting on {}",
                    self.program,
                    waiting.join(", ")
                ))
                .with_frame(self.program.frame(self.ip)))
            }
        }
    }

    fn advance(&mut self, delta: isize) -> Result<(), VMError> {
        match self.ip.checked_add_signed(delta) {
            Some(next) if next <= self.program.instructions().len() => {
                self.ip = next;
                Ok(())
            }
            _ => Err(VMError::RuntimeError(format!(
                "Jump by {delta} from ip {} leaves {}",
                self.ip, self.program
            ))),
        }
    }

    /// Dispatch loop: executes from the current instruction until the program ends, fails or
    /// suspends. A suspended state resumes at the instruction that suspended.
    pub fn run(&mut self) -> Result<Completion, VMError> {
        if !self.waiting.is_empty() {
            trace!("resuming {} at ip {}", self.program, self.ip);
            self.waiting.clear();
        }
        let program = self.program.clone();
        while let Some(instruction) = program.instruction(self.ip) {
            match instruction.execute(self) {
                Ok(delta) => {
                    if let Err(e) = self.advance(delta) {
                        return Err(e.with_frame(program.frame(self.ip)));
                    }
                }
                Err(Interrupt::Suspend(futures)) => return Ok(self.suspend(futures)),
                Err(Interrupt::Fail(e)) => return Err(e.with_frame(program.frame(self.ip))),
            }
        }
        self.finish()
    }

    fn suspend(&mut self, futures: Vec<VMFuture>) -> Completion {
        debug!(
            "{} suspended at ip {} on {} future(s)",
            self.program,
            self.ip,
            futures.len()
        );
        self.waiting = futures.clone();
        Completion::Suspended(futures)
    }

    fn finish(&mut self) -> Result<Completion, VMError> {
        if self.stack.is_empty() {
            return Ok(Completion::Done(Value::None));
        }
        match self.materialize(1) {
            Ok(()) => {}
            Err(Interrupt::Suspend(futures)) => return Ok(self.suspend(futures)),
            Err(Interrupt::Fail(e)) => return Err(e.with_frame(self.program.frame(self.ip))),
        }
        let result = self.pop()?;
        if !self.stack.is_empty() {
            trace!("{} left {} value(s) on the stack", self.program, self.stack.len());
        }
        Ok(Completion::Done(result))
    }
}
