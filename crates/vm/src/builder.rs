use crate::{
    generate_bin_op_methods, generate_simple_instruction_methods, generate_unary_op_methods,
    CacheTier, CallTarget, ExecutionType, Instruction, Operation, Program, ProgramId,
};
use indexmap::IndexMap;
use quill_core::{BinaryOperation, SourceLocation, UnaryOperation, Value};
use std::sync::Arc;

/// Assembles a [`Program`]. Locals and globals are named, slots are assigned in order of
/// first use.
#[derive(Clone, Debug)]
pub struct ProgramBuilder {
    name: String,
    source: Option<String>,
    instructions: Vec<Instruction>,
    locations: Vec<Option<SourceLocation>>,
    location: Option<SourceLocation>,
    locals: IndexMap<String, usize>,
    globals: IndexMap<String, usize>,
    parameters: Vec<String>,
    execution_type: ExecutionType,
    deterministic: bool,
}

impl Default for ProgramBuilder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::named("main")
    }

    pub fn named(name: impl Into<String>) -> Self {
        ProgramBuilder {
            name: name.into(),
            source: None,
            instructions: Vec::new(),
            locations: Vec::new(),
            location: None,
            locals: IndexMap::new(),
            globals: IndexMap::new(),
            parameters: Vec::new(),
            execution_type: ExecutionType::Synchronous,
            deterministic: false,
        }
    }

    pub fn source(&mut self, source: impl Into<String>) -> &mut Self {
        self.source = Some(source.into());
        self
    }

    /// Source position recorded for every instruction added after this call.
    pub fn at(&mut self, line: usize, column: usize) -> &mut Self {
        self.location = Some(SourceLocation { line, column });
        self
    }

    pub fn parameter(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.local(&name);
        self.parameters.push(name);
        self
    }

    pub fn asynchronous(&mut self) -> &mut Self {
        self.execution_type = ExecutionType::Asynchronous;
        self
    }

    pub fn execution_type(&mut self, execution_type: ExecutionType) -> &mut Self {
        self.execution_type = execution_type;
        self
    }

    pub fn deterministic(&mut self) -> &mut Self {
        self.deterministic = true;
        self
    }

    pub fn local(&mut self, name: &str) -> usize {
        let next = self.locals.len();
        *self.locals.entry(name.to_string()).or_insert(next)
    }

    pub fn global(&mut self, name: &str) -> usize {
        if let Some(slot) = self.globals.get(name) {
            return *slot;
        }
        let next = self.globals.values().max().map_or(0, |m| m + 1);
        self.globals.insert(name.to_string(), next);
        next
    }

    /// Pins `name` to `slot`, programs sharing globals must agree on slots.
    pub fn define_global(&mut self, name: impl Into<String>, slot: usize) -> &mut Self {
        self.globals.insert(name.into(), slot);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    #[inline]
    pub fn add_instruction(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self.locations.push(self.location);
        self
    }

    #[inline]
    pub fn add_load_instruction(&mut self, value: Value) -> &mut Self {
        self.add_instruction(Instruction::Load(value))
    }

    pub fn add_get_local_instruction(&mut self, name: &str) -> &mut Self {
        let slot = self.local(name);
        self.add_instruction(Instruction::GetLocal(slot))
    }

    pub fn add_set_local_instruction(&mut self, name: &str) -> &mut Self {
        let slot = self.local(name);
        self.add_instruction(Instruction::SetLocal(slot))
    }

    pub fn add_get_global_instruction(&mut self, name: &str) -> &mut Self {
        let slot = self.global(name);
        self.add_instruction(Instruction::GetGlobal(slot))
    }

    pub fn add_set_global_instruction(&mut self, name: &str) -> &mut Self {
        let slot = self.global(name);
        self.add_instruction(Instruction::SetGlobal(slot))
    }

    #[inline]
    pub fn add_binary_instruction(&mut self, op: BinaryOperation) -> &mut Self {
        self.add_instruction(Instruction::Binary(op))
    }

    #[inline]
    pub fn add_unary_instruction(&mut self, op: UnaryOperation) -> &mut Self {
        self.add_instruction(Instruction::Unary(op))
    }

    generate_bin_op_methods! {
        add_add_instruction => Add,
        add_sub_instruction => Sub,
        add_mul_instruction => Mul,
        add_div_instruction => Div,
        add_rem_instruction => Rem,
        add_eq_instruction => Eq,
        add_neq_instruction => Neq,
        add_lt_instruction => Lt,
        add_lte_instruction => Lte,
        add_gt_instruction => Gt,
        add_gte_instruction => Gte,
        add_and_instruction => And,
        add_or_instruction => Or
    }

    generate_unary_op_methods! {
        add_neg_instruction => Neg,
        add_not_instruction => Not
    }

    generate_simple_instruction_methods! {
        add_pop_instruction => Pop,
        add_dup_instruction => Dup,
        add_wait_instruction => Wait,
        add_new_channel_instruction => NewChannel,
        add_send_instruction => Send,
        add_receive_instruction => Receive,
        add_close_instruction => Close,
        add_print_instruction => Print,
        add_read_line_instruction => ReadLine,
        add_abort_instruction => Abort
    }

    /// Relative jump, `1` is the next instruction.
    #[inline]
    pub fn add_jump_instruction(&mut self, offset: isize) -> &mut Self {
        self.add_instruction(Instruction::Jump(offset))
    }

    #[inline]
    pub fn add_jump_if_false_instruction(&mut self, offset: isize) -> &mut Self {
        self.add_instruction(Instruction::JumpIfFalse(offset))
    }

    #[inline]
    pub fn add_call_instruction(&mut self, program: Arc<Program>, args: usize) -> &mut Self {
        self.add_cached_call_instruction(program, args, CacheTier::Bounded)
    }

    pub fn add_cached_call_instruction(
        &mut self,
        program: Arc<Program>,
        args: usize,
        tier: CacheTier,
    ) -> &mut Self {
        self.add_instruction(Instruction::Call {
            target: CallTarget::Program(program),
            args,
            tier,
        })
    }

    pub fn add_recursive_call_instruction(&mut self, args: usize) -> &mut Self {
        self.add_instruction(Instruction::Call {
            target: CallTarget::Recurse,
            args,
            tier: CacheTier::Bounded,
        })
    }

    #[inline]
    pub fn add_await_instruction(&mut self, count: usize) -> &mut Self {
        self.add_instruction(Instruction::Await(count))
    }

    pub fn add_operation(&mut self, operation: impl Operation + 'static) -> &mut Self {
        self.add_instruction(Instruction::Custom(Arc::new(operation)))
    }

    pub fn build(&self) -> Arc<Program> {
        Arc::new(Program {
            id: ProgramId::next(),
            name: self.name.clone(),
            source: self.source.clone(),
            instructions: self.instructions.clone(),
            locations: self.locations.clone(),
            locals: self.locals.clone(),
            globals: self.globals.clone(),
            parameters: self.parameters.clone(),
            execution_type: self.execution_type,
            deterministic: self.deterministic,
        })
    }
}
