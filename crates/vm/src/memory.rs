use crate::Program;
use log_derive::logfn_inputs;
use quill_core::{MutableReference, VMError, Value};

/// Global slots shared by every execution state of one invocation.
///
/// Reading a slot that was never written yields [`Value::None`]; writing past the end grows
/// the memory, since callees may touch slots the root program never declared.
#[derive(Clone, Debug, Default)]
pub struct GlobalMemory(MutableReference<Vec<Value>>);

impl GlobalMemory {
    pub fn new(size: usize) -> Self {
        GlobalMemory(vec![Value::None; size].into())
    }

    pub fn for_program(program: &Program) -> Self {
        Self::new(program.global_count())
    }

    /// Memory for `program` with named globals bound up front.
    pub fn with_bindings<I, K, V>(program: &Program, bindings: I) -> Result<Self, VMError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let memory = Self::for_program(program);
        for (name, value) in bindings {
            let name = name.as_ref();
            let slot = program.global_slot(name).ok_or_else(|| {
                VMError::VariableDoesNotExist(format!("{program} has no global named {name}"))
            })?;
            memory.set(slot, value.into());
        }
        Ok(memory)
    }

    pub fn get(&self, slot: usize) -> Value {
        self.0.apply(|g| g.get(slot).cloned().unwrap_or_default())
    }

    #[logfn_inputs(Trace, fmt = "set_global(memory={:p} slot={} value={})")]
    pub fn set(&self, slot: usize, value: Value) {
        self.0.update(|g| {
            if slot >= g.len() {
                g.resize(slot + 1, Value::None);
            }
            g[slot] = value;
        })
    }

    pub fn get_named(&self, program: &Program, name: &str) -> Result<Value, VMError> {
        match program.global_slot(name) {
            Some(slot) => Ok(self.get(slot)),
            None => Err(VMError::VariableDoesNotExist(format!(
                "{program} has no global named {name}"
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.0.apply(|g| g.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.0.apply(|g| g.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProgramBuilder;
    use pretty_assertions::assert_eq;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test(unsupported = test)]
    fn bindings_by_name() {
        let mut builder = ProgramBuilder::new();
        builder
            .add_get_global_instruction("x")
            .add_get_global_instruction("y")
            .add_add_instruction();
        let program = builder.build();
        let memory = GlobalMemory::with_bindings(&program, [("y", 3), ("x", 2)]).unwrap();
        assert_eq!(memory.snapshot(), vec![2.into(), 3.into()]);
        assert_eq!(memory.get_named(&program, "y"), Ok(3.into()));
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn unknown_binding() {
        let program = ProgramBuilder::new().build();
        let result = GlobalMemory::with_bindings(&program, [("missing", 1)]);
        assert!(matches!(result, Err(VMError::VariableDoesNotExist(_))));
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn grows_on_write() {
        let memory = GlobalMemory::new(1);
        assert_eq!(memory.get(4), Value::None);
        memory.set(4, "late".into());
        assert_eq!(memory.len(), 5);
        assert_eq!(memory.get(4), "late".into());
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn clones_share_slots() {
        let memory = GlobalMemory::new(1);
        let other = memory.clone();
        other.set(0, true.into());
        assert_eq!(memory.get(0), true.into());
    }
}
