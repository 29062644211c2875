use indexmap::{IndexMap, IndexSet};
use log::debug;
use quill_vm::{
    BinaryOperation, CacheTier, GlobalMemory, Program, ProgramBuilder, UnaryOperation, VMError,
    VMIo, Value, VM,
};
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

/// Name a call uses to refer to the program it appears in.
pub const RECURSE: &str = "self";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgramFileError {
    Io(String),
    Parse(String),
    UnknownProgram(String),
    InvalidValue(String),
}

impl std::error::Error for ProgramFileError {}

impl Display for ProgramFileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgramFileError::Io(e) => write!(f, "IO Error - {e}"),
            ProgramFileError::Parse(e) => write!(f, "Parse Error - {e}"),
            ProgramFileError::UnknownProgram(e) => write!(f, "Unknown Program - {e}"),
            ProgramFileError::InvalidValue(e) => write!(f, "Invalid Value - {e}"),
        }
    }
}

/// A JSON file holding named program definitions and initial globals.
///
/// Definitions are compiled in order, a call may target any earlier definition or `"self"`.
#[derive(Clone, Debug, Deserialize)]
pub struct ProgramFile {
    #[serde(default)]
    pub globals: IndexMap<String, serde_json::Value>,
    pub programs: IndexMap<String, ProgramDefinition>,
    #[serde(default = "default_main")]
    pub main: String,
}

fn default_main() -> String {
    "main".to_string()
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProgramDefinition {
    pub source: Option<String>,
    pub parameters: Vec<String>,
    pub asynchronous: bool,
    pub deterministic: bool,
    pub instructions: Vec<InstructionDefinition>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct InstructionDefinition {
    #[serde(flatten)]
    pub op: OpDefinition,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpDefinition {
    Load {
        value: serde_json::Value,
    },
    Pop,
    Dup,
    GetLocal {
        name: String,
    },
    SetLocal {
        name: String,
    },
    GetGlobal {
        name: String,
    },
    SetGlobal {
        name: String,
    },
    Binary {
        operation: BinaryOperation,
    },
    Unary {
        operation: UnaryOperation,
    },
    Jump {
        offset: isize,
    },
    JumpIfFalse {
        offset: isize,
    },
    Call {
        program: String,
        #[serde(default)]
        args: usize,
        #[serde(default)]
        permanent: bool,
    },
    Await {
        count: usize,
    },
    Wait,
    NewChannel,
    Send,
    Receive,
    Close,
    Print,
    ReadLine,
    Abort,
}

/// Converts plain JSON data, objects have no counterpart.
pub fn to_value(json: &serde_json::Value) -> Result<Value, ProgramFileError> {
    let v = match json {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.into(),
            (None, Some(f)) => f.into(),
            (None, None) => {
                return Err(ProgramFileError::InvalidValue(format!(
                    "{n} does not fit a Number"
                )))
            }
        },
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(a) => Value::List(a.iter().map(to_value).collect::<Result<_, _>>()?),
        serde_json::Value::Object(_) => {
            return Err(ProgramFileError::InvalidValue(format!(
                "objects are not supported: {json}"
            )))
        }
    };
    Ok(v)
}

/// Programs compiled from a [`ProgramFile`], sharing one global slot table.
#[derive(Debug)]
pub struct CompiledFile {
    pub programs: IndexMap<String, Arc<Program>>,
    pub main: Arc<Program>,
    globals: IndexMap<String, Value>,
    slots: IndexSet<String>,
}

impl ProgramFile {
    pub fn parse(json: &str) -> Result<Self, ProgramFileError> {
        serde_json::from_str(json).map_err(|e| ProgramFileError::Parse(e.to_string()))
    }

    pub fn read(path: &Path) -> Result<Self, ProgramFileError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProgramFileError::Io(format!("{}: {e}", path.display())))?;
        Self::parse(&contents)
    }

    /// Every global name in the file: declared globals first, then in order of use.
    fn global_slots(&self) -> IndexSet<String> {
        let mut slots: IndexSet<String> = self.globals.keys().cloned().collect();
        for definition in self.programs.values() {
            for instruction in &definition.instructions {
                if let OpDefinition::GetGlobal { name } | OpDefinition::SetGlobal { name } =
                    &instruction.op
                {
                    slots.insert(name.clone());
                }
            }
        }
        slots
    }

    pub fn compile(&self) -> Result<CompiledFile, ProgramFileError> {
        let slots = self.global_slots();
        let mut programs: IndexMap<String, Arc<Program>> = IndexMap::new();
        for (name, definition) in &self.programs {
            let program = definition.compile(name, &slots, &programs)?;
            debug!("compiled {program}");
            programs.insert(name.clone(), program);
        }
        let main = programs
            .get(&self.main)
            .cloned()
            .ok_or_else(|| ProgramFileError::UnknownProgram(self.main.clone()))?;
        let globals = self
            .globals
            .iter()
            .map(|(k, v)| Ok((k.clone(), to_value(v)?)))
            .collect::<Result<_, ProgramFileError>>()?;
        Ok(CompiledFile {
            programs,
            main,
            globals,
            slots,
        })
    }
}

impl ProgramDefinition {
    fn compile(
        &self,
        name: &str,
        slots: &IndexSet<String>,
        compiled: &IndexMap<String, Arc<Program>>,
    ) -> Result<Arc<Program>, ProgramFileError> {
        let mut builder = ProgramBuilder::named(name);
        for (slot, global) in slots.iter().enumerate() {
            builder.define_global(global.clone(), slot);
        }
        if let Some(source) = &self.source {
            builder.source(source.clone());
        }
        if self.asynchronous {
            builder.asynchronous();
        }
        if self.deterministic {
            builder.deterministic();
        }
        for parameter in &self.parameters {
            builder.parameter(parameter.clone());
        }

        for instruction in &self.instructions {
            if let Some(line) = instruction.line {
                builder.at(line, instruction.column.unwrap_or(0));
            }
            match &instruction.op {
                OpDefinition::Load { value } => builder.add_load_instruction(to_value(value)?),
                OpDefinition::Pop => builder.add_pop_instruction(),
                OpDefinition::Dup => builder.add_dup_instruction(),
                OpDefinition::GetLocal { name } => builder.add_get_local_instruction(name),
                OpDefinition::SetLocal { name } => builder.add_set_local_instruction(name),
                OpDefinition::GetGlobal { name } => builder.add_get_global_instruction(name),
                OpDefinition::SetGlobal { name } => builder.add_set_global_instruction(name),
                OpDefinition::Binary { operation } => builder.add_binary_instruction(*operation),
                OpDefinition::Unary { operation } => builder.add_unary_instruction(*operation),
                OpDefinition::Jump { offset } => builder.add_jump_instruction(*offset),
                OpDefinition::JumpIfFalse { offset } => {
                    builder.add_jump_if_false_instruction(*offset)
                }
                OpDefinition::Call {
                    program,
                    args,
                    permanent,
                } => {
                    let tier = if *permanent {
                        CacheTier::Permanent
                    } else {
                        CacheTier::Bounded
                    };
                    if program == RECURSE {
                        builder.add_recursive_call_instruction(*args)
                    } else {
                        let callee = compiled.get(program).cloned().ok_or_else(|| {
                            ProgramFileError::UnknownProgram(format!(
                                "{name} calls {program} before it is defined"
                            ))
                        })?;
                        builder.add_cached_call_instruction(callee, *args, tier)
                    }
                }
                OpDefinition::Await { count } => builder.add_await_instruction(*count),
                OpDefinition::Wait => builder.add_wait_instruction(),
                OpDefinition::NewChannel => builder.add_new_channel_instruction(),
                OpDefinition::Send => builder.add_send_instruction(),
                OpDefinition::Receive => builder.add_receive_instruction(),
                OpDefinition::Close => builder.add_close_instruction(),
                OpDefinition::Print => builder.add_print_instruction(),
                OpDefinition::ReadLine => builder.add_read_line_instruction(),
                OpDefinition::Abort => builder.add_abort_instruction(),
            };
        }
        Ok(builder.build())
    }
}

impl CompiledFile {
    /// Global memory with the file's initial bindings.
    pub fn globals(&self) -> GlobalMemory {
        let memory = GlobalMemory::new(self.slots.len());
        for (name, value) in &self.globals {
            if let Some(slot) = self.slots.get_index_of(name) {
                memory.set(slot, value.clone());
            }
        }
        memory
    }

    pub fn run(&self, vm: &VM, io: VMIo, args: Vec<Value>) -> Result<Value, VMError> {
        vm.execute(self.main.clone(), self.globals(), io, args)
    }

    pub fn disassemble(&self) -> String {
        self.programs
            .values()
            .map(|p| p.disassemble())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_instruction_definitions() {
        let file = ProgramFile::parse(
            r#"{
                "programs": {
                    "main": {
                        "instructions": [
                            {"op": "load", "value": 1, "line": 1, "column": 4},
                            {"op": "binary", "operation": "add"},
                            {"op": "call", "program": "self", "args": 2, "permanent": true},
                            {"op": "await", "count": 1},
                            {"op": "read_line"}
                        ]
                    }
                }
            }"#,
        )
        .unwrap();
        let main = &file.programs["main"];
        assert_eq!(main.instructions.len(), 5);
        assert_eq!(main.instructions[0].line, Some(1));
        assert!(matches!(
            main.instructions[2].op,
            OpDefinition::Call {
                args: 2,
                permanent: true,
                ..
            }
        ));
        assert_eq!(file.main, "main");
    }

    #[test]
    fn json_values() {
        let json: serde_json::Value = serde_json::from_str(r#"[1, 2.5, "a", null, true]"#).unwrap();
        assert_eq!(
            to_value(&json),
            Ok(Value::List(vec![
                1.into(),
                2.5.into(),
                "a".into(),
                Value::None,
                true.into()
            ]))
        );
        let object: serde_json::Value = serde_json::from_str(r#"{"a": 1}"#).unwrap();
        assert!(matches!(
            to_value(&object),
            Err(ProgramFileError::InvalidValue(_))
        ));
    }

    #[test]
    fn calls_must_target_earlier_programs() {
        let file = ProgramFile::parse(
            r#"{
                "programs": {
                    "main": {"instructions": [{"op": "call", "program": "later"}]},
                    "later": {}
                }
            }"#,
        )
        .unwrap();
        assert!(matches!(
            file.compile(),
            Err(ProgramFileError::UnknownProgram(_))
        ));
    }

    #[test]
    fn globals_share_slots_across_programs() {
        let file = ProgramFile::parse(
            r#"{
                "globals": {"total": 10},
                "programs": {
                    "bump": {"instructions": [
                        {"op": "get_global", "name": "step"},
                        {"op": "get_global", "name": "total"}
                    ]},
                    "main": {"instructions": [{"op": "get_global", "name": "total"}]}
                }
            }"#,
        )
        .unwrap();
        let compiled = file.compile().unwrap();
        assert_eq!(compiled.programs["bump"].global_slot("total"), Some(0));
        assert_eq!(compiled.programs["bump"].global_slot("step"), Some(1));
        assert_eq!(compiled.main.global_slot("total"), Some(0));
        assert_eq!(compiled.globals().snapshot(), vec![10.into(), Value::None]);
    }
}
