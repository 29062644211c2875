mod program_file;

pub use program_file::{
    to_value, CompiledFile, InstructionDefinition, OpDefinition, ProgramDefinition, ProgramFile,
    ProgramFileError, RECURSE,
};
pub use quill_vm::{VMError, VMOptions, Value, VM};

/// Parses a command line argument as JSON, falling back to a plain string.
pub fn parse_arg(arg: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(arg)
        .ok()
        .and_then(|json| to_value(&json).ok())
        .unwrap_or_else(|| Value::String(arg.to_string()))
}
