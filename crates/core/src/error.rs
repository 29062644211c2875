use itertools::Itertools;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Source position of an instruction, attached by the compiler for debugging.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One level of a nested call chain that a failure unwound through.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TraceFrame {
    pub program: String,
    pub source: Option<String>,
    pub ip: usize,
    pub location: Option<SourceLocation>,
}

impl Display for TraceFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "at {}", self.program)?;
        match (&self.source, &self.location) {
            (Some(s), Some(l)) => write!(f, " ({s}:{l})")?,
            (Some(s), None) => write!(f, " ({s})")?,
            (None, Some(l)) => write!(f, " ({l})")?,
            (None, None) => {}
        }
        write!(f, " [ip {}]", self.ip)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VMError {
    TimeoutError(String),
    RuntimeError(String),
    EmptyStack(String),
    ConversionError(String),
    UnsupportedOperation(String),
    VariableDoesNotExist(String),
    IllegalState(String),
    ChannelClosed(String),
    /// Cooperative early termination, a consumer treats this as "no result" rather than a failure
    Aborted,
    Execution {
        cause: Box<VMError>,
        trail: Vec<TraceFrame>,
    },
}

impl Error for VMError {}

impl Display for VMError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VMError::RuntimeError(m) => write!(f, "{m}"),
            VMError::TimeoutError(m) => write!(f, "Timeout Error: {m}"),
            VMError::EmptyStack(m) => write!(f, "Empty Stack: {m}"),
            VMError::ConversionError(m) => write!(f, "Conversion Error: {m}"),
            VMError::UnsupportedOperation(m) => write!(f, "Unsupported Operation: {m}"),
            VMError::VariableDoesNotExist(m) => write!(f, "Variable Does Not Exist: {m}"),
            VMError::IllegalState(m) => write!(f, "Illegal State: {m}"),
            VMError::ChannelClosed(m) => write!(f, "Channel Closed: {m}"),
            VMError::Aborted => write!(f, "Aborted"),
            VMError::Execution { cause, trail } => {
                write!(f, "{cause}")?;
                if !trail.is_empty() {
                    write!(f, "\n\t{}", trail.iter().join("\n\t"))?;
                }
                Ok(())
            }
        }
    }
}

impl VMError {
    /// Records the frame a failure unwound through, innermost frames come first.
    pub fn with_frame(self, frame: TraceFrame) -> Self {
        match self {
            VMError::Execution { cause, mut trail } => {
                trail.push(frame);
                VMError::Execution { cause, trail }
            }
            cause => VMError::Execution {
                cause: Box::new(cause),
                trail: vec![frame],
            },
        }
    }

    pub fn root_cause(&self) -> &VMError {
        match self {
            VMError::Execution { cause, .. } => cause.root_cause(),
            e => e,
        }
    }

    pub fn trail(&self) -> &[TraceFrame] {
        match self {
            VMError::Execution { trail, .. } => trail,
            _ => &[],
        }
    }

    #[inline]
    pub fn is_abort(&self) -> bool {
        matches!(self.root_cause(), VMError::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wasm_bindgen_test::*;

    fn frame(program: &str, ip: usize) -> TraceFrame {
        TraceFrame {
            program: program.to_string(),
            source: Some(format!("{program}.q")),
            ip,
            location: Some(SourceLocation { line: ip + 1, column: 1 }),
        }
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn frames_accumulate_innermost_first() {
        let e = VMError::RuntimeError("boom".to_string())
            .with_frame(frame("inner", 3))
            .with_frame(frame("outer", 7));
        assert_eq!(e.root_cause(), &VMError::RuntimeError("boom".to_string()));
        let programs: Vec<_> = e.trail().iter().map(|f| f.program.as_str()).collect();
        assert_eq!(programs, vec!["inner", "outer"]);
        assert_eq!(
            e.to_string(),
            "boom\n\tat inner (inner.q:4:1) [ip 3]\n\tat outer (outer.q:8:1) [ip 7]"
        );
    }

    #[wasm_bindgen_test(unsupported = test)]
    fn abort_survives_trail() {
        let e = VMError::Aborted.with_frame(frame("main", 0));
        assert!(e.is_abort());
        assert!(!VMError::RuntimeError("x".into()).is_abort());
    }
}
