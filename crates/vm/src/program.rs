use crate::Instruction;
use indexmap::IndexMap;
use quill_core::{SourceLocation, TraceFrame};
use std::fmt::{Display, Formatter, Write};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(u64);

impl ProgramId {
    pub(crate) fn next() -> Self {
        ProgramId(NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for ProgramId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ExecutionType {
    /// Runs to completion on the calling thread and never suspends
    #[default]
    Synchronous,
    /// Runs through the scheduler and may suspend
    Asynchronous,
}

/// Immutable compiled artifact, shared by every execution state running it.
#[derive(Debug)]
pub struct Program {
    pub(crate) id: ProgramId,
    pub(crate) name: String,
    pub(crate) source: Option<String>,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) locations: Vec<Option<SourceLocation>>,
    pub(crate) locals: IndexMap<String, usize>,
    pub(crate) globals: IndexMap<String, usize>,
    pub(crate) parameters: Vec<String>,
    pub(crate) execution_type: ExecutionType,
    pub(crate) deterministic: bool,
}

impl Program {
    #[inline]
    pub fn id(&self) -> ProgramId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    #[inline]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    #[inline]
    pub fn instruction(&self, ip: usize) -> Option<&Instruction> {
        self.instructions.get(ip)
    }

    pub fn location(&self, ip: usize) -> Option<SourceLocation> {
        self.locations.get(ip).copied().flatten()
    }

    pub fn local_slot(&self, name: &str) -> Option<usize> {
        self.locals.get(name).copied()
    }

    pub fn global_slot(&self, name: &str) -> Option<usize> {
        self.globals.get(name).copied()
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// One past the highest global slot this program touches.
    pub fn global_count(&self) -> usize {
        self.globals.values().max().map_or(0, |m| m + 1)
    }

    pub fn globals(&self) -> impl Iterator<Item = (&str, usize)> {
        self.globals.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    #[inline]
    pub fn execution_type(&self) -> ExecutionType {
        self.execution_type
    }

    #[inline]
    pub fn is_asynchronous(&self) -> bool {
        self.execution_type == ExecutionType::Asynchronous
    }

    /// Every function this program calls is side-effect free, so calls to it may be cached.
    #[inline]
    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    pub(crate) fn frame(&self, ip: usize) -> TraceFrame {
        TraceFrame {
            program: self.name.clone(),
            source: self.source.clone(),
            ip,
            location: self.location(ip),
        }
    }

    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "program {} ({}, {:?}{})",
            self.name,
            self.id,
            self.execution_type,
            if self.deterministic { ", deterministic" } else { "" }
        );
        if !self.parameters.is_empty() {
            let _ = writeln!(out, "  params: {}", self.parameters.join(", "));
        }
        for (ip, instruction) in self.instructions.iter().enumerate() {
            let _ = match self.location(ip) {
                None => writeln!(out, "  {ip:>4}  {instruction}"),
                Some(l) => writeln!(out, "  {ip:>4}  {:<32} ; {l}", instruction.to_string()),
            };
        }
        out
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
