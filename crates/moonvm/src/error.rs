// VM error values.
//
// A single error struct covers compile-time and runtime failures; the kind
// discriminant lets embedders route them to different reporting channels.

use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmErrorKind {
    /// Source failed to lex/parse or a binary chunk was rejected.
    Compile,
    /// Error raised while executing (explicit `error()`, type error, ...).
    Runtime,
    /// Call depth limit exceeded.
    StackOverflow,
    /// The owner of a suspended coroutine went away; the coroutine thread
    /// unwinds with this kind and never reports it anywhere.
    Terminated,
}

#[derive(Debug, Clone)]
pub struct VmError {
    pub kind: VmErrorKind,
    pub message: String,
    /// Human-readable chunk label, empty when unknown.
    pub source: SmolStr,
    /// 1-based line, 0 when unknown.
    pub line: u32,
}

impl VmError {
    pub fn compile(message: impl Into<String>) -> Self {
        VmError {
            kind: VmErrorKind::Compile,
            message: message.into(),
            source: SmolStr::default(),
            line: 0,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        VmError {
            kind: VmErrorKind::Runtime,
            message: message.into(),
            source: SmolStr::default(),
            line: 0,
        }
    }

    pub fn stack_overflow() -> Self {
        VmError {
            kind: VmErrorKind::StackOverflow,
            message: "stack overflow".to_string(),
            source: SmolStr::default(),
            line: 0,
        }
    }

    pub(crate) fn terminated() -> Self {
        VmError {
            kind: VmErrorKind::Terminated,
            message: "coroutine terminated".to_string(),
            source: SmolStr::default(),
            line: 0,
        }
    }

    /// Attach a source label and line if none is set yet.
    pub fn at(mut self, source: &SmolStr, line: u32) -> Self {
        if self.line == 0 {
            self.source = source.clone();
            self.line = line;
        }
        self
    }
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line > 0 {
            write!(f, "{}:{}: {}", self.source, self.line, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for VmError {}

pub type VmResult<T> = Result<T, VmError>;
