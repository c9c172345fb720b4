//! Error types of the loader and the VM proper.
//!
//! Warnings (rule-number conflicts at trie terminals, unresolved
//! chunk-tag references) are not errors: they are logged through
//! `tracing` and processing continues. Everything here stops the run.

use thiserror::Error;
use xfer_core::StackError;

/// Errors raised while reading and translating an assembly file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("the header of the code file is not recognized: {0}")]
    BadHeader(String),
    #[error("unsupported transfer stage header: {0}")]
    BadStageHeader(String),
    #[error("line {line}: unrecognized instruction: {text}")]
    UnrecognizedInstruction { line: u32, text: String },
    #[error("line {line}: call to unknown macro '{name}'")]
    UnknownMacro { line: u32, name: String },
    #[error("line {line}: malformed rule label '{label}'")]
    BadRuleLabel { line: u32, label: String },
    #[error("undefined label '{0}' after backpatching")]
    UndefinedLabel(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while executing instructions or driving the run
/// loop.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("loader error: {0}")]
    Load(#[from] LoadError),
    #[error("line {line}: {source}")]
    Stack {
        line: u32,
        #[source]
        source: StackError,
    },
    #[error("line {line}: word position {pos} is out of range")]
    WordPosition { line: u32, pos: i64 },
    #[error("rule {0} does not exist")]
    UnknownRule(usize),
    #[error("macro {0} does not exist")]
    UnknownMacroNumber(usize),
    #[error("line {line}: the target side is only available in the transfer stage")]
    NoTargetSide { line: u32 },
    #[error("macro call depth exceeded ({0} frames)")]
    CallDepth(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VmError {
    /// Attach the current assembly line to a stack error.
    pub fn stack(line: u32, source: StackError) -> VmError {
        VmError::Stack { line, source }
    }
}
