//! Compiler error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("markup error: {0}")]
    Markup(String),
    #[error("line {line}: unexpected element <{name}>")]
    UnexpectedElement { line: u64, name: String },
    #[error("line {line}: unexpected end of element <{name}>")]
    UnexpectedEnd { line: u64, name: String },
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("line {line}: element <{name}> is missing attribute '{attribute}'")]
    MissingAttribute {
        line: u64,
        name: String,
        attribute: &'static str,
    },
    #[error("line {line}: unknown category '{name}'")]
    UnknownCategory { line: u64, name: String },
    #[error("line {line}: unknown attribute '{name}'")]
    UnknownAttribute { line: u64, name: String },
    #[error("line {line}: unknown list '{name}'")]
    UnknownList { line: u64, name: String },
    #[error("line {line}: macro '{name}' already defined")]
    DuplicateMacro { line: u64, name: String },
    #[error("line {line}: call to unknown macro '{name}'")]
    UnknownMacro { line: u64, name: String },
    #[error("line {line}: macro '{name}' takes {expected} parameter(s), {found} passed")]
    WrongParamCount {
        line: u64,
        name: String,
        expected: usize,
        found: usize,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
