//! Compiler from transfer rule markup to VM assembly.
//!
//! The pipeline is parser → AST → code generator: the markup event
//! stream is folded into a [`ast::RuleFile`], validated, and walked
//! once to emit the line-oriented assembly the VM loads.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod event;
pub mod parser;

use std::fs;
use std::io::Read;
use std::path::Path;

pub use ast::RuleFile;
pub use codegen::AssemblyCodeGenerator;
pub use error::CompileError;
pub use parser::Parser;

/// Compile rule markup read from `input` to assembly text.
pub fn compile(input: impl Read) -> Result<String, CompileError> {
    let mut parser = Parser::new(input);
    let rule_file = parser.parse()?;
    Ok(AssemblyCodeGenerator::new(&rule_file).generate())
}

/// Compile a rule file on disk to assembly text.
pub fn compile_file(path: &Path) -> Result<String, CompileError> {
    let source = fs::File::open(path)?;
    compile(source)
}
