//! Shared foundation for the xfer transfer toolchain.
//!
//! Holds the pieces the compiler and the VM agree on: the instruction
//! model (opcodes, code units, code sections), the typed operand
//! stack, and the case/string operations that replace the reference
//! implementation's locale-global helpers.

pub mod instructions;
pub mod stack;
pub mod strings;

pub use instructions::{CodeSection, CodeUnit, Instruction, Opcode, RawLine, Section};
pub use stack::{StackError, SystemStack, Value};
pub use strings::LetterCase;
