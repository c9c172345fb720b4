//! The call stack: rule and macro activations.
//!
//! A rule can call a macro and a macro can call another macro, so
//! saving the program counter alone is not enough; every frame also
//! records which code section and unit it executes and the global
//! word indices its local positions map to.

use xfer_core::Section;

use crate::error::VmError;

/// Deepest allowed chain of macro calls. The assembly has no cycle
/// detection, so runaway recursion surfaces as an error here instead
/// of exhausting memory.
pub const MAX_CALL_DEPTH: usize = 128;

/// One rule or macro activation.
#[derive(Debug, Clone)]
pub struct Frame {
    pub section: Section,
    pub number: usize,
    /// Global word-table indices, ordered by the unit's local
    /// positions.
    pub words: Vec<usize>,
    /// Saved resume address of this frame while a callee runs.
    pub pc: usize,
}

/// Stack of activations; the top frame is the executing code unit.
#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<Frame>,
}

impl CallStack {
    pub fn new() -> CallStack {
        CallStack::default()
    }

    pub fn push(&mut self, frame: Frame) -> Result<(), VmError> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(VmError::CallDepth(MAX_CALL_DEPTH));
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Save the caller's program counter before pushing a callee.
    pub fn save_pc(&mut self, pc: usize) {
        if let Some(top) = self.frames.last_mut() {
            top.pc = pc;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(number: usize) -> Frame {
        Frame {
            section: Section::Macros,
            number,
            words: vec![0],
            pc: 0,
        }
    }

    #[test]
    fn saved_pc_survives_a_call() {
        let mut stack = CallStack::new();
        stack
            .push(Frame {
                section: Section::Rules,
                number: 0,
                words: vec![3, 4],
                pc: 0,
            })
            .unwrap();
        stack.save_pc(17);
        stack.push(frame(1)).unwrap();
        stack.pop();
        assert_eq!(stack.top().unwrap().pc, 17);
        assert_eq!(stack.top().unwrap().words, [3, 4]);
    }

    #[test]
    fn depth_is_bounded() {
        let mut stack = CallStack::new();
        for i in 0..MAX_CALL_DEPTH {
            stack.push(frame(i)).unwrap();
        }
        assert!(matches!(
            stack.push(frame(0)),
            Err(VmError::CallDepth(MAX_CALL_DEPTH))
        ));
    }
}
