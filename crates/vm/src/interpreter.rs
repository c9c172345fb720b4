//! Instruction execution.
//!
//! One handler per opcode; the dispatch switches on the decoded
//! opcode, never on text. After a handler runs, the driver advances
//! the program counter unless the handler set it itself (jumps,
//! calls).

use xfer_core::strings::{self, LetterCase};
use xfer_core::{Instruction, Opcode, Section, StackError, Value};

use crate::call_stack::Frame;
use crate::error::VmError;
use crate::lexical_unit::{LexicalUnit, LuPart, LuRef};
use crate::vm::{Stage, Vm};
use crate::word::TransferWord;

/// What a store-clip did to its target unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreOutcome {
    None,
    Part,
    Chcontent,
}

impl Vm {
    /// Execute a single instruction against the VM state.
    pub(crate) fn execute(&mut self, instr: &Instruction) -> Result<(), VmError> {
        match instr.opcode {
            Opcode::PushStr => {
                self.stack.push_str(instr.op1.clone());
                Ok(())
            }
            Opcode::PushInt => {
                self.stack.push_int(instr.int_op1);
                Ok(())
            }
            Opcode::PushVar => {
                let value = self
                    .variables
                    .entry(instr.op1.clone())
                    .or_default()
                    .clone();
                self.stack.push_str(value);
                Ok(())
            }
            Opcode::Pushbl => {
                self.stack.push_str(" ");
                Ok(())
            }
            Opcode::Pushsb => self.execute_pushsb(instr),
            Opcode::Jmp => {
                self.modify_pc(instr.int_op1 as usize);
                Ok(())
            }
            Opcode::Jz => self.execute_jz(instr),
            Opcode::Jnz => self.execute_jnz(instr),
            Opcode::Call => self.execute_call(instr),
            Opcode::Ret => {
                self.execute_ret();
                Ok(())
            }
            Opcode::Clip => self.execute_clip(instr),
            Opcode::Clipsl => self.execute_clipsl(instr),
            Opcode::Cliptl => self.execute_cliptl(instr),
            Opcode::Storecl => self.execute_store_clip(instr, false, false),
            Opcode::Storesl => self.execute_store_clip(instr, true, false),
            Opcode::Storetl => self.execute_store_clip(instr, true, true),
            Opcode::Cmp => self.execute_cmp(instr, false),
            Opcode::Cmpi => self.execute_cmp(instr, true),
            Opcode::CmpSubstr => self.execute_cmp_substr(instr, false),
            Opcode::CmpiSubstr => self.execute_cmp_substr(instr, true),
            Opcode::BeginsWith => self.execute_begins_with(instr, false),
            Opcode::BeginsWithIg => self.execute_begins_with(instr, true),
            Opcode::EndsWith => self.execute_ends_with(instr, false),
            Opcode::EndsWithIg => self.execute_ends_with(instr, true),
            Opcode::In => self.execute_in(instr, false),
            Opcode::Inig => self.execute_in(instr, true),
            Opcode::And => self.execute_and(instr),
            Opcode::Or => self.execute_or(instr),
            Opcode::Not => self.execute_not(instr),
            Opcode::Concat => self.execute_concat(instr),
            Opcode::Lu => self.execute_lu(instr),
            Opcode::Mlu => self.execute_mlu(instr),
            Opcode::Chunk => self.execute_chunk(instr),
            Opcode::Append => self.execute_append(instr),
            Opcode::CaseOf => self.execute_case_of(instr),
            Opcode::GetCaseFrom => self.execute_get_case_from(instr),
            Opcode::ModifyCase => self.execute_modify_case(instr),
            Opcode::Out => self.execute_out(instr),
            Opcode::LuCount => self.execute_lu_count(instr),
            Opcode::Addtrie => self.execute_addtrie(instr),
            Opcode::Storev => self.execute_storev(instr),
        }
    }

    fn modify_pc(&mut self, new_pc: usize) {
        self.pc = new_pc;
        self.pc_modified = true;
    }

    fn stack_err(line: u32) -> impl Fn(StackError) -> VmError {
        move |source| VmError::stack(line, source)
    }

    /// Map a rule-local 1-based word position to its global index.
    fn current_word_at(&self, local: i64, line: u32) -> Result<usize, VmError> {
        let out_of_range = || VmError::WordPosition { line, pos: local };
        let index = local
            .checked_sub(1)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(out_of_range)?;
        self.current_words()
            .get(index)
            .copied()
            .ok_or_else(out_of_range)
    }

    /// Resolve a postchunk position: the executing chunk's index in
    /// the word table plus the position inside its content (0 is the
    /// chunk unit itself).
    fn postchunk_target(&self, local: i64, line: u32) -> Result<(usize, usize), VmError> {
        let words = self.current_words();
        let word_index = words
            .first()
            .copied()
            .ok_or(VmError::WordPosition { line, pos: local })?;
        let real = if words.len() > 1 {
            let index =
                usize::try_from(local).map_err(|_| VmError::WordPosition { line, pos: local })?;
            words
                .get(index)
                .copied()
                .ok_or(VmError::WordPosition { line, pos: local })?
        } else {
            usize::try_from(local).map_err(|_| VmError::WordPosition { line, pos: local })?
        };
        Ok((word_index, real))
    }

    /// The source-side unit at a rule-local position, for every
    /// stage.
    fn source_lu(&mut self, local: i64, line: u32) -> Result<LuRef<'_>, VmError> {
        match self.stage {
            Stage::Transfer => {
                let real = self.current_word_at(local, line)?;
                match &mut self.words[real] {
                    TransferWord::Bilingual(w) => Ok(LuRef::Mono(&mut w.source)),
                    TransferWord::Chunk(w) => Ok(LuRef::Chunk(&mut w.chunk)),
                }
            }
            Stage::Interchunk => {
                let real = self.current_word_at(local, line)?;
                match &mut self.words[real] {
                    TransferWord::Chunk(w) => Ok(LuRef::Chunk(&mut w.chunk)),
                    TransferWord::Bilingual(w) => Ok(LuRef::Mono(&mut w.source)),
                }
            }
            Stage::Postchunk => {
                let (word_index, real) = self.postchunk_target(local, line)?;
                match &mut self.words[word_index] {
                    TransferWord::Chunk(w) => {
                        if real == 0 {
                            Ok(LuRef::Chunk(&mut w.chunk))
                        } else {
                            w.content_lexical_unit(real - 1)
                                .map(LuRef::Mono)
                                .ok_or(VmError::WordPosition { line, pos: local })
                        }
                    }
                    TransferWord::Bilingual(w) => Ok(LuRef::Mono(&mut w.source)),
                }
            }
        }
    }

    /// The target-side unit at a rule-local position; only the
    /// transfer stage has one.
    fn target_lu(&mut self, local: i64, line: u32) -> Result<&mut LexicalUnit, VmError> {
        let real = self.current_word_at(local, line)?;
        match &mut self.words[real] {
            TransferWord::Bilingual(w) => Ok(&mut w.target),
            TransferWord::Chunk(_) => Err(VmError::NoTargetSide { line }),
        }
    }

    fn execute_pushsb(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let relative = instr.int_op1;

        if self.stage == Stage::Postchunk {
            let word_index = self.current_words().first().copied();
            let blank = match word_index {
                Some(index) => match &mut self.words[index] {
                    TransferWord::Chunk(w) => {
                        w.blank(usize::try_from(relative).unwrap_or(usize::MAX))
                    }
                    TransferWord::Bilingual(_) => String::new(),
                },
                None => String::new(),
            };
            self.stack.push_str(blank);
        } else {
            // Relative to the first word of the matched window.
            let base = self.current_words().first().copied().unwrap_or(0) as i64;
            let actual = usize::try_from(relative + base).unwrap_or(usize::MAX);
            let blank = self.superblanks.get(actual).cloned().unwrap_or_default();
            self.stack.push_str(blank);
        }
        Ok(())
    }

    fn execute_jz(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let condition = self.stack.pop_bool().map_err(Self::stack_err(instr.line))?;
        if !condition {
            self.modify_pc(instr.int_op1 as usize);
        }
        Ok(())
    }

    fn execute_jnz(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let condition = self.stack.pop_bool().map_err(Self::stack_err(instr.line))?;
        if condition {
            self.modify_pc(instr.int_op1 as usize);
        }
        Ok(())
    }

    /// Call a macro: pop the parameter count and the parameters,
    /// remap the local word positions to global indices, save the
    /// caller's PC and push the macro frame.
    fn execute_call(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let err = Self::stack_err(instr.line);
        let count = self.stack.pop_int().map_err(&err)?;
        let mut params = Vec::new();
        for _ in 0..count {
            params.push(self.stack.pop_int().map_err(&err)?);
        }
        params.reverse();

        let words = match self.stage {
            Stage::Postchunk => {
                // The chunk in execution first, then the raw content
                // positions, resolved on access.
                let mut words = Vec::with_capacity(params.len() + 1);
                words.push(self.current_words().first().copied().ok_or(
                    VmError::WordPosition {
                        line: instr.line,
                        pos: 0,
                    },
                )?);
                for &param in &params {
                    words.push(usize::try_from(param).map_err(|_| VmError::WordPosition {
                        line: instr.line,
                        pos: param,
                    })?);
                }
                words
            }
            _ => {
                let mut words = Vec::with_capacity(params.len());
                for &param in &params {
                    words.push(self.current_word_at(param, instr.line)?);
                }
                words
            }
        };

        self.call_stack.save_pc(self.pc);
        self.call_stack.push(Frame {
            section: Section::Macros,
            number: instr.int_op1 as usize,
            words,
            pc: 0,
        })?;
        self.modify_pc(0);
        Ok(())
    }

    /// Return from a macro (or a rule): pop the frame and restore the
    /// caller's PC, which the driver then advances past the call.
    fn execute_ret(&mut self) {
        self.call_stack.pop();
        if let Some(top) = self.call_stack.top() {
            self.pc = top.pc;
        }
    }

    /// Resolve a clip: a named part reads directly; anything else is
    /// a `|`-alternation matched against the reference string, where
    /// the longest occurring alternative wins. With a link-to
    /// operand, any match short-circuits to the literal link-to text.
    fn clip_value(lu: &mut LuRef<'_>, parts: &str, reference: &str, link_to: Option<&str>) -> String {
        if link_to.is_none() {
            if let Some(part) = LuPart::from_name(parts) {
                return lu.part(part);
            }
        }

        let mut longest = "";
        for part in parts.split('|') {
            if reference.contains(part) {
                if let Some(link) = link_to {
                    return link.to_string();
                }
                if part.len() > longest.len() {
                    longest = part;
                }
            }
        }
        longest.to_string()
    }

    fn link_to_of(instr: &Instruction) -> Option<String> {
        if instr.op1.is_empty() {
            None
        } else {
            Some(instr.op1.replace('"', ""))
        }
    }

    fn execute_clip(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let err = Self::stack_err(instr.line);
        let parts = self.stack.pop_str().map_err(&err)?;
        let pos = self.stack.pop_int().map_err(&err)?;
        let link_to = Self::link_to_of(instr);

        let value = {
            let mut lu = self.source_lu(pos, instr.line)?;
            let reference = format!("{}{}", lu.part(LuPart::Lem), lu.part(LuPart::Tags));
            Self::clip_value(&mut lu, &parts, &reference, link_to.as_deref())
        };
        self.stack.push_str(value);
        Ok(())
    }

    fn execute_clipsl(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let err = Self::stack_err(instr.line);
        let parts = self.stack.pop_str().map_err(&err)?;
        let pos = self.stack.pop_int().map_err(&err)?;
        let link_to = Self::link_to_of(instr);

        let value = {
            let mut lu = self.source_lu(pos, instr.line)?;
            let reference = lu.whole();
            Self::clip_value(&mut lu, &parts, &reference, link_to.as_deref())
        };
        self.stack.push_str(value);
        Ok(())
    }

    fn execute_cliptl(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let err = Self::stack_err(instr.line);
        let parts = self.stack.pop_str().map_err(&err)?;
        let pos = self.stack.pop_int().map_err(&err)?;
        let link_to = Self::link_to_of(instr);

        let value = {
            let lu = self.target_lu(pos, instr.line)?;
            let mut lu = LuRef::Mono(lu);
            let reference = lu.whole();
            Self::clip_value(&mut lu, &parts, &reference, link_to.as_deref())
        };
        self.stack.push_str(value);
        Ok(())
    }

    /// Write a value into a part of a unit. Named parts store
    /// directly; an alternation replaces the longest alternative
    /// occurring in the reference string via `modify_tag`.
    fn store_value(lu: &mut LuRef<'_>, parts: &str, reference: &str, value: &str) -> StoreOutcome {
        match parts {
            "whole" => {
                lu.set_part(LuPart::Whole, value);
                StoreOutcome::Part
            }
            "lem" => {
                lu.set_part(LuPart::Lem, value);
                StoreOutcome::Part
            }
            "lemh" => {
                lu.set_part(LuPart::Lemh, value);
                StoreOutcome::Part
            }
            "lemq" => {
                lu.set_part(LuPart::Lemq, value);
                StoreOutcome::Part
            }
            "tags" => {
                lu.set_part(LuPart::Tags, value);
                StoreOutcome::Part
            }
            "chcontent" => {
                lu.set_part(LuPart::Chcontent, value);
                StoreOutcome::Chcontent
            }
            _ => {
                let mut longest = "";
                for part in parts.split('|') {
                    if reference.contains(part) && part.len() > longest.len() {
                        longest = part;
                    }
                }
                if longest.is_empty() {
                    StoreOutcome::None
                } else {
                    lu.modify_tag(longest, value);
                    StoreOutcome::Part
                }
            }
        }
    }

    fn execute_store_clip(
        &mut self,
        instr: &Instruction,
        whole_reference: bool,
        target_side: bool,
    ) -> Result<(), VmError> {
        let err = Self::stack_err(instr.line);
        let value = self.stack.pop_str().map_err(&err)?;
        let parts = self.stack.pop_str().map_err(&err)?;
        let pos = self.stack.pop_int().map_err(&err)?;

        if target_side {
            let lu = self.target_lu(pos, instr.line)?;
            let mut lu = LuRef::Mono(lu);
            let reference = lu.whole();
            Self::store_value(&mut lu, &parts, &reference, &value);
            return Ok(());
        }

        if self.stage == Stage::Postchunk {
            return self.store_clip_postchunk(instr, pos, &parts, &value, whole_reference);
        }

        let mut lu = self.source_lu(pos, instr.line)?;
        let reference = if whole_reference {
            lu.whole()
        } else {
            format!("{}{}", lu.part(LuPart::Lem), lu.part(LuPart::Tags))
        };
        Self::store_value(&mut lu, &parts, &reference, &value);
        Ok(())
    }

    /// Postchunk store: the chunk content must be kept consistent
    /// with the mutated unit. A change of a part reflects the unit's
    /// new whole into `chcontent`; a change of `chcontent` itself
    /// re-parses the inner units.
    fn store_clip_postchunk(
        &mut self,
        instr: &Instruction,
        pos: i64,
        parts: &str,
        value: &str,
        whole_reference: bool,
    ) -> Result<(), VmError> {
        let (word_index, real) = self.postchunk_target(pos, instr.line)?;
        let word = match &mut self.words[word_index] {
            TransferWord::Chunk(w) => w,
            TransferWord::Bilingual(_) => {
                return Err(VmError::WordPosition {
                    line: instr.line,
                    pos,
                })
            }
        };

        let (old_whole, new_whole, outcome) = if real == 0 {
            let mut lu = LuRef::Chunk(&mut word.chunk);
            let old = lu.whole();
            let reference = if whole_reference {
                lu.whole()
            } else {
                format!("{}{}", lu.part(LuPart::Lem), lu.part(LuPart::Tags))
            };
            let outcome = Self::store_value(&mut lu, parts, &reference, value);
            (old, lu.whole(), outcome)
        } else {
            let inner = word
                .content_lexical_unit(real - 1)
                .ok_or(VmError::WordPosition {
                    line: instr.line,
                    pos,
                })?;
            let mut lu = LuRef::Mono(inner);
            let old = lu.whole();
            let reference = if whole_reference {
                lu.whole()
            } else {
                format!("{}{}", lu.part(LuPart::Lem), lu.part(LuPart::Tags))
            };
            let outcome = Self::store_value(&mut lu, parts, &reference, value);
            (old, lu.whole(), outcome)
        };

        match outcome {
            StoreOutcome::Chcontent => word.parse_chunk_content(),
            StoreOutcome::Part => word.update_chunk_content(&old_whole, &new_whole),
            StoreOutcome::None => {}
        }
        Ok(())
    }

    fn execute_cmp(&mut self, instr: &Instruction, ignore_case: bool) -> Result<(), VmError> {
        let err = Self::stack_err(instr.line);
        let mut first = self.stack.pop_str().map_err(&err)?;
        let mut second = self.stack.pop_str().map_err(&err)?;
        if ignore_case {
            first = strings::lowercase(&first);
            second = strings::lowercase(&second);
        }
        self.stack.push_bool(first == second);
        Ok(())
    }

    fn execute_cmp_substr(&mut self, instr: &Instruction, ignore_case: bool) -> Result<(), VmError> {
        let err = Self::stack_err(instr.line);
        let mut needle = self.stack.pop_str().map_err(&err)?;
        let mut haystack = self.stack.pop_str().map_err(&err)?;
        if ignore_case {
            needle = strings::lowercase(&needle);
            haystack = strings::lowercase(&haystack);
        }
        self.stack.push_bool(haystack.contains(&needle));
        Ok(())
    }

    fn execute_begins_with(&mut self, instr: &Instruction, ignore_case: bool) -> Result<(), VmError> {
        let err = Self::stack_err(instr.line);
        let mut prefixes = self.stack.pop_str().map_err(&err)?;
        let mut word = self.stack.pop_str().map_err(&err)?;
        if ignore_case {
            prefixes = strings::lowercase(&prefixes);
            word = strings::lowercase(&word);
        }
        let result = !word.is_empty() && prefixes.split('|').any(|p| word.starts_with(p));
        self.stack.push_bool(result);
        Ok(())
    }

    fn execute_ends_with(&mut self, instr: &Instruction, ignore_case: bool) -> Result<(), VmError> {
        let err = Self::stack_err(instr.line);
        let mut suffixes = self.stack.pop_str().map_err(&err)?;
        let mut word = self.stack.pop_str().map_err(&err)?;
        if ignore_case {
            suffixes = strings::lowercase(&suffixes);
            word = strings::lowercase(&word);
        }
        let result = !word.is_empty() && suffixes.split('|').any(|s| word.ends_with(s));
        self.stack.push_bool(result);
        Ok(())
    }

    fn execute_in(&mut self, instr: &Instruction, ignore_case: bool) -> Result<(), VmError> {
        let err = Self::stack_err(instr.line);
        let mut list = self.stack.pop_str().map_err(&err)?;
        let mut value = self.stack.pop_str().map_err(&err)?;
        if ignore_case {
            list = strings::lowercase(&list);
            value = strings::lowercase(&value);
        }
        let result = list.split('|').any(|item| item == value);
        self.stack.push_bool(result);
        Ok(())
    }

    fn truthy(value: &Value, line: u32) -> Result<bool, VmError> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(n) => Ok(*n != 0),
            Value::Str(_) => Err(VmError::stack(
                line,
                StackError::Mismatch {
                    expected: "boolean",
                    found: "string",
                },
            )),
        }
    }

    fn execute_and(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let n = instr.int_op1 as usize;
        let mut result = true;
        for value in self.stack.window(n).map_err(Self::stack_err(instr.line))? {
            if !Self::truthy(value, instr.line)? {
                result = false;
                break;
            }
        }
        self.stack.drop_top(n).map_err(Self::stack_err(instr.line))?;
        self.stack.push_bool(result);
        Ok(())
    }

    fn execute_or(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let n = instr.int_op1 as usize;
        let mut result = false;
        for value in self.stack.window(n).map_err(Self::stack_err(instr.line))? {
            if Self::truthy(value, instr.line)? {
                result = true;
                break;
            }
        }
        self.stack.drop_top(n).map_err(Self::stack_err(instr.line))?;
        self.stack.push_bool(result);
        Ok(())
    }

    fn execute_not(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let value = self.stack.pop_bool().map_err(Self::stack_err(instr.line))?;
        self.stack.push_bool(!value);
        Ok(())
    }

    /// Concatenate the top `n` operands in push order.
    fn concat_window(&mut self, n: usize, line: u32) -> Result<String, VmError> {
        let mut text = String::new();
        for value in self.stack.window(n).map_err(Self::stack_err(line))? {
            text.push_str(&value.render());
        }
        self.stack.drop_top(n).map_err(Self::stack_err(line))?;
        Ok(text)
    }

    fn execute_concat(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let text = self.concat_window(instr.int_op1 as usize, instr.line)?;
        self.stack.push_str(text);
        Ok(())
    }

    fn execute_lu(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let text = self.concat_window(instr.int_op1 as usize, instr.line)?;
        if text.is_empty() {
            self.stack.push_str("");
        } else {
            self.stack.push_str(format!("^{}$", text));
        }
        Ok(())
    }

    /// Join lexical units into one multiword `^a+b$`, stripping the
    /// operands' own delimiters.
    fn execute_mlu(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let n = instr.int_op1 as usize;
        if n == 0 {
            self.stack.push_str("");
            return Ok(());
        }

        let mut inner = Vec::with_capacity(n);
        for value in self.stack.window(n).map_err(Self::stack_err(instr.line))? {
            let rendered = value.render();
            let stripped = rendered
                .get(1..rendered.len().saturating_sub(1))
                .unwrap_or("")
                .to_string();
            inner.push(stripped);
        }
        self.stack.drop_top(n).map_err(Self::stack_err(instr.line))?;
        self.stack.push_str(format!("^{}$", inner.join("+")));
        Ok(())
    }

    /// Build a chunk. With one operand the operand is the full
    /// content; otherwise the first two are name and tags, and any
    /// remaining operands are the content, brace-wrapped only in the
    /// transfer stage (interchunk content already carries braces).
    fn execute_chunk(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let n = instr.int_op1 as usize;
        let rendered: Vec<String> = self
            .stack
            .window(n)
            .map_err(Self::stack_err(instr.line))?
            .iter()
            .map(Value::render)
            .collect();

        let chunk = if n == 1 {
            format!("^{}$", rendered[0])
        } else {
            let mut chunk = format!("^{}{}", rendered[0], rendered[1]);
            if n > 2 {
                if self.stage == Stage::Transfer {
                    chunk.push('{');
                }
                for part in &rendered[2..] {
                    chunk.push_str(part);
                }
                if self.stage == Stage::Transfer {
                    chunk.push('}');
                }
            }
            chunk.push('$');
            chunk
        };

        self.stack.drop_top(n).map_err(Self::stack_err(instr.line))?;
        self.stack.push_str(chunk);
        Ok(())
    }

    /// Append the top operands to a named variable.
    fn execute_append(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let text = self.concat_window(instr.int_op1 as usize, instr.line)?;
        let name = self.stack.pop_str().map_err(Self::stack_err(instr.line))?;
        *self.variables.entry(name).or_default() += &text;
        Ok(())
    }

    fn execute_case_of(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let value = self.stack.pop_str().map_err(Self::stack_err(instr.line))?;
        self.stack.push_str(strings::case_of(&value).as_str());
        Ok(())
    }

    fn execute_get_case_from(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let pos = self.stack.pop_int().map_err(Self::stack_err(instr.line))?;
        let case: LetterCase = {
            let mut lu = self.source_lu(pos, instr.line)?;
            strings::case_of(&lu.part(LuPart::Lem))
        };
        self.stack.push_str(case.as_str());
        Ok(())
    }

    fn execute_modify_case(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let err = Self::stack_err(instr.line);
        let new_case = self.stack.pop_str().map_err(&err)?;
        let container = self.stack.pop_str().map_err(&err)?;
        self.stack
            .push_str(strings::apply_case_named(&container, &new_case));
        Ok(())
    }

    fn execute_out(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let text = self.concat_window(instr.int_op1 as usize, instr.line)?;
        self.write_output(&text)
    }

    fn execute_lu_count(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let word_index = self
            .current_words()
            .first()
            .copied()
            .ok_or(VmError::WordPosition {
                line: instr.line,
                pos: 0,
            })?;
        let count = match &mut self.words[word_index] {
            TransferWord::Chunk(w) => w.lu_count(),
            TransferWord::Bilingual(_) => 0,
        };
        self.stack.push_int(count as i64);
        Ok(())
    }

    /// Insert a pattern into the trie: pop the part count, then the
    /// parts, and attach the embedded rule number to the terminal.
    fn execute_addtrie(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let err = Self::stack_err(instr.line);
        let count = self.stack.pop_int().map_err(&err)?;
        let mut pattern = Vec::new();
        for _ in 0..count {
            pattern.push(self.stack.pop_str().map_err(&err)?.replace('"', ""));
        }
        pattern.reverse();

        self.trie.add_pattern(&pattern, instr.int_op1 as u32);
        Ok(())
    }

    fn execute_storev(&mut self, instr: &Instruction) -> Result<(), VmError> {
        let err = Self::stack_err(instr.line);
        let value = self.stack.pop_str().map_err(&err)?;
        let name = self.stack.pop_str().map_err(&err)?;
        self.variables.insert(name, value);
        Ok(())
    }
}
