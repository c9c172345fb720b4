//! The VM driver: run loop, rule selection and default output.
//!
//! A run loads the assembly, executes the main code section (variable
//! defaults), executes the preprocess section (which populates the
//! pattern trie), tokenizes the input, and then repeatedly selects
//! the next rule until the words are exhausted. Rule selection is
//! longest-match-left-to-right except in the postchunk stage, which
//! matches one chunk at a time.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use xfer_core::{CodeSection, CodeUnit, Section, SystemStack};

use crate::call_stack::{CallStack, Frame};
use crate::error::{LoadError, VmError};
use crate::lexical_unit::LuPart;
use crate::loader::AssemblyLoader;
use crate::trie::PatternTrie;
use crate::word::{self, TransferWord};

/// The three transfer stages a code file can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transfer,
    Interchunk,
    Postchunk,
}

/// What the transfer stage emits for words no rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDefault {
    Chunk,
    Lu,
}

/// Status of a VM instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted,
    Failed,
}

enum Input {
    Stdin,
    File(PathBuf),
    Text(String),
}

enum Output {
    Writer(BufWriter<Box<dyn Write>>),
    Buffer(Vec<u8>),
}

/// One virtual machine instance. It owns the code sections, the
/// pattern trie, the operand and call stacks, the word table and the
/// output sink; a multi-run scenario instantiates independent VMs.
pub struct Vm {
    pub(crate) stage: Stage,
    pub(crate) transfer_default: TransferDefault,
    debug: bool,

    /// Position of the next instruction to execute.
    pub(crate) pc: usize,
    /// Set by jumps and calls so the dispatch loop keeps their PC.
    pub(crate) pc_modified: bool,
    pub(crate) stack: SystemStack,
    pub(crate) trie: PatternTrie,
    pub(crate) status: Status,

    pub(crate) end_address: usize,
    pub(crate) code: CodeUnit,
    pub(crate) preprocess: CodeUnit,
    pub(crate) rules: CodeSection,
    pub(crate) macros: CodeSection,
    loader: AssemblyLoader,

    pub(crate) call_stack: CallStack,
    pub(crate) words: Vec<TransferWord>,
    pub(crate) superblanks: Vec<String>,
    last_superblank: Option<usize>,
    next_pattern: usize,
    pub(crate) variables: HashMap<String, String>,

    input: Input,
    output: Output,
}

impl Vm {
    /// Build a VM from a code file, reading only its header here; the
    /// body is loaded by [`Vm::run`].
    pub fn from_code_file(path: &Path) -> Result<Vm, VmError> {
        Vm::with_loader(AssemblyLoader::from_file(path)?)
    }

    /// Build a VM from assembly text.
    pub fn from_code_text(text: &str) -> Result<Vm, VmError> {
        Vm::with_loader(AssemblyLoader::from_text(text))
    }

    fn with_loader(loader: AssemblyLoader) -> Result<Vm, VmError> {
        let (first, second) = loader.header_lines();

        if first != Some("#<assembly>") {
            return Err(LoadError::BadHeader(first.unwrap_or("").to_string()).into());
        }

        let stage_line = second.unwrap_or("");
        let (stage, transfer_default) = if stage_line.starts_with("#<transfer") {
            let default = if stage_line.contains("default=\"chunk\"") {
                TransferDefault::Chunk
            } else {
                TransferDefault::Lu
            };
            (Stage::Transfer, default)
        } else if stage_line.starts_with("#<interchunk") {
            (Stage::Interchunk, TransferDefault::Lu)
        } else if stage_line.starts_with("#<postchunk") {
            (Stage::Postchunk, TransferDefault::Lu)
        } else {
            return Err(LoadError::BadStageHeader(stage_line.to_string()).into());
        };

        Ok(Vm {
            stage,
            transfer_default,
            debug: false,
            pc: 0,
            pc_modified: false,
            stack: SystemStack::new(),
            trie: PatternTrie::new(),
            status: Status::Running,
            end_address: 0,
            code: CodeUnit::default(),
            preprocess: CodeUnit::default(),
            rules: CodeSection::default(),
            macros: CodeSection::default(),
            loader,
            call_stack: CallStack::new(),
            words: Vec::new(),
            superblanks: Vec::new(),
            last_superblank: None,
            next_pattern: 0,
            variables: HashMap::new(),
            input: Input::Stdin,
            output: Output::Writer(BufWriter::new(Box::new(io::stdout()))),
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn set_input_file(&mut self, path: &Path) {
        self.input = Input::File(path.to_path_buf());
    }

    pub fn set_input_text(&mut self, text: impl Into<String>) {
        self.input = Input::Text(text.into());
    }

    pub fn set_output_file(&mut self, path: &Path) -> Result<(), VmError> {
        let file = File::create(path)?;
        self.output = Output::Writer(BufWriter::new(Box::new(file)));
        Ok(())
    }

    /// Collect output in memory; retrieve it with
    /// [`Vm::take_output`].
    pub fn set_output_buffer(&mut self) {
        self.output = Output::Buffer(Vec::new());
    }

    pub fn take_output(&mut self) -> String {
        match &mut self.output {
            Output::Buffer(buffer) => String::from_utf8_lossy(&std::mem::take(buffer)).into_owned(),
            Output::Writer(_) => String::new(),
        }
    }

    pub fn set_debug_mode(&mut self) {
        self.debug = true;
    }

    pub(crate) fn write_output(&mut self, text: &str) -> Result<(), VmError> {
        match &mut self.output {
            Output::Writer(writer) => writer.write_all(text.as_bytes())?,
            Output::Buffer(buffer) => buffer.extend_from_slice(text.as_bytes()),
        }
        Ok(())
    }

    fn flush_output(&mut self) -> Result<(), VmError> {
        if let Output::Writer(writer) = &mut self.output {
            writer.flush()?;
        }
        Ok(())
    }

    /// Load, preprocess and execute the contents of the code file
    /// against the input stream.
    pub fn run(&mut self) -> Result<(), VmError> {
        let result = self.run_inner();
        self.status = match result {
            Ok(()) => Status::Halted,
            Err(_) => Status::Failed,
        };
        result
    }

    fn run_inner(&mut self) -> Result<(), VmError> {
        let program = self.loader.load()?;
        self.code = program.code;
        self.preprocess = program.preprocess;
        self.rules = program.rules;
        self.macros = program.macros;
        self.end_address = program.end_address;

        if self.debug {
            self.print_code_sections();
        }

        self.status = Status::Running;
        self.initialize()?;
        self.run_preprocess()?;
        self.tokenize_input()?;

        while self.next_pattern < self.words.len() {
            self.select_next_rule()?;
        }

        let trailing = self.unique_superblank(self.words.len());
        self.write_output(&trailing)?;
        self.flush_output()
    }

    /// Print all code sections, for debugging.
    pub fn print_code_sections(&self) {
        eprint!("{}", self.loader.dump_unit(&self.code, "Code section"));
        eprint!(
            "{}",
            self.loader.dump_unit(&self.preprocess, "Preprocess section")
        );
        eprint!(
            "{}",
            self.loader.dump_section(&self.rules, "Rules code section", "Rule")
        );
        eprint!(
            "{}",
            self.loader
                .dump_section(&self.macros, "Macros code section", "Macro")
        );
    }

    /// Execute the main code section: variable defaults. Its final
    /// jump past the section end terminates the loop.
    fn initialize(&mut self) -> Result<(), VmError> {
        self.pc = 0;
        self.pc_modified = false;
        while self.pc < self.end_address {
            let instr = self.code.code[self.pc].clone();
            self.execute(&instr)?;
            self.advance_pc();
        }
        Ok(())
    }

    /// Execute the preprocess section, which builds the pattern trie.
    fn run_preprocess(&mut self) -> Result<(), VmError> {
        for index in 0..self.preprocess.code.len() {
            let instr = self.preprocess.code[index].clone();
            self.execute(&instr)?;
            self.pc_modified = false;
        }
        Ok(())
    }

    pub(crate) fn advance_pc(&mut self) {
        if self.pc_modified {
            self.pc_modified = false;
        } else {
            self.pc += 1;
        }
    }

    /// Divide the input into words of the stage-appropriate kind.
    fn tokenize_input(&mut self) -> Result<(), VmError> {
        let text = match &self.input {
            Input::Stdin => {
                let mut buffer = String::new();
                io::stdin().read_to_string(&mut buffer)?;
                buffer
            }
            Input::File(path) => fs::read_to_string(path)?,
            Input::Text(text) => text.clone(),
        };

        match self.stage {
            Stage::Transfer => {
                word::tokenize_bilingual(&text, &mut self.words, &mut self.superblanks)
            }
            Stage::Interchunk => word::tokenize_chunks(
                &text,
                &mut self.words,
                &mut self.superblanks,
                false,
                false,
            ),
            Stage::Postchunk => {
                word::tokenize_chunks(&text, &mut self.words, &mut self.superblanks, true, true)
            }
        }
        Ok(())
    }

    /// The word-index mapping of the executing rule or macro.
    pub(crate) fn current_words(&self) -> &[usize] {
        self.call_stack
            .top()
            .map(|frame| frame.words.as_slice())
            .unwrap_or(&[])
    }

    /// The pattern token of word `index` for the current stage.
    fn source_token(&mut self, index: usize) -> String {
        match (&mut self.words[index], self.stage) {
            (TransferWord::Bilingual(w), _) => w.source.whole(),
            (TransferWord::Chunk(w), Stage::Interchunk) => format!(
                "{}{}",
                w.chunk.part(LuPart::Lem),
                w.chunk.part(LuPart::Tags)
            ),
            (TransferWord::Chunk(w), _) => w.chunk.part(LuPart::Lem),
        }
    }

    /// The superblank at `pos`, at most once: asking again for the
    /// same position (or for one out of range) yields "".
    fn unique_superblank(&mut self, pos: usize) -> String {
        if self.last_superblank == Some(pos) {
            return String::new();
        }
        self.last_superblank = Some(pos);
        self.superblanks.get(pos).cloned().unwrap_or_default()
    }

    fn select_next_rule(&mut self) -> Result<(), VmError> {
        match self.stage {
            Stage::Postchunk => self.select_next_rule_postchunk(),
            _ => self.select_next_rule_lrlm(),
        }
    }

    /// Longest-match-left-to-right: extend the window while the trie
    /// still has live nodes, remembering the last window that carried
    /// a rule. Among rules of equal length the smallest number (the
    /// earliest declaration) wins.
    fn select_next_rule_lrlm(&mut self) -> Result<(), VmError> {
        let start = self.next_pattern;
        let mut best: Option<u32> = None;
        let mut best_end = start;

        let token = self.source_token(start);
        let mut nodes = self.trie.pattern_nodes(&token, PatternTrie::ROOT);
        let mut next_word = start + 1;

        while !nodes.is_empty() {
            if let Some(rule) = self.trie.rule_of_nodes(&nodes) {
                best = Some(rule);
                best_end = next_word;
            }
            if next_word == self.words.len() {
                break;
            }
            let token = self.source_token(next_word);
            let mut extended = Vec::new();
            for &node in &nodes {
                extended.extend(self.trie.pattern_nodes(&token, node));
            }
            nodes = extended;
            next_word += 1;
        }

        match best {
            Some(rule) => {
                self.run_selected_rule(rule as usize, (start..best_end).collect(), start)?;
                let trailing = self.unique_superblank(best_end);
                self.write_output(&trailing)?;
                self.next_pattern = best_end;
            }
            None => {
                self.process_unmatched_pattern(start)?;
                self.next_pattern = start + 1;
            }
        }
        Ok(())
    }

    /// Postchunk selection: one chunk at a time, looked up by its
    /// pseudolemma.
    fn select_next_rule_postchunk(&mut self) -> Result<(), VmError> {
        let index = self.next_pattern;
        let token = self.source_token(index);

        match self.trie.rule_number(&token) {
            Some(rule) => {
                self.run_selected_rule(rule as usize, vec![index], index)?;
                let trailing = self.unique_superblank(index + 1);
                self.write_output(&trailing)?;
            }
            None => self.process_unmatched_pattern(index)?,
        }
        self.next_pattern = index + 1;
        Ok(())
    }

    /// Emit the window's leading superblank, push the rule frame and
    /// interpret until it pops.
    fn run_selected_rule(
        &mut self,
        rule: usize,
        words: Vec<usize>,
        window_start: usize,
    ) -> Result<(), VmError> {
        let leading = self.unique_superblank(window_start);
        self.write_output(&leading)?;

        self.call_stack.push(Frame {
            section: Section::Rules,
            number: rule,
            words,
            pc: 0,
        })?;
        self.pc = 0;
        self.pc_modified = false;

        while self.status == Status::Running {
            let Some(top) = self.call_stack.top() else {
                break;
            };
            let (section, number) = (top.section, top.number);
            self.ensure_loaded(section, number)?;

            let unit = self.unit(section, number)?;
            if self.pc >= unit.code.len() {
                // The unit ran off its end without an explicit ret.
                self.call_stack.pop();
                if let Some(caller) = self.call_stack.top() {
                    self.pc = caller.pc + 1;
                }
                continue;
            }

            let instr = unit.code[self.pc].clone();
            self.execute(&instr)?;
            self.advance_pc();
        }
        Ok(())
    }

    fn ensure_loaded(&mut self, section: Section, number: usize) -> Result<(), VmError> {
        let unit = match section {
            Section::Rules => self
                .rules
                .units
                .get_mut(number)
                .ok_or(VmError::UnknownRule(number))?,
            Section::Macros => self
                .macros
                .units
                .get_mut(number)
                .ok_or(VmError::UnknownMacroNumber(number))?,
        };
        self.loader.load_unit(unit)?;
        Ok(())
    }

    fn unit(&self, section: Section, number: usize) -> Result<&CodeUnit, VmError> {
        match section {
            Section::Rules => self
                .rules
                .units
                .get(number)
                .ok_or(VmError::UnknownRule(number)),
            Section::Macros => self
                .macros
                .units
                .get(number)
                .ok_or(VmError::UnknownMacroNumber(number)),
        }
    }

    /// Default output for a word no rule matched.
    fn process_unmatched_pattern(&mut self, index: usize) -> Result<(), VmError> {
        let leading = self.unique_superblank(index);
        self.write_output(&leading)?;

        let rendering = match self.stage {
            Stage::Transfer => {
                let target = match &mut self.words[index] {
                    TransferWord::Bilingual(w) => w.target.whole(),
                    TransferWord::Chunk(w) => w.chunk.whole(),
                };
                if target.is_empty() {
                    String::new()
                } else {
                    match self.transfer_default {
                        TransferDefault::Lu => format!("^{}$", target),
                        TransferDefault::Chunk => {
                            if target.starts_with('*') {
                                format!("^unknown<unknown>{{^{}$}}$", target)
                            } else {
                                format!("^default<default>{{^{}$}}$", target)
                            }
                        }
                    }
                }
            }
            Stage::Interchunk => {
                let whole = match &mut self.words[index] {
                    TransferWord::Chunk(w) => w.chunk.whole(),
                    TransferWord::Bilingual(w) => w.source.whole(),
                };
                format!("^{}$", whole)
            }
            Stage::Postchunk => match &mut self.words[index] {
                TransferWord::Chunk(w) => w.chunk.part(LuPart::Content),
                TransferWord::Bilingual(w) => w.source.whole(),
            },
        };

        self.write_output(&rendering)
    }
}
