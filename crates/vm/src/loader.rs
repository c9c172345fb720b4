//! The assembly loader.
//!
//! Loading is two-phase. The eager phase reads the main code section
//! (up to its closing `jmp section_rules_start`), translates the
//! patterns section, assigns a sequential number to every macro and
//! records rule/macro bodies as raw text. The lazy phase translates
//! one such body the first time it executes: labels get addresses in
//! a per-unit scope, forward references are written as a `#0#`
//! placeholder and backpatched once the whole unit is read.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use xfer_core::{CodeSection, CodeUnit, Instruction, Opcode, RawLine};

use crate::error::LoadError;

/// Everything the eager phase produces.
#[derive(Debug, Default)]
pub struct LoadedProgram {
    pub code: CodeUnit,
    pub preprocess: CodeUnit,
    pub rules: CodeSection,
    pub macros: CodeSection,
    /// Final address of the main code section; execution of the init
    /// code stops when the program counter reaches it.
    pub end_address: usize,
}

/// Per-unit label resolution context.
#[derive(Debug, Default)]
struct Scope {
    next_address: usize,
    labels: HashMap<String, usize>,
    patches: HashMap<String, Vec<usize>>,
}

impl Scope {
    fn define_label(&mut self, label: &str) {
        self.labels.insert(label.to_string(), self.next_address);
    }

    fn address_of(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    fn request_patch(&mut self, label: &str, position: usize) {
        self.patches
            .entry(label.to_string())
            .or_default()
            .push(position);
    }

    /// Overwrite every placeholder with the resolved address, in both
    /// the textual and the integer operand.
    fn backpatch(&self, code: &mut [Instruction]) -> Result<(), LoadError> {
        for (label, positions) in &self.patches {
            let address = self
                .labels
                .get(label)
                .ok_or_else(|| LoadError::UndefinedLabel(label.clone()))?;
            for &position in positions {
                code[position].op1 = address.to_string();
                code[position].int_op1 = *address as i64;
            }
        }
        Ok(())
    }
}

/// Loader for the line-oriented assembly format.
#[derive(Debug, Default)]
pub struct AssemblyLoader {
    lines: Vec<String>,
    macro_numbers: HashMap<String, usize>,
    macro_names: Vec<String>,
    next_macro_number: usize,
}

impl AssemblyLoader {
    pub fn from_file(path: &Path) -> Result<AssemblyLoader, LoadError> {
        Ok(AssemblyLoader::from_text(&fs::read_to_string(path)?))
    }

    pub fn from_text(text: &str) -> AssemblyLoader {
        AssemblyLoader {
            lines: text
                .lines()
                .map(|l| l.trim_end_matches('\r').to_string())
                .collect(),
            ..AssemblyLoader::default()
        }
    }

    /// The header lines of the code file (`#<assembly>` and the stage
    /// line), used by the VM before loading.
    pub fn header_lines(&self) -> (Option<&str>, Option<&str>) {
        (
            self.lines.first().map(String::as_str),
            self.lines.get(1).map(String::as_str),
        )
    }

    /// Eager phase: main code, patterns, preloaded rules and macros.
    pub fn load(&mut self) -> Result<LoadedProgram, LoadError> {
        let mut program = LoadedProgram::default();
        let mut scope = Scope::default();

        let lines = std::mem::take(&mut self.lines);
        let mut iter = lines.iter().enumerate();

        // Main code section, up to its terminating jump.
        for (index, line) in iter.by_ref() {
            let line_no = index as u32 + 1;
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            if let Some(instr) =
                self.parse_line(line, line_no, &mut scope, program.code.code.len())?
            {
                program.code.code.push(instr);
                scope.next_address += 1;
            }
            if line == "jmp section_rules_start" {
                break;
            }
        }
        program.code.loaded = true;

        // Sections: patterns are translated in the same root scope,
        // rule and macro bodies are only recorded.
        let mut scratch = CodeUnit::default();
        let mut just_preload = false;
        let mut macro_number = 0;

        for (index, line) in iter {
            let line_no = index as u32 + 1;
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }

            if line.starts_with("patterns") {
                just_preload = false;
                if line.ends_with("start:") {
                    scratch = CodeUnit::default();
                } else if line.ends_with("end:") {
                    scratch.loaded = true;
                    program.preprocess = std::mem::take(&mut scratch);
                }
            } else if line.starts_with("action") {
                just_preload = true;
                if line.ends_with("start:") {
                    scratch = CodeUnit::default();
                } else if line.ends_with("end:") {
                    let number = rule_number_of_label(line)
                        .ok_or_else(|| LoadError::BadRuleLabel {
                            line: line_no,
                            label: line.clone(),
                        })?;
                    program.rules.place(number, std::mem::take(&mut scratch));
                    just_preload = false;
                }
            } else if line.starts_with("macro") {
                just_preload = true;
                if line.ends_with("start:") {
                    let name = macro_name_of_label(line);
                    macro_number = self.next_macro_number;
                    self.next_macro_number += 1;
                    self.macro_numbers.insert(name.clone(), macro_number);
                    self.macro_names.push(name);
                    scratch = CodeUnit::default();
                } else if line.contains("end:") {
                    // The end label doubles as the macro's return.
                    scratch.raw.push(RawLine {
                        text: "ret".to_string(),
                        line: line_no,
                    });
                    program.macros.place(macro_number, std::mem::take(&mut scratch));
                    just_preload = false;
                }
            } else if just_preload {
                scratch.raw.push(RawLine {
                    text: line.clone(),
                    line: line_no,
                });
            } else if let Some(instr) =
                self.parse_line(line, line_no, &mut scope, scratch.code.len())?
            {
                scratch.code.push(instr);
                scope.next_address += 1;
            }
        }

        scope.backpatch(&mut program.code.code)?;
        program.end_address = program.code.code.len();

        Ok(program)
    }

    /// Lazy phase: translate a preloaded unit in place. Loading an
    /// already-loaded unit is a no-op.
    pub fn load_unit(&self, unit: &mut CodeUnit) -> Result<(), LoadError> {
        if unit.loaded {
            return Ok(());
        }

        let raw = std::mem::take(&mut unit.raw);
        unit.code.clear();
        let mut scope = Scope::default();

        for line in &raw {
            if line.text.starts_with('#') || line.text.trim().is_empty() {
                continue;
            }
            if let Some(instr) =
                self.parse_line(&line.text, line.line, &mut scope, unit.code.len())?
            {
                unit.code.push(instr);
                scope.next_address += 1;
            }
        }

        scope.backpatch(&mut unit.code)?;
        unit.loaded = true;
        Ok(())
    }

    /// Translate one assembly line. Label declarations register an
    /// address and produce no instruction.
    fn parse_line(
        &self,
        line: &str,
        line_no: u32,
        scope: &mut Scope,
        next_index: usize,
    ) -> Result<Option<Instruction>, LoadError> {
        let mut name = String::new();
        let mut operand_start = None;
        for (i, ch) in line.char_indices() {
            match ch {
                ' ' | '\t' => {
                    operand_start = Some(i + 1);
                    break;
                }
                ':' => {
                    scope.define_label(&name);
                    return Ok(None);
                }
                _ => name.push(ch),
            }
        }

        let opcode =
            Opcode::from_mnemonic(&name).ok_or_else(|| LoadError::UnrecognizedInstruction {
                line: line_no,
                text: line.to_string(),
            })?;
        let mut instr = Instruction::new(opcode, line_no);

        if let Some(start) = operand_start {
            let operand = &line[start..];
            match opcode {
                Opcode::Addtrie => {
                    let number =
                        rule_number_of_label(operand).ok_or_else(|| LoadError::BadRuleLabel {
                            line: line_no,
                            label: operand.to_string(),
                        })?;
                    instr.op1 = number.to_string();
                    instr.int_op1 = number as i64;
                }
                Opcode::Call => {
                    let number = self.macro_numbers.get(operand).copied().ok_or_else(|| {
                        LoadError::UnknownMacro {
                            line: line_no,
                            name: operand.to_string(),
                        }
                    })?;
                    instr.op1 = number.to_string();
                    instr.int_op1 = number as i64;
                }
                Opcode::Jmp | Opcode::Jz | Opcode::Jnz => match scope.address_of(operand) {
                    Some(address) => {
                        instr.op1 = address.to_string();
                        instr.int_op1 = address as i64;
                    }
                    None => {
                        scope.request_patch(operand, next_index);
                        instr.op1 = "#0#".to_string();
                        instr.int_op1 = 0;
                    }
                },
                _ => {
                    instr.int_op1 = operand.trim().parse().unwrap_or(0);
                    instr.op1 = operand.to_string();
                }
            }
        }

        Ok(Some(instr))
    }

    /// Name of a macro by its assigned number, for the debug dump.
    pub fn macro_name(&self, number: usize) -> &str {
        self.macro_names
            .get(number)
            .map(String::as_str)
            .unwrap_or("?")
    }

    fn format_instruction(&self, instr: &Instruction, pc: usize, out: &mut String) {
        let operand = if instr.opcode == Opcode::Call {
            self.macro_name(instr.int_op1 as usize).to_string()
        } else {
            instr.op1.clone()
        };
        if operand.is_empty() {
            let _ = writeln!(out, "{}\t{}", pc, instr.opcode);
        } else {
            let _ = writeln!(out, "{}\t{} {}", pc, instr.opcode, operand);
        }
    }

    /// Render one code unit in assembly-like form.
    pub fn dump_unit(&self, unit: &CodeUnit, header: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "========={:=<51}", format!(" {} ", header));
        if unit.loaded {
            for (pc, instr) in unit.code.iter().enumerate() {
                self.format_instruction(instr, pc, &mut out);
            }
        } else {
            let _ = writeln!(out, "(not loaded)");
            for line in &unit.raw {
                let _ = writeln!(out, "{}", line.text);
            }
        }
        let _ = writeln!(out, "{:=<60}", "");
        out
    }

    /// Render every unit of a section.
    pub fn dump_section(&self, section: &CodeSection, header: &str, unit_header: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "========={:=<51}", format!(" {} ", header));
        for (number, unit) in section.units.iter().enumerate() {
            if unit.loaded {
                let _ = writeln!(out, "\n{} {}:", unit_header, number);
                for (pc, instr) in unit.code.iter().enumerate() {
                    self.format_instruction(instr, pc, &mut out);
                }
            } else {
                let _ = writeln!(out, "\n{} {} (not loaded):", unit_header, number);
                for line in &unit.raw {
                    let _ = writeln!(out, "{}", line.text);
                }
            }
        }
        let _ = writeln!(out, "{:=<60}", "");
        out
    }
}

/// Extract the rule number out of a label like `action_12_start`.
fn rule_number_of_label(label: &str) -> Option<usize> {
    label.split('_').nth(1)?.parse().ok()
}

/// Extract the macro name out of a label like `macro_f_verb_start:`,
/// i.e. everything between the first and the last underscore.
fn macro_name_of_label(label: &str) -> String {
    let start = label.find('_').map(|p| p + 1).unwrap_or(0);
    let end = label.rfind('_').unwrap_or(label.len());
    label[start..end].to_string()
}
