//! AST → assembly text.
//!
//! Emits the line-oriented assembly the VM loads: a header, variable
//! initialization code ending in `jmp section_rules_start`, the
//! patterns section feeding `addtrie`, then macros and rule actions
//! as labeled sections. All value code is stack code with typed
//! pushes; `choose` compiles to `jz`/`jmp` chains over generated
//! labels that the loader backpatches.

use std::fmt::Display;

use xfer_core::Opcode;

use crate::ast::{
    ChunkExpr, Clip, Condition, RuleFile, Side, Stage, Statement, Target, Value, When,
};

/// Generates assembly for one rule file.
pub struct AssemblyCodeGenerator<'a> {
    file: &'a RuleFile,
    code: Vec<String>,
    next_when: usize,
    next_choose: usize,
}

impl<'a> AssemblyCodeGenerator<'a> {
    pub fn new(file: &'a RuleFile) -> AssemblyCodeGenerator<'a> {
        AssemblyCodeGenerator {
            file,
            code: Vec::new(),
            next_when: 0,
            next_choose: 0,
        }
    }

    /// The writable representation of the generated assembly.
    pub fn generate(mut self) -> String {
        self.gen_header();
        self.gen_code_section();
        self.gen_patterns();
        self.gen_macros();
        self.gen_rules();

        let mut out = self.code.join("\n");
        out.push('\n');
        out
    }

    fn line(&mut self, text: impl Into<String>) {
        self.code.push(text.into());
    }

    fn op(&mut self, opcode: Opcode) {
        self.code.push(opcode.mnemonic().to_string());
    }

    fn op_arg(&mut self, opcode: Opcode, arg: impl Display) {
        self.code.push(format!("{} {}", opcode.mnemonic(), arg));
    }

    fn label(&mut self, label: impl Display) {
        self.code.push(format!("{}:", label));
    }

    /// Push a string literal; empty strings push as a bare mnemonic.
    fn push_str(&mut self, value: &str) {
        if value.is_empty() {
            self.op(Opcode::PushStr);
        } else {
            self.op_arg(Opcode::PushStr, value);
        }
    }

    fn gen_header(&mut self) {
        self.line("#<assembly>");
        let stage = match self.file.stage {
            Stage::Transfer => format!(
                "#<transfer default=\"{}\">",
                if self.file.chunk_default { "chunk" } else { "lu" }
            ),
            Stage::Interchunk => "#<interchunk>".to_string(),
            Stage::Postchunk => "#<postchunk>".to_string(),
        };
        self.line(stage);
    }

    /// Variable defaults, closed by the jump that separates the init
    /// code from the rules.
    fn gen_code_section(&mut self) {
        let file = self.file;
        for (name, default) in &file.vars {
            self.push_str(name);
            self.push_str(default);
            self.op(Opcode::Storev);
        }
        self.op_arg(Opcode::Jmp, "section_rules_start");
    }

    fn gen_patterns(&mut self) {
        let file = self.file;
        self.label("patterns_start");
        for (number, rule) in file.rules.iter().enumerate() {
            if rule.pattern.is_empty() {
                continue;
            }
            for part in &rule.pattern {
                self.op_arg(Opcode::PushStr, format!("\"{}\"", part));
            }
            self.op_arg(Opcode::PushInt, rule.pattern.len());
            self.op_arg(Opcode::Addtrie, format!("action_{}_start", number));
        }
        self.label("patterns_end");
    }

    fn gen_macros(&mut self) {
        let file = self.file;
        for def in &file.macros {
            self.label(format!("macro_{}_start", def.name));
            for statement in &def.body {
                self.gen_statement(statement);
            }
            self.line(format!("macro_{}_end: ret", def.name));
        }
    }

    fn gen_rules(&mut self) {
        let file = self.file;
        self.label("section_rules_start");
        for (number, rule) in file.rules.iter().enumerate() {
            self.label(format!("action_{}_start", number));
            for statement in &rule.body {
                self.gen_statement(statement);
            }
            self.label(format!("action_{}_end", number));
        }
        self.label("section_rules_end");
    }

    /// The clip read opcode for a side: the target side only exists
    /// in the transfer stage.
    fn clip_opcode(&self, side: Option<Side>) -> Opcode {
        if self.file.stage == Stage::Transfer && side == Some(Side::Target) {
            Opcode::Cliptl
        } else {
            Opcode::Clip
        }
    }

    fn store_opcode(&self, side: Option<Side>) -> Opcode {
        if self.file.stage == Stage::Transfer && side == Some(Side::Target) {
            Opcode::Storetl
        } else {
            Opcode::Storecl
        }
    }

    fn gen_clip_read(&mut self, clip: &Clip) {
        self.op_arg(Opcode::PushInt, clip.pos);
        self.push_str(&clip.parts);
        let opcode = self.clip_opcode(clip.side);
        match &clip.link_to {
            Some(link) => self.op_arg(opcode, format!("\"<{}>\"", link)),
            None => self.op(opcode),
        }
    }

    fn gen_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Let { target, value } => match target {
                Target::Var(name) => {
                    self.push_str(name);
                    self.gen_value(value);
                    self.op(Opcode::Storev);
                }
                Target::Clip(clip) => {
                    self.op_arg(Opcode::PushInt, clip.pos);
                    self.push_str(&clip.parts);
                    self.gen_value(value);
                    self.op(self.store_opcode(clip.side));
                }
            },
            Statement::Out(values) => {
                for value in values {
                    self.gen_value(value);
                }
                self.op_arg(Opcode::Out, values.len());
            }
            Statement::Choose { whens, otherwise } => {
                self.gen_choose(whens, otherwise.as_deref());
            }
            Statement::ModifyCase { target, case } => match target {
                Target::Var(name) => {
                    self.push_str(name);
                    self.op_arg(Opcode::PushVar, name);
                    self.gen_value(case);
                    self.op(Opcode::ModifyCase);
                    self.op(Opcode::Storev);
                }
                Target::Clip(clip) => {
                    self.op_arg(Opcode::PushInt, clip.pos);
                    self.push_str(&clip.parts);
                    self.gen_clip_read(clip);
                    self.gen_value(case);
                    self.op(Opcode::ModifyCase);
                    self.op(self.store_opcode(clip.side));
                }
            },
            Statement::Append { name, values } => {
                self.push_str(name);
                for value in values {
                    self.gen_value(value);
                }
                self.op_arg(Opcode::Append, values.len());
            }
            Statement::CallMacro { name, params, .. } => {
                for param in params {
                    self.op_arg(Opcode::PushInt, param);
                }
                self.op_arg(Opcode::PushInt, params.len());
                self.op_arg(Opcode::Call, name);
            }
        }
    }

    fn gen_choose(&mut self, whens: &[When], otherwise: Option<&[Statement]>) {
        let choose_end = format!("choose_{}_end", self.next_choose);
        self.next_choose += 1;

        for when in whens {
            let when_end = format!("when_{}_end", self.next_when);
            self.next_when += 1;

            self.gen_condition(&when.test);
            self.op_arg(Opcode::Jz, &when_end);
            for statement in &when.body {
                self.gen_statement(statement);
            }
            self.op_arg(Opcode::Jmp, &choose_end);
            self.label(&when_end);
        }

        if let Some(otherwise) = otherwise {
            for statement in otherwise {
                self.gen_statement(statement);
            }
        }
        self.label(&choose_end);
    }

    fn gen_value(&mut self, value: &Value) {
        match value {
            Value::Lit(text) => self.push_str(text),
            Value::LitTag(tags) => self.push_str(tags),
            Value::Var(name) => self.op_arg(Opcode::PushVar, name),
            Value::Clip(clip) => self.gen_clip_read(clip),
            Value::Blank(Some(pos)) => self.op_arg(Opcode::Pushsb, pos),
            Value::Blank(None) => self.op(Opcode::Pushbl),
            Value::Lu(values) => {
                for value in values {
                    self.gen_value(value);
                }
                self.op_arg(Opcode::Lu, values.len());
            }
            Value::Mlu(units) => {
                for unit in units {
                    for value in unit {
                        self.gen_value(value);
                    }
                    self.op_arg(Opcode::Lu, unit.len());
                }
                self.op_arg(Opcode::Mlu, units.len());
            }
            Value::Chunk(chunk) => self.gen_chunk(chunk),
            Value::Concat(values) => {
                for value in values {
                    self.gen_value(value);
                }
                self.op_arg(Opcode::Concat, values.len());
            }
            Value::LuCount => self.op(Opcode::LuCount),
            Value::CaseOf { pos, side, parts } => {
                self.op_arg(Opcode::PushInt, pos);
                self.push_str(parts);
                let opcode = self.clip_opcode(*side);
                self.op(opcode);
                self.op(Opcode::CaseOf);
            }
            Value::GetCaseFrom { pos, inner } => {
                self.gen_value(inner);
                self.op_arg(Opcode::PushInt, pos);
                self.op(Opcode::GetCaseFrom);
                self.op(Opcode::ModifyCase);
            }
        }
    }

    /// Chunk construction: name (possibly recased), one tags operand,
    /// then the content items.
    fn gen_chunk(&mut self, chunk: &ChunkExpr) {
        match &chunk.name_from {
            Some(variable) => self.op_arg(Opcode::PushVar, variable),
            None => self.push_str(chunk.name.as_deref().unwrap_or("")),
        }
        if let Some(case_var) = &chunk.case {
            self.op_arg(Opcode::PushVar, case_var);
            self.op(Opcode::ModifyCase);
        }

        for tag in &chunk.tags {
            self.gen_value(tag);
        }
        match chunk.tags.len() {
            0 => self.op(Opcode::PushStr),
            1 => {}
            n => self.op_arg(Opcode::Concat, n),
        }

        for item in &chunk.items {
            self.gen_value(item);
        }
        self.op_arg(Opcode::Chunk, 2 + chunk.items.len());
    }

    fn gen_condition(&mut self, condition: &Condition) {
        match condition {
            Condition::And(children) => {
                for child in children {
                    self.gen_condition(child);
                }
                self.op_arg(Opcode::And, children.len());
            }
            Condition::Or(children) => {
                for child in children {
                    self.gen_condition(child);
                }
                self.op_arg(Opcode::Or, children.len());
            }
            Condition::Not(inner) => {
                self.gen_condition(inner);
                self.op(Opcode::Not);
            }
            Condition::Equal {
                left,
                right,
                caseless,
            } => {
                self.gen_value(left);
                self.gen_value(right);
                self.op(if *caseless { Opcode::Cmpi } else { Opcode::Cmp });
            }
            Condition::BeginsWith {
                value,
                set,
                caseless,
            } => {
                self.gen_value(value);
                self.gen_value(set);
                self.op(if *caseless {
                    Opcode::BeginsWithIg
                } else {
                    Opcode::BeginsWith
                });
            }
            Condition::EndsWith {
                value,
                set,
                caseless,
            } => {
                self.gen_value(value);
                self.gen_value(set);
                self.op(if *caseless {
                    Opcode::EndsWithIg
                } else {
                    Opcode::EndsWith
                });
            }
            Condition::ContainsSubstring {
                haystack,
                needle,
                caseless,
            } => {
                self.gen_value(haystack);
                self.gen_value(needle);
                self.op(if *caseless {
                    Opcode::CmpiSubstr
                } else {
                    Opcode::CmpSubstr
                });
            }
            Condition::In {
                value,
                list,
                caseless,
            } => {
                self.gen_value(value);
                self.push_str(list);
                self.op(if *caseless { Opcode::Inig } else { Opcode::In });
            }
        }
    }
}
