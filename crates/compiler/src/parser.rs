//! Markup events → rule-file AST.
//!
//! A recursive descent over the element start/end stream. Category,
//! attribute and list definitions are expanded into the `|`-joined
//! strings the VM consumes as they are read, so later references
//! resolve against plain tables.

use std::collections::HashMap;
use std::io::Read;

use crate::ast::{
    ChunkExpr, Clip, Condition, MacroDef, Rule, RuleFile, Side, Stage, Statement, Target, Value,
    When,
};
use crate::error::CompileError;
use crate::event::{Event, MarkupReader};

/// Part names that address a unit directly instead of an attribute.
const SPECIAL_PARTS: [&str; 7] = [
    "whole",
    "lem",
    "lemh",
    "lemq",
    "tags",
    "chcontent",
    "content",
];

pub struct Parser<R: Read> {
    reader: MarkupReader<R>,
    cats: HashMap<String, String>,
    attrs: HashMap<String, String>,
    lists: HashMap<String, String>,
}

impl<R: Read> Parser<R> {
    pub fn new(source: R) -> Parser<R> {
        Parser {
            reader: MarkupReader::new(source),
            cats: HashMap::new(),
            attrs: HashMap::new(),
            lists: HashMap::new(),
        }
    }

    /// Parse a whole rule file and validate its macro calls.
    pub fn parse(&mut self) -> Result<RuleFile, CompileError> {
        let (name, attributes, line) = self.next_start()?;
        let stage = match name.as_str() {
            "transfer" => Stage::Transfer,
            "interchunk" => Stage::Interchunk,
            "postchunk" => Stage::Postchunk,
            _ => return Err(CompileError::UnexpectedElement { line, name }),
        };

        let mut file = RuleFile::new(stage);
        file.chunk_default = attributes.get("default").map(String::as_str) == Some("chunk");

        loop {
            match self.reader.next()? {
                Event::Start { name, line, .. } => match name.as_str() {
                    "section-def-cats" => self.parse_def_cats()?,
                    "section-def-attrs" => self.parse_def_attrs()?,
                    "section-def-vars" => self.parse_def_vars(&mut file)?,
                    "section-def-lists" => self.parse_def_lists()?,
                    "section-def-macros" => self.parse_def_macros(&mut file)?,
                    "section-rules" => self.parse_rules(&mut file)?,
                    _ => return Err(CompileError::UnexpectedElement { line, name }),
                },
                Event::End { .. } => break,
                Event::Eof => break,
            }
        }

        file.cats = std::mem::take(&mut self.cats);
        file.attrs = std::mem::take(&mut self.attrs);
        file.lists = std::mem::take(&mut self.lists);

        validate_macro_calls(&file)?;
        Ok(file)
    }

    fn next_event(&mut self) -> Result<Event, CompileError> {
        self.reader.next()
    }

    fn next_start(&mut self) -> Result<(String, HashMap<String, String>, u64), CompileError> {
        match self.next_event()? {
            Event::Start {
                name,
                attributes,
                line,
            } => Ok((name, attributes, line)),
            Event::End { name, line } => Err(CompileError::UnexpectedEnd { line, name }),
            Event::Eof => Err(CompileError::UnexpectedEof),
        }
    }

    fn expect_end(&mut self, expected: &str) -> Result<(), CompileError> {
        match self.next_event()? {
            Event::End { ref name, .. } if name == expected => Ok(()),
            Event::Start { name, line, .. } => Err(CompileError::UnexpectedElement { line, name }),
            Event::End { name, line } => Err(CompileError::UnexpectedEnd { line, name }),
            Event::Eof => Err(CompileError::UnexpectedEof),
        }
    }

    fn parse_def_cats(&mut self) -> Result<(), CompileError> {
        loop {
            match self.next_event()? {
                Event::Start {
                    ref name,
                    ref attributes,
                    line,
                } if name == "def-cat" => {
                    let cat_name = required(attributes, "n", line, name)?;
                    let mut options = Vec::new();
                    loop {
                        match self.next_event()? {
                            Event::Start {
                                ref name,
                                ref attributes,
                                ..
                            } if name == "cat-item" => {
                                let lemma = attributes
                                    .get("lemma")
                                    .or_else(|| attributes.get("name"))
                                    .cloned()
                                    .unwrap_or_default();
                                let tags = expand_tags(
                                    attributes.get("tags").map(String::as_str).unwrap_or(""),
                                );
                                options.push(format!("{}{}", lemma, tags));
                                self.expect_end("cat-item")?;
                            }
                            Event::End { ref name, .. } if name == "def-cat" => break,
                            Event::Start { name, line, .. } => {
                                return Err(CompileError::UnexpectedElement { line, name })
                            }
                            Event::End { name, line } => {
                                return Err(CompileError::UnexpectedEnd { line, name })
                            }
                            Event::Eof => return Err(CompileError::UnexpectedEof),
                        }
                    }
                    self.cats.insert(cat_name, options.join("|"));
                }
                Event::End { ref name, .. } if name == "section-def-cats" => return Ok(()),
                Event::Start { name, line, .. } => {
                    return Err(CompileError::UnexpectedElement { line, name })
                }
                Event::End { name, line } => return Err(CompileError::UnexpectedEnd { line, name }),
                Event::Eof => return Err(CompileError::UnexpectedEof),
            }
        }
    }

    fn parse_def_attrs(&mut self) -> Result<(), CompileError> {
        loop {
            match self.next_event()? {
                Event::Start {
                    ref name,
                    ref attributes,
                    line,
                } if name == "def-attr" => {
                    let attr_name = required(attributes, "n", line, name)?;
                    let mut options = Vec::new();
                    loop {
                        match self.next_event()? {
                            Event::Start {
                                ref name,
                                ref attributes,
                                line,
                            } if name == "attr-item" => {
                                let tags = required(attributes, "tags", line, name)?;
                                options.push(expand_tags(&tags));
                                self.expect_end("attr-item")?;
                            }
                            Event::End { ref name, .. } if name == "def-attr" => break,
                            Event::Start { name, line, .. } => {
                                return Err(CompileError::UnexpectedElement { line, name })
                            }
                            Event::End { name, line } => {
                                return Err(CompileError::UnexpectedEnd { line, name })
                            }
                            Event::Eof => return Err(CompileError::UnexpectedEof),
                        }
                    }
                    self.attrs.insert(attr_name, options.join("|"));
                }
                Event::End { ref name, .. } if name == "section-def-attrs" => return Ok(()),
                Event::Start { name, line, .. } => {
                    return Err(CompileError::UnexpectedElement { line, name })
                }
                Event::End { name, line } => return Err(CompileError::UnexpectedEnd { line, name }),
                Event::Eof => return Err(CompileError::UnexpectedEof),
            }
        }
    }

    fn parse_def_vars(&mut self, file: &mut RuleFile) -> Result<(), CompileError> {
        loop {
            match self.next_event()? {
                Event::Start {
                    ref name,
                    ref attributes,
                    line,
                } if name == "def-var" => {
                    let var_name = required(attributes, "n", line, name)?;
                    let default = attributes.get("v").cloned().unwrap_or_default();
                    file.vars.push((var_name, default));
                    self.expect_end("def-var")?;
                }
                Event::End { ref name, .. } if name == "section-def-vars" => return Ok(()),
                Event::Start { name, line, .. } => {
                    return Err(CompileError::UnexpectedElement { line, name })
                }
                Event::End { name, line } => return Err(CompileError::UnexpectedEnd { line, name }),
                Event::Eof => return Err(CompileError::UnexpectedEof),
            }
        }
    }

    fn parse_def_lists(&mut self) -> Result<(), CompileError> {
        loop {
            match self.next_event()? {
                Event::Start {
                    ref name,
                    ref attributes,
                    line,
                } if name == "def-list" => {
                    let list_name = required(attributes, "n", line, name)?;
                    let mut items = Vec::new();
                    loop {
                        match self.next_event()? {
                            Event::Start {
                                ref name,
                                ref attributes,
                                line,
                            } if name == "list-item" => {
                                items.push(required(attributes, "v", line, name)?);
                                self.expect_end("list-item")?;
                            }
                            Event::End { ref name, .. } if name == "def-list" => break,
                            Event::Start { name, line, .. } => {
                                return Err(CompileError::UnexpectedElement { line, name })
                            }
                            Event::End { name, line } => {
                                return Err(CompileError::UnexpectedEnd { line, name })
                            }
                            Event::Eof => return Err(CompileError::UnexpectedEof),
                        }
                    }
                    self.lists.insert(list_name, items.join("|"));
                }
                Event::End { ref name, .. } if name == "section-def-lists" => return Ok(()),
                Event::Start { name, line, .. } => {
                    return Err(CompileError::UnexpectedElement { line, name })
                }
                Event::End { name, line } => return Err(CompileError::UnexpectedEnd { line, name }),
                Event::Eof => return Err(CompileError::UnexpectedEof),
            }
        }
    }

    fn parse_def_macros(&mut self, file: &mut RuleFile) -> Result<(), CompileError> {
        loop {
            match self.next_event()? {
                Event::Start {
                    ref name,
                    ref attributes,
                    line,
                } if name == "def-macro" => {
                    let macro_name = required(attributes, "n", line, name)?;
                    if file.find_macro(&macro_name).is_some() {
                        return Err(CompileError::DuplicateMacro {
                            line,
                            name: macro_name,
                        });
                    }
                    let params = attributes
                        .get("npar")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    let body = self.parse_statements("def-macro")?;
                    file.macros.push(MacroDef {
                        name: macro_name,
                        params,
                        body,
                        line,
                    });
                }
                Event::End { ref name, .. } if name == "section-def-macros" => return Ok(()),
                Event::Start { name, line, .. } => {
                    return Err(CompileError::UnexpectedElement { line, name })
                }
                Event::End { name, line } => return Err(CompileError::UnexpectedEnd { line, name }),
                Event::Eof => return Err(CompileError::UnexpectedEof),
            }
        }
    }

    fn parse_rules(&mut self, file: &mut RuleFile) -> Result<(), CompileError> {
        loop {
            match self.next_event()? {
                Event::Start { ref name, .. } if name == "rule" => {
                    let mut pattern = Vec::new();
                    let mut body = Vec::new();
                    loop {
                        match self.next_event()? {
                            Event::Start { ref name, .. } if name == "pattern" => {
                                pattern = self.parse_pattern()?;
                            }
                            Event::Start { ref name, .. } if name == "action" => {
                                body = self.parse_statements("action")?;
                            }
                            Event::End { ref name, .. } if name == "rule" => break,
                            Event::Start { name, line, .. } => {
                                return Err(CompileError::UnexpectedElement { line, name })
                            }
                            Event::End { name, line } => {
                                return Err(CompileError::UnexpectedEnd { line, name })
                            }
                            Event::Eof => return Err(CompileError::UnexpectedEof),
                        }
                    }
                    file.rules.push(Rule { pattern, body });
                }
                Event::End { ref name, .. } if name == "section-rules" => return Ok(()),
                Event::Start { name, line, .. } => {
                    return Err(CompileError::UnexpectedElement { line, name })
                }
                Event::End { name, line } => return Err(CompileError::UnexpectedEnd { line, name }),
                Event::Eof => return Err(CompileError::UnexpectedEof),
            }
        }
    }

    fn parse_pattern(&mut self) -> Result<Vec<String>, CompileError> {
        let mut parts = Vec::new();
        loop {
            match self.next_event()? {
                Event::Start {
                    ref name,
                    ref attributes,
                    line,
                } if name == "pattern-item" => {
                    let cat = required(attributes, "n", line, name)?;
                    let options = self
                        .cats
                        .get(&cat)
                        .cloned()
                        .ok_or(CompileError::UnknownCategory { line, name: cat })?;
                    parts.push(options);
                    self.expect_end("pattern-item")?;
                }
                Event::End { ref name, .. } if name == "pattern" => return Ok(parts),
                Event::Start { name, line, .. } => {
                    return Err(CompileError::UnexpectedElement { line, name })
                }
                Event::End { name, line } => return Err(CompileError::UnexpectedEnd { line, name }),
                Event::Eof => return Err(CompileError::UnexpectedEof),
            }
        }
    }

    /// Statements up to the end of `end_name`.
    fn parse_statements(&mut self, end_name: &str) -> Result<Vec<Statement>, CompileError> {
        let mut statements = Vec::new();
        loop {
            match self.next_event()? {
                Event::Start {
                    name,
                    attributes,
                    line,
                } => statements.push(self.parse_statement(&name, &attributes, line)?),
                Event::End { ref name, .. } if name == end_name => return Ok(statements),
                Event::End { name, line } => return Err(CompileError::UnexpectedEnd { line, name }),
                Event::Eof => return Err(CompileError::UnexpectedEof),
            }
        }
    }

    fn parse_statement(
        &mut self,
        name: &str,
        attributes: &HashMap<String, String>,
        line: u64,
    ) -> Result<Statement, CompileError> {
        match name {
            "let" => {
                let target = self.parse_target()?;
                let value = self.parse_value_next()?;
                self.expect_end("let")?;
                Ok(Statement::Let { target, value })
            }
            "out" => {
                let values = self.parse_values("out")?;
                Ok(Statement::Out(values))
            }
            "choose" => self.parse_choose(),
            "modify-case" => {
                let target = self.parse_target()?;
                let case = self.parse_value_next()?;
                self.expect_end("modify-case")?;
                Ok(Statement::ModifyCase { target, case })
            }
            "append" => {
                let var = required(attributes, "n", line, name)?;
                let values = self.parse_values("append")?;
                Ok(Statement::Append { name: var, values })
            }
            "call-macro" => {
                let macro_name = required(attributes, "n", line, name)?;
                let mut params = Vec::new();
                loop {
                    match self.next_event()? {
                        Event::Start {
                            ref name,
                            ref attributes,
                            line,
                        } if name == "with-param" => {
                            let pos = required(attributes, "pos", line, name)?;
                            params.push(pos.parse().unwrap_or(0));
                            self.expect_end("with-param")?;
                        }
                        Event::End { ref name, .. } if name == "call-macro" => break,
                        Event::Start { name, line, .. } => {
                            return Err(CompileError::UnexpectedElement { line, name })
                        }
                        Event::End { name, line } => {
                            return Err(CompileError::UnexpectedEnd { line, name })
                        }
                        Event::Eof => return Err(CompileError::UnexpectedEof),
                    }
                }
                Ok(Statement::CallMacro {
                    name: macro_name,
                    params,
                    line,
                })
            }
            _ => Err(CompileError::UnexpectedElement {
                line,
                name: name.to_string(),
            }),
        }
    }

    fn parse_choose(&mut self) -> Result<Statement, CompileError> {
        let mut whens = Vec::new();
        let mut otherwise = None;
        loop {
            match self.next_event()? {
                Event::Start { ref name, .. } if name == "when" => {
                    let (test_name, _, test_line) = self.next_start()?;
                    if test_name != "test" {
                        return Err(CompileError::UnexpectedElement {
                            line: test_line,
                            name: test_name,
                        });
                    }
                    let test = self.parse_condition_next()?;
                    self.expect_end("test")?;
                    let body = self.parse_statements("when")?;
                    whens.push(When { test, body });
                }
                Event::Start { ref name, .. } if name == "otherwise" => {
                    otherwise = Some(self.parse_statements("otherwise")?);
                }
                Event::End { ref name, .. } if name == "choose" => {
                    return Ok(Statement::Choose { whens, otherwise })
                }
                Event::Start { name, line, .. } => {
                    return Err(CompileError::UnexpectedElement { line, name })
                }
                Event::End { name, line } => return Err(CompileError::UnexpectedEnd { line, name }),
                Event::Eof => return Err(CompileError::UnexpectedEof),
            }
        }
    }

    /// The container child of `let` and `modify-case`.
    fn parse_target(&mut self) -> Result<Target, CompileError> {
        let (name, attributes, line) = self.next_start()?;
        match name.as_str() {
            "var" => {
                let var = required(&attributes, "n", line, &name)?;
                self.expect_end("var")?;
                Ok(Target::Var(var))
            }
            "clip" => {
                let clip = self.parse_clip(&attributes, line)?;
                self.expect_end("clip")?;
                Ok(Target::Clip(clip))
            }
            _ => Err(CompileError::UnexpectedElement { line, name }),
        }
    }

    fn parse_clip(
        &self,
        attributes: &HashMap<String, String>,
        line: u64,
    ) -> Result<Clip, CompileError> {
        let pos = required(attributes, "pos", line, "clip")?
            .parse()
            .unwrap_or(0);
        let side = match attributes.get("side").map(String::as_str) {
            Some("sl") => Some(Side::Source),
            Some("tl") => Some(Side::Target),
            _ => None,
        };
        let part = required(attributes, "part", line, "clip")?;
        let parts = self.resolve_part(&part, line)?;
        let link_to = attributes.get("link-to").cloned();
        Ok(Clip {
            pos,
            side,
            parts,
            link_to,
        })
    }

    /// A special part name passes through; anything else must be a
    /// defined attribute and expands to its alternation.
    fn resolve_part(&self, part: &str, line: u64) -> Result<String, CompileError> {
        if SPECIAL_PARTS.contains(&part) {
            return Ok(part.to_string());
        }
        self.attrs
            .get(part)
            .cloned()
            .ok_or(CompileError::UnknownAttribute {
                line,
                name: part.to_string(),
            })
    }

    fn parse_value_next(&mut self) -> Result<Value, CompileError> {
        let (name, attributes, line) = self.next_start()?;
        self.parse_value(&name, &attributes, line)
    }

    /// Values up to the end of `end_name`.
    fn parse_values(&mut self, end_name: &str) -> Result<Vec<Value>, CompileError> {
        let mut values = Vec::new();
        loop {
            match self.next_event()? {
                Event::Start {
                    name,
                    attributes,
                    line,
                } => values.push(self.parse_value(&name, &attributes, line)?),
                Event::End { ref name, .. } if name == end_name => return Ok(values),
                Event::End { name, line } => return Err(CompileError::UnexpectedEnd { line, name }),
                Event::Eof => return Err(CompileError::UnexpectedEof),
            }
        }
    }

    fn parse_value(
        &mut self,
        name: &str,
        attributes: &HashMap<String, String>,
        line: u64,
    ) -> Result<Value, CompileError> {
        match name {
            "lit" => {
                let value = required(attributes, "v", line, name)?;
                self.expect_end("lit")?;
                Ok(Value::Lit(value))
            }
            "lit-tag" => {
                let value = required(attributes, "v", line, name)?;
                self.expect_end("lit-tag")?;
                Ok(Value::LitTag(expand_tags(&value)))
            }
            "var" => {
                let var = required(attributes, "n", line, name)?;
                self.expect_end("var")?;
                Ok(Value::Var(var))
            }
            "clip" => {
                let clip = self.parse_clip(attributes, line)?;
                self.expect_end("clip")?;
                Ok(Value::Clip(clip))
            }
            "b" => {
                let pos = attributes.get("pos").and_then(|v| v.parse().ok());
                self.expect_end("b")?;
                Ok(Value::Blank(pos))
            }
            "lu" => Ok(Value::Lu(self.parse_values("lu")?)),
            "mlu" => {
                let mut units = Vec::new();
                loop {
                    match self.next_event()? {
                        Event::Start { ref name, .. } if name == "lu" => {
                            units.push(self.parse_values("lu")?);
                        }
                        Event::End { ref name, .. } if name == "mlu" => break,
                        Event::Start { name, line, .. } => {
                            return Err(CompileError::UnexpectedElement { line, name })
                        }
                        Event::End { name, line } => {
                            return Err(CompileError::UnexpectedEnd { line, name })
                        }
                        Event::Eof => return Err(CompileError::UnexpectedEof),
                    }
                }
                Ok(Value::Mlu(units))
            }
            "chunk" => self.parse_chunk(attributes),
            "concat" => Ok(Value::Concat(self.parse_values("concat")?)),
            "lu-count" => {
                self.expect_end("lu-count")?;
                Ok(Value::LuCount)
            }
            "get-case-from" => {
                let pos = required(attributes, "pos", line, name)?.parse().unwrap_or(0);
                let inner = self.parse_value_next()?;
                self.expect_end("get-case-from")?;
                Ok(Value::GetCaseFrom {
                    pos,
                    inner: Box::new(inner),
                })
            }
            "case-of" => {
                let pos = required(attributes, "pos", line, name)?.parse().unwrap_or(0);
                let side = match attributes.get("side").map(String::as_str) {
                    Some("sl") => Some(Side::Source),
                    Some("tl") => Some(Side::Target),
                    _ => None,
                };
                let part = required(attributes, "part", line, name)?;
                let parts = self.resolve_part(&part, line)?;
                self.expect_end("case-of")?;
                Ok(Value::CaseOf { pos, side, parts })
            }
            _ => Err(CompileError::UnexpectedElement {
                line,
                name: name.to_string(),
            }),
        }
    }

    fn parse_chunk(
        &mut self,
        attributes: &HashMap<String, String>,
    ) -> Result<Value, CompileError> {
        let mut chunk = ChunkExpr {
            name: attributes.get("name").cloned(),
            name_from: attributes.get("namefrom").cloned(),
            case: attributes.get("case").cloned(),
            tags: Vec::new(),
            items: Vec::new(),
        };

        loop {
            match self.next_event()? {
                Event::Start { ref name, .. } if name == "tags" => {
                    loop {
                        match self.next_event()? {
                            Event::Start { ref name, .. } if name == "tag" => {
                                chunk.tags.push(self.parse_value_next()?);
                                self.expect_end("tag")?;
                            }
                            Event::End { ref name, .. } if name == "tags" => break,
                            Event::Start { name, line, .. } => {
                                return Err(CompileError::UnexpectedElement { line, name })
                            }
                            Event::End { name, line } => {
                                return Err(CompileError::UnexpectedEnd { line, name })
                            }
                            Event::Eof => return Err(CompileError::UnexpectedEof),
                        }
                    }
                }
                Event::Start {
                    name,
                    attributes,
                    line,
                } => chunk.items.push(self.parse_value(&name, &attributes, line)?),
                Event::End { ref name, .. } if name == "chunk" => break,
                Event::End { name, line } => return Err(CompileError::UnexpectedEnd { line, name }),
                Event::Eof => return Err(CompileError::UnexpectedEof),
            }
        }

        Ok(Value::Chunk(chunk))
    }

    fn parse_condition_next(&mut self) -> Result<Condition, CompileError> {
        let (name, attributes, line) = self.next_start()?;
        self.parse_condition(&name, &attributes, line)
    }

    fn parse_condition(
        &mut self,
        name: &str,
        attributes: &HashMap<String, String>,
        line: u64,
    ) -> Result<Condition, CompileError> {
        let caseless = attributes.get("caseless").map(String::as_str) == Some("yes");
        match name {
            "and" | "or" => {
                let mut children = Vec::new();
                loop {
                    match self.next_event()? {
                        Event::Start {
                            name: child,
                            attributes,
                            line,
                        } => children.push(self.parse_condition(&child, &attributes, line)?),
                        Event::End { name: end, .. } if end == name => break,
                        Event::End { name, line } => {
                            return Err(CompileError::UnexpectedEnd { line, name })
                        }
                        Event::Eof => return Err(CompileError::UnexpectedEof),
                    }
                }
                if name == "and" {
                    Ok(Condition::And(children))
                } else {
                    Ok(Condition::Or(children))
                }
            }
            "not" => {
                let inner = self.parse_condition_next()?;
                self.expect_end("not")?;
                Ok(Condition::Not(Box::new(inner)))
            }
            "equal" => {
                let left = self.parse_value_next()?;
                let right = self.parse_value_next()?;
                self.expect_end("equal")?;
                Ok(Condition::Equal {
                    left,
                    right,
                    caseless,
                })
            }
            "begins-with" => {
                let value = self.parse_value_next()?;
                let set = self.parse_value_next()?;
                self.expect_end("begins-with")?;
                Ok(Condition::BeginsWith {
                    value,
                    set,
                    caseless,
                })
            }
            "ends-with" => {
                let value = self.parse_value_next()?;
                let set = self.parse_value_next()?;
                self.expect_end("ends-with")?;
                Ok(Condition::EndsWith {
                    value,
                    set,
                    caseless,
                })
            }
            "begins-with-list" => {
                let value = self.parse_value_next()?;
                let set = self.parse_list_ref()?;
                self.expect_end("begins-with-list")?;
                Ok(Condition::BeginsWith {
                    value,
                    set,
                    caseless,
                })
            }
            "ends-with-list" => {
                let value = self.parse_value_next()?;
                let set = self.parse_list_ref()?;
                self.expect_end("ends-with-list")?;
                Ok(Condition::EndsWith {
                    value,
                    set,
                    caseless,
                })
            }
            "contains-substring" => {
                let haystack = self.parse_value_next()?;
                let needle = self.parse_value_next()?;
                self.expect_end("contains-substring")?;
                Ok(Condition::ContainsSubstring {
                    haystack,
                    needle,
                    caseless,
                })
            }
            "in" => {
                let value = self.parse_value_next()?;
                let list = match self.parse_list_ref()? {
                    Value::Lit(list) => list,
                    _ => unreachable!("parse_list_ref yields literals"),
                };
                self.expect_end("in")?;
                Ok(Condition::In {
                    value,
                    list,
                    caseless,
                })
            }
            _ => Err(CompileError::UnexpectedElement {
                line,
                name: name.to_string(),
            }),
        }
    }

    /// A `<list n="…"/>` reference, expanded to its items.
    fn parse_list_ref(&mut self) -> Result<Value, CompileError> {
        let (name, attributes, line) = self.next_start()?;
        if name != "list" {
            return Err(CompileError::UnexpectedElement { line, name });
        }
        let list_name = required(&attributes, "n", line, &name)?;
        let items = self
            .lists
            .get(&list_name)
            .cloned()
            .ok_or(CompileError::UnknownList {
                line,
                name: list_name,
            })?;
        self.expect_end("list")?;
        Ok(Value::Lit(items))
    }
}

/// Expand a dotted tag attribute (`det.ind`, `n.*`) to the VM form
/// (`<det><ind>`, `<n><*>`).
fn expand_tags(tags: &str) -> String {
    if tags.is_empty() {
        return String::new();
    }
    tags.split('.')
        .map(|tag| format!("<{}>", tag))
        .collect()
}

fn required(
    attributes: &HashMap<String, String>,
    key: &'static str,
    line: u64,
    element: &str,
) -> Result<String, CompileError> {
    attributes
        .get(key)
        .cloned()
        .ok_or(CompileError::MissingAttribute {
            line,
            name: element.to_string(),
            attribute: key,
        })
}

/// Check every macro call against the macro table: the macro must
/// exist and the parameter count must match.
fn validate_macro_calls(file: &RuleFile) -> Result<(), CompileError> {
    let arities: HashMap<&str, usize> = file
        .macros
        .iter()
        .map(|m| (m.name.as_str(), m.params))
        .collect();

    for body in file
        .macros
        .iter()
        .map(|m| &m.body)
        .chain(file.rules.iter().map(|r| &r.body))
    {
        check_statements(body, &arities)?;
    }
    Ok(())
}

fn check_statements(
    statements: &[Statement],
    arities: &HashMap<&str, usize>,
) -> Result<(), CompileError> {
    for statement in statements {
        match statement {
            Statement::CallMacro { name, params, line } => match arities.get(name.as_str()) {
                None => {
                    return Err(CompileError::UnknownMacro {
                        line: *line,
                        name: name.clone(),
                    })
                }
                Some(&expected) if expected != params.len() => {
                    return Err(CompileError::WrongParamCount {
                        line: *line,
                        name: name.clone(),
                        expected,
                        found: params.len(),
                    })
                }
                Some(_) => {}
            },
            Statement::Choose { whens, otherwise } => {
                for when in whens {
                    check_statements(&when.body, arities)?;
                }
                if let Some(otherwise) = otherwise {
                    check_statements(otherwise, arities)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<RuleFile, CompileError> {
        Parser::new(source.as_bytes()).parse()
    }

    const SMALL: &str = r#"
<transfer default="chunk">
  <section-def-cats>
    <def-cat n="det">
      <cat-item tags="det.*"/>
      <cat-item lemma="el" tags="det"/>
    </def-cat>
  </section-def-cats>
  <section-def-attrs>
    <def-attr n="gen">
      <attr-item tags="m"/>
      <attr-item tags="f"/>
    </def-attr>
  </section-def-attrs>
  <section-def-vars>
    <def-var n="number" v="sg"/>
  </section-def-vars>
  <section-def-lists>
    <def-list n="weekdays">
      <list-item v="lunes"/>
      <list-item v="martes"/>
    </def-list>
  </section-def-lists>
  <section-rules>
    <rule>
      <pattern>
        <pattern-item n="det"/>
      </pattern>
      <action>
        <out>
          <lu>
            <clip pos="1" side="tl" part="whole"/>
          </lu>
        </out>
      </action>
    </rule>
  </section-rules>
</transfer>
"#;

    #[test]
    fn definitions_expand() {
        let file = parse(SMALL).unwrap();
        assert_eq!(file.stage, Stage::Transfer);
        assert!(file.chunk_default);
        assert_eq!(file.cats["det"], "<det><*>|el<det>");
        assert_eq!(file.attrs["gen"], "<m>|<f>");
        assert_eq!(file.vars, [("number".to_string(), "sg".to_string())]);
        assert_eq!(file.lists["weekdays"], "lunes|martes");
        assert_eq!(file.rules.len(), 1);
        assert_eq!(file.rules[0].pattern, ["<det><*>|el<det>"]);
    }

    #[test]
    fn clip_part_resolves_attributes() {
        let file = parse(SMALL).unwrap();
        let Statement::Out(values) = &file.rules[0].body[0] else {
            panic!("expected out");
        };
        let Value::Lu(inner) = &values[0] else {
            panic!("expected lu");
        };
        let Value::Clip(clip) = &inner[0] else {
            panic!("expected clip");
        };
        assert_eq!(clip.pos, 1);
        assert_eq!(clip.side, Some(Side::Target));
        assert_eq!(clip.parts, "whole");
    }

    #[test]
    fn unknown_category_is_an_error() {
        let source = r#"
<transfer>
  <section-rules>
    <rule>
      <pattern><pattern-item n="ghost"/></pattern>
      <action></action>
    </rule>
  </section-rules>
</transfer>
"#;
        assert!(matches!(
            parse(source),
            Err(CompileError::UnknownCategory { .. })
        ));
    }

    #[test]
    fn duplicate_macro_is_an_error() {
        let source = r#"
<transfer>
  <section-def-macros>
    <def-macro n="f" npar="1"></def-macro>
    <def-macro n="f" npar="2"></def-macro>
  </section-def-macros>
</transfer>
"#;
        assert!(matches!(
            parse(source),
            Err(CompileError::DuplicateMacro { .. })
        ));
    }

    #[test]
    fn macro_arity_is_checked() {
        let source = r#"
<transfer>
  <section-def-macros>
    <def-macro n="f" npar="2"></def-macro>
  </section-def-macros>
  <section-rules>
    <rule>
      <pattern></pattern>
      <action>
        <call-macro n="f">
          <with-param pos="1"/>
        </call-macro>
      </action>
    </rule>
  </section-rules>
</transfer>
"#;
        assert!(matches!(
            parse(source),
            Err(CompileError::WrongParamCount {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn conditions_parse() {
        let source = r#"
<transfer>
  <section-def-lists>
    <def-list n="days"><list-item v="lunes"/></def-list>
  </section-def-lists>
  <section-rules>
    <rule>
      <pattern></pattern>
      <action>
        <choose>
          <when>
            <test>
              <and>
                <equal caseless="yes">
                  <lit v="a"/>
                  <lit v="A"/>
                </equal>
                <in>
                  <lit v="lunes"/>
                  <list n="days"/>
                </in>
              </and>
            </test>
            <out><lit v="yes"/></out>
          </when>
          <otherwise>
            <out><lit v="no"/></out>
          </otherwise>
        </choose>
      </action>
    </rule>
  </section-rules>
</transfer>
"#;
        let file = parse(source).unwrap();
        let Statement::Choose { whens, otherwise } = &file.rules[0].body[0] else {
            panic!("expected choose");
        };
        assert_eq!(whens.len(), 1);
        assert!(otherwise.is_some());
        let Condition::And(children) = &whens[0].test else {
            panic!("expected and");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(
            children[0],
            Condition::Equal { caseless: true, .. }
        ));
        assert!(matches!(children[1], Condition::In { ref list, .. } if list == "lunes"));
    }
}
