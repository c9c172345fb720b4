//! The rule-file AST the code generator walks.
//!
//! Categories, attributes and lists are already expanded into the
//! `|`-joined option strings the VM consumes, so the generator never
//! needs the definition sections again.

use std::collections::HashMap;

/// Transfer stage a rule file targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transfer,
    Interchunk,
    Postchunk,
}

/// A parsed rule file.
#[derive(Debug)]
pub struct RuleFile {
    pub stage: Stage,
    /// `default` attribute of the transfer element: emit chunks for
    /// unmatched words.
    pub chunk_default: bool,
    /// Category name → `|`-joined pattern options.
    pub cats: HashMap<String, String>,
    /// Attribute name → `|`-joined tag alternatives.
    pub attrs: HashMap<String, String>,
    /// Variable definitions in declaration order, with defaults.
    pub vars: Vec<(String, String)>,
    /// List name → `|`-joined items.
    pub lists: HashMap<String, String>,
    pub macros: Vec<MacroDef>,
    pub rules: Vec<Rule>,
}

impl RuleFile {
    pub fn new(stage: Stage) -> RuleFile {
        RuleFile {
            stage,
            chunk_default: false,
            cats: HashMap::new(),
            attrs: HashMap::new(),
            vars: Vec::new(),
            lists: HashMap::new(),
            macros: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn find_macro(&self, name: &str) -> Option<&MacroDef> {
        self.macros.iter().find(|m| m.name == name)
    }
}

#[derive(Debug)]
pub struct MacroDef {
    pub name: String,
    pub params: usize,
    pub body: Vec<Statement>,
    pub line: u64,
}

#[derive(Debug)]
pub struct Rule {
    /// Pattern parts, one `|`-joined option string per matched word.
    pub pattern: Vec<String>,
    pub body: Vec<Statement>,
}

/// Side of a bilingual word a clip addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

/// A clip: part access on the word at a pattern position.
#[derive(Debug, Clone)]
pub struct Clip {
    pub pos: i64,
    pub side: Option<Side>,
    /// Expanded part string: a special part name or a `|`-joined
    /// attribute alternation.
    pub parts: String,
    pub link_to: Option<String>,
}

#[derive(Debug)]
pub enum Statement {
    Let {
        target: Target,
        value: Value,
    },
    Out(Vec<Value>),
    Choose {
        whens: Vec<When>,
        otherwise: Option<Vec<Statement>>,
    },
    ModifyCase {
        target: Target,
        case: Value,
    },
    Append {
        name: String,
        values: Vec<Value>,
    },
    CallMacro {
        name: String,
        params: Vec<i64>,
        line: u64,
    },
}

#[derive(Debug)]
pub struct When {
    pub test: Condition,
    pub body: Vec<Statement>,
}

/// Assignable containers of `let` and `modify-case`.
#[derive(Debug)]
pub enum Target {
    Var(String),
    Clip(Clip),
}

/// Value expressions: everything that leaves one string on the stack.
#[derive(Debug)]
pub enum Value {
    Lit(String),
    /// Already in `<a><b>` form.
    LitTag(String),
    Var(String),
    Clip(Clip),
    /// `<b/>` with or without a position: a superblank or a space.
    Blank(Option<i64>),
    Lu(Vec<Value>),
    Mlu(Vec<Vec<Value>>),
    Chunk(ChunkExpr),
    Concat(Vec<Value>),
    LuCount,
    CaseOf {
        pos: i64,
        side: Option<Side>,
        parts: String,
    },
    GetCaseFrom {
        pos: i64,
        inner: Box<Value>,
    },
}

#[derive(Debug)]
pub struct ChunkExpr {
    pub name: Option<String>,
    /// Variable holding the chunk name, if `namefrom` is used.
    pub name_from: Option<String>,
    /// Variable holding the case to apply to the name.
    pub case: Option<String>,
    pub tags: Vec<Value>,
    pub items: Vec<Value>,
}

/// Boolean conditions of `when` tests.
#[derive(Debug)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Equal {
        left: Value,
        right: Value,
        caseless: bool,
    },
    BeginsWith {
        value: Value,
        set: Value,
        caseless: bool,
    },
    EndsWith {
        value: Value,
        set: Value,
        caseless: bool,
    },
    ContainsSubstring {
        haystack: Value,
        needle: Value,
        caseless: bool,
    },
    In {
        value: Value,
        list: String,
        caseless: bool,
    },
}
