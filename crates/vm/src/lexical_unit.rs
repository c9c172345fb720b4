//! Lexical units and their on-demand parsing.
//!
//! A unit is constructed from its raw text and only split into parts
//! the first time a part is asked for. Mutating a part keeps the unit
//! parsed; overwriting the whole text reverts it to unparsed so the
//! next access re-splits.

use xfer_core::strings::replace_first;

/// The addressable parts of a lexical unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuPart {
    Whole,
    Lem,
    Lemh,
    Lemq,
    Tags,
    Chcontent,
    Content,
}

impl LuPart {
    /// Map a `clip`/`store` part operand to the enum; `None` for
    /// attribute alternations.
    pub fn from_name(name: &str) -> Option<LuPart> {
        match name {
            "whole" => Some(LuPart::Whole),
            "lem" => Some(LuPart::Lem),
            "lemh" => Some(LuPart::Lemh),
            "lemq" => Some(LuPart::Lemq),
            "tags" => Some(LuPart::Tags),
            "chcontent" => Some(LuPart::Chcontent),
            "content" => Some(LuPart::Content),
            _ => None,
        }
    }
}

/// A monolingual lexical unit: one side of a bilingual word, or an
/// inner unit of a chunk. Multiwords carry a head (`lemh`) and a
/// queue (`lemq`) split at `#`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexicalUnit {
    whole: String,
    lem: String,
    lemh: String,
    lemq: String,
    tags: String,
    parsed: bool,
    lemq_before_tags: bool,
}

impl LexicalUnit {
    pub fn new(whole: impl Into<String>) -> LexicalUnit {
        LexicalUnit {
            whole: whole.into(),
            ..LexicalUnit::default()
        }
    }

    /// Split `whole` into lemma, head, queue and tags. The queue can
    /// sit before the tags (`vino#ir<vblex>`) or after them
    /// (`vino<vblex>#ir`); the order is recorded so the whole can be
    /// rebuilt the way it came in.
    fn parse(&mut self) {
        let tag = self.whole.find('<');
        let head = self.whole.find('#');

        match tag {
            Some(t) => {
                if head.map_or(true, |h| h < t) {
                    self.lemq_before_tags = true;
                    self.lem = self.whole[..t].to_string();
                    self.tags = self.whole[t..].to_string();
                } else {
                    let h = head.unwrap();
                    self.lemq_before_tags = false;
                    self.lem = format!("{}{}", &self.whole[..t], &self.whole[h..]);
                    self.tags = self.whole[t..h].to_string();
                }
            }
            None => {
                self.lem = self.whole.clone();
                self.tags = String::new();
            }
        }

        match head {
            Some(h) => {
                if tag.map_or(true, |t| h < t) {
                    let t = tag.unwrap_or(self.whole.len());
                    self.lemh = self.whole[..h].to_string();
                    self.lemq = self.whole[h..t].to_string();
                } else {
                    self.lemh = self.whole[..tag.unwrap()].to_string();
                    self.lemq = self.whole[h..].to_string();
                }
            }
            None => {
                self.lemh = self.lem.clone();
                self.lemq = String::new();
            }
        }

        self.parsed = true;
    }

    /// The whole unit. Unparsed units return their original text;
    /// parsed units are rebuilt in the recorded queue/tags order.
    pub fn whole(&self) -> String {
        if !self.parsed {
            self.whole.clone()
        } else if self.lemq_before_tags {
            format!("{}{}{}", self.lemh, self.lemq, self.tags)
        } else {
            format!("{}{}{}", self.lemh, self.tags, self.lemq)
        }
    }

    pub fn part(&mut self, part: LuPart) -> String {
        if part != LuPart::Whole && !self.parsed {
            self.parse();
        }
        match part {
            LuPart::Whole => self.whole(),
            LuPart::Lem => self.lem.clone(),
            LuPart::Lemh => self.lemh.clone(),
            LuPart::Lemq => self.lemq.clone(),
            LuPart::Tags => self.tags.clone(),
            // A monolingual unit has no chunk content; answer with the
            // whole, as the reference unit does.
            LuPart::Chcontent | LuPart::Content => self.whole(),
        }
    }

    pub fn set_part(&mut self, part: LuPart, value: impl Into<String>) {
        if part != LuPart::Whole && !self.parsed {
            self.parse();
        }
        match part {
            LuPart::Whole => {
                self.whole = value.into();
                self.parsed = false;
            }
            LuPart::Lem => self.lem = value.into(),
            LuPart::Lemh => self.lemh = value.into(),
            LuPart::Lemq => self.lemq = value.into(),
            LuPart::Tags => self.tags = value.into(),
            LuPart::Chcontent | LuPart::Content => {}
        }
    }

    /// Replace the first occurrence of `tag` inside the tag string.
    pub fn modify_tag(&mut self, tag: &str, value: &str) {
        if !self.parsed {
            self.parse();
        }
        replace_first(&mut self.tags, tag, value);
    }
}

/// The outer unit of a chunk: `pseudolemma<tags>{content}`. The chunk
/// content keeps its braces; `Content` strips them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkLexicalUnit {
    whole: String,
    pseudolemma: String,
    tags: String,
    chcontent: String,
    parsed: bool,
}

impl ChunkLexicalUnit {
    pub fn new(whole: impl Into<String>) -> ChunkLexicalUnit {
        ChunkLexicalUnit {
            whole: whole.into(),
            ..ChunkLexicalUnit::default()
        }
    }

    fn parse(&mut self) {
        let tag = self.whole.find('<');
        let content_start = self.whole.find('{').unwrap_or(self.whole.len());

        match tag {
            Some(t) if t < content_start => {
                self.pseudolemma = self.whole[..t].to_string();
                self.tags = self.whole[t..content_start].to_string();
            }
            _ => {
                self.pseudolemma = self.whole[..content_start].to_string();
                self.tags = String::new();
            }
        }

        self.chcontent = self.whole[content_start..].to_string();
        self.parsed = true;
    }

    pub fn whole(&self) -> String {
        if !self.parsed {
            self.whole.clone()
        } else {
            format!("{}{}{}", self.pseudolemma, self.tags, self.chcontent)
        }
    }

    pub fn part(&mut self, part: LuPart) -> String {
        if part != LuPart::Whole && !self.parsed {
            self.parse();
        }
        match part {
            LuPart::Whole => self.whole(),
            LuPart::Lem | LuPart::Lemh => self.pseudolemma.clone(),
            LuPart::Lemq => String::new(),
            LuPart::Tags => self.tags.clone(),
            LuPart::Chcontent => self.chcontent.clone(),
            LuPart::Content => {
                let inner = self.chcontent.strip_prefix('{').unwrap_or(&self.chcontent);
                inner.strip_suffix('}').unwrap_or(inner).to_string()
            }
        }
    }

    pub fn set_part(&mut self, part: LuPart, value: impl Into<String>) {
        if part != LuPart::Whole && !self.parsed {
            self.parse();
        }
        match part {
            LuPart::Whole => {
                self.whole = value.into();
                self.parsed = false;
            }
            LuPart::Lem | LuPart::Lemh => self.pseudolemma = value.into(),
            LuPart::Tags => self.tags = value.into(),
            LuPart::Chcontent => self.chcontent = value.into(),
            LuPart::Lemq | LuPart::Content => {}
        }
    }

    pub fn modify_tag(&mut self, tag: &str, value: &str) {
        if !self.parsed {
            self.parse();
        }
        replace_first(&mut self.tags, tag, value);
    }
}

/// A mutable handle on either kind of unit, handed to the interpreter
/// by the word table.
pub enum LuRef<'a> {
    Mono(&'a mut LexicalUnit),
    Chunk(&'a mut ChunkLexicalUnit),
}

impl LuRef<'_> {
    pub fn whole(&self) -> String {
        match self {
            LuRef::Mono(lu) => lu.whole(),
            LuRef::Chunk(lu) => lu.whole(),
        }
    }

    pub fn part(&mut self, part: LuPart) -> String {
        match self {
            LuRef::Mono(lu) => lu.part(part),
            LuRef::Chunk(lu) => lu.part(part),
        }
    }

    pub fn set_part(&mut self, part: LuPart, value: impl Into<String>) {
        match self {
            LuRef::Mono(lu) => lu.set_part(part, value),
            LuRef::Chunk(lu) => lu.set_part(part, value),
        }
    }

    pub fn modify_tag(&mut self, tag: &str, value: &str) {
        match self {
            LuRef::Mono(lu) => lu.modify_tag(tag, value),
            LuRef::Chunk(lu) => lu.modify_tag(tag, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lemma_and_tags() {
        let mut lu = LexicalUnit::new("gat<n><m>");
        assert_eq!(lu.part(LuPart::Lem), "gat");
        assert_eq!(lu.part(LuPart::Lemh), "gat");
        assert_eq!(lu.part(LuPart::Lemq), "");
        assert_eq!(lu.part(LuPart::Tags), "<n><m>");
        assert_eq!(lu.whole(), "gat<n><m>");
    }

    #[test]
    fn queue_before_tags() {
        let mut lu = LexicalUnit::new("take# out<vblex>");
        assert_eq!(lu.part(LuPart::Lemh), "take");
        assert_eq!(lu.part(LuPart::Lemq), "# out");
        assert_eq!(lu.part(LuPart::Tags), "<vblex>");
        assert_eq!(lu.part(LuPart::Lem), "take# out");
        assert_eq!(lu.whole(), "take# out<vblex>");
    }

    #[test]
    fn queue_after_tags() {
        let mut lu = LexicalUnit::new("take<vblex># out");
        assert_eq!(lu.part(LuPart::Lemh), "take");
        assert_eq!(lu.part(LuPart::Lemq), "# out");
        assert_eq!(lu.part(LuPart::Tags), "<vblex>");
        assert_eq!(lu.part(LuPart::Lem), "take# out");
        assert_eq!(lu.whole(), "take<vblex># out");
    }

    #[test]
    fn no_tags_at_all() {
        let mut lu = LexicalUnit::new("word");
        assert_eq!(lu.part(LuPart::Lem), "word");
        assert_eq!(lu.part(LuPart::Tags), "");
        assert_eq!(lu.whole(), "word");
    }

    #[test]
    fn setting_whole_reverts_to_unparsed() {
        let mut lu = LexicalUnit::new("gat<n>");
        assert_eq!(lu.part(LuPart::Lem), "gat");
        lu.set_part(LuPart::Whole, "gos<n>");
        assert_eq!(lu.whole(), "gos<n>");
        assert_eq!(lu.part(LuPart::Lem), "gos");
    }

    #[test]
    fn part_mutation_shows_in_whole() {
        let mut lu = LexicalUnit::new("gat<n><m>");
        lu.set_part(LuPart::Tags, "<n><f>");
        assert_eq!(lu.whole(), "gat<n><f>");
        lu.modify_tag("<f>", "<mf>");
        assert_eq!(lu.whole(), "gat<n><mf>");
    }

    #[test]
    fn chunk_unit_parts() {
        let mut lu = ChunkLexicalUnit::new("NP<SN><f>{^el<det>$ ^gat<n>$}");
        assert_eq!(lu.part(LuPart::Lem), "NP");
        assert_eq!(lu.part(LuPart::Tags), "<SN><f>");
        assert_eq!(lu.part(LuPart::Chcontent), "{^el<det>$ ^gat<n>$}");
        assert_eq!(lu.part(LuPart::Content), "^el<det>$ ^gat<n>$");
        assert_eq!(lu.whole(), "NP<SN><f>{^el<det>$ ^gat<n>$}");
    }

    #[test]
    fn chunk_unit_without_tags() {
        let mut lu = ChunkLexicalUnit::new("NP{^x$}");
        assert_eq!(lu.part(LuPart::Lem), "NP");
        assert_eq!(lu.part(LuPart::Tags), "");
        assert_eq!(lu.part(LuPart::Chcontent), "{^x$}");
    }
}
