//! Words of the token stream and the stage-specific tokenizers.
//!
//! The transfer stage works on bilingual words (`^sl/tl$`); the
//! interchunk and postchunk stages work on chunk words
//! (`^name<tags>{…}$`). Text between words is collected as
//! superblanks; after tokenizing, `blanks.len() == words.len() + 1`
//! always holds.

use tracing::warn;

use xfer_core::strings::{self, LetterCase};

use crate::lexical_unit::{ChunkLexicalUnit, LexicalUnit, LuPart};

/// One word of the input stream.
#[derive(Debug, Clone)]
pub enum TransferWord {
    Bilingual(BilingualWord),
    Chunk(ChunkWord),
}

impl TransferWord {
    pub fn as_bilingual(&mut self) -> Option<&mut BilingualWord> {
        match self {
            TransferWord::Bilingual(w) => Some(w),
            TransferWord::Chunk(_) => None,
        }
    }

    pub fn as_chunk(&mut self) -> Option<&mut ChunkWord> {
        match self {
            TransferWord::Chunk(w) => Some(w),
            TransferWord::Bilingual(_) => None,
        }
    }
}

/// A source/target pair of lexical units.
#[derive(Debug, Clone, Default)]
pub struct BilingualWord {
    pub source: LexicalUnit,
    pub target: LexicalUnit,
}

/// Tokenize a bilingual stream. `^` opens a word and flushes the
/// pending text as a superblank, the first `/` ends the source side,
/// any further `/` starts an ignored alternative target, `$` closes
/// the word. A backslash keeps the next character literal; both stay
/// in the token.
pub fn tokenize_bilingual(
    input: &str,
    words: &mut Vec<TransferWord>,
    blanks: &mut Vec<String>,
) {
    let mut token = String::new();
    let mut escape = false;
    let mut ignore_rest = false;
    let mut in_word = false;
    let mut source_set = false;
    let mut source = LexicalUnit::default();

    for ch in input.chars() {
        if ignore_rest && ch != '$' {
            continue;
        }
        if escape {
            token.push(ch);
            escape = false;
            continue;
        }
        match ch {
            '\\' => {
                token.push(ch);
                escape = true;
            }
            '^' => {
                blanks.push(std::mem::take(&mut token));
                in_word = true;
            }
            '/' if in_word => {
                if !source_set {
                    source = LexicalUnit::new(std::mem::take(&mut token));
                    source_set = true;
                } else {
                    ignore_rest = true;
                }
            }
            '$' if in_word => {
                let target = LexicalUnit::new(std::mem::take(&mut token));
                words.push(TransferWord::Bilingual(BilingualWord {
                    source: std::mem::take(&mut source),
                    target,
                }));
                in_word = false;
                source_set = false;
                ignore_rest = false;
            }
            _ => token.push(ch),
        }
    }

    // The trailing text up to and including the last ']' closes the
    // stream as the final superblank.
    match token.rfind(']') {
        Some(pos) => blanks.push(token[..=pos].to_string()),
        None => blanks.push(token),
    }
}

/// A chunk word: the outer chunk unit plus its inner lexical units
/// and the blanks between them, both parsed on demand.
#[derive(Debug, Clone, Default)]
pub struct ChunkWord {
    pub chunk: ChunkLexicalUnit,
    content: Vec<LexicalUnit>,
    blanks: Vec<String>,
}

impl ChunkWord {
    pub fn new(chunk: ChunkLexicalUnit) -> ChunkWord {
        ChunkWord {
            chunk,
            content: Vec::new(),
            blanks: Vec::new(),
        }
    }

    /// Resolve `<1>`…`<9>` references inside the chunk content (and
    /// whole) to the chunk's own tags. Out-of-range references warn
    /// and resolve to the empty string.
    pub fn solve_references(&mut self) {
        let tags = self.chunk.part(LuPart::Tags);
        let mut tag_values = Vec::new();
        let mut start = 0;
        while let Some(pos) = tags[start..].find('>') {
            tag_values.push(tags[start..start + pos + 1].to_string());
            start += pos + 1;
        }

        let chcontent: Vec<char> = self.chunk.part(LuPart::Chcontent).chars().collect();
        let mut new_whole = self.chunk.part(LuPart::Whole);
        let mut new_chcontent: String = chcontent.iter().collect();

        for i in 1..chcontent.len().saturating_sub(1) {
            if chcontent[i - 1] == '<' && chcontent[i + 1] == '>' {
                if let Some(pos) = chcontent[i].to_digit(10) {
                    let tag = match pos
                        .checked_sub(1)
                        .and_then(|p| tag_values.get(p as usize))
                    {
                        Some(tag) => tag.clone(),
                        None => {
                            warn!(
                                position = pos,
                                tags = %tags,
                                "chunk tag reference not found in tag string"
                            );
                            String::new()
                        }
                    };
                    let reference = format!("<{}>", chcontent[i]);
                    new_whole = new_whole.replace(&reference, &tag);
                    new_chcontent = new_chcontent.replace(&reference, &tag);
                }
            }
        }

        self.chunk.set_part(LuPart::Whole, new_whole);
        self.chunk.set_part(LuPart::Chcontent, new_chcontent);
    }

    /// Split the chunk content into inner lexical units and the
    /// blanks between them, applying the pseudolemma case rule: `AA`
    /// uppercases every inner lemma, `Aa` capitalizes the first.
    /// Recased lemmas are written back into the chunk content so the
    /// two views stay consistent. A re-parse rebuilds from scratch.
    pub fn parse_chunk_content(&mut self) {
        let pseudolemma_case = strings::case_of(&self.chunk.part(LuPart::Lem));
        let uppercase_all = pseudolemma_case == LetterCase::Upper;
        let mut first_upper = pseudolemma_case == LetterCase::Capitalized;

        self.content.clear();
        self.blanks.clear();
        // The first blank is the one before the first inner unit.
        self.blanks.push(String::new());
        let mut first_lu = true;

        let chcontent = self.chunk.part(LuPart::Chcontent);
        let inner: Vec<char> = chcontent.chars().collect();
        let mut token = String::new();
        let mut escape = false;

        // Skip the enclosing '{' and '}'.
        for i in 1..inner.len().saturating_sub(1) {
            let ch = inner[i];
            if escape {
                token.push(ch);
                escape = false;
            } else if ch == '\\' {
                token.push(ch);
                escape = true;
            } else if ch == '^' {
                if first_lu {
                    first_lu = false;
                } else {
                    self.blanks.push(std::mem::take(&mut token));
                }
                token.clear();
            } else if ch == '$' {
                let mut lu = LexicalUnit::new(std::mem::take(&mut token));
                if uppercase_all || first_upper {
                    self.change_lemma_case(&mut lu, pseudolemma_case);
                    first_upper = false;
                }
                self.content.push(lu);
            } else {
                token.push(ch);
            }
        }
    }

    /// Recase the lemma of an inner unit and mirror the change into
    /// the chunk content.
    fn change_lemma_case(&mut self, lu: &mut LexicalUnit, case: LetterCase) {
        let old_lem = lu.part(LuPart::Lem);
        let new_lem = strings::apply_case(&old_lem, case);
        lu.set_part(LuPart::Lem, new_lem.clone());
        self.update_chunk_content(&old_lem, &new_lem);
    }

    /// Replace the first occurrence of `old` inside the chunk content
    /// with `new`, keeping the outer unit in sync after an inner unit
    /// changed.
    pub fn update_chunk_content(&mut self, old: &str, new: &str) {
        let mut chcontent = self.chunk.part(LuPart::Chcontent);
        if strings::replace_first(&mut chcontent, old, new) {
            self.chunk.set_part(LuPart::Chcontent, chcontent);
        }
    }

    /// Inner unit at `pos`, parsing the content first if needed.
    pub fn content_lexical_unit(&mut self, pos: usize) -> Option<&mut LexicalUnit> {
        if self.content.is_empty() {
            self.parse_chunk_content();
        }
        self.content.get_mut(pos)
    }

    /// Number of inner lexical units.
    pub fn lu_count(&mut self) -> usize {
        if self.content.is_empty() {
            self.parse_chunk_content();
        }
        self.content.len()
    }

    /// Blank at `pos` inside the chunk, or "" past the end.
    pub fn blank(&self, pos: usize) -> String {
        self.blanks.get(pos).cloned().unwrap_or_default()
    }
}

/// Tokenize a chunk stream. The `^` and `$` of inner lexical units
/// stay literal inside the chunk token; `}` closes the chunk and the
/// chunk's own `^`/`$` are dropped. In the postchunk stage the chunk
/// tag references are solved and the content is parsed eagerly.
pub fn tokenize_chunks(
    input: &str,
    words: &mut Vec<TransferWord>,
    blanks: &mut Vec<String>,
    solve_refs: bool,
    parse_content: bool,
) {
    let mut token = String::new();
    let mut chunk_start = true;
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            token.push(ch);
            escape = false;
            continue;
        }
        match ch {
            '\\' => {
                token.push(ch);
                escape = true;
            }
            '^' => {
                if chunk_start {
                    blanks.push(std::mem::take(&mut token));
                    chunk_start = false;
                } else {
                    token.push(ch);
                }
            }
            '$' => {
                if !chunk_start {
                    token.push(ch);
                }
            }
            '}' => {
                token.push(ch);
                let mut word = ChunkWord::new(ChunkLexicalUnit::new(std::mem::take(&mut token)));
                if solve_refs {
                    word.solve_references();
                }
                if parse_content {
                    word.parse_chunk_content();
                }
                words.push(TransferWord::Chunk(word));
                chunk_start = true;
            }
            _ => token.push(ch),
        }
    }

    // The last superblank of the input, usually the newline.
    blanks.push(token);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bilingual(input: &str) -> (Vec<TransferWord>, Vec<String>) {
        let mut words = Vec::new();
        let mut blanks = Vec::new();
        tokenize_bilingual(input, &mut words, &mut blanks);
        (words, blanks)
    }

    fn chunks(input: &str, refs: bool, content: bool) -> (Vec<TransferWord>, Vec<String>) {
        let mut words = Vec::new();
        let mut blanks = Vec::new();
        tokenize_chunks(input, &mut words, &mut blanks, refs, content);
        (words, blanks)
    }

    #[test]
    fn bilingual_words_and_blanks() {
        let (mut words, blanks) = bilingual("^the<det>/el<det>$ ^cat<n>/gat<n>$\n");
        assert_eq!(words.len(), 2);
        assert_eq!(blanks, ["", " ", "\n"]);
        let w = words[0].as_bilingual().unwrap();
        assert_eq!(w.source.whole(), "the<det>");
        assert_eq!(w.target.whole(), "el<det>");
        assert_eq!(blanks.len(), words.len() + 1);
    }

    #[test]
    fn only_first_target_alternative_is_kept() {
        let (mut words, _) = bilingual("^sl<n>/tl1<n>/tl2<n>/tl3<n>$");
        let w = words[0].as_bilingual().unwrap();
        assert_eq!(w.source.whole(), "sl<n>");
        assert_eq!(w.target.whole(), "tl1<n>");
    }

    #[test]
    fn escapes_stay_in_the_token() {
        let (mut words, _) = bilingual(r"^a\/b<n>/c\$d<n>$");
        let w = words[0].as_bilingual().unwrap();
        assert_eq!(w.source.whole(), r"a\/b<n>");
        assert_eq!(w.target.whole(), r"c\$d<n>");
    }

    #[test]
    fn trailing_blank_keeps_text_up_to_last_bracket() {
        let (_, blanks) = bilingual("^a<n>/b<n>$ [tail] extra");
        assert_eq!(blanks.last().unwrap(), " [tail]");
    }

    #[test]
    fn trailing_blank_without_bracket_is_verbatim() {
        let (_, blanks) = bilingual("^a<n>/b<n>$\n");
        assert_eq!(blanks.last().unwrap(), "\n");
    }

    #[test]
    fn chunk_words_keep_inner_units_literal() {
        let (mut words, blanks) = chunks("^NP<SN>{^el<det>$ ^gat<n>$}$\n", false, false);
        assert_eq!(words.len(), 1);
        assert_eq!(blanks, ["", "\n"]);
        let w = words[0].as_chunk().unwrap();
        assert_eq!(w.chunk.part(LuPart::Lem), "NP");
        assert_eq!(w.chunk.part(LuPart::Chcontent), "{^el<det>$ ^gat<n>$}");
    }

    #[test]
    fn chunk_content_parsing_and_blanks() {
        let (mut words, _) = chunks("^np<SN>{^el<det>$ ^gat<n>$}$", false, true);
        let w = words[0].as_chunk().unwrap();
        assert_eq!(w.lu_count(), 2);
        assert_eq!(w.blank(0), "");
        assert_eq!(w.blank(1), " ");
        assert_eq!(w.blank(9), "");
        assert_eq!(w.content_lexical_unit(1).unwrap().part(LuPart::Lem), "gat");
    }

    #[test]
    fn pseudolemma_case_propagates_to_inner_lemmas() {
        // Capitalized pseudolemma capitalizes the first inner lemma only.
        let (mut words, _) = chunks("^Np<SN>{^el<det>$ ^gat<n>$}$", false, true);
        let w = words[0].as_chunk().unwrap();
        assert_eq!(w.content_lexical_unit(0).unwrap().part(LuPart::Lem), "El");
        assert_eq!(w.content_lexical_unit(1).unwrap().part(LuPart::Lem), "gat");
        assert_eq!(w.chunk.part(LuPart::Chcontent), "{^El<det>$ ^gat<n>$}");

        // Uppercase pseudolemma uppercases every inner lemma.
        let (mut words, _) = chunks("^NP<SN>{^el<det>$ ^gat<n>$}$", false, true);
        let w = words[0].as_chunk().unwrap();
        assert_eq!(w.content_lexical_unit(0).unwrap().part(LuPart::Lem), "EL");
        assert_eq!(w.content_lexical_unit(1).unwrap().part(LuPart::Lem), "GAT");
        assert_eq!(w.chunk.part(LuPart::Chcontent), "{^EL<det>$ ^GAT<n>$}");
    }

    #[test]
    fn references_resolve_to_chunk_tags() {
        let (mut words, _) = chunks("^np<SN><pl>{^el<det><2>$ ^gat<n><2>$}$", true, false);
        let w = words[0].as_chunk().unwrap();
        assert_eq!(w.chunk.part(LuPart::Chcontent), "{^el<det><pl>$ ^gat<n><pl>$}");
    }

    #[test]
    fn out_of_range_reference_becomes_empty() {
        let (mut words, _) = chunks("^np<SN>{^gat<n><3>$}$", true, false);
        let w = words[0].as_chunk().unwrap();
        assert_eq!(w.chunk.part(LuPart::Chcontent), "{^gat<n>$}");
    }

    #[test]
    fn reparsing_after_content_change_rebuilds() {
        let (mut words, _) = chunks("^np<SN>{^el<det>$ ^gat<n>$}$", false, true);
        let w = words[0].as_chunk().unwrap();
        assert_eq!(w.lu_count(), 2);
        w.chunk.set_part(LuPart::Chcontent, "{^gos<n>$}");
        w.parse_chunk_content();
        assert_eq!(w.lu_count(), 1);
        assert_eq!(w.content_lexical_unit(0).unwrap().part(LuPart::Lem), "gos");
    }
}
