//! Case and string operations.
//!
//! The reference toolchain leaned on the process-wide C locale for
//! `tolower`/`toupper`/`isupper`. Here the same operations are plain
//! functions over Unicode strings so nothing in the VM depends on
//! process-global state.

use std::fmt;

/// Letter case of a lexical unit, in the three-way form the transfer
/// language distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterCase {
    /// all lowercase: `aa`
    Lower,
    /// first letter uppercase: `Aa`
    Capitalized,
    /// all uppercase: `AA`
    Upper,
}

impl LetterCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LetterCase::Lower => "aa",
            LetterCase::Capitalized => "Aa",
            LetterCase::Upper => "AA",
        }
    }

    pub fn from_str(s: &str) -> Option<LetterCase> {
        match s {
            "aa" => Some(LetterCase::Lower),
            "Aa" => Some(LetterCase::Capitalized),
            "AA" => Some(LetterCase::Upper),
            _ => None,
        }
    }
}

impl fmt::Display for LetterCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when no character of `s` is lowercase. Digits and symbols do
/// not count against uppercase-ness.
fn is_upper(s: &str) -> bool {
    !s.chars().any(char::is_lowercase)
}

/// Classify the case of a string. One-letter uppercase strings count
/// as capitalized, not as all-uppercase.
pub fn case_of(s: &str) -> LetterCase {
    let first_upper = s.chars().next().map_or(false, char::is_uppercase);
    let all_upper = is_upper(s);

    if all_upper && s.chars().count() == 1 {
        LetterCase::Capitalized
    } else if first_upper && !all_upper {
        LetterCase::Capitalized
    } else if all_upper {
        LetterCase::Upper
    } else {
        LetterCase::Lower
    }
}

pub fn lowercase(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

pub fn uppercase(s: &str) -> String {
    s.chars().flat_map(char::to_uppercase).collect()
}

/// Recase a string. `Capitalized` uppercases the first letter and
/// leaves the rest untouched.
pub fn apply_case(s: &str, case: LetterCase) -> String {
    match case {
        LetterCase::Lower => lowercase(s),
        LetterCase::Upper => uppercase(s),
        LetterCase::Capitalized => {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

/// Recase by case name (`aa`/`Aa`/`AA`); anything else leaves the
/// string untouched.
pub fn apply_case_named(s: &str, case: &str) -> String {
    match LetterCase::from_str(case) {
        Some(c) => apply_case(s, c),
        None => s.to_string(),
    }
}

/// Lowercase only the lemma of a pattern, i.e. everything before the
/// first `<`. Tags keep their case.
pub fn lemma_to_lower(pattern: &str) -> String {
    match pattern.find('<') {
        Some(pos) => {
            let mut lowered = lowercase(&pattern[..pos]);
            lowered.push_str(&pattern[pos..]);
            lowered
        }
        None => lowercase(pattern),
    }
}

/// Replace the first occurrence of `from` in `s`, in place.
pub fn replace_first(s: &mut String, from: &str, to: &str) -> bool {
    if from.is_empty() {
        return false;
    }
    match s.find(from) {
        Some(pos) => {
            s.replace_range(pos..pos + from.len(), to);
            true
        }
        None => false,
    }
}
