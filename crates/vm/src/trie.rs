//! The pattern trie.
//!
//! Patterns are stored token by token: a lemma is one token, each
//! `<tag>` is one token. Besides literal edges every node can carry a
//! lemma-wildcard transition (taken by any lemma token) and a
//! tag-wildcard transition (taken by any tag token, installed by
//! `<*>`). Wildcard nodes loop on themselves so a single wildcard
//! edge swallows a whole run of tokens.
//!
//! Nodes live in an arena and refer to each other by index; the
//! wildcard self-loops are a node holding its own id.

use std::collections::HashMap;

use tracing::warn;

use xfer_core::strings::lemma_to_lower;

pub type NodeId = usize;

#[derive(Debug, Default)]
struct TrieNode {
    rule: Option<u32>,
    links: HashMap<String, NodeId>,
    star: Option<NodeId>,
    star_tag: Option<NodeId>,
}

/// Trie of all rule patterns, queried by the rule-selection loop.
#[derive(Debug)]
pub struct PatternTrie {
    nodes: Vec<TrieNode>,
}

impl Default for PatternTrie {
    fn default() -> Self {
        PatternTrie::new()
    }
}

impl PatternTrie {
    pub const ROOT: NodeId = 0;

    pub fn new() -> PatternTrie {
        PatternTrie {
            nodes: vec![TrieNode::default()],
        }
    }

    fn fresh_node(&mut self) -> NodeId {
        self.nodes.push(TrieNode::default());
        self.nodes.len() - 1
    }

    fn star_of(&mut self, id: NodeId) -> NodeId {
        match self.nodes[id].star {
            Some(star) => star,
            None => {
                let star = self.fresh_node();
                self.nodes[star].star = Some(star);
                self.nodes[id].star = Some(star);
                star
            }
        }
    }

    fn star_tag_of(&mut self, id: NodeId) -> NodeId {
        match self.nodes[id].star_tag {
            Some(star) => star,
            None => {
                let star = self.fresh_node();
                self.nodes[star].star_tag = Some(star);
                self.nodes[id].star_tag = Some(star);
                star
            }
        }
    }

    /// Walk (and create) the token path of one pattern alternative
    /// from `node`, writing `rule` on the terminal. A terminal that
    /// already carries a different rule keeps the smaller number.
    fn insert_tokens(&mut self, node: NodeId, pattern: &str, rule: Option<u32>) -> NodeId {
        let lowered = lemma_to_lower(pattern);
        let mut current = node;
        for token in PatternTokens::new(&lowered) {
            current = if token == "<*>" {
                self.star_tag_of(current)
            } else {
                match self.nodes[current].links.get(token) {
                    Some(&next) => next,
                    None => {
                        let next = self.fresh_node();
                        self.nodes[current].links.insert(token.to_string(), next);
                        next
                    }
                }
            };
        }

        if let Some(rule) = rule {
            match self.nodes[current].rule {
                None => self.nodes[current].rule = Some(rule),
                Some(existing) => {
                    if existing != rule {
                        warn!(
                            rule,
                            blocking = existing,
                            "paths to rule are blocked by an earlier rule"
                        );
                    }
                    self.nodes[current].rule = Some(existing.min(rule));
                }
            }
        }

        current
    }

    /// Insert a pattern as an ordered list of alternation segments.
    /// Each segment is a `|`-separated set of options; an option that
    /// begins with `<` first takes the lemma-wildcard transition so
    /// any lemma can precede its tags. Only the last segment carries
    /// the rule number.
    pub fn add_pattern(&mut self, parts: &[String], rule_number: u32) {
        let mut current: Vec<NodeId> = vec![Self::ROOT];

        for (i, part) in parts.iter().enumerate() {
            let rule = if i == parts.len() - 1 {
                Some(rule_number)
            } else {
                None
            };

            let mut next = Vec::new();
            for &node in &current {
                for option in part.split('|') {
                    let from = if option.starts_with('<') {
                        self.star_of(node)
                    } else {
                        node
                    };
                    next.push(self.insert_tokens(from, option, rule));
                }
            }
            current = next;
        }
    }

    fn push_next_nodes(&self, node: NodeId, token: &str, out: &mut Vec<NodeId>) {
        // The unknown-word lemma matches nothing.
        if token.starts_with('*') {
            return;
        }
        if let Some(&next) = self.nodes[node].links.get(token) {
            out.push(next);
        }
        let wildcard = if token.starts_with('<') {
            self.nodes[node].star_tag
        } else {
            self.nodes[node].star
        };
        if let Some(next) = wildcard {
            out.push(next);
        }
    }

    /// All nodes reachable from `start` by consuming `pattern`. Empty
    /// when the pattern falls off the trie.
    pub fn pattern_nodes(&self, pattern: &str, start: NodeId) -> Vec<NodeId> {
        if pattern.is_empty() {
            return Vec::new();
        }

        let lowered = lemma_to_lower(pattern);
        let mut current = vec![start];

        for token in PatternTokens::new(&lowered) {
            let mut next = Vec::new();
            for &node in &current {
                self.push_next_nodes(node, token, &mut next);
            }
            current = next;
            if current.is_empty() {
                return current;
            }
        }

        current
    }

    /// The smallest rule number among `nodes`, i.e. the earliest
    /// declared rule.
    pub fn rule_of_nodes(&self, nodes: &[NodeId]) -> Option<u32> {
        nodes.iter().filter_map(|&n| self.nodes[n].rule).min()
    }

    /// Rule matching `pattern` from the root, if any.
    pub fn rule_number(&self, pattern: &str) -> Option<u32> {
        let nodes = self.pattern_nodes(pattern, Self::ROOT);
        self.rule_of_nodes(&nodes)
    }
}

/// Iterator over the tokens of a pattern: a lemma run, then single
/// `<…>` tags.
struct PatternTokens<'a> {
    rest: &'a str,
}

impl<'a> PatternTokens<'a> {
    fn new(pattern: &'a str) -> PatternTokens<'a> {
        PatternTokens { rest: pattern }
    }
}

impl<'a> Iterator for PatternTokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        let len = if self.rest.starts_with('<') {
            match self.rest.find('>') {
                Some(pos) => pos + 1,
                None => self.rest.len(),
            }
        } else {
            match self.rest.find('<') {
                Some(pos) => pos,
                None => self.rest.len(),
            }
        };
        let (token, rest) = self.rest.split_at(len);
        self.rest = rest;
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(s: &str) -> Vec<String> {
        vec![s.to_string()]
    }

    #[test]
    fn pattern_tokens_split_lemma_and_tags() {
        let tokens: Vec<&str> = PatternTokens::new("gat<n><m>").collect();
        assert_eq!(tokens, ["gat", "<n>", "<m>"]);
        let tokens: Vec<&str> = PatternTokens::new("<det><def>").collect();
        assert_eq!(tokens, ["<det>", "<def>"]);
    }

    #[test]
    fn literal_lookup() {
        let mut trie = PatternTrie::new();
        trie.add_pattern(&part("gat<n>"), 4);
        assert_eq!(trie.rule_number("gat<n>"), Some(4));
        assert_eq!(trie.rule_number("gos<n>"), None);
    }

    #[test]
    fn tag_only_pattern_matches_any_lemma() {
        let mut trie = PatternTrie::new();
        trie.add_pattern(&part("<det>"), 1);
        assert_eq!(trie.rule_number("the<det>"), Some(1));
        assert_eq!(trie.rule_number("a<det>"), Some(1));
        assert_eq!(trie.rule_number("a<n>"), None);
    }

    #[test]
    fn tag_wildcard_swallows_tag_runs() {
        let mut trie = PatternTrie::new();
        trie.add_pattern(&part("<n><*>"), 2);
        assert_eq!(trie.rule_number("gat<n><m>"), Some(2));
        assert_eq!(trie.rule_number("gat<n><m><sg>"), Some(2));
        assert_eq!(trie.rule_number("gat<n>"), None);
    }

    #[test]
    fn lemma_is_lowercased_on_both_sides() {
        let mut trie = PatternTrie::new();
        trie.add_pattern(&part("Gat<n>"), 3);
        assert_eq!(trie.rule_number("GAT<n>"), Some(3));
        assert_eq!(trie.rule_number("gat<n>"), Some(3));
    }

    #[test]
    fn unknown_word_lemma_matches_nothing() {
        let mut trie = PatternTrie::new();
        trie.add_pattern(&part("<det>"), 0);
        assert_eq!(trie.rule_number("*the<det>"), None);
    }

    #[test]
    fn alternation_segments() {
        let mut trie = PatternTrie::new();
        trie.add_pattern(&part("el<det>|la<det>"), 7);
        assert_eq!(trie.rule_number("el<det>"), Some(7));
        assert_eq!(trie.rule_number("la<det>"), Some(7));
        assert_eq!(trie.rule_number("un<det>"), None);
    }

    #[test]
    fn multi_segment_walk() {
        let mut trie = PatternTrie::new();
        trie.add_pattern(&[ "<det>".to_string(), "<n>".to_string() ], 0);
        let first = trie.pattern_nodes("el<det>", PatternTrie::ROOT);
        assert!(!first.is_empty());
        assert_eq!(trie.rule_of_nodes(&first), None);
        let mut terminal = Vec::new();
        for node in first {
            terminal.extend(trie.pattern_nodes("gat<n>", node));
        }
        assert_eq!(trie.rule_of_nodes(&terminal), Some(0));
    }

    #[test]
    fn conflicting_terminal_keeps_smaller_rule() {
        let mut trie = PatternTrie::new();
        trie.add_pattern(&part("gat<n>"), 5);
        trie.add_pattern(&part("gat<n>"), 2);
        assert_eq!(trie.rule_number("gat<n>"), Some(2));
        trie.add_pattern(&part("gat<n>"), 9);
        assert_eq!(trie.rule_number("gat<n>"), Some(2));
    }
}
