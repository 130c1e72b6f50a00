// SPDX-License-Identifier: AGPL-3.0-or-later
// VexDB - Vector Database Segment Engine
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! SQL-LIKE pattern translation.
//!
//! `Match` literals use `%` (any run), `_` (any one char), and backslash
//! escape. Purely anchored patterns compile to specialized string ops
//! instead of a regex; everything else becomes an anchored regex with `%`
//! as `.*` and `_` as `.` in single-line-insensitive mode, so the match is
//! deterministic across platforms. Captures are never used.

use regex::Regex;

use vexdb_core::types::OpType;
use vexdb_core::{Error, Result};

/// Compiled form of one LIKE pattern.
enum Matcher {
    /// Pattern without wildcards: exact equality.
    Exact(String),
    /// Pattern of only `%` runs: every value matches.
    MatchAll,
    /// `lit%`
    Prefix(String),
    /// `%lit`
    Suffix(String),
    /// `%lit%`
    Contains(String),
    /// Anything else.
    Regex(Regex),
}

pub struct PatternMatcher {
    inner: Matcher,
}

impl PatternMatcher {
    /// Translate a LIKE pattern. The empty pattern is rejected; `"%"`
    /// matches every (non-null) value.
    pub fn translate(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::InvalidParameter(
                "empty pattern in match expression".into(),
            ));
        }
        let tokens = tokenize(pattern)?;
        Ok(Self {
            inner: classify(tokens),
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        match &self.inner {
            Matcher::Exact(lit) => value == lit,
            Matcher::MatchAll => true,
            Matcher::Prefix(lit) => value.starts_with(lit.as_str()),
            Matcher::Suffix(lit) => value.ends_with(lit.as_str()),
            Matcher::Contains(lit) => value.contains(lit.as_str()),
            Matcher::Regex(re) => re.is_match(value),
        }
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    /// A literal run.
    Literal(String),
    /// `%`
    AnyRun,
    /// `_`
    AnyOne,
}

fn tokenize(pattern: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(esc) => literal.push(esc),
                None => {
                    return Err(Error::InvalidParameter(
                        "trailing escape in match pattern".into(),
                    ))
                }
            },
            '%' => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                // collapse consecutive % runs
                if tokens.last() != Some(&Token::AnyRun) {
                    tokens.push(Token::AnyRun);
                }
            }
            '_' => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::AnyOne);
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

fn classify(tokens: Vec<Token>) -> Matcher {
    match tokens.as_slice() {
        [] => Matcher::Exact(String::new()),
        [Token::AnyRun] => Matcher::MatchAll,
        [Token::Literal(lit)] => Matcher::Exact(lit.clone()),
        [Token::Literal(lit), Token::AnyRun] => Matcher::Prefix(lit.clone()),
        [Token::AnyRun, Token::Literal(lit)] => Matcher::Suffix(lit.clone()),
        [Token::AnyRun, Token::Literal(lit), Token::AnyRun] => Matcher::Contains(lit.clone()),
        tokens => {
            let mut body = String::from("^(?s:");
            for t in tokens {
                match t {
                    Token::Literal(lit) => body.push_str(&regex::escape(lit)),
                    Token::AnyRun => body.push_str(".*"),
                    Token::AnyOne => body.push('.'),
                }
            }
            body.push_str(")$");
            // The body only contains escaped literals and the fixed
            // wildcard forms, so compilation cannot fail.
            match Regex::new(&body) {
                Ok(re) => Matcher::Regex(re),
                Err(_) => Matcher::Exact(String::new()),
            }
        }
    }
}

/// The anchored substring family used by scan kernels and inline index
/// comparisons. Non-match operators compare false.
#[inline]
pub fn match_str(value: &str, literal: &str, op: OpType) -> bool {
    match op {
        OpType::PrefixMatch => value.starts_with(literal),
        OpType::PostfixMatch => value.ends_with(literal),
        OpType::InnerMatch => value.contains(literal),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(p: &str) -> PatternMatcher {
        PatternMatcher::translate(p).unwrap()
    }

    #[test]
    fn test_exact_pattern_round_trip() {
        // P9: a wildcard-free pattern matches exactly equality
        let m = matcher("apple");
        assert!(m.matches("apple"));
        assert!(!m.matches("apples"));
        assert!(!m.matches("appl"));
    }

    #[test]
    fn test_anchored_fast_paths() {
        assert!(matcher("ap%").matches("apple"));
        assert!(!matcher("ap%").matches("nap"));
        assert!(matcher("%le").matches("apple"));
        assert!(matcher("%pp%").matches("apple"));
        assert!(!matcher("%pp%").matches("grape"));
    }

    #[test]
    fn test_percent_matches_everything() {
        let m = matcher("%");
        assert!(m.matches(""));
        assert!(m.matches("anything"));
        let m = matcher("%%%");
        assert!(m.matches("x"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let err = PatternMatcher::translate("").err().unwrap();
        assert_eq!(err.kind(), vexdb_core::ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_underscore_wildcard() {
        let m = matcher("a_c");
        assert!(m.matches("abc"));
        assert!(m.matches("axc"));
        assert!(!m.matches("ac"));
        assert!(!m.matches("abbc"));
    }

    #[test]
    fn test_mixed_pattern_uses_regex() {
        let m = matcher("a%b_c");
        assert!(m.matches("aXXXbYc"));
        assert!(m.matches("ab_c"));
        assert!(!m.matches("abc"));
    }

    #[test]
    fn test_escaped_wildcards_are_literal() {
        let m = matcher(r"100\%");
        assert!(m.matches("100%"));
        assert!(!m.matches("1000"));
        let m = matcher(r"a\_b");
        assert!(m.matches("a_b"));
        assert!(!m.matches("axb"));
    }

    #[test]
    fn test_regex_metachars_in_literal() {
        let m = matcher("a.c%");
        assert!(m.matches("a.cd"));
        assert!(!m.matches("abcd"));
    }

    #[test]
    fn test_trailing_escape_rejected() {
        assert!(PatternMatcher::translate("abc\\").is_err());
    }

    #[test]
    fn test_pattern_spanning_newlines() {
        let m = matcher("a%b");
        assert!(m.matches("a\nb"));
        let m = matcher("a_b");
        assert!(m.matches("a\nb"));
    }

    #[test]
    fn test_match_str_family() {
        assert!(match_str("apple", "ap", OpType::PrefixMatch));
        assert!(match_str("apple", "le", OpType::PostfixMatch));
        assert!(match_str("apple", "ppl", OpType::InnerMatch));
        assert!(!match_str("apple", "ap", OpType::PostfixMatch));
        assert!(!match_str("apple", "ap", OpType::Equal));
    }
}
