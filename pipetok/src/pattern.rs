//! A uniform "compile a pattern, find the next match at a cursor" capability over two regex
//! engines.
//!
//! The linear-time `regex` crate is used whenever it accepts the pattern.  The split patterns of
//! GPT-style tokenizers use negative lookahead (`\s+(?!\S)`), which `regex` can't express, so
//! those fall back to the backtracking `fancy-regex` engine.  Both engines use leftmost-first
//! (Perl) alternation semantics, which is what the reference tokenizer patterns are written for.
use crate::error::*;
use crate::Result;
use snafu::ResultExt;
use std::ops::Range;
use strum::{EnumString, EnumVariantNames};
use tracing::*;

/// Which regex engine a [`Pattern`] runs on
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumString, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    /// The `regex` crate: guaranteed linear time, no lookaround
    Linear,
    /// The `fancy-regex` crate: supports lookaround and backreferences
    Backtracking,
}

/// A compiled regex, on whichever engine could compile it
#[derive(Clone, Debug)]
pub enum Pattern {
    Linear(regex::Regex),
    Backtracking(fancy_regex::Regex),
}

impl Pattern {
    /// Compile `pattern`, preferring the linear-time engine and falling back to the backtracking
    /// one when the pattern needs features only it supports.
    pub fn compile(pattern: &str) -> Result<Self> {
        match regex::Regex::new(pattern) {
            Ok(re) => Ok(Self::Linear(re)),
            Err(e) => {
                debug!(pattern, error = %e, "Pattern needs the backtracking regex engine");
                Self::compile_with(pattern, Backend::Backtracking)
            }
        }
    }

    /// Compile `pattern` on a specific engine
    pub fn compile_with(pattern: &str, backend: Backend) -> Result<Self> {
        match backend {
            Backend::Linear => regex::Regex::new(pattern)
                .map(Self::Linear)
                .context(InvalidLinearPatternSnafu { pattern }),
            Backend::Backtracking => fancy_regex::Regex::new(pattern)
                .map(Self::Backtracking)
                .context(InvalidPatternSnafu { pattern }),
        }
    }

    /// A pattern that matches `text` literally
    pub fn literal(text: &str) -> Result<Self> {
        Self::compile_with(&regex::escape(text), Backend::Linear)
    }

    pub fn backend(&self) -> Backend {
        match self {
            Self::Linear(_) => Backend::Linear,
            Self::Backtracking(_) => Backend::Backtracking,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Linear(re) => re.as_str(),
            Self::Backtracking(re) => re.as_str(),
        }
    }

    /// Find the leftmost match that starts at or after byte offset `start`.
    ///
    /// Text before `start` is still visible to anchors and lookbehind, so iterating with this is
    /// not the same as matching against `&text[start..]`.
    pub fn find_at(&self, text: &str, start: usize) -> Result<Option<Range<usize>>> {
        match self {
            Self::Linear(re) => Ok(re.find_at(text, start).map(|m| m.start()..m.end())),
            Self::Backtracking(re) => re
                .find_from_pos(text, start)
                .map(|m| m.map(|m| m.start()..m.end()))
                .context(PatternMatchSnafu {
                    pattern: re.as_str(),
                }),
        }
    }

    /// Iterate over all non-empty, non-overlapping matches in `text`
    pub fn find_iter<'p, 't>(&'p self, text: &'t str) -> crate::iterator::MatchIterator<'p, 't> {
        crate::iterator::MatchIterator::new(self, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const GPT2: &str = r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

    #[test]
    fn prefers_linear_engine() {
        let pattern = Pattern::compile(r"\p{L}+").unwrap();
        assert_eq!(Backend::Linear, pattern.backend());

        let pattern = Pattern::compile(GPT2).unwrap();
        assert_eq!(Backend::Backtracking, pattern.backend());
        assert_eq!(GPT2, pattern.as_str());
    }

    #[test]
    fn forced_linear_engine_rejects_lookahead() {
        assert_matches!(
            Pattern::compile_with(GPT2, Backend::Linear),
            Err(PipetokError::InvalidLinearPattern { .. })
        );
    }

    #[test]
    fn invalid_pattern() {
        let err = Pattern::compile("(unclosed").unwrap_err();

        assert_matches!(err, PipetokError::InvalidPattern { .. });
        assert_eq!(ErrorCategory::InvalidPattern, err.category());
    }

    #[test]
    fn find_at_cursor() {
        let pattern = Pattern::compile(r"\d+").unwrap();

        assert_eq!(Some(1..3), pattern.find_at("a12b345", 0).unwrap());
        assert_eq!(Some(2..3), pattern.find_at("a12b345", 2).unwrap());
        assert_eq!(Some(4..7), pattern.find_at("a12b345", 3).unwrap());
        assert_eq!(None, pattern.find_at("a12b345", 7).unwrap());
    }

    #[test]
    fn lookahead_keeps_last_space_for_next_word() {
        let pattern = Pattern::compile(GPT2).unwrap();

        assert_eq!(Some(5..7), pattern.find_at("hello   world", 5).unwrap());
        assert_eq!(Some(7..13), pattern.find_at("hello   world", 7).unwrap());
    }

    #[test]
    fn literal_escapes_metacharacters() {
        let pattern = Pattern::literal("a.b").unwrap();

        assert_eq!(None, pattern.find_at("axb", 0).unwrap());
        assert_eq!(Some(1..4), pattern.find_at("xa.b", 0).unwrap());
    }
}
