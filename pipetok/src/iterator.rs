//! Iterators that walk input text: regex matches for the pre-tokenizer, and special-token
//! segments for the pipeline.

use crate::{Pattern, Result, SpecialTokens, TokenInt};
use std::ops::Range;

/// Yields the byte ranges of all non-empty, non-overlapping matches of a pattern.
///
/// Empty matches are skipped by stepping the cursor forward one character, so patterns like
/// `\s*` can't stall the iterator.
///
/// See [`Pattern::find_iter`]
pub struct MatchIterator<'p, 't> {
    pattern: &'p Pattern,
    text: &'t str,

    /// The offset into `text` where the next search starts
    pos: usize,
    done: bool,
}

impl<'p, 't> MatchIterator<'p, 't> {
    pub(crate) fn new(pattern: &'p Pattern, text: &'t str) -> Self {
        Self {
            pattern,
            text,
            pos: 0,
            done: false,
        }
    }
}

impl<'p, 't> Iterator for MatchIterator<'p, 't> {
    type Item = Result<Range<usize>>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.pattern.find_at(self.text, self.pos) {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(None) => self.done = true,
                Ok(Some(m)) if m.is_empty() => match self.text[m.end..].chars().next() {
                    Some(c) => self.pos = m.end + c.len_utf8(),
                    None => self.done = true,
                },
                Ok(Some(m)) => {
                    self.pos = m.end;
                    return Some(Ok(m));
                }
            }
        }

        None
    }
}

/// Split `text` into consecutive ranges that together cover every byte, each flagged with
/// whether it was a match of `pattern`.
pub(crate) fn partition(pattern: &Pattern, text: &str) -> Result<Vec<(Range<usize>, bool)>> {
    let mut parts = Vec::new();
    let mut last = 0;
    for m in pattern.find_iter(text) {
        let m = m?;
        if m.start > last {
            parts.push((last..m.start, false));
        }
        last = m.end;
        parts.push((m, true));
    }
    if last < text.len() {
        parts.push((last..text.len(), false));
    }

    Ok(parts)
}

/// A run of input text as seen by the pipeline: either ordinary text that goes through
/// normalization and the model, or a special token that maps straight to its id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Segment<'t> {
    Text { text: &'t str, offset: usize },
    Special { id: TokenInt, range: Range<usize> },
}

/// Splits input text around the special tokens it contains.
///
/// See [`SpecialTokens::segments`]
pub struct Segments<'a, 't> {
    special: &'a SpecialTokens,
    text: &'t str,
    matches: Option<aho_corasick::FindIter<'a, 't, usize>>,

    /// A special token found while scanning, to be yielded after the text that precedes it
    pending: Option<aho_corasick::Match>,

    /// The offset into `text` of the first byte not yet yielded
    pos: usize,
}

impl<'a, 't> Segments<'a, 't> {
    pub(crate) fn new(
        special: &'a SpecialTokens,
        matches: Option<aho_corasick::FindIter<'a, 't, usize>>,
        text: &'t str,
    ) -> Self {
        Self {
            special,
            text,
            matches,
            pending: None,
            pos: 0,
        }
    }

    fn special(&mut self, m: aho_corasick::Match) -> Segment<'t> {
        self.pos = m.end();
        Segment::Special {
            id: self.special.id_at(m.pattern()),
            range: m.start()..m.end(),
        }
    }
}

impl<'a, 't> Iterator for Segments<'a, 't> {
    type Item = Segment<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(m) = self.pending.take() {
            return Some(self.special(m));
        }
        if self.pos >= self.text.len() {
            return None;
        }

        match self.matches.as_mut().and_then(Iterator::next) {
            Some(m) if m.start() == self.pos => Some(self.special(m)),
            Some(m) => {
                let segment = Segment::Text {
                    text: &self.text[self.pos..m.start()],
                    offset: self.pos,
                };
                self.pos = m.start();
                self.pending = Some(m);
                Some(segment)
            }
            None => {
                let segment = Segment::Text {
                    text: &self.text[self.pos..],
                    offset: self.pos,
                };
                self.pos = self.text.len();
                Some(segment)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, text: &str) -> Vec<String> {
        let pattern = Pattern::compile(pattern).unwrap();
        pattern
            .find_iter(text)
            .map(|m| text[m.unwrap()].to_string())
            .collect()
    }

    #[test]
    fn match_iterator_works() {
        assert!(matches(r"\w+", "").is_empty());
        assert_eq!(vec!["foo", "bar", "baz"], matches(r"\w+", "foo bar, baz"));
        assert_eq!(
            vec!["foo", " bar", " baz"],
            matches(r" ?\p{L}+|\s+(?!\S)|\s+", "foo bar baz")
        );
    }

    #[test]
    fn empty_matches_are_skipped() {
        assert_eq!(vec!["  ", " ", " "], matches(r"\s*", "  a é "));
    }

    #[test]
    fn partition_covers_all_bytes() {
        let pattern = Pattern::compile("-").unwrap();
        let text = "the-final--countdown";
        let parts: Vec<_> = partition(&pattern, text)
            .unwrap()
            .into_iter()
            .map(|(range, is_match)| (&text[range], is_match))
            .collect();

        assert_eq!(
            vec![
                ("the", false),
                ("-", true),
                ("final", false),
                ("-", true),
                ("-", true),
                ("countdown", false)
            ],
            parts
        );
    }

    #[test]
    fn segments_split_around_special_tokens() {
        let special = SpecialTokens::new([("<eos>".to_string(), 99), ("<e>".to_string(), 7)]);

        let segments: Vec<_> = special.segments("hi<eos><e>there<eos>").collect();
        assert_eq!(
            vec![
                Segment::Text {
                    text: "hi",
                    offset: 0
                },
                Segment::Special {
                    id: 99,
                    range: 2..7
                },
                Segment::Special {
                    id: 7,
                    range: 7..10
                },
                Segment::Text {
                    text: "there",
                    offset: 10
                },
                Segment::Special {
                    id: 99,
                    range: 15..20
                },
            ],
            segments
        );

        assert!(special.segments("").next().is_none());
        assert_eq!(
            vec![Segment::Text {
                text: "plain",
                offset: 0
            }],
            SpecialTokens::default().segments("plain").collect::<Vec<_>>()
        );
    }
}
