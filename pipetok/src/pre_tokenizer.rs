//! Splitting normalized text into the pieces that the model encodes one at a time.
use crate::iterator::partition;
use crate::{byte_level, Pattern, Result};
use once_cell::sync::Lazy;
use std::ops::Range;
use strum::{EnumString, EnumVariantNames};

/// The GPT-2 word splitting pattern, used by the byte-level pre-tokenizer
pub const GPT2_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

static GPT2: Lazy<Pattern> =
    Lazy::new(|| Pattern::compile(GPT2_PATTERN).expect("BUG: GPT-2 pattern is not valid"));
static DIGIT: Lazy<Pattern> =
    Lazy::new(|| Pattern::compile(r"\p{N}").expect("BUG: digit pattern is not valid"));
static DIGITS: Lazy<Pattern> =
    Lazy::new(|| Pattern::compile(r"\p{N}+").expect("BUG: digits pattern is not valid"));
static WORDS: Lazy<Pattern> =
    Lazy::new(|| Pattern::compile(r"\w+|[^\w\s]+").expect("BUG: word pattern is not valid"));
static WHITESPACE: Lazy<Pattern> =
    Lazy::new(|| Pattern::compile(r"\s+").expect("BUG: whitespace pattern is not valid"));
static PUNCTUATION: Lazy<Pattern> = Lazy::new(|| {
    Pattern::compile(r"[\p{P}[:punct:]]").expect("BUG: punctuation pattern is not valid")
});

/// A not-yet-encoded substring of the input.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Piece {
    pub text: String,

    /// Byte range of the text this piece came from.
    ///
    /// Offsets are in terms of the text handed to the pre-tokenizer.  Once a piece is rewritten
    /// (byte-level remapping, an added prefix space) it no longer lines up byte for byte with its
    /// source, and every piece split from it carries the whole source range.
    pub offsets: Range<usize>,
}

impl Piece {
    pub fn new(text: impl Into<String>, offsets: Range<usize>) -> Self {
        Self {
            text: text.into(),
            offsets,
        }
    }

    fn is_rewritten(&self) -> bool {
        self.text.len() != self.offsets.len()
    }

    /// The sub-piece covering `range` of this piece's text
    fn slice(&self, range: Range<usize>) -> Piece {
        let offsets = if self.is_rewritten() {
            self.offsets.clone()
        } else {
            self.offsets.start + range.start..self.offsets.start + range.end
        };

        Piece::new(&self.text[range], offsets)
    }

    fn rewrite(&self, text: String) -> Piece {
        Piece::new(text, self.offsets.clone())
    }
}

/// What to do with the delimiters that a split pattern matches
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumString, EnumVariantNames, strum::Display)]
pub enum SplitBehavior {
    /// Drop the delimiters
    Removed,
    /// Each delimiter becomes its own piece
    Isolated,
    /// Attach each delimiter to the end of the preceding piece
    MergedWithPrevious,
    /// Attach each delimiter to the start of the following piece
    MergedWithNext,
    /// Consecutive delimiters are combined into one piece
    Contiguous,
}

/// When the metaspace pre-tokenizer adds a leading marker
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumString, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PrependScheme {
    Always,
    /// Only at the very start of the input, not after a special token
    First,
    Never,
}

#[derive(Clone, Debug)]
pub enum PreTokenizer {
    Split {
        pattern: Pattern,
        behavior: SplitBehavior,
        /// Treat the text between matches as the delimiters instead
        invert: bool,
    },

    /// Split GPT-2 style and remap every byte into the printable byte-level alphabet
    ByteLevel {
        add_prefix_space: bool,
        use_regex: bool,
    },

    Digits {
        individual_digits: bool,
    },

    /// Split into runs of word characters and runs of punctuation, dropping whitespace
    Whitespace,

    /// Split on whitespace, dropping it
    WhitespaceSplit,

    Punctuation {
        behavior: SplitBehavior,
    },

    /// Replace spaces with a marker character and split so each marker starts a piece
    Metaspace {
        replacement: char,
        prepend_scheme: PrependScheme,
        split: bool,
    },

    Sequence(Vec<PreTokenizer>),
}

impl PreTokenizer {
    /// Split `text` into pieces.  `offset` is where `text` starts within the caller's input.
    pub fn pre_tokenize(&self, text: &str, offset: usize) -> Result<Vec<Piece>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        self.apply(vec![Piece::new(text, offset..offset + text.len())])
    }

    fn apply(&self, pieces: Vec<Piece>) -> Result<Vec<Piece>> {
        use PreTokenizer::*;

        match self {
            Split {
                pattern,
                behavior,
                invert,
            } => each_piece(pieces, |piece| split(piece, pattern, *behavior, *invert)),
            ByteLevel {
                add_prefix_space,
                use_regex,
            } => each_piece(pieces, |piece| {
                let piece = if *add_prefix_space && !piece.text.starts_with(' ') {
                    piece.rewrite(format!(" {}", piece.text))
                } else {
                    piece.clone()
                };
                let words = if *use_regex {
                    split(&piece, &GPT2, SplitBehavior::Isolated, false)?
                } else {
                    vec![piece]
                };

                Ok(words
                    .into_iter()
                    .map(|word| word.rewrite(byte_level::encode(word.text.as_bytes())))
                    .collect())
            }),
            Digits { individual_digits } => {
                let pattern: &Pattern = if *individual_digits { &*DIGIT } else { &*DIGITS };
                each_piece(pieces, |piece| {
                    split(piece, pattern, SplitBehavior::Isolated, false)
                })
            }
            Whitespace => each_piece(pieces, |piece| {
                split(piece, &WORDS, SplitBehavior::Removed, true)
            }),
            WhitespaceSplit => each_piece(pieces, |piece| {
                split(piece, &WHITESPACE, SplitBehavior::Removed, false)
            }),
            Punctuation { behavior } => {
                each_piece(pieces, |piece| split(piece, &PUNCTUATION, *behavior, false))
            }
            Metaspace {
                replacement,
                prepend_scheme,
                split: split_on_marker,
            } => {
                let mut buf = [0; 4];
                let marker: &str = replacement.encode_utf8(&mut buf);
                each_piece(pieces, |piece| {
                    let mut text = piece.text.replace(' ', marker);
                    let prepend = match prepend_scheme {
                        PrependScheme::Always => true,
                        PrependScheme::First => piece.offsets.start == 0,
                        PrependScheme::Never => false,
                    };
                    if prepend && !text.starts_with(*replacement) {
                        text.insert(0, *replacement);
                    }

                    // Swapping a space for a multi-byte marker changes the length too
                    let piece = if text == piece.text {
                        piece.clone()
                    } else {
                        piece.rewrite(text)
                    };
                    if *split_on_marker {
                        Ok(split_before(&piece, marker))
                    } else {
                        Ok(vec![piece])
                    }
                })
            }
            Sequence(steps) => {
                let mut pieces = pieces;
                for step in steps {
                    pieces = step.apply(pieces)?;
                }
                Ok(pieces)
            }
        }
    }
}

fn each_piece(
    pieces: Vec<Piece>,
    mut f: impl FnMut(&Piece) -> Result<Vec<Piece>>,
) -> Result<Vec<Piece>> {
    let mut out = Vec::with_capacity(pieces.len());
    for piece in &pieces {
        out.extend(f(piece)?);
    }

    Ok(out)
}

/// Split one piece so that every occurrence of `marker` starts a new piece, which is the same as
/// splitting on it with [`SplitBehavior::MergedWithNext`]
fn split_before(piece: &Piece, marker: &str) -> Vec<Piece> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, _) in piece.text.match_indices(marker) {
        if i > start {
            out.push(piece.slice(start..i));
        }
        start = i;
    }
    if start < piece.text.len() {
        out.push(piece.slice(start..piece.text.len()));
    }

    out
}

/// Split one piece around the matches of `pattern`, handling the delimiters per `behavior`.
/// Empty pieces are never produced.
fn split(
    piece: &Piece,
    pattern: &Pattern,
    behavior: SplitBehavior,
    invert: bool,
) -> Result<Vec<Piece>> {
    let parts: Vec<(Range<usize>, bool)> = partition(pattern, &piece.text)?
        .into_iter()
        .map(|(range, is_match)| (range, is_match != invert))
        .collect();

    let ranges: Vec<Range<usize>> = match behavior {
        SplitBehavior::Removed => parts
            .into_iter()
            .filter(|(_, is_match)| !is_match)
            .map(|(range, _)| range)
            .collect(),
        SplitBehavior::Isolated => parts.into_iter().map(|(range, _)| range).collect(),
        SplitBehavior::MergedWithPrevious => {
            let mut out: Vec<Range<usize>> = Vec::with_capacity(parts.len());
            let mut previous_match = false;
            for (range, is_match) in parts {
                match out.last_mut() {
                    Some(last) if is_match && !previous_match => last.end = range.end,
                    _ => out.push(range),
                }
                previous_match = is_match;
            }
            out
        }
        SplitBehavior::MergedWithNext => {
            let mut out: Vec<Range<usize>> = Vec::with_capacity(parts.len());
            let mut previous_match = false;
            for (range, is_match) in parts.into_iter().rev() {
                match out.last_mut() {
                    Some(last) if is_match && !previous_match => last.start = range.start,
                    _ => out.push(range),
                }
                previous_match = is_match;
            }
            out.reverse();
            out
        }
        SplitBehavior::Contiguous => {
            let mut out: Vec<Range<usize>> = Vec::with_capacity(parts.len());
            let mut previous_match = false;
            for (range, is_match) in parts {
                match out.last_mut() {
                    Some(last) if is_match == previous_match => last.end = range.end,
                    _ => out.push(range),
                }
                previous_match = is_match;
            }
            out
        }
    };

    Ok(ranges
        .into_iter()
        .filter(|range| !range.is_empty())
        .map(|range| piece.slice(range))
        .collect())
}
