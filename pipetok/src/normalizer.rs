//! Text rewriting applied to ordinary (non-special) input before it is split into pieces.
use crate::{Pattern, Result};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// One normalization step, or an ordered sequence of them.
///
/// Steps run in the order they are declared.  Reference tokenizers depend on that order, e.g.
/// accents can only be stripped after canonical decomposition has split them off their base
/// characters, and lowercasing comes last.
#[derive(Clone, Debug)]
pub enum Normalizer {
    Nfc,
    Nfd,
    Nfkc,
    Nfkd,
    Lowercase,

    /// Remove combining marks.  Only useful after [`Normalizer::Nfd`] or [`Normalizer::Nfkd`].
    StripAccents,

    /// Replace every match of `pattern` with `content`
    Replace { pattern: Pattern, content: String },

    /// Prepend a string to non-empty input
    Prepend(String),

    /// Trim whitespace from either end
    Strip { left: bool, right: bool },

    /// Trim spaces from both ends and collapse interior runs of spaces into one, the way
    /// SentencePiece's `remove_extra_whitespaces` does.  Only U+0020 is affected.
    CollapseWhitespace,

    /// The normalizer used by BERT-style models
    Bert {
        /// Drop control characters and map all whitespace to a plain space
        clean_text: bool,
        /// Surround CJK ideographs with spaces so each becomes its own piece
        handle_chinese_chars: bool,
        /// Decompose and strip accents.  `None` means "do whatever `lowercase` says".
        strip_accents: Option<bool>,
        lowercase: bool,
    },

    Sequence(Vec<Normalizer>),
}

impl Normalizer {
    /// Apply this normalizer to `text`.
    ///
    /// Only a `Replace` step whose pattern runs on the backtracking regex engine can fail, if
    /// matching exceeds the engine's backtracking limit.
    pub fn normalize(&self, text: &str) -> Result<String> {
        use Normalizer::*;

        Ok(match self {
            Nfc => text.nfc().collect(),
            Nfd => text.nfd().collect(),
            Nfkc => text.nfkc().collect(),
            Nfkd => text.nfkd().collect(),
            Lowercase => text.to_lowercase(),
            StripAccents => strip_accents(text),
            Replace { pattern, content } => replace_all(pattern, text, content)?,
            Prepend(prefix) => {
                if text.is_empty() {
                    String::new()
                } else {
                    format!("{prefix}{text}")
                }
            }
            Strip { left, right } => {
                let mut text = text;
                if *left {
                    text = text.trim_start();
                }
                if *right {
                    text = text.trim_end();
                }
                text.to_string()
            }
            CollapseWhitespace => text
                .split(' ')
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            Bert {
                clean_text,
                handle_chinese_chars,
                strip_accents: strip,
                lowercase,
            } => {
                let mut out = String::with_capacity(text.len());
                for c in text.chars() {
                    if *clean_text {
                        if c == '\0' || c == char::REPLACEMENT_CHARACTER || is_control(c) {
                            continue;
                        }
                        if c.is_whitespace() {
                            out.push(' ');
                            continue;
                        }
                    }
                    if *handle_chinese_chars && is_cjk(c) {
                        out.push(' ');
                        out.push(c);
                        out.push(' ');
                    } else {
                        out.push(c);
                    }
                }
                if strip.unwrap_or(*lowercase) {
                    out = strip_accents(&out.nfd().collect::<String>());
                }
                if *lowercase {
                    out = out.to_lowercase();
                }
                out
            }
            Sequence(steps) => {
                let mut out = text.to_string();
                for step in steps {
                    out = step.normalize(&out)?;
                }
                out
            }
        })
    }
}

fn strip_accents(text: &str) -> String {
    text.chars().filter(|&c| !is_combining_mark(c)).collect()
}

fn replace_all(pattern: &Pattern, text: &str, content: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in pattern.find_iter(text) {
        let m = m?;
        out.push_str(&text[last..m.start]);
        out.push_str(content);
        last = m.end;
    }
    out.push_str(&text[last..]);

    Ok(out)
}

/// Control characters other than the whitespace controls, which BERT treats as whitespace
fn is_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF
        | 0x3400..=0x4DBF
        | 0x20000..=0x2A6DF
        | 0x2A700..=0x2B73F
        | 0x2B740..=0x2B81F
        | 0x2B820..=0x2CEAF
        | 0xF900..=0xFAFF
        | 0x2F800..=0x2FA1F)
}
