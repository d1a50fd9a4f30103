//! Turning the token strings of decoded ids back into human readable text.
//!
//! Each step transforms the list of decoded pieces.  Special tokens ride along in that list so
//! they keep their position, but no step touches them: a special token always decodes to its own
//! text.
use crate::pre_tokenizer::PrependScheme;
use crate::{byte_level, Pattern, Result};

/// The bytes of one decoded token, or of several once steps like [`Decoder::Fuse`] combine them
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedPiece {
    pub bytes: Vec<u8>,
    pub special: bool,
}

impl DecodedPiece {
    pub fn new(bytes: impl Into<Vec<u8>>, special: bool) -> Self {
        Self {
            bytes: bytes.into(),
            special,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Decoder {
    /// Map byte-level alphabet characters back to the bytes they stand for
    ByteLevel,

    /// Turn the marker character back into spaces, dropping the marker added at the start
    Metaspace {
        replacement: char,
        prepend_scheme: PrependScheme,
    },

    Replace {
        pattern: Pattern,
        content: String,
    },

    /// Turn runs of `<0xNN>` tokens into the raw bytes they spell
    ByteFallback,

    /// Join consecutive pieces into one
    Fuse,

    /// Remove up to `start` leading and `stop` trailing `content` characters from each piece
    Strip {
        content: char,
        start: usize,
        stop: usize,
    },

    /// Replace the end-of-word suffix with a space, or with nothing on the last piece
    BpeSuffix {
        suffix: String,
    },

    Sequence(Vec<Decoder>),
}

impl Decoder {
    pub fn decode_chain(&self, pieces: Vec<DecodedPiece>) -> Result<Vec<DecodedPiece>> {
        use Decoder::*;

        Ok(match self {
            ByteLevel => map_ordinary(pieces, |_, bytes| {
                Ok(byte_level::decode(&String::from_utf8_lossy(&bytes)))
            })?,
            Metaspace {
                replacement,
                prepend_scheme,
            } => {
                let marker = replacement.to_string();
                map_ordinary(pieces, |i, bytes| {
                    let mut bytes = replace_bytes(&bytes, marker.as_bytes(), b" ");
                    let at_start = i == 0 && *prepend_scheme != PrependScheme::Never;
                    if at_start && bytes.first() == Some(&b' ') {
                        bytes.remove(0);
                    }
                    Ok(bytes)
                })?
            }
            Replace { pattern, content } => map_ordinary(pieces, |_, bytes| {
                let Ok(text) = std::str::from_utf8(&bytes) else {
                    return Ok(bytes);
                };
                let mut out = String::with_capacity(text.len());
                let mut last = 0;
                for m in pattern.find_iter(text) {
                    let m = m?;
                    out.push_str(&text[last..m.start]);
                    out.push_str(content);
                    last = m.end;
                }
                out.push_str(&text[last..]);
                Ok(out.into_bytes())
            })?,
            ByteFallback => {
                let mut out: Vec<DecodedPiece> = Vec::with_capacity(pieces.len());
                let mut in_bytes = false;
                for piece in pieces {
                    let byte = (!piece.special)
                        .then(|| crate::vocab::ByteFallback::byte_of(&piece.bytes))
                        .flatten();
                    match (byte, out.last_mut()) {
                        (Some(byte), Some(last)) if in_bytes => last.bytes.push(byte),
                        (Some(byte), _) => out.push(DecodedPiece::new(vec![byte], false)),
                        (None, _) => out.push(piece),
                    }
                    in_bytes = byte.is_some();
                }
                out
            }
            Fuse => {
                let mut out: Vec<DecodedPiece> = Vec::with_capacity(pieces.len());
                for piece in pieces {
                    match out.last_mut() {
                        Some(last) if !last.special && !piece.special => {
                            last.bytes.extend_from_slice(&piece.bytes)
                        }
                        _ => out.push(piece),
                    }
                }
                out
            }
            Strip {
                content,
                start,
                stop,
            } => map_ordinary(pieces, |_, bytes| {
                let text = match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => return Ok(e.into_bytes()),
                };
                let mut stripped = text.as_str();
                for _ in 0..*start {
                    match stripped.strip_prefix(*content) {
                        Some(rest) => stripped = rest,
                        None => break,
                    }
                }
                for _ in 0..*stop {
                    match stripped.strip_suffix(*content) {
                        Some(rest) => stripped = rest,
                        None => break,
                    }
                }
                Ok(stripped.as_bytes().to_vec())
            })?,
            BpeSuffix { suffix } => {
                let last = pieces.iter().rposition(|piece| !piece.special);
                pieces
                    .into_iter()
                    .enumerate()
                    .map(|(position, mut piece)| {
                        if !piece.special {
                            let with: &[u8] = if Some(position) == last { b"" } else { b" " };
                            piece.bytes = replace_bytes(&piece.bytes, suffix.as_bytes(), with);
                        }
                        piece
                    })
                    .collect()
            }
            Sequence(steps) => {
                let mut pieces = pieces;
                for step in steps {
                    pieces = step.decode_chain(pieces)?;
                }
                pieces
            }
        })
    }
}

/// Apply `f` to every non-special piece, passing its index among the non-special pieces
fn map_ordinary(
    pieces: Vec<DecodedPiece>,
    mut f: impl FnMut(usize, Vec<u8>) -> Result<Vec<u8>>,
) -> Result<Vec<DecodedPiece>> {
    let mut index = 0;
    let mut out = Vec::with_capacity(pieces.len());
    for piece in pieces {
        if piece.special {
            out.push(piece);
        } else {
            out.push(DecodedPiece::new(f(index, piece.bytes)?, false));
            index += 1;
        }
    }

    Ok(out)
}

/// Byte string replacement.  Replacing a UTF-8 encoded character can't split another character,
/// since UTF-8 is self-synchronizing.
fn replace_bytes(haystack: &[u8], needle: &[u8], with: &[u8]) -> Vec<u8> {
    if needle.is_empty() {
        return haystack.to_vec();
    }

    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            out.extend_from_slice(with);
            i += needle.len();
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }

    out
}
