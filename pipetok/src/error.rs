use crate::TokenInt;
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PipetokError {
    #[snafu(display("File I/O error on file '{}'", path.display()))]
    FileIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Malformed JSON in tokenizer configuration"))]
    Json { source: serde_json::Error },

    #[snafu(display("Malformed SentencePiece model protobuf"))]
    Protobuf { source: prost::DecodeError },

    #[snafu(display("Invalid base64 token on line {line}"))]
    Base64 {
        line: usize,
        source: base64::DecodeError,
    },

    #[snafu(display("Corrupt tokenizer artifact: {reason}"))]
    CorruptArtifact { reason: String },

    #[snafu(display("The {component} type '{kind}' isn't supported"))]
    UnsupportedConfig {
        component: &'static str,
        kind: String,
    },

    #[snafu(display("Invalid regex pattern '{pattern}'"))]
    InvalidPattern {
        pattern: String,
        source: fancy_regex::Error,
    },

    #[snafu(display("Pattern '{pattern}' can't be compiled by the linear-time regex engine"))]
    InvalidLinearPattern {
        pattern: String,
        source: regex::Error,
    },

    #[snafu(display("Regex pattern '{pattern}' failed while matching"))]
    PatternMatch {
        pattern: String,
        source: fancy_regex::Error,
    },

    #[snafu(display("No vocabulary entry for {symbol:?} and no fallback token is configured"))]
    UnknownToken { symbol: String },

    #[snafu(display("The tokenizer has no {name} token"))]
    MissingSpecialToken { name: &'static str },

    #[snafu(display("Token id {id} is outside of the vocabulary of {vocab_size} tokens"))]
    InvalidId { id: TokenInt, vocab_size: usize },
}

/// The broad class of an error, for callers that only care whether a failure came from a bad
/// artifact or from a bad call.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub enum ErrorCategory {
    /// The artifact is missing, unreadable or malformed
    Load,
    /// The artifact declares a component kind that isn't implemented
    UnsupportedConfig,
    /// A regex failed to compile, or blew up while matching
    InvalidPattern,
    /// Encoding hit a symbol with no vocabulary entry and no fallback
    UnknownToken,
    /// Decoding was given an id outside of the vocabulary
    InvalidId,
}

impl PipetokError {
    pub fn category(&self) -> ErrorCategory {
        use PipetokError::*;

        match self {
            FileIo { .. } | Json { .. } | Protobuf { .. } | Base64 { .. } | CorruptArtifact { .. } => {
                ErrorCategory::Load
            }
            UnsupportedConfig { .. } => ErrorCategory::UnsupportedConfig,
            InvalidPattern { .. } | InvalidLinearPattern { .. } | PatternMatch { .. } => {
                ErrorCategory::InvalidPattern
            }
            UnknownToken { .. } | MissingSpecialToken { .. } => ErrorCategory::UnknownToken,
            InvalidId { .. } => ErrorCategory::InvalidId,
        }
    }

    /// True if this error happened while loading an artifact, as opposed to during a call to
    /// encode or decode.
    pub fn is_load_error(&self) -> bool {
        use PipetokError::*;

        !matches!(
            self,
            PatternMatch { .. } | UnknownToken { .. } | MissingSpecialToken { .. } | InvalidId { .. }
        )
    }
}

/// Shorthand for failing with [`PipetokError::CorruptArtifact`]
pub(crate) fn corrupt<T>(reason: impl Into<String>) -> crate::Result<T> {
    CorruptArtifactSnafu {
        reason: reason.into(),
    }
    .fail()
}
