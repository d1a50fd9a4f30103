//! Format front-ends.  Each one parses a model-specific artifact and assembles a [`Pipeline`]
//! from it.
//!
//! [`Pipeline`]: crate::Pipeline
use crate::error::*;
use crate::Result;
use snafu::ResultExt;
use std::path::Path;
use strum::{EnumString, EnumVariantNames};

mod hf;
mod llama2c;
mod sentencepiece;
mod tiktoken;

pub use hf::HfTokenizer;
pub use llama2c::Llama2cTokenizer;
pub use sentencepiece::{proto as sentencepiece_proto, SentencePieceTokenizer};
pub use tiktoken::{Tiktoken, TiktokenConfig, LLAMA3_PATTERN};

/// The on-disk tokenizer formats that can be loaded
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumString, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TokenizerFormat {
    /// HuggingFace `tokenizer.json`
    #[strum(to_string = "hf", serialize = "huggingface")]
    Hf,
    Tiktoken,
    /// llama2.c `tokenizer.bin`
    Llama2c,
    /// SentencePiece `.model`
    #[strum(to_string = "sentencepiece", serialize = "sp")]
    SentencePiece,
}

impl TokenizerFormat {
    /// Guess the format of a tokenizer from its path.  A directory is assumed to hold a
    /// HuggingFace `tokenizer.json`.
    pub fn detect(path: &Path) -> Option<Self> {
        if path.is_dir() {
            return Some(Self::Hf);
        }

        match path.extension()?.to_str()? {
            "json" => Some(Self::Hf),
            "tiktoken" => Some(Self::Tiktoken),
            "bin" => Some(Self::Llama2c),
            "model" => Some(Self::SentencePiece),
            _ => None,
        }
    }
}

pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).context(FileIoSnafu { path })
}
