//! Tokenization pipelines for HuggingFace, tiktoken, llama2.c and SentencePiece tokenizers.
//!
//! Every format is loaded into the same [`Pipeline`]: special token matching, then a normalizer,
//! a pre-tokenizer, a BPE or unigram model, and on the way back out a decoder.  [`Tokenizer`]
//! picks the front-end for a file and exposes the pipeline behind one interface.
use std::path::Path;

mod bpe;
pub mod byte_level;
mod decoder;
mod error;
mod formats;
mod iterator;
mod normalizer;
mod pattern;
mod pipeline;
mod pre_tokenizer;
mod special;
mod token;
mod unigram;
mod vocab;

pub use bpe::*;
pub use decoder::*;
pub use error::*;
pub use formats::*;
pub use iterator::*;
pub use normalizer::*;
pub use pattern::*;
pub use pipeline::*;
pub use pre_tokenizer::*;
pub use special::*;
pub use token::*;
pub use unigram::*;
pub use vocab::*;

pub type Result<T> = std::result::Result<T, PipetokError>;

/// A loaded tokenizer of any supported format.
///
/// The set of formats is fixed, and every variant is backed by a [`Pipeline`], so the methods
/// here just forward to it.  Use [`Tokenizer::pipeline`] for the less common operations.
#[derive(Debug)]
pub enum Tokenizer {
    Hf(HfTokenizer),
    Tiktoken(Tiktoken),
    Llama2c(Llama2cTokenizer),
    SentencePiece(SentencePieceTokenizer),
}

impl Tokenizer {
    /// Load a tokenizer of a known format.  tiktoken files get the default (Llama 3)
    /// configuration; use [`Tiktoken::load_with_config`] for anything else.
    pub fn load(format: TokenizerFormat, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Ok(match format {
            TokenizerFormat::Hf => Self::Hf(HfTokenizer::load(path)?),
            TokenizerFormat::Tiktoken => Self::Tiktoken(Tiktoken::load(path)?),
            TokenizerFormat::Llama2c => Self::Llama2c(Llama2cTokenizer::load(path)?),
            TokenizerFormat::SentencePiece => {
                Self::SentencePiece(SentencePieceTokenizer::load(path)?)
            }
        })
    }

    /// Load a tokenizer, guessing the format from the path
    pub fn load_auto(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match TokenizerFormat::detect(path) {
            Some(format) => Self::load(format, path),
            None => UnsupportedConfigSnafu {
                component: "tokenizer file",
                kind: path.display().to_string(),
            }
            .fail(),
        }
    }

    pub fn format(&self) -> TokenizerFormat {
        match self {
            Self::Hf(_) => TokenizerFormat::Hf,
            Self::Tiktoken(_) => TokenizerFormat::Tiktoken,
            Self::Llama2c(_) => TokenizerFormat::Llama2c,
            Self::SentencePiece(_) => TokenizerFormat::SentencePiece,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        match self {
            Self::Hf(tokenizer) => tokenizer.pipeline(),
            Self::Tiktoken(tokenizer) => tokenizer.pipeline(),
            Self::Llama2c(tokenizer) => tokenizer.pipeline(),
            Self::SentencePiece(tokenizer) => tokenizer.pipeline(),
        }
    }

    /// See [`Pipeline::encode`]
    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<TokenInt>> {
        self.pipeline().encode(text, add_special_tokens)
    }

    /// See [`Pipeline::encode_with_markers`]
    pub fn encode_with_markers(&self, text: &str, bos: usize, eos: usize) -> Result<Vec<TokenInt>> {
        self.pipeline().encode_with_markers(text, bos, eos)
    }

    /// See [`Pipeline::decode`]
    pub fn decode(&self, ids: &[TokenInt], skip_special_tokens: bool) -> Result<String> {
        self.pipeline().decode(ids, skip_special_tokens)
    }

    /// See [`Pipeline::decode_bytes`]
    pub fn decode_bytes(&self, ids: &[TokenInt], skip_special_tokens: bool) -> Result<Vec<u8>> {
        self.pipeline().decode_bytes(ids, skip_special_tokens)
    }

    /// Number of tokens, special tokens included
    pub fn vocab_size(&self) -> usize {
        self.pipeline().vocab().len()
    }

    pub fn bos_token(&self) -> Option<TokenInt> {
        self.pipeline().bos()
    }

    pub fn eos_token(&self) -> Option<TokenInt> {
        self.pipeline().eos()
    }

    /// Look up the id of a token, given exactly as it is stored in the vocabulary (so `Ġ` rather
    /// than a space for byte-level BPE)
    pub fn token_to_id(&self, token: &str) -> Option<TokenInt> {
        let pipeline = self.pipeline();
        pipeline
            .special_tokens()
            .id(token)
            .or_else(|| pipeline.vocab().id(token))
    }

    /// The raw vocabulary entry for `id`
    pub fn id_to_token(&self, id: TokenInt) -> Option<&[u8]> {
        self.pipeline().vocab().token(id)
    }

    pub fn is_special(&self, id: TokenInt) -> bool {
        self.pipeline().special_tokens().contains_id(id)
    }
}
