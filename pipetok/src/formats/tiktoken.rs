//! tiktoken vocabularies: one `<base64 token> <rank>` line per token, with the split pattern and
//! special tokens supplied out of band.
use super::read_file;
use crate::bpe::{Merges, SymbolBase};
use crate::error::*;
use crate::pipeline::{Model, Template};
use crate::{
    BpeModel, Pattern, Pipeline, PreTokenizer, Result, SpecialTokens, SplitBehavior, TokenInt,
    TokenString, Vocab,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::path::Path;
use tracing::*;

/// The Llama 3 split pattern
pub const LLAMA3_PATTERN: &str = r"(?i:'s|'t|'re|'ve|'m|'ll|'d)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+";

/// Number of special tokens Llama 3 reserves after the ordinary vocabulary
const LLAMA3_NUM_SPECIAL_TOKENS: usize = 256;

/// What a tiktoken vocabulary file doesn't say for itself.
///
/// Special tokens take the ids right after the ordinary vocabulary, in the order listed here.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct TiktokenConfig {
    pub pattern: String,
    pub special_tokens: Vec<String>,
    /// Index into `special_tokens` of the beginning-of-sequence token
    pub bos_index: usize,
    /// Index into `special_tokens` of the end-of-sequence token
    pub eos_index: usize,
}

impl Default for TiktokenConfig {
    /// The Llama 3 configuration
    fn default() -> Self {
        let mut special_tokens: Vec<String> = [
            "<|begin_of_text|>",
            "<|end_of_text|>",
            "<|reserved_special_token_0|>",
            "<|reserved_special_token_1|>",
            "<|reserved_special_token_2|>",
            "<|reserved_special_token_3|>",
            "<|start_header_id|>",
            "<|end_header_id|>",
            "<|reserved_special_token_4|>",
            "<|eot_id|>",
        ]
        .iter()
        .map(|token| token.to_string())
        .collect();
        let named = special_tokens.len();
        special_tokens.extend(
            (5..5 + LLAMA3_NUM_SPECIAL_TOKENS - named)
                .map(|i| format!("<|reserved_special_token_{i}|>")),
        );

        Self {
            pattern: LLAMA3_PATTERN.to_string(),
            special_tokens,
            bos_index: 0,
            eos_index: 1,
        }
    }
}

/// A tokenizer loaded from a tiktoken vocabulary file
#[derive(Debug)]
pub struct Tiktoken {
    pipeline: Pipeline,
}

impl Tiktoken {
    /// Load a vocabulary file with the Llama 3 configuration
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_config(path, &TiktokenConfig::default())
    }

    pub fn load_with_config(path: impl AsRef<Path>, config: &TiktokenConfig) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Self::from_slice(&read_file(path)?, config)?;
        info!(
            path = %path.display(),
            vocab_size = tokenizer.pipeline.vocab().len(),
            special_tokens = tokenizer.pipeline.special_tokens().len(),
            "Loaded tiktoken vocabulary"
        );

        Ok(tokenizer)
    }

    /// Build from the contents of a vocabulary file
    pub fn from_slice(data: &[u8], config: &TiktokenConfig) -> Result<Self> {
        let ranks = parse_ranks(data)?;
        let num_ranks = ranks.len();
        debug!(ranks = num_ranks, "Parsed tiktoken ranks");

        for (name, index) in [("bos_index", config.bos_index), ("eos_index", config.eos_index)] {
            if index >= config.special_tokens.len() {
                return corrupt(format!(
                    "{name} {index} is past the end of the {} special tokens",
                    config.special_tokens.len()
                ));
            }
        }
        let special: Vec<(String, TokenInt)> = config
            .special_tokens
            .iter()
            .enumerate()
            .map(|(i, token)| (token.clone(), num_ranks + i))
            .collect();
        let bos = special[config.bos_index].1;
        let eos = special[config.eos_index].1;

        let vocab = Vocab::from_pairs(
            ranks.into_iter().chain(
                special
                    .iter()
                    .map(|(token, id)| (TokenString::from(token.as_bytes()), *id)),
            ),
        )?;

        let pattern = Pattern::compile(&config.pattern)?;
        debug!(backend = %pattern.backend(), "Compiled tiktoken split pattern");

        // Only the pattern matches become pieces; anything between them is dropped
        let pre_tokenizer = PreTokenizer::Split {
            pattern,
            behavior: SplitBehavior::Removed,
            invert: true,
        };

        let pipeline = Pipeline::builder(
            vocab,
            Model::Bpe(BpeModel::new(Merges::VocabRank, SymbolBase::Bytes)),
        )
        .pre_tokenizer(Some(pre_tokenizer))
        .special_tokens(SpecialTokens::new(special))
        .template(Template::bos(Some(bos)))
        .bos(Some(bos))
        .eos(Some(eos))
        .build()?;

        Ok(Self { pipeline })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

fn parse_ranks(data: &[u8]) -> Result<Vec<(TokenString, TokenInt)>> {
    let mut ranks = Vec::new();
    for (index, line) in data.split(|&b| b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let line_number = index + 1;

        let Some(space) = line.iter().position(|&b| b == b' ') else {
            return corrupt(format!("line {line_number} has no rank"));
        };
        let token = STANDARD
            .decode(&line[..space])
            .context(Base64Snafu { line: line_number })?;
        let rank = std::str::from_utf8(&line[space + 1..])
            .ok()
            .and_then(|rank| rank.trim().parse::<TokenInt>().ok());
        match rank {
            Some(rank) => ranks.push((token, rank)),
            None => return corrupt(format!("line {line_number} has an invalid rank")),
        }
    }

    Ok(ranks)
}
