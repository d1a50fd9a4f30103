//! SentencePiece `.model` files: a serialized `ModelProto` holding the scored pieces, the trainer
//! settings that matter at inference time, and the normalization rules.
use super::read_file;
use crate::bpe::{Merges, SymbolBase};
use crate::error::*;
use crate::pipeline::{Model, Template};
use crate::vocab::ByteFallback;
use crate::{
    BpeModel, Decoder, Normalizer, Pattern, Pipeline, PrependScheme, Result, SpecialTokens,
    TokenInt, Unigram, Vocab,
};
use prost::Message;
use proto::{ModelProto, ModelType, NormalizerSpec, PieceType};
use snafu::ResultExt;
use std::path::Path;
use tracing::*;

/// The subset of `sentencepiece_model.proto` needed for inference.  Fields not declared here are
/// skipped when decoding.
pub mod proto {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ModelProto {
        #[prost(message, repeated, tag = "1")]
        pub pieces: Vec<SentencePiece>,
        #[prost(message, optional, tag = "2")]
        pub trainer_spec: Option<TrainerSpec>,
        #[prost(message, optional, tag = "3")]
        pub normalizer_spec: Option<NormalizerSpec>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SentencePiece {
        #[prost(string, optional, tag = "1")]
        pub piece: Option<String>,
        #[prost(float, optional, tag = "2")]
        pub score: Option<f32>,
        #[prost(enumeration = "PieceType", optional, tag = "3")]
        pub kind: Option<i32>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum PieceType {
        Normal = 1,
        Unknown = 2,
        Control = 3,
        UserDefined = 4,
        Unused = 5,
        Byte = 6,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct TrainerSpec {
        #[prost(enumeration = "ModelType", optional, tag = "3")]
        pub model_type: Option<i32>,
        #[prost(bool, optional, tag = "35")]
        pub byte_fallback: Option<bool>,
        #[prost(int32, optional, tag = "40")]
        pub unk_id: Option<i32>,
        #[prost(int32, optional, tag = "41")]
        pub bos_id: Option<i32>,
        #[prost(int32, optional, tag = "42")]
        pub eos_id: Option<i32>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum ModelType {
        Unigram = 1,
        Bpe = 2,
        Word = 3,
        Char = 4,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct NormalizerSpec {
        #[prost(string, optional, tag = "1")]
        pub name: Option<String>,
        #[prost(bool, optional, tag = "3")]
        pub add_dummy_prefix: Option<bool>,
        #[prost(bool, optional, tag = "4")]
        pub remove_extra_whitespaces: Option<bool>,
        #[prost(bool, optional, tag = "5")]
        pub escape_whitespaces: Option<bool>,
    }
}

/// The character SentencePiece writes in place of a space
const SPACE_MARKER: char = '▁';

/// A tokenizer loaded from a SentencePiece `.model` file
#[derive(Debug)]
pub struct SentencePieceTokenizer {
    pipeline: Pipeline,
}

impl SentencePieceTokenizer {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Self::from_slice(&read_file(path)?)?;
        info!(
            path = %path.display(),
            vocab_size = tokenizer.pipeline.vocab().len(),
            special_tokens = tokenizer.pipeline.special_tokens().len(),
            "Loaded SentencePiece model"
        );

        Ok(tokenizer)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let model = ModelProto::decode(data).context(ProtobufSnafu)?;
        let trainer = model.trainer_spec.clone().unwrap_or_default();

        let kinds: Vec<PieceType> = model
            .pieces
            .iter()
            .map(|piece| {
                PieceType::try_from(piece.kind.unwrap_or(PieceType::Normal as i32))
                    .unwrap_or(PieceType::Normal)
            })
            .collect();
        let tokens = model
            .pieces
            .iter()
            .enumerate()
            .map(|(id, piece)| match &piece.piece {
                Some(piece) => Ok(piece.clone()),
                None => corrupt(format!("piece {id} has no text")),
            })
            .collect::<Result<Vec<_>>>()?;
        let vocab = Vocab::from_tokens(tokens.iter().map(String::as_str))?;

        // Negative ids mean the model has no such token
        let optional_id = |id: Option<i32>, default: i32| {
            TokenInt::try_from(id.unwrap_or(default)).ok()
        };
        let unk = optional_id(trainer.unk_id, 0);
        let bos = optional_id(trainer.bos_id, 1);
        let eos = optional_id(trainer.eos_id, 2);

        let special = SpecialTokens::new(
            tokens
                .iter()
                .zip(&kinds)
                .enumerate()
                .filter(|(_, (_, kind))| matches!(kind, PieceType::Control | PieceType::UserDefined))
                .map(|(id, (token, _))| (token.clone(), id)),
        );

        let byte_fallback = if trainer.byte_fallback.unwrap_or(false) {
            ByteFallback::from_vocab(&vocab)
        } else {
            None
        };
        let model_type = ModelType::try_from(trainer.model_type.unwrap_or(ModelType::Unigram as i32))
            .unwrap_or(ModelType::Unigram);
        debug!(?model_type, ?unk, ?bos, ?eos, "Read SentencePiece trainer spec");

        let sub_word = match model_type {
            ModelType::Unigram => {
                let scores = model
                    .pieces
                    .iter()
                    .zip(&kinds)
                    .map(|(piece, kind)| {
                        (*kind == PieceType::Normal).then(|| piece.score.unwrap_or(0.0))
                    })
                    .collect();
                Model::Unigram(Box::new(Unigram::new(&vocab, scores, unk, byte_fallback)?))
            }
            ModelType::Bpe => {
                // Only normal pieces are built by merging
                let scores = model
                    .pieces
                    .iter()
                    .zip(&kinds)
                    .map(|(piece, kind)| match kind {
                        PieceType::Normal => piece.score.unwrap_or(0.0),
                        _ => f32::NEG_INFINITY,
                    })
                    .collect();
                let mut bpe = BpeModel::new(Merges::Scored(scores), SymbolBase::Chars);
                bpe.unk = unk.filter(|&unk| unk < vocab.len());
                bpe.byte_fallback = byte_fallback;
                Model::Bpe(bpe)
            }
            other => return UnsupportedConfigSnafu {
                component: "SentencePiece model",
                kind: format!("{other:?}"),
            }
            .fail(),
        };

        let spec = model.normalizer_spec.clone().unwrap_or_default();
        let add_dummy_prefix = spec.add_dummy_prefix.unwrap_or(true);
        let decoder = Decoder::Sequence(vec![
            Decoder::ByteFallback,
            Decoder::Fuse,
            Decoder::Metaspace {
                replacement: SPACE_MARKER,
                prepend_scheme: if add_dummy_prefix {
                    PrependScheme::Always
                } else {
                    PrependScheme::Never
                },
            },
        ]);

        let pipeline = Pipeline::builder(vocab, sub_word)
            .normalizer(normalizer(&spec)?)
            .decoder(Some(decoder))
            .special_tokens(special)
            .template(Template::bos(bos))
            .bos(bos)
            .eos(eos)
            .build()?;

        Ok(Self { pipeline })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

fn normalizer(spec: &NormalizerSpec) -> Result<Option<Normalizer>> {
    let mut steps = Vec::new();

    let name = spec.name.as_deref().unwrap_or("identity");
    if name.contains("nfkc") {
        steps.push(Normalizer::Nfkc);
        if name.ends_with("_cf") {
            steps.push(Normalizer::Lowercase);
        }
    } else if !matches!(name, "identity" | "") {
        warn!(name, "Approximating SentencePiece normalization rules with NFKC");
        steps.push(Normalizer::Nfkc);
    }

    if spec.remove_extra_whitespaces.unwrap_or(true) {
        steps.push(Normalizer::CollapseWhitespace);
    }
    if spec.add_dummy_prefix.unwrap_or(true) {
        steps.push(Normalizer::Prepend(" ".to_string()));
    }
    if spec.escape_whitespaces.unwrap_or(true) {
        steps.push(Normalizer::Replace {
            pattern: Pattern::literal(" ")?,
            content: SPACE_MARKER.to_string(),
        });
    }

    Ok(match steps.len() {
        0 => None,
        1 => steps.pop(),
        _ => Some(Normalizer::Sequence(steps)),
    })
}
