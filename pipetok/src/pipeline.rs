//! The composed tokenization pipeline that every format front-end builds.
use crate::decoder::DecodedPiece;
use crate::error::*;
use crate::iterator::Segment;
use crate::{
    BpeModel, Decoder, Normalizer, Piece, PreTokenizer, Result, SpecialTokens, TokenInt,
    UnigramModel, Vocab,
};
use snafu::OptionExt;
use std::borrow::Cow;

/// The sub-word model at the heart of a pipeline
#[derive(Debug)]
pub enum Model {
    Bpe(BpeModel),
    Unigram(Box<dyn UnigramModel>),
}

/// Token ids that frame every encoded sequence when special tokens are requested
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Template {
    pub prefix: Vec<TokenInt>,
    pub suffix: Vec<TokenInt>,
}

impl Template {
    /// Just a beginning-of-sequence token, which is what most decoder-only models expect
    pub fn bos(bos: Option<TokenInt>) -> Self {
        Self {
            prefix: bos.into_iter().collect(),
            suffix: Vec::new(),
        }
    }
}

/// A normalizer, pre-tokenizer, model and decoder assembled around one vocabulary.
///
/// A pipeline is immutable once built, so a single instance can encode and decode from many
/// threads at once.
#[derive(Debug)]
pub struct Pipeline {
    vocab: Vocab,
    normalizer: Option<Normalizer>,
    pre_tokenizer: Option<PreTokenizer>,
    model: Model,
    decoder: Option<Decoder>,
    special: SpecialTokens,
    template: Template,
    bos: Option<TokenInt>,
    eos: Option<TokenInt>,
}

/// Assembles a [`Pipeline`], checking that every id it is given exists in the vocabulary.
pub struct PipelineBuilder {
    pipeline: Pipeline,
}

impl PipelineBuilder {
    pub fn normalizer(mut self, normalizer: Option<Normalizer>) -> Self {
        self.pipeline.normalizer = normalizer;
        self
    }

    pub fn pre_tokenizer(mut self, pre_tokenizer: Option<PreTokenizer>) -> Self {
        self.pipeline.pre_tokenizer = pre_tokenizer;
        self
    }

    pub fn decoder(mut self, decoder: Option<Decoder>) -> Self {
        self.pipeline.decoder = decoder;
        self
    }

    pub fn special_tokens(mut self, special: SpecialTokens) -> Self {
        self.pipeline.special = special;
        self
    }

    pub fn template(mut self, template: Template) -> Self {
        self.pipeline.template = template;
        self
    }

    pub fn bos(mut self, bos: Option<TokenInt>) -> Self {
        self.pipeline.bos = bos;
        self
    }

    pub fn eos(mut self, eos: Option<TokenInt>) -> Self {
        self.pipeline.eos = eos;
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let pipeline = self.pipeline;
        let vocab_size = pipeline.vocab.len();

        let ids = pipeline
            .special
            .iter()
            .map(|(_, id)| id)
            .chain(pipeline.template.prefix.iter().copied())
            .chain(pipeline.template.suffix.iter().copied())
            .chain(pipeline.bos)
            .chain(pipeline.eos);
        for id in ids {
            if id >= vocab_size {
                return corrupt(format!(
                    "special token id {id} is outside of the vocabulary of {vocab_size} tokens"
                ));
            }
        }

        Ok(pipeline)
    }
}

impl Pipeline {
    pub fn builder(vocab: Vocab, model: Model) -> PipelineBuilder {
        PipelineBuilder {
            pipeline: Pipeline {
                vocab,
                normalizer: None,
                pre_tokenizer: None,
                model,
                decoder: None,
                special: SpecialTokens::default(),
                template: Template::default(),
                bos: None,
                eos: None,
            },
        }
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special
    }

    pub fn bos(&self) -> Option<TokenInt> {
        self.bos
    }

    pub fn eos(&self) -> Option<TokenInt> {
        self.eos
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Encode `text` into token ids.
    ///
    /// Special tokens found in `text` always encode to their own ids and are never normalized or
    /// merged.  `add_special_tokens` controls whether the pipeline's template (typically a BOS
    /// token) frames the output.
    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<TokenInt>> {
        let mut out = Vec::with_capacity(
            self.vocab.estimate_num_tokens(text)
                + self.template.prefix.len()
                + self.template.suffix.len(),
        );
        if add_special_tokens {
            out.extend_from_slice(&self.template.prefix);
        }

        for segment in self.special.segments(text) {
            match segment {
                Segment::Special { id, .. } => out.push(id),
                Segment::Text { text, offset } => {
                    for piece in self.pieces(text, offset)? {
                        self.encode_piece(&piece.text, &mut out)?;
                    }
                }
            }
        }

        if add_special_tokens {
            out.extend_from_slice(&self.template.suffix);
        }

        Ok(out)
    }

    /// Encode `text` without its template, then add `bos` copies of the BOS token before it and
    /// `eos` copies of the EOS token after it.
    pub fn encode_with_markers(&self, text: &str, bos: usize, eos: usize) -> Result<Vec<TokenInt>> {
        let bos_id = match bos {
            0 => None,
            _ => Some(self.bos.context(MissingSpecialTokenSnafu { name: "BOS" })?),
        };
        let eos_id = match eos {
            0 => None,
            _ => Some(self.eos.context(MissingSpecialTokenSnafu { name: "EOS" })?),
        };

        let mut out = Vec::with_capacity(bos + eos + self.vocab.estimate_num_tokens(text));
        out.extend(bos_id.into_iter().flat_map(|id| std::iter::repeat(id).take(bos)));
        out.extend(self.encode(text, false)?);
        out.extend(eos_id.into_iter().flat_map(|id| std::iter::repeat(id).take(eos)));

        Ok(out)
    }

    /// Normalize and pre-tokenize `text` without encoding it.  Special tokens are left out.
    pub fn pre_tokenize(&self, text: &str) -> Result<Vec<Piece>> {
        let mut pieces = Vec::new();
        for segment in self.special.segments(text) {
            if let Segment::Text { text, offset } = segment {
                pieces.extend(self.pieces(text, offset)?);
            }
        }

        Ok(pieces)
    }

    fn pieces(&self, text: &str, offset: usize) -> Result<Vec<Piece>> {
        let normalized = match &self.normalizer {
            Some(normalizer) => Cow::Owned(normalizer.normalize(text)?),
            None => Cow::Borrowed(text),
        };

        match &self.pre_tokenizer {
            Some(pre_tokenizer) => pre_tokenizer.pre_tokenize(&normalized, offset),
            None if normalized.is_empty() => Ok(Vec::new()),
            None => Ok(vec![Piece::new(
                &*normalized,
                offset..offset + normalized.len(),
            )]),
        }
    }

    fn encode_piece(&self, piece: &str, out: &mut Vec<TokenInt>) -> Result<()> {
        match &self.model {
            Model::Bpe(bpe) => bpe.encode_piece(&self.vocab, piece, out),
            Model::Unigram(unigram) => {
                out.extend(
                    unigram
                        .segment(&self.vocab, piece)?
                        .into_iter()
                        .map(|(_, id)| id),
                );
                Ok(())
            }
        }
    }

    /// Decode token ids into the exact bytes they stand for.
    ///
    /// Fails if any id is outside of the vocabulary.
    pub fn decode_bytes(&self, ids: &[TokenInt], skip_special_tokens: bool) -> Result<Vec<u8>> {
        let mut pieces = Vec::with_capacity(ids.len());
        for &id in ids {
            let token = self.vocab.token(id).context(InvalidIdSnafu {
                id,
                vocab_size: self.vocab.len(),
            })?;
            let special = self.special.contains_id(id);
            if !(special && skip_special_tokens) {
                pieces.push(DecodedPiece::new(token, special));
            }
        }

        let pieces = match &self.decoder {
            Some(decoder) => decoder.decode_chain(pieces)?,
            None => pieces,
        };

        Ok(pieces.into_iter().flat_map(|piece| piece.bytes).collect())
    }

    /// Decode token ids into text.
    ///
    /// A sequence of ids can end in the middle of a multi-byte character, or byte tokens can
    /// spell invalid UTF-8.  Such bytes are replaced with U+FFFD; use [`Self::decode_bytes`] to
    /// get them verbatim.
    pub fn decode(&self, ids: &[TokenInt], skip_special_tokens: bool) -> Result<String> {
        let bytes = self.decode_bytes(ids, skip_special_tokens)?;

        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}
