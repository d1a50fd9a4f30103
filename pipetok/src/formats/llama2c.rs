//! The llama2.c binary vocabulary: a SentencePiece BPE model flattened into scored tokens, with
//! spaces stored literally rather than as `▁`.
//!
//! ```text
//! u32 vocab_size, u32 bos_id, u32 eos_id, u32 max_token_length      (little-endian)
//! vocab_size times: f32 score, u32 len, len bytes of token
//! ```
use super::read_file;
use crate::bpe::{Merges, SymbolBase};
use crate::error::*;
use crate::pipeline::{Model, Template};
use crate::vocab::ByteFallback;
use crate::{
    BpeModel, Decoder, Normalizer, Pipeline, PrependScheme, Result, SpecialTokens, TokenInt,
    Vocab,
};
use std::path::Path;
use tracing::*;

/// A tokenizer loaded from a llama2.c `tokenizer.bin`
#[derive(Debug)]
pub struct Llama2cTokenizer {
    pipeline: Pipeline,
}

impl Llama2cTokenizer {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Self::from_slice(&read_file(path)?)?;
        info!(
            path = %path.display(),
            vocab_size = tokenizer.pipeline.vocab().len(),
            "Loaded llama2.c tokenizer"
        );

        Ok(tokenizer)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let mut reader = Reader { data, pos: 0 };
        let vocab_size = reader.u32()? as usize;
        let bos = reader.u32()? as TokenInt;
        let eos = reader.u32()? as TokenInt;
        let max_token_length = reader.u32()?;
        debug!(vocab_size, bos, eos, max_token_length, "Read llama2.c header");

        // Each token takes at least 8 bytes, so a header can't claim more than the data holds
        let max_tokens = (data.len() - reader.pos) / 8;
        if vocab_size > max_tokens {
            return corrupt(format!(
                "llama2.c header claims {vocab_size} tokens, but there is only room for {max_tokens}"
            ));
        }

        let mut tokens = Vec::with_capacity(vocab_size);
        let mut scores = Vec::with_capacity(vocab_size);
        for _ in 0..vocab_size {
            scores.push(reader.f32()?);
            let len = reader.u32()? as usize;
            tokens.push(reader.bytes(len)?.to_vec());
        }
        if reader.pos < data.len() {
            warn!(
                trailing = data.len() - reader.pos,
                "Ignoring trailing bytes after the llama2.c vocabulary"
            );
        }

        let vocab = Vocab::from_tokens(tokens)?;
        let special = [bos, eos].into_iter().filter_map(|id| {
            vocab
                .token(id)
                .map(|token| (String::from_utf8_lossy(token).into_owned(), id))
        });
        let special = SpecialTokens::new(special);

        let mut bpe = BpeModel::new(Merges::Scored(scores), SymbolBase::Chars);
        bpe.byte_fallback = ByteFallback::from_vocab(&vocab);

        // Spaces are stored literally, so the metaspace step only drops the dummy prefix
        let decoder = Decoder::Sequence(vec![
            Decoder::ByteFallback,
            Decoder::Fuse,
            Decoder::Metaspace {
                replacement: ' ',
                prepend_scheme: PrependScheme::Always,
            },
        ]);

        let pipeline = Pipeline::builder(vocab, Model::Bpe(bpe))
            .normalizer(Some(Normalizer::Prepend(" ".to_string())))
            .decoder(Some(decoder))
            .special_tokens(special)
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

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.saturating_add(len);
        match self.data.get(self.pos..end) {
            Some(bytes) => {
                self.pos = end;
                Ok(bytes)
            }
            None => corrupt(format!(
                "llama2.c vocabulary is truncated at byte {} of {}",
                self.pos,
                self.data.len()
            )),
        }
    }

    fn word(&mut self) -> Result<[u8; 4]> {
        let bytes = self.bytes(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.word()?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.word()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipetokError;
    use assert_matches::assert_matches;

    const TOKENS: [(&str, f32); 12] = [
        ("<unk>", 0.0),
        ("<s>", 0.0),
        ("</s>", 0.0),
        ("<0x0A>", 0.0),
        ("<0xC3>", 0.0),
        ("<0xA9>", 0.0),
        (" ", -1.0),
        ("h", -2.0),
        ("i", -2.0),
        (" h", -1.5),
        (" hi", -0.5),
        ("hi", -1.0),
    ];

    fn model_file(bos: u32, eos: u32, tokens: &[(&str, f32)]) -> Vec<u8> {
        let max_len = tokens.iter().map(|(token, _)| token.len()).max().unwrap_or(0);
        let mut data = Vec::new();
        for word in [tokens.len() as u32, bos, eos, max_len as u32] {
            data.extend_from_slice(&word.to_le_bytes());
        }
        for (token, score) in tokens {
            data.extend_from_slice(&score.to_le_bytes());
            data.extend_from_slice(&(token.len() as u32).to_le_bytes());
            data.extend_from_slice(token.as_bytes());
        }
        data
    }

    fn tokenizer() -> Llama2cTokenizer {
        Llama2cTokenizer::from_slice(&model_file(1, 2, &TOKENS)).unwrap()
    }

    #[test]
    fn merges_by_score() {
        let tokenizer = tokenizer();
        let pipeline = tokenizer.pipeline();

        assert_eq!(vec![1, 10, 10], pipeline.encode("hi hi", true).unwrap());
        assert_eq!("<s>hi hi", pipeline.decode(&[1, 10, 10], false).unwrap());
        assert_eq!(vec![1], pipeline.encode("", true).unwrap());
        assert!(pipeline.encode("", false).unwrap().is_empty());
    }

    #[test]
    fn byte_fallback_round_trip() {
        let tokenizer = tokenizer();
        let pipeline = tokenizer.pipeline();

        let ids = pipeline.encode("hé\n", true).unwrap();
        assert_eq!(vec![1, 9, 4, 5, 3], ids);
        assert_eq!("<s>hé\n", pipeline.decode(&ids, false).unwrap());
        assert_eq!("hé\n", pipeline.decode(&ids, true).unwrap());

        // Neither 'x' nor its byte token is in the vocabulary
        assert_matches!(
            pipeline.encode("x", false),
            Err(PipetokError::UnknownToken { .. })
        );
    }

    #[test]
    fn header_names_bos_and_eos() {
        let tokenizer = tokenizer();

        assert_eq!(Some(1), tokenizer.pipeline().bos());
        assert_eq!(Some(2), tokenizer.pipeline().eos());
        assert!(tokenizer.pipeline().special_tokens().contains_id(2));
        assert_eq!(
            vec![1, 10, 2],
            tokenizer.pipeline().encode_with_markers("hi", 1, 1).unwrap()
        );
    }

    #[test]
    fn corrupt_files() {
        let mut data = model_file(1, 2, &TOKENS);
        data.pop();
        assert_matches!(
            Llama2cTokenizer::from_slice(&data),
            Err(PipetokError::CorruptArtifact { .. })
        );

        assert_matches!(
            Llama2cTokenizer::from_slice(&[0, 0]),
            Err(PipetokError::CorruptArtifact { .. })
        );

        // A huge token count must be rejected before anything is allocated for it
        let header: Vec<u8> = [u32::MAX, 1, 2, 4]
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect();
        assert_matches!(
            Llama2cTokenizer::from_slice(&header),
            Err(PipetokError::CorruptArtifact { .. })
        );

        let mut data = model_file(1, 2, &TOKENS);
        data[..4].copy_from_slice(&1000u32.to_le_bytes());
        assert_matches!(
            Llama2cTokenizer::from_slice(&data),
            Err(PipetokError::CorruptArtifact { .. })
        );

        assert_matches!(
            Llama2cTokenizer::from_slice(&model_file(99, 2, &TOKENS)),
            Err(PipetokError::CorruptArtifact { .. })
        );

        assert_matches!(
            Llama2cTokenizer::from_slice(&model_file(0, 0, &[("a", 0.0), ("a", 1.0)])),
            Err(PipetokError::CorruptArtifact { .. })
        );
    }

    #[test]
    fn load_from_file() {
        crate::test_helpers::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.bin");
        std::fs::write(&path, model_file(1, 2, &TOKENS)).unwrap();

        let tokenizer = Llama2cTokenizer::load(&path).unwrap();
        assert_eq!(12, tokenizer.pipeline().vocab().len());
    }
}
