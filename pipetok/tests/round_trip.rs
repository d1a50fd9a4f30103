//! Decoding what was encoded gives back the original text, for formats that can represent any
//! input
mod common;

use pipetok::sentencepiece_proto::{ModelType, NormalizerSpec, PieceType};
use pipetok::{HfTokenizer, Llama2cTokenizer, SentencePieceTokenizer, Tiktoken, TiktokenConfig};
use proptest::prelude::*;
use serde_json::json;

fn tiktoken() -> Tiktoken {
    let data = common::byte_complete_tiktoken_file(&["th", "the", " th", " the", "in", "ing"]);
    Tiktoken::from_slice(data.as_bytes(), &TiktokenConfig::default()).unwrap()
}

fn byte_level_hf() -> HfTokenizer {
    let mut vocab = serde_json::Map::new();
    for b in 0..=255u8 {
        vocab.insert(pipetok::byte_level::byte_to_char(b).to_string(), json!(b));
    }
    vocab.insert("th".to_string(), json!(256));
    vocab.insert("the".to_string(), json!(257));

    let tokenizer_json = json!({
        "pre_tokenizer": {"type": "ByteLevel", "add_prefix_space": false, "use_regex": true},
        "decoder": {"type": "ByteLevel"},
        "model": {"type": "BPE", "vocab": vocab, "merges": ["t h", "th e"]}
    });
    HfTokenizer::from_slice(tokenizer_json.to_string().as_bytes(), None).unwrap()
}

fn llama2c() -> Llama2cTokenizer {
    let mut tokens = common::llama_prefix();
    for (token, score) in [(" ", -1.0), ("t", -2.0), ("h", -2.0), ("th", -1.0), (" th", -0.5)] {
        tokens.push((token.to_string(), score));
    }
    Llama2cTokenizer::from_slice(&common::llama2c_file(1, 2, &tokens)).unwrap()
}

/// A unigram model that keeps whitespace as is, so any text without the space marker survives
/// normalization
fn sentencepiece_unigram() -> SentencePieceTokenizer {
    let normalizer = NormalizerSpec {
        name: Some("identity".to_string()),
        add_dummy_prefix: Some(true),
        remove_extra_whitespaces: Some(false),
        escape_whitespaces: Some(true),
    };
    let data = common::sentencepiece_file_with(
        ModelType::Unigram,
        true,
        normalizer,
        &[
            ("▁", -3.0, PieceType::Normal),
            ("▁the", -1.0, PieceType::Normal),
            ("▁a", -1.5, PieceType::Normal),
            ("e", -2.0, PieceType::Normal),
            ("th", -2.0, PieceType::Normal),
            ("ing", -1.5, PieceType::Normal),
        ],
    );
    SentencePieceTokenizer::from_slice(&data).unwrap()
}

#[test]
fn merges_are_used() {
    assert_eq!(vec![257], tiktoken().pipeline().encode("the", false).unwrap());
    assert_eq!(vec![259], tiktoken().pipeline().encode(" the", false).unwrap());

    let tokenizer = sentencepiece_unigram();
    let the = tokenizer.pipeline().vocab().id("▁the").unwrap();
    let space = tokenizer.pipeline().vocab().id("▁").unwrap();
    let ids = tokenizer.pipeline().encode(" the", false).unwrap();
    assert_eq!(vec![space, the], ids);
    assert_eq!(" the", tokenizer.pipeline().decode(&ids, false).unwrap());
}

proptest! {
    #[test]
    fn tiktoken_round_trip(s in "\\PC*") {
        let tokenizer = tiktoken();
        let ids = tokenizer.pipeline().encode(&s, false).unwrap();
        prop_assert_eq!(&s, &tokenizer.pipeline().decode(&ids, false).unwrap());
    }

    #[test]
    fn byte_level_round_trip(s in "\\PC*") {
        let tokenizer = byte_level_hf();
        let ids = tokenizer.pipeline().encode(&s, false).unwrap();
        prop_assert_eq!(&s, &tokenizer.pipeline().decode(&ids, false).unwrap());
    }

    #[test]
    fn sentencepiece_unigram_round_trip(s in "[^\\p{C}\u{2581}]*") {
        let tokenizer = sentencepiece_unigram();
        let ids = tokenizer.pipeline().encode(&s, false).unwrap();
        prop_assert_eq!(&s, &tokenizer.pipeline().decode(&ids, false).unwrap());
    }

    #[test]
    fn llama2c_round_trip(s in "\\PC*") {
        let tokenizer = llama2c();
        let ids = tokenizer.pipeline().encode(&s, true).unwrap();
        prop_assert_eq!(&s, &tokenizer.pipeline().decode(&ids, true).unwrap());
    }
}
