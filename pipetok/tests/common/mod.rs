//! Builders for small tokenizer artifacts, so tests don't depend on downloaded models
#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use pipetok::sentencepiece_proto::{
    ModelProto, ModelType, NormalizerSpec, PieceType, SentencePiece, TrainerSpec,
};
use prost::Message;

/// A tiktoken file with one line per token, ranked in the order given
pub fn tiktoken_file<T: AsRef<[u8]>>(tokens: &[T]) -> String {
    tokens
        .iter()
        .enumerate()
        .map(|(rank, token)| format!("{} {rank}\n", STANDARD.encode(token)))
        .collect()
}

/// A tiktoken file holding all 256 single bytes followed by `merged`
pub fn byte_complete_tiktoken_file(merged: &[&str]) -> String {
    let mut tokens: Vec<Vec<u8>> = (0..=255u8).map(|b| vec![b]).collect();
    tokens.extend(merged.iter().map(|token| token.as_bytes().to_vec()));
    tiktoken_file(&tokens)
}

/// A llama2.c `tokenizer.bin`
pub fn llama2c_file(bos: u32, eos: u32, tokens: &[(String, f32)]) -> Vec<u8> {
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

/// `<unk>`, `<s>`, `</s>` and the 256 byte tokens, which is how llama2.c and SentencePiece
/// vocabularies start
pub fn llama_prefix() -> Vec<(String, f32)> {
    let mut tokens = vec![
        ("<unk>".to_string(), 0.0),
        ("<s>".to_string(), 0.0),
        ("</s>".to_string(), 0.0),
    ];
    tokens.extend((0..=255u8).map(|b| (format!("<0x{b:02X}>"), 0.0)));
    tokens
}

pub fn piece(text: &str, score: f32, kind: PieceType) -> SentencePiece {
    SentencePiece {
        piece: Some(text.to_string()),
        score: Some(score),
        kind: Some(kind as i32),
    }
}

/// A SentencePiece `.model` with the usual normalizer settings apart from `add_dummy_prefix`.
/// `pieces` follow `<unk>`, `<s>` and `</s>`, and the 256 byte pieces when `byte_fallback` is set.
pub fn sentencepiece_file(
    model_type: ModelType,
    byte_fallback: bool,
    add_dummy_prefix: bool,
    pieces: &[(&str, f32, PieceType)],
) -> Vec<u8> {
    let normalizer = NormalizerSpec {
        name: Some("identity".to_string()),
        add_dummy_prefix: Some(add_dummy_prefix),
        remove_extra_whitespaces: Some(true),
        escape_whitespaces: Some(true),
    };
    sentencepiece_file_with(model_type, byte_fallback, normalizer, pieces)
}

/// [`sentencepiece_file`] with full control over the normalizer
pub fn sentencepiece_file_with(
    model_type: ModelType,
    byte_fallback: bool,
    normalizer: NormalizerSpec,
    pieces: &[(&str, f32, PieceType)],
) -> Vec<u8> {
    let mut all = vec![
        piece("<unk>", 0.0, PieceType::Unknown),
        piece("<s>", 0.0, PieceType::Control),
        piece("</s>", 0.0, PieceType::Control),
    ];
    if byte_fallback {
        all.extend((0..=255u8).map(|b| piece(&format!("<0x{b:02X}>"), 0.0, PieceType::Byte)));
    }
    all.extend(
        pieces
            .iter()
            .map(|(text, score, kind)| piece(text, *score, *kind)),
    );

    ModelProto {
        pieces: all,
        trainer_spec: Some(TrainerSpec {
            model_type: Some(model_type as i32),
            byte_fallback: Some(byte_fallback),
            unk_id: Some(0),
            bos_id: Some(1),
            eos_id: Some(2),
        }),
        normalizer_spec: Some(normalizer),
    }
    .encode_to_vec()
}
