/// A token output by the tokenizer, represented as its integer id in the vocabulary.
///
/// Ids are dense: a vocabulary of `n` tokens uses exactly the ids `0..n`.  For rank-ordered
/// formats like tiktoken the id doubles as the merge rank of the token.
pub type TokenInt = usize;

/// A token in its byte string form.
///
/// Most formats store their vocabulary as UTF-8 text, but tiktoken and byte-fallback tokens can
/// hold arbitrary bytes, so the vocabulary is keyed on raw bytes throughout.
pub type TokenString = Vec<u8>;
