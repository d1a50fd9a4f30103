//! HuggingFace `tokenizer.json` front-end.
//!
//! A `tokenizer.json` declares the normalizer, pre-tokenizer, model, post-processor and decoder
//! as independent sections, each tagged with a `"type"`.  The stable top-level layout is
//! deserialized into typed structs; the polymorphic sections are kept as `serde_json::Value` and
//! dispatched on their type here, so an unknown type is reported as an unsupported component
//! rather than a JSON error.
use super::read_file;
use crate::bpe::{Merges, SymbolBase};
use crate::error::*;
use crate::pipeline::{Model, Template};
use crate::vocab::{ByteFallback, HashMap};
use crate::{
    BpeModel, Decoder, Normalizer, Pattern, Pipeline, PreTokenizer, PrependScheme, Result,
    SpecialTokens, SplitBehavior, TokenInt, Unigram, Vocab,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use snafu::ResultExt;
use std::path::Path;
use std::str::FromStr;
use tracing::*;

#[derive(Deserialize)]
struct TokenizerJson {
    model: Value,
    #[serde(default)]
    normalizer: Option<Value>,
    #[serde(default)]
    pre_tokenizer: Option<Value>,
    #[serde(default)]
    post_processor: Option<Value>,
    #[serde(default)]
    decoder: Option<Value>,
    #[serde(default)]
    added_tokens: Vec<AddedToken>,
}

#[derive(Deserialize)]
struct AddedToken {
    id: TokenInt,
    content: String,
}

#[derive(Deserialize)]
struct BpeJson {
    vocab: HashMap<String, TokenInt>,
    #[serde(default)]
    merges: Vec<MergeJson>,
    #[serde(default)]
    unk_token: Option<String>,
    #[serde(default)]
    byte_fallback: bool,
    #[serde(default)]
    fuse_unk: bool,
    #[serde(default)]
    ignore_merges: bool,
    #[serde(default)]
    continuing_subword_prefix: Option<String>,
    #[serde(default)]
    end_of_word_suffix: Option<String>,
}

/// Merge rules come either as `"a b"` (older files) or as `["a", "b"]`
#[derive(Deserialize)]
#[serde(untagged)]
enum MergeJson {
    Joined(String),
    Pair(String, String),
}

#[derive(Deserialize)]
struct UnigramJson {
    vocab: Vec<(String, f64)>,
    #[serde(default)]
    unk_id: Option<TokenInt>,
    #[serde(default)]
    byte_fallback: bool,
}

#[derive(Deserialize)]
enum PatternJson {
    String(String),
    Regex(String),
}

impl PatternJson {
    fn compile(&self) -> Result<Pattern> {
        match self {
            Self::String(literal) => Pattern::literal(literal),
            Self::Regex(pattern) => Pattern::compile(pattern),
        }
    }
}

/// `bos_token`/`eos_token` in `tokenizer_config.json` are either plain strings or added-token
/// objects
#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigToken {
    Plain(String),
    Added { content: String },
}

impl ConfigToken {
    fn content(&self) -> &str {
        match self {
            Self::Plain(content) => content,
            Self::Added { content } => content,
        }
    }
}

#[derive(Default, Deserialize)]
struct TokenizerConfigJson {
    #[serde(default)]
    bos_token: Option<ConfigToken>,
    #[serde(default)]
    eos_token: Option<ConfigToken>,
}

/// A tokenizer loaded from a HuggingFace `tokenizer.json`
#[derive(Debug)]
pub struct HfTokenizer {
    pipeline: Pipeline,
}

impl HfTokenizer {
    /// Load from a `tokenizer.json` file, or from a directory containing one.
    ///
    /// When loading from a directory, a `tokenizer_config.json` next to it is used to find the
    /// BOS and EOS tokens.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (json_path, config) = if path.is_dir() {
            let config_path = path.join("tokenizer_config.json");
            let config = if config_path.is_file() {
                Some(read_file(&config_path)?)
            } else {
                None
            };
            (path.join("tokenizer.json"), config)
        } else {
            (path.to_path_buf(), None)
        };

        let json = read_file(&json_path)?;
        let tokenizer = Self::from_slice(&json, config.as_deref())?;
        info!(
            path = %json_path.display(),
            vocab_size = tokenizer.pipeline.vocab().len(),
            special_tokens = tokenizer.pipeline.special_tokens().len(),
            "Loaded HuggingFace tokenizer"
        );

        Ok(tokenizer)
    }

    /// Build from the contents of a `tokenizer.json`, and optionally a `tokenizer_config.json`
    pub fn from_slice(json: &[u8], config: Option<&[u8]>) -> Result<Self> {
        let parsed: TokenizerJson = serde_json::from_slice(json).context(JsonSnafu)?;
        let config: TokenizerConfigJson = match config {
            Some(config) => serde_json::from_slice(config).context(JsonSnafu)?,
            None => TokenizerConfigJson::default(),
        };

        let added = parsed
            .added_tokens
            .iter()
            .map(|token| (token.content.clone(), token.id));
        let (vocab, model) = model(&parsed.model, &parsed.added_tokens)?;
        let special = SpecialTokens::new(added);

        let (bos, eos) = bos_eos(&vocab, &special, &config);
        let template = match &parsed.post_processor {
            Some(value) => post_processor(value, &vocab, &special)?,
            None => Template::default(),
        };

        let pipeline = Pipeline::builder(vocab, model)
            .normalizer(parsed.normalizer.as_ref().map(normalizer).transpose()?)
            .pre_tokenizer(parsed.pre_tokenizer.as_ref().map(pre_tokenizer).transpose()?)
            .decoder(parsed.decoder.as_ref().map(decoder).transpose()?)
            .special_tokens(special)
            .template(template)
            .bos(bos)
            .eos(eos)
            .build()?;

        Ok(Self { pipeline })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

fn fields<T: DeserializeOwned>(value: &Value) -> Result<T> {
    serde_json::from_value(value.clone()).context(JsonSnafu)
}

fn kind_of<'a>(value: &'a Value, component: &'static str) -> Result<&'a str> {
    match value.get("type").and_then(Value::as_str) {
        Some(kind) => Ok(kind),
        None => corrupt(format!("{component} has no type")),
    }
}

fn unsupported<T>(component: &'static str, kind: &str) -> Result<T> {
    UnsupportedConfigSnafu { component, kind }.fail()
}

/// Child components of a `Sequence`, listed under `key`
fn children<T>(
    value: &Value,
    key: &str,
    component: &'static str,
    f: impl Fn(&Value) -> Result<T>,
) -> Result<Vec<T>> {
    match value.get(key).and_then(Value::as_array) {
        Some(items) => items.iter().map(f).collect(),
        None => corrupt(format!("{component} sequence has no '{key}' list")),
    }
}

fn model(value: &Value, added: &[AddedToken]) -> Result<(Vocab, Model)> {
    let kind = match value.get("type").and_then(Value::as_str) {
        Some(kind) => kind,
        // Older files omit the type; BPE is the only model with merges
        None if value.get("merges").is_some() => "BPE",
        None if value.get("vocab").map_or(false, Value::is_array) => "Unigram",
        None => return corrupt("model has no type"),
    };
    let added_pairs = || added.iter().map(|token| (token.content.clone(), token.id));

    match kind {
        "BPE" => {
            let json: BpeJson = fields(value)?;
            for (name, affix) in [
                ("continuing_subword_prefix", &json.continuing_subword_prefix),
                ("end_of_word_suffix", &json.end_of_word_suffix),
            ] {
                if affix.as_deref().map_or(false, |affix| !affix.is_empty()) {
                    return unsupported("BPE model option", name);
                }
            }

            let vocab = Vocab::from_pairs(json.vocab.into_iter().chain(added_pairs()))?;
            let rules = json
                .merges
                .into_iter()
                .map(|merge| match merge {
                    MergeJson::Pair(left, right) => Ok((left, right)),
                    MergeJson::Joined(joined) => match joined.split_once(' ') {
                        Some((left, right)) => Ok((left.to_string(), right.to_string())),
                        None => corrupt(format!("merge rule {joined:?} is not a pair")),
                    },
                })
                .collect::<Result<Vec<_>>>()?;
            let table = BpeModel::merge_table(&vocab, rules)?;
            debug!(merges = table.len(), "Loaded BPE merge table");

            let mut bpe = BpeModel::new(Merges::Ranked(table), SymbolBase::Chars);
            bpe.unk = match &json.unk_token {
                Some(unk) => Some(vocab.id(unk).ok_or_else(|| {
                    CorruptArtifactSnafu {
                        reason: format!("unknown token {unk:?} is not in the vocabulary"),
                    }
                    .build()
                })?),
                None => None,
            };
            bpe.byte_fallback = if json.byte_fallback {
                ByteFallback::from_vocab(&vocab)
            } else {
                None
            };
            bpe.fuse_unk = json.fuse_unk;
            bpe.ignore_merges = json.ignore_merges;

            Ok((vocab, Model::Bpe(bpe)))
        }
        "Unigram" => {
            let json: UnigramJson = fields(value)?;
            let pieces = json
                .vocab
                .iter()
                .enumerate()
                .map(|(id, (piece, _))| (piece.clone(), id));
            let vocab = Vocab::from_pairs(pieces.chain(added_pairs()))?;

            let mut scores = vec![None; vocab.len()];
            for (id, (_, score)) in json.vocab.iter().enumerate() {
                scores[id] = Some(*score as f32);
            }
            // Added tokens are matched before the model sees the text
            for token in added {
                scores[token.id] = None;
            }
            if let Some(unk) = json.unk_id {
                if let Some(score) = scores.get_mut(unk) {
                    *score = None;
                }
            }

            let byte_fallback = if json.byte_fallback {
                ByteFallback::from_vocab(&vocab)
            } else {
                None
            };
            let unigram = Unigram::new(&vocab, scores, json.unk_id, byte_fallback)?;

            Ok((vocab, Model::Unigram(Box::new(unigram))))
        }
        other => unsupported("model", other),
    }
}

fn normalizer(value: &Value) -> Result<Normalizer> {
    #[derive(Deserialize)]
    struct Replace {
        pattern: PatternJson,
        content: String,
    }

    #[derive(Deserialize)]
    struct Prepend {
        prepend: String,
    }

    #[derive(Deserialize)]
    struct Strip {
        #[serde(default)]
        strip_left: bool,
        #[serde(default)]
        strip_right: bool,
    }

    #[derive(Deserialize)]
    struct Bert {
        #[serde(default = "yes")]
        clean_text: bool,
        #[serde(default = "yes")]
        handle_chinese_chars: bool,
        #[serde(default)]
        strip_accents: Option<bool>,
        #[serde(default = "yes")]
        lowercase: bool,
    }

    Ok(match kind_of(value, "normalizer")? {
        "NFC" => Normalizer::Nfc,
        "NFD" => Normalizer::Nfd,
        "NFKC" => Normalizer::Nfkc,
        "NFKD" => Normalizer::Nfkd,
        "Lowercase" => Normalizer::Lowercase,
        "StripAccents" => Normalizer::StripAccents,
        "Replace" => {
            let json: Replace = fields(value)?;
            Normalizer::Replace {
                pattern: json.pattern.compile()?,
                content: json.content,
            }
        }
        "Prepend" => Normalizer::Prepend(fields::<Prepend>(value)?.prepend),
        "Strip" => {
            let json: Strip = fields(value)?;
            Normalizer::Strip {
                left: json.strip_left,
                right: json.strip_right,
            }
        }
        "BertNormalizer" => {
            let json: Bert = fields(value)?;
            Normalizer::Bert {
                clean_text: json.clean_text,
                handle_chinese_chars: json.handle_chinese_chars,
                strip_accents: json.strip_accents,
                lowercase: json.lowercase,
            }
        }
        "Precompiled" => {
            // The compiled charsmap of SentencePiece conversions is an NFKC variant
            warn!("Approximating a precompiled charsmap normalizer with NFKC");
            Normalizer::Nfkc
        }
        "Sequence" => {
            Normalizer::Sequence(children(value, "normalizers", "normalizer", normalizer)?)
        }
        other => return unsupported("normalizer", other),
    })
}

fn split_behavior(behavior: &str) -> Result<SplitBehavior> {
    SplitBehavior::from_str(behavior).or_else(|_| unsupported("split behavior", behavior))
}

fn prepend_scheme(scheme: Option<&str>, add_prefix_space: Option<bool>) -> Result<PrependScheme> {
    match (scheme, add_prefix_space) {
        (Some(scheme), _) => {
            PrependScheme::from_str(scheme).or_else(|_| unsupported("prepend scheme", scheme))
        }
        (None, Some(false)) => Ok(PrependScheme::Never),
        (None, _) => Ok(PrependScheme::Always),
    }
}

#[derive(Deserialize)]
struct MetaspaceJson {
    #[serde(default = "metaspace")]
    replacement: char,
    #[serde(default)]
    prepend_scheme: Option<String>,
    #[serde(default)]
    add_prefix_space: Option<bool>,
    #[serde(default = "yes")]
    split: bool,
}

fn pre_tokenizer(value: &Value) -> Result<PreTokenizer> {
    #[derive(Deserialize)]
    struct Split {
        pattern: PatternJson,
        behavior: String,
        #[serde(default)]
        invert: bool,
    }

    #[derive(Deserialize)]
    struct ByteLevel {
        #[serde(default = "yes")]
        add_prefix_space: bool,
        #[serde(default = "yes")]
        use_regex: bool,
    }

    #[derive(Deserialize)]
    struct Digits {
        #[serde(default)]
        individual_digits: bool,
    }

    #[derive(Deserialize)]
    struct Punctuation {
        #[serde(default = "isolated")]
        behavior: String,
    }

    Ok(match kind_of(value, "pre_tokenizer")? {
        "Split" => {
            let json: Split = fields(value)?;
            PreTokenizer::Split {
                pattern: json.pattern.compile()?,
                behavior: split_behavior(&json.behavior)?,
                invert: json.invert,
            }
        }
        "ByteLevel" => {
            let json: ByteLevel = fields(value)?;
            PreTokenizer::ByteLevel {
                add_prefix_space: json.add_prefix_space,
                use_regex: json.use_regex,
            }
        }
        "Digits" => PreTokenizer::Digits {
            individual_digits: fields::<Digits>(value)?.individual_digits,
        },
        "Whitespace" => PreTokenizer::Whitespace,
        "WhitespaceSplit" => PreTokenizer::WhitespaceSplit,
        "Punctuation" => PreTokenizer::Punctuation {
            behavior: split_behavior(&fields::<Punctuation>(value)?.behavior)?,
        },
        "BertPreTokenizer" => PreTokenizer::Sequence(vec![
            PreTokenizer::WhitespaceSplit,
            PreTokenizer::Punctuation {
                behavior: SplitBehavior::Isolated,
            },
        ]),
        "Metaspace" => {
            let json: MetaspaceJson = fields(value)?;
            PreTokenizer::Metaspace {
                replacement: json.replacement,
                prepend_scheme: prepend_scheme(
                    json.prepend_scheme.as_deref(),
                    json.add_prefix_space,
                )?,
                split: json.split,
            }
        }
        "Sequence" => PreTokenizer::Sequence(children(
            value,
            "pretokenizers",
            "pre_tokenizer",
            pre_tokenizer,
        )?),
        other => return unsupported("pre_tokenizer", other),
    })
}

fn decoder(value: &Value) -> Result<Decoder> {
    #[derive(Deserialize)]
    struct Replace {
        pattern: PatternJson,
        content: String,
    }

    #[derive(Deserialize)]
    struct Strip {
        content: char,
        #[serde(default)]
        start: usize,
        #[serde(default)]
        stop: usize,
    }

    #[derive(Deserialize)]
    struct BpeSuffix {
        #[serde(default = "end_of_word")]
        suffix: String,
    }

    Ok(match kind_of(value, "decoder")? {
        "ByteLevel" => Decoder::ByteLevel,
        "Metaspace" => {
            let json: MetaspaceJson = fields(value)?;
            Decoder::Metaspace {
                replacement: json.replacement,
                prepend_scheme: prepend_scheme(
                    json.prepend_scheme.as_deref(),
                    json.add_prefix_space,
                )?,
            }
        }
        "Replace" => {
            let json: Replace = fields(value)?;
            Decoder::Replace {
                pattern: json.pattern.compile()?,
                content: json.content,
            }
        }
        "ByteFallback" => Decoder::ByteFallback,
        "Fuse" => Decoder::Fuse,
        "Strip" => {
            let json: Strip = fields(value)?;
            Decoder::Strip {
                content: json.content,
                start: json.start,
                stop: json.stop,
            }
        }
        "BPEDecoder" => Decoder::BpeSuffix {
            suffix: fields::<BpeSuffix>(value)?.suffix,
        },
        "Sequence" => Decoder::Sequence(children(value, "decoders", "decoder", decoder)?),
        other => return unsupported("decoder", other),
    })
}

/// Collapse a post-processor into the ids it puts around a single sequence
fn post_processor(value: &Value, vocab: &Vocab, special: &SpecialTokens) -> Result<Template> {
    #[derive(Deserialize)]
    struct Bert {
        sep: (String, TokenInt),
        cls: (String, TokenInt),
    }

    #[derive(Deserialize)]
    enum Item {
        SpecialToken { id: String },
        Sequence { id: String },
    }

    #[derive(Deserialize)]
    struct TemplateSpecial {
        ids: Vec<TokenInt>,
    }

    #[derive(Deserialize)]
    struct TemplateProcessing {
        single: Vec<Item>,
        #[serde(default)]
        special_tokens: HashMap<String, TemplateSpecial>,
    }

    Ok(match kind_of(value, "post_processor")? {
        "ByteLevel" => Template::default(),
        "BertProcessing" | "RobertaProcessing" => {
            let json: Bert = fields(value)?;
            Template {
                prefix: vec![json.cls.1],
                suffix: vec![json.sep.1],
            }
        }
        "TemplateProcessing" => {
            let json: TemplateProcessing = fields(value)?;
            let mut template = Template::default();
            let mut seen_sequence = false;
            for item in json.single {
                match item {
                    Item::Sequence { .. } => seen_sequence = true,
                    Item::SpecialToken { id } => {
                        let ids = match json.special_tokens.get(&id) {
                            Some(entry) => entry.ids.clone(),
                            None => match special.id(&id).or_else(|| vocab.id(&id)) {
                                Some(token) => vec![token],
                                None => {
                                    return corrupt(format!(
                                        "template uses unknown special token {id:?}"
                                    ))
                                }
                            },
                        };
                        if seen_sequence {
                            template.suffix.extend(ids);
                        } else {
                            template.prefix.extend(ids);
                        }
                    }
                }
            }
            template
        }
        "Sequence" => {
            let steps = children(value, "processors", "post_processor", |step| {
                post_processor(step, vocab, special)
            })?;
            // Each processor wraps the output of the one before it
            steps.into_iter().fold(Template::default(), |inner, outer| Template {
                prefix: outer.prefix.into_iter().chain(inner.prefix).collect(),
                suffix: inner.suffix.into_iter().chain(outer.suffix).collect(),
            })
        }
        other => return unsupported("post_processor", other),
    })
}

/// Find the BOS and EOS tokens, from `tokenizer_config.json` when it names them, otherwise by
/// guessing from the names of the special tokens.
fn bos_eos(
    vocab: &Vocab,
    special: &SpecialTokens,
    config: &TokenizerConfigJson,
) -> (Option<TokenInt>, Option<TokenInt>) {
    let lookup = |token: &Option<ConfigToken>, name: &str| {
        let content = token.as_ref()?.content();
        let id = special.id(content).or_else(|| vocab.id(content));
        if id.is_none() {
            warn!(token = content, "{name} token from tokenizer config is not in the vocabulary");
        }
        id
    };
    if let (Some(bos), Some(eos)) = (
        lookup(&config.bos_token, "BOS"),
        lookup(&config.eos_token, "EOS"),
    ) {
        debug!(bos, eos, "Using BOS and EOS from tokenizer config");
        return (Some(bos), Some(eos));
    }

    let guess = |markers: [&str; 2]| {
        let mut candidates: Vec<(&str, TokenInt)> = special
            .iter()
            .filter(|(content, _)| markers.iter().any(|marker| content.contains(marker)))
            .collect();
        if candidates.len() > 1 {
            candidates.retain(|(content, _)| content.contains("text"));
        }
        match candidates.as_slice() {
            [(_, id)] => Some(*id),
            _ => None,
        }
    };
    let (bos, eos) = match (guess(["bos", "begin"]), guess(["eos", "end"])) {
        (Some(bos), None) => (Some(bos), Some(bos)),
        (None, Some(eos)) => (Some(eos), Some(eos)),
        found => found,
    };
    debug!(?bos, ?eos, "Guessed BOS and EOS from special token names");

    (bos, eos)
}

fn yes() -> bool {
    true
}

fn isolated() -> String {
    SplitBehavior::Isolated.to_string()
}

fn metaspace() -> char {
    '▁'
}

fn end_of_word() -> String {
    "</w>".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipetokError;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn load(value: Value) -> Result<HfTokenizer> {
        HfTokenizer::from_slice(value.to_string().as_bytes(), None)
    }

    fn byte_level_bpe() -> Value {
        json!({
            "added_tokens": [
                {"id": 7, "content": "<|endoftext|>", "special": true}
            ],
            "normalizer": null,
            "pre_tokenizer": {"type": "ByteLevel", "add_prefix_space": false, "use_regex": true},
            "post_processor": {"type": "ByteLevel"},
            "decoder": {"type": "ByteLevel"},
            "model": {
                "type": "BPE",
                "vocab": {"h": 0, "i": 1, "Ġ": 2, "hi": 3, "Ġh": 4, "Ġhi": 5, "!": 6},
                "merges": ["h i", ["Ġ", "hi"]]
            }
        })
    }

    #[test]
    fn byte_level_bpe_round_trip() {
        let tokenizer = load(byte_level_bpe()).unwrap();
        let pipeline = tokenizer.pipeline();

        assert_eq!(8, pipeline.vocab().len());
        let ids = pipeline.encode("hi hi!<|endoftext|>", false).unwrap();
        assert_eq!(vec![3, 5, 6, 7], ids);
        assert_eq!("hi hi!<|endoftext|>", pipeline.decode(&ids, false).unwrap());
        assert_eq!("hi hi!", pipeline.decode(&ids, true).unwrap());

        // The only special token is taken as both BOS and EOS
        assert_eq!(Some(7), pipeline.bos());
        assert_eq!(Some(7), pipeline.eos());
    }

    #[test]
    fn split_configs() {
        let mut value = byte_level_bpe();
        value["pre_tokenizer"] = json!({
            "type": "Split",
            "pattern": {"String": "-"},
            "behavior": "MergedWithPrevious",
            "invert": false
        });
        let tokenizer = load(value).unwrap();
        let pieces: Vec<_> = tokenizer
            .pipeline()
            .pre_tokenize("the-final--countdown")
            .unwrap()
            .into_iter()
            .map(|piece| piece.text)
            .collect();
        assert_eq!(vec!["the-", "final-", "-", "countdown"], pieces);

        let mut value = byte_level_bpe();
        value["pre_tokenizer"] = json!({
            "type": "Sequence",
            "pretokenizers": [
                {"type": "Split", "pattern": {"Regex": "-"}, "behavior": "Isolated", "invert": false}
            ]
        });
        let tokenizer = load(value).unwrap();
        let pieces: Vec<_> = tokenizer
            .pipeline()
            .pre_tokenize("the-final--countdown")
            .unwrap()
            .into_iter()
            .map(|piece| piece.text)
            .collect();
        assert_eq!(vec!["the", "-", "final", "-", "-", "countdown"], pieces);
    }

    #[test]
    fn unsupported_components() {
        let mut value = byte_level_bpe();
        value["normalizer"] = json!({"type": "Mystery"});
        let err = load(value).unwrap_err();
        assert_matches!(
            err,
            PipetokError::UnsupportedConfig {
                component: "normalizer",
                ..
            }
        );
        assert_eq!(crate::ErrorCategory::UnsupportedConfig, err.category());

        let mut value = byte_level_bpe();
        value["model"]["type"] = json!("WordLevel");
        assert_matches!(load(value), Err(PipetokError::UnsupportedConfig { .. }));

        let mut value = byte_level_bpe();
        value["pre_tokenizer"] = json!({
            "type": "Split",
            "pattern": {"String": "-"},
            "behavior": "Sideways"
        });
        assert_matches!(load(value), Err(PipetokError::UnsupportedConfig { .. }));
    }

    #[test]
    fn malformed_artifacts() {
        assert_matches!(
            HfTokenizer::from_slice(b"{\"model\": ", None),
            Err(PipetokError::Json { .. })
        );

        let mut value = byte_level_bpe();
        value["model"]["merges"] = json!(["h x"]);
        assert_matches!(load(value), Err(PipetokError::CorruptArtifact { .. }));

        let mut value = byte_level_bpe();
        value["pre_tokenizer"] = json!({
            "type": "Split",
            "pattern": {"Regex": "(unclosed"},
            "behavior": "Isolated"
        });
        assert_matches!(load(value), Err(PipetokError::InvalidPattern { .. }));
    }

    fn llama_like() -> Value {
        json!({
            "added_tokens": [
                {"id": 0, "content": "<unk>", "special": true},
                {"id": 1, "content": "<s>", "special": true},
                {"id": 2, "content": "</s>", "special": true}
            ],
            "normalizer": {
                "type": "Sequence",
                "normalizers": [
                    {"type": "Prepend", "prepend": "▁"},
                    {"type": "Replace", "pattern": {"String": " "}, "content": "▁"}
                ]
            },
            "pre_tokenizer": null,
            "post_processor": {
                "type": "TemplateProcessing",
                "single": [
                    {"SpecialToken": {"id": "<s>", "type_id": 0}},
                    {"Sequence": {"id": "A", "type_id": 0}}
                ],
                "special_tokens": {"<s>": {"id": "<s>", "ids": [1], "tokens": ["<s>"]}}
            },
            "decoder": {
                "type": "Sequence",
                "decoders": [
                    {"type": "Replace", "pattern": {"String": "▁"}, "content": " "},
                    {"type": "ByteFallback"},
                    {"type": "Fuse"},
                    {"type": "Strip", "content": " ", "start": 1, "stop": 0}
                ]
            },
            "model": {
                "type": "BPE",
                "unk_token": "<unk>",
                "byte_fallback": true,
                "fuse_unk": true,
                "vocab": {
                    "<unk>": 0, "<s>": 1, "</s>": 2, "<0x0A>": 3,
                    "▁": 4, "h": 5, "i": 6, "▁h": 7, "▁hi": 8
                },
                "merges": ["▁ h", "▁h i"]
            }
        })
    }

    #[test]
    fn sentencepiece_style_bpe() {
        let tokenizer = load(llama_like()).unwrap();
        let pipeline = tokenizer.pipeline();

        let ids = pipeline.encode("hi hi\n", true).unwrap();
        assert_eq!(vec![1, 8, 8, 3], ids);
        assert_eq!("<s>hi hi\n", pipeline.decode(&ids, false).unwrap());
        assert_eq!("hi hi\n", pipeline.decode(&ids, true).unwrap());

        // 'x' has no token and no byte token, so it becomes <unk>
        assert_eq!(vec![8, 0], pipeline.encode("hixx", false).unwrap());

        // Neither name says which is which, and there is no config to ask
        assert_eq!(None, pipeline.bos());
        assert_eq!(None, pipeline.eos());
    }

    #[test]
    fn config_names_bos_and_eos() {
        let config = json!({
            "bos_token": {"content": "</s>", "lstrip": false},
            "eos_token": "<s>"
        });
        let tokenizer = HfTokenizer::from_slice(
            llama_like().to_string().as_bytes(),
            Some(config.to_string().as_bytes()),
        )
        .unwrap();

        assert_eq!(Some(2), tokenizer.pipeline().bos());
        assert_eq!(Some(1), tokenizer.pipeline().eos());
    }

    #[test]
    fn guesses_bos_and_eos_from_names() {
        let mut value = byte_level_bpe();
        value["added_tokens"] = json!([
            {"id": 7, "content": "<|begin_of_text|>", "special": true},
            {"id": 8, "content": "<|end_of_text|>", "special": true},
            {"id": 9, "content": "<|end_header|>", "special": true}
        ]);
        let tokenizer = load(value).unwrap();

        assert_eq!(Some(7), tokenizer.pipeline().bos());
        assert_eq!(Some(8), tokenizer.pipeline().eos());
    }

    #[test]
    fn unigram_model() {
        let value = json!({
            "added_tokens": [{"id": 0, "content": "<unk>", "special": true}],
            "normalizer": {"type": "Replace", "pattern": {"String": " "}, "content": "▁"},
            "pre_tokenizer": {"type": "Metaspace", "replacement": "▁", "prepend_scheme": "always", "split": true},
            "post_processor": null,
            "decoder": {"type": "Metaspace", "replacement": "▁", "prepend_scheme": "always"},
            "model": {
                "type": "Unigram",
                "unk_id": 0,
                "vocab": [["<unk>", 0.0], ["▁", -2.0], ["▁he", -1.0], ["llo", -1.0], ["▁hello", -1.5], ["h", -3.0]]
            }
        });
        let tokenizer = load(value).unwrap();
        let pipeline = tokenizer.pipeline();

        let ids = pipeline.encode("hello hello", true).unwrap();
        assert_eq!(vec![4, 4], ids);
        assert_eq!("hello hello", pipeline.decode(&ids, false).unwrap());
    }

    #[test]
    fn bert_style_template() {
        let mut value = byte_level_bpe();
        value["added_tokens"] = json!([
            {"id": 7, "content": "[CLS]", "special": true},
            {"id": 8, "content": "[SEP]", "special": true}
        ]);
        value["post_processor"] = json!({
            "type": "Sequence",
            "processors": [
                {"type": "ByteLevel"},
                {"type": "BertProcessing", "sep": ["[SEP]", 8], "cls": ["[CLS]", 7]}
            ]
        });
        let tokenizer = load(value).unwrap();

        assert_eq!(vec![7, 3, 8], tokenizer.pipeline().encode("hi", true).unwrap());
    }

    #[test]
    fn load_from_directory() {
        crate::test_helpers::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), llama_like().to_string()).unwrap();
        std::fs::write(
            dir.path().join("tokenizer_config.json"),
            json!({"bos_token": "<s>", "eos_token": "</s>"}).to_string(),
        )
        .unwrap();

        let tokenizer = HfTokenizer::load(dir.path()).unwrap();
        assert_eq!(Some(1), tokenizer.pipeline().bos());

        assert_matches!(
            HfTokenizer::load(dir.path().join("missing.json")),
            Err(PipetokError::FileIo { .. })
        );
    }
}
