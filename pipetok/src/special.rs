//! Special tokens are matched verbatim against the raw input before anything else happens to it.
use crate::iterator::Segments;
use crate::TokenInt;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use rustc_hash::FxHashSet as HashSet;

/// The special token strings of a tokenizer and their ids.
///
/// Matching is leftmost-longest, so when one special token is a prefix of another (`<|end|>` vs
/// `<|endoftext|>`) the longer one wins.
#[derive(Clone, Debug, Default)]
pub struct SpecialTokens {
    tokens: Vec<(String, TokenInt)>,
    ids: HashSet<TokenInt>,

    /// A/C automaton for finding special tokens in text.  `None` if there are no special tokens.
    finder: Option<AhoCorasick>,
}

impl SpecialTokens {
    /// Empty strings are ignored, and when a string is listed twice the last id wins.
    pub fn new(tokens: impl IntoIterator<Item = (String, TokenInt)>) -> Self {
        let mut deduped: Vec<(String, TokenInt)> = Vec::new();
        for (content, id) in tokens {
            if content.is_empty() {
                continue;
            }
            match deduped.iter_mut().find(|(existing, _)| *existing == content) {
                Some(entry) => entry.1 = id,
                None => deduped.push((content, id)),
            }
        }

        let finder = (!deduped.is_empty()).then(|| {
            AhoCorasickBuilder::new()
                .match_kind(MatchKind::LeftmostLongest)
                .dfa(true)
                .build(deduped.iter().map(|(content, _)| content.as_bytes()))
        });

        Self {
            ids: deduped.iter().map(|(_, id)| *id).collect(),
            tokens: deduped,
            finder,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The special token strings and their ids
    pub fn iter(&self) -> impl Iterator<Item = (&str, TokenInt)> {
        self.tokens.iter().map(|(content, id)| (content.as_str(), *id))
    }

    /// The id of the special token spelled exactly `content`
    pub fn id(&self, content: &str) -> Option<TokenInt> {
        self.tokens
            .iter()
            .find(|(existing, _)| existing == content)
            .map(|(_, id)| *id)
    }

    pub fn contains_id(&self, id: TokenInt) -> bool {
        self.ids.contains(&id)
    }

    pub(crate) fn id_at(&self, pattern_index: usize) -> TokenInt {
        self.tokens[pattern_index].1
    }

    /// Search the given input text for special tokens, returning an iterator over every special
    /// token string found.
    ///
    /// If you just need to know if there are any special tokens in the text, you can call
    /// [`Iterator::any`]
    pub fn find_iter<'a, 't>(&'a self, text: &'t str) -> impl Iterator<Item = &'t str> + 'a
    where
        't: 'a,
    {
        self.finder
            .iter()
            .flat_map(move |finder| finder.find_iter(text))
            .map(move |m| &text[m.start()..m.end()])
    }

    /// Split `text` into ordinary text and special tokens, in order
    pub fn segments<'a, 't>(&'a self, text: &'t str) -> Segments<'a, 't> {
        Segments::new(
            self,
            self.finder.as_ref().map(|finder| finder.find_iter(text)),
            text,
        )
    }
}
