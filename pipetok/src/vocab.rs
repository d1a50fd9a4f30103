//! The vocabulary maps token byte strings to dense integer ids and back.
//!
//! The choice of hash function has a big impact on performance, since a lookup happens for every
//! candidate merge.  FxHash is much faster than the default SipHash on the short keys found in
//! tokenizer vocabularies.
use crate::error::corrupt;
use crate::{Result, TokenInt, TokenString};

pub(crate) use rustc_hash::FxHashMap as HashMap;

/// Bidirectional mapping between token byte strings and their ids.
///
/// Every id in `0..len()` has exactly one token string and every token string has exactly one id.
/// Constructors enforce this and fail with a corrupt-artifact error otherwise, so a `Vocab` is
/// always consistent.
#[derive(Clone, Debug)]
pub struct Vocab {
    tokens: Vec<TokenString>,
    ids: HashMap<TokenString, TokenInt>,

    /// The mean length of a token in bytes, used to estimate how many tokens a text will produce
    mean_token_len: usize,
}

impl Vocab {
    /// Build a vocabulary where each token's id is its position in `tokens`.
    pub fn from_tokens<Iter, Bytes>(tokens: Iter) -> Result<Self>
    where
        Iter: IntoIterator<Item = Bytes>,
        Bytes: Into<TokenString>,
    {
        let tokens: Vec<TokenString> = tokens.into_iter().map(Into::into).collect();

        let mut ids = HashMap::default();
        ids.reserve(tokens.len());
        for (id, token) in tokens.iter().enumerate() {
            if let Some(previous) = ids.insert(token.clone(), id) {
                return corrupt(format!(
                    "token {:?} has both id {previous} and id {id}",
                    String::from_utf8_lossy(token)
                ));
            }
        }

        Ok(Self::with_lookup(tokens, ids))
    }

    /// Build a vocabulary from explicit `(token, id)` pairs in any order.
    ///
    /// The same pair may be listed more than once, which happens when a format declares a token
    /// both in its model vocabulary and in its list of added tokens.  Once duplicates are removed
    /// the ids must cover `0..n` without gaps.
    pub fn from_pairs<Iter, Bytes>(pairs: Iter) -> Result<Self>
    where
        Iter: IntoIterator<Item = (Bytes, TokenInt)>,
        Bytes: Into<TokenString>,
    {
        let mut ids: HashMap<TokenString, TokenInt> = HashMap::default();
        for (token, id) in pairs {
            let token = token.into();
            match ids.get(&token) {
                Some(&existing) if existing != id => {
                    return corrupt(format!(
                        "token {:?} has both id {existing} and id {id}",
                        String::from_utf8_lossy(&token)
                    ));
                }
                Some(_) => {}
                None => {
                    ids.insert(token, id);
                }
            }
        }

        // With n distinct tokens, ids that are all below n and never collide fill every slot
        let mut slots: Vec<Option<TokenString>> = vec![None; ids.len()];
        for (token, &id) in &ids {
            let Some(slot) = slots.get_mut(id) else {
                return corrupt(format!(
                    "token id {id} is out of range for a vocabulary of {} tokens",
                    ids.len()
                ));
            };
            if let Some(other) = slot {
                return corrupt(format!(
                    "id {id} is assigned to both {:?} and {:?}",
                    String::from_utf8_lossy(other),
                    String::from_utf8_lossy(token)
                ));
            }
            *slot = Some(token.clone());
        }
        let tokens = slots.into_iter().flatten().collect();

        Ok(Self::with_lookup(tokens, ids))
    }

    fn with_lookup(tokens: Vec<TokenString>, ids: HashMap<TokenString, TokenInt>) -> Self {
        let total: usize = tokens.iter().map(Vec::len).sum();
        let mean_token_len = (total / tokens.len().max(1)).max(1);

        Self {
            tokens,
            ids,
            mean_token_len,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The id of the token with exactly these bytes, if there is one
    pub fn id(&self, bytes: impl AsRef<[u8]>) -> Option<TokenInt> {
        self.ids.get(bytes.as_ref()).copied()
    }

    /// The bytes of the token with this id, or `None` if the id is out of range
    pub fn token(&self, id: TokenInt) -> Option<&[u8]> {
        self.tokens.get(id).map(Vec::as_slice)
    }

    /// All tokens, in id order
    pub fn iter(&self) -> impl Iterator<Item = (TokenInt, &[u8])> {
        self.tokens.iter().map(Vec::as_slice).enumerate()
    }

    /// Make an educated guess as to the number of tokens `text` will encode to.
    ///
    /// This is only useful for pre-allocating output buffers.
    pub fn estimate_num_tokens(&self, text: &str) -> usize {
        text.len() / self.mean_token_len
    }
}

/// Ids of the `<0x00>`..`<0xFF>` tokens that byte-fallback vocabularies use to spell out bytes
/// that have no token of their own.
#[derive(Clone, Debug)]
pub struct ByteFallback([Option<TokenInt>; 256]);

impl ByteFallback {
    /// Collect the byte tokens present in `vocab`, or `None` if it doesn't have any.
    pub fn from_vocab(vocab: &Vocab) -> Option<Self> {
        let mut ids = [None; 256];
        let mut found = 0;
        for (byte, slot) in ids.iter_mut().enumerate() {
            *slot = vocab.id(format!("<0x{byte:02X}>"));
            found += usize::from(slot.is_some());
        }

        (found > 0).then_some(Self(ids))
    }

    pub fn id(&self, byte: u8) -> Option<TokenInt> {
        self.0[byte as usize]
    }

    /// If `token` is a byte token like `<0x0A>`, the byte it stands for
    pub fn byte_of(token: &[u8]) -> Option<u8> {
        let hex = token.strip_prefix(b"<0x")?.strip_suffix(b">")?;
        if hex.len() != 2 {
            return None;
        }

        u8::from_str_radix(std::str::from_utf8(hex).ok()?, 16).ok()
    }
}
