//! Implementation of BPE (byte pair encoding) as it relates to encoding pieces of text as tokens.
//!
//! All formats share one merge loop, [`byte_pair_merge`].  What differs between them is how a
//! pair of adjacent symbols is judged, which is captured by the [`MergePolicy`] they plug in:
//!
//! * HuggingFace BPE models carry an explicit merge table, where a lower rank is applied first.
//! * tiktoken has no merge table.  Any two symbols whose concatenation is a token can merge, and
//!   the merged token's id is its rank.
//! * llama2.c and SentencePiece BPE models merge into the token with the highest score.
use crate::error::*;
use crate::vocab::{ByteFallback, HashMap};
use crate::{Result, TokenInt, Vocab};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::ops::Range;

/// A symbol in a piece being merged: a byte range of the piece, and the id of the token spelled
/// by those bytes, if there is one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Part {
    pub range: Range<usize>,
    pub id: Option<TokenInt>,
}

/// Decides whether two adjacent symbols can merge, and how urgently.
pub trait MergePolicy {
    /// Merge priority.  Of all candidate merges, the one with the greatest priority is applied
    /// first, and ties go to the leftmost pair.
    type Priority: Ord + Copy;

    /// If `left` and `right` can merge, the priority of doing so and the id of the merged token.
    fn merge(&self, piece: &[u8], left: &Part, right: &Part) -> Option<(Self::Priority, TokenInt)>;
}

/// An explicit table of merge rules, keyed on the ids of the two symbols and yielding the rank of
/// the rule and the id of the merged token.
pub type MergeTable = HashMap<(TokenInt, TokenInt), (u32, TokenInt)>;

/// Merges in the order given by an explicit merge table
pub struct RankedMerges<'a>(pub &'a MergeTable);

impl<'a> MergePolicy for RankedMerges<'a> {
    type Priority = Reverse<u32>;

    fn merge(&self, _piece: &[u8], left: &Part, right: &Part) -> Option<(Self::Priority, TokenInt)> {
        self.0
            .get(&(left.id?, right.id?))
            .map(|&(rank, id)| (Reverse(rank), id))
    }
}

/// Merges any pair whose concatenation is in the vocabulary, lowest id first
pub struct VocabRankMerges<'a>(pub &'a Vocab);

impl<'a> MergePolicy for VocabRankMerges<'a> {
    type Priority = Reverse<TokenInt>;

    fn merge(&self, piece: &[u8], left: &Part, right: &Part) -> Option<(Self::Priority, TokenInt)> {
        let id = self.0.id(&piece[left.range.start..right.range.end])?;
        Some((Reverse(id), id))
    }
}

/// Merges any pair whose concatenation is in the vocabulary, highest scoring token first
pub struct ScoredMerges<'a> {
    pub vocab: &'a Vocab,
    pub scores: &'a [f32],
}

impl<'a> MergePolicy for ScoredMerges<'a> {
    type Priority = Score;

    fn merge(&self, piece: &[u8], left: &Part, right: &Part) -> Option<(Self::Priority, TokenInt)> {
        let id = self.vocab.id(&piece[left.range.start..right.range.end])?;
        let score = self.scores.get(id).copied().unwrap_or(f32::NEG_INFINITY);
        Some((Score(score), id))
    }
}

/// A token score with a total order, so it can rank merges
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Score(pub f32);

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

struct Node {
    part: Part,
    prev: Option<usize>,
    next: Option<usize>,
    alive: bool,
}

/// A merge found at some point during the loop.  It goes stale if either symbol has changed
/// since, which is detected by comparing the right symbol's end and the left symbol's neighbor.
#[derive(PartialEq, Eq)]
struct Candidate<P> {
    priority: P,
    left: usize,
    right: usize,
    right_end: usize,
    id: TokenInt,
}

impl<P: Ord> Ord for Candidate<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Node indices follow position and a surviving node never moves, so the smaller left
        // index is the leftmost pair
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.left.cmp(&self.left))
    }
}

impl<P: Ord> PartialOrd for Candidate<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn push_candidate<P: MergePolicy>(
    policy: &P,
    piece: &[u8],
    nodes: &[Node],
    left: usize,
    right: usize,
    heap: &mut BinaryHeap<Candidate<P::Priority>>,
) {
    if let Some((priority, id)) = policy.merge(piece, &nodes[left].part, &nodes[right].part) {
        heap.push(Candidate {
            priority,
            left,
            right,
            right_end: nodes[right].part.range.end,
            id,
        });
    }
}

/// Repeatedly merge the best pair of adjacent symbols in `parts` until no pair can merge.
///
/// Symbols live in a linked list and candidate merges in a priority queue.  Each merge
/// invalidates at most two queued candidates and adds at most two, so a piece of `n` symbols
/// takes `O(n log n)` rather than the `O(n^2)` of rescanning every pair after each merge.
pub fn byte_pair_merge<P: MergePolicy>(policy: &P, piece: &[u8], parts: Vec<Part>) -> Vec<Part> {
    let n = parts.len();
    if n < 2 {
        return parts;
    }

    let mut nodes: Vec<Node> = parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| Node {
            part,
            prev: i.checked_sub(1),
            next: (i + 1 < n).then_some(i + 1),
            alive: true,
        })
        .collect();

    let mut heap = BinaryHeap::with_capacity(n);
    for left in 0..n - 1 {
        push_candidate(policy, piece, &nodes, left, left + 1, &mut heap);
    }

    while let Some(candidate) = heap.pop() {
        let left = &nodes[candidate.left];
        if !left.alive
            || left.next != Some(candidate.right)
            || nodes[candidate.right].part.range.end != candidate.right_end
        {
            continue;
        }

        // The left node absorbs the right one
        let next = nodes[candidate.right].next;
        nodes[candidate.right].alive = false;
        let left = &mut nodes[candidate.left];
        left.part.range.end = candidate.right_end;
        left.part.id = Some(candidate.id);
        left.next = next;
        let prev = left.prev;

        if let Some(next) = next {
            nodes[next].prev = Some(candidate.left);
            push_candidate(policy, piece, &nodes, candidate.left, next, &mut heap);
        }
        if let Some(prev) = prev {
            push_candidate(policy, piece, &nodes, prev, candidate.left, &mut heap);
        }
    }

    let mut out = Vec::with_capacity(n);
    let mut cursor = Some(0);
    while let Some(i) = cursor {
        out.push(nodes[i].part.clone());
        cursor = nodes[i].next;
    }

    out
}

/// How a BPE model decides which pairs to merge
#[derive(Clone, Debug)]
pub enum Merges {
    Ranked(MergeTable),
    VocabRank,
    /// Scores of every token, indexed by id
    Scored(Vec<f32>),
}

/// The smallest units a piece is broken into before merging
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolBase {
    Bytes,
    Chars,
}

/// A BPE model: merge strategy plus the rules for symbols that end up with no token.
#[derive(Clone, Debug)]
pub struct BpeModel {
    pub merges: Merges,
    pub base: SymbolBase,

    /// Spell out unknown symbols with `<0xNN>` byte tokens
    pub byte_fallback: Option<ByteFallback>,
    pub unk: Option<TokenInt>,

    /// Collapse runs of consecutive unknown symbols into a single unknown token
    pub fuse_unk: bool,

    /// Emit a piece as one token, without merging, when the whole piece is in the vocabulary
    pub ignore_merges: bool,
}

impl BpeModel {
    pub fn new(merges: Merges, base: SymbolBase) -> Self {
        Self {
            merges,
            base,
            byte_fallback: None,
            unk: None,
            fuse_unk: false,
            ignore_merges: false,
        }
    }

    /// Build a merge table from merge rules given as pairs of token strings, in rank order.
    ///
    /// Every rule must join two tokens of the vocabulary into a third.
    pub fn merge_table<Iter, S>(vocab: &Vocab, rules: Iter) -> Result<MergeTable>
    where
        Iter: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut table = MergeTable::default();
        for (rank, (left, right)) in rules.into_iter().enumerate() {
            let (left, right) = (left.as_ref(), right.as_ref());
            let merged = format!("{left}{right}");
            let lookup = |token: &str| {
                vocab.id(token).ok_or_else(|| {
                    CorruptArtifactSnafu {
                        reason: format!(
                            "merge rule {rank} ({left:?}, {right:?}) uses {token:?}, which isn't in the vocabulary"
                        ),
                    }
                    .build()
                })
            };
            let key = (lookup(left)?, lookup(right)?);
            let merged = lookup(&merged)?;
            let rank = u32::try_from(rank).map_err(|_| {
                CorruptArtifactSnafu {
                    reason: "too many merge rules",
                }
                .build()
            })?;

            // As in the reference implementation, a repeated pair keeps its first rank
            table.entry(key).or_insert((rank, merged));
        }

        Ok(table)
    }

    /// Encode one pre-tokenized piece, appending its token ids to `out`
    pub fn encode_piece(&self, vocab: &Vocab, piece: &str, out: &mut Vec<TokenInt>) -> Result<()> {
        let bytes = piece.as_bytes();
        if bytes.is_empty() {
            return Ok(());
        }

        // tiktoken always short-circuits whole-piece tokens, which is only equivalent to merging
        // when merge priority is vocabulary order
        if self.ignore_merges || matches!(self.merges, Merges::VocabRank) {
            if let Some(id) = vocab.id(bytes) {
                out.push(id);
                return Ok(());
            }
        }

        let parts: Vec<Part> = match self.base {
            SymbolBase::Bytes => (0..bytes.len())
                .map(|i| Part {
                    range: i..i + 1,
                    id: vocab.id(&bytes[i..i + 1]),
                })
                .collect(),
            SymbolBase::Chars => piece
                .char_indices()
                .map(|(i, c)| {
                    let range = i..i + c.len_utf8();
                    Part {
                        id: vocab.id(&bytes[range.clone()]),
                        range,
                    }
                })
                .collect(),
        };

        let parts = match &self.merges {
            Merges::Ranked(table) => byte_pair_merge(&RankedMerges(table), bytes, parts),
            Merges::VocabRank => byte_pair_merge(&VocabRankMerges(vocab), bytes, parts),
            Merges::Scored(scores) => byte_pair_merge(&ScoredMerges { vocab, scores }, bytes, parts),
        };

        let mut previous_unk = false;
        for part in parts {
            if let Some(id) = part.id {
                out.push(id);
                previous_unk = false;
                continue;
            }

            let symbol = &bytes[part.range];
            if let Some(ids) = self.byte_fallback_ids(symbol) {
                out.extend(ids);
                previous_unk = false;
            } else if let Some(unk) = self.unk {
                if !(self.fuse_unk && previous_unk) {
                    out.push(unk);
                }
                previous_unk = true;
            } else {
                return UnknownTokenSnafu {
                    symbol: String::from_utf8_lossy(symbol),
                }
                .fail();
            }
        }

        Ok(())
    }

    /// The byte tokens spelling out `symbol`, if every one of its bytes has one
    fn byte_fallback_ids(&self, symbol: &[u8]) -> Option<Vec<TokenInt>> {
        let fallback = self.byte_fallback.as_ref()?;
        symbol.iter().map(|&b| fallback.id(b)).collect()
    }
}
