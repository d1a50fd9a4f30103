//! Unigram language-model segmentation, as used by SentencePiece and HuggingFace `Unigram` models.
use crate::error::*;
use crate::vocab::ByteFallback;
use crate::{Result, TokenInt, Vocab};
use std::fmt::Debug;
use std::ops::Range;

/// Penalty applied to the score of an unknown character relative to the worst scoring piece
const UNK_PENALTY: f32 = 10.0;

/// Segments text into vocabulary pieces.
///
/// The pipeline only relies on this capability, so a different unigram implementation can be
/// plugged in behind it.
pub trait UnigramModel: Debug + Send + Sync {
    /// Split `text` into pieces, returning each piece's byte range within `text` and its token id.
    /// A character spelled out with byte tokens yields several ids sharing one range.
    fn segment(&self, vocab: &Vocab, text: &str) -> Result<Vec<(Range<usize>, TokenInt)>>;
}

/// Viterbi search for the segmentation with the highest total score
#[derive(Clone, Debug)]
pub struct Unigram {
    /// Log probability of each token by id, or `None` for tokens that segmentation never
    /// produces, such as control tokens
    scores: Vec<Option<f32>>,
    unk: Option<TokenInt>,
    byte_fallback: Option<ByteFallback>,

    unk_score: f32,

    /// Length in characters of the longest matchable piece
    max_piece_chars: usize,
}

impl Unigram {
    pub fn new(
        vocab: &Vocab,
        scores: Vec<Option<f32>>,
        unk: Option<TokenInt>,
        byte_fallback: Option<ByteFallback>,
    ) -> Result<Self> {
        if scores.len() != vocab.len() {
            return corrupt(format!(
                "unigram model has {} scores for {} tokens",
                scores.len(),
                vocab.len()
            ));
        }
        if let Some(unk) = unk {
            if unk >= vocab.len() {
                return corrupt(format!("unknown token id {unk} is not in the vocabulary"));
            }
        }

        let min_score = scores
            .iter()
            .flatten()
            .copied()
            .fold(f32::INFINITY, f32::min);
        let max_piece_chars = vocab
            .iter()
            .filter(|(id, _)| scores[*id].is_some())
            .map(|(_, token)| String::from_utf8_lossy(token).chars().count())
            .max()
            .unwrap_or(1);

        Ok(Self {
            scores,
            unk,
            byte_fallback,
            unk_score: if min_score.is_finite() { min_score } else { 0.0 } - UNK_PENALTY,
            max_piece_chars,
        })
    }

    fn score(&self, id: TokenInt) -> Option<f32> {
        self.scores.get(id).copied().flatten()
    }
}

/// The best way found so far to segment the text up to some position
#[derive(Clone, Copy)]
struct Best {
    score: f32,
    start: usize,
    /// `None` for a single unknown character
    id: Option<TokenInt>,
}

impl UnigramModel for Unigram {
    fn segment(&self, vocab: &Vocab, text: &str) -> Result<Vec<(Range<usize>, TokenInt)>> {
        let mut best: Vec<Option<Best>> = vec![None; text.len() + 1];
        best[0] = Some(Best {
            score: 0.0,
            start: 0,
            id: None,
        });

        for (start, c) in text.char_indices() {
            let Some(reached) = best[start] else {
                continue;
            };

            let mut single_char_known = false;
            let mut end = start;
            for (i, next) in text[start..].chars().take(self.max_piece_chars).enumerate() {
                end += next.len_utf8();
                let Some((id, score)) = vocab
                    .id(&text[start..end])
                    .and_then(|id| Some((id, self.score(id)?)))
                else {
                    continue;
                };
                single_char_known |= i == 0;

                let score = reached.score + score;
                if best[end].map_or(true, |b| score > b.score) {
                    best[end] = Some(Best {
                        score,
                        start,
                        id: Some(id),
                    });
                }
            }

            if !single_char_known {
                let end = start + c.len_utf8();
                let score = reached.score + self.unk_score;
                if best[end].map_or(true, |b| score > b.score) {
                    best[end] = Some(Best {
                        score,
                        start,
                        id: None,
                    });
                }
            }
        }

        // Every character has at least the unknown path, so the end is always reachable
        let mut path = Vec::new();
        let mut end = text.len();
        while end > 0 {
            let Some(step) = best[end] else {
                return corrupt("unigram lattice has no path to the end of the text");
            };
            path.push((step.start..end, step.id));
            end = step.start;
        }
        path.reverse();

        let mut out = Vec::with_capacity(path.len());
        let mut previous_unk = false;
        for (range, id) in path {
            if let Some(id) = id {
                out.push((range, id));
                previous_unk = false;
                continue;
            }

            let bytes = &text.as_bytes()[range.clone()];
            let fallback: Option<Vec<TokenInt>> = self
                .byte_fallback
                .as_ref()
                .and_then(|fallback| bytes.iter().map(|&b| fallback.id(b)).collect());
            match (fallback, self.unk) {
                (Some(ids), _) => {
                    out.extend(ids.into_iter().map(|id| (range.clone(), id)));
                    previous_unk = false;
                }
                (None, Some(unk)) => {
                    // Consecutive unknown characters become a single unknown token
                    match out.last_mut() {
                        Some((last, _)) if previous_unk => last.end = range.end,
                        _ => out.push((range, unk)),
                    }
                    previous_unk = true;
                }
                (None, None) => {
                    return UnknownTokenSnafu {
                        symbol: &text[range],
                    }
                    .fail();
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn model(unk: Option<TokenInt>) -> (Unigram, Vocab) {
        let vocab = Vocab::from_tokens(["<unk>", "a", "b", "ab", "abc", "c", "<ctrl>"]).unwrap();
        let scores = vec![
            None,
            Some(-1.0),
            Some(-1.0),
            Some(-1.5),
            Some(-5.0),
            Some(-1.0),
            None,
        ];
        let unigram = Unigram::new(&vocab, scores, unk, None).unwrap();
        (unigram, vocab)
    }

    fn ids(model: &Unigram, vocab: &Vocab, text: &str) -> Vec<TokenInt> {
        model
            .segment(vocab, text)
            .unwrap()
            .into_iter()
            .map(|(_, id)| id)
            .collect()
    }

    #[test]
    fn picks_highest_scoring_segmentation() {
        let (model, vocab) = model(Some(0));

        assert_eq!(vec![3, 5], ids(&model, &vocab, "abc"));
        assert_eq!(vec![3, 3], ids(&model, &vocab, "abab"));
        assert!(ids(&model, &vocab, "").is_empty());
    }

    #[test]
    fn ranges_cover_the_text() {
        let (model, vocab) = model(Some(0));

        assert_eq!(
            vec![(0..2, 3), (2..3, 5)],
            model.segment(&vocab, "abc").unwrap()
        );
    }

    #[test]
    fn unknown_runs_are_fused() {
        let (model, vocab) = model(Some(0));

        assert_eq!(vec![1, 0, 2], ids(&model, &vocab, "axyb"));
        assert_eq!(
            vec![(0..1, 1), (1..4, 0)],
            model.segment(&vocab, "aéz").unwrap()
        );
    }

    #[test]
    fn control_tokens_are_never_matched() {
        let (model, vocab) = model(Some(0));

        assert_eq!(vec![0, 5, 0], ids(&model, &vocab, "<ctrl>"));
    }

    #[test]
    fn unknown_without_unk_token_fails() {
        let (model, vocab) = model(None);

        assert_matches!(
            model.segment(&vocab, "ax"),
            Err(crate::PipetokError::UnknownToken { .. })
        );
    }

    #[test]
    fn byte_fallback_for_unknown_chars() {
        let vocab = Vocab::from_tokens(["<unk>", "a", "<0xC3>", "<0xA9>"]).unwrap();
        let scores = vec![None, Some(-1.0), Some(0.0), Some(0.0)];
        let model = Unigram::new(&vocab, scores, Some(0), ByteFallback::from_vocab(&vocab)).unwrap();

        assert_eq!(vec![1, 2, 3], ids(&model, &vocab, "aé"));
    }

    #[test]
    fn score_count_must_match_vocab() {
        let vocab = Vocab::from_tokens(["a"]).unwrap();

        assert_matches!(
            Unigram::new(&vocab, vec![], None, None),
            Err(crate::PipetokError::CorruptArtifact { .. })
        );
    }
}
