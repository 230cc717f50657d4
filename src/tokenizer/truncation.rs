// src/tokenizer/truncation.rs

use serde::{Deserialize, Serialize};

use crate::tokenizer::{Encoding, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TruncationDirection {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TruncationStrategy {
    /// Remove tokens from the longest sequence until the total fits.
    #[default]
    LongestFirst,
    OnlyFirst,
    OnlySecond,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationParams {
    #[serde(default)]
    pub direction: TruncationDirection,
    pub max_length: usize,
    pub strategy: TruncationStrategy,
    pub stride: usize,
}

impl Default for TruncationParams {
    fn default() -> Self {
        Self {
            max_length: 512,
            strategy: TruncationStrategy::default(),
            stride: 0,
            direction: TruncationDirection::default(),
        }
    }
}

/// Truncate a sequence (and its optional pair) so that together they fit in
/// `params.max_length` tokens.
pub fn truncate_encodings(
    mut encoding: Encoding,
    mut pair_encoding: Option<Encoding>,
    params: &TruncationParams,
) -> Result<(Encoding, Option<Encoding>)> {
    if params.max_length == 0 {
        encoding.truncate(0, params.stride, params.direction)?;
        if let Some(other) = pair_encoding.as_mut() {
            other.truncate(0, params.stride, params.direction)?;
        }
        return Ok((encoding, pair_encoding));
    }

    let total_length = encoding.len() + pair_encoding.as_ref().map_or(0, |e| e.len());
    if total_length <= params.max_length {
        return Ok((encoding, pair_encoding));
    }
    let to_remove = total_length - params.max_length;

    match params.strategy {
        TruncationStrategy::LongestFirst => match pair_encoding.as_mut() {
            Some(other) => {
                let (n1, n2) =
                    longest_first_lengths(encoding.len(), other.len(), params.max_length);
                encoding.truncate(n1, params.stride, params.direction)?;
                other.truncate(n2, params.stride, params.direction)?;
            }
            None => encoding.truncate(params.max_length, params.stride, params.direction)?,
        },
        TruncationStrategy::OnlyFirst | TruncationStrategy::OnlySecond => {
            let target = if params.strategy == TruncationStrategy::OnlyFirst {
                &mut encoding
            } else {
                pair_encoding.as_mut().ok_or_else(|| {
                    Error::Truncation("`only_second` truncation requires a pair sequence".into())
                })?
            };

            let target_len = target.len();
            if target_len <= to_remove {
                return Err(Error::Truncation(format!(
                    "the sequence to truncate has {target_len} tokens, {to_remove} would have to be removed"
                )));
            }
            target.truncate(target_len - to_remove, params.stride, params.direction)?;
        }
    }
    Ok((encoding, pair_encoding))
}

/// Lengths to keep for a pair under `LongestFirst`.
///
/// When the shorter sequence fits in half the budget it is kept whole and the
/// longer one gets the rest. Otherwise both get half, the first sequence taking
/// the smaller half when `max_length` is odd.
fn longest_first_lengths(len1: usize, len2: usize, max_length: usize) -> (usize, usize) {
    let shorter = len1.min(len2);
    if shorter * 2 <= max_length {
        if len1 <= len2 {
            (len1, max_length - len1)
        } else {
            (max_length - len2, len2)
        }
    } else {
        (max_length / 2, max_length - max_length / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Token;

    fn encoding(n: usize) -> Encoding {
        Encoding::from_tokens(
            (0..n)
                .map(|i| Token::new(i as u32, format!("t{i}"), (i, i + 1)))
                .collect(),
            0,
        )
    }

    fn params(max_length: usize, strategy: TruncationStrategy) -> TruncationParams {
        TruncationParams {
            max_length,
            strategy,
            ..Default::default()
        }
    }

    #[test]
    fn longest_first_keeps_the_short_sequence() {
        let (a, b) = truncate_encodings(
            encoding(2),
            Some(encoding(10)),
            &params(6, TruncationStrategy::LongestFirst),
        )
        .unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(b.unwrap().len(), 4);
    }

    #[test]
    fn longest_first_splits_evenly_when_both_are_long() {
        let (a, b) = truncate_encodings(
            encoding(8),
            Some(encoding(9)),
            &params(7, TruncationStrategy::LongestFirst),
        )
        .unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(b.unwrap().len(), 4);
    }

    #[test]
    fn single_sequence_is_cut_to_max_length() {
        let (a, b) = truncate_encodings(
            encoding(10),
            None,
            &params(4, TruncationStrategy::LongestFirst),
        )
        .unwrap();
        assert_eq!(a.len(), 4);
        assert!(b.is_none());
        assert_eq!(a.get_overflowing().len(), 2);
    }

    #[test]
    fn only_second_needs_a_pair() {
        let err = truncate_encodings(
            encoding(10),
            None,
            &params(4, TruncationStrategy::OnlySecond),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Truncation(_)));
    }

    #[test]
    fn only_first_fails_when_too_short() {
        let err = truncate_encodings(
            encoding(2),
            Some(encoding(10)),
            &params(5, TruncationStrategy::OnlyFirst),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Truncation(_)));

        let (a, b) = truncate_encodings(
            encoding(6),
            Some(encoding(2)),
            &params(5, TruncationStrategy::OnlyFirst),
        )
        .unwrap();
        assert_eq!((a.len(), b.unwrap().len()), (3, 2));
    }

    #[test]
    fn fitting_inputs_are_untouched() {
        let (a, _) = truncate_encodings(encoding(3), None, &params(3, TruncationStrategy::LongestFirst))
            .unwrap();
        assert_eq!(a, encoding(3));
    }
}
