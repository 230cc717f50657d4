// src/tokenizer/encoding.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

use crate::tokenizer::padding::PaddingDirection;
use crate::tokenizer::parallelism::*;
use crate::tokenizer::truncation::TruncationDirection;
use crate::tokenizer::{Error, Offsets, Result, Token};

/// The output of the pipeline for one input (single sequence or pair).
///
/// All the per-token vectors have the same length. Masks are `0`/`1` integers,
/// which is what models consume directly.
#[derive(Default, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Encoding {
    ids: Vec<u32>,
    type_ids: Vec<u32>,
    tokens: Vec<String>,
    /// Index of the word (pretoken) each token comes from. `None` for special tokens.
    words: Vec<Option<u32>>,
    /// Byte offsets in the original input.
    offsets: Vec<Offsets>,
    special_tokens_mask: Vec<u32>,
    attention_mask: Vec<u32>,
    /// What truncation cut away, as independent encodings.
    overflowing: Vec<Encoding>,
    /// Token range of each input sequence, keyed by sequence index.
    sequence_ranges: HashMap<usize, Range<usize>>,
}

impl Encoding {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ids: Vec<u32>,
        type_ids: Vec<u32>,
        tokens: Vec<String>,
        words: Vec<Option<u32>>,
        offsets: Vec<Offsets>,
        special_tokens_mask: Vec<u32>,
        attention_mask: Vec<u32>,
        overflowing: Vec<Self>,
        sequence_ranges: HashMap<usize, Range<usize>>,
    ) -> Self {
        Self {
            ids,
            type_ids,
            tokens,
            words,
            offsets,
            special_tokens_mask,
            attention_mask,
            overflowing,
            sequence_ranges,
        }
    }

    pub fn with_capacity(len: usize) -> Self {
        Self {
            ids: Vec::with_capacity(len),
            type_ids: Vec::with_capacity(len),
            tokens: Vec::with_capacity(len),
            words: Vec::with_capacity(len),
            offsets: Vec::with_capacity(len),
            special_tokens_mask: Vec::with_capacity(len),
            attention_mask: Vec::with_capacity(len),
            overflowing: vec![],
            sequence_ranges: HashMap::new(),
        }
    }

    /// Build an encoding of regular (non special) tokens sharing one type id.
    pub fn from_tokens(tokens: Vec<Token>, type_id: u32) -> Self {
        let mut encoding = Self::with_capacity(tokens.len());
        for token in tokens {
            encoding.push(token, None, type_id);
        }
        encoding
    }

    pub(crate) fn push(&mut self, token: Token, word: Option<u32>, type_id: u32) {
        self.ids.push(token.id);
        self.tokens.push(token.value);
        self.offsets.push(token.offsets);
        self.words.push(word);
        self.type_ids.push(type_id);
        self.special_tokens_mask.push(0);
        self.attention_mask.push(1);
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn n_sequences(&self) -> usize {
        if self.sequence_ranges.is_empty() {
            1
        } else {
            self.sequence_ranges.len()
        }
    }

    /// Mark the whole encoding as sequence `sequence_id`.
    pub fn set_sequence_id(&mut self, sequence_id: usize) {
        self.sequence_ranges.insert(sequence_id, 0..self.len());
    }

    pub fn get_tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn get_word_ids(&self) -> &[Option<u32>] {
        &self.words
    }

    pub fn get_sequence_ids(&self) -> Vec<Option<usize>> {
        let mut sequences = vec![None; self.len()];
        for seq_id in 0..self.n_sequences() {
            let range = self.sequence_range(seq_id);
            for slot in &mut sequences[range] {
                *slot = Some(seq_id);
            }
        }
        sequences
    }

    pub fn get_ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn get_type_ids(&self) -> &[u32] {
        &self.type_ids
    }

    pub fn set_type_ids(&mut self, type_ids: Vec<u32>) {
        self.type_ids = type_ids;
    }

    pub fn get_offsets(&self) -> &[Offsets] {
        &self.offsets
    }

    pub fn get_special_tokens_mask(&self) -> &[u32] {
        &self.special_tokens_mask
    }

    pub fn get_attention_mask(&self) -> &[u32] {
        &self.attention_mask
    }

    pub fn get_overflowing(&self) -> &Vec<Encoding> {
        &self.overflowing
    }

    pub fn set_overflowing(&mut self, overflowing: Vec<Encoding>) {
        self.overflowing = overflowing;
    }

    pub fn get_overflowing_mut(&mut self) -> &mut Vec<Encoding> {
        &mut self.overflowing
    }

    pub fn take_overflowing(&mut self) -> Vec<Encoding> {
        std::mem::take(&mut self.overflowing)
    }

    pub(crate) fn process_tokens_with_offsets_mut<F>(&mut self, func: F)
    where
        F: FnMut((usize, (&String, &mut Offsets))),
    {
        self.tokens
            .iter()
            .zip(self.offsets.iter_mut())
            .enumerate()
            .for_each(func)
    }

    /// Token range covered by the given sequence.
    pub fn sequence_range(&self, sequence_id: usize) -> Range<usize> {
        self.sequence_ranges
            .get(&sequence_id)
            .cloned()
            .unwrap_or(0..self.len())
    }

    /// Index of the sequence containing the given token.
    pub fn token_to_sequence(&self, token: usize) -> Option<usize> {
        if token >= self.len() {
            None
        } else if self.sequence_ranges.is_empty() {
            Some(0)
        } else {
            self.sequence_ranges.iter().find_map(|(seq_id, range)| {
                if range.contains(&token) {
                    Some(*seq_id)
                } else {
                    None
                }
            })
        }
    }

    pub fn token_to_word(&self, token: usize) -> Option<(usize, u32)> {
        Some((self.token_to_sequence(token)?, (*self.words.get(token)?)?))
    }

    /// Index of the token covering byte `pos` of the original input of `sequence_id`.
    pub fn char_to_token(&self, pos: usize, sequence_id: usize) -> Option<usize> {
        let range = self.sequence_range(sequence_id);
        self.offsets[range.clone()]
            .iter()
            .position(|(start, end)| *start <= pos && pos < *end)
            .map(|i| i + range.start)
    }

    /// A copy of the given token range, without overflowing or sequence info.
    fn slice(&self, range: Range<usize>) -> Encoding {
        Encoding {
            ids: self.ids[range.clone()].to_vec(),
            type_ids: self.type_ids[range.clone()].to_vec(),
            tokens: self.tokens[range.clone()].to_vec(),
            words: self.words[range.clone()].to_vec(),
            offsets: self.offsets[range.clone()].to_vec(),
            special_tokens_mask: self.special_tokens_mask[range.clone()].to_vec(),
            attention_mask: self.attention_mask[range].to_vec(),
            overflowing: vec![],
            sequence_ranges: HashMap::new(),
        }
    }

    /// Keep at most `max_len` tokens, the rest moving into `overflowing`.
    ///
    /// The removed tokens are cut in windows of `max_len` tokens, consecutive
    /// windows sharing `stride` tokens. Truncating an encoding that already fits
    /// is a no-op.
    pub fn truncate(
        &mut self,
        max_len: usize,
        stride: usize,
        direction: TruncationDirection,
    ) -> Result<()> {
        let encoding_len = self.len();
        if max_len >= encoding_len {
            return Ok(());
        }

        if max_len == 0 {
            let whole = std::mem::replace(self, Encoding::with_capacity(0));
            self.overflowing.push(whole);
            return Ok(());
        }

        if stride >= max_len {
            return Err(Error::Truncation(format!(
                "stride ({stride}) must be strictly less than the truncated length ({max_len})"
            )));
        }

        let step = max_len - stride;
        let mut reached_end = false;
        let parts: Vec<Range<usize>> = match direction {
            TruncationDirection::Right => (0..encoding_len)
                .step_by(step)
                .map_while(|start| {
                    if reached_end {
                        return None;
                    }
                    let stop = (start + max_len).min(encoding_len);
                    reached_end = stop == encoding_len;
                    Some(start..stop)
                })
                .collect(),
            TruncationDirection::Left => (0..encoding_len)
                .rev()
                .step_by(step)
                .map_while(|last| {
                    if reached_end {
                        return None;
                    }
                    let stop = last + 1;
                    let start = stop.saturating_sub(max_len);
                    reached_end = start == 0;
                    Some(start..stop)
                })
                .collect(),
        };

        let mut parts = parts.into_iter().map(|range| self.slice(range));
        let Some(mut kept) = parts.next() else {
            return Ok(());
        };
        kept.overflowing = parts.collect();
        *self = kept;
        Ok(())
    }

    /// Concatenate several encodings into one.
    pub fn merge<I: IntoIterator<Item = Encoding>>(encodings: I, growing_offsets: bool) -> Self {
        let mut encoding = Encoding::default();
        for sub in encodings {
            encoding.merge_with(sub, growing_offsets);
        }
        encoding
    }

    /// Append `pair` to this encoding.
    ///
    /// Overflowing parts are combined: each of ours with `pair` and with each of
    /// `pair`'s, then ourself with each of `pair`'s.
    pub fn merge_with(&mut self, pair: Encoding, growing_offsets: bool) {
        let mut overflowings = vec![];

        for self_o in &self.overflowing {
            let mut n_encoding = self_o.clone();
            n_encoding.merge_with(pair.clone(), growing_offsets);
            overflowings.push(n_encoding);

            for other_o in &pair.overflowing {
                let mut n_encoding = self_o.clone();
                n_encoding.merge_with(other_o.clone(), growing_offsets);
                overflowings.push(n_encoding);
            }
        }
        for other_o in &pair.overflowing {
            let mut n_encoding = self.clone();
            n_encoding.overflowing.clear();
            n_encoding.merge_with(other_o.clone(), growing_offsets);
            overflowings.push(n_encoding);
        }

        let original_self_len = self.len();
        self.sequence_ranges
            .extend(pair.sequence_ranges.into_iter().map(|(seq_id, range)| {
                (
                    seq_id,
                    original_self_len + range.start..original_self_len + range.end,
                )
            }));
        self.ids.extend(pair.ids);
        self.type_ids.extend(pair.type_ids);
        self.tokens.extend(pair.tokens);
        self.words.extend(pair.words);

        let starting_offset = if growing_offsets {
            self.offsets.last().map_or(0, |o| o.1)
        } else {
            0
        };
        self.offsets.extend(
            pair.offsets
                .into_iter()
                .map(|(start, end)| (start + starting_offset, end + starting_offset)),
        );
        self.special_tokens_mask.extend(pair.special_tokens_mask);
        self.attention_mask.extend(pair.attention_mask);
        self.overflowing = overflowings;
    }

    /// Pad up to `target_length` tokens. Never removes anything: an encoding
    /// that is already long enough is left untouched. Overflowing parts are
    /// padded too.
    pub fn pad(
        &mut self,
        target_length: usize,
        pad_id: u32,
        pad_type_id: u32,
        pad_token: &str,
        direction: PaddingDirection,
    ) {
        self.overflowing.maybe_par_iter_mut().for_each(|encoding| {
            encoding.pad(target_length, pad_id, pad_type_id, pad_token, direction)
        });

        if self.len() >= target_length {
            return;
        }
        let pad_length = target_length - self.len();

        match direction {
            PaddingDirection::Left => {
                self.ids = std::iter::repeat_n(pad_id, pad_length)
                    .chain(self.ids.drain(..))
                    .collect();
                self.type_ids = std::iter::repeat_n(pad_type_id, pad_length)
                    .chain(self.type_ids.drain(..))
                    .collect();
                self.tokens = std::iter::repeat_n(pad_token.to_owned(), pad_length)
                    .chain(self.tokens.drain(..))
                    .collect();
                self.words = std::iter::repeat_n(None, pad_length)
                    .chain(self.words.drain(..))
                    .collect();
                self.attention_mask = std::iter::repeat_n(0, pad_length)
                    .chain(self.attention_mask.drain(..))
                    .collect();
                self.special_tokens_mask = std::iter::repeat_n(1, pad_length)
                    .chain(self.special_tokens_mask.drain(..))
                    .collect();
                self.offsets = std::iter::repeat_n((0, 0), pad_length)
                    .chain(self.offsets.drain(..))
                    .collect();
                self.sequence_ranges
                    .iter_mut()
                    .for_each(|(_, range)| *range = (range.start + pad_length)..(range.end + pad_length));
            }
            PaddingDirection::Right => {
                self.ids.extend(std::iter::repeat_n(pad_id, pad_length));
                self.type_ids.extend(std::iter::repeat_n(pad_type_id, pad_length));
                self.tokens
                    .extend(std::iter::repeat_n(pad_token.to_owned(), pad_length));
                self.words.extend(std::iter::repeat_n(None, pad_length));
                self.attention_mask.extend(std::iter::repeat_n(0, pad_length));
                self.special_tokens_mask
                    .extend(std::iter::repeat_n(1, pad_length));
                self.offsets.extend(std::iter::repeat_n((0, 0), pad_length));
            }
        }
    }
}

impl std::iter::FromIterator<Encoding> for Encoding {
    fn from_iter<I: IntoIterator<Item = Encoding>>(iter: I) -> Self {
        Self::merge(iter, false)
    }
}
