// src/tokenizer/normalizer.rs

use serde::{Deserialize, Serialize};
use std::ops::{Bound, RangeBounds};
use unicode_normalization::UnicodeNormalization;

use crate::tokenizer::pattern::Pattern;
use crate::tokenizer::{Offsets, Result};

/// A range expressed either on the original text or on the normalized one.
#[derive(Debug, Clone)]
pub enum Range<T: RangeBounds<usize> + Clone> {
    Original(T),
    Normalized(T),
}

impl<T> Range<T>
where
    T: RangeBounds<usize> + Clone,
{
    /// Unwrap the inner range, resolving open bounds against `max_len`.
    fn into_full_range(self, max_len: usize) -> std::ops::Range<usize> {
        let range = match self {
            Range::Original(r) => r,
            Range::Normalized(r) => r,
        };

        let start = match range.start_bound() {
            Bound::Unbounded => 0,
            Bound::Included(i) => *i,
            Bound::Excluded(i) => *i + 1,
        };
        let end = match range.end_bound() {
            Bound::Unbounded => max_len,
            Bound::Included(i) => *i + 1,
            Bound::Excluded(i) => *i,
        };

        start..end
    }
}

/// How the delimiter found by a split pattern is handled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitDelimiterBehavior {
    /// The delimiter is dropped: `"the-final--countdown"` → `["the", "final", "countdown"]`
    Removed,
    /// The delimiter becomes its own piece: `["the", "-", "final", "-", "-", "countdown"]`
    Isolated,
    /// Attached to the piece on its left: `["the-", "final-", "-", "countdown"]`
    MergedWithPrevious,
    /// Attached to the piece on its right: `["the", "-final", "-", "-countdown"]`
    MergedWithNext,
    /// Consecutive delimiters are grouped together: `["the", "-", "final", "--", "countdown"]`
    Contiguous,
}

/// Original text, working text, and the alignment between the two.
///
/// `alignments` holds one entry per byte of `normalized`, giving the byte range of
/// `original` that produced it. Entries are monotonically non-decreasing, which
/// makes the reverse lookup a binary search.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct NormalizedString {
    original: String,
    normalized: String,
    alignments: Vec<(usize, usize)>,
    /// Byte position of `original` inside the text this string was sliced from.
    original_shift: usize,
}

impl NormalizedString {
    #[cfg(test)]
    pub(crate) fn new(
        original: String,
        normalized: String,
        alignments: Vec<(usize, usize)>,
        original_shift: usize,
    ) -> Self {
        Self {
            original,
            normalized,
            alignments,
            original_shift,
        }
    }

    pub fn get(&self) -> &str {
        &self.normalized
    }

    pub fn get_original(&self) -> &str {
        &self.original
    }

    /// Offsets of `original` inside the whole input text.
    pub fn offsets_original(&self) -> Offsets {
        (
            self.original_shift,
            self.original_shift + self.len_original(),
        )
    }

    pub fn original_shift(&self) -> usize {
        self.original_shift
    }

    pub fn len(&self) -> usize {
        self.normalized.len()
    }

    pub fn len_original(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Convert a range between the original and the normalized referentials.
    ///
    /// Original → normalized is a binary search on the alignment log; the other
    /// direction reads the log directly.
    pub fn convert_offsets<T>(&self, range: Range<T>) -> Option<std::ops::Range<usize>>
    where
        T: RangeBounds<usize> + Clone,
    {
        let len_original = self.len_original();
        let len_normalized = self.len();

        match range {
            Range::Original(_) => {
                let range = range.into_full_range(len_original);
                if range.start > range.end || range.end > len_original {
                    return None;
                }
                if self.alignments.is_empty() {
                    return if range.start == 0 && range.end == 0 {
                        Some(0..0)
                    } else {
                        None
                    };
                }
                if range.start == range.end {
                    let at = self.alignments.partition_point(|a| a.1 <= range.start);
                    return Some(at..at);
                }
                let start = self.alignments.partition_point(|a| a.1 <= range.start);
                let end = self.alignments.partition_point(|a| a.0 < range.end);
                if start > end {
                    None
                } else {
                    Some(start..end)
                }
            }
            Range::Normalized(_) => {
                let range = range.into_full_range(len_normalized);
                if range.start > range.end || range.end > len_normalized {
                    return None;
                }
                if self.alignments.is_empty() {
                    return Some(0..len_original.min(range.end));
                }
                if range.start == range.end {
                    let pos = if range.start < self.alignments.len() {
                        self.alignments[range.start].0
                    } else {
                        self.alignments[self.alignments.len() - 1].1
                    };
                    return Some(pos..pos);
                }
                Some(self.alignments[range.start].0..self.alignments[range.end - 1].1)
            }
        }
    }

    /// Slice of the normalized text, by normalized or original range.
    pub fn get_range<T>(&self, range: Range<T>) -> Option<&str>
    where
        T: RangeBounds<usize> + Clone,
    {
        match range {
            Range::Original(_) => self.normalized.get(self.convert_offsets(range)?),
            Range::Normalized(_) => self
                .normalized
                .get(range.into_full_range(self.normalized.len())),
        }
    }

    /// Slice of the original text, by normalized or original range.
    pub fn get_range_original<T>(&self, range: Range<T>) -> Option<&str>
    where
        T: RangeBounds<usize> + Clone,
    {
        match range {
            Range::Original(_) => self
                .original
                .get(range.into_full_range(self.original.len())),
            Range::Normalized(_) => self.original.get(self.convert_offsets(range)?),
        }
    }

    /// A standalone `NormalizedString` covering the given range. Its alignments
    /// are rebased on its own original slice, and `original_shift` keeps track
    /// of where that slice sits in the full input.
    pub fn slice<T>(&self, range: Range<T>) -> Option<NormalizedString>
    where
        T: RangeBounds<usize> + Clone,
    {
        let full_range = match &range {
            Range::Original(_) => Range::Original(
                range.clone().into_full_range(self.len_original()),
            ),
            Range::Normalized(_) => Range::Normalized(range.clone().into_full_range(self.len())),
        };

        let r_normalized = match &full_range {
            Range::Original(_) => self.convert_offsets(full_range.clone())?,
            Range::Normalized(r) => r.clone(),
        };
        let r_original = match &full_range {
            Range::Original(r) => r.clone(),
            Range::Normalized(_) => self.convert_offsets(full_range.clone())?,
        };

        let normalized = self.normalized.get(r_normalized.clone())?.to_owned();
        let original = self.original.get(r_original.clone())?.to_owned();
        let shift = r_original.start;

        Some(NormalizedString {
            original,
            normalized,
            alignments: self.alignments[r_normalized]
                .iter()
                .map(|(start, end)| (start - shift, end - shift))
                .collect(),
            original_shift: self.original_shift + shift,
        })
    }

    /// Apply a list of `(char, change)` transformations on a normalized range.
    ///
    /// `change == 0` replaces one char, `change == 1` inserts a char, and
    /// `change == -n` replaces one char and removes the `n` following ones.
    /// `initial_offset` chars are removed from the start of the range before
    /// the first transformation is applied.
    pub fn transform_range<I>(
        &mut self,
        range: std::ops::Range<usize>,
        dest: I,
        initial_offset: usize,
    ) where
        I: IntoIterator<Item = (char, isize)>,
    {
        let n_range = range;
        let mut replaced = self.normalized[n_range.clone()]
            .chars()
            .collect::<Vec<_>>()
            .into_iter();
        let initial_removed: usize = (&mut replaced)
            .take(initial_offset)
            .map(|c| c.len_utf8())
            .sum();

        let mut offset = (initial_removed + n_range.start) as isize;
        let mut alignments = Vec::with_capacity(n_range.len());
        let alignments_ref = &self.alignments;
        let normalized = dest
            .into_iter()
            .map(|(c, changes)| {
                let idx = offset as usize;
                let align = if changes.is_positive() {
                    if idx < 1 {
                        alignments_ref.first().copied().unwrap_or((0, 0))
                    } else {
                        alignments_ref[idx - 1]
                    }
                } else {
                    alignments_ref[idx]
                };

                let replaced_char = if !changes.is_positive() {
                    replaced.next()
                } else {
                    None
                };
                let replaced_char_size = replaced_char.map_or(0, |c| c.len_utf8());

                let total_bytes_to_remove: usize = if changes.is_negative() {
                    (&mut replaced)
                        .take(-changes as usize)
                        .map(|c| c.len_utf8())
                        .sum()
                } else {
                    0
                };

                offset += replaced_char_size as isize;
                offset += total_bytes_to_remove as isize;

                alignments.extend((0..c.len_utf8()).map(|_| align));
                c
            })
            .collect::<String>();

        self.alignments.splice(n_range.clone(), alignments);
        self.normalized.replace_range(n_range, &normalized);
    }

    /// `transform_range` over the whole normalized string.
    pub fn transform<I>(&mut self, dest: I, initial_offset: usize)
    where
        I: IntoIterator<Item = (char, isize)>,
    {
        self.transform_range(0..self.len(), dest, initial_offset)
    }

    /// Replace the normalized text by `output`, aligning each output char with
    /// the span of input chars it stems from. `weight` gives the number of
    /// fully decomposed code points behind a char, which is invariant under
    /// composition and decomposition.
    fn realign(&mut self, output: String, weight: fn(char) -> usize) {
        if output == self.normalized {
            return;
        }

        let input = self.normalized.char_indices().collect::<Vec<_>>();
        let mut alignments = Vec::with_capacity(output.len());
        let mut consumed_input = 0;
        let mut input_weight = 0;
        let mut output_weight = 0;
        let mut previous = self.alignments.first().copied().unwrap_or((0, 0));
        let mut chars = output.chars().peekable();
        while let Some(c) = chars.next() {
            output_weight += weight(c);
            let first = consumed_input;
            while consumed_input < input.len() && input_weight < output_weight {
                input_weight += weight(input[consumed_input].1);
                consumed_input += 1;
            }
            // Whatever input remains once the output is exhausted belongs to the last char.
            if chars.peek().is_none() {
                consumed_input = input.len();
            }
            let align = if consumed_input > first {
                let start = input[first].0;
                let (last_b, last_c) = input[consumed_input - 1];
                (
                    self.alignments[start].0,
                    self.alignments[last_b + last_c.len_utf8() - 1].1,
                )
            } else {
                previous
            };
            previous = align;
            alignments.extend((0..c.len_utf8()).map(|_| align));
        }

        self.normalized = output;
        self.alignments = alignments;
    }

    pub fn nfd(&mut self) -> &mut Self {
        let output = self.normalized.nfd().collect::<String>();
        self.realign(output, canonical_weight);
        self
    }

    pub fn nfkd(&mut self) -> &mut Self {
        let output = self.normalized.nfkd().collect::<String>();
        self.realign(output, compatibility_weight);
        self
    }

    pub fn nfc(&mut self) -> &mut Self {
        let output = self.normalized.nfc().collect::<String>();
        self.realign(output, canonical_weight);
        self
    }

    pub fn nfkc(&mut self) -> &mut Self {
        let output = self.normalized.nfkc().collect::<String>();
        self.realign(output, compatibility_weight);
        self
    }

    /// Keep only the chars for which `keep` returns true.
    pub fn filter<F: Fn(char) -> bool>(&mut self, keep: F) -> &mut Self {
        let mut removed: isize = 0;
        let mut removed_start: usize = 0;

        let mut transforms = Vec::with_capacity(self.normalized.len());
        let mut last_c = None;
        for c in self.normalized.chars() {
            if keep(c) {
                match last_c {
                    Some(lc) => transforms.push((lc, -removed)),
                    None => removed_start = removed as usize,
                }
                last_c = Some(c);
                removed = 0;
            } else {
                removed += 1;
            }
        }
        match last_c {
            Some(lc) => {
                transforms.push((lc, -removed));
                self.transform(transforms, removed_start);
            }
            None => {
                let all = self.normalized.chars().count();
                self.transform(transforms, all);
            }
        }
        self
    }

    /// Map every char to another one.
    pub fn map<F: Fn(char) -> char>(&mut self, map: F) -> &mut Self {
        let transformations = self
            .normalized
            .chars()
            .map(|c| (map(c), 0))
            .collect::<Vec<_>>();
        self.transform(transformations, 0);
        self
    }

    pub fn lowercase(&mut self) -> &mut Self {
        let mut new_chars: Vec<(char, isize)> = Vec::with_capacity(self.normalized.len());
        for c in self.normalized.chars() {
            c.to_lowercase().enumerate().for_each(|(index, c)| {
                new_chars.push((c, isize::from(index > 0)));
            })
        }
        self.transform(new_chars, 0);
        self
    }

    pub fn uppercase(&mut self) -> &mut Self {
        let mut new_chars: Vec<(char, isize)> = Vec::with_capacity(self.normalized.len());
        for c in self.normalized.chars() {
            c.to_uppercase().enumerate().for_each(|(index, c)| {
                new_chars.push((c, isize::from(index > 0)));
            })
        }
        self.transform(new_chars, 0);
        self
    }

    /// Replace every match of `pattern` by `content`. Replacement chars are
    /// aligned on the whole original span of the text they replace.
    pub fn replace<P: Pattern>(&mut self, pattern: P, content: &str) -> Result<()> {
        let matches = pattern.find_matches(&self.normalized)?;
        if !matches.iter().any(|(_, is_match)| *is_match) {
            return Ok(());
        }

        let mut normalized = String::with_capacity(self.normalized.len());
        let mut alignments = Vec::with_capacity(self.alignments.len());
        for ((start, end), is_match) in matches {
            if !is_match || start == end {
                normalized.push_str(&self.normalized[start..end]);
                alignments.extend_from_slice(&self.alignments[start..end]);
                continue;
            }
            let span = (self.alignments[start].0, self.alignments[end - 1].1);
            normalized.push_str(content);
            alignments.extend(std::iter::repeat(span).take(content.len()));
        }

        self.normalized = normalized;
        self.alignments = alignments;
        Ok(())
    }

    /// Prepend `s`, aligned with the first char of the string.
    pub fn prepend(&mut self, s: &str) -> &mut Self {
        if let Some(next) = self.normalized.chars().next() {
            let transformations = s
                .chars()
                .map(|c| (c, 1))
                .chain(std::iter::once((next, 0)));
            self.transform_range(0..next.len_utf8(), transformations, 0);
        }
        self
    }

    /// Append `s`, aligned with the last char of the string.
    pub fn append(&mut self, s: &str) -> &mut Self {
        if let Some((b, prev)) = self.normalized.char_indices().last() {
            let transformations = std::iter::once((prev, 0)).chain(s.chars().map(|c| (c, 1)));
            self.transform_range(b..self.normalized.len(), transformations, 0);
        }
        self
    }

    pub fn lstrip(&mut self) -> &mut Self {
        self.lrstrip(true, false)
    }

    pub fn rstrip(&mut self) -> &mut Self {
        self.lrstrip(false, true)
    }

    pub fn strip(&mut self) -> &mut Self {
        self.lrstrip(true, true)
    }

    fn lrstrip(&mut self, left: bool, right: bool) -> &mut Self {
        let leading_spaces = if left {
            self.normalized.chars().take_while(|c| c.is_whitespace()).count()
        } else {
            0
        };
        let trailing_spaces = if right {
            self.normalized
                .chars()
                .rev()
                .take_while(|c| c.is_whitespace())
                .count()
        } else {
            0
        };

        if leading_spaces > 0 || trailing_spaces > 0 {
            let count = self.normalized.chars().count();
            if leading_spaces + trailing_spaces >= count {
                self.transform(std::iter::empty(), count);
                return self;
            }
            let kept = count - leading_spaces - trailing_spaces;
            let transformation = self
                .normalized
                .chars()
                .enumerate()
                .filter_map(|(i, c)| {
                    if i < leading_spaces || i >= count - trailing_spaces {
                        None
                    } else if i == count - trailing_spaces - 1 {
                        Some((c, -(trailing_spaces as isize)))
                    } else {
                        Some((c, 0))
                    }
                })
                .collect::<Vec<_>>();
            debug_assert_eq!(transformation.len(), kept);
            self.transform(transformation, leading_spaces);
        }
        self
    }

    /// Split the string on `pattern`, treating the delimiters per `behavior`.
    pub fn split<P: Pattern>(
        &self,
        pattern: P,
        behavior: SplitDelimiterBehavior,
    ) -> Result<Vec<NormalizedString>> {
        let matches = pattern.find_matches(&self.normalized)?;

        // (offsets, should_remove)
        let splits: Vec<(Offsets, bool)> = match behavior {
            SplitDelimiterBehavior::Isolated => matches
                .into_iter()
                .map(|(offsets, _)| (offsets, false))
                .collect(),
            SplitDelimiterBehavior::Removed => matches,
            SplitDelimiterBehavior::Contiguous => {
                let mut previous_match = false;
                matches
                    .into_iter()
                    .fold(vec![], |mut acc, (offsets, is_match)| {
                        if is_match == previous_match {
                            if let Some(((_, end), _)) = acc.last_mut() {
                                *end = offsets.1;
                            } else {
                                acc.push((offsets, false));
                            }
                        } else {
                            acc.push((offsets, false));
                        }
                        previous_match = is_match;
                        acc
                    })
            }
            SplitDelimiterBehavior::MergedWithPrevious => {
                let mut previous_match = false;
                matches
                    .into_iter()
                    .fold(vec![], |mut acc, (offsets, is_match)| {
                        if is_match && !previous_match {
                            if let Some(((_, end), _)) = acc.last_mut() {
                                *end = offsets.1;
                            } else {
                                acc.push((offsets, false));
                            }
                        } else {
                            acc.push((offsets, false));
                        }
                        previous_match = is_match;
                        acc
                    })
            }
            SplitDelimiterBehavior::MergedWithNext => {
                let mut previous_match = false;
                let mut merged = matches.into_iter().rev().fold(
                    vec![],
                    |mut acc, (offsets, is_match)| {
                        if is_match && !previous_match {
                            if let Some(((start, _), _)) = acc.last_mut() {
                                *start = offsets.0;
                            } else {
                                acc.push((offsets, false));
                            }
                        } else {
                            acc.push((offsets, false));
                        }
                        previous_match = is_match;
                        acc
                    },
                );
                merged.reverse();
                merged
            }
        };

        Ok(splits
            .into_iter()
            .filter_map(|(offsets, remove)| {
                if remove {
                    None
                } else {
                    self.slice(Range::Normalized(offsets.0..offsets.1))
                }
            })
            .collect())
    }
}

fn canonical_weight(c: char) -> usize {
    let mut n = 0;
    unicode_normalization::char::decompose_canonical(c, |_| n += 1);
    n
}

fn compatibility_weight(c: char) -> usize {
    let mut n = 0;
    unicode_normalization::char::decompose_compatible(c, |_| n += 1);
    n
}

impl From<String> for NormalizedString {
    fn from(s: String) -> Self {
        let alignments = s
            .char_indices()
            .flat_map(|(b, c)| {
                let len = c.len_utf8();
                (0..len).map(move |_| (b, b + len))
            })
            .collect::<Vec<_>>();
        Self {
            original: s.clone(),
            normalized: s,
            alignments,
            original_shift: 0,
        }
    }
}

impl From<&str> for NormalizedString {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn original_of(n: &NormalizedString, range: std::ops::Range<usize>) -> &str {
        n.get_range_original(Range::Normalized(range)).unwrap()
    }

    #[test]
    fn nfd_keeps_offsets_on_the_decomposed_char() {
        let mut n = NormalizedString::from("élégant");
        n.nfd();
        assert_eq!(n.get(), "e\u{301}le\u{301}gant");
        // `e` + combining accent both map back to the precomposed `é`.
        assert_eq!(original_of(&n, 0..1), "é");
        assert_eq!(original_of(&n, 1..3), "é");
        assert_eq!(original_of(&n, 3..4), "l");
    }

    #[test]
    fn nfc_recomposes_and_merges_alignments() {
        let mut n = NormalizedString::from("e\u{301}t\u{301}");
        n.nfc();
        assert_eq!(n.get(), "ét\u{301}");
        assert_eq!(original_of(&n, 0..2), "e\u{301}");
        assert_eq!(original_of(&n, 2..n.len()), "t\u{301}");
    }

    #[test]
    fn nfkc_expands_ligatures() {
        let mut n = NormalizedString::from("ﬁne");
        n.nfkc();
        assert_eq!(n.get(), "fine");
        assert_eq!(original_of(&n, 0..1), "ﬁ");
        assert_eq!(original_of(&n, 1..2), "ﬁ");
        assert_eq!(original_of(&n, 2..4), "ne");
    }

    #[test]
    fn lowercase_handles_expansions() {
        let mut n = NormalizedString::from("İstanbul");
        n.lowercase();
        assert_eq!(n.get(), "i\u{307}stanbul");
        assert_eq!(original_of(&n, 0..3), "İ");
        assert_eq!(original_of(&n, 3..4), "s");
    }

    #[test]
    fn filter_removes_chars_and_keeps_alignment() {
        let mut n = NormalizedString::from("a-b-c");
        n.filter(|c| c != '-');
        assert_eq!(n.get(), "abc");
        assert_eq!(original_of(&n, 1..2), "b");
        assert_eq!(original_of(&n, 0..3), "a-b-c");

        let mut all = NormalizedString::from("---");
        all.filter(|c| c != '-');
        assert_eq!(all.get(), "");
    }

    #[test]
    fn filter_drops_leading_chars() {
        let mut n = NormalizedString::from("--ab");
        n.filter(|c| c != '-');
        assert_eq!(n.get(), "ab");
        assert_eq!(original_of(&n, 0..1), "a");
    }

    #[test]
    fn replace_maps_content_on_replaced_span() {
        let mut n = NormalizedString::from("a  b");
        n.replace("  ", "_").unwrap();
        assert_eq!(n.get(), "a_b");
        assert_eq!(original_of(&n, 1..2), "  ");
        assert_eq!(original_of(&n, 2..3), "b");

        let mut deleted = NormalizedString::from("a--b");
        deleted.replace('-', "").unwrap();
        assert_eq!(deleted.get(), "ab");
        assert_eq!(original_of(&deleted, 1..2), "b");
    }

    #[test]
    fn prepend_and_append_attach_to_neighbours() {
        let mut n = NormalizedString::from("hello");
        n.prepend("▁");
        assert_eq!(n.get(), "▁hello");
        assert_eq!(original_of(&n, 0..3), "h");
        n.append("!");
        assert_eq!(n.get(), "▁hello!");
        assert_eq!(original_of(&n, n.len() - 1..n.len()), "o");
    }

    #[test]
    fn strip_removes_surrounding_whitespace() {
        let mut n = NormalizedString::from("  hi there \t");
        n.strip();
        assert_eq!(n.get(), "hi there");
        assert_eq!(original_of(&n, 0..n.len()), "hi there");
        assert_eq!(n.convert_offsets(Range::Normalized(0..2)), Some(2..4));

        let mut blank = NormalizedString::from("   ");
        blank.strip();
        assert!(blank.is_empty());
    }

    #[test]
    fn original_to_normalized_conversion() {
        let mut n = NormalizedString::from("Hé llo");
        n.lowercase().nfd();
        assert_eq!(n.get(), "he\u{301} llo");
        assert_eq!(n.convert_offsets(Range::Original(1..3)), Some(1..4));
        assert_eq!(n.convert_offsets(Range::Original(4..7)), Some(5..8));
        assert_eq!(n.convert_offsets(Range::Original(0..100)), None);
    }

    #[test]
    fn split_behaviors() {
        let n = NormalizedString::from("the-final--countdown");
        let pieces = |behavior| {
            n.split('-', behavior)
                .unwrap()
                .into_iter()
                .map(|s| s.get().to_owned())
                .collect::<Vec<_>>()
        };

        assert_eq!(
            pieces(SplitDelimiterBehavior::Removed),
            vec!["the", "final", "countdown"]
        );
        assert_eq!(
            pieces(SplitDelimiterBehavior::Isolated),
            vec!["the", "-", "final", "-", "-", "countdown"]
        );
        assert_eq!(
            pieces(SplitDelimiterBehavior::MergedWithPrevious),
            vec!["the-", "final-", "-", "countdown"]
        );
        assert_eq!(
            pieces(SplitDelimiterBehavior::MergedWithNext),
            vec!["the", "-final", "-", "-countdown"]
        );
        assert_eq!(
            pieces(SplitDelimiterBehavior::Contiguous),
            vec!["the", "-", "final", "--", "countdown"]
        );
    }

    #[test]
    fn slices_carry_their_original_shift() {
        let n = NormalizedString::from("hello world");
        let pieces = n.split(' ', SplitDelimiterBehavior::Removed).unwrap();
        assert_eq!(pieces[1].get(), "world");
        assert_eq!(pieces[1].offsets_original(), (6, 11));
        assert_eq!(pieces[1].convert_offsets(Range::Normalized(1..3)), Some(1..3));
    }

    #[test]
    fn alignments_stay_monotonic_after_transforms() {
        let mut n = NormalizedString::from("ÀB ﬃ  Ç");
        n.nfkd()
            .lowercase()
            .filter(|c| !unicode_normalization::char::is_combining_mark(c))
            .strip();
        n.replace("  ", " ").unwrap();
        assert_eq!(n.get(), "ab ffi c");
        assert!(n.alignments.windows(2).all(|w| w[0].0 <= w[1].0 && w[0].1 <= w[1].1));
        assert_eq!(n.alignments.len(), n.len());
    }

    #[test]
    fn uppercase_and_ranges() {
        let mut n = NormalizedString::from("straße");
        n.uppercase();
        assert_eq!(n.get(), "STRASSE");
        assert_eq!(n.get_range(Range::Original(4..6)), Some("SS"));
        assert_eq!(n.get_range(Range::Normalized(0..3)), Some("STR"));
        assert_eq!(original_of(&n, 4..6), "ß");
    }
}
