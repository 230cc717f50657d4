// src/tokenizer/pre_tokenizer.rs

use bstr::ByteSlice;
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::tokenizer::normalizer::{NormalizedString, Range, SplitDelimiterBehavior};
use crate::tokenizer::{
    Decoder, Encoding, Error, Offsets, PostProcessor, PreTokenizer, Result, Token,
};

/// Maps every byte to a visible char: printable bytes map to themselves, the
/// other ones are shifted above U+00FF so that no byte is ever whitespace or a
/// control char.
pub(crate) fn bytes_char() -> HashMap<u8, char> {
    let mut bs: Vec<u8> = vec![];
    bs.extend(b'!'..=b'~');
    bs.extend(b'\xA1'..=b'\xAC');
    bs.extend(b'\xAE'..=b'\xFF');

    let mut cs: Vec<u32> = bs.iter().map(|i| *i as u32).collect();

    let mut n = 0;
    for b in 0..=255u8 {
        if !bs.contains(&b) {
            bs.push(b);
            cs.push(256 + n);
            n += 1;
        }
    }

    // Every code point here is below U+0144, `from_u32` cannot fail.
    bs.into_iter()
        .zip(cs)
        .filter_map(|(f, t)| std::char::from_u32(t).map(|c| (f, c)))
        .collect()
}

/// GPT-2 splitting pattern. The lookahead keeps the last space of a run of
/// spaces attached to the following word.
static RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+")
        .unwrap_or_else(|e| panic!("invalid byte-level split pattern: {e}"))
});
pub(crate) static BYTES_CHAR: LazyLock<HashMap<u8, char>> = LazyLock::new(bytes_char);
static CHAR_BYTES: LazyLock<HashMap<char, u8>> =
    LazyLock::new(|| bytes_char().into_iter().map(|(b, c)| (c, b)).collect());

/// A piece of the input during pre-tokenization, possibly already tokenized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    normalized: NormalizedString,
    tokens: Option<Vec<Token>>,
}

impl From<NormalizedString> for Split {
    fn from(normalized: NormalizedString) -> Self {
        Self {
            normalized,
            tokens: None,
        }
    }
}

impl From<(NormalizedString, Option<Vec<Token>>)> for Split {
    fn from((normalized, tokens): (NormalizedString, Option<Vec<Token>>)) -> Self {
        Self { normalized, tokens }
    }
}

/// The input text cut into splits, each one keeping its own alignment with the
/// original text.
///
/// Splits that already carry tokens (added tokens, mostly) are left alone by
/// `split`, `normalize` and `tokenize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreTokenizedString {
    original: String,
    splits: Vec<Split>,
}

impl PreTokenizedString {
    /// Replace every untokenized split by the pieces `split_fn` returns. Empty
    /// pieces are dropped.
    pub fn split<F, U, R>(&mut self, mut split_fn: F) -> Result<()>
    where
        F: FnMut(usize, NormalizedString) -> Result<U>,
        U: IntoIterator<Item = R>,
        R: Into<Split>,
    {
        let mut new_splits = Vec::with_capacity(self.splits.len());
        for (i, original_split) in std::mem::take(&mut self.splits).into_iter().enumerate() {
            if original_split.tokens.is_some() {
                new_splits.push(original_split);
                continue;
            }

            new_splits.extend(
                split_fn(i, original_split.normalized)?
                    .into_iter()
                    .filter_map(|split| {
                        let split: Split = split.into();
                        if split.normalized.is_empty() {
                            None
                        } else {
                            Some(split)
                        }
                    }),
            );
        }
        self.splits = new_splits;
        Ok(())
    }

    /// Normalize every untokenized split in place.
    pub fn normalize<F>(&mut self, normalize: F) -> Result<()>
    where
        F: Fn(&mut NormalizedString) -> Result<()>,
    {
        for split in self.splits.iter_mut().filter(|s| s.tokens.is_none()) {
            normalize(&mut split.normalized)?;
        }
        Ok(())
    }

    /// Run the model over every untokenized split.
    pub fn tokenize<F>(&mut self, tokenize: F) -> Result<()>
    where
        F: Fn(&NormalizedString) -> Result<Vec<Token>>,
    {
        for split in self.splits.iter_mut().filter(|s| s.tokens.is_none()) {
            split.tokens = Some(tokenize(&split.normalized)?);
        }
        Ok(())
    }

    /// Turn the tokenized splits into an `Encoding` whose offsets point into
    /// the original text. Every split must be tokenized.
    pub fn into_encoding(self, word_idx: Option<u32>, type_id: u32) -> Result<Encoding> {
        if self.splits.is_empty() {
            return Ok(Encoding::default());
        }
        if !self.splits.iter().all(|split| split.tokens.is_some()) {
            return Err(Error::config(
                "every split must be tokenized before building an encoding",
            ));
        }

        let capacity = self
            .splits
            .iter()
            .map(|split| split.tokens.as_ref().map_or(0, Vec::len))
            .sum();
        let mut encoding = Encoding::with_capacity(capacity);
        for (idx, split) in self.splits.into_iter().enumerate() {
            let normalized = split.normalized;
            let shift = normalized.original_shift();
            for mut token in split.tokens.unwrap_or_default() {
                let (start, end) = token.offsets;
                token.offsets = normalized
                    .convert_offsets(Range::Normalized(start..end))
                    .map_or(token.offsets, |range| {
                        (shift + range.start, shift + range.end)
                    });
                encoding.push(token, Some(word_idx.unwrap_or(idx as u32)), type_id);
            }
        }
        Ok(encoding)
    }

    /// Current splits, with their offsets in the original text.
    pub fn get_splits(&self) -> Vec<(&str, Offsets, &Option<Vec<Token>>)> {
        self.splits
            .iter()
            .map(|split| {
                (
                    split.normalized.get(),
                    split.normalized.offsets_original(),
                    &split.tokens,
                )
            })
            .collect()
    }

    pub fn get_original(&self) -> &str {
        &self.original
    }
}

impl From<NormalizedString> for PreTokenizedString {
    fn from(normalized: NormalizedString) -> Self {
        Self {
            original: normalized.get_original().to_owned(),
            splits: vec![Split {
                normalized,
                tokens: None,
            }],
        }
    }
}

impl From<&str> for PreTokenizedString {
    fn from(s: &str) -> Self {
        NormalizedString::from(s).into()
    }
}

impl From<String> for PreTokenizedString {
    fn from(s: String) -> Self {
        NormalizedString::from(s).into()
    }
}

/// Byte-level handling: splits on the GPT-2 pattern and rewrites every byte as
/// one visible char, so that any input is covered by a 256 symbol alphabet.
///
/// The same struct decodes (visible chars back to bytes) and post-processes
/// (trims whitespace out of the offsets).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ByteLevel {
    /// Add a space in front of the first word, so that it is handled like the others.
    pub add_prefix_space: bool,
    /// Remove the whitespace from the offsets of the produced tokens.
    pub trim_offsets: bool,
    pub use_regex: bool,
}

impl Default for ByteLevel {
    fn default() -> Self {
        Self {
            add_prefix_space: false,
            trim_offsets: true,
            use_regex: true,
        }
    }
}

impl ByteLevel {
    pub fn new(add_prefix_space: bool, trim_offsets: bool, use_regex: bool) -> Self {
        Self {
            add_prefix_space,
            trim_offsets,
            use_regex,
        }
    }

    pub fn alphabet() -> HashSet<char> {
        BYTES_CHAR.values().copied().collect()
    }

    #[must_use]
    pub fn add_prefix_space(mut self, v: bool) -> Self {
        self.add_prefix_space = v;
        self
    }

    #[must_use]
    pub fn trim_offsets(mut self, v: bool) -> Self {
        self.trim_offsets = v;
        self
    }

    #[must_use]
    pub fn use_regex(mut self, v: bool) -> Self {
        self.use_regex = v;
        self
    }
}

impl PreTokenizer for ByteLevel {
    fn pre_tokenize(&self, pretokenized: &mut PreTokenizedString) -> Result<()> {
        let re_ref: &Regex = &RE;
        pretokenized.split(|_, mut normalized| {
            if self.add_prefix_space && !normalized.get().starts_with(' ') {
                normalized.prepend(" ");
            }
            if self.use_regex {
                normalized.split(re_ref, SplitDelimiterBehavior::Isolated)
            } else {
                Ok(vec![normalized])
            }
        })?;

        pretokenized.normalize(|normalized| {
            let s = normalized.get();
            let mut transformations: Vec<(char, isize)> = Vec::with_capacity(s.len());
            for c in s.chars() {
                let mut buf = [0u8; 4];
                let bytes = c.encode_utf8(&mut buf).as_bytes();
                // First byte replaces the char, the following ones are insertions.
                transformations.extend(
                    bytes
                        .iter()
                        .enumerate()
                        .map(|(i, b)| (BYTES_CHAR[b], isize::from(i > 0))),
                );
            }
            normalized.transform(transformations, 0);
            Ok(())
        })
    }
}

impl Decoder for ByteLevel {
    fn decode_chain(&self, tokens: Vec<String>) -> Result<Vec<String>> {
        let bytes = tokens
            .into_iter()
            .flat_map(|token| {
                token
                    .chars()
                    .map(|c| CHAR_BYTES.get(&c).copied())
                    .collect::<Option<Vec<u8>>>()
                    // Tokens outside the byte alphabet (added tokens) are kept as is.
                    .unwrap_or_else(|| token.as_bytes().to_vec())
            })
            .collect::<Vec<u8>>();
        Ok(vec![bytes.to_str_lossy().into_owned()])
    }
}

impl PostProcessor for ByteLevel {
    fn added_tokens(&self, _is_pair: bool) -> usize {
        0
    }

    fn process_encodings(
        &self,
        mut encodings: Vec<Encoding>,
        _add_special_tokens: bool,
    ) -> Result<Vec<Encoding>> {
        if self.trim_offsets {
            for encoding in encodings.iter_mut() {
                process_offsets(encoding, self.add_prefix_space);
                encoding
                    .get_overflowing_mut()
                    .iter_mut()
                    .for_each(|encoding| process_offsets(encoding, self.add_prefix_space));
            }
        }
        for (i, encoding) in encodings.iter_mut().enumerate() {
            encoding.set_sequence_id(i);
        }
        Ok(encodings)
    }
}

/// Shrink each token's offsets so they no longer cover leading or trailing
/// whitespace. The space added by `add_prefix_space` in front of the first word
/// is not in the original text, so it is left alone.
pub fn process_offsets(encoding: &mut Encoding, add_prefix_space: bool) {
    let space = BYTES_CHAR[&b' '];
    let is_space = |c: &char| *c == space || c.is_whitespace();

    encoding.process_tokens_with_offsets_mut(|(i, (token, offsets))| {
        let mut leading_spaces = token.chars().take_while(is_space).count();
        let trailing_spaces = token.chars().rev().take_while(is_space).count();

        if leading_spaces > 0 {
            let is_first = i == 0 || offsets.0 == 0;
            if is_first && add_prefix_space && leading_spaces == 1 {
                leading_spaces = 0;
            }
            offsets.0 = std::cmp::min(offsets.0 + leading_spaces, offsets.1);
        }
        if trailing_spaces > 0 && offsets.1 >= trailing_spaces {
            offsets.1 = std::cmp::max(offsets.1 - trailing_spaces, offsets.0);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splits(pretokenized: &PreTokenizedString) -> Vec<(&str, Offsets)> {
        pretokenized
            .get_splits()
            .into_iter()
            .map(|(s, o, _)| (s, o))
            .collect()
    }

    #[test]
    fn byte_alphabet_is_complete() {
        assert_eq!(ByteLevel::alphabet().len(), 256);
        assert_eq!(BYTES_CHAR[&b' '], 'Ġ');
        assert_eq!(BYTES_CHAR[&b'a'], 'a');
    }

    #[test]
    fn byte_level_splits_and_maps_bytes() {
        let mut pretokenized = PreTokenizedString::from("Hello my friend, how is your day going?");
        ByteLevel::default().pre_tokenize(&mut pretokenized).unwrap();
        assert_eq!(
            splits(&pretokenized),
            vec![
                ("Hello", (0, 5)),
                ("Ġmy", (5, 8)),
                ("Ġfriend", (8, 15)),
                (",", (15, 16)),
                ("Ġhow", (16, 20)),
                ("Ġis", (20, 23)),
                ("Ġyour", (23, 28)),
                ("Ġday", (28, 32)),
                ("Ġgoing", (32, 38)),
                ("?", (38, 39)),
            ]
        );
    }

    #[test]
    fn byte_level_keeps_spaces_before_words() {
        let mut pretokenized = PreTokenizedString::from("a   b");
        ByteLevel::default().pre_tokenize(&mut pretokenized).unwrap();
        assert_eq!(
            splits(&pretokenized),
            vec![("a", (0, 1)), ("ĠĠ", (1, 3)), ("Ġb", (3, 5))]
        );
    }

    #[test]
    fn prefix_space_is_added_once() {
        let mut pretokenized = PreTokenizedString::from("hi");
        ByteLevel::default()
            .add_prefix_space(true)
            .pre_tokenize(&mut pretokenized)
            .unwrap();
        assert_eq!(splits(&pretokenized), vec![("Ġhi", (0, 2))]);
    }

    #[test]
    fn multibyte_chars_map_to_several_symbols() {
        let mut pretokenized = PreTokenizedString::from("é");
        ByteLevel::default().pre_tokenize(&mut pretokenized).unwrap();
        assert_eq!(splits(&pretokenized), vec![("Ã©", (0, 2))]);
    }

    #[test]
    fn decode_is_the_inverse_and_lossy_on_broken_bytes() {
        let decoder = ByteLevel::default();
        assert_eq!(
            decoder
                .decode(vec!["Hello".into(), "Ġmy".into(), "Ġfriend".into(), "Ã©".into()])
                .unwrap(),
            "Hello my friendé"
        );
        // Only the first byte of `é`.
        assert_eq!(decoder.decode(vec!["Ã".into()]).unwrap(), "\u{FFFD}");
    }

    #[test]
    fn trims_whitespace_from_offsets() {
        let mut encoding = Encoding::from_tokens(
            vec![
                Token::new(0, "Hello".into(), (0, 5)),
                Token::new(1, "Ġthere".into(), (5, 11)),
            ],
            0,
        );
        process_offsets(&mut encoding, false);
        assert_eq!(encoding.get_offsets(), &[(0, 5), (6, 11)]);
    }

    #[test]
    fn split_keeps_tokenized_pieces() {
        let mut pretokenized = PreTokenizedString::from("a b");
        pretokenized
            .split(|_, normalized| normalized.split(' ', SplitDelimiterBehavior::Removed))
            .unwrap();
        pretokenized
            .tokenize(|normalized| {
                Ok(vec![Token::new(0, normalized.get().to_owned(), (0, normalized.len()))])
            })
            .unwrap();
        pretokenized
            .split(|_, _| -> Result<Vec<NormalizedString>> { Ok(vec![]) })
            .unwrap();
        let encoding = pretokenized.into_encoding(None, 0).unwrap();
        assert_eq!(encoding.get_tokens(), &["a", "b"]);
        assert_eq!(encoding.get_offsets(), &[(0, 1), (2, 3)]);
        assert_eq!(encoding.get_word_ids(), &[Some(0), Some(1)]);
    }

    #[test]
    fn untokenized_splits_cannot_become_an_encoding() {
        let pretokenized = PreTokenizedString::from("abc");
        assert!(pretokenized.into_encoding(None, 0).is_err());
    }
}
