// src/tokenizer/added_vocabulary.rs

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, Anchored, Input, Match, MatchKind, StartKind};
use regex::Regex;
use serde::{ser::SerializeSeq, Deserialize, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::normalizer::{NormalizedString, Range};
use super::pre_tokenizer::PreTokenizedString;
use super::{Model, Normalizer, Offsets, Result, Token};

/// A token registered on top of the model vocabulary, with the flags that
/// control how it is found in the input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddedToken {
    pub content: String,
    /// Only match when not glued to word characters on either side.
    pub single_word: bool,
    /// Swallow the whitespace before a match.
    pub lstrip: bool,
    /// Swallow the whitespace after a match.
    pub rstrip: bool,
    /// Match against the normalized text instead of the raw input.
    pub normalized: bool,
    /// Dropped by `decode` when skipping special tokens.
    pub special: bool,
}

impl AddedToken {
    /// A token with default flags. Special tokens default to matching the raw
    /// input, the others the normalized text.
    pub fn from<S: Into<String>>(content: S, special: bool) -> Self {
        Self {
            content: content.into(),
            normalized: !special,
            special,
            ..Default::default()
        }
    }
    #[must_use]
    pub fn single_word(mut self, single_word: bool) -> Self {
        self.single_word = single_word;
        self
    }
    #[must_use]
    pub fn lstrip(mut self, lstrip: bool) -> Self {
        self.lstrip = lstrip;
        self
    }
    #[must_use]
    pub fn rstrip(mut self, rstrip: bool) -> Self {
        self.rstrip = rstrip;
        self
    }
    #[must_use]
    pub fn normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }
    #[must_use]
    pub fn special(mut self, special: bool) -> Self {
        self.special = special;
        self
    }
}

impl Default for AddedToken {
    fn default() -> Self {
        Self {
            content: String::new(),
            single_word: false,
            lstrip: false,
            rstrip: false,
            normalized: true,
            special: false,
        }
    }
}

// Identity is the content alone, flags may change.
impl std::hash::Hash for AddedToken {
    fn hash<H: std::hash::Hasher>(&self, hasher: &mut H) {
        self.content.hash(hasher);
    }
}

/// An automaton over some added tokens, with the id of each pattern.
type MatchingSet = (AhoCorasick, Vec<u32>);

static STARTS_WITH_WORD: LazyLock<Regex> = LazyLock::new(|| compile(r"^\w"));
static ENDS_WITH_WORD: LazyLock<Regex> = LazyLock::new(|| compile(r"\w$"));
static RIGHTMOST_SPACE_AT_START: LazyLock<Regex> = LazyLock::new(|| compile(r"^\s*"));
static LEFTMOST_SPACE_AT_END: LazyLock<Regex> = LazyLock::new(|| compile(r"\s*$"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid pattern {pattern}: {e}"))
}

fn ends_with_word(sentence: &str) -> bool {
    ENDS_WITH_WORD.is_match(sentence)
}

fn starts_with_word(sentence: &str) -> bool {
    STARTS_WITH_WORD.is_match(sentence)
}

fn space_leftmost_at_end(sentence: &str) -> usize {
    LEFTMOST_SPACE_AT_END
        .find(sentence)
        .map_or(sentence.len(), |m| m.start())
}

fn space_rightmost_at_start(sentence: &str) -> usize {
    RIGHTMOST_SPACE_AT_START.find(sentence).map_or(0, |m| m.end())
}

fn build_matching_set<I>(tokens: I) -> Result<Option<MatchingSet>>
where
    I: IntoIterator<Item = (String, u32)>,
{
    let (patterns, ids): (Vec<String>, Vec<u32>) = tokens.into_iter().unzip();
    if patterns.is_empty() {
        return Ok(None);
    }
    let trie = AhoCorasickBuilder::new()
        .match_kind(MatchKind::LeftmostLongest)
        .start_kind(StartKind::Both)
        .build(&patterns)?;
    Ok(Some((trie, ids)))
}

/// A vocabulary built on top of the Model, for tokens added after the model was
/// trained: special tokens like `[CLS]` or `<s>`, or plain words the model
/// should never split.
///
/// Added tokens are found in the input before anything else runs. Those with
/// `normalized == false` are matched against the raw input; the others are
/// matched against the normalized text. Matching is longest first, and among
/// equal candidates the token added first wins.
#[derive(Clone, Debug)]
pub struct AddedVocabulary {
    /// Content to id, special or not.
    added_tokens_map: HashMap<String, u32>,
    added_tokens_map_r: HashMap<u32, AddedToken>,
    /// Every AddedToken, in the order the user gave them.
    added_tokens: Vec<AddedToken>,
    /// Contents of the special tokens, looked up by `decode`.
    special_tokens_set: HashSet<String>,
    /// Tokens matched against the raw input.
    split_trie: Option<MatchingSet>,
    /// Tokens matched against the normalized input.
    split_normalized_trie: Option<MatchingSet>,
    /// When set, special tokens are not extracted and go through the model
    /// like ordinary text.
    encode_special_tokens: bool,
}

impl AddedVocabulary {
    pub fn new() -> Self {
        Self {
            added_tokens_map: HashMap::new(),
            added_tokens_map_r: HashMap::new(),
            added_tokens: vec![],
            special_tokens_set: HashSet::new(),
            split_trie: None,
            split_normalized_trie: None,
            encode_special_tokens: false,
        }
    }

    pub fn len(&self) -> usize {
        self.added_tokens_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.added_tokens_map.is_empty()
    }

    /// Content to id for every added token.
    pub fn get_vocab(&self) -> &HashMap<String, u32> {
        &self.added_tokens_map
    }

    pub fn get_added_tokens_decoder(&self) -> &HashMap<u32, AddedToken> {
        &self.added_tokens_map_r
    }

    /// Added tokens in insertion order.
    pub fn get_added_tokens(&self) -> &[AddedToken] {
        &self.added_tokens
    }

    /// Added tokens take precedence over the model vocabulary.
    pub fn token_to_id(&self, token: &str, model: &impl Model) -> Option<u32> {
        self.added_tokens_map
            .get(token)
            .copied()
            .or_else(|| model.token_to_id(token))
    }

    pub fn id_to_token(&self, id: u32, model: &impl Model) -> Option<String> {
        self.simple_id_to_token(id)
            .or_else(|| model.id_to_token(id))
    }

    pub fn simple_id_to_token(&self, id: u32) -> Option<String> {
        self.added_tokens_map_r.get(&id).map(|t| t.content.clone())
    }

    pub fn set_encode_special_tokens(&mut self, value: bool) {
        self.encode_special_tokens = value;
    }

    pub fn get_encode_special_tokens(&self) -> bool {
        self.encode_special_tokens
    }

    pub fn is_special_token(&self, token: &str) -> bool {
        self.special_tokens_set.contains(token)
    }

    /// Add some special tokens to the vocabulary. They are flagged special and
    /// matched against the raw input whatever their own flags say.
    pub fn add_special_tokens<N: Normalizer>(
        &mut self,
        tokens: &[AddedToken],
        model: &impl Model,
        normalizer: Option<&N>,
    ) -> Result<usize> {
        let tokens = tokens
            .iter()
            .map(|token| token.clone().special(true).normalized(false))
            .collect::<Vec<_>>();
        self.add_tokens(&tokens, model, normalizer)
    }

    /// Add some tokens to the vocabulary, returning how many are new.
    ///
    /// A token already known to the model keeps the model id. Any other token gets
    /// the first id above both the model vocabulary and the previous added tokens.
    pub fn add_tokens<N: Normalizer>(
        &mut self,
        tokens: &[AddedToken],
        model: &impl Model,
        normalizer: Option<&N>,
    ) -> Result<usize> {
        let mut added = 0;
        for token in tokens {
            if token.content.is_empty() {
                warn!("ignoring an added token with empty content");
                continue;
            }
            if let Some(id) = self.added_tokens_map.get(&token.content) {
                if self.added_tokens_map_r.get(id) == Some(token) {
                    continue;
                }
            }

            let new_id = match self.added_tokens_map.get(&token.content) {
                Some(id) => *id,
                None => match model.token_to_id(&token.content) {
                    Some(id) => {
                        warn!(
                            token = %token.content,
                            id,
                            "added token is already part of the model vocabulary"
                        );
                        id
                    }
                    None => self.next_id(model),
                },
            };
            self.insert(token.clone(), new_id);
            added += 1;
        }

        self.refresh_added_tokens(normalizer)?;
        Ok(added)
    }

    /// Put back tokens with the ids they were saved with.
    pub(crate) fn restore<N: Normalizer>(
        &mut self,
        tokens: Vec<AddedTokenWithId>,
        normalizer: Option<&N>,
    ) -> Result<()> {
        for AddedTokenWithId { id, token } in tokens {
            self.insert(token, id);
        }
        self.refresh_added_tokens(normalizer)
    }

    fn next_id(&self, model: &impl Model) -> u32 {
        let vocab_size = model.get_vocab_size() as u32;
        self.added_tokens_map
            .values()
            .max()
            .map_or(vocab_size, |max| vocab_size.max(max + 1))
    }

    fn insert(&mut self, token: AddedToken, id: u32) {
        if token.special {
            self.special_tokens_set.insert(token.content.clone());
        } else {
            self.special_tokens_set.remove(&token.content);
        }
        match self
            .added_tokens
            .iter_mut()
            .find(|t| t.content == token.content)
        {
            Some(previous) => *previous = token.clone(),
            None => self.added_tokens.push(token.clone()),
        }
        self.added_tokens_map.insert(token.content.clone(), id);
        self.added_tokens_map_r.insert(id, token);
    }

    /// Rebuild both automatons from the current tokens. Normalized tokens are
    /// indexed by their normalized content, so they match the normalized input.
    pub(crate) fn refresh_added_tokens<N: Normalizer>(&mut self, normalizer: Option<&N>) -> Result<()> {
        let (normalized, non_normalized): (Vec<&AddedToken>, Vec<&AddedToken>) =
            self.added_tokens.iter().partition(|token| token.normalized);

        let with_id = |token: &AddedToken| {
            self.added_tokens_map
                .get(&token.content)
                .map(|id| (token.content.clone(), *id))
        };

        let split_trie = build_matching_set(non_normalized.into_iter().filter_map(with_id))?;

        let mut normalized_patterns = Vec::with_capacity(normalized.len());
        for (content, id) in normalized.into_iter().filter_map(with_id) {
            let mut content = NormalizedString::from(content);
            if let Some(normalizer) = normalizer {
                normalizer.normalize(&mut content)?;
            }
            if !content.is_empty() {
                normalized_patterns.push((content.get().to_owned(), id));
            }
        }
        let split_normalized_trie = build_matching_set(normalized_patterns)?;

        self.split_trie = split_trie;
        self.split_normalized_trie = split_normalized_trie;
        debug!(
            added_tokens = self.added_tokens.len(),
            special_tokens = self.special_tokens_set.len(),
            "refreshed added vocabulary"
        );
        Ok(())
    }

    /// Find any AddedToken in the given sentence, using the provided automaton.
    /// Returns every part of the sentence, with the id of the token it matched
    /// when it is an added token.
    fn find_matches(&self, sentence: &str, split_re: &MatchingSet) -> Vec<(Option<u32>, Offsets)> {
        if sentence.is_empty() {
            return vec![(None, (0, 0))];
        }

        let mut start_offset = 0;
        let mut splits = vec![];
        let mut position = 0;

        while let Some(mat) = split_re.0.find(Input::new(sentence).range(position..)) {
            let Some((id, mut start, mut stop)) = self.usable_match(sentence, split_re, mat) else {
                // Nothing usable starts here, go on from the next char.
                position = mat.start()
                    + sentence[mat.start()..]
                        .chars()
                        .next()
                        .map_or(1, char::len_utf8);
                continue;
            };
            let Some(added_token) = self.added_tokens_map_r.get(&id) else {
                position = stop;
                continue;
            };

            if added_token.lstrip {
                start = space_leftmost_at_end(&sentence[..start]).max(start_offset);
            }
            if added_token.rstrip {
                stop += space_rightmost_at_start(&sentence[stop..]);
            }

            if start_offset < start {
                splits.push((None, (start_offset, start)));
            }
            splits.push((Some(id), (start, stop)));
            start_offset = stop;
            position = stop;
        }

        let total_byte_len = sentence.len();
        if start_offset != total_byte_len {
            splits.push((None, (start_offset, total_byte_len)));
        }

        splits
    }

    /// The longest added token starting where `mat` starts that may be used
    /// there. A `single_word` token inside a word falls back to shorter tokens.
    fn usable_match(
        &self,
        sentence: &str,
        split_re: &MatchingSet,
        mut mat: Match,
    ) -> Option<(u32, usize, usize)> {
        loop {
            let id = split_re.1[mat.pattern().as_usize()];
            let (start, stop) = (mat.start(), mat.end());
            if self.can_match_at(sentence, id, start, stop) {
                return Some((id, start, stop));
            }
            if stop <= start + 1 {
                return None;
            }
            let shorter = Input::new(sentence)
                .range(start..stop - 1)
                .anchored(Anchored::Yes);
            mat = split_re.0.find(shorter)?;
        }
    }

    fn can_match_at(&self, sentence: &str, id: u32, start: usize, stop: usize) -> bool {
        let Some(added_token) = self.added_tokens_map_r.get(&id) else {
            return false;
        };
        if self.encode_special_tokens && self.special_tokens_set.contains(&added_token.content) {
            return false;
        }
        if added_token.single_word {
            let start_space = start == 0 || !ends_with_word(&sentence[..start]);
            let stop_space = stop == sentence.len() || !starts_with_word(&sentence[stop..]);
            return start_space && stop_space;
        }
        true
    }

    /// Cut `sentence` around the added tokens of `split_re`, tokenizing the
    /// matched parts right away.
    fn split_with_indices(
        &self,
        sentence: NormalizedString,
        split_re: Option<&MatchingSet>,
    ) -> Vec<(NormalizedString, Option<Vec<Token>>)> {
        let Some(split_re) = split_re else {
            return vec![(sentence, None)];
        };

        self.find_matches(sentence.get(), split_re)
            .into_iter()
            .filter_map(|(id, (start, end))| {
                let slice = sentence.slice(Range::Normalized(start..end))?;
                match id {
                    Some(id) => {
                        let content = self
                            .added_tokens_map_r
                            .get(&id)
                            .map_or_else(|| slice.get().to_owned(), |t| t.content.clone());
                        let len = slice.len();
                        Some((slice, Some(vec![Token::new(id, content, (0, len))])))
                    }
                    None => Some((slice, None)),
                }
            })
            .collect()
    }

    /// Extract the added tokens from `sequence` and normalize what remains.
    ///
    /// Raw-input tokens are extracted first, then the rest is normalized and
    /// searched for normalized tokens. Every extracted token is already
    /// tokenized in the returned `PreTokenizedString`.
    pub fn extract_and_normalize<N: Normalizer>(
        &self,
        normalizer: Option<&N>,
        sequence: &str,
    ) -> Result<PreTokenizedString> {
        let mut pretokenized: PreTokenizedString = sequence.into();

        pretokenized.split(|_, sequence| {
            Ok(self.split_with_indices(sequence, self.split_trie.as_ref()))
        })?;

        pretokenized.split(|_, mut sequence| {
            if let Some(normalizer) = normalizer {
                normalizer.normalize(&mut sequence)?;
            }
            Ok(self.split_with_indices(sequence, self.split_normalized_trie.as_ref()))
        })?;

        Ok(pretokenized)
    }
}

impl Default for AddedVocabulary {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry of the `added_tokens` list in a saved tokenizer.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AddedTokenWithId {
    pub id: u32,
    #[serde(flatten)]
    pub token: AddedToken,
}

impl Serialize for AddedVocabulary {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut ids = self.added_tokens_map_r.keys().copied().collect::<Vec<_>>();
        // Saved by ascending id so files are stable.
        ids.sort_unstable();

        let mut entries = serializer.serialize_seq(Some(ids.len()))?;
        for id in ids {
            if let Some(token) = self.added_tokens_map_r.get(&id) {
                entries.serialize_element(&AddedTokenWithId {
                    id,
                    token: token.clone(),
                })?;
            }
        }
        entries.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::normalizers::Lowercase;

    struct ModelMock {
        vocab: HashMap<String, u32>,
        vocab_r: HashMap<u32, String>,
    }

    impl ModelMock {
        fn new(entries: &[(&str, u32)]) -> Self {
            Self {
                vocab: entries.iter().map(|(t, id)| (t.to_string(), *id)).collect(),
                vocab_r: entries.iter().map(|(t, id)| (*id, t.to_string())).collect(),
            }
        }
    }

    impl Model for ModelMock {
        fn tokenize(&self, _sequence: &str) -> Result<Vec<Token>> {
            Ok(vec![])
        }
        fn token_to_id(&self, token: &str) -> Option<u32> {
            self.vocab.get(token).copied()
        }
        fn id_to_token(&self, id: u32) -> Option<String> {
            self.vocab_r.get(&id).cloned()
        }
        fn get_vocab(&self) -> HashMap<String, u32> {
            self.vocab.clone()
        }
        fn get_vocab_size(&self) -> usize {
            self.vocab.len()
        }
    }

    const NO_NORMALIZER: Option<&Lowercase> = None;

    fn splits(pretokenized: &PreTokenizedString) -> Vec<(&str, Offsets, Option<Vec<u32>>)> {
        pretokenized
            .get_splits()
            .into_iter()
            .map(|(s, offsets, tokens)| {
                (
                    s,
                    offsets,
                    tokens
                        .as_ref()
                        .map(|tokens| tokens.iter().map(|t| t.id).collect()),
                )
            })
            .collect()
    }

    #[test]
    fn new_tokens_get_ids_after_the_model_vocabulary() {
        let model = ModelMock::new(&[("test", 0), ("tost", 1)]);
        let mut vocab = AddedVocabulary::new();
        assert_eq!(vocab.len(), 0);

        let added = vocab
            .add_tokens(&[AddedToken::from("added_token_1", false)], &model, NO_NORMALIZER)
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(vocab.token_to_id("added_token_1", &model), Some(2));

        // Adding the same token again is a no-op.
        let added = vocab
            .add_tokens(&[AddedToken::from("added_token_1", false)], &model, NO_NORMALIZER)
            .unwrap();
        assert_eq!(added, 0);

        let added = vocab
            .add_tokens(
                &[
                    AddedToken::from("added_token_2", false),
                    AddedToken::from("", false),
                ],
                &model,
                NO_NORMALIZER,
            )
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(vocab.token_to_id("added_token_2", &model), Some(3));
        assert_eq!(vocab.len(), 2);
        let contents = vocab
            .get_added_tokens()
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>();
        assert_eq!(contents, vec!["added_token_1", "added_token_2"]);
    }

    #[test]
    fn tokens_of_the_model_keep_their_id() {
        let model = ModelMock::new(&[("test", 0), ("tost", 1)]);
        let mut vocab = AddedVocabulary::new();
        vocab
            .add_tokens(&[AddedToken::from("test", true)], &model, NO_NORMALIZER)
            .unwrap();
        assert_eq!(vocab.token_to_id("test", &model), Some(0));
        assert!(vocab.is_special_token("test"));
        assert_eq!(vocab.simple_id_to_token(0), Some("test".to_string()));
    }

    #[test]
    fn special_tokens_are_split_from_the_raw_input() {
        let model = ModelMock::new(&[]);
        let mut vocab = AddedVocabulary::new();
        vocab
            .add_special_tokens(
                &[AddedToken::from("[CLS]", true), AddedToken::from("[SEP]", true)],
                &model,
                NO_NORMALIZER,
            )
            .unwrap();

        let result = vocab
            .extract_and_normalize(NO_NORMALIZER, "[CLS] hello [SEP]")
            .unwrap();
        assert_eq!(
            splits(&result),
            vec![
                ("[CLS]", (0, 5), Some(vec![0])),
                (" hello ", (5, 12), None),
                ("[SEP]", (12, 17), Some(vec![1])),
            ]
        );
    }

    #[test]
    fn longest_match_wins() {
        let model = ModelMock::new(&[]);
        let mut vocab = AddedVocabulary::new();
        vocab
            .add_special_tokens(
                &[AddedToken::from("<s>", true), AddedToken::from("<s>x", true)],
                &model,
                NO_NORMALIZER,
            )
            .unwrap();

        let result = vocab.extract_and_normalize(NO_NORMALIZER, "a<s>xb").unwrap();
        assert_eq!(
            splits(&result),
            vec![
                ("a", (0, 1), None),
                ("<s>x", (1, 5), Some(vec![1])),
                ("b", (5, 6), None),
            ]
        );
    }

    #[test]
    fn normalized_tokens_match_the_normalized_input() {
        let model = ModelMock::new(&[]);
        let mut vocab = AddedVocabulary::new();
        let normalizer = Lowercase;
        vocab
            .add_tokens(&[AddedToken::from("Hey", false)], &model, Some(&normalizer))
            .unwrap();

        let result = vocab
            .extract_and_normalize(Some(&normalizer), "say HEY there")
            .unwrap();
        assert_eq!(
            splits(&result),
            vec![
                ("say ", (0, 4), None),
                ("hey", (4, 7), Some(vec![0])),
                (" there", (7, 13), None),
            ]
        );
        let (_, _, tokens) = &result.get_splits()[1];
        assert_eq!(tokens.as_ref().unwrap()[0].value, "Hey");
    }

    #[test]
    fn single_word_tokens_do_not_match_inside_words() {
        let model = ModelMock::new(&[]);
        let mut vocab = AddedVocabulary::new();
        vocab
            .add_tokens(
                &[AddedToken::from("ab", false).single_word(true)],
                &model,
                NO_NORMALIZER,
            )
            .unwrap();

        let result = vocab.extract_and_normalize(NO_NORMALIZER, "abc ab").unwrap();
        assert_eq!(
            splits(&result),
            vec![("abc ", (0, 4), None), ("ab", (4, 6), Some(vec![0]))]
        );
    }

    #[test]
    fn single_word_falls_back_to_a_shorter_token() {
        let model = ModelMock::new(&[]);
        let mut vocab = AddedVocabulary::new();
        vocab
            .add_tokens(
                &[
                    AddedToken::from("ab", false).single_word(true),
                    AddedToken::from("a", false),
                ],
                &model,
                NO_NORMALIZER,
            )
            .unwrap();

        let result = vocab.extract_and_normalize(NO_NORMALIZER, "abc").unwrap();
        assert_eq!(
            splits(&result),
            vec![("a", (0, 1), Some(vec![1])), ("bc", (1, 3), None)]
        );

        let result = vocab.extract_and_normalize(NO_NORMALIZER, "ab c").unwrap();
        assert_eq!(
            splits(&result),
            vec![("ab", (0, 2), Some(vec![0])), (" c", (2, 4), None)]
        );
    }

    #[test]
    fn strip_flags_take_the_surrounding_spaces() {
        let model = ModelMock::new(&[]);
        let mut vocab = AddedVocabulary::new();
        vocab
            .add_special_tokens(
                &[AddedToken::from("<mask>", true).lstrip(true).rstrip(true)],
                &model,
                NO_NORMALIZER,
            )
            .unwrap();

        let result = vocab
            .extract_and_normalize(NO_NORMALIZER, "I saw a  <mask> yesterday")
            .unwrap();
        assert_eq!(
            splits(&result),
            vec![
                ("I saw a", (0, 7), None),
                ("  <mask> ", (7, 16), Some(vec![0])),
                ("yesterday", (16, 25), None),
            ]
        );
    }

    #[test]
    fn encode_special_tokens_disables_their_extraction() {
        let model = ModelMock::new(&[]);
        let mut vocab = AddedVocabulary::new();
        vocab
            .add_special_tokens(&[AddedToken::from("[CLS]", true)], &model, NO_NORMALIZER)
            .unwrap();
        vocab.set_encode_special_tokens(true);

        let result = vocab.extract_and_normalize(NO_NORMALIZER, "[CLS] hi").unwrap();
        assert_eq!(splits(&result), vec![("[CLS] hi", (0, 8), None)]);
    }

    #[test]
    fn serializes_tokens_sorted_by_id() {
        let model = ModelMock::new(&[]);
        let mut vocab = AddedVocabulary::new();
        vocab
            .add_tokens(
                &[AddedToken::from("b", true), AddedToken::from("a", false)],
                &model,
                NO_NORMALIZER,
            )
            .unwrap();
        let json = serde_json::to_string(&vocab).unwrap();
        assert_eq!(
            json,
            r#"[{"id":0,"content":"b","single_word":false,"lstrip":false,"rstrip":false,"normalized":false,"special":true},{"id":1,"content":"a","single_word":false,"lstrip":false,"rstrip":false,"normalized":true,"special":false}]"#
        );
    }
}
