// src/tokenizer/bpe.rs

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tokenizer::cache::{Cache, DEFAULT_CACHE_CAPACITY, MAX_LENGTH};
use crate::tokenizer::models::OrderedVocab;
use crate::tokenizer::pair::MergeMap;
use crate::tokenizer::word::Word;
use crate::tokenizer::{Error, Model, Result, Token};

pub type Rank = u32;
pub type Vocab = HashMap<String, u32>;
type VocabR = HashMap<u32, String>;
pub type Merges = Vec<(String, String)>;

struct Config {
    files: Option<(String, String)>,
    vocab: Vocab,
    merges: Merges,
    cache_capacity: usize,
    dropout: Option<f32>,
    unk_token: Option<String>,
    continuing_subword_prefix: Option<String>,
    end_of_word_suffix: Option<String>,
    fuse_unk: bool,
    byte_fallback: bool,
    ignore_merges: bool,
}

/// A `BpeBuilder` can be used to create a `BPE` model with a custom configuration.
pub struct BpeBuilder {
    config: Config,
}

impl Default for BpeBuilder {
    fn default() -> Self {
        Self {
            config: Config {
                files: None,
                vocab: HashMap::new(),
                merges: vec![],
                cache_capacity: DEFAULT_CACHE_CAPACITY,
                dropout: None,
                unk_token: None,
                continuing_subword_prefix: None,
                end_of_word_suffix: None,
                fuse_unk: false,
                byte_fallback: false,
                ignore_merges: false,
            },
        }
    }
}

impl BpeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the vocabulary and merges from files when building.
    #[must_use]
    pub fn files(mut self, vocab: String, merges: String) -> Self {
        self.config.files = Some((vocab, merges));
        self
    }

    #[must_use]
    pub fn vocab_and_merges(mut self, vocab: Vocab, merges: Merges) -> Self {
        self.config.vocab = vocab;
        self.config.merges = merges;
        self
    }

    /// Number of words kept in the merge cache. 0 disables the cache.
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn dropout(mut self, dropout: f32) -> Self {
        self.config.dropout = Some(dropout);
        self
    }

    #[must_use]
    pub fn unk_token(mut self, unk_token: String) -> Self {
        self.config.unk_token = Some(unk_token);
        self
    }

    #[must_use]
    pub fn continuing_subword_prefix(mut self, prefix: String) -> Self {
        self.config.continuing_subword_prefix = Some(prefix);
        self
    }

    #[must_use]
    pub fn end_of_word_suffix(mut self, suffix: String) -> Self {
        self.config.end_of_word_suffix = Some(suffix);
        self
    }

    /// Fuse consecutive unknown tokens into a single one.
    #[must_use]
    pub fn fuse_unk(mut self, fuse_unk: bool) -> Self {
        self.config.fuse_unk = fuse_unk;
        self
    }

    /// Use `<0xNN>` byte tokens instead of the unknown token when they exist.
    #[must_use]
    pub fn byte_fallback(mut self, byte_fallback: bool) -> Self {
        self.config.byte_fallback = byte_fallback;
        self
    }

    /// Take a word straight from the vocabulary when it is there, without merging.
    #[must_use]
    pub fn ignore_merges(mut self, ignore_merges: bool) -> Self {
        self.config.ignore_merges = ignore_merges;
        self
    }

    pub fn build(mut self) -> Result<BPE> {
        if let Some(p) = self.config.dropout {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::config(format!(
                    "dropout must be between 0 and 1, got {p}"
                )));
            }
        }

        if let Some((vocab, merges)) = self.config.files.take() {
            let (v, m) = BPE::read_file(&vocab, &merges)?;
            self.config.vocab = v;
            self.config.merges = m;
        }

        let vocab = self.config.vocab;
        let vocab_r: VocabR = vocab.iter().map(|(k, v)| (*v, k.clone())).collect();
        if vocab_r.len() != vocab.len() {
            return Err(Error::config("the vocabulary assigns the same id twice"));
        }
        if let Some(unk) = &self.config.unk_token {
            if !vocab.contains_key(unk) {
                return Err(Error::config(format!(
                    "unk token `{unk}` is not in the vocabulary"
                )));
            }
        }

        let prefix = self.config.continuing_subword_prefix.as_deref().unwrap_or("");
        let mut merges = MergeMap::default();
        for (rank, (a, b)) in self.config.merges.iter().enumerate() {
            let a_id = vocab
                .get(a)
                .ok_or_else(|| Error::config(format!("merge part `{a}` is not in the vocabulary")))?;
            let b_id = vocab
                .get(b)
                .ok_or_else(|| Error::config(format!("merge part `{b}` is not in the vocabulary")))?;
            let new_token = format!("{a}{}", b.strip_prefix(prefix).unwrap_or(b));
            let new_id = vocab.get(&new_token).ok_or_else(|| {
                Error::config(format!("merged token `{new_token}` is not in the vocabulary"))
            })?;
            merges.insert((*a_id, *b_id), (rank as Rank, *new_id));
        }

        let cache = match self.config.cache_capacity {
            0 => None,
            capacity => Some(Cache::new(capacity)),
        };

        debug!(
            vocab_size = vocab.len(),
            merges = merges.len(),
            cache_capacity = self.config.cache_capacity,
            "built BPE model"
        );

        Ok(BPE {
            vocab,
            vocab_r,
            merges,
            cache,
            dropout: self.config.dropout,
            unk_token: self.config.unk_token,
            continuing_subword_prefix: self.config.continuing_subword_prefix,
            end_of_word_suffix: self.config.end_of_word_suffix,
            fuse_unk: self.config.fuse_unk,
            byte_fallback: self.config.byte_fallback,
            ignore_merges: self.config.ignore_merges,
        })
    }
}

/// A Byte Pair Encoding model.
///
/// Each pretoken starts as one symbol per char, then adjacent symbols are merged
/// following the merge ranks until no known pair is left. Merge results are
/// cached per word, except when dropout is enabled.
#[derive(Debug, Serialize, Deserialize)]
#[serde(try_from = "BpeRepr", into = "BpeRepr")]
pub struct BPE {
    vocab: Vocab,
    vocab_r: VocabR,
    merges: MergeMap,
    cache: Option<Cache<String, Word>>,
    /// Probability of skipping a merge, for BPE-dropout.
    dropout: Option<f32>,
    unk_token: Option<String>,
    continuing_subword_prefix: Option<String>,
    end_of_word_suffix: Option<String>,
    fuse_unk: bool,
    byte_fallback: bool,
    ignore_merges: bool,
}

impl Default for BPE {
    fn default() -> Self {
        Self {
            vocab: HashMap::new(),
            vocab_r: HashMap::new(),
            merges: MergeMap::default(),
            cache: Some(Cache::default()),
            dropout: None,
            unk_token: None,
            continuing_subword_prefix: None,
            end_of_word_suffix: None,
            fuse_unk: false,
            byte_fallback: false,
            ignore_merges: false,
        }
    }
}

impl Clone for BPE {
    // The cache is not shared between clones.
    fn clone(&self) -> Self {
        Self {
            vocab: self.vocab.clone(),
            vocab_r: self.vocab_r.clone(),
            merges: self.merges.clone(),
            cache: self.cache.as_ref().map(Cache::fresh),
            dropout: self.dropout,
            unk_token: self.unk_token.clone(),
            continuing_subword_prefix: self.continuing_subword_prefix.clone(),
            end_of_word_suffix: self.end_of_word_suffix.clone(),
            fuse_unk: self.fuse_unk,
            byte_fallback: self.byte_fallback,
            ignore_merges: self.ignore_merges,
        }
    }
}

impl PartialEq for BPE {
    fn eq(&self, other: &Self) -> bool {
        self.vocab == other.vocab
            && self.merges == other.merges
            && self.dropout == other.dropout
            && self.unk_token == other.unk_token
            && self.continuing_subword_prefix == other.continuing_subword_prefix
            && self.end_of_word_suffix == other.end_of_word_suffix
            && self.fuse_unk == other.fuse_unk
            && self.byte_fallback == other.byte_fallback
            && self.ignore_merges == other.ignore_merges
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VocabFile {
    Wrapped { vocab: Vocab },
    Flat(Vocab),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MergeEntry {
    Pair(String, String),
    Joined(String),
}

#[derive(Deserialize)]
struct MergesFile {
    merges: Vec<MergeEntry>,
}

fn split_merge(line: &str, line_no: usize) -> Result<(String, String)> {
    match line.split(' ').collect::<Vec<_>>().as_slice() {
        [a, b] => Ok(((*a).to_owned(), (*b).to_owned())),
        _ => Err(Error::config(format!("invalid merge on line {line_no}: `{line}`"))),
    }
}

impl BPE {
    pub fn builder() -> BpeBuilder {
        BpeBuilder::new()
    }

    /// Create a BPE model with the given vocabulary and merges, default settings otherwise.
    pub fn new(vocab: Vocab, merges: Merges) -> Result<Self> {
        Self::builder().vocab_and_merges(vocab, merges).build()
    }

    /// Start a builder loading `vocab` and `merges` from files.
    pub fn from_file(vocab: &str, merges: &str) -> BpeBuilder {
        Self::builder().files(vocab.to_owned(), merges.to_owned())
    }

    /// Read a vocabulary file (`{"token": id}` or `{"vocab": {...}}`) and a merges
    /// file (`a b` per line, or `{"merges": [["a", "b"]]}`).
    pub fn read_file<P: AsRef<Path>>(vocab: P, merges: P) -> Result<(Vocab, Merges)> {
        let file: VocabFile = serde_json::from_str(&fs::read_to_string(vocab)?)?;
        let vocab = match file {
            VocabFile::Wrapped { vocab } | VocabFile::Flat(vocab) => vocab,
        };

        let content = fs::read_to_string(merges)?;
        let merges = if content.trim_start().starts_with('{') {
            let file: MergesFile = serde_json::from_str(&content)?;
            file.merges
                .into_iter()
                .enumerate()
                .map(|(i, entry)| match entry {
                    MergeEntry::Pair(a, b) => Ok((a, b)),
                    MergeEntry::Joined(s) => split_merge(&s, i + 1),
                })
                .collect::<Result<Merges>>()?
        } else {
            content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.starts_with("#version") && !line.trim().is_empty())
                .map(|(i, line)| split_merge(line, i + 1))
                .collect::<Result<Merges>>()?
        };

        Ok((vocab, merges))
    }

    pub fn get_vocab(&self) -> Vocab {
        self.vocab.clone()
    }

    pub fn get_unk_token(&self) -> Option<&str> {
        self.unk_token.as_deref()
    }

    /// Change the unknown token, or drop it so unknown chars are skipped.
    /// It must already be in the vocabulary.
    pub fn set_unk_token(&mut self, unk_token: Option<String>) -> Result<()> {
        if let Some(unk) = &unk_token {
            self.unk_id(unk)?;
        }
        self.unk_token = unk_token;
        self.clear_cache();
        Ok(())
    }

    pub fn get_continuing_subword_prefix(&self) -> Option<&str> {
        self.continuing_subword_prefix.as_deref()
    }

    pub fn get_end_of_word_suffix(&self) -> Option<&str> {
        self.end_of_word_suffix.as_deref()
    }

    pub fn get_dropout(&self) -> Option<f32> {
        self.dropout
    }

    pub fn set_dropout(&mut self, dropout: Option<f32>) -> Result<()> {
        if let Some(p) = dropout {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::config(format!(
                    "dropout must be between 0 and 1, got {p}"
                )));
            }
        }
        self.dropout = dropout;
        Ok(())
    }

    pub fn get_fuse_unk(&self) -> bool {
        self.fuse_unk
    }

    pub fn set_fuse_unk(&mut self, fuse_unk: bool) {
        self.fuse_unk = fuse_unk;
        self.clear_cache();
    }

    pub fn get_byte_fallback(&self) -> bool {
        self.byte_fallback
    }

    pub fn set_byte_fallback(&mut self, byte_fallback: bool) {
        self.byte_fallback = byte_fallback;
        self.clear_cache();
    }

    pub fn get_ignore_merges(&self) -> bool {
        self.ignore_merges
    }

    pub fn set_ignore_merges(&mut self, ignore_merges: bool) {
        self.ignore_merges = ignore_merges;
    }

    /// Merges ordered by rank.
    pub fn get_merges(&self) -> Merges {
        let mut merges = self.merges.iter().collect::<Vec<_>>();
        merges.sort_unstable_by_key(|(_, (rank, _))| *rank);
        merges
            .into_iter()
            .filter_map(|((a, b), _)| {
                Some((self.vocab_r.get(a)?.clone(), self.vocab_r.get(b)?.clone()))
            })
            .collect()
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub fn resize_cache(&mut self, capacity: usize) {
        if let Some(cache) = &mut self.cache {
            cache.resize(capacity);
        }
    }

    fn unk_id(&self, unk: &str) -> Result<u32> {
        self.vocab
            .get(unk)
            .copied()
            .ok_or_else(|| Error::config(format!("unk token `{unk}` is not in the vocabulary")))
    }

    fn merge_word(&self, w: &str) -> Result<Word> {
        let mut indices = w.char_indices().map(|(idx, _)| idx).peekable();
        let mut word = Word::with_capacity(w.len());
        let mut unk: Option<(u32, usize)> = None;

        while let Some(i) = indices.next() {
            let end = indices.peek().copied().unwrap_or(w.len());
            let is_first = i == 0;
            let is_last = end == w.len();
            let raw = &w[i..end];
            let byte_len = raw.len();

            let mut s = Cow::Borrowed(raw);
            if !is_first {
                if let Some(prefix) = &self.continuing_subword_prefix {
                    s = format!("{prefix}{s}").into();
                }
            }
            if is_last {
                if let Some(suffix) = &self.end_of_word_suffix {
                    s = format!("{s}{suffix}").into();
                }
            }

            if let Some(id) = self.vocab.get(s.as_ref()) {
                if let Some((unk_id, unk_len)) = unk.take() {
                    word.add(unk_id, unk_len);
                }
                word.add(*id, byte_len);
                continue;
            }

            if self.byte_fallback {
                let bytes = raw
                    .bytes()
                    .map(|b| self.vocab.get(&format!("<0x{b:02X}>")).copied())
                    .collect::<Option<Vec<_>>>();
                if let Some(bytes) = bytes {
                    if let Some((unk_id, unk_len)) = unk.take() {
                        word.add(unk_id, unk_len);
                    }
                    for id in bytes {
                        word.add(id, 1);
                    }
                    continue;
                }
            }

            match &self.unk_token {
                Some(unk_token) => {
                    let unk_id = self.unk_id(unk_token)?;
                    unk = match unk {
                        Some((id, len)) if self.fuse_unk => Some((id, len + byte_len)),
                        Some((id, len)) => {
                            word.add(id, len);
                            Some((unk_id, byte_len))
                        }
                        None => Some((unk_id, byte_len)),
                    };
                }
                None => {
                    if let Some((unk_id, unk_len)) = unk.take() {
                        word.add(unk_id, unk_len);
                    }
                    word.skip(byte_len);
                }
            }
        }
        if let Some((unk_id, unk_len)) = unk {
            word.add(unk_id, unk_len);
        }

        word.merge_all(&self.merges, self.dropout);
        Ok(word)
    }

    fn word_to_tokens<'a>(&'a self, word: &'a Word) -> impl Iterator<Item = Token> + 'a {
        word.get_chars_iter()
            .zip(word.get_offsets_iter())
            .map(move |(id, offsets)| {
                let value = self.vocab_r.get(&id).cloned().unwrap_or_default();
                Token::new(id, value, offsets)
            })
    }

    fn tokenize_with_cache(&self, sequence: &str) -> Result<Vec<Token>> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(sequence)) {
            return Ok(self.word_to_tokens(&hit).collect());
        }
        let word = self.merge_word(sequence)?;
        let tokens = self.word_to_tokens(&word).collect();
        if let Some(cache) = &self.cache {
            if sequence.len() < MAX_LENGTH {
                cache.set(sequence.to_owned(), word);
            }
        }
        Ok(tokens)
    }
}

impl Model for BPE {
    fn tokenize(&self, sequence: &str) -> Result<Vec<Token>> {
        if sequence.is_empty() {
            return Ok(vec![]);
        }

        if self.ignore_merges {
            if let Some(id) = self.vocab.get(sequence) {
                return Ok(vec![Token::new(
                    *id,
                    sequence.to_owned(),
                    (0, sequence.len()),
                )]);
            }
        }

        if self.dropout.is_none_or(|p| p == 0.0) {
            self.tokenize_with_cache(sequence)
        } else {
            let word = self.merge_word(sequence)?;
            Ok(self.word_to_tokens(&word).collect())
        }
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

/// Serialized form: vocab ordered by id, merges ordered by rank.
#[derive(Serialize, Deserialize)]
struct BpeRepr {
    dropout: Option<f32>,
    unk_token: Option<String>,
    continuing_subword_prefix: Option<String>,
    end_of_word_suffix: Option<String>,
    #[serde(default)]
    fuse_unk: bool,
    #[serde(default)]
    byte_fallback: bool,
    #[serde(default)]
    ignore_merges: bool,
    vocab: OrderedVocab,
    merges: Merges,
}

impl From<BPE> for BpeRepr {
    fn from(bpe: BPE) -> Self {
        let merges = bpe.get_merges();
        Self {
            dropout: bpe.dropout,
            unk_token: bpe.unk_token,
            continuing_subword_prefix: bpe.continuing_subword_prefix,
            end_of_word_suffix: bpe.end_of_word_suffix,
            fuse_unk: bpe.fuse_unk,
            byte_fallback: bpe.byte_fallback,
            ignore_merges: bpe.ignore_merges,
            vocab: OrderedVocab(bpe.vocab),
            merges,
        }
    }
}

impl TryFrom<BpeRepr> for BPE {
    type Error = Error;

    fn try_from(repr: BpeRepr) -> Result<Self> {
        let mut builder = BPE::builder()
            .vocab_and_merges(repr.vocab.0, repr.merges)
            .fuse_unk(repr.fuse_unk)
            .byte_fallback(repr.byte_fallback)
            .ignore_merges(repr.ignore_merges);
        if let Some(dropout) = repr.dropout {
            builder = builder.dropout(dropout);
        }
        if let Some(unk) = repr.unk_token {
            builder = builder.unk_token(unk);
        }
        if let Some(prefix) = repr.continuing_subword_prefix {
            builder = builder.continuing_subword_prefix(prefix);
        }
        if let Some(suffix) = repr.end_of_word_suffix {
            builder = builder.end_of_word_suffix(suffix);
        }
        builder.build()
    }
}
