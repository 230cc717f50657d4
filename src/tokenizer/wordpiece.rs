// src/tokenizer/wordpiece.rs

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tokenizer::models::OrderedVocab;
use crate::tokenizer::{Error, Model, Result, Token};

type Vocab = HashMap<String, u32>;

struct Config {
    files: Option<String>,
    vocab: Vocab,
    unk_token: String,
    continuing_subword_prefix: String,
    max_input_chars_per_word: usize,
}

/// A `WordPieceBuilder` can be used to create a `WordPiece` model with a custom configuration.
pub struct WordPieceBuilder {
    config: Config,
}

impl Default for WordPieceBuilder {
    fn default() -> Self {
        Self {
            config: Config {
                files: None,
                vocab: HashMap::new(),
                unk_token: String::from("[UNK]"),
                continuing_subword_prefix: String::from("##"),
                max_input_chars_per_word: 100,
            },
        }
    }
}

impl WordPieceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the vocabulary from a `vocab.txt` file when building.
    #[must_use]
    pub fn files(mut self, vocab: String) -> Self {
        self.config.files = Some(vocab);
        self
    }

    #[must_use]
    pub fn vocab(mut self, vocab: Vocab) -> Self {
        self.config.vocab = vocab;
        self
    }

    #[must_use]
    pub fn unk_token(mut self, unk_token: String) -> Self {
        self.config.unk_token = unk_token;
        self
    }

    #[must_use]
    pub fn continuing_subword_prefix(mut self, prefix: String) -> Self {
        self.config.continuing_subword_prefix = prefix;
        self
    }

    /// Words longer than this (in chars) map straight to the unknown token.
    #[must_use]
    pub fn max_input_chars_per_word(mut self, max: usize) -> Self {
        self.config.max_input_chars_per_word = max;
        self
    }

    pub fn build(mut self) -> Result<WordPiece> {
        if let Some(vocab) = self.config.files.take() {
            self.config.vocab = WordPiece::read_file(&vocab)?;
        }
        let vocab = self.config.vocab;
        if !vocab.contains_key(&self.config.unk_token) {
            return Err(Error::config(format!(
                "unk token `{}` is not in the vocabulary",
                self.config.unk_token
            )));
        }
        let vocab_r: HashMap<u32, String> = vocab.iter().map(|(k, v)| (*v, k.clone())).collect();
        if vocab_r.len() != vocab.len() {
            return Err(Error::config("the vocabulary assigns the same id twice"));
        }
        debug!(vocab_size = vocab.len(), "built WordPiece model");
        Ok(WordPiece {
            vocab,
            vocab_r,
            unk_token: self.config.unk_token,
            continuing_subword_prefix: self.config.continuing_subword_prefix,
            max_input_chars_per_word: self.config.max_input_chars_per_word,
        })
    }
}

/// WordPiece: greedy longest-match-first over the vocabulary. Every piece but
/// the first is looked up with the continuing subword prefix. A word that
/// cannot be fully covered becomes a single unknown token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WordPieceRepr", into = "WordPieceRepr")]
pub struct WordPiece {
    vocab: Vocab,
    vocab_r: HashMap<u32, String>,
    unk_token: String,
    continuing_subword_prefix: String,
    max_input_chars_per_word: usize,
}

impl WordPiece {
    pub fn builder() -> WordPieceBuilder {
        WordPieceBuilder::new()
    }

    /// Read a `vocab.txt` file: one token per line, the id is the line number.
    pub fn read_file<P: AsRef<Path>>(vocab: P) -> Result<Vocab> {
        let file = BufReader::new(File::open(vocab)?);
        let mut vocab = HashMap::new();
        for (index, line) in file.lines().enumerate() {
            let line = line?;
            vocab.insert(line.trim_end().to_owned(), index as u32);
        }
        Ok(vocab)
    }

    pub fn from_file(vocab: &str) -> WordPieceBuilder {
        Self::builder().files(vocab.to_owned())
    }

    pub fn get_unk_token(&self) -> &str {
        &self.unk_token
    }

    /// Change the unknown token. It must already be in the vocabulary.
    pub fn set_unk_token(&mut self, unk_token: String) -> Result<()> {
        if !self.vocab.contains_key(&unk_token) {
            return Err(Error::config(format!(
                "unk token `{unk_token}` is not in the vocabulary"
            )));
        }
        self.unk_token = unk_token;
        Ok(())
    }

    pub fn get_continuing_subword_prefix(&self) -> &str {
        &self.continuing_subword_prefix
    }

    pub fn set_continuing_subword_prefix(&mut self, prefix: String) {
        self.continuing_subword_prefix = prefix;
    }

    pub fn get_max_input_chars_per_word(&self) -> usize {
        self.max_input_chars_per_word
    }

    pub fn set_max_input_chars_per_word(&mut self, max: usize) {
        self.max_input_chars_per_word = max;
    }

    fn unk(&self, sequence: &str) -> Result<Vec<Token>> {
        let id = self.vocab.get(&self.unk_token).ok_or_else(|| {
            Error::config(format!(
                "unk token `{}` is not in the vocabulary",
                self.unk_token
            ))
        })?;
        Ok(vec![Token::new(
            *id,
            self.unk_token.clone(),
            (0, sequence.len()),
        )])
    }
}

impl Model for WordPiece {
    fn tokenize(&self, sequence: &str) -> Result<Vec<Token>> {
        if sequence.is_empty() {
            return Ok(vec![]);
        }
        if sequence.chars().count() > self.max_input_chars_per_word {
            return self.unk(sequence);
        }

        let mut sub_tokens = vec![];
        let mut start = 0;
        while start < sequence.len() {
            let mut end = sequence.len();
            let mut current = None;

            while start < end {
                let mut substr: Cow<str> = Cow::Borrowed(&sequence[start..end]);
                if start > 0 {
                    substr = Cow::Owned(format!("{}{substr}", self.continuing_subword_prefix));
                }
                if let Some(id) = self.vocab.get(substr.as_ref()) {
                    current = Some(Token::new(*id, substr.into_owned(), (start, end)));
                    break;
                }
                end -= sequence[start..end]
                    .chars()
                    .next_back()
                    .map_or(1, char::len_utf8);
            }

            match current {
                Some(token) => {
                    sub_tokens.push(token);
                    start = end;
                }
                None => return self.unk(sequence),
            }
        }

        Ok(sub_tokens)
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

#[derive(Serialize, Deserialize)]
struct WordPieceRepr {
    unk_token: String,
    continuing_subword_prefix: String,
    max_input_chars_per_word: usize,
    vocab: OrderedVocab,
}

impl From<WordPiece> for WordPieceRepr {
    fn from(model: WordPiece) -> Self {
        Self {
            unk_token: model.unk_token,
            continuing_subword_prefix: model.continuing_subword_prefix,
            max_input_chars_per_word: model.max_input_chars_per_word,
            vocab: OrderedVocab(model.vocab),
        }
    }
}

impl TryFrom<WordPieceRepr> for WordPiece {
    type Error = Error;

    fn try_from(repr: WordPieceRepr) -> Result<Self> {
        WordPiece::builder()
            .vocab(repr.vocab.0)
            .unk_token(repr.unk_token)
            .continuing_subword_prefix(repr.continuing_subword_prefix)
            .max_input_chars_per_word(repr.max_input_chars_per_word)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> WordPiece {
        WordPiece::builder()
            .vocab(
                [("un", 0), ("##able", 1), ("[UNK]", 2), ("##a", 3)]
                    .into_iter()
                    .map(|(t, id)| (t.to_string(), id))
                    .collect(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn longest_prefix_first() {
        let tokens = model().tokenize("unable").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::new(0, "un".into(), (0, 2)),
                Token::new(1, "##able".into(), (2, 6)),
            ]
        );
    }

    #[test]
    fn uncovered_word_is_a_single_unk() {
        let tokens = model().tokenize("xyz").unwrap();
        assert_eq!(tokens, vec![Token::new(2, "[UNK]".into(), (0, 3))]);

        // `un` matches, but nothing covers `x`.
        let tokens = model().tokenize("unx").unwrap();
        assert_eq!(tokens, vec![Token::new(2, "[UNK]".into(), (0, 3))]);
    }

    #[test]
    fn long_words_skip_the_search() {
        let mut model = model();
        model.set_max_input_chars_per_word(4);
        let tokens = model.tokenize("unable").unwrap();
        assert_eq!(tokens, vec![Token::new(2, "[UNK]".into(), (0, 6))]);
    }

    #[test]
    fn unk_token_must_stay_in_the_vocabulary() {
        let mut model = model();
        assert!(model.set_unk_token("<missing>".into()).is_err());
        assert_eq!(model.get_unk_token(), "[UNK]");
        let tokens = model.tokenize("xyz").unwrap();
        assert_eq!(tokens, vec![Token::new(2, "[UNK]".into(), (0, 3))]);

        model.set_unk_token("un".into()).unwrap();
        let tokens = model.tokenize("xyz").unwrap();
        assert_eq!(tokens, vec![Token::new(0, "un".into(), (0, 3))]);
    }

    #[test]
    fn read_file_numbers_lines() {
        let path = std::env::temp_dir().join(format!("textpiece-wp-{}.txt", std::process::id()));
        std::fs::write(&path, "[UNK]\nun\n##able\n").unwrap();
        let model = WordPiece::from_file(path.to_str().unwrap()).build().unwrap();
        assert_eq!(model.token_to_id("##able"), Some(2));
        assert_eq!(model.id_to_token(0).as_deref(), Some("[UNK]"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unk_token_is_required() {
        let result = WordPiece::builder()
            .vocab([("a".to_string(), 0)].into_iter().collect())
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
