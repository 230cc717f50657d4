// src/tokenizer/wordlevel.rs

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tokenizer::models::OrderedVocab;
use crate::tokenizer::{Error, Model, Result, Token};

struct Config {
    files: Option<String>,
    vocab: HashMap<String, u32>,
    unk_token: String,
}

pub struct WordLevelBuilder {
    config: Config,
}

impl Default for WordLevelBuilder {
    fn default() -> Self {
        Self {
            config: Config {
                files: None,
                vocab: HashMap::new(),
                unk_token: String::from("<unk>"),
            },
        }
    }
}

impl WordLevelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the vocabulary from a JSON file when building.
    #[must_use]
    pub fn files(mut self, vocab: String) -> Self {
        self.config.files = Some(vocab);
        self
    }

    #[must_use]
    pub fn vocab(mut self, vocab: HashMap<String, u32>) -> Self {
        self.config.vocab = vocab;
        self
    }

    #[must_use]
    pub fn unk_token(mut self, unk_token: String) -> Self {
        self.config.unk_token = unk_token;
        self
    }

    pub fn build(mut self) -> Result<WordLevel> {
        if let Some(vocab) = self.config.files.take() {
            self.config.vocab = WordLevel::read_file(&vocab)?;
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
        debug!(vocab_size = vocab.len(), "built WordLevel model");
        Ok(WordLevel {
            vocab,
            vocab_r,
            unk_token: self.config.unk_token,
        })
    }
}

/// Maps each pretoken as a whole to its id, or to the unknown token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WordLevelRepr", into = "WordLevelRepr")]
pub struct WordLevel {
    vocab: HashMap<String, u32>,
    vocab_r: HashMap<u32, String>,
    unk_token: String,
}

impl WordLevel {
    pub fn builder() -> WordLevelBuilder {
        WordLevelBuilder::new()
    }

    /// Read a `{"token": id}` JSON file.
    pub fn read_file<P: AsRef<Path>>(vocab_path: P) -> Result<HashMap<String, u32>> {
        Ok(serde_json::from_str(&fs::read_to_string(vocab_path)?)?)
    }

    pub fn from_file(vocab_path: &str, unk_token: String) -> Result<Self> {
        Self::builder()
            .files(vocab_path.to_owned())
            .unk_token(unk_token)
            .build()
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
}

impl Model for WordLevel {
    fn tokenize(&self, token: &str) -> Result<Vec<Token>> {
        if token.is_empty() {
            return Ok(vec![]);
        }
        let (id, value) = match self.vocab.get(token) {
            Some(id) => (*id, token.to_owned()),
            None => {
                let id = self.vocab.get(&self.unk_token).ok_or_else(|| {
                    Error::config(format!(
                        "unk token `{}` is not in the vocabulary",
                        self.unk_token
                    ))
                })?;
                (*id, self.unk_token.clone())
            }
        };
        Ok(vec![Token::new(id, value, (0, token.len()))])
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
struct WordLevelRepr {
    vocab: OrderedVocab,
    unk_token: String,
}

impl From<WordLevel> for WordLevelRepr {
    fn from(model: WordLevel) -> Self {
        Self {
            vocab: OrderedVocab(model.vocab),
            unk_token: model.unk_token,
        }
    }
}

impl TryFrom<WordLevelRepr> for WordLevel {
    type Error = Error;

    fn try_from(repr: WordLevelRepr) -> Result<Self> {
        WordLevel::builder()
            .vocab(repr.vocab.0)
            .unk_token(repr.unk_token)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> WordLevel {
        WordLevel::builder()
            .vocab(
                [("<unk>", 0), ("hello", 1), ("world", 2)]
                    .into_iter()
                    .map(|(t, id)| (t.to_string(), id))
                    .collect(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn whole_words_or_unk() {
        let model = model();
        assert_eq!(
            model.tokenize("hello").unwrap(),
            vec![Token::new(1, "hello".into(), (0, 5))]
        );
        assert_eq!(
            model.tokenize("xyz").unwrap(),
            vec![Token::new(0, "<unk>".into(), (0, 3))]
        );
        assert!(model.tokenize("").unwrap().is_empty());
    }

    #[test]
    fn unk_token_is_required() {
        let result = WordLevel::builder()
            .vocab([("a".to_string(), 0)].into_iter().collect())
            .build();
        assert!(matches!(result, Err(Error::Config(_))));

        let mut model = model();
        assert!(matches!(
            model.set_unk_token("[UNK]".into()),
            Err(Error::Config(_))
        ));
        assert_eq!(
            model.tokenize("xyz").unwrap(),
            vec![Token::new(0, "<unk>".into(), (0, 3))]
        );
    }

    #[test]
    fn lookups() {
        let model = model();
        assert_eq!(model.token_to_id("world"), Some(2));
        assert_eq!(model.id_to_token(2).as_deref(), Some("world"));
        assert_eq!(model.id_to_token(7), None);
        assert_eq!(model.get_vocab_size(), 3);
    }
}
