// src/tokenizer/models.rs

use std::collections::HashMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::tokenizer::bpe::BPE;
use crate::tokenizer::unigram::Unigram;
use crate::tokenizer::wordlevel::WordLevel;
use crate::tokenizer::wordpiece::WordPiece;
use crate::tokenizer::{Model, Result, Token};

/// A vocabulary that serializes its entries ordered by id, so saved files are
/// stable and readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct OrderedVocab(pub HashMap<String, u32>);

impl Serialize for OrderedVocab {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut entries = self.0.iter().collect::<Vec<_>>();
        entries.sort_unstable_by_key(|(token, id)| (**id, token.as_str()));
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (token, id) in entries {
            map.serialize_entry(token, id)?;
        }
        map.end()
    }
}

/// Every model a `Tokenizer` can run, tagged by `"type"` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ModelWrapper {
    BPE(BPE),
    WordPiece(WordPiece),
    WordLevel(WordLevel),
    Unigram(Unigram),
}

impl ModelWrapper {
    /// Drop the cached merges or segmentations, if the model keeps any.
    pub fn clear_cache(&self) {
        match self {
            Self::BPE(bpe) => bpe.clear_cache(),
            Self::Unigram(unigram) => unigram.clear_cache(),
            Self::WordPiece(_) | Self::WordLevel(_) => {}
        }
    }
}

impl Model for ModelWrapper {
    fn tokenize(&self, sequence: &str) -> Result<Vec<Token>> {
        match self {
            Self::BPE(t) => t.tokenize(sequence),
            Self::WordPiece(t) => t.tokenize(sequence),
            Self::WordLevel(t) => t.tokenize(sequence),
            Self::Unigram(t) => t.tokenize(sequence),
        }
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        match self {
            Self::BPE(t) => t.token_to_id(token),
            Self::WordPiece(t) => t.token_to_id(token),
            Self::WordLevel(t) => t.token_to_id(token),
            Self::Unigram(t) => t.token_to_id(token),
        }
    }

    fn id_to_token(&self, id: u32) -> Option<String> {
        match self {
            Self::BPE(t) => t.id_to_token(id),
            Self::WordPiece(t) => t.id_to_token(id),
            Self::WordLevel(t) => t.id_to_token(id),
            Self::Unigram(t) => t.id_to_token(id),
        }
    }

    fn get_vocab(&self) -> HashMap<String, u32> {
        match self {
            Self::BPE(t) => Model::get_vocab(t),
            Self::WordPiece(t) => t.get_vocab(),
            Self::WordLevel(t) => t.get_vocab(),
            Self::Unigram(t) => t.get_vocab(),
        }
    }

    fn get_vocab_size(&self) -> usize {
        match self {
            Self::BPE(t) => t.get_vocab_size(),
            Self::WordPiece(t) => t.get_vocab_size(),
            Self::WordLevel(t) => t.get_vocab_size(),
            Self::Unigram(t) => t.get_vocab_size(),
        }
    }
}

impl From<BPE> for ModelWrapper {
    fn from(model: BPE) -> Self {
        Self::BPE(model)
    }
}

impl From<WordPiece> for ModelWrapper {
    fn from(model: WordPiece) -> Self {
        Self::WordPiece(model)
    }
}

impl From<WordLevel> for ModelWrapper {
    fn from(model: WordLevel) -> Self {
        Self::WordLevel(model)
    }
}

impl From<Unigram> for ModelWrapper {
    fn from(model: Unigram) -> Self {
        Self::Unigram(model)
    }
}
