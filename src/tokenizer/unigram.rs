// src/tokenizer/unigram.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tokenizer::cache::{Cache, MAX_LENGTH};
use crate::tokenizer::lattice::Lattice;
use crate::tokenizer::trie::Trie;
use crate::tokenizer::{Error, Model, Result, Token};

/// Score given to unknown pieces, below the lowest vocabulary score.
const K_UNK_PENALTY: f64 = 10.0;

/// A Unigram language model: each piece has a log probability and a word is
/// segmented into the pieces maximizing the total score (Viterbi over the
/// lattice of every vocabulary match).
#[derive(Debug, Serialize, Deserialize)]
#[serde(try_from = "UnigramRepr", into = "UnigramRepr")]
pub struct Unigram {
    token_to_ids: HashMap<String, u32>,
    vocab: Vec<(String, f64)>,
    cache: Cache<String, Vec<String>>,
    trie: Trie,
    min_score: f64,
    unk_id: usize,
    bos_id: usize,
    eos_id: usize,
    fuse_unk: bool,
    byte_fallback: bool,
}

impl Default for Unigram {
    fn default() -> Self {
        let mut trie = Trie::default();
        trie.push(b"<unk>");
        Self {
            token_to_ids: HashMap::from([("<unk>".to_owned(), 0)]),
            vocab: vec![("<unk>".to_owned(), 0.0)],
            cache: Cache::default(),
            trie,
            min_score: 0.0,
            unk_id: 0,
            bos_id: 1,
            eos_id: 2,
            fuse_unk: true,
            byte_fallback: false,
        }
    }
}

impl Clone for Unigram {
    // The cache is not shared between clones.
    fn clone(&self) -> Self {
        Self {
            token_to_ids: self.token_to_ids.clone(),
            vocab: self.vocab.clone(),
            cache: self.cache.fresh(),
            trie: self.trie.clone(),
            min_score: self.min_score,
            unk_id: self.unk_id,
            bos_id: self.bos_id,
            eos_id: self.eos_id,
            fuse_unk: self.fuse_unk,
            byte_fallback: self.byte_fallback,
        }
    }
}

impl PartialEq for Unigram {
    fn eq(&self, other: &Self) -> bool {
        self.vocab == other.vocab
            && self.unk_id == other.unk_id
            && self.fuse_unk == other.fuse_unk
            && self.byte_fallback == other.byte_fallback
    }
}

impl Unigram {
    /// Create a model from `(piece, log probability)` pairs. The id of a piece is
    /// its index; `unk_id` must point inside the vocabulary.
    pub fn from(vocab: Vec<(String, f64)>, unk_id: usize, byte_fallback: bool) -> Result<Self> {
        if vocab.is_empty() {
            return Err(Error::config("a Unigram model needs a non-empty vocabulary"));
        }
        if unk_id >= vocab.len() {
            return Err(Error::config(format!(
                "unk id {unk_id} is outside the vocabulary of size {}",
                vocab.len()
            )));
        }

        let mut token_to_ids = HashMap::with_capacity(vocab.len());
        let mut trie = Trie::default();
        let mut min_score = f64::INFINITY;
        for (id, (token, score)) in vocab.iter().enumerate() {
            if token_to_ids.insert(token.clone(), id as u32).is_some() {
                return Err(Error::config(format!(
                    "piece `{token}` appears twice in the vocabulary"
                )));
            }
            trie.push(token.as_bytes());
            min_score = min_score.min(*score);
        }

        let n = vocab.len();
        debug!(vocab_size = n, unk_id, byte_fallback, "built Unigram model");
        Ok(Self {
            token_to_ids,
            vocab,
            cache: Cache::default(),
            trie,
            min_score,
            unk_id,
            bos_id: n + 1,
            eos_id: n + 2,
            fuse_unk: true,
            byte_fallback,
        })
    }

    pub fn get_unk_id(&self) -> usize {
        self.unk_id
    }

    pub fn byte_fallback(&self) -> bool {
        self.byte_fallback
    }

    pub fn fuse_unk(&self) -> bool {
        self.fuse_unk
    }

    /// Merge consecutive unknown pieces into a single unknown token. Cached
    /// segmentations are dropped since they depend on this flag.
    pub fn set_fuse_unk(&mut self, fuse_unk: bool) {
        if self.fuse_unk != fuse_unk {
            self.fuse_unk = fuse_unk;
            self.clear_cache();
        }
    }

    pub fn get_min_score(&self) -> f64 {
        self.min_score
    }

    /// `(piece, score)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, f64)> {
        self.vocab.iter()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Fill the lattice with every vocabulary match. A char starting no single
    /// char piece gets an unknown node so every position stays reachable.
    fn populate_nodes(&self, lattice: &mut Lattice) {
        let unk_score = self.min_score - K_UNK_PENALTY;
        let sentence = lattice.sentence();
        let len = sentence.len();

        let mut nodes = vec![];
        let mut begin_pos = 0;
        while begin_pos < len {
            let mblen = sentence[begin_pos..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);

            let mut has_single_node = false;
            for n in self
                .trie
                .common_prefix_search(sentence.bytes().skip(begin_pos))
            {
                let Some(&id) = self.token_to_ids.get(&sentence[begin_pos..begin_pos + n]) else {
                    continue;
                };
                nodes.push((begin_pos, n, self.vocab[id as usize].1, id as usize));
                has_single_node |= n == mblen;
            }
            if !has_single_node {
                nodes.push((begin_pos, mblen, unk_score, self.unk_id));
            }
            begin_pos += mblen;
        }

        for (pos, length, score, id) in nodes {
            lattice.insert(pos, length, score, id);
        }
    }

    /// Segment `sentence` into pieces. Unknown spans come back as raw text.
    pub fn encode(&self, sentence: &str) -> Result<Vec<String>> {
        if sentence.is_empty() {
            return Ok(vec![]);
        }
        if let Some(result) = self.cache.get(sentence) {
            return Ok(result);
        }
        let result = self.encode_no_cache(sentence);
        if sentence.len() < MAX_LENGTH {
            self.cache.set(sentence.to_owned(), result.clone());
        }
        Ok(result)
    }

    fn encode_no_cache(&self, sentence: &str) -> Vec<String> {
        let mut lattice = Lattice::from(sentence, self.bos_id, self.eos_id);
        self.populate_nodes(&mut lattice);
        let path = lattice.viterbi();

        if !self.fuse_unk {
            return path.iter().map(|n| lattice.piece(n).to_owned()).collect();
        }

        let mut results = Vec::with_capacity(path.len());
        let mut unknown = String::new();
        for node in &path {
            let piece = lattice.piece(node);
            if node.id == self.unk_id {
                unknown.push_str(piece);
            } else {
                if !unknown.is_empty() {
                    results.push(std::mem::take(&mut unknown));
                }
                results.push(piece.to_owned());
            }
        }
        if !unknown.is_empty() {
            results.push(unknown);
        }
        results
    }

    fn byte_tokens(&self, piece: &str, offset: usize) -> Option<Vec<Token>> {
        piece
            .bytes()
            .enumerate()
            .map(|(i, byte)| {
                let value = format!("<0x{byte:02X}>");
                let id = *self.token_to_ids.get(&value)?;
                Some(Token::new(id, value, (offset + i, offset + i + 1)))
            })
            .collect()
    }
}

impl Model for Unigram {
    fn tokenize(&self, sentence: &str) -> Result<Vec<Token>> {
        let pieces = self.encode(sentence)?;
        let mut tokens = Vec::with_capacity(pieces.len());
        let mut offset = 0;
        for piece in pieces {
            let len = piece.len();
            let offsets = (offset, offset + len);
            match self.token_to_ids.get(&piece) {
                Some(id) => tokens.push(Token::new(*id, piece, offsets)),
                None => {
                    let byte_tokens = if self.byte_fallback {
                        self.byte_tokens(&piece, offset)
                    } else {
                        None
                    };
                    match byte_tokens {
                        Some(byte_tokens) => tokens.extend(byte_tokens),
                        None => tokens.push(Token::new(
                            self.unk_id as u32,
                            self.vocab[self.unk_id].0.clone(),
                            offsets,
                        )),
                    }
                }
            }
            offset += len;
        }
        Ok(tokens)
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.token_to_ids.get(token).copied()
    }

    fn id_to_token(&self, id: u32) -> Option<String> {
        self.vocab.get(id as usize).map(|(token, _)| token.clone())
    }

    fn get_vocab(&self) -> HashMap<String, u32> {
        self.token_to_ids.clone()
    }

    fn get_vocab_size(&self) -> usize {
        self.vocab.len()
    }
}

#[derive(Serialize, Deserialize)]
struct UnigramRepr {
    unk_id: Option<usize>,
    vocab: Vec<(String, f64)>,
    #[serde(default)]
    byte_fallback: bool,
    #[serde(default = "default_fuse_unk")]
    fuse_unk: bool,
}

fn default_fuse_unk() -> bool {
    true
}

impl From<Unigram> for UnigramRepr {
    fn from(model: Unigram) -> Self {
        Self {
            unk_id: Some(model.unk_id),
            vocab: model.vocab,
            byte_fallback: model.byte_fallback,
            fuse_unk: model.fuse_unk,
        }
    }
}

impl TryFrom<UnigramRepr> for Unigram {
    type Error = Error;

    fn try_from(repr: UnigramRepr) -> Result<Self> {
        let unk_id = repr
            .unk_id
            .ok_or_else(|| Error::config("a Unigram model needs an unk_id"))?;
        let mut model = Unigram::from(repr.vocab, unk_id, repr.byte_fallback)?;
        model.fuse_unk = repr.fuse_unk;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(entries: &[(&str, f64)]) -> Vec<(String, f64)> {
        entries.iter().map(|(t, s)| (t.to_string(), *s)).collect()
    }

    fn model() -> Unigram {
        Unigram::from(
            vocab(&[
                ("<unk>", 0.0),
                ("a", -1.0),
                ("b", -1.0),
                ("c", -1.0),
                ("ab", -1.5),
                ("bc", -2.5),
            ]),
            0,
            false,
        )
        .unwrap()
    }

    fn ids_and_offsets(tokens: &[Token]) -> Vec<(u32, (usize, usize))> {
        tokens.iter().map(|t| (t.id, t.offsets)).collect()
    }

    #[test]
    fn best_segmentation_wins() {
        let model = model();
        assert_eq!(model.encode("abc").unwrap(), vec!["ab", "c"]);
        let tokens = model.tokenize("abc").unwrap();
        assert_eq!(ids_and_offsets(&tokens), vec![(4, (0, 2)), (3, (2, 3))]);
    }

    #[test]
    fn unknown_chars_are_fused() {
        let mut model = model();
        let tokens = model.tokenize("xyab").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::new(0, "<unk>".into(), (0, 2)),
                Token::new(4, "ab".into(), (2, 4)),
            ]
        );

        // The segmentation of "xyab" is cached by now.
        model.set_fuse_unk(false);
        let tokens = model.tokenize("xyab").unwrap();
        assert_eq!(
            ids_and_offsets(&tokens),
            vec![(0, (0, 1)), (0, (1, 2)), (4, (2, 4))]
        );
    }

    #[test]
    fn multibyte_unknowns_keep_char_boundaries() {
        let model = model();
        let tokens = model.tokenize("éa").unwrap();
        assert_eq!(ids_and_offsets(&tokens), vec![(0, (0, 2)), (1, (2, 3))]);
    }

    #[test]
    fn byte_fallback_replaces_unknowns() {
        let model = Unigram::from(
            vocab(&[("<unk>", 0.0), ("<0x78>", -5.0), ("a", -1.0)]),
            0,
            true,
        )
        .unwrap();
        let tokens = model.tokenize("xa").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::new(1, "<0x78>".into(), (0, 1)),
                Token::new(2, "a".into(), (1, 2)),
            ]
        );
        // No byte token for `y`.
        let tokens = model.tokenize("y").unwrap();
        assert_eq!(tokens, vec![Token::new(0, "<unk>".into(), (0, 1))]);
    }

    #[test]
    fn invalid_configurations() {
        assert!(Unigram::from(vec![], 0, false).is_err());
        assert!(Unigram::from(vocab(&[("a", -1.0)]), 1, false).is_err());
        assert!(Unigram::from(vocab(&[("a", -1.0), ("a", -2.0)]), 0, false).is_err());
    }

    #[test]
    fn serde_round_trip() {
        let model = model();
        let json = serde_json::to_string(&model).unwrap();
        assert!(json.starts_with(r#"{"unk_id":0,"vocab":[["<unk>",0.0],["a",-1.0]"#));
        let back: Unigram = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
        assert_eq!(back.get_min_score(), -2.5);
    }

    #[test]
    fn default_model_only_knows_unk() {
        let model = Unigram::default();
        assert_eq!(model.get_vocab_size(), 1);
        let tokens = model.tokenize("hi").unwrap();
        assert_eq!(tokens, vec![Token::new(0, "<unk>".into(), (0, 2))]);
    }

    #[test]
    fn unk_id_must_be_in_range() {
        assert_eq!(model().get_unk_id(), 0);
        assert!(Unigram::from(vocab(&[("a", -1.0)]), 1, false).is_err());
        assert!(Unigram::from(vec![], 0, false).is_err());
    }

    #[test]
    fn fuse_unk_survives_serialization() {
        let mut model = Unigram::from(vocab(&[("<unk>", 0.0), ("a", -1.0)]), 0, false).unwrap();
        model.set_fuse_unk(false);
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(
            json,
            r#"{"unk_id":0,"vocab":[["<unk>",0.0],["a",-1.0]],"byte_fallback":false,"fuse_unk":false}"#
        );

        let restored: Unigram = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, model);
        assert_eq!(restored.encode("xy").unwrap(), vec!["x", "y"]);

        // Files without the field keep fusing.
        let restored: Unigram =
            serde_json::from_str(r#"{"unk_id":0,"vocab":[["<unk>",0.0],["a",-1.0]]}"#).unwrap();
        assert!(restored.fuse_unk());
        assert_eq!(restored.encode("xy").unwrap(), vec!["xy"]);
    }
}
