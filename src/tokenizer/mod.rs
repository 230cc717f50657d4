// src/tokenizer/mod.rs

pub mod added_vocabulary;
pub mod bpe;
pub mod cache;
pub mod decoders;
pub mod encoding;
pub mod first_last_iterator;
pub mod lattice;
pub mod models;
pub mod normalizer;
pub mod normalizers;
pub mod padding;
pub mod pair;
pub mod parallelism;
pub mod pattern;
pub mod pre_tokenizer;
pub mod pre_tokenizers;
pub mod processors;
pub mod result;
pub mod scripts;
mod serialization;
pub mod trie;
pub mod truncation;
pub mod unigram;
pub mod word;
pub mod wordlevel;
pub mod wordpiece;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

pub use added_vocabulary::{AddedToken, AddedVocabulary};
pub use bpe::{BpeBuilder, BPE};
pub use decoders::DecoderWrapper;
pub use encoding::Encoding;
pub use first_last_iterator::{FirstLastIterator, WithFirstLastIterator};
pub use models::ModelWrapper;
pub use normalizer::{NormalizedString, Range, SplitDelimiterBehavior};
pub use normalizers::NormalizerWrapper;
pub use padding::{pad_encodings, PaddingDirection, PaddingParams, PaddingStrategy};
pub use pair::Pair;
pub use parallelism::*;
pub use pre_tokenizer::{ByteLevel, PreTokenizedString};
pub use pre_tokenizers::PreTokenizerWrapper;
pub use processors::PostProcessorWrapper;
pub use result::{Error, Result};
pub use truncation::{
    truncate_encodings, TruncationDirection, TruncationParams, TruncationStrategy,
};
pub use unigram::Unigram;
pub use word::Word;
pub use wordlevel::{WordLevel, WordLevelBuilder};
pub use wordpiece::{WordPiece, WordPieceBuilder};

/// Byte range `(start, end)`.
pub type Offsets = (usize, usize);

/// Rewrites a `NormalizedString` in place, keeping its alignments valid.
pub trait Normalizer {
    fn normalize(&self, normalized: &mut NormalizedString) -> Result<()>;
}

/// Cuts a `PreTokenizedString` into the pieces handed to the model.
pub trait PreTokenizer {
    fn pre_tokenize(&self, pretokenized: &mut PreTokenizedString) -> Result<()>;
}

/// A subword model. `tokenize` never fails on unknown input: what the
/// vocabulary does not cover becomes the unknown token, byte tokens, or is
/// dropped, depending on the model configuration.
pub trait Model {
    /// Tokens of one pretoken, offsets relative to the pretoken.
    fn tokenize(&self, sequence: &str) -> Result<Vec<Token>>;
    fn token_to_id(&self, token: &str) -> Option<u32>;
    fn id_to_token(&self, id: u32) -> Option<String>;
    fn get_vocab(&self) -> HashMap<String, u32>;
    fn get_vocab_size(&self) -> usize;
}

/// Assembles the final encoding: special tokens, type ids, sequence ranges.
pub trait PostProcessor {
    /// Number of special tokens added to a single sequence or to a pair.
    fn added_tokens(&self, is_pair: bool) -> usize;

    /// Process the encodings of each sequence, returning encodings that are
    /// then merged together.
    fn process_encodings(
        &self,
        encodings: Vec<Encoding>,
        add_special_tokens: bool,
    ) -> Result<Vec<Encoding>>;

    fn process(
        &self,
        encoding: Encoding,
        pair_encoding: Option<Encoding>,
        add_special_tokens: bool,
    ) -> Result<Encoding> {
        let encodings = prepare_sequences(encoding, pair_encoding);
        let encodings = self.process_encodings(encodings, add_special_tokens)?;
        Ok(Encoding::merge(encodings, false))
    }
}

/// Tag each encoding (and its overflowing parts) with its sequence index and
/// the matching type id.
pub(crate) fn prepare_sequences(
    encoding: Encoding,
    pair_encoding: Option<Encoding>,
) -> Vec<Encoding> {
    let mut encodings = match pair_encoding {
        Some(pair) => vec![encoding, pair],
        None => vec![encoding],
    };
    for (i, encoding) in encodings.iter_mut().enumerate() {
        encoding.set_sequence_id(i);
        encoding.set_type_ids(vec![i as u32; encoding.len()]);
        for overflowing in encoding.get_overflowing_mut() {
            overflowing.set_sequence_id(i);
            overflowing.set_type_ids(vec![i as u32; overflowing.len()]);
        }
    }
    encodings
}

/// Turns a list of tokens back into text.
pub trait Decoder {
    fn decode(&self, tokens: Vec<String>) -> Result<String> {
        let results = self.decode_chain(tokens)?;
        Ok(results.join(""))
    }

    /// Per-token decoding step, chained by `decoders::Sequence`.
    fn decode_chain(&self, tokens: Vec<String>) -> Result<Vec<String>>;
}

/// One token produced by a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub id: u32,
    pub value: String,
    pub offsets: Offsets,
}

impl Token {
    pub fn new(id: u32, value: String, offsets: Offsets) -> Self {
        Token { id, value, offsets }
    }
}

/// A sequence to encode, alone or with its pair.
#[derive(Debug, Clone)]
pub enum EncodeInput<'s> {
    Single(Cow<'s, str>),
    Dual(Cow<'s, str>, Cow<'s, str>),
}

impl<'s> From<&'s str> for EncodeInput<'s> {
    fn from(input: &'s str) -> Self {
        Self::Single(Cow::Borrowed(input))
    }
}

impl<'s> From<&'s String> for EncodeInput<'s> {
    fn from(input: &'s String) -> Self {
        Self::Single(Cow::Borrowed(input.as_str()))
    }
}

impl From<String> for EncodeInput<'_> {
    fn from(input: String) -> Self {
        Self::Single(Cow::Owned(input))
    }
}

impl<'s> From<(&'s str, &'s str)> for EncodeInput<'s> {
    fn from((first, second): (&'s str, &'s str)) -> Self {
        Self::Dual(Cow::Borrowed(first), Cow::Borrowed(second))
    }
}

impl From<(String, String)> for EncodeInput<'_> {
    fn from((first, second): (String, String)) -> Self {
        Self::Dual(Cow::Owned(first), Cow::Owned(second))
    }
}

struct Config {
    normalizer: Option<NormalizerWrapper>,
    pre_tokenizer: Option<PreTokenizerWrapper>,
    model: Option<ModelWrapper>,
    post_processor: Option<PostProcessorWrapper>,
    decoder: Option<DecoderWrapper>,
    added_tokens: Vec<AddedToken>,
    truncation: Option<TruncationParams>,
    padding: Option<PaddingParams>,
}

/// Builds a `Tokenizer`, validating the whole configuration at once.
pub struct TokenizerBuilder {
    config: Config,
}

impl Default for TokenizerBuilder {
    fn default() -> Self {
        Self {
            config: Config {
                normalizer: None,
                pre_tokenizer: None,
                model: None,
                post_processor: None,
                decoder: None,
                added_tokens: vec![],
                truncation: None,
                padding: None,
            },
        }
    }
}

impl TokenizerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<ModelWrapper>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_normalizer(mut self, normalizer: Option<NormalizerWrapper>) -> Self {
        self.config.normalizer = normalizer;
        self
    }

    #[must_use]
    pub fn with_pre_tokenizer(mut self, pre_tokenizer: Option<PreTokenizerWrapper>) -> Self {
        self.config.pre_tokenizer = pre_tokenizer;
        self
    }

    #[must_use]
    pub fn with_post_processor(mut self, post_processor: Option<PostProcessorWrapper>) -> Self {
        self.config.post_processor = post_processor;
        self
    }

    #[must_use]
    pub fn with_decoder(mut self, decoder: Option<DecoderWrapper>) -> Self {
        self.config.decoder = decoder;
        self
    }

    /// Tokens added on top of the model vocabulary, special or not.
    #[must_use]
    pub fn with_added_tokens(mut self, tokens: Vec<AddedToken>) -> Self {
        self.config.added_tokens = tokens;
        self
    }

    #[must_use]
    pub fn with_truncation(mut self, truncation: Option<TruncationParams>) -> Self {
        self.config.truncation = truncation;
        self
    }

    #[must_use]
    pub fn with_padding(mut self, padding: Option<PaddingParams>) -> Self {
        self.config.padding = padding;
        self
    }

    pub fn build(self) -> Result<Tokenizer> {
        let config = self.config;
        let model = config
            .model
            .ok_or_else(|| Error::config("a model is required to build a tokenizer"))?;

        let mut tokenizer = Tokenizer::new(model);
        tokenizer.normalizer = config.normalizer;
        tokenizer.pre_tokenizer = config.pre_tokenizer;
        tokenizer.post_processor = config.post_processor;
        tokenizer.decoder = config.decoder;
        tokenizer.add_tokens(&config.added_tokens)?;
        tokenizer.with_truncation(config.truncation)?;
        tokenizer.with_padding(config.padding)?;

        debug!(
            vocab_size = tokenizer.get_vocab_size(true),
            added_tokens = tokenizer.added_vocabulary.len(),
            "built tokenizer"
        );
        Ok(tokenizer)
    }
}

/// The full pipeline: normalizer, pre-tokenizer, model, post-processor and
/// decoder, plus the added vocabulary and the truncation / padding settings.
///
/// Encoding only needs `&self`, so a tokenizer can be shared between threads.
/// `add_tokens` and the `with_*` setters need `&mut self`.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    normalizer: Option<NormalizerWrapper>,
    pre_tokenizer: Option<PreTokenizerWrapper>,
    model: ModelWrapper,
    post_processor: Option<PostProcessorWrapper>,
    decoder: Option<DecoderWrapper>,
    added_vocabulary: AddedVocabulary,
    truncation: Option<TruncationParams>,
    padding: Option<PaddingParams>,
}

impl Tokenizer {
    /// A tokenizer with only a model; every other stage is a pass-through.
    pub fn new(model: impl Into<ModelWrapper>) -> Self {
        Self {
            normalizer: None,
            pre_tokenizer: None,
            model: model.into(),
            post_processor: None,
            decoder: None,
            added_vocabulary: AddedVocabulary::new(),
            truncation: None,
            padding: None,
        }
    }

    pub fn builder() -> TokenizerBuilder {
        TokenizerBuilder::new()
    }

    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let content = std::fs::read_to_string(file)?;
        content.parse()
    }

    /// Serialize the whole pipeline to JSON.
    pub fn to_string(&self, pretty: bool) -> Result<String> {
        Ok(if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, pretty: bool) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        if pretty {
            serde_json::to_writer_pretty(&mut writer, self)?;
        } else {
            serde_json::to_writer(&mut writer, self)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Replace the normalizer. Normalized added tokens are indexed again with
    /// the new one.
    pub fn with_normalizer(
        &mut self,
        normalizer: Option<impl Into<NormalizerWrapper>>,
    ) -> Result<&mut Self> {
        self.normalizer = normalizer.map(Into::into);
        self.added_vocabulary
            .refresh_added_tokens(self.normalizer.as_ref())?;
        Ok(self)
    }

    pub fn get_normalizer(&self) -> Option<&NormalizerWrapper> {
        self.normalizer.as_ref()
    }

    pub fn with_pre_tokenizer(
        &mut self,
        pre_tokenizer: Option<impl Into<PreTokenizerWrapper>>,
    ) -> &mut Self {
        self.pre_tokenizer = pre_tokenizer.map(Into::into);
        self
    }

    pub fn get_pre_tokenizer(&self) -> Option<&PreTokenizerWrapper> {
        self.pre_tokenizer.as_ref()
    }

    /// Set the post-processor. The current truncation settings are checked
    /// again, since the number of special tokens may have changed.
    pub fn with_post_processor(
        &mut self,
        post_processor: Option<impl Into<PostProcessorWrapper>>,
    ) -> Result<&mut Self> {
        let previous = std::mem::replace(&mut self.post_processor, post_processor.map(Into::into));
        if let Some(truncation) = &self.truncation {
            if let Err(e) = self.check_truncation(truncation) {
                self.post_processor = previous;
                return Err(e);
            }
        }
        Ok(self)
    }

    pub fn get_post_processor(&self) -> Option<&PostProcessorWrapper> {
        self.post_processor.as_ref()
    }

    pub fn with_decoder(&mut self, decoder: Option<impl Into<DecoderWrapper>>) -> &mut Self {
        self.decoder = decoder.map(Into::into);
        self
    }

    pub fn get_decoder(&self) -> Option<&DecoderWrapper> {
        self.decoder.as_ref()
    }

    pub fn with_model(&mut self, model: impl Into<ModelWrapper>) -> &mut Self {
        self.model = model.into();
        self
    }

    pub fn get_model(&self) -> &ModelWrapper {
        &self.model
    }

    fn check_truncation(&self, truncation: &TruncationParams) -> Result<()> {
        let n_added = self.get_n_added_tokens(false);
        if truncation.max_length <= n_added {
            return Err(Error::config(format!(
                "max_length ({}) must be greater than the number of special tokens added to a sequence ({n_added})",
                truncation.max_length
            )));
        }
        let effective = truncation.max_length - n_added;
        if truncation.stride >= effective {
            return Err(Error::config(format!(
                "stride ({}) must be strictly less than the truncated length ({effective})",
                truncation.stride
            )));
        }
        if truncation.strategy == TruncationStrategy::LongestFirst {
            // A pair is split in two, with or without its special tokens.
            let n_added_pair = self.get_n_added_tokens(true);
            let budgets = [
                truncation.max_length.saturating_sub(n_added_pair),
                truncation.max_length,
            ];
            for budget in budgets {
                let half = match budget / 2 {
                    0 => budget,
                    half => half,
                };
                if half > 0 && truncation.stride >= half {
                    return Err(Error::config(format!(
                        "stride ({}) must be strictly less than the truncated length of each pair sequence ({half})",
                        truncation.stride
                    )));
                }
            }
        }
        Ok(())
    }

    /// Enable or disable truncation. The parameters are validated against the
    /// current post-processor right away.
    pub fn with_truncation(&mut self, truncation: Option<TruncationParams>) -> Result<&mut Self> {
        if let Some(params) = &truncation {
            self.check_truncation(params)?;
        }
        self.truncation = truncation;
        Ok(self)
    }

    pub fn get_truncation(&self) -> Option<&TruncationParams> {
        self.truncation.as_ref()
    }

    pub fn with_padding(&mut self, padding: Option<PaddingParams>) -> Result<&mut Self> {
        if let Some(PaddingParams {
            pad_to_multiple_of: Some(0),
            ..
        }) = &padding
        {
            return Err(Error::config("pad_to_multiple_of must be greater than 0"));
        }
        self.padding = padding;
        Ok(self)
    }

    pub fn get_padding(&self) -> Option<&PaddingParams> {
        self.padding.as_ref()
    }

    pub fn get_vocab(&self, with_added_tokens: bool) -> HashMap<String, u32> {
        let mut vocab = self.model.get_vocab();
        if with_added_tokens {
            vocab.extend(
                self.added_vocabulary
                    .get_vocab()
                    .iter()
                    .map(|(token, id)| (token.clone(), *id)),
            );
        }
        vocab
    }

    pub fn get_added_tokens_decoder(&self) -> HashMap<u32, AddedToken> {
        self.added_vocabulary.get_added_tokens_decoder().clone()
    }

    pub fn get_vocab_size(&self, with_added_tokens: bool) -> usize {
        if with_added_tokens {
            self.get_vocab(true).len()
        } else {
            self.model.get_vocab_size()
        }
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.added_vocabulary.token_to_id(token, &self.model)
    }

    pub fn id_to_token(&self, id: u32) -> Option<String> {
        self.added_vocabulary.id_to_token(id, &self.model)
    }

    pub fn set_encode_special_tokens(&mut self, value: bool) {
        self.added_vocabulary.set_encode_special_tokens(value);
    }

    pub fn get_encode_special_tokens(&self) -> bool {
        self.added_vocabulary.get_encode_special_tokens()
    }

    /// Normalize and pre-tokenize `sequence`, returning the pieces that would be
    /// handed to the model with their offsets in `sequence`.
    pub fn pre_tokenize_str(&self, sequence: &str) -> Result<Vec<(String, Offsets)>> {
        let pretokenized = self.do_pre_tokenize(sequence)?;
        Ok(pretokenized
            .get_splits()
            .into_iter()
            .map(|(s, offsets, _)| (s.to_owned(), offsets))
            .collect())
    }

    fn do_pre_tokenize(&self, sequence: &str) -> Result<PreTokenizedString> {
        let mut pretokenized = self
            .added_vocabulary
            .extract_and_normalize(self.normalizer.as_ref(), sequence)?;
        if let Some(pre_tokenizer) = &self.pre_tokenizer {
            pre_tokenizer.pre_tokenize(&mut pretokenized)?;
        }
        Ok(pretokenized)
    }

    fn encode_single_sequence(&self, sequence: &str, type_id: u32) -> Result<Encoding> {
        let mut pretokenized = self.do_pre_tokenize(sequence)?;
        pretokenized.tokenize(|normalized| self.model.tokenize(normalized.get()))?;
        pretokenized.into_encoding(None, type_id)
    }

    /// Encode a single sequence or a pair.
    pub fn encode<'s, E>(&self, input: E, add_special_tokens: bool) -> Result<Encoding>
    where
        E: Into<EncodeInput<'s>>,
    {
        let (sequence, pair) = match input.into() {
            EncodeInput::Single(s1) => (s1, None),
            EncodeInput::Dual(s1, s2) => (s1, Some(s2)),
        };

        let encoding = self.encode_single_sequence(&sequence, 0)?;
        let pair_encoding = pair
            .map(|pair| self.encode_single_sequence(&pair, 1))
            .transpose()?;

        self.post_process(encoding, pair_encoding, add_special_tokens)
    }

    /// Encode every input independently, in parallel when enabled, then pad the
    /// batch. The first error aborts the whole batch.
    pub fn encode_batch<'s, E>(&self, inputs: Vec<E>, add_special_tokens: bool) -> Result<Vec<Encoding>>
    where
        E: Into<EncodeInput<'s>> + Send,
    {
        let mut encodings = inputs
            .into_maybe_par_iter()
            .map(|input| self.encode(input, add_special_tokens))
            .collect::<Result<Vec<Encoding>>>()?;

        if let Some(params) = &self.padding {
            pad_encodings(&mut encodings, params)?;
        }
        Ok(encodings)
    }

    /// Decode ids back to text, optionally leaving out special tokens. Unknown
    /// ids are skipped.
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        let tokens = ids
            .iter()
            .filter_map(|id| {
                self.added_vocabulary
                    .simple_id_to_token(*id)
                    .or_else(|| self.model.id_to_token(*id))
                    .filter(|token| {
                        !skip_special_tokens || !self.added_vocabulary.is_special_token(token)
                    })
            })
            .collect::<Vec<_>>();

        match &self.decoder {
            Some(decoder) => decoder.decode(tokens),
            None => Ok(tokens.join(" ")),
        }
    }

    pub fn decode_batch(&self, sentences: &[&[u32]], skip_special_tokens: bool) -> Result<Vec<String>> {
        sentences
            .into_maybe_par_iter()
            .map(|ids| self.decode(ids, skip_special_tokens))
            .collect()
    }

    /// Truncate, add special tokens, then pad.
    pub fn post_process(
        &self,
        encoding: Encoding,
        pair_encoding: Option<Encoding>,
        add_special_tokens: bool,
    ) -> Result<Encoding> {
        let (encoding, pair_encoding) = match &self.truncation {
            Some(truncation) => {
                let n_added_tokens = if add_special_tokens {
                    self.get_n_added_tokens(pair_encoding.is_some())
                } else {
                    0
                };
                let params = TruncationParams {
                    max_length: truncation.max_length.saturating_sub(n_added_tokens),
                    ..truncation.clone()
                };
                truncate_encodings(encoding, pair_encoding, &params)?
            }
            None => (encoding, pair_encoding),
        };

        let final_encoding = match &self.post_processor {
            Some(processor) => processor.process(encoding, pair_encoding, add_special_tokens)?,
            None => Encoding::merge(prepare_sequences(encoding, pair_encoding), false),
        };

        match &self.padding {
            Some(params) => {
                let mut encodings = [final_encoding];
                pad_encodings(&mut encodings, params)?;
                let [final_encoding] = encodings;
                Ok(final_encoding)
            }
            None => Ok(final_encoding),
        }
    }

    fn get_n_added_tokens(&self, is_pair: bool) -> usize {
        self.post_processor
            .as_ref()
            .map_or(0, |processor| processor.added_tokens(is_pair))
    }

    /// Add tokens to the vocabulary, returning how many were actually added.
    pub fn add_tokens(&mut self, tokens: &[AddedToken]) -> Result<usize> {
        self.added_vocabulary
            .add_tokens(tokens, &self.model, self.normalizer.as_ref())
    }

    /// Add special tokens: never normalized, skipped by `decode` on request.
    pub fn add_special_tokens(&mut self, tokens: &[AddedToken]) -> Result<usize> {
        self.added_vocabulary
            .add_special_tokens(tokens, &self.model, self.normalizer.as_ref())
    }

    /// Drop whatever the model cached so far.
    pub fn clear_cache(&self) {
        self.model.clear_cache();
    }
}

impl FromStr for Tokenizer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
