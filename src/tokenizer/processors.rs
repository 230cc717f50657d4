// src/tokenizer/processors.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tokenizer::pre_tokenizer::ByteLevel;
use crate::tokenizer::{Encoding, Error, PostProcessor, Result};

/// Every post-processor a `Tokenizer` can run, tagged by `"type"` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PostProcessorWrapper {
    BertProcessing(BertProcessing),
    ByteLevel(ByteLevel),
    TemplateProcessing(TemplateProcessing),
    Sequence(Sequence),
}

impl PostProcessor for PostProcessorWrapper {
    fn added_tokens(&self, is_pair: bool) -> usize {
        match self {
            Self::BertProcessing(p) => p.added_tokens(is_pair),
            Self::ByteLevel(p) => p.added_tokens(is_pair),
            Self::TemplateProcessing(p) => p.added_tokens(is_pair),
            Self::Sequence(p) => p.added_tokens(is_pair),
        }
    }

    fn process_encodings(
        &self,
        encodings: Vec<Encoding>,
        add_special_tokens: bool,
    ) -> Result<Vec<Encoding>> {
        match self {
            Self::BertProcessing(p) => p.process_encodings(encodings, add_special_tokens),
            Self::ByteLevel(p) => p.process_encodings(encodings, add_special_tokens),
            Self::TemplateProcessing(p) => p.process_encodings(encodings, add_special_tokens),
            Self::Sequence(p) => p.process_encodings(encodings, add_special_tokens),
        }
    }
}

impl From<BertProcessing> for PostProcessorWrapper {
    fn from(processor: BertProcessing) -> Self {
        Self::BertProcessing(processor)
    }
}

impl From<ByteLevel> for PostProcessorWrapper {
    fn from(processor: ByteLevel) -> Self {
        Self::ByteLevel(processor)
    }
}

impl From<TemplateProcessing> for PostProcessorWrapper {
    fn from(processor: TemplateProcessing) -> Self {
        Self::TemplateProcessing(processor)
    }
}

impl From<Sequence> for PostProcessorWrapper {
    fn from(processor: Sequence) -> Self {
        Self::Sequence(processor)
    }
}

/// An encoding made only of special tokens, all with the given type id.
fn special_encoding(ids: &[u32], tokens: &[String], type_id: u32) -> Encoding {
    let len = ids.len();
    Encoding::new(
        ids.to_vec(),
        vec![type_id; len],
        tokens.to_vec(),
        vec![None; len],
        vec![(0, 0); len],
        vec![1; len],
        vec![1; len],
        vec![],
        HashMap::new(),
    )
}

/// `[CLS] A [SEP]` for a single sequence, `[CLS] A [SEP] B [SEP]` for a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BertProcessing {
    sep: (String, u32),
    cls: (String, u32),
}

impl Default for BertProcessing {
    fn default() -> Self {
        Self {
            sep: ("[SEP]".into(), 102),
            cls: ("[CLS]".into(), 101),
        }
    }
}

impl BertProcessing {
    pub fn new(sep: (String, u32), cls: (String, u32)) -> Self {
        Self { sep, cls }
    }

    fn decorate(&self, mut encoding: Encoding, first: bool) -> Encoding {
        let overflowing = encoding
            .take_overflowing()
            .into_iter()
            .map(|o| self.decorate(o, first))
            .collect::<Vec<_>>();
        let sequence_id = usize::from(!first);
        let type_id = sequence_id as u32;

        let sep = special_encoding(&[self.sep.1], std::slice::from_ref(&self.sep.0), type_id);
        encoding.set_sequence_id(sequence_id);
        let mut decorated = if first {
            let mut cls =
                special_encoding(&[self.cls.1], std::slice::from_ref(&self.cls.0), type_id);
            cls.merge_with(encoding, false);
            cls
        } else {
            encoding
        };
        decorated.merge_with(sep, false);
        decorated.set_overflowing(overflowing);
        decorated
    }
}

impl PostProcessor for BertProcessing {
    fn added_tokens(&self, is_pair: bool) -> usize {
        if is_pair { 3 } else { 2 }
    }

    fn process_encodings(
        &self,
        encodings: Vec<Encoding>,
        add_special_tokens: bool,
    ) -> Result<Vec<Encoding>> {
        if !add_special_tokens {
            return Ok(encodings);
        }
        Ok(encodings
            .into_iter()
            .enumerate()
            .map(|(i, encoding)| self.decorate(encoding, i == 0))
            .collect())
    }
}

/// Which input sequence a template piece stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceId {
    A,
    B,
}

/// One element of a template: an input sequence or a special token, each with
/// the type id its tokens receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Sequence { id: SequenceId, type_id: u32 },
    SpecialToken { id: String, type_id: u32 },
}

impl Piece {
    fn parse_id(s: &str) -> Option<Self> {
        match s.strip_prefix('$') {
            Some(rest) => match rest {
                "" | "A" | "a" => Some(Self::Sequence {
                    id: SequenceId::A,
                    type_id: 0,
                }),
                "B" | "b" => Some(Self::Sequence {
                    id: SequenceId::B,
                    type_id: 0,
                }),
                n => n.parse().ok().map(|type_id| Self::Sequence {
                    id: SequenceId::A,
                    type_id,
                }),
            },
            None if s.is_empty() => None,
            None => Some(Self::SpecialToken {
                id: s.to_owned(),
                type_id: 0,
            }),
        }
    }

    fn with_type_id(self, type_id: u32) -> Self {
        match self {
            Self::Sequence { id, .. } => Self::Sequence { id, type_id },
            Self::SpecialToken { id, .. } => Self::SpecialToken { id, type_id },
        }
    }
}

impl TryFrom<&str> for Piece {
    type Error = Error;

    /// `$A`, `$B`, `$` (same as `$A`), `$1` (`$A` with type id 1) or a special
    /// token name, optionally followed by `:type_id`.
    fn try_from(s: &str) -> Result<Self> {
        let parts = s.split(':').collect::<Vec<_>>();
        let invalid = || Error::config(format!("cannot build a template piece from `{s}`"));
        match parts.as_slice() {
            [id, type_id] => {
                let type_id = type_id.parse().map_err(|_| invalid())?;
                Piece::parse_id(id)
                    .map(|piece| piece.with_type_id(type_id))
                    .ok_or_else(invalid)
            }
            [id] => Piece::parse_id(id).ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence { id, type_id } => write!(f, "${id:?}:{type_id}"),
            Self::SpecialToken { id, type_id } => write!(f, "{id}:{type_id}"),
        }
    }
}

/// A whitespace separated list of pieces, such as `"[CLS]:0 $A:0 [SEP]:0"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Template(Vec<Piece>);

impl Template {
    pub fn pieces(&self) -> &[Piece] {
        &self.0
    }

    fn uses(&self, sequence: SequenceId) -> bool {
        self.0
            .iter()
            .any(|piece| matches!(piece, Piece::Sequence { id, .. } if *id == sequence))
    }
}

impl TryFrom<&str> for Template {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Ok(Self(
            s.split_whitespace()
                .map(Piece::try_from)
                .collect::<Result<Vec<_>>>()?,
        ))
    }
}

impl TryFrom<String> for Template {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::try_from(s.as_str())
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        template
            .0
            .iter()
            .map(Piece::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A special token a template refers to, possibly spanning several ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialToken {
    id: String,
    ids: Vec<u32>,
    tokens: Vec<String>,
}

impl SpecialToken {
    pub fn new(id: String, ids: Vec<u32>, tokens: Vec<String>) -> Result<Self> {
        if ids.len() != tokens.len() {
            return Err(Error::config(format!(
                "special token `{id}` has {} ids but {} tokens",
                ids.len(),
                tokens.len()
            )));
        }
        Ok(Self { id, ids, tokens })
    }
}

impl From<(String, u32)> for SpecialToken {
    fn from((token, id): (String, u32)) -> Self {
        Self {
            id: token.clone(),
            ids: vec![id],
            tokens: vec![token],
        }
    }
}

impl From<(&str, u32)> for SpecialToken {
    fn from((token, id): (&str, u32)) -> Self {
        (token.to_owned(), id).into()
    }
}

struct Config {
    single: String,
    pair: String,
    special_tokens: Vec<SpecialToken>,
}

/// Builds a `TemplateProcessing`, checking the templates against the special
/// tokens it is given.
pub struct TemplateProcessingBuilder {
    config: Config,
}

impl Default for TemplateProcessingBuilder {
    fn default() -> Self {
        Self {
            config: Config {
                single: String::from("$0"),
                pair: String::from("$A:0 $B:1"),
                special_tokens: vec![],
            },
        }
    }
}

impl TemplateProcessingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single<S: Into<String>>(mut self, template: S) -> Self {
        self.config.single = template.into();
        self
    }

    #[must_use]
    pub fn pair<S: Into<String>>(mut self, template: S) -> Self {
        self.config.pair = template.into();
        self
    }

    #[must_use]
    pub fn special_tokens<T: Into<SpecialToken>>(mut self, tokens: Vec<T>) -> Self {
        self.config.special_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<TemplateProcessing> {
        let single = Template::try_from(self.config.single.as_str())?;
        let pair = Template::try_from(self.config.pair.as_str())?;
        let special_tokens = self
            .config
            .special_tokens
            .into_iter()
            .map(|token| (token.id.clone(), token))
            .collect::<BTreeMap<_, _>>();
        TemplateProcessing::new(single, pair, special_tokens)
    }
}

/// Inserts special tokens and assigns type ids following a template, one
/// for single sequences and one for pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TemplateProcessingRepr", into = "TemplateProcessingRepr")]
pub struct TemplateProcessing {
    single: Template,
    pair: Template,
    added_single: usize,
    added_pair: usize,
    special_tokens: BTreeMap<String, SpecialToken>,
}

impl TemplateProcessing {
    pub fn builder() -> TemplateProcessingBuilder {
        TemplateProcessingBuilder::new()
    }

    fn new(
        single: Template,
        pair: Template,
        special_tokens: BTreeMap<String, SpecialToken>,
    ) -> Result<Self> {
        for piece in single.0.iter().chain(&pair.0) {
            if let Piece::SpecialToken { id, .. } = piece {
                if !special_tokens.contains_key(id) {
                    return Err(Error::config(format!(
                        "template uses `{id}` which is not among the special tokens"
                    )));
                }
            }
        }
        if single.uses(SequenceId::B) {
            return Err(Error::config("the single template cannot use `$B`"));
        }
        if !pair.uses(SequenceId::A) || !pair.uses(SequenceId::B) {
            return Err(Error::config("the pair template must use both `$A` and `$B`"));
        }
        for token in special_tokens.values() {
            if token.ids.len() != token.tokens.len() {
                return Err(Error::config(format!(
                    "special token `{}` has {} ids but {} tokens",
                    token.id,
                    token.ids.len(),
                    token.tokens.len()
                )));
            }
        }

        let added = |template: &Template| {
            template
                .0
                .iter()
                .map(|piece| match piece {
                    Piece::SpecialToken { id, .. } => {
                        special_tokens.get(id).map_or(0, |token| token.ids.len())
                    }
                    Piece::Sequence { .. } => 0,
                })
                .sum::<usize>()
        };
        let added_single = added(&single);
        let added_pair = added(&pair);
        debug!(added_single, added_pair, "built template post-processor");

        Ok(Self {
            single,
            pair,
            added_single,
            added_pair,
            special_tokens,
        })
    }

    fn apply_template(
        &self,
        template: &Template,
        mut encodings: Vec<Encoding>,
        add_special_tokens: bool,
    ) -> Result<Vec<Encoding>> {
        let mut result = Vec::with_capacity(template.0.len());
        for piece in &template.0 {
            match piece {
                Piece::Sequence { id, type_id } => {
                    let i = usize::from(*id == SequenceId::B);
                    let encoding = encodings.get_mut(i).ok_or_else(|| {
                        Error::config(format!("template expects sequence `${id:?}`"))
                    })?;
                    encoding.set_type_ids(vec![*type_id; encoding.len()]);
                    encoding.set_sequence_id(i);
                    for overflowing in encoding.get_overflowing_mut() {
                        overflowing.set_type_ids(vec![*type_id; overflowing.len()]);
                        overflowing.set_sequence_id(i);
                    }
                    result.push(encoding.clone());
                }
                Piece::SpecialToken { id, type_id } => {
                    if add_special_tokens {
                        let token = self.special_tokens.get(id).ok_or_else(|| {
                            Error::config(format!("unknown special token `{id}`"))
                        })?;
                        result.push(special_encoding(&token.ids, &token.tokens, *type_id));
                    }
                }
            }
        }
        Ok(result)
    }
}

impl PostProcessor for TemplateProcessing {
    fn added_tokens(&self, is_pair: bool) -> usize {
        if is_pair {
            self.added_pair
        } else {
            self.added_single
        }
    }

    fn process_encodings(
        &self,
        encodings: Vec<Encoding>,
        add_special_tokens: bool,
    ) -> Result<Vec<Encoding>> {
        let template = match encodings.len() {
            1 => &self.single,
            2 => &self.pair,
            n => {
                return Err(Error::config(format!(
                    "templates handle one or two sequences, got {n}"
                )));
            }
        };
        self.apply_template(template, encodings, add_special_tokens)
    }
}

#[derive(Serialize, Deserialize)]
struct TemplateProcessingRepr {
    single: Template,
    pair: Template,
    special_tokens: BTreeMap<String, SpecialToken>,
}

impl From<TemplateProcessing> for TemplateProcessingRepr {
    fn from(processor: TemplateProcessing) -> Self {
        Self {
            single: processor.single,
            pair: processor.pair,
            special_tokens: processor.special_tokens,
        }
    }
}

impl TryFrom<TemplateProcessingRepr> for TemplateProcessing {
    type Error = Error;

    fn try_from(repr: TemplateProcessingRepr) -> Result<Self> {
        Self::new(repr.single, repr.pair, repr.special_tokens)
    }
}

/// Runs post-processors one after the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    processors: Vec<PostProcessorWrapper>,
}

impl Sequence {
    pub fn new(processors: Vec<PostProcessorWrapper>) -> Self {
        Self { processors }
    }
}

impl PostProcessor for Sequence {
    fn added_tokens(&self, is_pair: bool) -> usize {
        self.processors
            .iter()
            .map(|p| p.added_tokens(is_pair))
            .sum()
    }

    fn process_encodings(
        &self,
        mut encodings: Vec<Encoding>,
        add_special_tokens: bool,
    ) -> Result<Vec<Encoding>> {
        for processor in &self.processors {
            encodings = processor.process_encodings(encodings, add_special_tokens)?;
        }
        Ok(encodings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Token;

    fn encoding(words: &[&str], first_id: u32) -> Encoding {
        let mut offset = 0;
        let tokens = words
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let token = Token::new(first_id + i as u32, w.to_string(), (offset, offset + w.len()));
                offset += w.len() + 1;
                token
            })
            .collect();
        Encoding::from_tokens(tokens, 0)
    }

    fn bert_template() -> TemplateProcessing {
        TemplateProcessing::builder()
            .single("[CLS] $A [SEP]")
            .pair("[CLS]:0 $A:0 [SEP]:0 $B:1 [SEP]:1")
            .special_tokens(vec![("[CLS]", 1), ("[SEP]", 0)])
            .build()
            .unwrap()
    }

    #[test]
    fn bert_processing_single_and_pair() {
        let processor = BertProcessing::default();
        let single = processor
            .process(encoding(&["hello", "there"], 7), None, true)
            .unwrap();
        assert_eq!(single.get_ids(), &[101, 7, 8, 102]);
        assert_eq!(single.get_special_tokens_mask(), &[1, 0, 0, 1]);
        assert_eq!(single.get_offsets(), &[(0, 0), (0, 5), (6, 11), (0, 0)]);
        assert_eq!(single.sequence_range(0), 1..3);
        assert_eq!(processor.added_tokens(false), 2);

        let pair = processor
            .process(encoding(&["a"], 1), Some(encoding(&["b", "c"], 2)), true)
            .unwrap();
        assert_eq!(pair.get_tokens(), &["[CLS]", "a", "[SEP]", "b", "c", "[SEP]"]);
        assert_eq!(pair.get_type_ids(), &[0, 0, 0, 1, 1, 1]);
        assert_eq!(pair.get_sequence_ids(), vec![None, Some(0), None, Some(1), Some(1), None]);
        assert_eq!(processor.added_tokens(true), 3);
    }

    #[test]
    fn bert_processing_without_special_tokens() {
        let processed = BertProcessing::default()
            .process(encoding(&["a", "b"], 1), None, false)
            .unwrap();
        assert_eq!(processed.get_ids(), &[1, 2]);
    }

    #[test]
    fn bert_processing_decorates_overflowing() {
        let mut long = encoding(&["a", "b", "c", "d"], 1);
        long.truncate(2, 0, crate::tokenizer::TruncationDirection::Right)
            .unwrap();
        let processed = BertProcessing::default().process(long, None, true).unwrap();
        assert_eq!(processed.get_ids(), &[101, 1, 2, 102]);
        let overflowing = processed.get_overflowing();
        assert_eq!(overflowing.len(), 1);
        assert_eq!(overflowing[0].get_ids(), &[101, 3, 4, 102]);
    }

    #[test]
    fn template_pieces_parse() {
        assert_eq!(
            Piece::try_from("$").unwrap(),
            Piece::Sequence {
                id: SequenceId::A,
                type_id: 0
            }
        );
        assert_eq!(
            Piece::try_from("$B:1").unwrap(),
            Piece::Sequence {
                id: SequenceId::B,
                type_id: 1
            }
        );
        assert_eq!(
            Piece::try_from("$1").unwrap(),
            Piece::Sequence {
                id: SequenceId::A,
                type_id: 1
            }
        );
        assert_eq!(
            Piece::try_from("[SEP]:1").unwrap(),
            Piece::SpecialToken {
                id: "[SEP]".into(),
                type_id: 1
            }
        );
        assert!(Piece::try_from("[SEP]:x").is_err());
        assert!(Piece::try_from("$C").is_err());
        assert!(Piece::try_from("a:1:2").is_err());
    }

    #[test]
    fn template_matches_bert() {
        let template = bert_template();
        assert_eq!(template.added_tokens(false), 2);
        assert_eq!(template.added_tokens(true), 3);

        let pair = template
            .process(encoding(&["a"], 5), Some(encoding(&["b"], 6)), true)
            .unwrap();
        assert_eq!(pair.get_ids(), &[1, 5, 0, 6, 0]);
        assert_eq!(pair.get_type_ids(), &[0, 0, 0, 1, 1]);
        assert_eq!(pair.get_special_tokens_mask(), &[1, 0, 1, 0, 1]);
        assert_eq!(pair.get_attention_mask(), &[1, 1, 1, 1, 1]);

        let plain = template.process(encoding(&["a"], 5), None, false).unwrap();
        assert_eq!(plain.get_ids(), &[5]);
    }

    #[test]
    fn template_validation() {
        let missing = TemplateProcessing::builder()
            .single("[CLS] $A")
            .special_tokens(Vec::<SpecialToken>::new())
            .build();
        assert!(matches!(missing, Err(Error::Config(_))));

        let one_sided = TemplateProcessing::builder()
            .pair("$A $A")
            .build();
        assert!(matches!(one_sided, Err(Error::Config(_))));

        assert!(SpecialToken::new("x".into(), vec![1, 2], vec!["x".into()]).is_err());
    }

    #[test]
    fn multi_id_special_tokens() {
        let token = SpecialToken::new(
            "<eos>".into(),
            vec![3, 4],
            vec!["</".into(), "s>".into()],
        )
        .unwrap();
        let template = TemplateProcessing::builder()
            .single("$A <eos>")
            .pair("$A <eos> $B:1 <eos>:1")
            .special_tokens(vec![token])
            .build()
            .unwrap();
        assert_eq!(template.added_tokens(false), 2);
        let single = template.process(encoding(&["a"], 9), None, true).unwrap();
        assert_eq!(single.get_ids(), &[9, 3, 4]);
    }

    #[test]
    fn template_serializes_as_strings() {
        let template = bert_template();
        let json = serde_json::to_string(&PostProcessorWrapper::from(template.clone())).unwrap();
        assert_eq!(
            json,
            r#"{"type":"TemplateProcessing","single":"[CLS]:0 $A:0 [SEP]:0","pair":"[CLS]:0 $A:0 [SEP]:0 $B:1 [SEP]:1","special_tokens":{"[CLS]":{"id":"[CLS]","ids":[1],"tokens":["[CLS]"]},"[SEP]":{"id":"[SEP]","ids":[0],"tokens":["[SEP]"]}}}"#
        );
        let back: PostProcessorWrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PostProcessorWrapper::TemplateProcessing(template));
    }

    #[test]
    fn sequence_chains_processors() {
        let sequence = Sequence::new(vec![
            ByteLevel::default().into(),
            BertProcessing::default().into(),
        ]);
        assert_eq!(sequence.added_tokens(false), 2);
        let processed = sequence
            .process(encoding(&["hi", "Ġyou"], 1), None, true)
            .unwrap();
        assert_eq!(processed.get_ids(), &[101, 1, 2, 102]);
        // `Ġ` is two bytes wide.
        assert_eq!(processed.get_offsets()[2], (4, 8));
    }
}
