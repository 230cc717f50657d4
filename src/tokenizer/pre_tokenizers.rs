// src/tokenizer/pre_tokenizers.rs

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::tokenizer::normalizer::{NormalizedString, Range, SplitDelimiterBehavior};
use crate::tokenizer::pattern::Invert;
use crate::tokenizer::pre_tokenizer::{ByteLevel, PreTokenizedString};
use crate::tokenizer::scripts::{get_script, Script};
use crate::tokenizer::{Decoder, Error, PreTokenizer, Result};

/// Every pre-tokenizer a `Tokenizer` can run, tagged by `"type"` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PreTokenizerWrapper {
    BertPreTokenizer(BertPreTokenizer),
    ByteLevel(ByteLevel),
    Metaspace(Metaspace),
    Whitespace(Whitespace),
    WhitespaceSplit(WhitespaceSplit),
    Punctuation(Punctuation),
    UnicodeScripts(UnicodeScripts),
    Split(Split),
    Sequence(Sequence),
}

impl PreTokenizer for PreTokenizerWrapper {
    fn pre_tokenize(&self, pretokenized: &mut PreTokenizedString) -> Result<()> {
        match self {
            Self::BertPreTokenizer(p) => p.pre_tokenize(pretokenized),
            Self::ByteLevel(p) => p.pre_tokenize(pretokenized),
            Self::Metaspace(p) => p.pre_tokenize(pretokenized),
            Self::Whitespace(p) => p.pre_tokenize(pretokenized),
            Self::WhitespaceSplit(p) => p.pre_tokenize(pretokenized),
            Self::Punctuation(p) => p.pre_tokenize(pretokenized),
            Self::UnicodeScripts(p) => p.pre_tokenize(pretokenized),
            Self::Split(p) => p.pre_tokenize(pretokenized),
            Self::Sequence(p) => p.pre_tokenize(pretokenized),
        }
    }
}

macro_rules! impl_from_pre_tokenizer {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for PreTokenizerWrapper {
                fn from(pre_tokenizer: $variant) -> Self {
                    Self::$variant(pre_tokenizer)
                }
            }
        )*
    };
}

impl_from_pre_tokenizer!(
    BertPreTokenizer,
    ByteLevel,
    Metaspace,
    Whitespace,
    WhitespaceSplit,
    Punctuation,
    UnicodeScripts,
    Split,
    Sequence
);

static WORDS_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\w+|[^\w\s]+")
        .unwrap_or_else(|e| panic!("invalid whitespace split pattern: {e}"))
});

/// Keeps runs of word chars and runs of punctuation, drops the whitespace.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Whitespace;

impl PreTokenizer for Whitespace {
    fn pre_tokenize(&self, pretokenized: &mut PreTokenizedString) -> Result<()> {
        let re_ref: &regex::Regex = &WORDS_RE;
        pretokenized.split(|_, normalized| {
            normalized.split(Invert(re_ref), SplitDelimiterBehavior::Removed)
        })
    }
}

/// Splits on whitespace only.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitespaceSplit;

impl PreTokenizer for WhitespaceSplit {
    fn pre_tokenize(&self, pretokenized: &mut PreTokenizedString) -> Result<()> {
        pretokenized.split(|_, normalized| {
            normalized.split(char::is_whitespace, SplitDelimiterBehavior::Removed)
        })
    }
}

/// Unicode punctuation outside the ASCII range: the Latin-1 marks, the General
/// Punctuation block and the CJK/fullwidth forms.
fn is_punctuation(c: char) -> bool {
    if c.is_ascii_punctuation() {
        return true;
    }
    matches!(
        c as u32,
        0x00A1 | 0x00A7 | 0x00AB | 0x00B6 | 0x00B7 | 0x00BB | 0x00BF
            | 0x037E
            | 0x0387
            | 0x055A..=0x055F
            | 0x0589..=0x058A
            | 0x05BE
            | 0x05C0
            | 0x05C3
            | 0x05C6
            | 0x05F3..=0x05F4
            | 0x060C..=0x060D
            | 0x061B
            | 0x061E..=0x061F
            | 0x066A..=0x066D
            | 0x06D4
            | 0x0964..=0x0965
            | 0x0970
            | 0x0E4F
            | 0x0E5A..=0x0E5B
            | 0x10FB
            | 0x1361..=0x1368
            | 0x2010..=0x2027
            | 0x2030..=0x2043
            | 0x2045..=0x2051
            | 0x2053..=0x205E
            | 0x207D..=0x207E
            | 0x208D..=0x208E
            | 0x2308..=0x230B
            | 0x2329..=0x232A
            | 0x2768..=0x2775
            | 0x27C5..=0x27C6
            | 0x27E6..=0x27EF
            | 0x2983..=0x2998
            | 0x29D8..=0x29DB
            | 0x29FC..=0x29FD
            | 0x2E00..=0x2E2E
            | 0x2E30..=0x2E4F
            | 0x3001..=0x3003
            | 0x3008..=0x3011
            | 0x3014..=0x301F
            | 0x3030
            | 0x303D
            | 0x30A0
            | 0x30FB
            | 0xFE10..=0xFE19
            | 0xFE30..=0xFE52
            | 0xFE54..=0xFE61
            | 0xFE63
            | 0xFE68
            | 0xFE6A..=0xFE6B
            | 0xFF01..=0xFF03
            | 0xFF05..=0xFF0A
            | 0xFF0C..=0xFF0F
            | 0xFF1A..=0xFF1B
            | 0xFF1F..=0xFF20
            | 0xFF3B..=0xFF3D
            | 0xFF3F
            | 0xFF5B
            | 0xFF5D
            | 0xFF5F..=0xFF65
    )
}

/// Splits on punctuation chars, each one handled by `behavior`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Punctuation {
    #[serde(default = "default_punctuation_behavior")]
    pub behavior: SplitDelimiterBehavior,
}

fn default_punctuation_behavior() -> SplitDelimiterBehavior {
    SplitDelimiterBehavior::Isolated
}

impl Default for Punctuation {
    fn default() -> Self {
        Self::new(default_punctuation_behavior())
    }
}

impl Punctuation {
    pub fn new(behavior: SplitDelimiterBehavior) -> Self {
        Self { behavior }
    }
}

impl PreTokenizer for Punctuation {
    fn pre_tokenize(&self, pretokenized: &mut PreTokenizedString) -> Result<()> {
        pretokenized.split(|_, normalized| normalized.split(is_punctuation, self.behavior))
    }
}

/// BERT's basic tokenization: split on whitespace, then isolate every
/// punctuation char.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BertPreTokenizer;

impl PreTokenizer for BertPreTokenizer {
    fn pre_tokenize(&self, pretokenized: &mut PreTokenizedString) -> Result<()> {
        pretokenized.split(|_, normalized| {
            normalized.split(char::is_whitespace, SplitDelimiterBehavior::Removed)
        })?;
        pretokenized.split(|_, normalized| {
            normalized.split(is_punctuation, SplitDelimiterBehavior::Isolated)
        })
    }
}

/// When `Metaspace` adds a replacement char in front of the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrependScheme {
    /// Only in front of the first split of the input.
    First,
    Never,
    /// In front of every split that does not already start with it.
    Always,
}

/// SentencePiece-style whitespace handling: spaces become `replacement`
/// (`▁` by default) and, when `split` is set, every replacement starts a new
/// piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metaspace {
    pub replacement: char,
    pub prepend_scheme: PrependScheme,
    pub split: bool,
}

impl Default for Metaspace {
    fn default() -> Self {
        Self::new('▁', PrependScheme::Always, true)
    }
}

impl Metaspace {
    pub fn new(replacement: char, prepend_scheme: PrependScheme, split: bool) -> Self {
        Self {
            replacement,
            prepend_scheme,
            split,
        }
    }
}

impl PreTokenizer for Metaspace {
    fn pre_tokenize(&self, pretokenized: &mut PreTokenizedString) -> Result<()> {
        let replacement = self.replacement.to_string();
        pretokenized.split(|_, mut normalized| {
            normalized.replace(' ', &replacement)?;
            let starts_with_replacement = normalized.get().starts_with(self.replacement);
            match self.prepend_scheme {
                PrependScheme::Always if !starts_with_replacement => {
                    normalized.prepend(&replacement);
                }
                PrependScheme::First
                    if !starts_with_replacement && normalized.offsets_original().0 == 0 =>
                {
                    normalized.prepend(&replacement);
                }
                _ => {}
            }
            if self.split {
                normalized.split(self.replacement, SplitDelimiterBehavior::MergedWithNext)
            } else {
                Ok(vec![normalized])
            }
        })
    }
}

impl Decoder for Metaspace {
    fn decode_chain(&self, tokens: Vec<String>) -> Result<Vec<String>> {
        Ok(tokens
            .iter()
            .enumerate()
            .map(|(i, token)| {
                let token = match token.strip_prefix(self.replacement) {
                    Some(rest) if i == 0 && self.prepend_scheme != PrependScheme::Never => rest,
                    _ => token.as_str(),
                };
                token
                    .chars()
                    .map(|c| if c == self.replacement { ' ' } else { c })
                    .collect()
            })
            .collect())
    }
}

/// Script of `c` as far as splitting is concerned: kana are grouped with Han
/// so that Japanese text stays together, spaces and combining marks never
/// break a piece.
fn fixed_script(c: char) -> Script {
    if c as u32 == 0x30FC {
        return Script::Han;
    }
    if c == ' ' {
        return Script::Any;
    }
    match get_script(c) {
        Script::Hiragana | Script::Katakana => Script::Han,
        Script::Inherited => Script::Any,
        script => script,
    }
}

/// Starts a new piece every time the Unicode script changes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnicodeScripts;

impl PreTokenizer for UnicodeScripts {
    fn pre_tokenize(&self, pretokenized: &mut PreTokenizedString) -> Result<()> {
        pretokenized.split(|_, normalized| {
            let mut last_script = None;
            let mut offset = 0;
            let mut ranges: Vec<usize> = vec![0];
            for c in normalized.get().chars() {
                let script = fixed_script(c);
                if script != Script::Any {
                    if last_script.is_some_and(|last| last != script) && offset > 0 {
                        ranges.push(offset);
                    }
                    last_script = Some(script);
                }
                offset += c.len_utf8();
            }
            ranges.push(normalized.len());

            Ok(ranges
                .windows(2)
                .filter_map(|w| normalized.slice(Range::Normalized(w[0]..w[1])))
                .collect::<Vec<NormalizedString>>())
        })
    }
}

/// What `Split` looks for: a literal string or a regular expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitPattern {
    String(String),
    Regex(String),
}

impl From<&str> for SplitPattern {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for SplitPattern {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

#[derive(Deserialize)]
struct SplitRepr {
    pattern: SplitPattern,
    behavior: SplitDelimiterBehavior,
    #[serde(default)]
    invert: bool,
}

/// Splits on a pattern, with `invert` turning the matches into the pieces kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SplitRepr")]
pub struct Split {
    pattern: SplitPattern,
    #[serde(skip)]
    regex: fancy_regex::Regex,
    behavior: SplitDelimiterBehavior,
    invert: bool,
}

impl Split {
    pub fn new<P: Into<SplitPattern>>(
        pattern: P,
        behavior: SplitDelimiterBehavior,
        invert: bool,
    ) -> Result<Self> {
        let pattern = pattern.into();
        let regex = match &pattern {
            SplitPattern::String(s) => fancy_regex::Regex::new(&regex::escape(s))?,
            SplitPattern::Regex(r) => fancy_regex::Regex::new(r)?,
        };
        Ok(Self {
            pattern,
            regex,
            behavior,
            invert,
        })
    }
}

impl PartialEq for Split {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
            && self.behavior == other.behavior
            && self.invert == other.invert
    }
}

impl TryFrom<SplitRepr> for Split {
    type Error = Error;

    fn try_from(repr: SplitRepr) -> Result<Self> {
        Self::new(repr.pattern, repr.behavior, repr.invert)
    }
}

impl PreTokenizer for Split {
    fn pre_tokenize(&self, pretokenized: &mut PreTokenizedString) -> Result<()> {
        if self.invert {
            pretokenized.split(|_, normalized| normalized.split(Invert(&self.regex), self.behavior))
        } else {
            pretokenized.split(|_, normalized| normalized.split(&self.regex, self.behavior))
        }
    }
}

/// Runs pre-tokenizers one after the other, each over the pieces of the
/// previous one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pretokenizers: Vec<PreTokenizerWrapper>,
}

impl Sequence {
    pub fn new(pretokenizers: Vec<PreTokenizerWrapper>) -> Self {
        Self { pretokenizers }
    }

    pub fn get_pre_tokenizers(&self) -> &[PreTokenizerWrapper] {
        &self.pretokenizers
    }
}

impl PreTokenizer for Sequence {
    fn pre_tokenize(&self, pretokenized: &mut PreTokenizedString) -> Result<()> {
        for pretokenizer in &self.pretokenizers {
            pretokenizer.pre_tokenize(pretokenized)?;
        }
        Ok(())
    }
}
