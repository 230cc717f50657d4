// src/tokenizer/normalizers.rs

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;

use crate::tokenizer::normalizer::NormalizedString;
use crate::tokenizer::{Error, Normalizer, Result};

/// Every normalizer a `Tokenizer` can run, tagged by `"type"` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NormalizerWrapper {
    BertNormalizer(BertNormalizer),
    Strip(Strip),
    StripAccents(StripAccents),
    NFC(NFC),
    NFD(NFD),
    NFKC(NFKC),
    NFKD(NFKD),
    Sequence(Sequence),
    Lowercase(Lowercase),
    Replace(Replace),
    Prepend(Prepend),
}

impl Normalizer for NormalizerWrapper {
    fn normalize(&self, normalized: &mut NormalizedString) -> Result<()> {
        match self {
            Self::BertNormalizer(n) => n.normalize(normalized),
            Self::Strip(n) => n.normalize(normalized),
            Self::StripAccents(n) => n.normalize(normalized),
            Self::NFC(n) => n.normalize(normalized),
            Self::NFD(n) => n.normalize(normalized),
            Self::NFKC(n) => n.normalize(normalized),
            Self::NFKD(n) => n.normalize(normalized),
            Self::Sequence(n) => n.normalize(normalized),
            Self::Lowercase(n) => n.normalize(normalized),
            Self::Replace(n) => n.normalize(normalized),
            Self::Prepend(n) => n.normalize(normalized),
        }
    }
}

macro_rules! impl_from_normalizer {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for NormalizerWrapper {
                fn from(normalizer: $variant) -> Self {
                    Self::$variant(normalizer)
                }
            }
        )*
    };
}

impl_from_normalizer!(
    BertNormalizer,
    Strip,
    StripAccents,
    NFC,
    NFD,
    NFKC,
    NFKD,
    Sequence,
    Lowercase,
    Replace,
    Prepend
);

/// The Unicode normalizer for a form name (`"NFC"`, `"NFD"`, `"NFKC"`, `"NFKD"`).
pub fn unicode_normalizer(form: &str) -> Result<NormalizerWrapper> {
    match form {
        "NFC" => Ok(NFC.into()),
        "NFD" => Ok(NFD.into()),
        "NFKC" => Ok(NFKC.into()),
        "NFKD" => Ok(NFKD.into()),
        other => Err(Error::Normalization(format!(
            "unknown Unicode normalization form `{other}`"
        ))),
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NFD;

impl Normalizer for NFD {
    fn normalize(&self, normalized: &mut NormalizedString) -> Result<()> {
        normalized.nfd();
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NFKD;

impl Normalizer for NFKD {
    fn normalize(&self, normalized: &mut NormalizedString) -> Result<()> {
        normalized.nfkd();
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NFC;

impl Normalizer for NFC {
    fn normalize(&self, normalized: &mut NormalizedString) -> Result<()> {
        normalized.nfc();
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NFKC;

impl Normalizer for NFKC {
    fn normalize(&self, normalized: &mut NormalizedString) -> Result<()> {
        normalized.nfkc();
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lowercase;

impl Normalizer for Lowercase {
    fn normalize(&self, normalized: &mut NormalizedString) -> Result<()> {
        normalized.lowercase();
        Ok(())
    }
}

/// Removes combining marks. Usually preceded by `NFD` so accents are separate
/// code points.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripAccents;

impl Normalizer for StripAccents {
    fn normalize(&self, normalized: &mut NormalizedString) -> Result<()> {
        normalized.filter(|c| !is_combining_mark(c));
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strip {
    pub strip_left: bool,
    pub strip_right: bool,
}

impl Strip {
    pub fn new(strip_left: bool, strip_right: bool) -> Self {
        Self {
            strip_left,
            strip_right,
        }
    }
}

impl Normalizer for Strip {
    fn normalize(&self, normalized: &mut NormalizedString) -> Result<()> {
        match (self.strip_left, self.strip_right) {
            (true, true) => {
                normalized.strip();
            }
            (true, false) => {
                normalized.lstrip();
            }
            (false, true) => {
                normalized.rstrip();
            }
            (false, false) => {}
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prepend {
    pub prepend: String,
}

impl Prepend {
    pub fn new(prepend: String) -> Self {
        Self { prepend }
    }
}

impl Normalizer for Prepend {
    fn normalize(&self, normalized: &mut NormalizedString) -> Result<()> {
        if !normalized.is_empty() {
            normalized.prepend(&self.prepend);
        }
        Ok(())
    }
}

/// What `Replace` looks for: a literal string or a regular expression.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplacePattern {
    String(String),
    Regex(String),
}

impl From<&str> for ReplacePattern {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for ReplacePattern {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

#[derive(Deserialize)]
struct ReplaceRepr {
    pattern: ReplacePattern,
    content: String,
}

/// Replaces every match of a pattern with some content.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "ReplaceRepr")]
pub struct Replace {
    pattern: ReplacePattern,
    content: String,
    #[serde(skip)]
    regex: regex::Regex,
}

impl Replace {
    /// Fails with a normalization error when the pattern is not a valid regex.
    pub fn new<P: Into<ReplacePattern>, C: Into<String>>(pattern: P, content: C) -> Result<Self> {
        let pattern = pattern.into();
        let regex = match &pattern {
            ReplacePattern::String(s) => regex::Regex::new(&regex::escape(s)),
            ReplacePattern::Regex(r) => regex::Regex::new(r),
        }
        .map_err(|e| Error::Normalization(format!("invalid replace pattern: {e}")))?;

        Ok(Self {
            pattern,
            content: content.into(),
            regex,
        })
    }
}

impl PartialEq for Replace {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.content == other.content
    }
}

impl TryFrom<ReplaceRepr> for Replace {
    type Error = Error;

    fn try_from(repr: ReplaceRepr) -> Result<Self> {
        Self::new(repr.pattern, repr.content)
    }
}

impl Normalizer for Replace {
    fn normalize(&self, normalized: &mut NormalizedString) -> Result<()> {
        normalized.replace(&self.regex, &self.content)
    }
}

/// Runs normalizers one after the other. The first failure stops the sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    normalizers: Vec<NormalizerWrapper>,
}

impl Sequence {
    pub fn new(normalizers: Vec<NormalizerWrapper>) -> Self {
        Self { normalizers }
    }

    pub fn get_normalizers(&self) -> &[NormalizerWrapper] {
        &self.normalizers
    }
}

impl Normalizer for Sequence {
    fn normalize(&self, normalized: &mut NormalizedString) -> Result<()> {
        for normalizer in &self.normalizers {
            normalizer.normalize(normalized)?;
        }
        Ok(())
    }
}

/// Checks whether a character is whitespace
fn is_whitespace(c: char) -> bool {
    // These are technically control characters but we count them as whitespace
    match c {
        '\t' | '\n' | '\r' => true,
        _ => c.is_whitespace(),
    }
}

/// Checks whether a character is a control character
fn is_control(c: char) -> bool {
    // These are technically control characters but we count them as whitespace
    match c {
        '\t' | '\n' | '\r' => false,
        _ => c.is_control(),
    }
}

/// CJK Unified Ideographs blocks.
fn is_chinese_char(c: char) -> bool {
    matches!(
        c as usize,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2B73F
            | 0x2B740..=0x2B81F
            | 0x2B920..=0x2CEAF
            | 0xF900..=0xFAFF
            | 0x2F800..=0x2FA1F
    )
}

/// The BERT normalization: drop control chars and turn whitespace into plain
/// spaces, isolate CJK ideographs with spaces, then optionally strip accents
/// and lowercase. `strip_accents` follows `lowercase` when unset.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BertNormalizer {
    pub clean_text: bool,
    pub handle_chinese_chars: bool,
    pub strip_accents: Option<bool>,
    pub lowercase: bool,
}

impl Default for BertNormalizer {
    fn default() -> Self {
        Self {
            clean_text: true,
            handle_chinese_chars: true,
            strip_accents: None,
            lowercase: true,
        }
    }
}

impl BertNormalizer {
    pub fn new(
        clean_text: bool,
        handle_chinese_chars: bool,
        strip_accents: Option<bool>,
        lowercase: bool,
    ) -> Self {
        Self {
            clean_text,
            handle_chinese_chars,
            strip_accents,
            lowercase,
        }
    }

    fn do_clean_text(&self, normalized: &mut NormalizedString) {
        normalized
            .filter(|c| !(c == '\0' || c == '\u{fffd}' || is_control(c)))
            .map(|c| if is_whitespace(c) { ' ' } else { c });
    }

    fn do_handle_chinese_chars(&self, normalized: &mut NormalizedString) {
        let mut new_chars: Vec<(char, isize)> = vec![];
        normalized.get().chars().for_each(|c| {
            if is_chinese_char(c) {
                new_chars.extend([(' ', 0), (c, 1), (' ', 1)]);
            } else {
                new_chars.push((c, 0));
            }
        });
        normalized.transform(new_chars, 0);
    }
}

impl Normalizer for BertNormalizer {
    fn normalize(&self, normalized: &mut NormalizedString) -> Result<()> {
        if self.clean_text {
            self.do_clean_text(normalized);
        }
        if self.handle_chinese_chars {
            self.do_handle_chinese_chars(normalized);
        }
        if self.strip_accents.unwrap_or(self.lowercase) {
            normalized.nfd();
            normalized.filter(|c| !is_combining_mark(c));
        }
        if self.lowercase {
            normalized.lowercase();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::normalizer::Range;

    fn run(normalizer: &impl Normalizer, input: &str) -> NormalizedString {
        let mut normalized = NormalizedString::from(input);
        normalizer.normalize(&mut normalized).unwrap();
        normalized
    }

    #[test]
    fn bert_normalizer() {
        let normalized = run(&BertNormalizer::default(), "Héllo\tWorld 中文");
        assert_eq!(normalized.get(), "hello world  中  文 ");

        let start = normalized.get().find('中').unwrap();
        assert_eq!(
            normalized.convert_offsets(Range::Normalized(start..start + '中'.len_utf8())),
            Some(13..16)
        );
    }

    #[test]
    fn bert_normalizer_keeps_accents_and_case_when_asked() {
        let normalizer = BertNormalizer::new(true, false, Some(false), false);
        assert_eq!(run(&normalizer, "Héllo\u{0}").get(), "Héllo");
    }

    #[test]
    fn strip_accents_after_nfd() {
        let normalizer = Sequence::new(vec![NFD.into(), StripAccents.into()]);
        let normalized = run(&normalizer, "élève");
        assert_eq!(normalized.get(), "eleve");
        assert_eq!(
            normalized.convert_offsets(Range::Normalized(0..1)),
            Some(0..2)
        );
    }

    #[test]
    fn sequence_applies_in_order() {
        let normalizer = Sequence::new(vec![NFKC.into(), Lowercase.into()]);
        assert_eq!(normalizer.get_normalizers().len(), 2);
        assert_eq!(run(&normalizer, "ＡＢＣ").get(), "abc");
    }

    #[test]
    fn strip_sides() {
        assert_eq!(run(&Strip::new(true, false), "  hi  ").get(), "hi  ");
        assert_eq!(run(&Strip::new(false, true), "  hi  ").get(), "  hi");
        assert_eq!(run(&Strip::new(true, true), "  hi  ").get(), "hi");
    }

    #[test]
    fn prepend_skips_empty_input() {
        let normalizer = Prepend::new("▁".into());
        assert_eq!(run(&normalizer, "hey").get(), "▁hey");
        assert_eq!(run(&normalizer, "").get(), "");
    }

    #[test]
    fn replace_literal_and_regex() {
        let literal = Replace::new("''", "\"").unwrap();
        assert_eq!(run(&literal, "''hi''").get(), "\"hi\"");

        let regex = Replace::new(ReplacePattern::Regex(r"\s+".into()), " ").unwrap();
        assert_eq!(run(&regex, "a  \t b").get(), "a b");
    }

    #[test]
    fn invalid_regex_is_a_normalization_error() {
        let result = Replace::new(ReplacePattern::Regex("(".into()), "");
        assert!(matches!(result, Err(Error::Normalization(_))));
    }

    #[test]
    fn unknown_unicode_form() {
        assert_eq!(unicode_normalizer("NFKC").unwrap(), NormalizerWrapper::NFKC(NFKC));
        assert!(matches!(
            unicode_normalizer("NFX"),
            Err(Error::Normalization(_))
        ));
    }

    #[test]
    fn serde_is_tagged_by_type() {
        let json = r#"{"type":"Sequence","normalizers":[{"type":"NFC"},{"type":"Replace","pattern":{"String":"a"},"content":"b"},{"type":"Lowercase"}]}"#;
        let normalizer: NormalizerWrapper = serde_json::from_str(json).unwrap();
        assert_eq!(serde_json::to_string(&normalizer).unwrap(), json);
        assert_eq!(run(&normalizer, "AaB").get(), "abb");

        let bert: NormalizerWrapper =
            serde_json::from_str(r#"{"type":"BertNormalizer","lowercase":false}"#).unwrap();
        assert_eq!(
            bert,
            NormalizerWrapper::BertNormalizer(BertNormalizer::new(true, true, None, false))
        );
    }
}
