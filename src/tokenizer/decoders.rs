// src/tokenizer/decoders.rs

use serde::{Deserialize, Serialize};

use crate::tokenizer::first_last_iterator::WithFirstLastIterator;
use crate::tokenizer::pre_tokenizer::ByteLevel;
use crate::tokenizer::pre_tokenizers::Metaspace;
use crate::tokenizer::{Decoder, Result};

/// Every decoder a `Tokenizer` can run, tagged by `"type"` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DecoderWrapper {
    BPEDecoder(BPEDecoder),
    ByteLevel(ByteLevel),
    WordPiece(WordPiece),
    Metaspace(Metaspace),
    ByteFallback(ByteFallback),
    Fuse(Fuse),
    Sequence(Sequence),
}

impl Decoder for DecoderWrapper {
    fn decode_chain(&self, tokens: Vec<String>) -> Result<Vec<String>> {
        match self {
            Self::BPEDecoder(d) => d.decode_chain(tokens),
            Self::ByteLevel(d) => d.decode_chain(tokens),
            Self::WordPiece(d) => d.decode_chain(tokens),
            Self::Metaspace(d) => d.decode_chain(tokens),
            Self::ByteFallback(d) => d.decode_chain(tokens),
            Self::Fuse(d) => d.decode_chain(tokens),
            Self::Sequence(d) => d.decode_chain(tokens),
        }
    }
}

macro_rules! impl_from_decoder {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for DecoderWrapper {
                fn from(decoder: $variant) -> Self {
                    Self::$variant(decoder)
                }
            }
        )*
    };
}

impl_from_decoder!(
    BPEDecoder,
    ByteLevel,
    WordPiece,
    Metaspace,
    ByteFallback,
    Fuse,
    Sequence
);

/// Undoes the end-of-word suffix of a BPE model: every suffix becomes a space,
/// except on the last token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BPEDecoder {
    pub suffix: String,
}

impl Default for BPEDecoder {
    fn default() -> Self {
        Self::new(String::from("</w>"))
    }
}

impl BPEDecoder {
    pub fn new(suffix: String) -> Self {
        Self { suffix }
    }
}

impl Decoder for BPEDecoder {
    fn decode_chain(&self, tokens: Vec<String>) -> Result<Vec<String>> {
        Ok(tokens
            .into_iter()
            .with_first_and_last()
            .map(|(_, last, token)| token.replace(&self.suffix, if last { "" } else { " " }))
            .collect())
    }
}

/// Glues WordPiece sub-tokens back together: tokens with the continuing
/// subword prefix are attached to the previous one, the others start a new
/// word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordPiece {
    pub prefix: String,
    /// Remove the spaces BERT-style tokenization puts before punctuation and
    /// inside English contractions.
    pub cleanup: bool,
}

impl Default for WordPiece {
    fn default() -> Self {
        Self::new(String::from("##"), true)
    }
}

impl WordPiece {
    pub fn new(prefix: String, cleanup: bool) -> Self {
        Self { prefix, cleanup }
    }
}

pub fn cleanup(dirty_input: &str) -> String {
    dirty_input
        .replace(" .", ".")
        .replace(" ?", "?")
        .replace(" !", "!")
        .replace(" ,", ",")
        .replace(" ' ", "'")
        .replace(" n't", "n't")
        .replace(" 'm", "'m")
        .replace(" do not", " don't")
        .replace(" 's", "'s")
        .replace(" 've", "'ve")
        .replace(" 're", "'re")
}

impl Decoder for WordPiece {
    fn decode_chain(&self, tokens: Vec<String>) -> Result<Vec<String>> {
        Ok(tokens
            .into_iter()
            .with_first_and_last()
            .map(|(first, _, token)| {
                let token = if first {
                    token
                } else if let Some(rest) = token.strip_prefix(self.prefix.as_str()) {
                    rest.to_owned()
                } else {
                    format!(" {token}")
                };
                if self.cleanup {
                    cleanup(&token)
                } else {
                    token
                }
            })
            .collect())
    }
}

/// Turns runs of `<0xNN>` byte tokens back into text. Bytes that do not form
/// valid UTF-8 become one U+FFFD each.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteFallback;

fn byte_token(token: &str) -> Option<u8> {
    let hex = token.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

impl Decoder for ByteFallback {
    fn decode_chain(&self, tokens: Vec<String>) -> Result<Vec<String>> {
        let mut decoded = Vec::with_capacity(tokens.len());
        let mut pending: Vec<u8> = vec![];

        let flush = |pending: &mut Vec<u8>, decoded: &mut Vec<String>| {
            if pending.is_empty() {
                return;
            }
            let bytes = std::mem::take(pending);
            match String::from_utf8(bytes) {
                Ok(text) => decoded.push(text),
                Err(err) => decoded.extend(
                    std::iter::repeat_n(String::from("\u{FFFD}"), err.as_bytes().len()),
                ),
            }
        };

        for token in tokens {
            match byte_token(&token) {
                Some(byte) => pending.push(byte),
                None => {
                    flush(&mut pending, &mut decoded);
                    decoded.push(token);
                }
            }
        }
        flush(&mut pending, &mut decoded);
        Ok(decoded)
    }
}

/// Joins every token into a single string.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fuse;

impl Decoder for Fuse {
    fn decode_chain(&self, tokens: Vec<String>) -> Result<Vec<String>> {
        Ok(vec![tokens.concat()])
    }
}

/// Runs decoders one after the other, each on the output of the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    decoders: Vec<DecoderWrapper>,
}

impl Sequence {
    pub fn new(decoders: Vec<DecoderWrapper>) -> Self {
        Self { decoders }
    }

    pub fn get_decoders(&self) -> &[DecoderWrapper] {
        &self.decoders
    }
}

impl Decoder for Sequence {
    fn decode_chain(&self, mut tokens: Vec<String>) -> Result<Vec<String>> {
        for decoder in &self.decoders {
            tokens = decoder.decode_chain(tokens)?;
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::pre_tokenizers::PrependScheme;

    fn tokens(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bpe_suffix_becomes_spaces() {
        let decoder = BPEDecoder::default();
        assert_eq!(
            decoder
                .decode(tokens(&["My</w>", "na", "me</w>", "is</w>", "John</w>"]))
                .unwrap(),
            "My name is John"
        );
    }

    #[test]
    fn wordpiece_joins_continuations() {
        let decoder = WordPiece::new("##".into(), false);
        assert_eq!(
            decoder
                .decode(tokens(&["un", "##able", "to", "go", "!"]))
                .unwrap(),
            "unable to go !"
        );
        let decoder = WordPiece::default();
        assert_eq!(
            decoder
                .decode(tokens(&["I", "do", "n't", "know", "it", "?"]))
                .unwrap(),
            "I don't know it?"
        );
        // A prefix on the very first token is kept.
        assert_eq!(
            WordPiece::new("##".into(), false)
                .decode(tokens(&["##a", "b"]))
                .unwrap(),
            "##a b"
        );
    }

    #[test]
    fn byte_fallback_decodes_runs_of_bytes() {
        let decoder = ByteFallback;
        assert_eq!(
            decoder
                .decode_chain(tokens(&["Hey", "<0xE5>", "<0x8F>", "<0xAB>", "a"]))
                .unwrap(),
            tokens(&["Hey", "叫", "a"])
        );
        assert_eq!(
            decoder.decode_chain(tokens(&["<0xE5>", "<0x8F>", "a"])).unwrap(),
            tokens(&["\u{FFFD}", "\u{FFFD}", "a"])
        );
        assert_eq!(
            decoder.decode_chain(tokens(&["<0x61>", "<0xZZ>"])).unwrap(),
            tokens(&["a", "<0xZZ>"])
        );
    }

    #[test]
    fn sequence_of_decoders() {
        let decoder = Sequence::new(vec![
            ByteFallback.into(),
            Metaspace::new('▁', PrependScheme::Always, true).into(),
            Fuse.into(),
        ]);
        assert_eq!(decoder.get_decoders().len(), 3);
        assert_eq!(
            decoder
                .decode_chain(tokens(&["▁Hey", "<0x21>", "▁you"]))
                .unwrap(),
            tokens(&["Hey! you"])
        );
    }

    #[test]
    fn serde_is_tagged_by_type() {
        let json = r###"{"type":"Sequence","decoders":[{"type":"ByteFallback"},{"type":"WordPiece","prefix":"##","cleanup":true},{"type":"BPEDecoder","suffix":"</w>"},{"type":"Fuse"}]}"###;
        let decoder: DecoderWrapper = serde_json::from_str(json).unwrap();
        assert_eq!(serde_json::to_string(&decoder).unwrap(), json);

        let byte_level: DecoderWrapper = serde_json::from_str(r#"{"type":"ByteLevel"}"#).unwrap();
        assert_eq!(byte_level, DecoderWrapper::from(ByteLevel::default()));
    }
}
