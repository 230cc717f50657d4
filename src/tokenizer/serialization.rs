// src/tokenizer/serialization.rs

use serde::de;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::tokenizer::added_vocabulary::AddedTokenWithId;
use crate::tokenizer::{
    DecoderWrapper, ModelWrapper, NormalizerWrapper, PaddingParams, PostProcessorWrapper,
    PreTokenizerWrapper, Tokenizer, TruncationParams,
};

static SERIALIZATION_VERSION: &str = "1.0";

impl Serialize for Tokenizer {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tokenizer = serializer.serialize_struct("Tokenizer", 9)?;

        tokenizer.serialize_field("version", SERIALIZATION_VERSION)?;
        tokenizer.serialize_field("truncation", &self.truncation)?;
        tokenizer.serialize_field("padding", &self.padding)?;
        tokenizer.serialize_field("added_tokens", &self.added_vocabulary)?;
        tokenizer.serialize_field("normalizer", &self.normalizer)?;
        tokenizer.serialize_field("pre_tokenizer", &self.pre_tokenizer)?;
        tokenizer.serialize_field("post_processor", &self.post_processor)?;
        tokenizer.serialize_field("decoder", &self.decoder)?;
        tokenizer.serialize_field("model", &self.model)?;

        tokenizer.end()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenizerRepr {
    version: String,
    truncation: Option<TruncationParams>,
    padding: Option<PaddingParams>,
    #[serde(default)]
    added_tokens: Vec<AddedTokenWithId>,
    normalizer: Option<NormalizerWrapper>,
    pre_tokenizer: Option<PreTokenizerWrapper>,
    post_processor: Option<PostProcessorWrapper>,
    decoder: Option<DecoderWrapper>,
    model: ModelWrapper,
}

impl<'de> Deserialize<'de> for Tokenizer {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let repr = TokenizerRepr::deserialize(deserializer)?;
        if repr.version != SERIALIZATION_VERSION {
            return Err(de::Error::custom(format!(
                "unsupported tokenizer version `{}`",
                repr.version
            )));
        }

        let mut tokenizer = Tokenizer::new(repr.model);
        tokenizer.normalizer = repr.normalizer;
        tokenizer.pre_tokenizer = repr.pre_tokenizer;
        tokenizer.post_processor = repr.post_processor;
        tokenizer.decoder = repr.decoder;
        // Added tokens keep their saved ids, then get matched with the
        // normalizer they were saved with.
        tokenizer
            .added_vocabulary
            .restore(repr.added_tokens, tokenizer.normalizer.as_ref())
            .map_err(de::Error::custom)?;
        tokenizer
            .with_truncation(repr.truncation)
            .map_err(de::Error::custom)?;
        tokenizer
            .with_padding(repr.padding)
            .map_err(de::Error::custom)?;

        Ok(tokenizer)
    }
}

#[cfg(test)]
mod tests {
    use crate::tokenizer::normalizers::Lowercase;
    use crate::tokenizer::pre_tokenizers::BertPreTokenizer;
    use crate::tokenizer::processors::BertProcessing;
    use crate::tokenizer::{AddedToken, Tokenizer, WordPiece};

    fn tokenizer() -> Tokenizer {
        let model = WordPiece::builder()
            .vocab(
                [("[UNK]", 0), ("[CLS]", 1), ("[SEP]", 2), ("un", 3), ("##able", 4)]
                    .into_iter()
                    .map(|(t, id)| (t.to_string(), id))
                    .collect(),
            )
            .build()
            .unwrap();
        Tokenizer::builder()
            .with_model(model)
            .with_normalizer(Some(Lowercase.into()))
            .with_pre_tokenizer(Some(BertPreTokenizer.into()))
            .with_post_processor(Some(
                BertProcessing::new(("[SEP]".into(), 2), ("[CLS]".into(), 1)).into(),
            ))
            .with_added_tokens(vec![AddedToken::from("<mask>", true)])
            .build()
            .unwrap()
    }

    #[test]
    fn fields_come_in_a_fixed_order() {
        let json = tokenizer().to_string(false).unwrap();
        let keys = [
            "\"version\":\"1.0\"",
            "\"truncation\":null",
            "\"padding\":null",
            "\"added_tokens\":[{\"id\":5,",
            "\"normalizer\":{\"type\":\"Lowercase\"}",
            "\"pre_tokenizer\":{\"type\":\"BertPreTokenizer\"}",
            "\"post_processor\":{\"type\":\"BertProcessing\"",
            "\"decoder\":null",
            "\"model\":{\"type\":\"WordPiece\"",
        ];
        let positions = keys
            .iter()
            .map(|key| json.find(key).unwrap_or_else(|| panic!("missing {key} in {json}")))
            .collect::<Vec<_>>();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn round_trip_keeps_added_token_ids() {
        let tokenizer = tokenizer();
        let json = tokenizer.to_string(true).unwrap();
        let restored: Tokenizer = json.parse().unwrap();
        assert_eq!(restored.token_to_id("<mask>"), Some(5));
        assert_eq!(restored.to_string(true).unwrap(), json);

        let encoding = restored.encode("UNable <mask>", true).unwrap();
        assert_eq!(
            encoding.get_tokens(),
            &["[CLS]", "un", "##able", "<mask>", "[SEP]"]
        );
    }

    #[test]
    fn unknown_version_or_field_is_rejected() {
        let json = tokenizer().to_string(false).unwrap();
        assert!(json.replace("\"1.0\"", "\"9.9\"").parse::<Tokenizer>().is_err());
        assert!(
            json.replacen("{\"version\"", "{\"extra\":1,\"version\"", 1)
                .parse::<Tokenizer>()
                .is_err()
        );
    }

    #[test]
    fn invalid_truncation_is_rejected_on_load() {
        let json = tokenizer().to_string(false).unwrap().replace(
            "\"truncation\":null",
            "\"truncation\":{\"max_length\":2,\"strategy\":\"LongestFirst\",\"stride\":0}",
        );
        assert!(json.parse::<Tokenizer>().is_err());
    }
}
