// src/tokenizer/result.rs

use thiserror::Error;

/// Every failure the pipeline can surface.
///
/// Lookup misses inside a model are not errors: they resolve to the unknown
/// token (or are dropped), so none of these variants is produced per token.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed vocabulary or merges, unknown variant, invalid parameters.
    /// Raised while building a `Tokenizer` or one of its stages.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Unknown Unicode form or an invalid normalizer pattern.
    #[error("Normalization error: {0}")]
    Normalization(String),
    /// A truncation request that cannot be satisfied by the given input.
    #[error("Truncation error: {0}")]
    Truncation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("Regex error: {0}")]
    FancyRegex(#[from] Box<fancy_regex::Error>),
    #[error("Added vocabulary automaton error: {0}")]
    AhoCorasick(#[from] aho_corasick::BuildError),
}

impl Error {
    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}

impl From<fancy_regex::Error> for Error {
    fn from(err: fancy_regex::Error) -> Self {
        Error::FancyRegex(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
