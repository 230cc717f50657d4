// src/lib.rs
//! Text tokenization: normalization, pre-tokenization, subword models (BPE,
//! WordPiece, Unigram, WordLevel), post-processing and decoding, with every
//! token mapped back to its byte range in the input.
//!
//! ```no_run
//! use textpiece::Tokenizer;
//!
//! # fn main() -> textpiece::Result<()> {
//! let tokenizer = Tokenizer::from_file("tokenizer.json")?;
//! let encoding = tokenizer.encode("Hello there!", true)?;
//! println!("{:?} {:?}", encoding.get_tokens(), encoding.get_offsets());
//! # Ok(())
//! # }
//! ```

pub mod tokenizer;

pub use tokenizer::*;
