// src/main.rs

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use tracing::info;

use textpiece::{Result, Tokenizer};

const TOKENIZER_PATH: &str = "tokenizer_output/tokenizer.json";
const INPUT_PATH: &str = "tokenizer_output/test_data.txt";
const OUTPUT_DIR: &str = "tokenizer_output";

/// The positional argument at `index`, or `default` when it is not given.
fn path_arg(args: &[String], index: usize, default: &str) -> PathBuf {
    PathBuf::from(args.get(index).map_or(default, String::as_str))
}

/// Encodes a text file line by line with a saved tokenizer, writing the ids of
/// each line as a JSON array and the decoded text next to it.
///
/// Usage: `textpiece [tokenizer.json] [input.txt] [output dir]`
fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // --- Configuration ---
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let tokenizer_path = path_arg(&args, 0, TOKENIZER_PATH);
    let input_path = path_arg(&args, 1, INPUT_PATH);
    let out_dir = path_arg(&args, 2, OUTPUT_DIR);
    let encoded_path = out_dir.join("encoded.txt");
    let decoded_path = out_dir.join("decoded.txt");

    // load the pipeline
    let tokenizer = Tokenizer::from_file(&tokenizer_path)?;
    info!(
        path = %tokenizer_path.display(),
        vocab_size = tokenizer.get_vocab_size(true),
        "loaded tokenizer"
    );

    // read every line, then encode them as one batch
    let reader = BufReader::new(File::open(&input_path)?);
    let lines = reader.lines().collect::<std::io::Result<Vec<String>>>()?;
    let encodings = tokenizer.encode_batch(lines.iter().map(String::as_str).collect(), true)?;

    fs::create_dir_all(&out_dir)?;
    let mut enc_w = BufWriter::new(File::create(&encoded_path)?);
    let mut dec_w = BufWriter::new(File::create(&decoded_path)?);

    let mut total_tokens = 0usize;
    for encoding in &encodings {
        total_tokens += encoding.len();
        writeln!(enc_w, "{}", serde_json::to_string(encoding.get_ids())?)?;
        writeln!(dec_w, "{}", tokenizer.decode(encoding.get_ids(), true)?)?;
    }

    enc_w.flush()?;
    dec_w.flush()?;

    info!(
        lines = encodings.len(),
        total_tokens,
        encoded = %encoded_path.display(),
        decoded = %decoded_path.display(),
        "done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_arguments_use_the_default_paths() {
        let args = vec!["my_tokenizer.json".to_string()];
        assert_eq!(path_arg(&args, 0, TOKENIZER_PATH), PathBuf::from("my_tokenizer.json"));
        assert_eq!(path_arg(&args, 1, INPUT_PATH), PathBuf::from(INPUT_PATH));
        assert_eq!(path_arg(&[], 2, OUTPUT_DIR), PathBuf::from("tokenizer_output"));
    }
}
