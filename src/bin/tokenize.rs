use anyhow::{Context, Result};
use charhead::{
    constants::{INPUT_PATH, SAMPLE_TEXT, VOCAB_PATH},
    tokenizer::Tokenizer,
};
use tracing::{Level, info};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let tokenizer = Tokenizer::from_file(INPUT_PATH)
        .with_context(|| format!("failed to build tokenizer from {INPUT_PATH}"))?;

    println!("Vocabulary size: {}", tokenizer.get_vocab_size());
    let head: Vec<char> = tokenizer.get_vocab().iter().take(10).copied().collect();
    println!("First 10 characters in vocabulary: {head:?}");

    let encoded = tokenizer.encode(SAMPLE_TEXT)?;
    let decoded = tokenizer.decode(&encoded)?;
    println!("\nTesting encoding/decoding:");
    println!("Sample input:  {SAMPLE_TEXT}");
    println!("Encoded:       {encoded:?}");
    println!("Decoded:       {decoded}");

    tokenizer
        .save_vocab(VOCAB_PATH)
        .with_context(|| format!("failed to save vocabulary to {VOCAB_PATH}"))?;
    info!(path = VOCAB_PATH, "vocabulary saved");
    Ok(())
}
