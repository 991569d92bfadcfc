use anyhow::{Context, Result};
use charhead::{
    constants::{EMBED_DIM, INPUT_PATH, PREVIEW_LEN, SAMPLE_TEXT, SEED},
    model::TokenEmbedding,
    pipeline::preview,
    tokenizer::Tokenizer,
};
use tch::{Device, nn::VarStore};
use tracing::Level;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    tch::manual_seed(SEED);

    let tokenizer = Tokenizer::from_file(INPUT_PATH)
        .with_context(|| format!("failed to build tokenizer from {INPUT_PATH}"))?;
    let vocab_size = tokenizer.get_vocab_size() as i64;

    let vs = VarStore::new(Device::Cpu);
    let table = TokenEmbedding::new(&vs.root(), vocab_size, EMBED_DIM);

    println!("\nSample text: {SAMPLE_TEXT}");
    let ids = tokenizer.encode(SAMPLE_TEXT)?;
    println!("Token IDs: {ids:?}");

    // [T] -> [T, EMBED_DIM]
    let embeddings = tch::no_grad(|| table.lookup(&ids))?;
    println!("Embedding shape: {:?}", embeddings.size());
    println!(
        "First embedding vector: {:?} ...",
        preview(&embeddings.get(0), PREVIEW_LEN)
    );

    println!("\nEmbedding Statistics:");
    println!("Vocabulary size: {vocab_size}");
    println!("Embedding dimension: {EMBED_DIM}");
    println!("Number of tokens in sample: {}", ids.len());
    println!("Total embedding parameters: {}", table.num_parameters());
    Ok(())
}
