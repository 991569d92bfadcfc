use anyhow::{Context, Result};
use charhead::{
    constants::{INPUT_PATH, PREVIEW_LEN, SAMPLE_TEXT, SEED},
    pipeline::{Pipeline, preview},
    tokenizer::Tokenizer,
};
use tch::{Device, nn::VarStore};
use tracing::{Level, info};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    tch::manual_seed(SEED);

    let tokenizer = Tokenizer::from_file(INPUT_PATH)
        .with_context(|| format!("failed to build tokenizer from {INPUT_PATH}"))?;
    let vs = VarStore::new(Device::Cpu);
    let pipeline = Pipeline::new(&vs.root(), tokenizer);
    info!(
        vocab_size = pipeline.tokenizer().get_vocab_size(),
        parameters = pipeline.embedding().num_parameters() + pipeline.head().num_parameters(),
        "pipeline ready"
    );

    println!("\nSample text: {SAMPLE_TEXT}");
    // Nothing is trained here, so skip gradient tracking.
    let result = tch::no_grad(|| pipeline.run(SAMPLE_TEXT))
        .context("failed to run the sample text through the pipeline")?;

    println!("\nShapes:");
    println!("Input shape: {:?}", result.embeddings.size());
    println!("Output shape: {:?}", result.output.size());

    println!("\nFirst token attention output:");
    println!("{:?} ...", preview(&result.output.get(0).get(0), PREVIEW_LEN));
    Ok(())
}
