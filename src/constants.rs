/// Width of each token's embedding vector.
pub const EMBED_DIM: i64 = 32;
/// Output width of the key/query/value projections of the attention head.
pub const HEAD_SIZE: i64 = 16;
/// Longest sequence the causal mask covers; longer inputs are cut to this length.
pub const BLOCK_SIZE: i64 = 16;

/// Seed for libtorch's generator so parameter initialization is reproducible.
pub const SEED: i64 = 1337;

/// Corpus the demos build their vocabulary from.
pub const INPUT_PATH: &str = "input.txt";
/// Where the tokenizer demo writes the vocabulary.
pub const VOCAB_PATH: &str = "vocab.txt";
/// A sentence whose characters all appear in the bundled corpus.
pub const SAMPLE_TEXT: &str = "Speak, speak.";

/// How many values of a vector the demos print.
pub const PREVIEW_LEN: i64 = 5;
