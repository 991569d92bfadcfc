use tch::{Tensor, nn::Path};

use crate::{
    constants::{BLOCK_SIZE, EMBED_DIM, HEAD_SIZE},
    error::Result,
    model::{CausalSelfAttentionHead, TokenEmbedding},
    tokenizer::{TokenId, Tokenizer},
};

/// Text -> ids -> embeddings -> attention output, with every stage's result kept.
pub struct PipelineOutput {
    pub ids: Vec<TokenId>,
    /// `[1, T, embed_dim]`
    pub embeddings: Tensor,
    /// `[1, min(T, block_size), head_size]`
    pub output: Tensor,
}

pub struct Pipeline {
    tokenizer: Tokenizer,
    embedding: TokenEmbedding,
    head: CausalSelfAttentionHead,
}

impl Pipeline {
    /// Builds the embedding table and head under `vs`, sized by the tokenizer's vocabulary and the
    /// crate constants.
    pub fn new(vs: &Path, tokenizer: Tokenizer) -> Self {
        let vocab_size = tokenizer.get_vocab_size() as i64;
        let embedding = TokenEmbedding::new(&(vs / "embedding"), vocab_size, EMBED_DIM);
        let head = CausalSelfAttentionHead::new(&(vs / "head"), HEAD_SIZE, EMBED_DIM, BLOCK_SIZE);
        Pipeline {
            tokenizer,
            embedding,
            head,
        }
    }

    pub fn run(&self, text: &str) -> Result<PipelineOutput> {
        let ids = self.tokenizer.encode(text)?;
        // [T, embed_dim] -> [1, T, embed_dim]
        let embeddings = self.embedding.lookup(&ids)?.unsqueeze(0);
        let output = self.head.forward(&embeddings)?;
        Ok(PipelineOutput {
            ids,
            embeddings,
            output,
        })
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn embedding(&self) -> &TokenEmbedding {
        &self.embedding
    }

    pub fn head(&self) -> &CausalSelfAttentionHead {
        &self.head
    }
}

/// The first `n` values of a 1-D tensor, for printing.
pub fn preview(values: &Tensor, n: i64) -> Vec<f64> {
    let len = values.size().first().copied().unwrap_or(0);
    (0..n.min(len)).map(|i| values.double_value(&[i])).collect()
}
