use tch::{
    IndexOp,
    Kind::{Bool, Float},
    Tensor,
    nn::{Embedding, LayerNorm, Linear, LinearConfig, Path, embedding, layer_norm, linear},
};
use tracing::debug;

use crate::{
    error::{Error, Result},
    tokenizer::TokenId,
};

/// Lookup table with one `embed_dim` row per vocabulary id.
pub struct TokenEmbedding {
    table: Embedding,
    vocab_size: i64,
    embed_dim: i64,
}

impl TokenEmbedding {
    /// Allocates a `[vocab_size, embed_dim]` table drawn from a standard normal. Call
    /// `tch::manual_seed` first for a reproducible table.
    pub fn new(vs: &Path, vocab_size: i64, embed_dim: i64) -> Self {
        let table = embedding(vs / "token", vocab_size, embed_dim, Default::default());
        debug!(vocab_size, embed_dim, "allocated embedding table");
        TokenEmbedding {
            table,
            vocab_size,
            embed_dim,
        }
    }

    /// Takes `T` token ids and returns a `[T, embed_dim]` tensor whose row `i` is the table row
    /// for `ids[i]`.
    pub fn lookup(&self, ids: &[TokenId]) -> Result<Tensor> {
        if let Some(&id) = ids.iter().find(|&&id| !(0..self.vocab_size).contains(&id)) {
            return Err(self.invalid(id));
        }
        let input = Tensor::from_slice(ids).to_device(self.table.ws.device());
        Ok(input.apply(&self.table))
    }

    /// Same as [`TokenEmbedding::lookup`] for an Int64 id tensor of any shape, e.g.
    /// `[batch, seq_len] -> [batch, seq_len, embed_dim]`.
    pub fn forward(&self, ids: &Tensor) -> Result<Tensor> {
        if ids.numel() > 0 {
            let min = i64::try_from(&ids.min())?;
            let max = i64::try_from(&ids.max())?;
            if min < 0 {
                return Err(self.invalid(min));
            }
            if max >= self.vocab_size {
                return Err(self.invalid(max));
            }
        }
        Ok(ids.apply(&self.table))
    }

    fn invalid(&self, id: TokenId) -> Error {
        Error::InvalidId {
            id,
            vocab_size: self.vocab_size as usize,
        }
    }

    pub fn weight(&self) -> &Tensor {
        &self.table.ws
    }

    pub fn vocab_size(&self) -> i64 {
        self.vocab_size
    }

    pub fn embed_dim(&self) -> i64 {
        self.embed_dim
    }

    pub fn num_parameters(&self) -> usize {
        self.table.ws.numel()
    }
}

fn no_bias() -> LinearConfig {
    LinearConfig {
        bias: false,
        ..Default::default()
    }
}

/// One causal self-attention head with pre-attention layer norm.
///
/// Takes `[batch, seq_len, embed_dim]` and produces `[batch, min(seq_len, block_size), head_size]`,
/// where every output position is a convex combination of the value vectors at that position and
/// the ones before it.
pub struct CausalSelfAttentionHead {
    key: Linear,   // embed_dim -> head_size
    query: Linear, // embed_dim -> head_size
    value: Linear, // embed_dim -> head_size
    // Lower-triangular ones: (i, j) may attend iff j <= i.
    tril: Tensor,
    ln: LayerNorm,
    head_size: i64,
    embed_dim: i64,
    block_size: i64,
}

impl CausalSelfAttentionHead {
    pub fn new(vs: &Path, head_size: i64, embed_dim: i64, block_size: i64) -> Self {
        let key = linear(vs / "key", embed_dim, head_size, no_bias());
        let query = linear(vs / "query", embed_dim, head_size, no_bias());
        let value = linear(vs / "value", embed_dim, head_size, no_bias());
        let tril = Tensor::ones([block_size, block_size], (Float, vs.device())).tril(0);
        let ln = layer_norm(vs / "ln", vec![embed_dim], Default::default());
        debug!(head_size, embed_dim, block_size, "allocated attention head");
        CausalSelfAttentionHead {
            key,
            query,
            value,
            tril,
            ln,
            head_size,
            embed_dim,
            block_size,
        }
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let (output, _) = self.forward_with_weights(input)?;
        Ok(output)
    }

    /// Runs the head and also returns the `[batch, T, T]` attention probabilities.
    ///
    /// 1. Keep at most the first `block_size` positions
    /// 2. Layer norm over embed_dim, per position
    /// 3. Project into Q, K, V                  (each: [batch, T, head_size])
    /// 4. Scores: Q @ K^T / sqrt(embed_dim)      (shape: [batch, T, T])
    /// 5. Future positions -> -infinity, then softmax over the last dimension
    /// 6. Weighted sum: weights @ V              (shape: [batch, T, head_size])
    pub fn forward_with_weights(&self, input: &Tensor) -> Result<(Tensor, Tensor)> {
        let size = input.size();
        let &[_, seq_len, channels] = size.as_slice() else {
            return Err(self.shape_error(size.clone()));
        };
        if channels != self.embed_dim {
            return Err(self.shape_error(size));
        }
        let (input, seq_len) = if seq_len > self.block_size {
            debug!(seq_len, block_size = self.block_size, "truncating input to block size");
            (input.narrow(1, 0, self.block_size), self.block_size)
        } else {
            (input.shallow_clone(), seq_len)
        };

        let normed = input.apply(&self.ln);
        let k = normed.apply(&self.key);
        let q = normed.apply(&self.query);
        let v = normed.apply(&self.value);

        // Scaled by the embedding width, not the head width.
        let scores = q.matmul(&k.transpose(-2, -1)) / (self.embed_dim as f64).sqrt();
        let future = self
            .tril
            .i((..seq_len, ..seq_len))
            .to_kind(Bool)
            .logical_not();
        let weights = scores
            .masked_fill(&future, f64::NEG_INFINITY)
            .softmax(-1, Float);
        let output = weights.matmul(&v);
        Ok((output, weights))
    }

    fn shape_error(&self, actual: Vec<i64>) -> Error {
        Error::Shape {
            expected: format!("[batch, seq_len, {}]", self.embed_dim),
            actual,
        }
    }

    pub fn head_size(&self) -> i64 {
        self.head_size
    }

    pub fn embed_dim(&self) -> i64 {
        self.embed_dim
    }

    pub fn block_size(&self) -> i64 {
        self.block_size
    }

    pub fn num_parameters(&self) -> usize {
        let projections: usize = [&self.key, &self.query, &self.value]
            .iter()
            .map(|l| l.ws.numel())
            .sum();
        let norm = self.ln.ws.as_ref().map_or(0, Tensor::numel)
            + self.ln.bs.as_ref().map_or(0, Tensor::numel);
        projections + norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind, nn};

    const VOCAB: i64 = 9;
    const EMBED: i64 = 32;
    const HEAD: i64 = 16;
    const BLOCK: i64 = 16;

    // -- TokenEmbedding tests --

    #[test]
    fn test_lookup_shape_and_rows() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let table = TokenEmbedding::new(&vs.root(), VOCAB, EMBED);
        let ids = [3i64, 7, 5, 4, 6, 1, 0, 8, 7, 5, 4, 6, 2];
        let output = table.lookup(&ids)?;
        assert_eq!(output.size(), &[13, EMBED]);
        for (i, &id) in ids.iter().enumerate() {
            assert!(output.get(i as i64).equal(&table.weight().get(id)));
        }
        Ok(())
    }

    #[test]
    fn test_lookup_out_of_range() {
        let vs = nn::VarStore::new(Device::Cpu);
        let table = TokenEmbedding::new(&vs.root(), VOCAB, EMBED);
        assert!(matches!(
            table.lookup(&[0, VOCAB]),
            Err(Error::InvalidId { id: 9, vocab_size: 9 })
        ));
        assert!(matches!(
            table.lookup(&[-2]),
            Err(Error::InvalidId { id: -2, .. })
        ));
    }

    #[test]
    fn test_forward_batched_ids() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let table = TokenEmbedding::new(&vs.root(), VOCAB, EMBED);
        let input = Tensor::from_slice2(&[&[1i64, 2, 3, 4], &[8, 0, 0, 5]]);
        let output = table.forward(&input)?;
        assert_eq!(output.size(), &[2, 4, EMBED]);
        let bad = Tensor::from_slice2(&[&[1i64, 2], &[3, 42]]);
        assert!(matches!(
            table.forward(&bad),
            Err(Error::InvalidId { id: 42, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_embedding_parameter_count() {
        let vs = nn::VarStore::new(Device::Cpu);
        let table = TokenEmbedding::new(&vs.root(), VOCAB, EMBED);
        assert_eq!(table.num_parameters(), (VOCAB * EMBED) as usize);
        assert_eq!(table.weight().size(), &[VOCAB, EMBED]);
    }

    // -- CausalSelfAttentionHead tests --

    /// Helper: create a random float input tensor shaped [batch, seq_len, EMBED]
    fn random_embed_input(batch: i64, seq_len: i64) -> Tensor {
        Tensor::randn(&[batch, seq_len, EMBED], (Float, Device::Cpu))
    }

    fn new_head(vs: &nn::VarStore) -> CausalSelfAttentionHead {
        CausalSelfAttentionHead::new(&vs.root(), HEAD, EMBED, BLOCK)
    }

    #[test]
    fn test_head_output_shape() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let head = new_head(&vs);
        let output = head.forward(&random_embed_input(1, 13))?;
        assert_eq!(output.size(), &[1, 13, HEAD]);
        let output = head.forward(&random_embed_input(3, 1))?;
        assert_eq!(output.size(), &[3, 1, HEAD]);
        Ok(())
    }

    #[test]
    fn test_head_truncates_to_block_size() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let head = new_head(&vs);
        let input = random_embed_input(1, 20);
        let output = head.forward(&input)?;
        assert_eq!(output.size(), &[1, BLOCK, HEAD]);
        // Identical to running only the first block_size positions.
        let expected = head.forward(&input.narrow(1, 0, BLOCK))?;
        assert!(output.allclose(&expected, 1e-5, 1e-6, false));
        Ok(())
    }

    #[test]
    fn test_head_weights_are_causal_distributions() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let head = new_head(&vs);
        let (_, weights) = head.forward_with_weights(&random_embed_input(2, 6))?;
        assert_eq!(weights.size(), &[2, 6, 6]);
        for b in 0..2 {
            for i in 0..6 {
                let mut row_sum = 0.0;
                for j in 0..6 {
                    let w = weights.double_value(&[b, i, j]);
                    if j > i {
                        assert_eq!(w, 0.0, "weight ({}, {}) should be masked", i, j);
                    } else {
                        assert!(w >= 0.0);
                    }
                    row_sum += w;
                }
                assert!((row_sum - 1.0).abs() < 1e-5, "row {} sums to {}", i, row_sum);
            }
        }
        // The first position can only attend to itself.
        assert!((weights.double_value(&[0, 0, 0]) - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_head_causal_masking() -> Result<()> {
        // Verify that changing a future token doesn't affect an earlier position's output
        let vs = nn::VarStore::new(Device::Cpu);
        let head = new_head(&vs);

        let input_a = random_embed_input(1, 4);
        let output_a = head.forward(&input_a)?;

        // Modify position 3 (the last token); positions 0, 1, 2 should be unaffected
        let input_b = input_a.copy();
        let noise = random_embed_input(1, 1);
        input_b.narrow(1, 3, 1).copy_(&noise);
        let output_b = head.forward(&input_b)?;

        for pos in 0..3 {
            let a = output_a.get(0).get(pos);
            let b = output_b.get(0).get(pos);
            let diff = (&a - &b).abs().sum(Kind::Float);
            assert!(
                f64::try_from(&diff).unwrap() < 1e-5,
                "Position {} changed when only a future token was modified",
                pos
            );
        }

        let a3 = output_a.get(0).get(3);
        let b3 = output_b.get(0).get(3);
        let diff3 = (&a3 - &b3).abs().sum(Kind::Float);
        assert!(
            f64::try_from(&diff3).unwrap() > 1e-5,
            "Position 3 should have changed"
        );
        Ok(())
    }

    #[test]
    fn test_head_scales_by_embed_dim() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let head = new_head(&vs);
        let input = random_embed_input(1, 5);
        let (_, weights) = head.forward_with_weights(&input)?;

        let normed = input.apply(&head.ln);
        let q = normed.apply(&head.query);
        let k = normed.apply(&head.key);
        let scores = q.matmul(&k.transpose(-2, -1)) / (EMBED as f64).sqrt();
        let mask = Tensor::ones(&[5, 5], (Float, Device::Cpu)).triu(1).to_kind(Bool);
        let expected = scores
            .masked_fill(&mask, f64::NEG_INFINITY)
            .softmax(-1, Float);
        assert!(weights.allclose(&expected, 1e-5, 1e-6, false));
        Ok(())
    }

    #[test]
    fn test_head_rejects_bad_shapes() {
        let vs = nn::VarStore::new(Device::Cpu);
        let head = new_head(&vs);
        let rank_two = Tensor::randn(&[13, EMBED], (Float, Device::Cpu));
        assert!(matches!(
            head.forward(&rank_two),
            Err(Error::Shape { actual, .. }) if actual == vec![13, EMBED]
        ));
        let wrong_width = Tensor::randn(&[1, 4, EMBED + 1], (Float, Device::Cpu));
        assert!(matches!(head.forward(&wrong_width), Err(Error::Shape { .. })));
    }

    #[test]
    fn test_head_parameter_count() {
        let vs = nn::VarStore::new(Device::Cpu);
        let head = new_head(&vs);
        assert_eq!(head.num_parameters(), (3 * EMBED * HEAD + 2 * EMBED) as usize);
        assert_eq!(head.head_size(), HEAD);
        assert_eq!(head.embed_dim(), EMBED);
        assert_eq!(head.block_size(), BLOCK);
    }
}
