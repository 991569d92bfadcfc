//! A character tokenizer, a token embedding table and a single causal self-attention head, wired
//! together on libtorch through `tch`.

pub mod constants;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod tokenizer;

pub use error::{Error, Result};
