use std::{collections::HashMap, fs, path::Path};

use tracing::debug;

use crate::error::{Error, Result};

/// Integer id of a vocabulary character. `i64` so id sequences go straight into an Int64 tensor.
pub type TokenId = i64;

/// Sorted, duplicate-free characters and the reverse lookup from character to id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocab {
    chars: Vec<char>,
    stoi: HashMap<char, TokenId>,
}

impl Vocab {
    /// Collects the distinct characters of `text` in code point order. A character's id is its
    /// position in that order.
    pub fn from_text(text: &str) -> Self {
        let mut chars: Vec<char> = text.chars().collect();
        chars.sort_unstable();
        chars.dedup();
        let stoi = chars
            .iter()
            .enumerate()
            .map(|(id, &c)| (c, id as TokenId))
            .collect();
        Vocab { chars, stoi }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn id(&self, c: char) -> Option<TokenId> {
        self.stoi.get(&c).copied()
    }

    pub fn char_at(&self, id: TokenId) -> Option<char> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.chars.get(i))
            .copied()
    }
}

/// Character-level tokenizer. Every distinct character of the corpus is one token; there is no
/// unknown-token fallback.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocab: Vocab,
}

impl Tokenizer {
    /// Builds a tokenizer from `text`, or from the contents of `file_path` when no text is given.
    /// Text takes precedence when both are supplied.
    pub fn new(text: Option<&str>, file_path: Option<&Path>) -> Result<Self> {
        match (text, file_path) {
            (Some(text), _) => Ok(Self::from_text(text)),
            (None, Some(path)) => Self::from_file(path),
            (None, None) => Err(Error::MissingSource),
        }
    }

    pub fn from_text(text: &str) -> Self {
        let vocab = Vocab::from_text(text);
        debug!(vocab_size = vocab.len(), "built character vocabulary");
        Tokenizer { vocab }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        debug!(path = %path.display(), bytes = text.len(), "read corpus");
        Ok(Self::from_text(&text))
    }

    pub fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        text.chars()
            .map(|c| self.vocab.id(c).ok_or(Error::UnknownChar(c)))
            .collect()
    }

    pub fn decode(&self, ids: &[TokenId]) -> Result<String> {
        ids.iter()
            .map(|&id| {
                self.vocab.char_at(id).ok_or(Error::InvalidId {
                    id,
                    vocab_size: self.vocab.len(),
                })
            })
            .collect()
    }

    pub fn get_vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub fn get_vocab(&self) -> &[char] {
        self.vocab.chars()
    }

    /// Writes one vocabulary character per line in id order, replacing any existing file.
    pub fn save_vocab(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents: String = self.vocab.chars().iter().flat_map(|&c| [c, '\n']).collect();
        fs::write(path, contents)?;
        debug!(path = %path.display(), vocab_size = self.vocab.len(), "saved vocabulary");
        Ok(())
    }

    /// Rebuilds a tokenizer from a file written by [`Tokenizer::save_vocab`].
    ///
    /// The characters are concatenated and run through the same sort-and-dedupe construction as
    /// raw text, so ids only match the file order when the file was already sorted and free of
    /// duplicates. An empty line stands for the newline character.
    pub fn load_vocab(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        let text: String = contents
            .split_terminator('\n')
            .map(|line| if line.is_empty() { "\n" } else { line })
            .collect();
        debug!(path = %path.display(), "loaded vocabulary");
        Ok(Self::from_text(&text))
    }
}
