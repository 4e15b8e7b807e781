//! Token counting.
//!
//! The benchmark only needs "how many tokens is this text under the model's
//! scheme", so the encoder is hidden behind [`TokenCount`]. The production
//! implementation resolves a tiktoken encoding for the model once and falls
//! back to `cl100k_base` for models tiktoken does not know about.

use std::sync::Arc;

use tiktoken_rs::tokenizer::{get_tokenizer, Tokenizer};
use tiktoken_rs::CoreBPE;

pub const FALLBACK_ENCODING: &str = "cl100k_base";

#[derive(Debug, thiserror::Error)]
#[error("failed to load {encoding} encoding: {message}")]
pub struct TokenizerError {
    encoding: String,
    message: String,
}

/// Counts tokens in a piece of text. Implementations must be deterministic
/// and safe to share across concurrently running requests.
pub trait TokenCount: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

pub struct TokenCounter {
    encoding: String,
    fallback: bool,
    bpe: Arc<CoreBPE>,
}

impl TokenCounter {
    /// Resolve the encoding registered for `model`. An unknown model is not an
    /// error: it logs a warning and uses `cl100k_base`.
    pub fn for_model(model: &str) -> Result<Self, TokenizerError> {
        let (tokenizer, fallback) = match get_tokenizer(model) {
            Some(tokenizer) => (tokenizer, false),
            None => {
                tracing::warn!(
                    model,
                    fallback = FALLBACK_ENCODING,
                    "no specific tokenizer found for model, using fallback encoding"
                );
                (Tokenizer::Cl100kBase, true)
            }
        };
        let encoding = encoding_name(tokenizer);
        let bpe = tiktoken_rs::get_bpe_from_tokenizer(tokenizer).map_err(|e| TokenizerError {
            encoding: encoding.to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(model, encoding, "tokenizer loaded");
        Ok(Self {
            encoding: encoding.to_string(),
            fallback,
            bpe: Arc::new(bpe),
        })
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// True when the model had no registered encoding.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

impl TokenCount for TokenCounter {
    fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_with_special_tokens(text).len()
    }
}

fn encoding_name(tokenizer: Tokenizer) -> &'static str {
    match tokenizer {
        Tokenizer::O200kBase => "o200k_base",
        Tokenizer::Cl100kBase => "cl100k_base",
        Tokenizer::P50kBase => "p50k_base",
        Tokenizer::R50kBase => "r50k_base",
        Tokenizer::P50kEdit => "p50k_edit",
        Tokenizer::Gpt2 => "gpt2",
        #[allow(unreachable_patterns)]
        _ => "unknown",
    }
}
