//! Token counting.
//!
//! The heuristic counter charges one token per four characters, rounded up,
//! and at least one for any non-empty text. With the `tiktoken` feature the
//! `cl100k_base` encoding is used instead.

use std::sync::Arc;

/// Per-message protocol overhead added on top of role and content.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

pub trait TokenCounter: Send + Sync {
    /// Name recorded in compaction archives.
    fn model(&self) -> &str;

    fn count(&self, text: &str) -> usize;
}

/// Character-based estimate: `ceil(chars / 4)`.
#[derive(Debug, Clone, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn model(&self) -> &str {
        "heuristic"
    }

    fn count(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(4).max(1)
}

#[cfg(feature = "tiktoken")]
pub struct TiktokenCounter {
    model: String,
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tiktoken")]
impl TiktokenCounter {
    pub fn cl100k() -> Option<Self> {
        let bpe = tiktoken_rs::cl100k_base().ok()?;
        Some(Self {
            model: "cl100k_base".into(),
            bpe,
        })
    }
}

#[cfg(feature = "tiktoken")]
impl TokenCounter for TiktokenCounter {
    fn model(&self) -> &str {
        &self.model
    }

    fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_ordinary(text).len()
    }
}

/// Pick a counter for the configured token model.
///
/// Falls back to the heuristic when the model is unknown or the tokenizer
/// is not compiled in.
pub fn counter_for(token_model: &str) -> Arc<dyn TokenCounter> {
    #[cfg(feature = "tiktoken")]
    if token_model == "cl100k_base" {
        match TiktokenCounter::cl100k() {
            Some(counter) => return Arc::new(counter),
            None => tracing::warn!("Failed to load cl100k_base, using heuristic token counts"),
        }
    }

    if token_model != "heuristic" {
        tracing::debug!(token_model = %token_model, "Tokenizer not available, using heuristic token counts");
    }
    Arc::new(HeuristicCounter)
}

/// Cost of one message: overhead plus role and content tokens.
pub fn message_tokens(counter: &dyn TokenCounter, role: &str, content: &str) -> usize {
    MESSAGE_OVERHEAD_TOKENS + counter.count(role) + counter.count(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn short_text_is_at_least_one() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(estimate_tokens("жжжж"), 1);
    }

    #[test]
    fn message_includes_role_and_overhead() {
        // "user" → 1, "test" → 1, overhead 4
        assert_eq!(message_tokens(&HeuristicCounter, "user", "test"), 6);
        // "assistant" → 3
        assert_eq!(message_tokens(&HeuristicCounter, "assistant", ""), 7);
    }

    #[test]
    fn unknown_model_uses_heuristic() {
        let counter = counter_for("some/other-model");
        assert_eq!(counter.model(), "heuristic");
        assert_eq!(counter.count("hello"), 2);
    }
}
