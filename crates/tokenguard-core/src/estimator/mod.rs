//! Token estimation for admission control.
//!
//! A fast character-class approximation, not a tokenizer:
//! - Hangul syllables (U+AC00..=U+D7AF): `korean_factor` each (default 1.2)
//! - ASCII letters: 0.25 each
//! - everything else: 0.5 each
//!
//! Chat conversations add 3 per message and 4 per conversation.

mod payload;

pub use payload::{ChatMessage, CompletionRequest, MessageContent, Prompt};

use tokenguard_types::models::config::EstimatorConfig;

const ASCII_ALPHA_WEIGHT: f64 = 0.25;
const OTHER_WEIGHT: f64 = 0.5;

/// Formatting overhead per chat message.
pub const PER_MESSAGE_OVERHEAD: u64 = 3;
/// Formatting overhead per conversation.
pub const PER_CONVERSATION_OVERHEAD: u64 = 4;

fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7AF}').contains(&c)
}

/// Stateless estimator; cheap to copy into every request task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenEstimator {
    korean_factor: f64,
    default_max_tokens: u64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::from_config(&EstimatorConfig::default())
    }
}

impl TokenEstimator {
    pub fn new(korean_factor: f64, default_max_tokens: u64) -> Self {
        Self { korean_factor, default_max_tokens }
    }

    pub fn from_config(config: &EstimatorConfig) -> Self {
        Self::new(config.korean_factor, config.default_max_tokens)
    }

    pub fn default_max_tokens(&self) -> u64 {
        self.default_max_tokens
    }

    /// Estimate a single text blob. Empty text is 0, anything else at least 1.
    pub fn estimate_text(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }

        let (mut hangul, mut alpha, mut other) = (0u64, 0u64, 0u64);
        for c in text.chars() {
            if is_hangul_syllable(c) {
                hangul += 1;
            } else if c.is_ascii_alphabetic() {
                alpha += 1;
            } else {
                other += 1;
            }
        }

        let weighted = hangul as f64 * self.korean_factor
            + alpha as f64 * ASCII_ALPHA_WEIGHT
            + other as f64 * OTHER_WEIGHT;

        (weighted as u64).max(1)
    }

    /// `sum(content) + 3 * messages + 4`.
    pub fn estimate_messages(&self, messages: &[ChatMessage]) -> u64 {
        let content: u64 = messages
            .iter()
            .map(|m| self.estimate_text(&m.content_text()) + PER_MESSAGE_OVERHEAD)
            .sum();
        content + PER_CONVERSATION_OVERHEAD
    }

    /// Input-side estimate of a request: its conversation, or its prompt.
    pub fn estimate_input(&self, request: &CompletionRequest) -> u64 {
        if let Some(messages) = &request.messages {
            return self.estimate_messages(messages);
        }
        match &request.prompt {
            Some(prompt) => prompt.texts().iter().map(|t| self.estimate_text(t)).sum(),
            None => 0,
        }
    }

    /// Worst-case total charged at the gate: input plus the declared output budget.
    pub fn admission_estimate(&self, request: &CompletionRequest) -> u64 {
        let budget = request.max_tokens.unwrap_or(self.default_max_tokens);
        self.estimate_input(request).saturating_add(budget)
    }
}
