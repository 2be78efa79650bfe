//! Character-based token estimation

use super::models::{Message, Role};
use crate::config::OptimizationConfig;
use serde::{Deserialize, Serialize};

const PREVIEW_CHARS: usize = 50;

/// Approximates token cost from character length and role weighting
#[derive(Debug, Clone)]
pub struct TokenEstimator {
    chars_per_token: usize,
    system_message_weight: f32,
    message_overhead: usize,
}

impl TokenEstimator {
    pub fn new(config: &OptimizationConfig) -> Self {
        Self {
            chars_per_token: config.chars_per_token.max(1),
            system_message_weight: config.system_message_weight,
            message_overhead: config.message_overhead_tokens,
        }
    }

    /// Estimate the tokens of a single message
    pub fn estimate(&self, message: &Message) -> usize {
        let base = message.content.chars().count() / self.chars_per_token;
        let weighted = if message.is_system() {
            (base as f32 * self.system_message_weight) as usize
        } else {
            base
        };
        weighted + self.message_overhead
    }

    /// Estimate tokens for a list; empty messages cost nothing
    pub fn estimate_many(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| self.estimate(m))
            .sum()
    }

    /// Per-message breakdown for diagnostics
    pub fn detailed(&self, messages: &[Message]) -> TokenBreakdown {
        let entries: Vec<MessageTokens> = messages
            .iter()
            .map(|m| MessageTokens {
                position: m.position,
                role: m.role,
                char_count: m.content.chars().count(),
                token_count: if m.content.is_empty() { 0 } else { self.estimate(m) },
                preview: preview(&m.content),
            })
            .collect();

        let total_tokens: usize = entries.iter().map(|e| e.token_count).sum();
        let total_chars: usize = entries.iter().map(|e| e.char_count).sum();
        let mean_tokens = if entries.is_empty() {
            0.0
        } else {
            total_tokens as f32 / entries.len() as f32
        };

        TokenBreakdown {
            message_count: entries.len(),
            total_tokens,
            total_chars,
            mean_tokens,
            messages: entries,
        }
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        content.to_string()
    } else {
        let head: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    }
}

/// Token estimate for one message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTokens {
    pub position: usize,
    pub role: Role,
    pub char_count: usize,
    pub token_count: usize,
    pub preview: String,
}

/// Token estimates for a message list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBreakdown {
    pub message_count: usize,
    pub total_tokens: usize,
    pub total_chars: usize,
    pub mean_tokens: f32,
    pub messages: Vec<MessageTokens>,
}
