//! Deterministic digest summarization for older conversation turns
//!
//! Older non-system messages are compressed into one synthetic assistant
//! message; system messages and the newest turns are kept verbatim. When a
//! digest cannot be built, the summarizer falls back to plain truncation and
//! reports it through `SummaryOutcome::fell_back`.

use super::models::{Message, Role};
use super::scorer::{extract_keywords, looks_like_code};
use super::token_estimator::TokenEstimator;
use crate::config::OptimizationConfig;
use crate::error::{ContextError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Oldest compressed messages mined for digest keywords
const DIGEST_SOURCE_MESSAGES: usize = 5;

/// Keywords named in a digest
const DIGEST_KEYWORDS: usize = 5;

/// Prefix marking synthetic digest messages
pub const SUMMARY_PREFIX: &str = "[Conversation summary]";

/// Compressed description of a run of messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    /// Position of the earliest message replaced
    pub position: usize,
    pub message_count: usize,
    pub user_count: usize,
    pub assistant_count: usize,
    pub keywords: Vec<String>,
    pub has_code: bool,
}

impl Digest {
    /// Combine digests into one; keywords keep first-seen order
    pub fn merge(digests: &[Digest]) -> Option<Digest> {
        let position = digests.iter().map(|d| d.position).min()?;

        let mut keywords: Vec<String> = Vec::new();
        for keyword in digests.iter().flat_map(|d| d.keywords.iter()) {
            if keywords.len() == DIGEST_KEYWORDS {
                break;
            }
            if !keywords.contains(keyword) {
                keywords.push(keyword.clone());
            }
        }

        Some(Digest {
            position,
            message_count: digests.iter().map(|d| d.message_count).sum(),
            user_count: digests.iter().map(|d| d.user_count).sum(),
            assistant_count: digests.iter().map(|d| d.assistant_count).sum(),
            keywords,
            has_code: digests.iter().any(|d| d.has_code),
        })
    }

    /// Render as a synthetic assistant message
    pub fn to_message(&self) -> Message {
        let mut content = format!(
            "{} Earlier discussion ({} messages: {} from user, {} from assistant)",
            SUMMARY_PREFIX, self.message_count, self.user_count, self.assistant_count
        );
        if self.keywords.is_empty() {
            content.push_str(" covered general conversation.");
        } else {
            content.push_str(&format!(" covered: {}.", self.keywords.join(", ")));
        }
        if self.has_code {
            content.push_str(" Code examples were discussed.");
        }
        Message::assistant(content, self.position)
    }
}

/// Result of a summarization pass
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub messages: Vec<Message>,
    /// Messages replaced by the digest (or dropped on fallback)
    pub compressed: usize,
    /// Truncation ran instead of a digest
    pub fell_back: bool,
}

/// Digest summarizer
#[derive(Debug, Clone)]
pub struct Summarizer {
    config: OptimizationConfig,
    estimator: TokenEstimator,
}

impl Summarizer {
    pub fn new(config: OptimizationConfig) -> Self {
        let estimator = TokenEstimator::new(&config);
        Self { config, estimator }
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Summarization is worthwhile only when the list is both large in tokens
    /// and long enough to leave a meaningful compressed run
    pub fn should_summarize(&self, messages: &[Message]) -> bool {
        let tokens = self.estimator.estimate_many(messages) as f32;
        let non_system = messages.iter().filter(|m| !m.is_system()).count();

        tokens >= self.config.summarization_trigger_tokens()
            && non_system > self.config.messages_to_keep_after_summary * 2
    }

    /// Compress older non-system messages, keeping system messages and the
    /// newest `messages_to_keep_after_summary` turns
    pub fn summarize(&self, messages: &[Message]) -> SummaryOutcome {
        let compressed_indices = self.compressible_indices(messages);
        if compressed_indices.is_empty() {
            return SummaryOutcome {
                messages: messages.to_vec(),
                compressed: 0,
                fell_back: false,
            };
        }

        let compressed: Vec<Message> = compressed_indices
            .iter()
            .map(|&i| messages[i].clone())
            .collect();

        match self.digest(&compressed) {
            Ok(digest) => {
                let first = compressed_indices[0];
                let last = compressed_indices[compressed_indices.len() - 1];
                let mut output = Vec::with_capacity(messages.len() - compressed.len() + 1);

                for (index, message) in messages.iter().enumerate() {
                    if index == first {
                        output.push(digest.clone());
                    } else if index > first && index <= last && !message.is_system() {
                        continue;
                    } else {
                        output.push(message.clone());
                    }
                }

                debug!(
                    "Summarized {} messages into one digest ({} -> {} messages)",
                    compressed.len(),
                    messages.len(),
                    output.len()
                );

                SummaryOutcome {
                    messages: output,
                    compressed: compressed.len(),
                    fell_back: false,
                }
            }
            Err(e) => {
                warn!("Digest construction failed, falling back to truncation: {}", e);
                SummaryOutcome {
                    messages: self.truncate(messages),
                    compressed: compressed.len(),
                    fell_back: true,
                }
            }
        }
    }

    /// Build one synthetic assistant message describing `messages`.
    ///
    /// The digest takes the position of the earliest message it replaces.
    pub fn digest(&self, messages: &[Message]) -> Result<Message> {
        Ok(self.build_digest(messages)?.to_message())
    }

    /// Structured digest of `messages`, before rendering
    pub fn build_digest(&self, messages: &[Message]) -> Result<Digest> {
        let first = messages
            .first()
            .ok_or_else(|| ContextError::Summarization("nothing to summarize".to_string()))?;

        if !messages.iter().any(|m| m.has_content()) {
            return Err(ContextError::Summarization(format!(
                "{} messages carry no content",
                messages.len()
            )));
        }

        let source = &messages[..messages.len().min(DIGEST_SOURCE_MESSAGES)];

        Ok(Digest {
            position: first.position,
            message_count: messages.len(),
            user_count: messages.iter().filter(|m| m.role == Role::User).count(),
            assistant_count: messages.iter().filter(|m| m.role == Role::Assistant).count(),
            keywords: extract_keywords(source, DIGEST_KEYWORDS),
            has_code: messages.iter().any(|m| looks_like_code(&m.content)),
        })
    }

    /// Drop the oldest non-system messages until only the newest
    /// `messages_to_keep_after_summary` remain
    pub fn truncate(&self, messages: &[Message]) -> Vec<Message> {
        let drop: Vec<usize> = self.compressible_indices(messages);
        messages
            .iter()
            .enumerate()
            .filter(|(index, _)| !drop.contains(index))
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn compressible_indices(&self, messages: &[Message]) -> Vec<usize> {
        let non_system: Vec<usize> = messages
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_system())
            .map(|(i, _)| i)
            .collect();

        let keep = self.config.messages_to_keep_after_summary;
        if non_system.len() <= keep {
            return Vec::new();
        }
        non_system[..non_system.len() - keep].to_vec()
    }
}
