//! Request-time context optimization
//!
//! `ContextOptimizer` reduces a snapshot of a conversation to fit the token
//! budget using one of the `StrategyKind` selection strategies:
//! - fast path: short or already-fitting inputs are returned unchanged
//! - strategy selection (see `strategies.rs`)
//! - budget post-check, with recency truncation as the universal fallback
//!
//! Failures never escape `optimize()`; they are reported on the outcome.

use super::models::Message;
use super::scorer::MessageScorer;
use super::summarizer::Summarizer;
use super::token_estimator::TokenEstimator;
use crate::config::{OptimizationConfig, StrategyKind};
use crate::error::{ContextError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Messages chosen by a strategy
#[derive(Debug, Clone)]
pub(crate) struct Selection {
    pub messages: Vec<Message>,
    /// A digest could not be built and truncation was used instead
    pub digest_fallback: bool,
}

impl Selection {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            digest_fallback: false,
        }
    }
}

/// Result of one optimization call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub messages: Vec<Message>,
    pub strategy: StrategyKind,
    /// False when the fast path returned the input unchanged
    pub applied: bool,
    /// The strategy failed and recency truncation was used
    pub fell_back: bool,
    /// Summarization used truncation instead of a digest
    pub summarization_fell_back: bool,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

impl OptimizationOutcome {
    pub fn tokens_saved(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }
}

/// Token-budgeted context optimizer
pub struct ContextOptimizer {
    pub(super) config: OptimizationConfig,
    pub(super) estimator: TokenEstimator,
    pub(super) scorer: MessageScorer,
    pub(super) summarizer: Summarizer,
}

impl ContextOptimizer {
    /// Create an optimizer from a validated configuration
    pub fn new(config: OptimizationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            estimator: TokenEstimator::new(&config),
            scorer: MessageScorer::new(config.clone()),
            summarizer: Summarizer::new(config.clone()),
            config,
        })
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Replace the configuration, invalidating cached keyword sets
    pub fn set_config(&mut self, config: OptimizationConfig) -> Result<()> {
        config.validate()?;
        self.estimator = TokenEstimator::new(&config);
        self.scorer.set_config(config.clone());
        self.summarizer = Summarizer::new(config.clone());
        self.config = config;
        Ok(())
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    pub fn scorer(&self) -> &MessageScorer {
        &self.scorer
    }

    pub fn summarizer(&self) -> &Summarizer {
        &self.summarizer
    }

    pub fn estimate_tokens(&self, messages: &[Message]) -> usize {
        self.estimator.estimate_many(messages)
    }

    /// Whether `optimize` would do anything beyond the fast path
    pub fn needs_optimization(&self, messages: &[Message]) -> bool {
        messages.len() >= self.config.min_messages_for_optimization
            && self.estimate_tokens(messages) > self.config.max_tokens
    }

    /// Reduce `messages` to fit the token budget using `strategy`
    pub fn optimize(&self, messages: &[Message], strategy: StrategyKind) -> OptimizationOutcome {
        let tokens_before = self.estimate_tokens(messages);

        if !self.needs_optimization(messages) {
            return OptimizationOutcome {
                messages: messages.to_vec(),
                strategy,
                applied: false,
                fell_back: false,
                summarization_fell_back: false,
                tokens_before,
                tokens_after: tokens_before,
            };
        }

        let (selection, fell_back) = match self.run_strategy(messages, strategy) {
            Ok(selection) => (selection, false),
            Err(e) => {
                warn!("{} strategy failed, falling back to recency truncation: {}", strategy, e);
                (self.select_recency(messages), true)
            }
        };

        let tokens_after = self.estimate_tokens(&selection.messages);
        debug!(
            "Optimized with {}: {} -> {} messages, {} -> {} tokens",
            strategy,
            messages.len(),
            selection.messages.len(),
            tokens_before,
            tokens_after
        );

        OptimizationOutcome {
            messages: selection.messages,
            strategy,
            applied: true,
            fell_back,
            summarization_fell_back: selection.digest_fallback,
            tokens_before,
            tokens_after,
        }
    }

    /// Universal fallback: keep system messages and the newest turns that fit
    pub fn truncate(&self, messages: &[Message]) -> Vec<Message> {
        self.select_recency(messages).messages
    }

    fn run_strategy(&self, messages: &[Message], strategy: StrategyKind) -> Result<Selection> {
        let selection = match strategy {
            StrategyKind::Recency => self.select_recency(messages),
            StrategyKind::Relevance => self.select_relevance(messages),
            StrategyKind::Hybrid => self.select_hybrid(messages),
            StrategyKind::Summarization => self.select_summarization(messages),
        };
        self.check_budget(messages, &selection.messages)?;
        Ok(selection)
    }

    /// A result over budget is only acceptable when the preserved system
    /// messages alone already exceed it
    fn check_budget(&self, input: &[Message], output: &[Message]) -> Result<()> {
        let used = self.estimate_tokens(output);
        if used <= self.config.max_tokens {
            return Ok(());
        }

        let floor = if self.config.preserve_system_messages {
            input
                .iter()
                .filter(|m| m.is_system())
                .filter(|m| !m.content.is_empty())
                .map(|m| self.estimator.estimate(m))
                .sum()
        } else {
            0
        };

        if floor > self.config.max_tokens && used <= floor {
            return Ok(());
        }

        Err(ContextError::Optimization(format!(
            "selection uses {} tokens, budget is {}",
            used, self.config.max_tokens
        )))
    }

    /// Token cost of one message; empty content is free
    pub(super) fn cost(&self, message: &Message) -> usize {
        if message.content.is_empty() {
            0
        } else {
            self.estimator.estimate(message)
        }
    }

    pub(super) fn is_preserved(&self, message: &Message) -> bool {
        self.config.preserve_system_messages && message.is_system()
    }
}
