//! Shared memory store contract and statistics

use crate::config::{MemoryConfig, MemoryStrategyKind, StrategyKind};
use crate::context::{Message, OptimizationOutcome};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Non-fatal failures absorbed by fallback paths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub optimization_fallbacks: u64,
    pub summarization_fallbacks: u64,
    pub extraction_failures: u64,
}

/// Per-session statistics record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub strategy: MemoryStrategyKind,
    pub messages_added: u64,
    pub optimizations_performed: u64,
    pub tokens_saved: u64,
    pub summaries_created: u64,
    pub entities_extracted: u64,
    /// Messages currently returned by `get_context`
    pub message_count: usize,
    /// Estimated tokens of the current context
    pub token_count: usize,
    pub last_strategy: Option<StrategyKind>,
    pub last_optimized_at: Option<DateTime<Utc>>,
    pub diagnostics: Diagnostics,
}

impl MemoryStats {
    pub fn new(strategy: MemoryStrategyKind) -> Self {
        Self {
            strategy,
            messages_added: 0,
            optimizations_performed: 0,
            tokens_saved: 0,
            summaries_created: 0,
            entities_extracted: 0,
            message_count: 0,
            token_count: 0,
            last_strategy: None,
            last_optimized_at: None,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Continue the history of a replaced store.
    ///
    /// Re-ingested messages are not new arrivals, so `messages_added` is taken
    /// from `previous`; work counters and diagnostics accumulate.
    pub fn carry_over(&mut self, previous: &MemoryStats) {
        self.messages_added = previous.messages_added;
        self.optimizations_performed += previous.optimizations_performed;
        self.tokens_saved += previous.tokens_saved;
        self.summaries_created += previous.summaries_created;
        self.entities_extracted += previous.entities_extracted;
        if self.last_strategy.is_none() {
            self.last_strategy = previous.last_strategy;
            self.last_optimized_at = previous.last_optimized_at;
        }
        self.diagnostics.absorb(&previous.diagnostics);
    }

    /// Fold an optimization outcome into the counters
    pub fn record_optimization(&mut self, outcome: &OptimizationOutcome) {
        if !outcome.applied {
            return;
        }
        self.optimizations_performed += 1;
        self.tokens_saved += outcome.tokens_saved() as u64;
        self.last_strategy = Some(outcome.strategy);
        self.last_optimized_at = Some(Utc::now());
        if outcome.fell_back {
            self.diagnostics.optimization_fallbacks += 1;
        }
        if outcome.summarization_fell_back {
            self.diagnostics.summarization_fallbacks += 1;
        }
    }
}

impl Diagnostics {
    fn absorb(&mut self, other: &Diagnostics) {
        self.optimization_fallbacks += other.optimization_fallbacks;
        self.summarization_fallbacks += other.summarization_fallbacks;
        self.extraction_failures += other.extraction_failures;
    }
}

/// Continuously updated per-session conversation memory
pub trait ConversationMemory {
    /// Ingest one arriving message; never fails
    fn add_message(&mut self, message: Message);

    /// Current context in original relative order
    fn get_context(&self) -> Vec<Message>;

    /// Drop all messages, derived state and counters
    fn clear(&mut self);

    fn stats(&self) -> MemoryStats;

    fn diagnostics(&self) -> Diagnostics;

    /// Whether the current context exceeds the token budget
    fn should_optimize(&self) -> bool;

    /// Manually reduce the stored state to fit the budget
    fn optimize(&mut self) -> OptimizationOutcome;

    /// Budget-fitted view of the current context; stored state is untouched
    fn optimized_context(&mut self) -> OptimizationOutcome;

    fn config(&self) -> &MemoryConfig;

    /// Replace the configuration of a store of the same kind
    fn set_config(&mut self, config: MemoryConfig) -> Result<()>;

    /// Continue counters from the store this one replaces
    fn carry_over_stats(&mut self, previous: &MemoryStats);

    /// Replace the state by re-ingesting `messages` one by one
    fn restore_from(&mut self, messages: Vec<Message>) {
        self.clear();
        for message in messages {
            self.add_message(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(applied: bool, fell_back: bool) -> OptimizationOutcome {
        OptimizationOutcome {
            messages: vec![],
            strategy: StrategyKind::Relevance,
            applied,
            fell_back,
            summarization_fell_back: false,
            tokens_before: 120,
            tokens_after: 80,
        }
    }

    #[test]
    fn test_record_optimization() {
        let mut stats = MemoryStats::new(MemoryStrategyKind::Buffer);
        stats.record_optimization(&outcome(false, false));
        assert_eq!(stats.optimizations_performed, 0);

        stats.record_optimization(&outcome(true, true));
        assert_eq!(stats.optimizations_performed, 1);
        assert_eq!(stats.tokens_saved, 40);
        assert_eq!(stats.last_strategy, Some(StrategyKind::Relevance));
        assert!(stats.last_optimized_at.is_some());
        assert_eq!(stats.diagnostics.optimization_fallbacks, 1);
    }

    #[test]
    fn test_carry_over_keeps_history() {
        let mut previous = MemoryStats::new(MemoryStrategyKind::Buffer);
        previous.messages_added = 7;
        previous.record_optimization(&outcome(true, true));

        let mut current = MemoryStats::new(MemoryStrategyKind::Entity);
        current.messages_added = 5;
        current.entities_extracted = 2;
        current.diagnostics.extraction_failures = 1;
        current.carry_over(&previous);

        assert_eq!(current.strategy, MemoryStrategyKind::Entity);
        assert_eq!(current.messages_added, 7);
        assert_eq!(current.optimizations_performed, 1);
        assert_eq!(current.tokens_saved, 40);
        assert_eq!(current.entities_extracted, 2);
        assert_eq!(current.last_strategy, Some(StrategyKind::Relevance));
        assert_eq!(current.diagnostics.optimization_fallbacks, 1);
        assert_eq!(current.diagnostics.extraction_failures, 1);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = MemoryStats::new(MemoryStrategyKind::Entity);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["strategy"], "entity");
        assert_eq!(json["diagnostics"]["extraction_failures"], 0);
    }
}
