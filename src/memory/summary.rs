//! Summary memory: rolling digests of older turns plus a verbatim recent window

use super::models::{ConversationMemory, Diagnostics, MemoryStats};
use crate::config::{MemoryConfig, MemoryStrategyKind, StrategyKind};
use crate::context::{ContextOptimizer, Digest, Message, OptimizationOutcome};
use crate::error::Result;
use tracing::{debug, warn};

/// Maintains `system + summaries + recent`.
///
/// Once `recent` exceeds `max_messages`, its oldest
/// `max_messages - context_window_size` entries are compressed into one digest.
pub struct SummaryMemory {
    config: MemoryConfig,
    optimizer: ContextOptimizer,
    system: Vec<Message>,
    summaries: Vec<Digest>,
    recent: Vec<Message>,
    stats: MemoryStats,
}

impl SummaryMemory {
    pub fn new(config: MemoryConfig) -> Result<Self> {
        config.validate_for(MemoryStrategyKind::Summary)?;
        Ok(Self {
            optimizer: ContextOptimizer::new(config.optimization.clone())?,
            config,
            system: Vec::new(),
            summaries: Vec::new(),
            recent: Vec::new(),
            stats: MemoryStats::new(MemoryStrategyKind::Summary),
        })
    }

    /// Rendered summary messages, oldest first
    pub fn summaries(&self) -> Vec<Message> {
        self.summaries.iter().map(Digest::to_message).collect()
    }

    pub fn recent(&self) -> &[Message] {
        &self.recent
    }

    fn enforce_capacity(&mut self) {
        if self.recent.len() > self.config.max_messages {
            let count = self.config.max_messages.saturating_sub(self.config.context_window_size);
            self.compress_oldest(count);
        }
    }

    /// Move the oldest `count` recent entries into a digest
    fn compress_oldest(&mut self, count: usize) {
        let count = count.min(self.recent.len());
        if count == 0 {
            return;
        }

        let chunk: Vec<Message> = self.recent.drain(..count).collect();
        match self.optimizer.summarizer().build_digest(&chunk) {
            Ok(digest) => {
                debug!("Compressed {} messages into summary {}", count, self.summaries.len() + 1);
                self.summaries.push(digest);
                self.stats.summaries_created += 1;
            }
            Err(e) => {
                warn!("Summary digest failed, dropping {} messages: {}", count, e);
                self.stats.diagnostics.summarization_fallbacks += 1;
            }
        }

        if self.summaries.len() > self.config.max_summaries {
            self.consolidate();
        }
    }

    /// Collapse all summaries into one
    fn consolidate(&mut self) {
        if let Some(merged) = Digest::merge(&self.summaries) {
            debug!("Consolidating {} summaries", self.summaries.len());
            self.summaries = vec![merged];
            self.stats.summaries_created += 1;
        }
    }

    fn context_tokens(&self) -> usize {
        self.optimizer.estimate_tokens(&self.get_context())
    }

    /// Rebuild state from an optimized context. Surviving digests stay
    /// structured; any other message, including a digest freshly produced by
    /// the optimizer, joins `recent`.
    fn replace_with(&mut self, messages: Vec<Message>) {
        let rendered: Vec<Message> = self.summaries();
        let mut kept = vec![false; self.summaries.len()];
        let mut system = Vec::new();
        let mut recent = Vec::new();

        for message in messages {
            if message.is_system() {
                system.push(message);
            } else if let Some(i) = rendered.iter().position(|r| *r == message) {
                kept[i] = true;
            } else {
                recent.push(message);
            }
        }

        let mut flags = kept.into_iter();
        self.summaries.retain(|_| flags.next().unwrap_or(false));
        self.system = system;
        self.recent = recent;
    }
}

impl ConversationMemory for SummaryMemory {
    fn add_message(&mut self, message: Message) {
        self.stats.messages_added += 1;
        if message.is_system() {
            self.system.push(message);
        } else {
            self.recent.push(message);
            self.enforce_capacity();
        }
    }

    fn get_context(&self) -> Vec<Message> {
        let mut context =
            Vec::with_capacity(self.system.len() + self.summaries.len() + self.recent.len());
        context.extend(self.system.iter().cloned());
        context.extend(self.summaries());
        context.extend(self.recent.iter().cloned());
        context
    }

    fn clear(&mut self) {
        self.system.clear();
        self.summaries.clear();
        self.recent.clear();
        self.stats = MemoryStats::new(MemoryStrategyKind::Summary);
    }

    fn stats(&self) -> MemoryStats {
        let context = self.get_context();
        let mut stats = self.stats.clone();
        stats.message_count = context.len();
        stats.token_count = self.optimizer.estimate_tokens(&context);
        stats
    }

    fn diagnostics(&self) -> Diagnostics {
        self.stats.diagnostics
    }

    fn should_optimize(&self) -> bool {
        self.optimizer.needs_optimization(&self.get_context())
    }

    /// Compress everything beyond the context window, merge summaries, and
    /// if the context is still over budget apply the configured strategy
    fn optimize(&mut self) -> OptimizationOutcome {
        let before = self.get_context();
        let tokens_before = self.optimizer.estimate_tokens(&before);

        let overflow = self.recent.len().saturating_sub(self.config.context_window_size);
        self.compress_oldest(overflow);
        if self.context_tokens() > self.config.optimization.max_tokens && self.summaries.len() > 1 {
            self.consolidate();
        }

        let mut strategy = StrategyKind::Summarization;
        let mut fell_back = false;
        let mut summarization_fell_back = false;

        let compacted = self.get_context();
        if self.optimizer.needs_optimization(&compacted) {
            let outcome = self
                .optimizer
                .optimize(&compacted, self.config.optimization_strategy);
            debug!(
                "Summary memory still over budget, applied {} ({} -> {} tokens)",
                outcome.strategy, outcome.tokens_before, outcome.tokens_after
            );
            strategy = outcome.strategy;
            fell_back = outcome.fell_back;
            summarization_fell_back = outcome.summarization_fell_back;
            self.replace_with(outcome.messages);
        }

        let messages = self.get_context();
        let outcome = OptimizationOutcome {
            tokens_after: self.optimizer.estimate_tokens(&messages),
            applied: messages != before,
            messages,
            strategy,
            fell_back,
            summarization_fell_back,
            tokens_before,
        };
        self.stats.record_optimization(&outcome);
        outcome
    }

    fn optimized_context(&mut self) -> OptimizationOutcome {
        let outcome = self
            .optimizer
            .optimize(&self.get_context(), self.config.optimization_strategy);
        self.stats.record_optimization(&outcome);
        outcome
    }

    fn carry_over_stats(&mut self, previous: &MemoryStats) {
        self.stats.carry_over(previous);
    }

    fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn set_config(&mut self, config: MemoryConfig) -> Result<()> {
        config.validate_for(MemoryStrategyKind::Summary)?;
        self.optimizer.set_config(config.optimization.clone())?;
        self.config = config;
        self.enforce_capacity();
        if self.summaries.len() > self.config.max_summaries {
            self.consolidate();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizationConfig;
    use crate::context::SUMMARY_PREFIX;

    fn memory(capacity: usize, window: usize) -> SummaryMemory {
        SummaryMemory::new(MemoryConfig {
            strategy: MemoryStrategyKind::Summary,
            max_messages: capacity,
            context_window_size: window,
            max_summaries: 2,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_compresses_when_over_capacity() {
        let mut mem = memory(4, 2);
        mem.add_message(Message::system("sys", 0));
        for i in 1..=5 {
            mem.add_message(Message::user(format!("Discussing the parser module {}", i), i));
        }

        // 5 > 4, so the oldest 2 are compressed and 3 remain
        assert_eq!(mem.summaries().len(), 1);
        assert_eq!(mem.recent().len(), 3);

        let context = mem.get_context();
        assert_eq!(context.len(), 5);
        assert!(context[0].is_system());
        assert!(context[1].content.starts_with(SUMMARY_PREFIX));
        assert!(context[1].content.contains("parser"));
        assert_eq!(context[1].position, 1);
        assert_eq!(context[2].position, 3);
        assert_eq!(mem.stats().summaries_created, 1);
    }

    #[test]
    fn test_summaries_consolidate() {
        let mut mem = memory(3, 1);
        for i in 0..12 {
            mem.add_message(Message::assistant(format!("Answer about lifetimes {}", i), i));
        }
        assert!(mem.summaries().len() <= 2);
        let first = &mem.summaries()[0];
        assert_eq!(first.position, 0);
    }

    #[test]
    fn test_blank_chunk_counts_fallback() {
        let mut mem = memory(2, 1);
        mem.add_message(Message::user("", 0));
        mem.add_message(Message::user("", 1));
        mem.add_message(Message::user("real content", 2));

        assert!(mem.summaries().is_empty());
        assert_eq!(mem.diagnostics().summarization_fallbacks, 1);
        assert_eq!(mem.recent().len(), 2);
    }

    #[test]
    fn test_manual_optimize_compresses_to_window() {
        let mut mem = memory(10, 3);
        for i in 0..8 {
            mem.add_message(Message::user(format!("question about traits {}", i), i));
        }
        assert!(mem.summaries().is_empty());

        let outcome = mem.optimize();
        assert!(outcome.applied);
        assert_eq!(mem.recent().len(), 3);
        assert_eq!(mem.summaries().len(), 1);
        assert_eq!(mem.stats().optimizations_performed, 1);
    }

    #[test]
    fn test_manual_optimize_enforces_budget() {
        let mut mem = SummaryMemory::new(MemoryConfig {
            strategy: MemoryStrategyKind::Summary,
            max_messages: 10,
            context_window_size: 3,
            optimization: OptimizationConfig {
                max_tokens: 100,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        mem.add_message(Message::system("Be brief.", 0));
        for i in 1..=8 {
            mem.add_message(Message::user("borrow ".repeat(57), i));
        }

        let outcome = mem.optimize();
        assert!(outcome.applied);
        assert!(outcome.tokens_after <= 100, "{} tokens", outcome.tokens_after);
        assert_eq!(outcome.strategy, StrategyKind::Hybrid);
        assert_eq!(mem.stats().token_count, outcome.tokens_after);
        assert!(mem.get_context()[0].is_system());
        assert!(!mem.should_optimize());
    }

    #[test]
    fn test_restore_from_rebuilds() {
        let mut mem = memory(4, 2);
        let messages: Vec<Message> = (0..6).map(|i| Message::user(format!("msg {}", i), i)).collect();
        mem.restore_from(messages);

        assert_eq!(mem.stats().messages_added, 6);
        assert!(!mem.summaries().is_empty());
        assert_eq!(mem.recent().last().map(|m| m.position), Some(5));
    }
}
