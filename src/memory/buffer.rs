//! Fixed-capacity rolling message buffer

use super::models::{ConversationMemory, Diagnostics, MemoryStats};
use crate::config::{MemoryConfig, MemoryStrategyKind};
use crate::context::{ContextOptimizer, Message, OptimizationOutcome};
use crate::error::Result;
use tracing::debug;

/// Keeps the newest `max_messages` non-system messages plus every system message
pub struct BufferMemory {
    config: MemoryConfig,
    optimizer: ContextOptimizer,
    messages: Vec<Message>,
    stats: MemoryStats,
}

impl BufferMemory {
    pub fn new(config: MemoryConfig) -> Result<Self> {
        config.validate_for(MemoryStrategyKind::Buffer)?;
        Ok(Self {
            optimizer: ContextOptimizer::new(config.optimization.clone())?,
            config,
            messages: Vec::new(),
            stats: MemoryStats::new(MemoryStrategyKind::Buffer),
        })
    }

    /// Rotate out the oldest non-system entries until within capacity
    fn enforce_capacity(&mut self) {
        let mut excess = self
            .messages
            .iter()
            .filter(|m| !m.is_system())
            .count()
            .saturating_sub(self.config.max_messages);

        if excess == 0 {
            return;
        }

        debug!("Buffer over capacity, rotating out {} messages", excess);
        self.messages.retain(|m| {
            if excess > 0 && !m.is_system() {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }
}

impl ConversationMemory for BufferMemory {
    fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.stats.messages_added += 1;
        self.enforce_capacity();
    }

    fn get_context(&self) -> Vec<Message> {
        self.messages.clone()
    }

    fn clear(&mut self) {
        self.messages.clear();
        self.stats = MemoryStats::new(MemoryStrategyKind::Buffer);
    }

    fn stats(&self) -> MemoryStats {
        let mut stats = self.stats.clone();
        stats.message_count = self.messages.len();
        stats.token_count = self.optimizer.estimate_tokens(&self.messages);
        stats
    }

    fn diagnostics(&self) -> Diagnostics {
        self.stats.diagnostics
    }

    fn should_optimize(&self) -> bool {
        self.optimizer.needs_optimization(&self.messages)
    }

    fn optimize(&mut self) -> OptimizationOutcome {
        let outcome = self
            .optimizer
            .optimize(&self.messages, self.config.optimization_strategy);
        if outcome.applied {
            self.messages = outcome.messages.clone();
        }
        self.stats.record_optimization(&outcome);
        outcome
    }

    fn optimized_context(&mut self) -> OptimizationOutcome {
        let outcome = self
            .optimizer
            .optimize(&self.messages, self.config.optimization_strategy);
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
        config.validate_for(MemoryStrategyKind::Buffer)?;
        self.optimizer.set_config(config.optimization.clone())?;
        self.config = config;
        self.enforce_capacity();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OptimizationConfig, StrategyKind};

    fn buffer(capacity: usize) -> BufferMemory {
        BufferMemory::new(MemoryConfig {
            max_messages: capacity,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_rotation_keeps_system() {
        let mut memory = buffer(3);
        memory.add_message(Message::system("sys", 0));
        for i in 1..=4 {
            memory.add_message(Message::user(format!("m{}", i), i));
        }

        let contents: Vec<String> = memory.get_context().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["sys", "m2", "m3", "m4"]);
        assert_eq!(memory.stats().messages_added, 5);
    }

    #[test]
    fn test_system_messages_survive_over_capacity() {
        let mut memory = buffer(2);
        for i in 0..4 {
            memory.add_message(Message::system(format!("rule {}", i), i));
        }
        memory.add_message(Message::user("hello", 4));

        let context = memory.get_context();
        assert_eq!(context.iter().filter(|m| m.is_system()).count(), 4);
        assert_eq!(context.len(), 5);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut memory = buffer(3);
        memory.add_message(Message::user("hi", 0));
        memory.clear();
        assert!(memory.get_context().is_empty());
        assert_eq!(memory.stats().messages_added, 0);
    }

    #[test]
    fn test_manual_optimize_fits_budget() {
        let mut memory = BufferMemory::new(MemoryConfig {
            optimization_strategy: StrategyKind::Recency,
            optimization: OptimizationConfig {
                max_tokens: 60,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();

        memory.add_message(Message::system("Be helpful.", 0));
        for i in 1..=10 {
            memory.add_message(Message::user("x".repeat(40), i));
        }
        assert!(memory.should_optimize());

        let outcome = memory.optimize();
        assert!(outcome.applied);
        assert!(!memory.should_optimize());

        let stats = memory.stats();
        assert!(stats.token_count <= 60);
        assert_eq!(stats.optimizations_performed, 1);
        assert_eq!(stats.tokens_saved as usize, outcome.tokens_saved());
        assert_eq!(stats.last_strategy, Some(StrategyKind::Recency));
    }

    #[test]
    fn test_optimized_context_leaves_state() {
        let mut memory = BufferMemory::new(MemoryConfig {
            optimization: OptimizationConfig {
                max_tokens: 30,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        for i in 0..6 {
            memory.add_message(Message::user("y".repeat(40), i));
        }

        let outcome = memory.optimized_context();
        assert!(outcome.messages.len() < 6);
        assert_eq!(memory.get_context().len(), 6);
    }

    #[test]
    fn test_set_config_shrinks_capacity() {
        let mut memory = buffer(5);
        for i in 0..5 {
            memory.add_message(Message::user(format!("m{}", i), i));
        }
        memory
            .set_config(MemoryConfig {
                max_messages: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(memory.get_context().len(), 2);
        assert_eq!(memory.get_context()[0].content, "m3");
    }
}
