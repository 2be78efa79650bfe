//! Entity memory: extracted user facts plus a rolling recent window

use super::entities::{extract_entities, is_entity_context, EntitySet};
use super::models::{ConversationMemory, Diagnostics, MemoryStats};
use crate::config::{MemoryConfig, MemoryStrategyKind, OptimizationConfig};
use crate::context::{ContextOptimizer, Message, OptimizationOutcome};
use crate::error::Result;
use tracing::{debug, warn};

/// Maintains `system + entity context + recent`.
///
/// Every arriving non-system message is scanned for entities; a failed scan is
/// counted and logged but never rejects the message. A rendered entity-context
/// message arriving from elsewhere (e.g. a strategy switch) is not stored, since
/// the store renders its own.
pub struct EntityMemory {
    config: MemoryConfig,
    optimizer: ContextOptimizer,
    system: Vec<Message>,
    recent: Vec<Message>,
    entities: EntitySet,
    stats: MemoryStats,
}

impl EntityMemory {
    pub fn new(config: MemoryConfig) -> Result<Self> {
        config.validate_for(MemoryStrategyKind::Entity)?;
        Ok(Self {
            optimizer: ContextOptimizer::new(config.optimization.clone())?,
            config,
            system: Vec::new(),
            recent: Vec::new(),
            entities: EntitySet::default(),
            stats: MemoryStats::new(MemoryStrategyKind::Entity),
        })
    }

    pub fn entities(&self) -> &EntitySet {
        &self.entities
    }

    fn extract(&mut self, message: &Message) {
        match extract_entities(&message.content) {
            Ok(found) => {
                let added = self.entities.merge(found);
                if added > 0 {
                    debug!("Extracted {} new entities from message {}", added, message.position);
                    self.stats.entities_extracted += added as u64;
                }
            }
            Err(e) => {
                warn!("Entity extraction failed for message {}: {}", message.position, e);
                self.stats.diagnostics.extraction_failures += 1;
            }
        }
    }

    fn enforce_capacity(&mut self) {
        let excess = self.recent.len().saturating_sub(self.config.max_messages);
        if excess > 0 {
            self.recent.drain(..excess);
        }
    }

    /// Stored messages without the synthetic entity message
    fn stored_messages(&self) -> Vec<Message> {
        self.system.iter().chain(self.recent.iter()).cloned().collect()
    }

    fn entity_message(&self) -> Option<Message> {
        let position = self.recent.first().map_or(0, |m| m.position);
        self.entities.to_context_message(position)
    }

    /// Optimize stored messages within the budget left after the entity message
    fn optimize_stored(&self, reserved: usize) -> OptimizationOutcome {
        let stored = self.stored_messages();
        let strategy = self.config.optimization_strategy;
        if reserved == 0 {
            return self.optimizer.optimize(&stored, strategy);
        }

        let max_tokens = self.config.optimization.max_tokens.saturating_sub(reserved).max(1);
        let reduced = OptimizationConfig {
            max_tokens,
            ..self.config.optimization.clone()
        };
        match ContextOptimizer::new(reduced) {
            Ok(optimizer) => optimizer.optimize(&stored, strategy),
            Err(e) => {
                warn!("Reduced budget rejected, optimizing with the full budget: {}", e);
                self.optimizer.optimize(&stored, strategy)
            }
        }
    }
}

impl ConversationMemory for EntityMemory {
    fn add_message(&mut self, message: Message) {
        if is_entity_context(&message) {
            debug!("Skipping rendered entity context at position {}", message.position);
            return;
        }

        self.stats.messages_added += 1;
        if message.is_system() {
            self.system.push(message);
            return;
        }

        self.extract(&message);
        self.recent.push(message);
        self.enforce_capacity();
    }

    fn get_context(&self) -> Vec<Message> {
        let mut context = self.system.clone();
        if let Some(entity_message) = self.entity_message() {
            context.push(entity_message);
        }
        context.extend(self.recent.iter().cloned());
        context
    }

    fn clear(&mut self) {
        self.system.clear();
        self.recent.clear();
        self.entities = EntitySet::default();
        self.stats = MemoryStats::new(MemoryStrategyKind::Entity);
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

    /// Optimize the stored messages; extracted entities are kept and the
    /// entity message's cost is reserved from the budget
    fn optimize(&mut self) -> OptimizationOutcome {
        let before = self.get_context();
        let tokens_before = self.optimizer.estimate_tokens(&before);
        let reserved = self
            .entity_message()
            .map_or(0, |m| self.optimizer.estimate_tokens(std::slice::from_ref(&m)));

        let inner = self.optimize_stored(reserved);
        if inner.applied {
            let (system, recent): (Vec<Message>, Vec<Message>) =
                inner.messages.into_iter().partition(|m| m.is_system());
            self.system = system;
            self.recent = recent;
        }

        let messages = self.get_context();
        let outcome = OptimizationOutcome {
            tokens_after: self.optimizer.estimate_tokens(&messages),
            applied: inner.applied,
            messages,
            strategy: inner.strategy,
            fell_back: inner.fell_back,
            summarization_fell_back: inner.summarization_fell_back,
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
        config.validate_for(MemoryStrategyKind::Entity)?;
        self.optimizer.set_config(config.optimization.clone())?;
        self.config = config;
        self.enforce_capacity();
        Ok(())
    }
}
