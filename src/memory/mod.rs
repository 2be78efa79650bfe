//! Per-session conversation memory
//!
//! Memory stores are updated continuously as messages arrive, unlike the
//! request-time [`ContextOptimizer`](crate::context::ContextOptimizer). Three
//! variants are provided:
//!
//! - [`BufferMemory`]: the newest `max_messages` messages, system messages pinned
//! - [`SummaryMemory`]: rolling digests of older turns plus a recent window
//! - [`EntityMemory`]: extracted names, preferences and facts plus a recent window
//!
//! [`SessionMemoryRegistry`] owns one [`MemoryStore`] per session id.

pub mod models;
pub mod buffer;
pub mod summary;
pub mod entities;
pub mod entity;
pub mod registry;

pub use models::{ConversationMemory, Diagnostics, MemoryStats};
pub use buffer::BufferMemory;
pub use summary::SummaryMemory;
pub use entities::{extract_entities, EntitySet, ENTITY_CONTEXT_PREFIX};
pub use entity::EntityMemory;
pub use registry::{SessionHandle, SessionMemory, SessionMemoryRegistry};

use crate::config::{MemoryConfig, MemoryStrategyKind};
use crate::context::{Message, OptimizationOutcome};
use crate::error::Result;

/// One of the memory store variants
pub enum MemoryStore {
    Buffer(BufferMemory),
    Summary(SummaryMemory),
    Entity(EntityMemory),
}

impl MemoryStore {
    /// Build the store selected by `config.strategy`
    pub fn new(config: MemoryConfig) -> Result<Self> {
        Ok(match config.strategy {
            MemoryStrategyKind::Buffer => Self::Buffer(BufferMemory::new(config)?),
            MemoryStrategyKind::Summary => Self::Summary(SummaryMemory::new(config)?),
            MemoryStrategyKind::Entity => Self::Entity(EntityMemory::new(config)?),
        })
    }

    pub fn kind(&self) -> MemoryStrategyKind {
        match self {
            Self::Buffer(_) => MemoryStrategyKind::Buffer,
            Self::Summary(_) => MemoryStrategyKind::Summary,
            Self::Entity(_) => MemoryStrategyKind::Entity,
        }
    }
}

macro_rules! dispatch {
    ($store:expr, $inner:ident => $call:expr) => {
        match $store {
            MemoryStore::Buffer($inner) => $call,
            MemoryStore::Summary($inner) => $call,
            MemoryStore::Entity($inner) => $call,
        }
    };
}

impl ConversationMemory for MemoryStore {
    fn add_message(&mut self, message: Message) {
        dispatch!(self, m => m.add_message(message))
    }

    fn get_context(&self) -> Vec<Message> {
        dispatch!(self, m => m.get_context())
    }

    fn clear(&mut self) {
        dispatch!(self, m => m.clear())
    }

    fn stats(&self) -> MemoryStats {
        dispatch!(self, m => m.stats())
    }

    fn diagnostics(&self) -> Diagnostics {
        dispatch!(self, m => m.diagnostics())
    }

    fn should_optimize(&self) -> bool {
        dispatch!(self, m => m.should_optimize())
    }

    fn optimize(&mut self) -> OptimizationOutcome {
        dispatch!(self, m => m.optimize())
    }

    fn optimized_context(&mut self) -> OptimizationOutcome {
        dispatch!(self, m => m.optimized_context())
    }

    fn carry_over_stats(&mut self, previous: &MemoryStats) {
        dispatch!(self, m => m.carry_over_stats(previous))
    }

    fn config(&self) -> &MemoryConfig {
        dispatch!(self, m => m.config())
    }

    fn set_config(&mut self, config: MemoryConfig) -> Result<()> {
        dispatch!(self, m => m.set_config(config))
    }
}
