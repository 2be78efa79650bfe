//! Context Engine
//!
//! Per-session conversation memory and token-budgeted context optimization.
//!
//! Two layers cooperate:
//!
//! - [`context`] turns a message list into a window that fits a token budget
//!   (recency, relevance, hybrid and summarization strategies).
//! - [`memory`] keeps continuously updated per-session state (buffer, summary
//!   or entity stores) inside a [`SessionMemoryRegistry`].
//!
//! ```no_run
//! use context_engine::{ConversationMemory, MemoryConfig, Message, SessionMemoryRegistry};
//!
//! # fn main() -> context_engine::Result<()> {
//! let registry = SessionMemoryRegistry::new(MemoryConfig::default())?;
//! registry.add_message("session-1", Message::user("My name is Alice", 0))?;
//! let outcome = registry.optimized_context("session-1")?;
//! println!("{} messages, {} tokens", outcome.messages.len(), outcome.tokens_after);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod memory;
pub mod metrics;

pub use config::{
    EngineSettings, LoggingConfig, MemoryConfig, MemoryStrategyKind, OptimizationConfig,
    StrategyKind,
};
pub use context::{ContextOptimizer, Message, OptimizationOutcome, Role, TokenEstimator};
pub use error::{ContextError, Result};
pub use logging::init_logging;
pub use memory::{
    ConversationMemory, Diagnostics, MemoryStats, MemoryStore, SessionHandle,
    SessionMemoryRegistry,
};
pub use metrics::EngineMetrics;
