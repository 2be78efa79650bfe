//! Session id to memory store registry

use super::models::{ConversationMemory, Diagnostics, MemoryStats};
use super::MemoryStore;
use crate::config::{MemoryConfig, MemoryStrategyKind};
use crate::context::{Message, OptimizationOutcome};
use crate::error::{ContextError, Result};
use crate::metrics::EngineMetrics;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// One session's store and lifecycle flag
pub struct SessionMemory {
    session_id: String,
    store: MemoryStore,
    active: bool,
}

impl SessionMemory {
    fn new(session_id: String, store: MemoryStore) -> Self {
        Self {
            session_id,
            store,
            active: true,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn kind(&self) -> MemoryStrategyKind {
        self.store.kind()
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn config(&self) -> &MemoryConfig {
        self.store.config()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(ContextError::InactiveSession(self.session_id.clone()))
        }
    }

    pub fn add_message(&mut self, message: Message) -> Result<()> {
        self.ensure_active()?;
        self.store.add_message(message);
        Ok(())
    }

    pub fn get_context(&self) -> Result<Vec<Message>> {
        self.ensure_active()?;
        Ok(self.store.get_context())
    }

    pub fn should_optimize(&self) -> Result<bool> {
        self.ensure_active()?;
        Ok(self.store.should_optimize())
    }

    pub fn optimize(&mut self) -> Result<OptimizationOutcome> {
        self.ensure_active()?;
        Ok(self.store.optimize())
    }

    pub fn optimized_context(&mut self) -> Result<OptimizationOutcome> {
        self.ensure_active()?;
        Ok(self.store.optimized_context())
    }

    /// Statistics stay readable while the session is inactive
    pub fn stats(&self) -> MemoryStats {
        self.store.stats()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.store.diagnostics()
    }
}

/// Shared handle to one session
pub type SessionHandle = Arc<Mutex<SessionMemory>>;

fn lock(handle: &SessionHandle) -> MutexGuard<'_, SessionMemory> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns one memory store per session id.
///
/// Only the id map is shared; each session sits behind its own lock so
/// distinct sessions never contend with each other.
pub struct SessionMemoryRegistry {
    sessions: DashMap<String, SessionHandle>,
    default_config: MemoryConfig,
    metrics: EngineMetrics,
}

impl SessionMemoryRegistry {
    pub fn new(default_config: MemoryConfig) -> Result<Self> {
        default_config.validate()?;
        let metrics = EngineMetrics::new().map_err(|e| ContextError::Internal(e.to_string()))?;
        Ok(Self {
            sessions: DashMap::new(),
            default_config,
            metrics,
        })
    }

    pub fn default_config(&self) -> &MemoryConfig {
        &self.default_config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Return the session's store, creating it with `config` if absent.
    ///
    /// An existing session keeps its current store; use
    /// [`switch_strategy`](Self::switch_strategy) to reconfigure it.
    pub fn get_or_create(&self, session_id: &str, config: MemoryConfig) -> Result<SessionHandle> {
        if let Some(handle) = self.get(session_id) {
            return Ok(handle);
        }

        let store = MemoryStore::new(config)?;
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                info!("Creating {} memory for session {}", store.kind(), session_id);
                let handle = Arc::new(Mutex::new(SessionMemory::new(session_id.to_string(), store)));
                entry.insert(Arc::clone(&handle));
                self.metrics.record_session_created();
                Ok(handle)
            }
        }
    }

    /// `get_or_create` with the registry's default configuration
    pub fn session(&self, session_id: &str) -> Result<SessionHandle> {
        self.get_or_create(session_id, self.default_config.clone())
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    fn existing(&self, session_id: &str) -> Result<SessionHandle> {
        self.get(session_id)
            .ok_or_else(|| ContextError::SessionNotFound(session_id.to_string()))
    }

    /// Ingest a message, creating the session on its first message
    pub fn add_message(&self, session_id: &str, message: Message) -> Result<()> {
        let handle = self.session(session_id)?;
        let mut session = lock(&handle);
        let before = session.diagnostics();
        session.add_message(message)?;
        self.metrics.record_message();
        self.record_diagnostics(before, session.diagnostics());
        Ok(())
    }

    pub fn get_context(&self, session_id: &str) -> Result<Vec<Message>> {
        let handle = self.existing(session_id)?;
        let session = lock(&handle);
        session.get_context()
    }

    /// Budget-fitted context for a generation request; stored state is kept
    pub fn optimized_context(&self, session_id: &str) -> Result<OptimizationOutcome> {
        let handle = self.existing(session_id)?;
        let mut session = lock(&handle);
        let before = session.diagnostics();
        let outcome = session.optimized_context()?;
        self.record_outcome(&outcome);
        self.record_diagnostics(before, session.diagnostics());
        Ok(outcome)
    }

    /// Reduce the session's stored state to fit its budget
    pub fn optimize(&self, session_id: &str) -> Result<OptimizationOutcome> {
        let handle = self.existing(session_id)?;
        let mut session = lock(&handle);
        let before = session.diagnostics();
        let outcome = session.optimize()?;
        self.record_outcome(&outcome);
        self.record_diagnostics(before, session.diagnostics());
        Ok(outcome)
    }

    pub fn stats(&self, session_id: &str) -> Result<MemoryStats> {
        let handle = self.existing(session_id)?;
        let session = lock(&handle);
        Ok(session.stats())
    }

    /// Reconfigure a session.
    ///
    /// A change of store type rebuilds the store from a snapshot of the current
    /// context so no message reachable before the switch is lost.
    pub fn switch_strategy(&self, session_id: &str, config: MemoryConfig) -> Result<()> {
        config.validate()?;
        let handle = self.existing(session_id)?;
        let mut session = lock(&handle);
        session.ensure_active()?;

        let from = session.kind();
        if from == config.strategy {
            debug!("Updating {} memory config for session {}", from, session_id);
            return session.store.set_config(config);
        }

        let snapshot = session.store.get_context();
        let carried = snapshot.len();
        let mut store = MemoryStore::new(config)?;
        store.restore_from(snapshot);
        self.record_diagnostics(Diagnostics::default(), store.diagnostics());
        store.carry_over_stats(&session.store.stats());

        info!(
            "Switched session {} from {} to {} memory ({} messages carried over)",
            session_id,
            from,
            store.kind(),
            carried
        );
        session.store = store;
        Ok(())
    }

    pub fn deactivate(&self, session_id: &str) -> Result<()> {
        self.set_active(session_id, false)
    }

    pub fn reactivate(&self, session_id: &str) -> Result<()> {
        self.set_active(session_id, true)
    }

    fn set_active(&self, session_id: &str, active: bool) -> Result<()> {
        let handle = self.existing(session_id)?;
        let mut session = lock(&handle);
        if session.active != active {
            info!(
                "Session {} {}",
                session_id,
                if active { "reactivated" } else { "deactivated" }
            );
            session.active = active;
        }
        Ok(())
    }

    pub fn is_active(&self, session_id: &str) -> Result<bool> {
        let handle = self.existing(session_id)?;
        let session = lock(&handle);
        Ok(session.is_active())
    }

    /// Clear a session's messages and counters, keeping its configuration
    pub fn reset(&self, session_id: &str) -> Result<()> {
        let handle = self.existing(session_id)?;
        let mut session = lock(&handle);
        session.store.clear();
        info!("Reset memory for session {}", session_id);
        Ok(())
    }

    /// Drop a session entirely; returns whether it existed
    pub fn remove(&self, session_id: &str) -> bool {
        if self.sessions.remove(session_id).is_some() {
            info!("Removed memory for session {}", session_id);
            self.metrics.record_session_removed();
            true
        } else {
            false
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Session ids in sorted order
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn record_outcome(&self, outcome: &OptimizationOutcome) {
        if outcome.applied {
            self.metrics
                .record_optimization(outcome.strategy.as_str(), outcome.tokens_saved());
        }
    }

    fn record_diagnostics(&self, before: Diagnostics, after: Diagnostics) {
        self.metrics.record_fallbacks(
            "optimization",
            after.optimization_fallbacks.saturating_sub(before.optimization_fallbacks),
        );
        self.metrics.record_fallbacks(
            "summarization",
            after.summarization_fallbacks.saturating_sub(before.summarization_fallbacks),
        );
        self.metrics.record_fallbacks(
            "extraction",
            after.extraction_failures.saturating_sub(before.extraction_failures),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizationConfig;
    use crate::memory::entities::MAX_EXTRACTION_CHARS;

    fn registry() -> SessionMemoryRegistry {
        SessionMemoryRegistry::new(MemoryConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_default_config() {
        let config = MemoryConfig {
            max_messages: 0,
            ..Default::default()
        };
        assert!(matches!(
            SessionMemoryRegistry::new(config),
            Err(ContextError::Configuration(_))
        ));
    }

    #[test]
    fn test_created_on_first_message() {
        let registry = registry();
        assert!(!registry.contains("s1"));
        assert!(matches!(
            registry.get_context("s1"),
            Err(ContextError::SessionNotFound(_))
        ));

        registry.add_message("s1", Message::user("hello", 0)).unwrap();
        assert!(registry.contains("s1"));
        assert_eq!(registry.get_context("s1").unwrap().len(), 1);
        assert_eq!(registry.metrics().messages_added(), 1);
        assert_eq!(registry.metrics().active_sessions(), 1);
    }

    #[test]
    fn test_get_or_create_returns_existing() {
        let registry = registry();
        let first = registry
            .get_or_create("s1", MemoryConfig::for_strategy(MemoryStrategyKind::Summary))
            .unwrap();
        let second = registry
            .get_or_create("s1", MemoryConfig::for_strategy(MemoryStrategyKind::Entity))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(lock(&second).kind(), MemoryStrategyKind::Summary);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_inactive_session_rejects_operations() {
        let registry = registry();
        registry.add_message("s1", Message::user("hello", 0)).unwrap();
        registry.deactivate("s1").unwrap();

        assert!(!registry.is_active("s1").unwrap());
        assert!(matches!(
            registry.add_message("s1", Message::user("again", 1)),
            Err(ContextError::InactiveSession(_))
        ));
        assert!(matches!(
            registry.get_context("s1"),
            Err(ContextError::InactiveSession(_))
        ));
        assert!(matches!(registry.optimize("s1"), Err(ContextError::InactiveSession(_))));
        // Stats remain readable
        assert_eq!(registry.stats("s1").unwrap().messages_added, 1);

        registry.reactivate("s1").unwrap();
        registry.add_message("s1", Message::user("again", 1)).unwrap();
        assert_eq!(registry.get_context("s1").unwrap().len(), 2);
    }

    #[test]
    fn test_switch_to_same_kind_updates_config() {
        let registry = registry();
        for i in 0..6 {
            registry.add_message("s1", Message::user(format!("m{}", i), i)).unwrap();
        }
        registry
            .switch_strategy(
                "s1",
                MemoryConfig {
                    max_messages: 3,
                    context_window_size: 1,
                    ..Default::default()
                },
            )
            .unwrap();

        let context = registry.get_context("s1").unwrap();
        assert_eq!(context.len(), 3);
        assert_eq!(context[0].content, "m3");
    }

    #[test]
    fn test_switch_counts_extraction_failures() {
        let registry = registry();
        registry
            .add_message("s1", Message::user("z".repeat(MAX_EXTRACTION_CHARS + 1), 0))
            .unwrap();
        registry.add_message("s1", Message::user("Call me Eve", 1)).unwrap();

        registry
            .switch_strategy("s1", MemoryConfig::for_strategy(MemoryStrategyKind::Entity))
            .unwrap();

        let stats = registry.stats("s1").unwrap();
        assert_eq!(stats.strategy, MemoryStrategyKind::Entity);
        assert_eq!(stats.diagnostics.extraction_failures, 1);
        assert_eq!(registry.metrics().fallbacks("extraction"), 1);
        // Entity message plus both originals
        assert_eq!(registry.get_context("s1").unwrap().len(), 3);
    }

    #[test]
    fn test_switch_keeps_counters() {
        let registry = registry();
        for i in 0..4 {
            registry.add_message("s1", Message::user(format!("m{}", i), i)).unwrap();
        }
        registry
            .switch_strategy("s1", MemoryConfig::for_strategy(MemoryStrategyKind::Entity))
            .unwrap();
        registry
            .switch_strategy("s1", MemoryConfig::for_strategy(MemoryStrategyKind::Buffer))
            .unwrap();

        let stats = registry.stats("s1").unwrap();
        assert_eq!(stats.strategy, MemoryStrategyKind::Buffer);
        assert_eq!(stats.messages_added, 4);
        assert_eq!(registry.metrics().messages_added(), 4);
    }

    #[test]
    fn test_reset_and_remove() {
        let registry = registry();
        registry.add_message("s1", Message::user("hello", 0)).unwrap();
        registry.add_message("s2", Message::user("hi", 0)).unwrap();

        registry.reset("s1").unwrap();
        assert!(registry.get_context("s1").unwrap().is_empty());
        assert_eq!(registry.stats("s1").unwrap().messages_added, 0);

        assert!(registry.remove("s1"));
        assert!(!registry.remove("s1"));
        assert_eq!(registry.session_ids(), vec!["s2".to_string()]);
        assert_eq!(registry.metrics().active_sessions(), 1);
    }

    #[test]
    fn test_optimize_records_metrics() {
        let registry = SessionMemoryRegistry::new(MemoryConfig {
            optimization: OptimizationConfig {
                max_tokens: 50,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        for i in 0..8 {
            registry
                .add_message("s1", Message::user(format!("{} {}", "w".repeat(36), i), i))
                .unwrap();
        }

        let outcome = registry.optimize("s1").unwrap();
        assert!(outcome.applied);
        assert_eq!(registry.metrics().optimizations(outcome.strategy.as_str()), 1);
        assert_eq!(registry.metrics().tokens_saved(), outcome.tokens_saved() as u64);
        assert!(registry.stats("s1").unwrap().token_count <= 50);
    }
}
