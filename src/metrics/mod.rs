//! Metrics collection for observability

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Engine metrics, scoped to one session registry
pub struct EngineMetrics {
    registry: Registry,

    // Message flow
    messages_added: IntCounter,

    // Optimization
    optimizations: IntCounterVec,
    tokens_saved: IntCounter,
    fallbacks: IntCounterVec,

    // Session lifecycle
    sessions_created: IntCounter,
    sessions_removed: IntCounter,
    active_sessions: IntGauge,
}

impl EngineMetrics {
    /// Create a metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let messages_added = register_int_counter_with_registry!(
            Opts::new("context_messages_added_total", "Total messages ingested by memory stores"),
            registry
        )?;

        let optimizations = register_int_counter_vec_with_registry!(
            Opts::new("context_optimizations_total", "Applied context optimizations"),
            &["strategy"],
            registry
        )?;

        let tokens_saved = register_int_counter_with_registry!(
            Opts::new("context_tokens_saved_total", "Estimated tokens removed by optimization"),
            registry
        )?;

        let fallbacks = register_int_counter_vec_with_registry!(
            Opts::new("context_fallbacks_total", "Fallback paths taken"),
            &["kind"],
            registry
        )?;

        let sessions_created = register_int_counter_with_registry!(
            Opts::new("context_sessions_created_total", "Sessions created"),
            registry
        )?;

        let sessions_removed = register_int_counter_with_registry!(
            Opts::new("context_sessions_removed_total", "Sessions removed"),
            registry
        )?;

        let active_sessions = register_int_gauge_with_registry!(
            Opts::new("context_active_sessions", "Sessions currently held by the registry"),
            registry
        )?;

        Ok(Self {
            registry,
            messages_added,
            optimizations,
            tokens_saved,
            fallbacks,
            sessions_created,
            sessions_removed,
            active_sessions,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_message(&self) {
        self.messages_added.inc();
    }

    /// Record one optimization pass
    pub fn record_optimization(&self, strategy: &str, tokens_saved: usize) {
        self.optimizations.with_label_values(&[strategy]).inc();
        self.tokens_saved.inc_by(tokens_saved as u64);
    }

    /// Record a fallback; `kind` is `optimization`, `summarization` or `extraction`
    pub fn record_fallbacks(&self, kind: &str, count: u64) {
        if count > 0 {
            self.fallbacks.with_label_values(&[kind]).inc_by(count);
        }
    }

    pub fn record_session_created(&self) {
        self.sessions_created.inc();
        self.active_sessions.inc();
    }

    pub fn record_session_removed(&self) {
        self.sessions_removed.inc();
        self.active_sessions.dec();
    }

    pub fn messages_added(&self) -> u64 {
        self.messages_added.get()
    }

    pub fn optimizations(&self, strategy: &str) -> u64 {
        self.optimizations.with_label_values(&[strategy]).get()
    }

    pub fn tokens_saved(&self) -> u64 {
        self.tokens_saved.get()
    }

    pub fn fallbacks(&self, kind: &str) -> u64 {
        self.fallbacks.with_label_values(&[kind]).get()
    }

    pub fn active_sessions(&self) -> i64 {
        self.active_sessions.get()
    }

    /// Export metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}
