//! Engine configuration
//!
//! Every record carries serde defaults so partial TOML files and environment
//! overrides deserialize cleanly. Validation runs eagerly: a record that
//! reaches a scorer, optimizer or store has already passed `validate()`.

use crate::error::{ContextError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request-time selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Recency,
    Relevance,
    Hybrid,
    Summarization,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Recency => "recency",
            StrategyKind::Relevance => "relevance",
            StrategyKind::Hybrid => "hybrid",
            StrategyKind::Summarization => "summarization",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Continuous per-session memory strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStrategyKind {
    Buffer,
    Summary,
    Entity,
}

impl MemoryStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryStrategyKind::Buffer => "buffer",
            MemoryStrategyKind::Summary => "summary",
            MemoryStrategyKind::Entity => "entity",
        }
    }
}

impl fmt::Display for MemoryStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token budget and scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Hard token budget for an optimized context
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Fraction of `max_tokens` at which summarization becomes eligible
    #[serde(default = "default_trigger_ratio")]
    pub summarization_trigger_ratio: f32,

    /// Newest non-system messages kept verbatim after summarization
    #[serde(default = "default_keep_after_summary")]
    pub messages_to_keep_after_summary: usize,

    /// Minimum relevance score for admission by the relevance strategy
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,

    #[serde(default = "default_true")]
    pub preserve_system_messages: bool,

    /// Inputs shorter than this are never optimized
    #[serde(default = "default_min_messages")]
    pub min_messages_for_optimization: usize,

    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Flat token overhead added per non-empty message
    #[serde(default = "default_message_overhead")]
    pub message_overhead_tokens: usize,

    /// Token multiplier applied to system messages
    #[serde(default = "default_system_weight")]
    pub system_message_weight: f32,

    /// Per-step decay applied by message age when ranking
    #[serde(default = "default_position_decay")]
    pub position_decay: f32,

    #[serde(default = "default_system_boost")]
    pub system_boost: f32,

    #[serde(default = "default_recency_boost")]
    pub recency_boost: f32,
}

fn default_max_tokens() -> usize {
    4000
}

fn default_trigger_ratio() -> f32 {
    0.8
}

fn default_keep_after_summary() -> usize {
    4
}

fn default_relevance_threshold() -> f32 {
    0.3
}

fn default_true() -> bool {
    true
}

fn default_min_messages() -> usize {
    3
}

fn default_chars_per_token() -> usize {
    4
}

fn default_message_overhead() -> usize {
    4
}

fn default_system_weight() -> f32 {
    1.2
}

fn default_position_decay() -> f32 {
    0.98
}

fn default_system_boost() -> f32 {
    1.5
}

fn default_recency_boost() -> f32 {
    1.3
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            summarization_trigger_ratio: default_trigger_ratio(),
            messages_to_keep_after_summary: default_keep_after_summary(),
            relevance_threshold: default_relevance_threshold(),
            preserve_system_messages: true,
            min_messages_for_optimization: default_min_messages(),
            chars_per_token: default_chars_per_token(),
            message_overhead_tokens: default_message_overhead(),
            system_message_weight: default_system_weight(),
            position_decay: default_position_decay(),
            system_boost: default_system_boost(),
            recency_boost: default_recency_boost(),
        }
    }
}

impl OptimizationConfig {
    /// Validate thresholds, ratios and weights
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens must be greater than 0"));
        }
        if self.chars_per_token == 0 {
            return Err(invalid("chars_per_token must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(invalid(format!(
                "relevance_threshold must be within [0, 1], got {}",
                self.relevance_threshold
            )));
        }
        if !(self.summarization_trigger_ratio > 0.0 && self.summarization_trigger_ratio <= 1.0) {
            return Err(invalid(format!(
                "summarization_trigger_ratio must be within (0, 1], got {}",
                self.summarization_trigger_ratio
            )));
        }
        if !(self.position_decay > 0.0 && self.position_decay <= 1.0) {
            return Err(invalid(format!(
                "position_decay must be within (0, 1], got {}",
                self.position_decay
            )));
        }
        for (name, value) in [
            ("system_message_weight", self.system_message_weight),
            ("system_boost", self.system_boost),
            ("recency_boost", self.recency_boost),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(format!("{} must be positive, got {}", name, value)));
            }
        }
        Ok(())
    }

    /// Budget at which summarization becomes eligible
    pub fn summarization_trigger_tokens(&self) -> f32 {
        self.max_tokens as f32 * self.summarization_trigger_ratio
    }
}

/// Per-session memory configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_strategy")]
    pub strategy: MemoryStrategyKind,

    /// Strategy used for request-time and manual optimization
    #[serde(default = "default_optimization_strategy")]
    pub optimization_strategy: StrategyKind,

    /// Capacity of the non-system message window
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Entries left verbatim after the summary store compresses
    #[serde(default = "default_context_window")]
    pub context_window_size: usize,

    /// Summaries retained before they are consolidated into one
    #[serde(default = "default_max_summaries")]
    pub max_summaries: usize,

    #[serde(default)]
    pub optimization: OptimizationConfig,
}

fn default_memory_strategy() -> MemoryStrategyKind {
    MemoryStrategyKind::Buffer
}

fn default_optimization_strategy() -> StrategyKind {
    StrategyKind::Hybrid
}

fn default_max_messages() -> usize {
    20
}

fn default_context_window() -> usize {
    10
}

fn default_max_summaries() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            strategy: default_memory_strategy(),
            optimization_strategy: default_optimization_strategy(),
            max_messages: default_max_messages(),
            context_window_size: default_context_window(),
            max_summaries: default_max_summaries(),
            optimization: OptimizationConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Default configuration for a given memory strategy
    pub fn for_strategy(strategy: MemoryStrategyKind) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_for(self.strategy)
    }

    /// Validate as the configuration of a `kind` store.
    ///
    /// `context_window_size` only constrains the summary store, which needs
    /// room to compress below capacity.
    pub fn validate_for(&self, kind: MemoryStrategyKind) -> Result<()> {
        self.optimization.validate()?;
        if self.max_messages == 0 {
            return Err(invalid("max_messages must be greater than 0"));
        }
        if kind == MemoryStrategyKind::Summary && self.context_window_size >= self.max_messages {
            return Err(invalid(format!(
                "context_window_size ({}) must be smaller than max_messages ({})",
                self.context_window_size, self.max_messages
            )));
        }
        if self.max_summaries == 0 {
            return Err(invalid("max_summaries must be greater than 0"));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Top-level engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineSettings {
    /// Environment variable prefix, e.g. `CONTEXT_ENGINE__MEMORY__MAX_MESSAGES`
    pub const ENV_PREFIX: &'static str = "CONTEXT_ENGINE";

    /// Load settings from an optional TOML file layered under environment variables
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path).required(false));
        }
        let settings: EngineSettings = builder
            .add_source(
                ::config::Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: EngineSettings = ::config::Config::builder()
            .add_source(::config::File::from_str(source, ::config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.memory.validate()
    }
}

fn invalid(message: impl Into<String>) -> ContextError {
    ContextError::Configuration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(OptimizationConfig::default().validate().is_ok());
        assert!(MemoryConfig::default().validate().is_ok());
        assert!(EngineSettings::default().validate().is_ok());
    }

    #[test]
    fn test_relevance_threshold_out_of_range() {
        let config = OptimizationConfig {
            relevance_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ContextError::Configuration(_))));

        let config = OptimizationConfig {
            relevance_threshold: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trigger_ratio_bounds() {
        let zero = OptimizationConfig {
            summarization_trigger_ratio: 0.0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let one = OptimizationConfig {
            summarization_trigger_ratio: 1.0,
            ..Default::default()
        };
        assert!(one.validate().is_ok());
    }

    #[test]
    fn test_zero_chars_per_token_rejected() {
        let config = OptimizationConfig {
            chars_per_token: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_context_window_must_leave_room() {
        let config = MemoryConfig {
            strategy: MemoryStrategyKind::Summary,
            max_messages: 5,
            context_window_size: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(config.validate_for(MemoryStrategyKind::Buffer).is_ok());
    }

    #[test]
    fn test_small_buffer_accepts_default_window() {
        for kind in [MemoryStrategyKind::Buffer, MemoryStrategyKind::Entity] {
            let config = MemoryConfig {
                strategy: kind,
                max_messages: 3,
                ..Default::default()
            };
            assert!(config.validate().is_ok());
            assert!(config.validate_for(MemoryStrategyKind::Summary).is_err());
        }
    }

    #[test]
    fn test_from_toml_str() {
        let settings = EngineSettings::from_toml_str(
            r#"
            [memory]
            strategy = "summary"
            optimization_strategy = "relevance"
            max_messages = 12

            [memory.optimization]
            max_tokens = 2000
            relevance_threshold = 0.4

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(settings.memory.strategy, MemoryStrategyKind::Summary);
        assert_eq!(settings.memory.optimization_strategy, StrategyKind::Relevance);
        assert_eq!(settings.memory.max_messages, 12);
        assert_eq!(settings.memory.context_window_size, 10);
        assert_eq!(settings.memory.optimization.max_tokens, 2000);
        assert_eq!(settings.memory.optimization.chars_per_token, 4);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn test_from_toml_str_rejects_invalid() {
        let result = EngineSettings::from_toml_str(
            r#"
            [memory.optimization]
            relevance_threshold = 2.0
            "#,
        );
        assert!(matches!(result, Err(ContextError::Configuration(_))));
    }
}
