//! Context management with token budget enforcement
//!
//! This module turns an unbounded conversation into a window that fits a
//! caller-supplied token budget: estimation, relevance scoring, digest
//! summarization and the request-time selection strategies.

pub mod models;
pub mod token_estimator;
pub mod token_budget;
pub mod scorer;
pub mod summarizer;
pub mod optimizer;
mod strategies;

pub use models::{Message, Role, ScoredMessage};
pub use token_estimator::{MessageTokens, TokenBreakdown, TokenEstimator};
pub use token_budget::TokenBudget;
pub use scorer::{extract_keywords, MessageScorer, ScoreBreakdown, SYSTEM_RELEVANCE};
pub use summarizer::{Digest, SummaryOutcome, Summarizer, SUMMARY_PREFIX};
pub use optimizer::{ContextOptimizer, OptimizationOutcome};
