//! Data models for context management

use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a conversational message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversational exchange.
///
/// Messages are never mutated in place: optimized or summarized output is
/// built from clones and freshly constructed synthetic messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Ordinal position within the session
    pub position: usize,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, position: usize) -> Self {
        Self {
            role,
            content: content.into(),
            position,
        }
    }

    pub fn system(content: impl Into<String>, position: usize) -> Self {
        Self::new(Role::System, content, position)
    }

    pub fn user(content: impl Into<String>, position: usize) -> Self {
        Self::new(Role::User, content, position)
    }

    pub fn assistant(content: impl Into<String>, position: usize) -> Self {
        Self::new(Role::Assistant, content, position)
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// Message annotated with scoring data for ranking
#[derive(Debug, Clone)]
pub struct ScoredMessage {
    pub message: Message,
    /// Index in the list the message was scored from
    pub index: usize,
    /// Heuristic relevance (0.0-1.0)
    pub relevance_score: f32,
    pub token_count: usize,
    pub is_system: bool,
    pub is_recent: bool,
    /// Ranking-only score; never reported as relevance
    pub weighted_score: f32,
}

impl ScoredMessage {
    /// Ranking order: higher weighted score first, later message on exact ties
    pub fn ranking_cmp(a: &ScoredMessage, b: &ScoredMessage) -> std::cmp::Ordering {
        b.weighted_score
            .total_cmp(&a.weighted_score)
            .then_with(|| b.index.cmp(&a.index))
    }
}
