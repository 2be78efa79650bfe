//! Rule-based entity extraction
//!
//! Extracts names, dates, preferences, facts, topics and locations from
//! message content with fixed regular expressions and a topic vocabulary.

use crate::context::scorer::tokenize;
use crate::context::{Message, Role};
use crate::error::{ContextError, Result};
use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Content longer than this is not scanned
pub const MAX_EXTRACTION_CHARS: usize = 20_000;

/// Longest preference or fact phrase kept
const MAX_PHRASE_CHARS: usize = 80;

/// Prefix marking the synthetic entity-context message
pub const ENTITY_CONTEXT_PREFIX: &str = "[Known context]";

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[Mm]y name is|[Cc]all me|I'm|I am|[Tt]his is)\s+([A-Z][a-zA-Z'-]+)")
        .expect("Invalid regex")
});

static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4}|(?:january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\.?\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?|today|tomorrow|yesterday|next (?:week|month|year)|(?:mon|tues|wednes|thurs|fri|satur|sun)day)\b",
    )
    .expect("Invalid regex")
});

static PREFERENCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bI\s+(?:really\s+)?(like|love|prefer|enjoy|hate|dislike)\s+([^.,;!?\n]+)")
        .expect("Invalid regex")
});

static FACT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bI\s+((?:work|live|study|own|use|manage|built|maintain)\b[^.;!?\n]*)")
        .expect("Invalid regex")
});

static LOCATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:[Ll]ive in|[Ll]iving in|[Bb]ased in|[Ll]ocated in|[Mm]oved to|[Aa]m from|[Cc]ome from|[Vv]isiting|[Tt]rip to)\s+([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)?)",
    )
    .expect("Invalid regex")
});

const TOPICS: &[&str] = &[
    "python", "rust", "javascript", "typescript", "java", "kotlin", "swift", "golang", "ruby",
    "php", "sql", "database", "databases", "docker", "kubernetes", "api", "react", "linux",
    "aws", "cloud", "security", "testing", "devops", "ai", "ml", "music", "travel", "cooking",
    "fitness", "finance", "photography", "gaming", "design", "marketing", "startup",
];

const TOPIC_PHRASES: &[&str] = &[
    "machine learning",
    "deep learning",
    "data science",
    "web development",
    "mobile development",
];

/// Entities accumulated for a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySet {
    pub names: IndexSet<String>,
    pub dates: IndexSet<String>,
    pub preferences: IndexSet<String>,
    pub facts: IndexSet<String>,
    pub topics: IndexSet<String>,
    pub locations: IndexSet<String>,
}

impl EntitySet {
    pub fn len(&self) -> usize {
        self.names.len()
            + self.dates.len()
            + self.preferences.len()
            + self.facts.len()
            + self.topics.len()
            + self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge `other` in; returns how many entities were new
    pub fn merge(&mut self, other: EntitySet) -> usize {
        let before = self.len();
        self.names.extend(other.names);
        self.dates.extend(other.dates);
        self.preferences.extend(other.preferences);
        self.facts.extend(other.facts);
        self.topics.extend(other.topics);
        self.locations.extend(other.locations);
        self.len() - before
    }

    /// Enough is known to be worth a context message
    pub fn is_notable(&self) -> bool {
        !self.names.is_empty()
            || !self.preferences.is_empty()
            || !self.facts.is_empty()
            || self.topics.len() > 2
    }

    /// Render as a synthetic assistant message, if notable.
    ///
    /// The message is derived state: it is not pinned like a system message
    /// and the entity store never stores it back.
    pub fn to_context_message(&self, position: usize) -> Option<Message> {
        if !self.is_notable() {
            return None;
        }

        let sections = [
            ("Name", &self.names),
            ("Preferences", &self.preferences),
            ("Facts", &self.facts),
            ("Topics", &self.topics),
            ("Locations", &self.locations),
            ("Dates", &self.dates),
        ];

        let mut content = ENTITY_CONTEXT_PREFIX.to_string();
        for (label, values) in sections {
            if values.is_empty() {
                continue;
            }
            let joined: Vec<&str> = values.iter().map(String::as_str).collect();
            content.push_str(&format!(" {}: {}.", label, joined.join(", ")));
        }

        Some(Message::new(Role::Assistant, content, position))
    }
}

/// Whether `message` is a rendered entity-context message
pub fn is_entity_context(message: &Message) -> bool {
    message.role == Role::Assistant && message.content.starts_with(ENTITY_CONTEXT_PREFIX)
}

fn phrase(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_PHRASE_CHARS).collect())
}

/// Extract entities from one piece of content
pub fn extract_entities(content: &str) -> Result<EntitySet> {
    let chars = content.chars().count();
    if chars > MAX_EXTRACTION_CHARS {
        return Err(ContextError::Extraction(format!(
            "content of {} chars exceeds the {} char limit",
            chars, MAX_EXTRACTION_CHARS
        )));
    }

    let mut entities = EntitySet::default();

    for caps in NAME_PATTERN.captures_iter(content) {
        entities.names.insert(caps[1].to_string());
    }

    for caps in DATE_PATTERN.captures_iter(content) {
        entities.dates.insert(caps[1].to_lowercase());
    }

    for caps in PREFERENCE_PATTERN.captures_iter(content) {
        if let Some(object) = phrase(&caps[2]) {
            entities
                .preferences
                .insert(format!("{} {}", caps[1].to_lowercase(), object));
        }
    }

    for caps in FACT_PATTERN.captures_iter(content) {
        if let Some(fact) = phrase(&caps[1]) {
            entities.facts.insert(fact);
        }
    }

    for caps in LOCATION_PATTERN.captures_iter(content) {
        entities.locations.insert(caps[1].to_string());
    }

    let lower = content.to_lowercase();
    for word in tokenize(&lower) {
        if TOPICS.contains(&word) {
            entities.topics.insert(word.to_string());
        }
    }
    for topic in TOPIC_PHRASES {
        if lower.contains(topic) {
            entities.topics.insert(topic.to_string());
        }
    }

    Ok(entities)
}
