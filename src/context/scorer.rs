//! Heuristic relevance scoring and keyword extraction
//!
//! Relevance is built from additive, individually capped terms:
//! - base score (0.1)
//! - keyword overlap with the current focus (≤ 0.4)
//! - content quality signals (≤ 0.3)
//! - conversational patterns (≤ 0.2)
//! - a small role-specific bonus
//!
//! System messages short-circuit to a fixed high score.

use super::models::{Message, Role, ScoredMessage};
use super::token_estimator::TokenEstimator;
use crate::config::OptimizationConfig;
use indexmap::IndexMap;
use moka::sync::Cache;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Relevance assigned to every system message
pub const SYSTEM_RELEVANCE: f32 = 0.95;

/// Keywords returned by `extract_keywords`
pub const MAX_KEYWORDS: usize = 20;

const BASE_SCORE: f32 = 0.1;
const KEYWORD_CAP: f32 = 0.4;
const QUALITY_CAP: f32 = 0.3;
const PATTERN_CAP: f32 = 0.2;

const PARTIAL_MATCH_WEIGHT: f32 = 0.7;
const STEM_MATCH_WEIGHT: f32 = 0.5;

const LENGTH_BONUS_MAX: f32 = 0.1;
const LENGTH_BONUS_CHARS: f32 = 1000.0;
const CODE_BONUS: f32 = 0.1;
const LIST_BONUS: f32 = 0.05;
const URL_BONUS: f32 = 0.05;
const MATH_BONUS: f32 = 0.05;

const MARKER_STEP: f32 = 0.03;
const QUESTION_CAP: f32 = 0.06;
const EXPLANATION_CAP: f32 = 0.06;
const PROBLEM_CAP: f32 = 0.05;
const DECISION_CAP: f32 = 0.05;

const USER_QUESTION_BONUS: f32 = 0.1;
const ASSISTANT_EXPLANATION_BONUS: f32 = 0.05;

const KEYWORD_CACHE_CAPACITY: u64 = 512;

static CODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)(```|`[^`\n]+`|\b(?:fn|def|class|function|impl|struct|import|return)\s+\w+|\w+\([^)]*\)\s*[{;]|=>|::)",
    )
    .expect("Invalid regex")
});

static LIST_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+\S").expect("Invalid regex"));

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").expect("Invalid regex"));

static MATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+(?:\.\d+)?\s*[-+*/^=<>]\s*\d+|[∑∫√π≈≠≤≥∞]").expect("Invalid regex")
});

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "him", "his", "how", "its", "may", "new", "now", "old",
    "see", "two", "way", "who", "did", "get", "got", "let", "say", "she", "too", "use", "that",
    "this", "with", "from", "they", "will", "would", "there", "their", "what", "about", "which",
    "when", "make", "like", "time", "just", "know", "take", "into", "your", "some", "could",
    "them", "than", "then", "been", "were", "also", "does", "should", "these", "those", "here",
    "where", "why", "being", "because", "each", "very", "much", "more", "most", "other", "such",
    "only", "over", "after", "before", "while", "want", "need", "thanks", "thank", "please",
    "yes", "okay", "sure", "really", "well", "even", "still", "same", "both", "between",
];

const QUESTION_MARKERS: &[&str] = &[
    "what", "how", "why", "when", "where", "which", "who", "could", "would", "can",
];

const EXPLANATION_MARKERS: &[&str] = &[
    "because", "therefore", "since", "means", "explain", "explains", "reason", "thus", "hence",
    "example",
];

const PROBLEM_MARKERS: &[&str] = &[
    "error", "errors", "bug", "bugs", "issue", "issues", "problem", "problems", "fail", "fails",
    "failed", "failing", "crash", "crashes", "broken", "exception", "wrong",
];

const DECISION_MARKERS: &[&str] = &[
    "decide", "decided", "decision", "choose", "chose", "chosen", "agreed", "agree", "plan",
    "should", "going",
];

const CAUSAL_MARKERS: &[&str] = &["because", "since", "therefore", "reason", "means", "thus"];

const INTERROGATIVES: &[&str] = &[
    "what", "how", "why", "when", "where", "which", "who", "is", "are", "can", "could", "does",
    "do", "should", "would",
];

const STEM_SUFFIXES: &[&str] = &["ing", "ed", "es", "ly", "ment", "tion", "s"];

/// Individual score terms, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base: f32,
    pub keyword: f32,
    pub quality: f32,
    pub pattern: f32,
    pub role_bonus: f32,
    pub total: f32,
}

/// Relevance scorer with a content-hash keyword cache
pub struct MessageScorer {
    config: OptimizationConfig,
    estimator: TokenEstimator,
    keyword_cache: Cache<String, Arc<Vec<String>>>,
}

impl MessageScorer {
    pub fn new(config: OptimizationConfig) -> Self {
        let estimator = TokenEstimator::new(&config);
        Self {
            config,
            estimator,
            keyword_cache: build_cache(),
        }
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Replace the configuration; cached keyword sets are discarded
    pub fn set_config(&mut self, config: OptimizationConfig) {
        self.estimator = TokenEstimator::new(&config);
        self.config = config;
        self.keyword_cache = build_cache();
        debug!("Scorer configuration replaced, keyword cache invalidated");
    }

    /// Relevance of a message to the given focus keywords (0.0-1.0)
    pub fn score(&self, message: &Message, context_keywords: &[String]) -> f32 {
        self.score_breakdown(message, context_keywords).total
    }

    pub fn score_breakdown(&self, message: &Message, context_keywords: &[String]) -> ScoreBreakdown {
        if message.is_system() {
            return ScoreBreakdown {
                base: SYSTEM_RELEVANCE,
                keyword: 0.0,
                quality: 0.0,
                pattern: 0.0,
                role_bonus: 0.0,
                total: SYSTEM_RELEVANCE,
            };
        }

        let lower = message.content.to_lowercase();
        let words = tokenize(&lower);

        let keyword = keyword_term(&lower, &words, context_keywords);
        let quality = quality_term(&message.content);
        let pattern = pattern_term(&message.content, &words);
        let role_bonus = role_bonus(message.role, &message.content, &words);

        let total = (BASE_SCORE + keyword + quality + pattern + role_bonus).clamp(0.0, 1.0);

        ScoreBreakdown {
            base: BASE_SCORE,
            keyword,
            quality,
            pattern,
            role_bonus,
            total,
        }
    }

    /// Score every message, marking the trailing `recent_window` as recent
    pub fn score_messages(
        &self,
        messages: &[Message],
        context_keywords: &[String],
        recent_window: usize,
    ) -> Vec<ScoredMessage> {
        let len = messages.len();
        let recent_start = len.saturating_sub(recent_window);

        messages
            .iter()
            .enumerate()
            .map(|(index, message)| {
                let relevance_score = self.score(message, context_keywords);
                let is_system = message.is_system();
                let is_recent = index >= recent_start;
                let age = (len - 1 - index) as i32;

                let mut weighted_score = relevance_score * self.config.position_decay.powi(age);
                if is_system {
                    weighted_score *= self.config.system_boost;
                }
                if is_recent {
                    weighted_score *= self.config.recency_boost;
                }

                ScoredMessage {
                    message: message.clone(),
                    index,
                    relevance_score,
                    token_count: self.estimator.estimate(message),
                    is_system,
                    is_recent,
                    weighted_score,
                }
            })
            .collect()
    }

    /// Most frequent content words across `messages`, cached by content hash
    pub fn extract_keywords(&self, messages: &[Message]) -> Vec<String> {
        let key = content_hash(messages);
        if let Some(cached) = self.keyword_cache.get(&key) {
            return cached.as_ref().clone();
        }

        let keywords = extract_keywords(messages, MAX_KEYWORDS);
        self.keyword_cache.insert(key, Arc::new(keywords.clone()));
        keywords
    }

    /// Number of cached keyword sets
    pub fn cached_keyword_sets(&self) -> u64 {
        self.keyword_cache.run_pending_tasks();
        self.keyword_cache.entry_count()
    }
}

fn build_cache() -> Cache<String, Arc<Vec<String>>> {
    Cache::builder().max_capacity(KEYWORD_CACHE_CAPACITY).build()
}

fn content_hash(messages: &[Message]) -> String {
    let mut hasher = Sha256::new();
    for message in messages {
        hasher.update(message.role.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(message.content.as_bytes());
        hasher.update(b"\x1e");
    }
    hex::encode(hasher.finalize())
}

/// Whether content contains code-like fragments
pub(crate) fn looks_like_code(content: &str) -> bool {
    CODE_PATTERN.is_match(content)
}

/// Split lowercased text into word tokens
pub(crate) fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect()
}

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Up to `limit` most frequent content words; ties keep first-seen order
pub fn extract_keywords(messages: &[Message], limit: usize) -> Vec<String> {
    let mut counts: IndexMap<String, usize> = IndexMap::new();

    for message in messages {
        let lower = message.content.to_lowercase();
        for word in tokenize(&lower) {
            if word.chars().count() <= 2
                || is_stop_word(word)
                || word.chars().all(|c| c.is_ascii_digit())
            {
                continue;
            }
            *counts.entry(word.to_string()).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().take(limit).map(|(word, _)| word).collect()
}

fn stem(word: &str) -> &str {
    for suffix in STEM_SUFFIXES {
        if let Some(root) = word.strip_suffix(suffix) {
            if root.len() >= 3 {
                return root;
            }
        }
    }
    word
}

fn keyword_term(lower: &str, words: &[&str], keywords: &[String]) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }

    let mut matched = 0.0;
    for keyword in keywords {
        let keyword = keyword.to_lowercase();
        if words.iter().any(|w| *w == keyword) {
            matched += 1.0;
        } else if lower.contains(&keyword) {
            matched += PARTIAL_MATCH_WEIGHT;
        } else {
            let root = stem(&keyword);
            if root.len() >= 3 && words.iter().any(|w| stem(w) == root) {
                matched += STEM_MATCH_WEIGHT;
            }
        }
    }

    (matched / keywords.len() as f32 * KEYWORD_CAP).min(KEYWORD_CAP)
}

fn quality_term(content: &str) -> f32 {
    let chars = content.chars().count() as f32;
    let mut quality = (chars / LENGTH_BONUS_CHARS).min(1.0) * LENGTH_BONUS_MAX;

    if looks_like_code(content) {
        quality += CODE_BONUS;
    }
    if LIST_PATTERN.is_match(content) {
        quality += LIST_BONUS;
    }
    if URL_PATTERN.is_match(content) {
        quality += URL_BONUS;
    }
    if MATH_PATTERN.is_match(content) {
        quality += MATH_BONUS;
    }

    quality.min(QUALITY_CAP)
}

fn count_markers(words: &[&str], markers: &[&str]) -> usize {
    words.iter().filter(|w| markers.contains(w)).count()
}

fn pattern_term(content: &str, words: &[&str]) -> f32 {
    let questions = content.matches('?').count() + count_markers(words, QUESTION_MARKERS);
    let explanations = count_markers(words, EXPLANATION_MARKERS);
    let problems = count_markers(words, PROBLEM_MARKERS);
    let decisions = count_markers(words, DECISION_MARKERS);

    let pattern = (questions as f32 * MARKER_STEP).min(QUESTION_CAP)
        + (explanations as f32 * MARKER_STEP).min(EXPLANATION_CAP)
        + (problems as f32 * MARKER_STEP).min(PROBLEM_CAP)
        + (decisions as f32 * MARKER_STEP).min(DECISION_CAP);

    pattern.min(PATTERN_CAP)
}

fn role_bonus(role: Role, content: &str, words: &[&str]) -> f32 {
    match role {
        Role::User => {
            let interrogative = content.contains('?')
                || words.first().map_or(false, |w| INTERROGATIVES.contains(w));
            if interrogative {
                USER_QUESTION_BONUS
            } else {
                0.0
            }
        }
        Role::Assistant => {
            let unique: HashSet<&str> = words.iter().copied().collect();
            if CAUSAL_MARKERS.iter().any(|m| unique.contains(m)) {
                ASSISTANT_EXPLANATION_BONUS
            } else {
                0.0
            }
        }
        Role::System => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> MessageScorer {
        MessageScorer::new(OptimizationConfig::default())
    }

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_system_short_circuit() {
        let score = scorer().score(&Message::system("Be concise.", 0), &[]);
        assert!(score >= 0.9);
        assert_eq!(score, SYSTEM_RELEVANCE);
    }

    #[test]
    fn test_plain_message_base_score() {
        let score = scorer().score(&Message::assistant("ok", 1), &[]);
        assert!((score - BASE_SCORE).abs() < 1e-3);
    }

    #[test]
    fn test_score_in_unit_range() {
        let content = "Why does this fail? ```fn main() { panic!() }``` because of an error.\n\
                       - see https://doc.rust-lang.org\n- 2 + 2 = 4"
            .repeat(20);
        let score = scorer().score(
            &Message::user(content, 1),
            &keywords(&["fail", "error", "main"]),
        );
        assert!(score > 0.5);
        assert!(score <= 1.0);
    }

    #[test]
    fn test_keyword_match_grades() {
        let kws = keywords(&["parser"]);
        let exact = keyword_term("the parser broke", &tokenize("the parser broke"), &kws);
        let partial = keyword_term("the subparsers", &tokenize("the subparsers"), &kws);
        let none = keyword_term("nothing here", &tokenize("nothing here"), &kws);

        assert!((exact - KEYWORD_CAP).abs() < 1e-6);
        assert!((partial - KEYWORD_CAP * PARTIAL_MATCH_WEIGHT).abs() < 1e-6);
        assert_eq!(none, 0.0);

        let kws = keywords(&["testing"]);
        let stemmed = keyword_term("we tested it", &tokenize("we tested it"), &kws);
        assert!((stemmed - KEYWORD_CAP * STEM_MATCH_WEIGHT).abs() < 1e-6);
    }

    #[test]
    fn test_keywords_raise_score() {
        let s = scorer();
        let message = Message::assistant("The borrow checker rejects this lifetime", 1);
        let without = s.score(&message, &[]);
        let with = s.score(&message, &keywords(&["borrow", "lifetime"]));
        assert!(with > without);
    }

    #[test]
    fn test_user_question_bonus() {
        let breakdown = scorer().score_breakdown(&Message::user("How do I sort a vec?", 1), &[]);
        assert_eq!(breakdown.role_bonus, USER_QUESTION_BONUS);
        assert!(breakdown.pattern > 0.0);
    }

    #[test]
    fn test_quality_signals() {
        assert!(quality_term("use `Vec::new()` here") >= CODE_BONUS);
        assert!(quality_term("- one\n- two") >= LIST_BONUS);
        assert!(quality_term("see https://example.com") >= URL_BONUS);
        assert!(quality_term("3 * 4 = 12") >= MATH_BONUS);
        assert!(quality_term(&"x".repeat(5000)) <= QUALITY_CAP);
    }

    #[test]
    fn test_extract_keywords_frequency_and_ties() {
        let messages = vec![
            Message::user("Rust ownership and borrowing in Rust", 0),
            Message::assistant("Ownership rules: rust moves values, borrowing lends them", 1),
        ];
        let kws = extract_keywords(&messages, MAX_KEYWORDS);
        assert_eq!(kws[0], "rust");
        assert_eq!(kws[1], "ownership");
        assert_eq!(kws[2], "borrowing");
        assert!(!kws.contains(&"and".to_string()));
        assert!(!kws.contains(&"in".to_string()));
    }

    #[test]
    fn test_extract_keywords_limit() {
        let content: Vec<String> = (0..40).map(|i| format!("word{}", i)).collect();
        let messages = vec![Message::user(content.join(" "), 0)];
        assert_eq!(extract_keywords(&messages, MAX_KEYWORDS).len(), MAX_KEYWORDS);
    }

    #[test]
    fn test_keyword_cache_invalidated_on_config_change() {
        let mut s = scorer();
        let messages = vec![Message::user("tokio runtime spawning tasks", 0)];

        let first = s.extract_keywords(&messages);
        let second = s.extract_keywords(&messages);
        assert_eq!(first, second);
        assert_eq!(s.cached_keyword_sets(), 1);

        s.set_config(OptimizationConfig {
            max_tokens: 100,
            ..Default::default()
        });
        assert_eq!(s.cached_keyword_sets(), 0);
        assert_eq!(s.config().max_tokens, 100);
    }

    #[test]
    fn test_weighted_score_recency_and_ties() {
        let s = scorer();
        let messages = vec![
            Message::user("same", 0),
            Message::user("same", 1),
            Message::user("same", 2),
        ];
        let scored = s.score_messages(&messages, &[], 1);

        assert!(!scored[0].is_recent);
        assert!(scored[2].is_recent);
        assert!(scored[2].weighted_score > scored[1].weighted_score);
        assert!(scored[1].weighted_score > scored[0].weighted_score);
        // Ranking never leaks into relevance
        assert_eq!(scored[0].relevance_score, scored[2].relevance_score);
    }
}
