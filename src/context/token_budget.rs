//! Running token budget for greedy selection
//!
//! Strategies reserve tokens message by message. Reservations never exceed
//! `max_total` except through `force_reserve`, which is reserved for messages
//! that must be kept regardless (preserved system messages).

use serde::{Deserialize, Serialize};

/// Token budget tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudget {
    max_total: usize,
    used: usize,
}

impl TokenBudget {
    pub fn new(max_total: usize) -> Self {
        Self { max_total, used: 0 }
    }

    /// Check if `tokens` more would still fit
    pub fn fits(&self, tokens: usize) -> bool {
        self.used + tokens <= self.max_total
    }

    /// Reserve tokens if they fit; returns whether the reservation succeeded
    pub fn try_reserve(&mut self, tokens: usize) -> bool {
        if self.fits(tokens) {
            self.used += tokens;
            true
        } else {
            false
        }
    }

    /// Reserve tokens unconditionally, possibly overrunning the budget
    pub fn force_reserve(&mut self, tokens: usize) {
        self.used += tokens;
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.max_total.saturating_sub(self.used)
    }

    pub fn max_total(&self) -> usize {
        self.max_total
    }

    pub fn is_exceeded(&self) -> bool {
        self.used > self.max_total
    }
}
