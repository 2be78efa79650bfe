//! Selection strategies for `ContextOptimizer`
//!
//! Every strategy keeps preserved system messages unconditionally, reserves
//! tokens through a `TokenBudget`, and returns its selection in the original
//! relative order.

use super::models::{Message, ScoredMessage};
use super::optimizer::{ContextOptimizer, Selection};
use super::token_budget::TokenBudget;
use tracing::debug;

/// Largest run of unselected messages the relevance gap-fill will bridge
const MAX_GAP: usize = 2;

impl ContextOptimizer {
    /// Keep system messages, then walk newest to oldest until the budget is hit
    pub(crate) fn select_recency(&self, messages: &[Message]) -> Selection {
        let (mut selected, mut budget) = self.reserve_preserved(messages);

        for index in (0..messages.len()).rev() {
            if selected[index] {
                continue;
            }
            if !budget.try_reserve(self.cost(&messages[index])) {
                break;
            }
            selected[index] = true;
        }

        Selection::new(collect_selected(messages, &selected))
    }

    /// Threshold admission by relevance, then fill by recency, then bridge
    /// small gaps between selected messages
    pub(crate) fn select_relevance(&self, messages: &[Message]) -> Selection {
        let (mut selected, mut budget) = self.reserve_preserved(messages);
        let keywords = self.focus_keywords(messages);
        let scored = self.scorer.score_messages(
            messages,
            &keywords,
            self.config.messages_to_keep_after_summary,
        );

        let mut relevant: Vec<&ScoredMessage> = scored
            .iter()
            .filter(|s| !selected[s.index])
            .filter(|s| s.relevance_score >= self.config.relevance_threshold)
            .collect();
        relevant.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then_with(|| b.index.cmp(&a.index))
        });

        let mut admitted = 0;
        for candidate in relevant {
            if budget.try_reserve(self.cost(&candidate.message)) {
                selected[candidate.index] = true;
                admitted += 1;
            }
        }

        let mut filled = 0;
        for index in (0..messages.len()).rev() {
            if !selected[index] && budget.try_reserve(self.cost(&messages[index])) {
                selected[index] = true;
                filled += 1;
            }
        }

        let bridged = self.fill_gaps(messages, &mut selected, &mut budget);

        debug!(
            "Relevance selection: {} admitted, {} filled by recency, {} bridged",
            admitted, filled, bridged
        );

        Selection::new(collect_selected(messages, &selected))
    }

    /// Summarize when worthwhile, otherwise rank by weighted score
    pub(crate) fn select_hybrid(&self, messages: &[Message]) -> Selection {
        if self.summarizer.should_summarize(messages) {
            debug!("Hybrid strategy delegating to summarization");
            return self.select_summarization(messages);
        }

        let (mut selected, mut budget) = self.reserve_preserved(messages);
        let keywords = self.focus_keywords(messages);
        let mut scored = self.scorer.score_messages(
            messages,
            &keywords,
            self.config.messages_to_keep_after_summary,
        );
        scored.sort_by(ScoredMessage::ranking_cmp);

        for candidate in &scored {
            if selected[candidate.index] {
                continue;
            }
            if budget.try_reserve(candidate.token_count) {
                selected[candidate.index] = true;
            }
        }

        Selection::new(collect_selected(messages, &selected))
    }

    /// Digest older turns; truncate by recency if the digest still overflows
    pub(crate) fn select_summarization(&self, messages: &[Message]) -> Selection {
        let outcome = self.summarizer.summarize(messages);

        let summarized = if self.estimate_tokens(&outcome.messages) > self.config.max_tokens {
            debug!("Summarized context still over budget, truncating by recency");
            self.select_recency(&outcome.messages).messages
        } else {
            outcome.messages
        };

        Selection {
            messages: summarized,
            digest_fallback: outcome.fell_back,
        }
    }

    /// Mark preserved system messages as selected and charge them to the budget
    fn reserve_preserved(&self, messages: &[Message]) -> (Vec<bool>, TokenBudget) {
        let mut budget = TokenBudget::new(self.config.max_tokens);
        let selected: Vec<bool> = messages
            .iter()
            .map(|m| {
                let preserved = self.is_preserved(m);
                if preserved {
                    budget.force_reserve(self.cost(m));
                }
                preserved
            })
            .collect();
        (selected, budget)
    }

    /// Keywords of the trailing non-system window, the current focus
    fn focus_keywords(&self, messages: &[Message]) -> Vec<String> {
        let window = self.config.messages_to_keep_after_summary.max(1);
        let mut focus: Vec<Message> = messages
            .iter()
            .rev()
            .filter(|m| !m.is_system())
            .take(window)
            .cloned()
            .collect();
        focus.reverse();
        self.scorer.extract_keywords(&focus)
    }

    /// Insert runs of 1-2 unselected messages lying between selected ones
    fn fill_gaps(&self, messages: &[Message], selected: &mut [bool], budget: &mut TokenBudget) -> usize {
        let anchors: Vec<usize> = (0..messages.len()).filter(|&i| selected[i]).collect();
        let mut bridged = 0;

        for pair in anchors.windows(2) {
            let (start, end) = (pair[0] + 1, pair[1]);
            let gap = end - start;
            if gap == 0 || gap > MAX_GAP {
                continue;
            }
            let cost: usize = messages[start..end].iter().map(|m| self.cost(m)).sum();
            if budget.try_reserve(cost) {
                for flag in &mut selected[start..end] {
                    *flag = true;
                }
                bridged += gap;
            }
        }

        bridged
    }
}

fn collect_selected(messages: &[Message], selected: &[bool]) -> Vec<Message> {
    messages
        .iter()
        .zip(selected)
        .filter(|(_, &keep)| keep)
        .map(|(m, _)| m.clone())
        .collect()
}
