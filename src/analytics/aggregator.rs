// src/analytics/aggregator.rs
//! Process-lifetime chat counters plus a bounded recent-interaction buffer.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::classifier::KeywordClassifier;

/// Capacity of the recent-interaction buffer.
pub const RECENT_LIMIT: usize = 25;

/// One completed chat turn as seen by the analytics core.
#[derive(Debug, Clone, Default)]
pub struct TurnMetrics {
    pub user_message_count: u64,
    pub user_messages: Vec<String>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRecord {
    pub timestamp: DateTime<Utc>,
    pub user_messages: u64,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub response_time_ms: u64,
}

/// Running totals. Only ever increase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateMetrics {
    pub total_requests: u64,
    pub total_user_messages: u64,
    pub total_assistant_replies: u64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_response_time_ms: u64,
    pub last_interaction_at: Option<DateTime<Utc>>,
}

/// Counters, recent buffer (newest first) and classifier stats.
#[derive(Debug)]
pub struct MetricsAggregator {
    totals: AggregateMetrics,
    recent: VecDeque<InteractionRecord>,
    classifier: KeywordClassifier,
}

impl MetricsAggregator {
    pub fn new(classifier: KeywordClassifier) -> Self {
        Self {
            totals: AggregateMetrics::default(),
            recent: VecDeque::with_capacity(RECENT_LIMIT + 1),
            classifier,
        }
    }

    /// Record a completed turn stamped with the current time.
    pub fn record_turn(&mut self, turn: TurnMetrics) {
        self.record_turn_at(turn, Utc::now());
    }

    /// Record a completed turn. `at` becomes both `last_interaction_at` and
    /// the mention time of every classifier match in this turn.
    pub fn record_turn_at(&mut self, turn: TurnMetrics, at: DateTime<Utc>) {
        // Every classified text is a user message, so mentions never outnumber messages.
        let classified = turn
            .user_messages
            .iter()
            .filter(|m| !m.trim().is_empty())
            .count() as u64;
        let user_messages = turn.user_message_count.max(classified);

        let t = &mut self.totals;
        t.total_requests = t.total_requests.saturating_add(1);
        t.total_assistant_replies = t.total_assistant_replies.saturating_add(1);
        t.total_user_messages = t.total_user_messages.saturating_add(user_messages);
        t.total_prompt_tokens = t
            .total_prompt_tokens
            .saturating_add(turn.prompt_tokens.unwrap_or(0));
        t.total_completion_tokens = t
            .total_completion_tokens
            .saturating_add(turn.completion_tokens.unwrap_or(0));
        t.total_response_time_ms = t.total_response_time_ms.saturating_add(turn.response_time_ms);
        t.last_interaction_at = Some(at);

        if !turn.user_messages.is_empty() {
            self.classifier.classify_turn(&turn.user_messages, at);
        }

        self.recent.push_front(InteractionRecord {
            timestamp: at,
            user_messages,
            prompt_tokens: turn.prompt_tokens,
            completion_tokens: turn.completion_tokens,
            response_time_ms: turn.response_time_ms,
        });
        self.recent.truncate(RECENT_LIMIT);
    }

    pub fn totals(&self) -> &AggregateMetrics {
        &self.totals
    }

    /// Recent interactions, newest first.
    pub fn recent(&self) -> impl Iterator<Item = &InteractionRecord> {
        self.recent.iter()
    }

    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }

    pub fn classifier(&self) -> &KeywordClassifier {
        &self.classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{Taxonomy, TaxonomyKind};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn aggregator() -> MetricsAggregator {
        let tax = Arc::new(Taxonomy::builtin().unwrap());
        MetricsAggregator::new(KeywordClassifier::new(tax))
    }

    fn turn(users: u64, prompt: Option<u64>, completion: Option<u64>, ms: u64) -> TurnMetrics {
        TurnMetrics {
            user_message_count: users,
            user_messages: Vec::new(),
            prompt_tokens: prompt,
            completion_tokens: completion,
            response_time_ms: ms,
        }
    }

    #[test]
    fn requests_always_equal_replies() {
        let mut agg = aggregator();
        for i in 0..7 {
            agg.record_turn(turn(i, Some(i), None, 10));
            let t = agg.totals();
            assert_eq!(t.total_requests, t.total_assistant_replies);
            assert_eq!(t.total_requests, i + 1);
        }
    }

    #[test]
    fn missing_token_counts_are_treated_as_zero() {
        let mut agg = aggregator();
        agg.record_turn(turn(1, None, None, 50));
        agg.record_turn(turn(1, Some(7), Some(3), 50));
        let t = agg.totals();
        assert_eq!(t.total_prompt_tokens, 7);
        assert_eq!(t.total_completion_tokens, 3);
        assert_eq!(t.total_response_time_ms, 100);

        // The raw record keeps the absence.
        let oldest = agg.recent().last().unwrap();
        assert_eq!(oldest.prompt_tokens, None);
    }

    #[test]
    fn recent_buffer_is_bounded_and_newest_first() {
        let mut agg = aggregator();
        for i in 0..40u64 {
            let at = Utc.timestamp_opt(1_000 + i as i64, 0).single().unwrap();
            agg.record_turn_at(turn(1, None, None, i), at);
            assert!(agg.recent_len() <= RECENT_LIMIT);
        }
        let latencies: Vec<u64> = agg.recent().map(|r| r.response_time_ms).collect();
        assert_eq!(latencies.len(), RECENT_LIMIT);
        assert_eq!(latencies[0], 39);
        assert_eq!(*latencies.last().unwrap(), 15);
        assert!(latencies.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn turn_timestamp_is_shared_with_classifier() {
        let mut agg = aggregator();
        let at = Utc.timestamp_opt(1_700_000_123, 0).single().unwrap();
        let mut t = turn(2, None, None, 5);
        t.user_messages = vec!["I keep coughing".into(), "and have a fever".into()];
        agg.record_turn_at(t, at);

        assert_eq!(agg.totals().last_interaction_at, Some(at));
        let c = agg.classifier();
        assert_eq!(c.stat(TaxonomyKind::Concern, "cough").unwrap().last_mention_at, Some(at));
        assert_eq!(c.stat(TaxonomyKind::Concern, "fever").unwrap().last_mention_at, Some(at));
    }

    #[test]
    fn empty_message_batch_skips_classifier() {
        let mut agg = aggregator();
        agg.record_turn(turn(3, None, None, 5));
        assert_eq!(agg.totals().total_user_messages, 3);
        assert!(agg
            .classifier()
            .stats(TaxonomyKind::Concern)
            .all(|(_, s)| s.count == 0));
    }

    #[test]
    fn user_count_is_raised_to_classified_texts() {
        let mut agg = aggregator();
        let mut t = turn(0, None, None, 5);
        t.user_messages = vec!["cough".into(), "   ".into()];
        agg.record_turn(t);

        assert_eq!(agg.totals().total_user_messages, 1);
        assert_eq!(agg.recent().next().unwrap().user_messages, 1);
        let cough = agg.classifier().stat(TaxonomyKind::Concern, "cough").unwrap();
        assert!(cough.count <= agg.totals().total_user_messages);
    }

    #[test]
    fn huge_provider_counts_saturate_instead_of_overflowing() {
        let mut agg = aggregator();
        agg.record_turn(turn(1, Some(u64::MAX), Some(u64::MAX), u64::MAX));
        agg.record_turn(turn(1, Some(10), Some(10), 10));

        let t = agg.totals();
        assert_eq!(t.total_prompt_tokens, u64::MAX);
        assert_eq!(t.total_completion_tokens, u64::MAX);
        assert_eq!(t.total_response_time_ms, u64::MAX);
        assert_eq!(t.total_requests, 2);
    }
}
