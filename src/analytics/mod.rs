// src/analytics/mod.rs
//! Chat analytics: counters, summary, dashboard report and payload normalizer.
//!
//! `Analytics` is the single shared context handed to request handlers. All
//! mutable state (counters, recent buffer, classifier stats) sits behind one
//! mutex, because a turn update touches several fields that must move together.

pub mod aggregator;
pub mod normalize;
pub mod report;
pub mod summary;

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::classifier::KeywordClassifier;
use crate::taxonomy::Taxonomy;

pub use aggregator::{MetricsAggregator, TurnMetrics, RECENT_LIMIT};
pub use normalize::{normalize_dashboard, DashboardView};
pub use report::{build_report, DashboardReport};
pub use summary::{build_summary, AnalyticsSummary};

/// Direction of a change, as rendered by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    /// Missing change is flat; otherwise the sign decides.
    pub fn from_change(change: Option<f64>) -> Self {
        match change {
            Some(c) if c > 0.0 => Direction::Up,
            Some(c) if c < 0.0 => Direction::Down,
            _ => Direction::Flat,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "flat" => Some(Direction::Flat),
            _ => None,
        }
    }
}

/// Process-wide analytics context. Cheap to clone (shared handle).
#[derive(Debug, Clone)]
pub struct Analytics {
    inner: Arc<Mutex<MetricsAggregator>>,
}

impl Analytics {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        let aggregator = MetricsAggregator::new(KeywordClassifier::new(taxonomy));
        Self {
            inner: Arc::new(Mutex::new(aggregator)),
        }
    }

    /// Record one successfully completed chat turn.
    pub fn record_turn(&self, turn: TurnMetrics) {
        self.lock().record_turn(turn);
    }

    pub fn summary(&self) -> AnalyticsSummary {
        build_summary(&self.lock())
    }

    pub fn report(&self) -> DashboardReport {
        build_report(&self.summary())
    }

    // A panic mid-update cannot leave counters unusable for readers.
    fn lock(&self) -> MutexGuard<'_, MetricsAggregator> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn direction_from_change() {
        assert_eq!(Direction::from_change(None), Direction::Flat);
        assert_eq!(Direction::from_change(Some(0.0)), Direction::Flat);
        assert_eq!(Direction::from_change(Some(2.0)), Direction::Up);
        assert_eq!(Direction::from_change(Some(-0.1)), Direction::Down);
        assert_eq!(Direction::parse("sideways"), None);
    }

    #[test]
    fn concurrent_turns_are_all_counted() {
        let analytics = Analytics::new(Arc::new(Taxonomy::builtin().unwrap()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let a = analytics.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        a.record_turn(TurnMetrics {
                            user_message_count: 1,
                            user_messages: vec!["my back pain is bad".into()],
                            prompt_tokens: Some(2),
                            completion_tokens: None,
                            response_time_ms: 10,
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let s = analytics.summary();
        assert_eq!(s.totals.requests, 400);
        assert_eq!(s.totals.assistant_replies, 400);
        assert_eq!(s.totals.prompt_tokens, 800);
        assert_eq!(s.recent.len(), RECENT_LIMIT);
        assert_eq!(s.common_concerns[0].id, "musculoskeletal-pain");
        assert_eq!(s.common_concerns[0].count, 400);
        assert_eq!(s.common_concerns[0].share, 1.0);
    }
}
