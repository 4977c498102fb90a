// src/analytics/summary.rs
//! Derived analytics view: averages, shares and sorted leaderboards computed
//! from the live aggregator on every read.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::aggregator::MetricsAggregator;
use crate::taxonomy::TaxonomyKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTotals {
    pub requests: u64,
    pub user_messages: u64,
    pub assistant_replies: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryAverages {
    pub prompt_tokens: f64,
    pub completion_tokens: f64,
    pub response_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentInteraction {
    pub timestamp: String,
    pub user_messages: u64,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub response_time_ms: u64,
}

/// Leaderboard row for one concern or condition with at least one mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInsight {
    pub id: String,
    pub label: String,
    pub category: String,
    pub description: String,
    pub guidance: String,
    pub count: u64,
    /// Mentions divided by total user messages (0 when there are none yet).
    pub share: f64,
    pub last_example: Option<String>,
    pub last_mention_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub totals: SummaryTotals,
    pub averages: SummaryAverages,
    pub last_interaction_at: Option<String>,
    /// Newest first.
    pub recent: Vec<RecentInteraction>,
    pub common_concerns: Vec<CategoryInsight>,
    pub common_conditions: Vec<CategoryInsight>,
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Pure read over the aggregator.
pub fn build_summary(agg: &MetricsAggregator) -> AnalyticsSummary {
    let t = agg.totals();
    let average = |total: u64| {
        if t.total_requests > 0 {
            total as f64 / t.total_requests as f64
        } else {
            0.0
        }
    };

    AnalyticsSummary {
        totals: SummaryTotals {
            requests: t.total_requests,
            user_messages: t.total_user_messages,
            assistant_replies: t.total_assistant_replies,
            prompt_tokens: t.total_prompt_tokens,
            completion_tokens: t.total_completion_tokens,
        },
        averages: SummaryAverages {
            prompt_tokens: average(t.total_prompt_tokens),
            completion_tokens: average(t.total_completion_tokens),
            response_time_ms: average(t.total_response_time_ms),
        },
        last_interaction_at: t.last_interaction_at.map(iso8601),
        recent: agg
            .recent()
            .map(|r| RecentInteraction {
                timestamp: iso8601(r.timestamp),
                user_messages: r.user_messages,
                prompt_tokens: r.prompt_tokens,
                completion_tokens: r.completion_tokens,
                response_time_ms: r.response_time_ms,
            })
            .collect(),
        common_concerns: leaderboard(agg, TaxonomyKind::Concern),
        common_conditions: leaderboard(agg, TaxonomyKind::Condition),
    }
}

fn leaderboard(agg: &MetricsAggregator, kind: TaxonomyKind) -> Vec<CategoryInsight> {
    let user_messages = agg.totals().total_user_messages;
    let mut rows: Vec<CategoryInsight> = agg
        .classifier()
        .stats(kind)
        .filter(|(_, stat)| stat.count > 0)
        .map(|(entry, stat)| CategoryInsight {
            id: entry.id.clone(),
            label: entry.label.clone(),
            category: entry.category.clone(),
            description: entry.description.clone(),
            guidance: entry.guidance.clone(),
            count: stat.count,
            share: if user_messages > 0 {
                stat.count as f64 / user_messages as f64
            } else {
                0.0
            },
            last_example: stat.last_example.clone(),
            last_mention_at: stat.last_mention_at.map(iso8601),
        })
        .collect();
    // stable: ties keep taxonomy order
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows
}
