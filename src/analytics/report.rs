// src/analytics/report.rs
//! Dashboard payload served by `GET /api/analytics/summary`: key-metric cards,
//! per-chat charts, first-vs-latest trends, highlights and leaderboards.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Number;

use super::summary::{AnalyticsSummary, CategoryInsight, RecentInteraction};
use super::Direction;

/// Changes smaller than this (in percent) count as flat.
const FLAT_EPSILON: f64 = 0.0001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTotal {
    pub id: String,
    pub label: String,
    pub value: Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportChart {
    pub id: String,
    pub title: String,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTrend {
    pub id: String,
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCategory {
    pub id: String,
    pub label: String,
    pub category: String,
    pub description: String,
    pub guidance: String,
    pub count: u64,
    pub share: f64,
    pub last_example: Option<String>,
    pub last_mentioned_at: Option<String>,
}

impl From<&CategoryInsight> for ReportCategory {
    fn from(c: &CategoryInsight) -> Self {
        Self {
            id: c.id.clone(),
            label: c.label.clone(),
            category: c.category.clone(),
            description: c.description.clone(),
            guidance: c.guidance.clone(),
            count: c.count,
            share: c.share,
            last_example: c.last_example.clone(),
            last_mentioned_at: c.last_mention_at.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub totals: Vec<ReportTotal>,
    pub charts: Vec<ReportChart>,
    pub trends: Vec<ReportTrend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    pub updated_at: Option<String>,
    pub highlights: Vec<Highlight>,
    pub concerns: Vec<ReportCategory>,
    pub conditions: Vec<ReportCategory>,
}

pub fn build_report(summary: &AnalyticsSummary) -> DashboardReport {
    let chronological: Vec<&RecentInteraction> = summary.recent.iter().rev().collect();

    let concerns: Vec<ReportCategory> = summary.common_concerns.iter().map(Into::into).collect();
    let conditions: Vec<ReportCategory> =
        summary.common_conditions.iter().map(Into::into).collect();

    DashboardReport {
        totals: totals(summary),
        charts: charts(&chronological),
        trends: trends(&chronological),
        timeframe: match chronological.len() {
            0 => None,
            1 => Some("Most recent interaction".to_string()),
            n => Some(format!("Last {n} interactions")),
        },
        updated_at: summary.last_interaction_at.clone(),
        highlights: highlights(summary, &concerns, &conditions),
        concerns,
        conditions,
    }
}

fn total(id: &str, label: &str, value: Number) -> ReportTotal {
    ReportTotal {
        id: id.to_string(),
        label: label.to_string(),
        value,
    }
}

fn totals(summary: &AnalyticsSummary) -> Vec<ReportTotal> {
    let t = &summary.totals;
    let a = &summary.averages;
    let mut out = vec![
        total("total-requests", "Total Chats", t.requests.into()),
        total("total-user-messages", "User Messages", t.user_messages.into()),
        total("total-assistant-replies", "Assistant Replies", t.assistant_replies.into()),
    ];
    if t.prompt_tokens > 0 {
        out.push(total("total-prompt-tokens", "Prompt Tokens", t.prompt_tokens.into()));
    }
    if t.completion_tokens > 0 {
        out.push(total(
            "total-completion-tokens",
            "Completion Tokens",
            t.completion_tokens.into(),
        ));
    }
    out.push(total(
        "avg-response-time",
        "Avg Response Time (ms)",
        decimal(round1(a.response_time_ms)),
    ));
    out.push(total("avg-prompt-tokens", "Avg Prompt Tokens", decimal(round1(a.prompt_tokens))));
    out.push(total(
        "avg-completion-tokens",
        "Avg Completion Tokens",
        decimal(round1(a.completion_tokens)),
    ));
    out
}

fn series(
    chronological: &[&RecentInteraction],
    value: fn(&RecentInteraction) -> u64,
    keep_zero: bool,
) -> Vec<ChartPoint> {
    chronological
        .iter()
        .enumerate()
        .map(|(i, r)| ChartPoint {
            label: chart_label(&r.timestamp, i),
            value: value(r),
        })
        .filter(|p| keep_zero || p.value > 0)
        .collect()
}

fn charts(chronological: &[&RecentInteraction]) -> Vec<ReportChart> {
    let candidates = [
        (
            "response-time",
            "Response Time (ms)",
            series(chronological, |r| r.response_time_ms, true),
        ),
        (
            "token-usage",
            "Total Tokens per Chat",
            series(chronological, total_tokens, false),
        ),
        (
            "user-messages",
            "User Messages per Chat",
            series(chronological, |r| r.user_messages, false),
        ),
    ];

    candidates
        .into_iter()
        .filter(|(_, _, points)| !points.is_empty())
        .map(|(id, title, points)| ReportChart {
            id: id.to_string(),
            title: title.to_string(),
            points,
        })
        .collect()
}

fn trends(chronological: &[&RecentInteraction]) -> Vec<ReportTrend> {
    let mut out = Vec::new();
    let (Some(earliest), Some(latest)) = (chronological.first(), chronological.last()) else {
        return out;
    };
    if chronological.len() < 2 {
        return out;
    }

    if let Some(change) = percentage_change(
        latest.response_time_ms as f64,
        earliest.response_time_ms as f64,
    ) {
        let direction = change_direction(change);
        out.push(ReportTrend {
            id: "response-time-trend".into(),
            metric: "Response time".into(),
            change: Some(round1(change)),
            direction,
            description: Some(
                match direction {
                    Direction::Down => "Responses are faster than at the start of this window.",
                    Direction::Up => "Responses have slowed compared to earlier chats.",
                    Direction::Flat => "Response times are steady.",
                }
                .into(),
            ),
        });
    }

    if let Some(change) =
        percentage_change(total_tokens(latest) as f64, total_tokens(earliest) as f64)
    {
        let direction = change_direction(change);
        out.push(ReportTrend {
            id: "token-usage-trend".into(),
            metric: "Token usage".into(),
            change: Some(round1(change)),
            direction,
            description: Some(
                match direction {
                    Direction::Down => "Token usage is decreasing per interaction.",
                    Direction::Up => "Later chats are using more tokens.",
                    Direction::Flat => "Token usage is steady across chats.",
                }
                .into(),
            ),
        });
    }

    out
}

fn highlights(
    summary: &AnalyticsSummary,
    concerns: &[ReportCategory],
    conditions: &[ReportCategory],
) -> Vec<Highlight> {
    let t = &summary.totals;
    let mut out = if t.requests > 0 {
        vec![
            Highlight {
                id: "avg-response-highlight".into(),
                title: "Consistent response time".into(),
                description: format!(
                    "Average response time {} ms across {} chats.",
                    summary.averages.response_time_ms.round(),
                    t.requests
                ),
            },
            Highlight {
                id: "token-highlight".into(),
                title: "Token usage".into(),
                description: format!(
                    "{} total tokens processed so far.",
                    t.prompt_tokens.saturating_add(t.completion_tokens)
                ),
            },
        ]
    } else {
        vec![Highlight {
            id: "no-activity".into(),
            title: "No conversations yet".into(),
            description: "Start chatting with HealthMate to see engagement analytics here.".into(),
        }]
    };

    if let Some(top) = concerns.first() {
        let pct = format_percent(top.share);
        out.insert(
            0,
            Highlight {
                id: format!("top-concern-{}", top.id),
                title: format!("{} is trending", top.label),
                description: match &top.last_example {
                    Some(ex) => format!(
                        "Mentioned {} times ({pct}% of user messages). Recent example: \u{201c}{ex}\u{201d}.",
                        top.count
                    ),
                    None => format!(
                        "Mentioned {} times ({pct}% of user messages) in recent chats.",
                        top.count
                    ),
                },
            },
        );
    }

    if let Some(top) = conditions.first() {
        let pct = format_percent(top.share);
        out.insert(
            0,
            Highlight {
                id: format!("top-condition-{}", top.id),
                title: format!("{} frequently mentioned", top.label),
                description: match &top.last_example {
                    Some(ex) => format!(
                        "Logged {} times ({pct}% of user messages). Sample context: \u{201c}{ex}\u{201d}.",
                        top.count
                    ),
                    None => format!(
                        "Logged {} times ({pct}% of user messages) in recent chats.",
                        top.count
                    ),
                },
            },
        );
    }

    out
}

fn total_tokens(r: &RecentInteraction) -> u64 {
    r.prompt_tokens
        .unwrap_or(0)
        .saturating_add(r.completion_tokens.unwrap_or(0))
}

/// "Mar 5, 2:07 PM" in UTC, or "Chat N" when the timestamp does not parse.
pub fn chart_label(iso: &str, index: usize) -> String {
    match DateTime::parse_from_rfc3339(iso) {
        Ok(ts) => ts
            .with_timezone(&chrono::Utc)
            .format("%b %-d, %-I:%M %p")
            .to_string(),
        Err(_) => format!("Chat {}", index + 1),
    }
}

/// Percent change from `earliest` to `latest`; `None` when undefined.
pub fn percentage_change(latest: f64, earliest: f64) -> Option<f64> {
    if !latest.is_finite() || !earliest.is_finite() || earliest == 0.0 {
        return None;
    }
    Some((latest - earliest) / earliest.abs() * 100.0)
}

pub fn change_direction(change: f64) -> Direction {
    if change.abs() < FLAT_EPSILON {
        Direction::Flat
    } else if change > 0.0 {
        Direction::Up
    } else {
        Direction::Down
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Integral floats serialize as integers ("200", not "200.0").
fn decimal(v: f64) -> Number {
    if v.fract() == 0.0 && v.abs() < u64::MAX as f64 && v >= 0.0 {
        Number::from(v as u64)
    } else {
        Number::from_f64(v).unwrap_or_else(|| Number::from(0))
    }
}

/// Share as a percentage with at most one decimal ("33.3", "50").
fn format_percent(share: f64) -> String {
    let pct = (share * 1000.0).round() / 10.0;
    if pct.fract() == 0.0 {
        format!("{}", pct as i64)
    } else {
        format!("{pct:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::summary::{SummaryAverages, SummaryTotals};

    fn recent(ts: &str, users: u64, prompt: Option<u64>, completion: Option<u64>, ms: u64) -> RecentInteraction {
        RecentInteraction {
            timestamp: ts.to_string(),
            user_messages: users,
            prompt_tokens: prompt,
            completion_tokens: completion,
            response_time_ms: ms,
        }
    }

    fn summary(recent_newest_first: Vec<RecentInteraction>) -> AnalyticsSummary {
        let n = recent_newest_first.len() as u64;
        let ms: u64 = recent_newest_first.iter().map(|r| r.response_time_ms).sum();
        AnalyticsSummary {
            totals: SummaryTotals {
                requests: n,
                user_messages: recent_newest_first.iter().map(|r| r.user_messages).sum(),
                assistant_replies: n,
                prompt_tokens: recent_newest_first.iter().filter_map(|r| r.prompt_tokens).sum(),
                completion_tokens: recent_newest_first
                    .iter()
                    .filter_map(|r| r.completion_tokens)
                    .sum(),
            },
            averages: SummaryAverages {
                prompt_tokens: 0.0,
                completion_tokens: 0.0,
                response_time_ms: if n > 0 { ms as f64 / n as f64 } else { 0.0 },
            },
            last_interaction_at: recent_newest_first.first().map(|r| r.timestamp.clone()),
            recent: recent_newest_first,
            common_concerns: Vec::new(),
            common_conditions: Vec::new(),
        }
    }

    fn insight(id: &str, label: &str, count: u64, share: f64, example: Option<&str>) -> CategoryInsight {
        CategoryInsight {
            id: id.into(),
            label: label.into(),
            category: "c".into(),
            description: "d".into(),
            guidance: "g".into(),
            count,
            share,
            last_example: example.map(Into::into),
            last_mention_at: Some("2024-01-01T00:00:00.000Z".into()),
        }
    }

    #[test]
    fn empty_summary_yields_no_activity_report() {
        let r = build_report(&summary(Vec::new()));
        let ids: Vec<&str> = r.totals.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "total-requests",
                "total-user-messages",
                "total-assistant-replies",
                "avg-response-time",
                "avg-prompt-tokens",
                "avg-completion-tokens"
            ]
        );
        assert!(r.charts.is_empty());
        assert!(r.trends.is_empty());
        assert_eq!(r.timeframe, None);
        assert_eq!(r.updated_at, None);
        assert_eq!(r.highlights.len(), 1);
        assert_eq!(r.highlights[0].id, "no-activity");
    }

    #[test]
    fn token_totals_appear_only_when_nonzero() {
        let r = build_report(&summary(vec![recent(
            "2024-03-05T14:07:09.000Z",
            1,
            Some(12),
            None,
            80,
        )]));
        let ids: Vec<&str> = r.totals.iter().map(|t| t.id.as_str()).collect();
        assert!(ids.contains(&"total-prompt-tokens"));
        assert!(!ids.contains(&"total-completion-tokens"));
        assert_eq!(r.timeframe.as_deref(), Some("Most recent interaction"));
    }

    #[test]
    fn charts_are_chronological_and_drop_zero_points() {
        let r = build_report(&summary(vec![
            recent("2024-03-05T15:00:00.000Z", 2, Some(10), Some(5), 300),
            recent("2024-03-05T14:07:09.000Z", 0, None, None, 100),
        ]));
        let response = r.charts.iter().find(|c| c.id == "response-time").unwrap();
        assert_eq!(
            response.points,
            vec![
                ChartPoint { label: "Mar 5, 2:07 PM".into(), value: 100 },
                ChartPoint { label: "Mar 5, 3:00 PM".into(), value: 300 },
            ]
        );
        let tokens = r.charts.iter().find(|c| c.id == "token-usage").unwrap();
        assert_eq!(tokens.points.len(), 1);
        assert_eq!(tokens.points[0].value, 15);
        let users = r.charts.iter().find(|c| c.id == "user-messages").unwrap();
        assert_eq!(users.points.len(), 1);
        assert_eq!(r.timeframe.as_deref(), Some("Last 2 interactions"));
    }

    #[test]
    fn trends_compare_latest_with_earliest() {
        let r = build_report(&summary(vec![
            recent("2024-03-05T16:00:00.000Z", 1, Some(30), Some(30), 150),
            recent("2024-03-05T15:00:00.000Z", 1, Some(1), Some(1), 999),
            recent("2024-03-05T14:00:00.000Z", 1, Some(20), Some(20), 300),
        ]));
        let rt = r.trends.iter().find(|t| t.id == "response-time-trend").unwrap();
        assert_eq!(rt.change, Some(-50.0));
        assert_eq!(rt.direction, Direction::Down);
        let tok = r.trends.iter().find(|t| t.id == "token-usage-trend").unwrap();
        assert_eq!(tok.change, Some(50.0));
        assert_eq!(tok.direction, Direction::Up);
    }

    #[test]
    fn zero_baseline_skips_trend() {
        let r = build_report(&summary(vec![
            recent("2024-03-05T16:00:00.000Z", 1, Some(5), None, 150),
            recent("2024-03-05T14:00:00.000Z", 1, None, None, 150),
        ]));
        assert_eq!(r.trends.len(), 1);
        assert_eq!(r.trends[0].direction, Direction::Flat);
        assert_eq!(r.trends[0].description.as_deref(), Some("Response times are steady."));
    }

    #[test]
    fn top_condition_then_top_concern_lead_highlights() {
        let mut s = summary(vec![recent("2024-03-05T16:00:00.000Z", 3, None, None, 150)]);
        s.common_concerns = vec![insight("cough", "Cough", 1, 1.0 / 3.0, Some("bad cough"))];
        s.common_conditions = vec![insight("influenza", "Influenza", 1, 0.5, None)];
        let r = build_report(&s);

        assert_eq!(r.highlights[0].id, "top-condition-influenza");
        assert_eq!(
            r.highlights[0].description,
            "Logged 1 times (50% of user messages) in recent chats."
        );
        assert_eq!(r.highlights[1].id, "top-concern-cough");
        assert_eq!(
            r.highlights[1].description,
            "Mentioned 1 times (33.3% of user messages). Recent example: \u{201c}bad cough\u{201d}."
        );
        assert_eq!(r.highlights[2].id, "avg-response-highlight");
        assert_eq!(r.concerns[0].last_mentioned_at.as_deref(), Some("2024-01-01T00:00:00.000Z"));
    }

    #[test]
    fn averages_are_rounded_to_one_decimal() {
        let s = summary(vec![
            recent("2024-03-05T16:00:00.000Z", 1, None, None, 100),
            recent("2024-03-05T15:00:00.000Z", 1, None, None, 100),
            recent("2024-03-05T14:00:00.000Z", 1, None, None, 101),
        ]);
        let r = build_report(&s);
        let avg = r.totals.iter().find(|t| t.id == "avg-response-time").unwrap();
        assert_eq!(avg.value.as_f64(), Some(100.3));
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["totals"][0]["value"], serde_json::json!(3));
    }

    #[test]
    fn oversized_token_counts_saturate() {
        let r = build_report(&summary(vec![recent(
            "2024-03-05T16:00:00.000Z",
            1,
            Some(u64::MAX),
            Some(7),
            150,
        )]));
        let tokens = r.charts.iter().find(|c| c.id == "token-usage").unwrap();
        assert_eq!(tokens.points[0].value, u64::MAX);
        let h = r.highlights.iter().find(|h| h.id == "token-highlight").unwrap();
        assert_eq!(h.description, format!("{} total tokens processed so far.", u64::MAX));
    }

    #[test]
    fn bad_timestamp_falls_back_to_chat_index() {
        assert_eq!(chart_label("not a date", 2), "Chat 3");
    }
}
