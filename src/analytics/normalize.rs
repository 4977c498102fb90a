// src/analytics/normalize.rs
//! Shape adapter for analytics payloads.
//!
//! Older payloads carried `totals` and `charts` as maps keyed by metric name;
//! newer ones carry arrays of records. Both are accepted. The shape is detected
//! once per field, then everything converges on the `Normalized*` records.
//! Malformed input never fails: unknown pieces are skipped.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::report::{Highlight, ReportCategory};
use super::Direction;

/// Rendered in place of a total whose value is missing.
pub const MISSING_VALUE: &str = "\u{2014}";

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_-]").expect("separator regex"));
static CAMEL_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z])([A-Z])").expect("camel boundary regex"));
static WORD_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w").expect("word start regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TotalValue {
    Number(Number),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTotal {
    pub id: String,
    pub label: String,
    pub value: TotalValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedChart {
    pub id: String,
    pub title: String,
    pub points: Vec<NormalizedPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTrend {
    pub id: String,
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Canonical dashboard model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub totals: Vec<NormalizedTotal>,
    pub charts: Vec<NormalizedChart>,
    pub trends: Vec<NormalizedTrend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub highlights: Vec<Highlight>,
    pub concerns: Vec<ReportCategory>,
    pub conditions: Vec<ReportCategory>,
}

/// The two historical layouts of `totals` / `charts`.
enum Shape<'a> {
    Keyed(&'a Map<String, Value>),
    Listed(&'a [Value]),
    Absent,
}

impl<'a> Shape<'a> {
    fn of(v: Option<&'a Value>) -> Self {
        match v {
            Some(Value::Object(m)) => Shape::Keyed(m),
            Some(Value::Array(a)) => Shape::Listed(a),
            _ => Shape::Absent,
        }
    }
}

/// Normalize a whole analytics payload.
pub fn normalize_dashboard(payload: &Value) -> DashboardView {
    let Some(obj) = payload.as_object() else {
        return DashboardView::default();
    };

    let totals = normalize_totals(obj.get("totals"));
    let trends = normalize_trends(obj.get("trends"), &totals);

    DashboardView {
        charts: normalize_charts(obj.get("charts")),
        trends,
        timeframe: str_field(obj, "timeframe").map(str::to_string),
        updated_at: str_field(obj, "updatedAt").map(str::to_string),
        highlights: normalize_highlights(obj.get("highlights")),
        concerns: normalize_categories(obj.get("concerns")),
        conditions: normalize_categories(obj.get("conditions")),
        totals,
    }
}

pub fn normalize_totals(totals: Option<&Value>) -> Vec<NormalizedTotal> {
    match Shape::of(totals) {
        Shape::Keyed(map) => map
            .iter()
            .enumerate()
            .map(|(i, (key, entry))| total_entry(entry, key, i))
            .collect(),
        Shape::Listed(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let fallback = item
                    .as_object()
                    .and_then(|o| str_field(o, "id").or_else(|| str_field(o, "label")))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("total-{i}"));
                total_entry(item, &fallback, i)
            })
            .collect(),
        Shape::Absent => Vec::new(),
    }
}

fn total_entry(entry: &Value, fallback_key: &str, index: usize) -> NormalizedTotal {
    let base_id = format!("total-{index}");
    let key = if fallback_key.is_empty() {
        base_id.as_str()
    } else {
        fallback_key
    };

    match entry {
        Value::Number(n) => NormalizedTotal {
            id: key.to_string(),
            label: format_label(key),
            value: TotalValue::Number(n.clone()),
            change: None,
            direction: Direction::Flat,
        },
        Value::String(s) => NormalizedTotal {
            id: key.to_string(),
            label: format_label(key),
            value: TotalValue::Text(s.clone()),
            change: None,
            direction: Direction::Flat,
        },
        other => {
            let empty = Map::new();
            let obj = other.as_object().unwrap_or(&empty);
            let value = match obj.get("value") {
                Some(Value::Number(n)) => TotalValue::Number(n.clone()),
                Some(Value::String(s)) => TotalValue::Text(s.clone()),
                _ => TotalValue::Text(MISSING_VALUE.to_string()),
            };
            let change = obj.get("change").and_then(Value::as_f64);
            let id = str_field(obj, "id").unwrap_or(key).to_string();
            let label = match str_field(obj, "label") {
                Some(l) => l.to_string(),
                None => format_label(if fallback_key.is_empty() {
                    str_field(obj, "id").unwrap_or(&base_id)
                } else {
                    fallback_key
                }),
            };
            NormalizedTotal {
                id,
                label,
                value,
                change,
                direction: Direction::from_change(change),
            }
        }
    }
}

pub fn normalize_charts(charts: Option<&Value>) -> Vec<NormalizedChart> {
    let all = match Shape::of(charts) {
        Shape::Keyed(map) => map
            .iter()
            .map(|(key, points)| NormalizedChart {
                id: key.clone(),
                title: format_label(key),
                points: valid_points(Some(points)),
            })
            .collect::<Vec<_>>(),
        Shape::Listed(items) => items
            .iter()
            .enumerate()
            .map(|(i, chart)| {
                let empty = Map::new();
                let obj = chart.as_object().unwrap_or(&empty);
                let id = str_field(obj, "id");
                let name = str_field(obj, "name");
                let title = str_field(obj, "title");
                let points = match obj.get("points") {
                    Some(p) if !p.is_null() => Some(p),
                    _ => obj.get("data"),
                };
                NormalizedChart {
                    id: id
                        .or(name)
                        .or(title)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("chart-{i}")),
                    title: title
                        .or(name)
                        .map(str::to_string)
                        .unwrap_or_else(|| match id {
                            Some(id) => format_label(id),
                            None => format_label(&format!("Chart {}", i + 1)),
                        }),
                    points: valid_points(points),
                }
            })
            .collect(),
        Shape::Absent => Vec::new(),
    };

    all.into_iter().filter(|c| !c.points.is_empty()).collect()
}

/// Keep points that carry both a string label and a numeric value.
fn valid_points(points: Option<&Value>) -> Vec<NormalizedPoint> {
    let Some(Value::Array(items)) = points else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|p| {
            let label = p.get("label")?.as_str()?;
            let value = p.get("value")?.as_f64()?;
            Some(NormalizedPoint {
                label: label.to_string(),
                value,
            })
        })
        .collect()
}

/// Upstream trends when present, else synthesized from totals with a `change`.
pub fn normalize_trends(trends: Option<&Value>, totals: &[NormalizedTotal]) -> Vec<NormalizedTrend> {
    if let Some(Value::Array(items)) = trends {
        if !items.is_empty() {
            return items
                .iter()
                .enumerate()
                .map(|(i, trend)| {
                    let empty = Map::new();
                    let obj = trend.as_object().unwrap_or(&empty);
                    let change = obj.get("change").and_then(Value::as_f64);
                    let direction = str_field(obj, "direction")
                        .and_then(Direction::parse)
                        .unwrap_or_else(|| Direction::from_change(change));
                    let id = str_field(obj, "id");
                    let metric = str_field(obj, "metric");
                    let label = str_field(obj, "label");
                    NormalizedTrend {
                        id: id
                            .or(metric)
                            .or(label)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("trend-{i}")),
                        metric: metric
                            .or(label)
                            .or_else(|| str_field(obj, "title"))
                            .map(str::to_string)
                            .unwrap_or_else(|| match id {
                                Some(id) => format_label(id),
                                None => format_label(&format!("Metric {}", i + 1)),
                            }),
                        change,
                        direction,
                        description: str_field(obj, "description").map(str::to_string),
                    }
                })
                .collect();
        }
    }

    totals
        .iter()
        .filter(|t| t.change.is_some())
        .map(|t| NormalizedTrend {
            id: format!("trend-{}", t.id),
            metric: t.label.clone(),
            change: t.change,
            direction: t.direction,
            description: None,
        })
        .collect()
}

fn normalize_highlights(highlights: Option<&Value>) -> Vec<Highlight> {
    let Some(Value::Array(items)) = highlights else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            let obj = h.as_object()?;
            let title = str_field(obj, "title").unwrap_or_default();
            let description = str_field(obj, "description").unwrap_or_default();
            if title.is_empty() && description.is_empty() {
                return None;
            }
            Some(Highlight {
                id: str_field(obj, "id")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("highlight-{i}")),
                title: title.to_string(),
                description: description.to_string(),
            })
        })
        .collect()
}

/// Accepts both the report field name (`lastMentionedAt`) and the summary one
/// (`lastMentionAt`).
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawCategory {
    id: String,
    label: String,
    category: String,
    description: String,
    guidance: String,
    count: u64,
    share: f64,
    last_example: Option<String>,
    #[serde(alias = "lastMentionAt")]
    last_mentioned_at: Option<String>,
}

fn normalize_categories(rows: Option<&Value>) -> Vec<ReportCategory> {
    let Some(Value::Array(items)) = rows else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|row| serde_json::from_value::<RawCategory>(row.clone()).ok())
        .filter(|c| !c.id.is_empty() && !c.label.is_empty())
        .map(|c| ReportCategory {
            id: c.id,
            label: c.label,
            category: c.category,
            description: c.description,
            guidance: c.guidance,
            count: c.count,
            share: if c.share.is_finite() { c.share } else { 0.0 },
            last_example: c.last_example,
            last_mentioned_at: c.last_mentioned_at,
        })
        .collect()
}

/// Non-empty string field.
fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// "totalUserMessages" → "Total User Messages", "avg_response-time" → "Avg Response Time".
pub fn format_label(raw: &str) -> String {
    let spaced = SEPARATORS.replace_all(raw, " ");
    let split = CAMEL_BOUNDARY.replace_all(&spaced, "$1 $2");
    WORD_START
        .replace_all(&split, |caps: &regex::Captures| caps[0].to_uppercase())
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyed_scalar_total() {
        let totals = normalize_totals(Some(&json!({ "sessions": 5 })));
        assert_eq!(
            totals,
            vec![NormalizedTotal {
                id: "sessions".into(),
                label: "Sessions".into(),
                value: TotalValue::Number(5.into()),
                change: None,
                direction: Direction::Flat,
            }]
        );
        let v = serde_json::to_value(&totals[0]).unwrap();
        assert_eq!(v, json!({"id":"sessions","label":"Sessions","value":5,"direction":"flat"}));
    }

    #[test]
    fn keyed_object_totals_use_change_for_direction() {
        let totals = normalize_totals(Some(&json!({
            "totalUserMessages": { "value": 12, "change": 4.5 },
            "avgLatency": { "value": "1.2s", "change": -3 },
            "noValue": {}
        })));
        let by_id = |id: &str| totals.iter().find(|t| t.id == id).unwrap().clone();

        let users = by_id("totalUserMessages");
        assert_eq!(users.label, "Total User Messages");
        assert_eq!(users.direction, Direction::Up);
        assert_eq!(users.change, Some(4.5));

        let latency = by_id("avgLatency");
        assert_eq!(latency.value, TotalValue::Text("1.2s".into()));
        assert_eq!(latency.direction, Direction::Down);

        let missing = by_id("noValue");
        assert_eq!(missing.value, TotalValue::Text(MISSING_VALUE.into()));
        assert_eq!(missing.direction, Direction::Flat);
    }

    #[test]
    fn listed_totals_keep_labels_and_fill_gaps() {
        let totals = normalize_totals(Some(&json!([
            { "id": "total-requests", "label": "Total Chats", "value": 3 },
            { "id": "avg_response-time", "value": 200.5, "change": 0 },
            { "value": 1 },
            42
        ])));
        assert_eq!(totals.len(), 4);
        assert_eq!(totals[0].label, "Total Chats");
        assert_eq!(totals[1].label, "Avg Response Time");
        assert_eq!(totals[1].direction, Direction::Flat);
        assert_eq!(totals[2].id, "total-2");
        assert_eq!(totals[2].label, "Total 2");
        assert_eq!(totals[3].id, "total-3");
        assert_eq!(totals[3].value, TotalValue::Number(42.into()));
    }

    #[test]
    fn charts_accept_both_shapes_and_drop_invalid_points() {
        let keyed = normalize_charts(Some(&json!({
            "responseTime": [ {"label": "a", "value": 1}, {"label": "b"}, {"value": 3}, "junk" ],
            "empty": [],
            "notAList": 7
        })));
        assert_eq!(keyed.len(), 1);
        assert_eq!(keyed[0].id, "responseTime");
        assert_eq!(keyed[0].title, "Response Time");
        assert_eq!(keyed[0].points, vec![NormalizedPoint { label: "a".into(), value: 1.0 }]);

        let listed = normalize_charts(Some(&json!([
            { "id": "token-usage", "title": "Tokens", "points": [{"label": "x", "value": 2}] },
            { "name": "legacy", "data": [{"label": "y", "value": 4}] },
            { "id": "nothing", "points": [{"label": "z"}] },
            { "points": [{"label": "w", "value": 5}] }
        ])));
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].title, "Tokens");
        assert_eq!(listed[1].id, "legacy");
        assert_eq!(listed[1].title, "legacy");
        assert_eq!(listed[2].id, "chart-3");
        assert_eq!(listed[2].title, "Chart 4");
    }

    #[test]
    fn trends_pass_through_or_synthesize() {
        let explicit = normalize_trends(
            Some(&json!([
                { "id": "rt", "metric": "Response time", "change": -12.5, "description": "faster" },
                { "label": "Tokens", "change": 3, "direction": "down" },
                {}
            ])),
            &[],
        );
        assert_eq!(explicit[0].direction, Direction::Down);
        assert_eq!(explicit[0].description.as_deref(), Some("faster"));
        assert_eq!(explicit[1].id, "Tokens");
        assert_eq!(explicit[1].direction, Direction::Down);
        assert_eq!(explicit[2].id, "trend-2");
        assert_eq!(explicit[2].metric, "Metric 3");
        assert_eq!(explicit[2].direction, Direction::Flat);

        let totals = normalize_totals(Some(&json!({
            "sessions": { "value": 5, "change": 10 },
            "users": 3
        })));
        let synthesized = normalize_trends(Some(&json!([])), &totals);
        assert_eq!(synthesized.len(), 1);
        assert_eq!(synthesized[0].id, "trend-sessions");
        assert_eq!(synthesized[0].metric, "Sessions");
        assert_eq!(synthesized[0].direction, Direction::Up);
    }

    #[test]
    fn malformed_payloads_degrade_to_empty() {
        for payload in [json!(null), json!(42), json!("x"), json!([1, 2])] {
            assert_eq!(normalize_dashboard(&payload), DashboardView::default());
        }
        let view = normalize_dashboard(&json!({
            "totals": true,
            "charts": "nope",
            "trends": { "a": 1 },
            "highlights": [1, {"id": "h"}, {"title": "Hi"}],
            "concerns": [{"id": "x"}, {"id": "cough", "label": "Cough", "count": 2, "lastMentionAt": "t"}, 5],
            "timeframe": 3
        }));
        assert!(view.totals.is_empty());
        assert!(view.charts.is_empty());
        assert!(view.trends.is_empty());
        assert_eq!(view.timeframe, None);
        assert_eq!(view.highlights.len(), 1);
        assert_eq!(view.highlights[0].id, "highlight-2");
        assert_eq!(view.concerns.len(), 1);
        assert_eq!(view.concerns[0].last_mentioned_at.as_deref(), Some("t"));
    }

    #[test]
    fn format_label_variants() {
        assert_eq!(format_label("totalUserMessages"), "Total User Messages");
        assert_eq!(format_label("sessions"), "Sessions");
        assert_eq!(format_label("avg_response-time"), "Avg Response Time");
        assert_eq!(format_label("Chart 2"), "Chart 2");
    }
}
