//! Normalization of raw analysis-provider output.
//!
//! Providers answer with loosely structured JSON. Every metric is pulled out
//! defensively, clamped into its valid range, and replaced by a documented
//! default when missing or malformed, so one bad response never fails an
//! otherwise healthy run.
//!
//! | Metric             | Source keys                          | Range    | Default   |
//! |--------------------|--------------------------------------|----------|-----------|
//! | `score`            | `visibility_score`, `score`          | 0..=100  | 0         |
//! | `mention_rate`     | `mention_rate`, `mentionRate`        | 0..=100  | 0         |
//! | sentiment          | `sentiment.{positive,neutral,negative}` | 0..=100 | 0/100/0 |
//! | `average_position` | `average_position`, `position`       | 1..=10   | absent    |

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lowest valid percentage.
pub const PERCENT_MIN: f64 = 0.0;

/// Highest valid percentage.
pub const PERCENT_MAX: f64 = 100.0;

/// Best (first) rank a brand can hold in an answer.
pub const POSITION_MIN: i16 = 1;

/// Worst rank that is still recorded; anything lower is clamped to it.
pub const POSITION_MAX: i16 = 10;

/// Raw provider response for one `(brand, model, stage)` analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderOutput {
    /// The provider's JSON body, stored verbatim.
    pub raw: Value,
    /// Wall-clock time the provider took to answer.
    pub response_time_ms: i64,
}

/// Share of answers per sentiment, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentBreakdown {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

impl Default for SentimentBreakdown {
    fn default() -> Self {
        Self {
            positive: 0.0,
            neutral: PERCENT_MAX,
            negative: 0.0,
        }
    }
}

/// Clamped, persistence-ready metrics for one analysis pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    pub score: f64,
    pub mention_rate: f64,
    pub sentiment: SentimentBreakdown,
    pub average_position: Option<i16>,
    pub response_time_ms: i64,
}

/// Extract and clamp all metrics from a provider response.
pub fn normalize(output: &ProviderOutput) -> AnalysisMetrics {
    let raw = &output.raw;

    AnalysisMetrics {
        score: percent_field(raw, &["visibility_score", "score"]).unwrap_or(0.0),
        mention_rate: percent_field(raw, &["mention_rate", "mentionRate"]).unwrap_or(0.0),
        sentiment: sentiment(raw.get("sentiment")),
        average_position: position_field(raw, &["average_position", "position"]),
        response_time_ms: output.response_time_ms.max(0),
    }
}

/// Clamp a percentage; non-finite input has no valid value.
pub fn clamp_percent(value: f64) -> Option<f64> {
    value
        .is_finite()
        .then(|| value.clamp(PERCENT_MIN, PERCENT_MAX))
}

/// Clamp a rank into `POSITION_MIN..=POSITION_MAX`.
///
/// Zero and negative ranks mean "not ranked" and yield `None`.
pub fn clamp_position(value: f64) -> Option<i16> {
    if !value.is_finite() || value < f64::from(POSITION_MIN) - 0.5 {
        return None;
    }
    let rounded = value.round().min(f64::from(POSITION_MAX));
    Some((rounded as i16).max(POSITION_MIN))
}

fn percent_field(raw: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|k| raw.get(*k).and_then(as_number))
        .and_then(clamp_percent)
}

fn position_field(raw: &Value, keys: &[&str]) -> Option<i16> {
    keys.iter()
        .find_map(|k| raw.get(*k).and_then(as_number))
        .and_then(clamp_position)
}

fn sentiment(value: Option<&Value>) -> SentimentBreakdown {
    let Some(obj) = value.and_then(Value::as_object) else {
        return SentimentBreakdown::default();
    };

    let read = |key: &str| obj.get(key).and_then(as_number).and_then(clamp_percent);
    let (positive, neutral, negative) = (read("positive"), read("neutral"), read("negative"));

    if positive.is_none() && neutral.is_none() && negative.is_none() {
        return SentimentBreakdown::default();
    }

    SentimentBreakdown {
        positive: positive.unwrap_or(0.0),
        neutral: neutral.unwrap_or(0.0),
        negative: negative.unwrap_or(0.0),
    }
}

/// Accept JSON numbers and numeric strings such as `"72"` or `"72.5%"`.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
