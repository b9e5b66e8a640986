//! Review oracle boundary.
//!
//! The oracle is an external text generator. Its output is parsed into a
//! typed [`ReviewVerdict`]; anything that does not parse cleanly becomes a
//! `ManualReview` verdict with score 0, which can never approve payment.

use crate::record::TaskSpec;
use async_trait::async_trait;
use bounty_types::Actor;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::warn;

pub const MAX_SCORE: u8 = 10;

static LEGACY_DECISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:DECISION|VERDICT)\s*:\s*\**\s*([A-Z_ ]+?)\s*\**\s*$")
        .expect("invalid decision pattern")
});

static LEGACY_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*SCORE\s*:\s*\**\s*(\d{1,3})\s*(?:/\s*10)?").expect("invalid score pattern")
});

static LEGACY_REASONING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:SUMMARY|REASONING)\s*:\s*(.+)$").expect("invalid reasoning pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approve,
    Reject,
    ManualReview,
}

impl Recommendation {
    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "approve" | "approved" | "accept" | "merge" | "pass" => Some(Recommendation::Approve),
            "reject" | "rejected" | "deny" | "close" | "fail" => Some(Recommendation::Reject),
            "manual_review" | "needs_review" | "review" | "escalate" => {
                Some(Recommendation::ManualReview)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    /// 0..=10
    pub score: u8,
    pub recommendation: Recommendation,
    pub reasoning: String,
    #[serde(default)]
    pub flags: Vec<String>,
    /// Reviewer that produced the verdict
    pub source: Actor,
    /// False when the oracle output could not be parsed
    pub parsed: bool,
    pub received_at: DateTime<Utc>,
}

impl ReviewVerdict {
    pub fn new(score: u8, recommendation: Recommendation, reasoning: impl Into<String>, source: Actor) -> Self {
        Self {
            score: score.min(MAX_SCORE),
            recommendation,
            reasoning: reasoning.into(),
            flags: Vec::new(),
            source,
            parsed: true,
            received_at: Utc::now(),
        }
    }

    /// Placeholder for output that could not be understood.
    pub fn fail_closed(source: Actor, why: impl Into<String>) -> Self {
        Self {
            score: 0,
            recommendation: Recommendation::ManualReview,
            reasoning: why.into(),
            flags: vec!["unparseable_verdict".to_string()],
            source,
            parsed: false,
            received_at: Utc::now(),
        }
    }

    /// Whether this verdict alone clears the approval threshold.
    pub fn meets(&self, threshold: u8) -> bool {
        self.parsed && self.recommendation == Recommendation::Approve && self.score >= threshold
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
    #[error("Oracle timed out")]
    Timeout,
}

/// External reviewer returning raw text for a task and diff.
#[async_trait]
pub trait ReviewOracle: Send + Sync {
    /// Identity recorded as the verdict source
    fn reviewer(&self) -> Actor;

    async fn evaluate(&self, task: &TaskSpec, diff: &str) -> Result<String, OracleError>;
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, then the closing fence
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn score_from_json(value: &serde_json::Value) -> Option<u8> {
    let score = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.split('/').next()?.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !(0.0..=MAX_SCORE as f64).contains(&score) {
        return None;
    }
    Some(score.floor() as u8)
}

fn parse_json(text: &str, source: &Actor) -> Option<ReviewVerdict> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(&text[start..=end]).ok()?;
    let obj = value.as_object()?;

    let label = obj
        .get("decision")
        .or_else(|| obj.get("recommendation"))
        .or_else(|| obj.get("verdict"))?
        .as_str()?;
    let recommendation = Recommendation::from_label(label)?;
    let score = score_from_json(obj.get("score")?)?;
    let reasoning = obj
        .get("summary")
        .or_else(|| obj.get("reasoning"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let flags = obj
        .get("flags")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|f| f.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let mut verdict = ReviewVerdict::new(score, recommendation, reasoning, source.clone());
    verdict.flags = flags;
    Some(verdict)
}

fn parse_legacy(text: &str, source: &Actor) -> Option<ReviewVerdict> {
    let label = LEGACY_DECISION.captures(text)?.get(1)?.as_str();
    let recommendation = Recommendation::from_label(label)?;
    let score: u8 = LEGACY_SCORE.captures(text)?.get(1)?.as_str().parse().ok()?;
    if score > MAX_SCORE {
        return None;
    }
    let reasoning = LEGACY_REASONING
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    Some(ReviewVerdict::new(score, recommendation, reasoning, source.clone()))
}

/// Parse raw oracle output: JSON first (code fences allowed), then the
/// line-oriented `DECISION:` / `SCORE:` form. Never fails; unparseable
/// output yields [`ReviewVerdict::fail_closed`].
pub fn parse_verdict(raw: &str, source: Actor) -> ReviewVerdict {
    let text = strip_code_fences(raw);
    if let Some(verdict) = parse_json(text, &source).or_else(|| parse_legacy(text, &source)) {
        return verdict;
    }

    let preview: String = raw.chars().take(120).collect();
    warn!(source = %source, preview = %preview, "🤖 Unparseable oracle verdict, failing closed");
    ReviewVerdict::fail_closed(source, "oracle output could not be parsed")
}
