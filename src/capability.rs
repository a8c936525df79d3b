//! Narrow interface to the hosted text models.
//!
//! One operation per capability. Implementations return either a validated,
//! well-formed value or a [`CapabilityError`]; callers in the pipeline own
//! the fallback for every error variant, so nothing here ever reaches the
//! scoring core unchecked.
#![allow(async_fn_in_trait)]

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::api_types::{PolarityReply, SummaryReply, ThemeLabel, ThemesReply};
use crate::models::{Category, SentimentLabel};
use crate::sentiment::Sentiment;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("capability unavailable")]
    Unavailable,
    #[error("capability timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unparseable reply: {0}")]
    Unparseable(String),
}

/// Category + count + sample titles sent for theme labelling.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeDigest {
    pub category: Category,
    pub count: usize,
    pub sample_titles: Vec<String>, // at most 3
}

/// Fields the model left blank stay `None`; the pipeline fills them from
/// the title and `other` one at a time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Summary {
    pub summary: Option<String>,
    pub category: Option<Category>,
}

pub trait Capabilities {
    /// Polarity of already-bounded text.
    async fn polarity(&self, text: &str) -> Result<Sentiment, CapabilityError>;

    /// One-sentence summary plus category for a feedback item.
    async fn summarize(&self, title: &str, body: &str) -> Result<Summary, CapabilityError>;

    /// Friendlier label/description per category.
    async fn label_themes(&self, themes: &[ThemeDigest]) -> Result<Vec<ThemeLabel>, CapabilityError>;

    /// Free-text answer to a fully assembled prompt.
    async fn answer(&self, prompt: &str) -> Result<String, CapabilityError>;
}

/// Capability set used when no model is configured: every call is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl Capabilities for Offline {
    async fn polarity(&self, _text: &str) -> Result<Sentiment, CapabilityError> {
        Err(CapabilityError::Unavailable)
    }

    async fn summarize(&self, _title: &str, _body: &str) -> Result<Summary, CapabilityError> {
        Err(CapabilityError::Unavailable)
    }

    async fn label_themes(&self, _themes: &[ThemeDigest]) -> Result<Vec<ThemeLabel>, CapabilityError> {
        Err(CapabilityError::Unavailable)
    }

    async fn answer(&self, _prompt: &str) -> Result<String, CapabilityError> {
        Err(CapabilityError::Unavailable)
    }
}

static FIRST_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*?\}").expect("valid regex"));
static OUTER_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("valid regex"));

/// Shortest brace-delimited substring; enough for flat single-object replies.
pub fn first_json_object(text: &str) -> Option<&str> {
    FIRST_OBJECT.find(text).map(|m| m.as_str())
}

/// Widest brace-delimited substring; needed when the reply nests objects.
pub fn outer_json_object(text: &str) -> Option<&str> {
    OUTER_OBJECT.find(text).map(|m| m.as_str())
}

fn parse_object<T: DeserializeOwned>(candidate: Option<&str>, raw: &str) -> Result<T, CapabilityError> {
    let json = candidate.ok_or_else(|| CapabilityError::Unparseable(format!("no JSON object in {} chars", raw.len())))?;
    serde_json::from_str(json).map_err(|e| CapabilityError::Unparseable(e.to_string()))
}

/// `{"summary": "...", "category": "..."}`. The object itself must parse;
/// each field is optional and blank counts as missing.
pub fn parse_summary(raw: &str) -> Result<Summary, CapabilityError> {
    let reply: SummaryReply = parse_object(first_json_object(raw), raw)?;
    let present = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    Ok(Summary {
        summary: present(reply.summary),
        category: present(reply.category).map(|c| Category::parse_loose(&c)),
    })
}

/// `{"label": "negative|neutral|positive", "score": 0.0..1.0}`.
pub fn parse_polarity(raw: &str) -> Result<Sentiment, CapabilityError> {
    let reply: PolarityReply = parse_object(first_json_object(raw), raw)?;
    let label = SentimentLabel::parse_loose(&reply.label)
        .ok_or_else(|| CapabilityError::Unparseable(format!("unknown polarity label '{}'", reply.label)))?;
    Ok(Sentiment::from_confidence(label, reply.score.unwrap_or(0.0)))
}

/// `{"themes": [{"category", "label", "description"}, ...]}`. Entries without a
/// category are dropped; an empty result counts as unparseable.
pub fn parse_themes(raw: &str) -> Result<Vec<ThemeLabel>, CapabilityError> {
    let reply: ThemesReply = parse_object(outer_json_object(raw), raw)?;
    let themes: Vec<ThemeLabel> = reply
        .themes
        .ok_or_else(|| CapabilityError::Unparseable("themes array missing".into()))?
        .into_iter()
        .filter(|t| !t.category.trim().is_empty())
        .collect();
    if themes.is_empty() {
        return Err(CapabilityError::Unparseable("themes array empty".into()));
    }
    Ok(themes)
}
