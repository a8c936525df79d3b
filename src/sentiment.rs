use serde::{Deserialize, Serialize};

use crate::models::SentimentLabel;

pub const NEGATIVE_POINTS: u32 = 30;
pub const NEUTRAL_POINTS: u32 = 10;

/// Polarity signal as returned by the sentiment capability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: f32, // signed: negative labels carry a negative score
}

impl Sentiment {
    pub fn neutral() -> Self {
        Self { label: SentimentLabel::Neutral, score: 0.0 }
    }

    /// Builds a signed reading from a label and an unsigned confidence.
    pub fn from_confidence(label: SentimentLabel, confidence: f32) -> Self {
        let c = if confidence.is_finite() { confidence.abs().min(1.0) } else { 0.0 };
        let score = match label {
            SentimentLabel::Negative => -c,
            SentimentLabel::Positive => c,
            SentimentLabel::Neutral => 0.0,
        };
        Self { label, score }
    }
}

impl Default for Sentiment {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Fixed contribution of a polarity label to the priority score.
/// Unknown or unavailable sentiment contributes nothing.
pub fn sentiment_points(label: Option<SentimentLabel>) -> u32 {
    match label {
        Some(SentimentLabel::Negative) => NEGATIVE_POINTS,
        Some(SentimentLabel::Neutral) => NEUTRAL_POINTS,
        Some(SentimentLabel::Positive) | None => 0,
    }
}
