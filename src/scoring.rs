//! Priority scoring.
//!
//! Four additive signals, each with a fixed ceiling:
//!
//! | signal    | points                                   |
//! |-----------|------------------------------------------|
//! | keyword   | 40 critical / 30 high / 20 medium tier   |
//! | sentiment | 30 negative / 10 neutral / 0 positive    |
//! | volume    | 5 per similar sibling, capped at 20      |
//! | urgency   | 10 if any urgency word appears           |
//!
//! The total maps to a band top-down: `>= 60` critical, `>= 40` high,
//! `>= 20` medium, otherwise low. Everything here is a pure function of its
//! arguments.

use serde::Serialize;

use crate::keywords::{first_match, urgency_score, KeywordMatch};
use crate::models::{Priority, PriorityConfig, SentimentLabel};
use crate::sentiment::{sentiment_points, NEGATIVE_POINTS};
use crate::similarity::SimilarityParams;

pub const CRITICAL_THRESHOLD: u32 = 60;
pub const HIGH_THRESHOLD: u32 = 40;
pub const MEDIUM_THRESHOLD: u32 = 20;

pub const LOW_RATIONALE: &str = "Standard priority";
pub const GENERIC_RATIONALE: &str = "Priority factors combined";
pub const FAILED_RATIONALE: &str = "Analysis failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PriorityFactors {
    pub keyword: u32,
    pub sentiment: u32,
    pub volume: u32,
    pub urgency: u32,
    pub total: u32,
}

impl PriorityFactors {
    pub fn new(keyword: u32, sentiment: u32, volume: u32, urgency: u32) -> Self {
        Self {
            keyword,
            sentiment,
            volume,
            urgency,
            total: keyword + sentiment + volume + urgency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub priority: Priority,
    pub rationale: String,
    pub factors: PriorityFactors,
}

/// Inputs that come from outside the text itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct Signals {
    pub sentiment: Option<SentimentLabel>,
    pub similar_count: Option<usize>,
}

pub fn band(total: u32) -> Priority {
    if total >= CRITICAL_THRESHOLD {
        Priority::Critical
    } else if total >= HIGH_THRESHOLD {
        Priority::High
    } else if total >= MEDIUM_THRESHOLD {
        Priority::Medium
    } else {
        Priority::Low
    }
}

pub fn classify(title: &str, body: &str, config: &PriorityConfig, signals: Signals) -> Classification {
    classify_with(title, body, config, signals, &SimilarityParams::default())
}

pub fn classify_with(
    title: &str,
    body: &str,
    config: &PriorityConfig,
    signals: Signals,
    params: &SimilarityParams,
) -> Classification {
    let text = format!("{} {}", title, body).to_lowercase();

    let matched = first_match(&text, config);
    let factors = PriorityFactors::new(
        matched.as_ref().map(KeywordMatch::points).unwrap_or(0),
        sentiment_points(signals.sentiment),
        signals.similar_count.map(|n| params.volume_score(n)).unwrap_or(0),
        urgency_score(&text),
    );

    let priority = band(factors.total);
    let rationale = match priority {
        Priority::Low => LOW_RATIONALE.to_string(),
        _ => rationale(&factors, matched.as_ref(), params),
    };

    Classification { priority, rationale, factors }
}

/// Rationale for bands above low: the contributing factors joined by " + ".
fn rationale(factors: &PriorityFactors, matched: Option<&KeywordMatch>, params: &SimilarityParams) -> String {
    let mut parts = Vec::new();
    if let Some(m) = matched.filter(|_| factors.keyword > 0) {
        parts.push(format!("keyword \"{}\"", m.keyword));
    }
    if factors.sentiment >= NEGATIVE_POINTS {
        parts.push("negative sentiment".to_string());
    }
    if factors.volume > 0 {
        let per = params.points_per_sibling.max(1);
        parts.push(format!("{} similar issues", factors.volume / per));
    }
    if factors.urgency > 0 {
        parts.push("urgency detected".to_string());
    }
    if parts.is_empty() {
        GENERIC_RATIONALE.to_string()
    } else {
        parts.join(" + ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PriorityConfig {
        PriorityConfig::default()
    }

    #[test]
    fn end_to_end_critical_example() {
        let c = classify(
            "App crashes on login — URGENT",
            "this is a security issue, data loss occurred",
            &cfg(),
            Signals { sentiment: Some(SentimentLabel::Negative), similar_count: Some(3) },
        );
        assert_eq!(c.factors, PriorityFactors::new(40, 30, 15, 10));
        assert_eq!(c.factors.total, 95);
        assert_eq!(c.priority, Priority::Critical);
        assert_eq!(
            c.rationale,
            "keyword \"security\" + negative sentiment + 3 similar issues + urgency detected"
        );
    }

    #[test]
    fn plain_item_is_low_with_standard_rationale() {
        let c = classify("Minor typo in docs", "", &cfg(), Signals::default());
        assert_eq!(c.factors, PriorityFactors::default());
        assert_eq!(c.priority, Priority::Low);
        assert_eq!(c.rationale, "Standard priority");
    }

    #[test]
    fn band_boundaries_are_inclusive() {
        assert_eq!(band(60), Priority::Critical);
        assert_eq!(band(59), Priority::High);
        assert_eq!(band(40), Priority::High);
        assert_eq!(band(39), Priority::Medium);
        assert_eq!(band(20), Priority::Medium);
        assert_eq!(band(19), Priority::Low);
        assert_eq!(band(0), Priority::Low);
    }

    #[test]
    fn total_is_exact_sum_of_factors() {
        let c = classify(
            "blocking crash",
            "the editor is broken",
            &cfg(),
            Signals { sentiment: Some(SentimentLabel::Neutral), similar_count: Some(9) },
        );
        let f = c.factors;
        assert_eq!(f.total, f.keyword + f.sentiment + f.volume + f.urgency);
        assert_eq!(f, PriorityFactors::new(30, 10, 20, 10));
        assert_eq!(c.priority, Priority::Critical);
    }

    #[test]
    fn classification_is_deterministic() {
        let signals = Signals { sentiment: Some(SentimentLabel::Negative), similar_count: Some(2) };
        let a = classify("Search is slow", "takes ages, please improve", &cfg(), signals);
        let b = classify("Search is slow", "takes ages, please improve", &cfg(), signals);
        assert_eq!(a, b);
    }

    #[test]
    fn neutral_sentiment_alone_does_not_appear_in_rationale() {
        // 20 (medium keyword) + 10 (neutral) = 30 -> medium
        let c = classify(
            "Feature request",
            "dark mode",
            &cfg(),
            Signals { sentiment: Some(SentimentLabel::Neutral), similar_count: None },
        );
        assert_eq!(c.priority, Priority::Medium);
        assert_eq!(c.rationale, "keyword \"feature request\"");
    }

    #[test]
    fn volume_alone_can_lift_an_item_out_of_low() {
        let empty = PriorityConfig { critical_keywords: vec![], high_keywords: vec![], medium_keywords: vec![] };
        let c = classify(
            "hello",
            "",
            &empty,
            Signals { sentiment: Some(SentimentLabel::Neutral), similar_count: Some(2) },
        );
        assert_eq!(c.factors.total, 20);
        assert_eq!(c.priority, Priority::Medium);
        assert_eq!(c.rationale, "2 similar issues");
    }

    #[test]
    fn generic_rationale_when_no_part_applies() {
        let params = SimilarityParams::default();
        let only_neutral = PriorityFactors::new(0, 10, 0, 0);
        assert_eq!(rationale(&only_neutral, None, &params), GENERIC_RATIONALE);
    }

    #[test]
    fn urgency_and_keyword_double_credit() {
        let c = classify("urgent crash", "", &cfg(), Signals::default());
        assert_eq!(c.factors.keyword, 30);
        assert_eq!(c.factors.urgency, 10);
        assert_eq!(c.priority, Priority::High);
        assert_eq!(c.rationale, "keyword \"crash\" + urgency detected");
    }

    #[test]
    fn missing_similar_count_contributes_nothing() {
        let c = classify("crash", "", &cfg(), Signals { sentiment: None, similar_count: None });
        assert_eq!(c.factors.volume, 0);
        let c = classify("crash", "", &cfg(), Signals { sentiment: None, similar_count: Some(0) });
        assert_eq!(c.factors.volume, 0);
    }
}
