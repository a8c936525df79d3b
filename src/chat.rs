use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::capability::{Capabilities, CapabilityError};
use crate::insights::IssueStats;
use crate::models::Issue;
use crate::prompts::user_chat;

/// Issues quoted to the model.
pub const SAMPLE_ISSUES: usize = 15;
/// Most recent turns carried into the prompt.
pub const HISTORY_TURNS: usize = 4;

pub const EMPTY_REPLY: &str = "No feedback has been analyzed yet. Import and analyze some feedback first.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Answers a question about the analyzed issues. Never fails: when the
/// capability is unavailable, errors, times out or answers empty, the
/// rule-based reply is used.
pub async fn ask<C: Capabilities>(
    cap: &C,
    question: &str,
    issues: &[Issue],
    history: &[ChatMessage],
    limit: Duration,
) -> String {
    if issues.is_empty() {
        return EMPTY_REPLY.to_string();
    }

    let stats = IssueStats::from_issues(issues);
    let sample: Vec<&Issue> = issues.iter().take(SAMPLE_ISSUES).collect();
    let recent = &history[history.len().saturating_sub(HISTORY_TURNS)..];
    let prompt = user_chat(&stats, &sample, recent, question);

    let outcome = match tokio::time::timeout(limit, cap.answer(&prompt)).await {
        Ok(res) => res,
        Err(_) => Err(CapabilityError::Timeout { timeout_ms: limit.as_millis() as u64 }),
    };

    match outcome {
        Ok(answer) if !answer.trim().is_empty() => {
            info!("Chat answered - question_chars={}, answer_chars={}", question.len(), answer.len());
            answer.trim().to_string()
        }
        Ok(_) | Err(CapabilityError::Unavailable) => fallback_answer(question, &stats, &sample),
        Err(e) => {
            warn!("Chat fallback - error={}", e);
            fallback_answer(question, &stats, &sample)
        }
    }
}

fn mentions(q: &str, words: &[&str]) -> bool {
    words.iter().any(|w| q.contains(w))
}

/// Keyword-triggered answer built from the aggregate counts alone.
pub fn fallback_answer(question: &str, stats: &IssueStats, sample: &[&Issue]) -> String {
    let q = question.to_lowercase();

    if mentions(&q, &["top", "priority", "prioritize", "urgent"]) {
        if stats.urgent() > 0 {
            let top: Vec<String> = sample
                .iter()
                .filter(|i| i.priority.is_urgent())
                .take(3)
                .map(|i| format!("\"{}\"", i.title))
                .collect();
            return format!(
                "You have {} critical and {} high priority issues. Top ones: {}. Focus on these first.",
                stats.critical,
                stats.high,
                top.join(", ")
            );
        }
        return format!(
            "No critical or high priority issues found. Your {} issues are mostly medium/low priority.",
            stats.total
        );
    }

    if mentions(&q, &["summary", "summarize", "overview"]) {
        let mood = if stats.negative > stats.positive {
            "mostly negative"
        } else if stats.positive > stats.negative {
            "mostly positive"
        } else {
            "mixed"
        };
        let top = stats
            .ranked_categories()
            .first()
            .map(|(c, n)| format!(" Most common category: {} ({} issues).", c, n))
            .unwrap_or_default();
        return format!(
            "{} issues analyzed. Sentiment is {}.{} {} critical, {} high priority.",
            stats.total, mood, top, stats.critical, stats.high
        );
    }

    if mentions(&q, &["pattern", "common", "theme", "trend"]) {
        let ranked = stats.ranked_categories();
        if ranked.is_empty() {
            return "No clear patterns identified yet. Need more feedback to detect trends.".to_string();
        }
        let listed: Vec<String> = ranked.iter().take(3).map(|(c, n)| format!("{} ({})", c, n)).collect();
        let mut reply = format!("Common patterns: {}.", listed.join(", "));
        if stats.negative as f64 > stats.total as f64 / 2.0 {
            reply.push_str(" High negative sentiment suggests user frustration.");
        }
        return reply;
    }

    if mentions(&q, &["how", "computed", "work", "rationale", "algorithm", "calculate"]) {
        return "Priority is computed with a multi-factor score (0-100 points): \
                Keywords (up to 40) - matches like \"crash\", \"broken\", \"security\" raise priority. \
                Sentiment (up to 30) - a negative tone adds weight. \
                Volume (up to 20) - similar issues in the same batch add 5 points each. \
                Urgency words (10) - \"urgent\", \"asap\", \"blocking\". \
                60+ is critical, 40+ high, 20+ medium, otherwise low. \
                Categories and sentiment come from the configured language model."
            .to_string();
    }

    format!(
        "Based on {} issues: {} critical, {} high, {} medium priority. \
         Ask about \"top issues\", \"summary\", \"patterns\", or \"how it works\" for more details.",
        stats.total, stats.critical, stats.high, stats.medium
    )
}
