use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::models::{
    Category, FeedbackSource, Insight, InsightType, Issue, IssueStatus, Level, Priority, SentimentLabel,
};

const RELATED_SAMPLE: usize = 5;
const DOMINANT_MIN_MEMBERS: usize = 3;
const NEGATIVE_MIN_ISSUES: usize = 5;

/// Aggregate counts over a set of issues.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueStats {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub negative: usize,
    pub neutral: usize,
    pub positive: usize,
    /// Categories in order of first appearance.
    pub by_category: Vec<(Category, usize)>,
    pub by_status: Vec<(IssueStatus, usize)>,
    pub by_source: Vec<(FeedbackSource, usize)>,
}

impl IssueStats {
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut stats = IssueStats {
            total: issues.len(),
            by_status: IssueStatus::ALL.iter().map(|s| (*s, 0)).collect(),
            by_source: FeedbackSource::ALL.iter().map(|s| (*s, 0)).collect(),
            ..Default::default()
        };

        for issue in issues {
            match issue.priority {
                Priority::Critical => stats.critical += 1,
                Priority::High => stats.high += 1,
                Priority::Medium => stats.medium += 1,
                Priority::Low => stats.low += 1,
            }
            match issue.sentiment_label {
                SentimentLabel::Negative => stats.negative += 1,
                SentimentLabel::Neutral => stats.neutral += 1,
                SentimentLabel::Positive => stats.positive += 1,
            }
            match stats.by_category.iter_mut().find(|(c, _)| *c == issue.category) {
                Some((_, n)) => *n += 1,
                None => stats.by_category.push((issue.category, 1)),
            }
            if let Some((_, n)) = stats.by_status.iter_mut().find(|(s, _)| *s == issue.status) {
                *n += 1;
            }
            if let Some((_, n)) = stats.by_source.iter_mut().find(|(s, _)| *s == issue.source) {
                *n += 1;
            }
        }
        stats
    }

    pub fn count(&self, priority: Priority) -> usize {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    pub fn urgent(&self) -> usize {
        self.critical + self.high
    }

    /// Categories by descending size; ties keep first-appearance order.
    pub fn ranked_categories(&self) -> Vec<(Category, usize)> {
        self.by_category
            .iter()
            .copied()
            .sorted_by(|a, b| b.1.cmp(&a.1))
            .collect()
    }

    pub fn top_named_category(&self) -> Option<(Category, usize)> {
        self.ranked_categories().into_iter().find(|(c, _)| *c != Category::Other)
    }

    pub fn negative_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.negative as f64 / self.total as f64
        }
    }
}

pub fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as u32
}

fn related(issues: &[Issue], keep: impl Fn(&Issue) -> bool) -> Vec<String> {
    issues.iter().filter(|i| keep(i)).take(RELATED_SAMPLE).map(|i| i.id.clone()).collect()
}

/// Templated recommendations. Each rule fires independently; a rule whose
/// trigger is false emits nothing.
pub fn generate_insights(issues: &[Issue], now: DateTime<Utc>) -> Vec<Insight> {
    if issues.is_empty() {
        return Vec::new();
    }

    let stats = IssueStats::from_issues(issues);
    let stamp = now.timestamp_millis();
    let mut insights = Vec::new();

    let urgent = stats.urgent();
    if urgent > 0 {
        insights.push(Insight {
            id: format!("insight_urgent_{}", stamp),
            kind: InsightType::QuickWin,
            title: format!("{} urgent issues need attention", urgent),
            description: format!(
                "You have {} critical and {} high priority issues.",
                stats.critical, stats.high
            ),
            action: "Review and triage these issues first.".to_string(),
            impact: Level::High,
            effort: Level::Low,
            related_issue_ids: related(issues, |i| i.priority.is_urgent()),
            category: "priority".to_string(),
            dismissed: false,
            created_at: now,
        });
    }

    if let Some((top, count)) = stats.top_named_category().filter(|(_, n)| *n >= DOMINANT_MIN_MEMBERS) {
        insights.push(Insight {
            id: format!("insight_category_{}", stamp),
            kind: InsightType::Strategic,
            title: format!("{} issues are most common ({}%)", top, percent(count, stats.total)),
            description: format!("{} of {} issues are related to {}.", count, stats.total, top),
            action: format!("Consider prioritizing {} improvements in your roadmap.", top),
            impact: Level::Medium,
            effort: Level::Medium,
            related_issue_ids: related(issues, |i| i.category == top),
            category: top.to_string(),
            dismissed: false,
            created_at: now,
        });
    }

    let ratio = stats.negative_ratio();
    if ratio > 0.5 && stats.total >= NEGATIVE_MIN_ISSUES {
        insights.push(Insight {
            id: format!("insight_sentiment_{}", stamp),
            kind: InsightType::Investigate,
            title: format!("High negative sentiment ({}%)", (ratio * 100.0).round() as u32),
            description: "Most feedback expresses frustration or dissatisfaction.".to_string(),
            action: "Focus on addressing pain points before adding new features.".to_string(),
            impact: Level::High,
            effort: Level::Medium,
            related_issue_ids: related(issues, |i| i.sentiment_label == SentimentLabel::Negative),
            category: "sentiment".to_string(),
            dismissed: false,
            created_at: now,
        });
    }

    insights
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub label: String,
    pub value: String,
}

/// Headline, a few metrics and one recommendation; no model calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickSummary {
    pub headline: String,
    pub metrics: Vec<Metric>,
    pub recommendation: String,
}

fn plural(n: usize) -> &'static str {
    if n > 1 {
        "s"
    } else {
        ""
    }
}

fn metric(label: impl Into<String>, value: impl Into<String>) -> Metric {
    Metric { label: label.into(), value: value.into() }
}

pub fn quick_summary(issues: &[Issue]) -> QuickSummary {
    if issues.is_empty() {
        return QuickSummary {
            headline: "No feedback analyzed yet".to_string(),
            metrics: Vec::new(),
            recommendation: "Import and analyze feedback to get started.".to_string(),
        };
    }

    let stats = IssueStats::from_issues(issues);
    let top = stats.top_named_category();

    let mut metrics = vec![metric("Total", stats.total.to_string())];
    if stats.urgent() > 0 {
        metrics.push(metric("Priority", format!("{} crit, {} high", stats.critical, stats.high)));
    } else {
        metrics.push(metric("Priority", format!("{} med, {} low", stats.medium, stats.low)));
    }
    match top {
        Some((cat, n)) => metrics.push(metric(cat.as_str(), format!("{} ({}%)", n, percent(n, stats.total)))),
        None => metrics.push(metric("Sentiment", format!("{} neg, {} pos", stats.negative, stats.positive))),
    }

    let headline = if stats.critical > 0 {
        format!("{} critical issue{} require immediate attention", stats.critical, plural(stats.critical))
    } else if stats.high > 0 {
        format!("{} high priority issue{} to review", stats.high, plural(stats.high))
    } else if let Some((cat, n)) = top.filter(|(_, n)| (*n as f64) >= stats.total as f64 * 0.3) {
        format!("{} is the dominant theme ({}%)", cat, percent(n, stats.total))
    } else {
        format!("{} feedback items analyzed", stats.total)
    };

    let recommendation = if stats.critical > 0 {
        format!("Start with the {} critical issue{}.", stats.critical, plural(stats.critical))
    } else if stats.high > 0 {
        format!("Triage the {} high priority item{}.", stats.high, plural(stats.high))
    } else if let Some((cat, _)) = top {
        format!("Focus on {} improvements.", cat)
    } else if stats.negative as f64 > stats.total as f64 / 2.0 {
        "Address negative feedback to improve satisfaction.".to_string()
    } else {
        "Review and categorize items for better insights.".to_string()
    };

    QuickSummary { headline, metrics, recommendation }
}
