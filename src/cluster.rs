use tracing::debug;

use crate::api_types::ThemeLabel;
use crate::capability::ThemeDigest;
use crate::models::{Category, Issue, Priority, SentimentLabel, ThemeGroup};

#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    pub min_members: usize,   // categories below this are not a theme (2)
    pub max_members: usize,   // issues carried per group (10)
    pub sample_titles: usize, // titles sent for labelling (3)
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self { min_members: 2, max_members: 10, sample_titles: 3 }
    }
}

/// Issues grouped by category, groups in order of first appearance.
pub fn group_by_category(issues: &[Issue]) -> Vec<(Category, Vec<&Issue>)> {
    let mut groups: Vec<(Category, Vec<&Issue>)> = Vec::new();
    for issue in issues {
        match groups.iter_mut().find(|(c, _)| *c == issue.category) {
            Some((_, members)) => members.push(issue),
            None => groups.push((issue.category, vec![issue])),
        }
    }
    groups
}

pub fn qualifying_groups<'a>(issues: &'a [Issue], params: &ClusterParams) -> Vec<(Category, Vec<&'a Issue>)> {
    group_by_category(issues)
        .into_iter()
        .filter(|(_, members)| members.len() >= params.min_members)
        .collect()
}

pub fn theme_digests(groups: &[(Category, Vec<&Issue>)], params: &ClusterParams) -> Vec<ThemeDigest> {
    groups
        .iter()
        .map(|(category, members)| ThemeDigest {
            category: *category,
            count: members.len(),
            sample_titles: members.iter().take(params.sample_titles).map(|i| i.title.clone()).collect(),
        })
        .collect()
}

/// Plurality of negative/neutral/positive; any tie for the top count is neutral.
pub fn aggregate_sentiment<'a>(members: impl IntoIterator<Item = &'a Issue>) -> SentimentLabel {
    let (mut neg, mut neu, mut pos) = (0usize, 0usize, 0usize);
    for m in members {
        match m.sentiment_label {
            SentimentLabel::Negative => neg += 1,
            SentimentLabel::Neutral => neu += 1,
            SentimentLabel::Positive => pos += 1,
        }
    }
    if neg > neu && neg > pos {
        SentimentLabel::Negative
    } else if pos > neu && pos > neg {
        SentimentLabel::Positive
    } else {
        SentimentLabel::Neutral
    }
}

/// Escalation, not an average: one critical member makes the theme critical.
pub fn aggregate_priority<'a>(members: impl IntoIterator<Item = &'a Issue>) -> Priority {
    let worst = members.into_iter().map(|m| m.priority).max();
    match worst {
        Some(p @ (Priority::Critical | Priority::High)) => p,
        _ => Priority::Medium,
    }
}

fn group(category: Category, members: &[&Issue], label: String, description: String, params: &ClusterParams) -> ThemeGroup {
    ThemeGroup {
        id: format!("theme_{}", category),
        category: Some(category),
        label,
        description,
        issue_count: members.len(),
        issues: members.iter().take(params.max_members).map(|i| (*i).clone()).collect(),
        sentiment: aggregate_sentiment(members.iter().copied()),
        priority: aggregate_priority(members.iter().copied()),
    }
}

/// Theme groups for the current issue set. `labels` are the externally
/// generated labels, if any; categories they do not cover (or cover without
/// a label) get the deterministic fallback.
pub fn build_themes(issues: &[Issue], labels: Option<&[ThemeLabel]>, params: &ClusterParams) -> Vec<ThemeGroup> {
    if issues.is_empty() {
        return Vec::new();
    }

    let groups = qualifying_groups(issues, params);
    if groups.is_empty() {
        return vec![catch_all(issues, params)];
    }

    let themes: Vec<ThemeGroup> = groups
        .iter()
        .map(|(category, members)| {
            let found = labels
                .unwrap_or_default()
                .iter()
                .find(|l| Category::parse_loose(&l.category) == *category);
            match found {
                Some(l) => {
                    let label = l
                        .label
                        .clone()
                        .filter(|s| !s.trim().is_empty())
                        .unwrap_or_else(|| category.to_string());
                    let description = l
                        .description
                        .clone()
                        .filter(|s| !s.trim().is_empty())
                        .unwrap_or_else(|| format!("{} related issues", members.len()));
                    group(*category, members, label, description, params)
                }
                None => group(
                    *category,
                    members,
                    category.display_label(),
                    format!("{} {} issues", members.len(), category),
                    params,
                ),
            }
        })
        .collect();

    debug!(
        "Theme grouping - issues={}, themes={}, labelled={}",
        issues.len(),
        themes.len(),
        labels.map(|l| l.len()).unwrap_or(0)
    );
    themes
}

fn catch_all(issues: &[Issue], params: &ClusterParams) -> ThemeGroup {
    ThemeGroup {
        id: "theme_all".to_string(),
        category: None,
        label: "All Feedback".to_string(),
        description: format!("{} items imported", issues.len()),
        issue_count: issues.len(),
        issues: issues.iter().take(params.max_members).cloned().collect(),
        sentiment: aggregate_sentiment(issues),
        priority: aggregate_priority(issues),
    }
}
