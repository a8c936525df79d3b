use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSource {
    Tracker, // issue tracker (GitHub)
    Forum,   // forum (Reddit)
    Tabular, // CSV export
}

impl FeedbackSource {
    pub const ALL: [FeedbackSource; 3] = [Self::Tracker, Self::Forum, Self::Tabular];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tracker => "tracker",
            Self::Forum => "forum",
            Self::Tabular => "tabular",
        }
    }
}

impl fmt::Display for FeedbackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Raw imported item, normalized by a connector. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: String,
    pub session_id: String,
    pub source_ref: String, // ConnectedSource.id it was imported through
    pub source: FeedbackSource,
    pub native_id: String, // e.g. "owner/repo#42", reddit post id, csv row id
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub url: String,
    pub author: String,
    pub created_at: DateTime<Utc>, // as reported by the source
    pub imported_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Lower-cased "title body" text every scorer and tokenizer works on.
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.body).to_lowercase()
    }
}

/// A feedback item as produced by a connector, before it is bound to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackDraft {
    pub source: FeedbackSource,
    pub native_id: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Tracker {
        owner: String,
        repo: String,
        fetch_limit: usize,
    },
    Forum {
        subreddit: String,
        search_query: Option<String>,
        fetch_limit: usize,
    },
    Tabular {
        filename: String,
        row_count: usize,
    },
}

impl SourceConfig {
    pub fn source(&self) -> FeedbackSource {
        match self {
            Self::Tracker { .. } => FeedbackSource::Tracker,
            Self::Forum { .. } => FeedbackSource::Forum,
            Self::Tabular { .. } => FeedbackSource::Tabular,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Tracker { owner, repo, .. } => format!("{}/{}", owner, repo),
            Self::Forum { subreddit, search_query: Some(q), .. } => format!("r/{} ?{}", subreddit, q),
            Self::Forum { subreddit, .. } => format!("r/{}", subreddit),
            Self::Tabular { filename, .. } => filename.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedSource {
    pub id: String,
    pub config: SourceConfig,
    pub last_synced: Option<DateTime<Utc>>,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Ordered so that `max()` yields the most severe level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Most severe first.
    pub const DESCENDING: [Priority; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn is_urgent(&self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => anyhow::bail!("unknown priority '{}' (expected critical|high|medium|low)", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Negative,
    #[default]
    Neutral,
    Positive,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Positive => "positive",
        }
    }

    /// Lenient parse used at the capability boundary ("NEGATIVE", " positive ").
    pub fn parse_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            "positive" => Some(Self::Positive),
            _ => None,
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Bug,
    Feature,
    Performance,
    Ux,
    Documentation,
    Security,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Performance => "performance",
            Self::Ux => "ux",
            Self::Documentation => "documentation",
            Self::Security => "security",
            Self::Other => "other",
        }
    }

    /// Anything outside the known set collapses to `Other`.
    pub fn parse_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "bug" => Self::Bug,
            "feature" => Self::Feature,
            "performance" => Self::Performance,
            "ux" => Self::Ux,
            "documentation" => Self::Documentation,
            "security" => Self::Security,
            _ => Self::Other,
        }
    }

    /// Fallback theme label: category name with the first letter upper-cased.
    pub fn display_label(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    New,
    InReview,
    InProgress,
    Done,
}

impl IssueStatus {
    pub const ALL: [IssueStatus; 4] = [Self::New, Self::InReview, Self::InProgress, Self::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InReview => "in_review",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "new" => Ok(Self::New),
            "in_review" => Ok(Self::InReview),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => anyhow::bail!("unknown status '{}' (expected new|in_review|in_progress|done)", other),
        }
    }
}

/// The analyzed, prioritized, workflow-tracked form of a feedback record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String, // "issue_<feedback id>"
    pub session_id: String,
    pub feedback_id: String,
    pub title: String,
    pub summary: String,
    pub category: Category,
    pub priority: Priority,
    pub priority_reason: String,
    #[serde(default)]
    pub priority_override: bool,
    #[serde(default)]
    pub original_priority: Option<Priority>, // set once an override happens
    pub sentiment_score: f32,                // [-1.0, 1.0]
    pub sentiment_label: SentimentLabel,
    #[serde(default)]
    pub similar_count: Option<usize>, // siblings within the analysis batch
    #[serde(default)]
    pub status: IssueStatus,
    pub source: FeedbackSource,
    #[serde(default)]
    pub source_url: String,
    pub author: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

pub fn issue_id_for(feedback_id: &str) -> String {
    format!("issue_{}", feedback_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    QuickWin,
    Investigate,
    Strategic,
    Monitor,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuickWin => "quick_win",
            Self::Investigate => "investigate",
            Self::Strategic => "strategic",
            Self::Monitor => "monitor",
        }
    }
}

/// Impact/effort scale. Ordered so that sorting descending puts `High` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub kind: InsightType,
    pub title: String,
    pub description: String,
    pub action: String,
    pub impact: Level,
    pub effort: Level,
    pub related_issue_ids: Vec<String>, // at most 5
    pub category: String,
    #[serde(default)]
    pub dismissed: bool,
    pub created_at: DateTime<Utc>,
}

/// Derived on demand from current issues; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ThemeGroup {
    pub id: String, // "theme_<category>" or "theme_all"
    pub category: Option<Category>, // None for the catch-all group
    pub label: String,
    pub description: String,
    pub issue_count: usize,
    pub issues: Vec<Issue>, // sample, at most 10
    pub sentiment: SentimentLabel,
    pub priority: Priority,
}

/// Tiered keyword lists. Tier order is critical -> high -> medium; within a
/// tier the first listed keyword that matches is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityConfig {
    pub critical_keywords: Vec<String>,
    pub high_keywords: Vec<String>,
    pub medium_keywords: Vec<String>,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        fn owned(xs: &[&str]) -> Vec<String> {
            xs.iter().map(|s| s.to_string()).collect()
        }
        Self {
            critical_keywords: owned(&[
                "security", "vulnerability", "exploit", "breach", "leak", "csrf", "xss",
                "injection", "auth bypass", "data loss", "production down", "outage",
            ]),
            high_keywords: owned(&[
                "crash", "broken", "cannot", "blocked", "urgent", "critical", "severe",
                "failing", "error", "bug", "not working", "regression",
            ]),
            medium_keywords: owned(&[
                "slow", "performance", "improve", "enhance", "feature request", "would be nice",
                "suggestion", "consider", "confusing", "unclear",
            ]),
        }
    }
}
