use serde::{Deserialize, Serialize};

/* Tracker (GitHub REST v3) */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<GitHubUser>,
    pub created_at: String, // RFC 3339
    pub html_url: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>, // present only on PRs
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

/* Forum (Reddit listing JSON) */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing {
    pub data: RedditListingData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData {
    #[serde(default)]
    pub children: Vec<RedditChild>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditChild {
    pub data: RedditPost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: String,
    pub created_utc: f64, // unix seconds
    pub permalink: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
}

/* Capability replies (model output, parsed leniently then validated) */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReply {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolarityReply {
    pub label: String,
    #[serde(default)]
    pub score: Option<f32>, // confidence, unsigned
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemesReply {
    #[serde(default)]
    pub themes: Option<Vec<ThemeLabel>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThemeLabel {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
