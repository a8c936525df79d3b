use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::api_types::{GitHubIssue, RedditListing};
use crate::models::{FeedbackDraft, FeedbackSource, SourceConfig};

const USER_AGENT: &str = concat!("feedback-triage/", env!("CARGO_PKG_VERSION"));
const GITHUB_PAGE_MAX: usize = 100;

pub fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("build HTTP client")
}

/// `owner/repo` or a github.com URL (extra path segments and `.git` ignored).
pub fn parse_repo_reference(input: &str) -> Result<(String, String)> {
    let input = input.trim();
    let path = if input.contains("://") {
        let url = Url::parse(input).with_context(|| format!("Invalid repository URL '{}'", input))?;
        match url.host_str() {
            Some("github.com") | Some("www.github.com") => url.path().to_string(),
            _ => bail!("Invalid repository reference '{}': expected a github.com URL", input),
        }
    } else {
        input.trim_start_matches("github.com/").to_string()
    };

    let mut parts = path.trim_matches('/').split('/').filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) => {
            let repo = repo.trim_end_matches(".git");
            if repo.is_empty() {
                bail!("Invalid repository reference '{}': expected owner/repo", input);
            }
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => bail!("Invalid repository reference '{}': expected owner/repo", input),
    }
}

/// Subreddit name without `r/` or `/r/` and without surrounding slashes.
pub fn normalize_subreddit(input: &str) -> Result<String> {
    let name = input.trim().trim_start_matches('/');
    let name = name.strip_prefix("r/").unwrap_or(name).trim_matches('/');
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("Invalid subreddit '{}'", input);
    }
    Ok(name.to_string())
}

pub fn github_issues_url(owner: &str, repo: &str, limit: usize) -> Result<Url> {
    let base = format!("https://api.github.com/repos/{}/{}/issues", owner, repo);
    let per_page = limit.clamp(1, GITHUB_PAGE_MAX).to_string();
    Url::parse_with_params(
        &base,
        &[("state", "all"), ("per_page", per_page.as_str()), ("sort", "created"), ("direction", "desc")],
    )
    .context("build GitHub URL")
}

pub fn reddit_url(subreddit: &str, query: Option<&str>, limit: usize) -> Result<Url> {
    let limit = limit.max(1).to_string();
    let url = match query.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => Url::parse_with_params(
            &format!("https://www.reddit.com/r/{}/search.json", subreddit),
            &[("q", q), ("restrict_sr", "1"), ("limit", limit.as_str()), ("sort", "new")],
        ),
        None => Url::parse_with_params(
            &format!("https://www.reddit.com/r/{}/new.json", subreddit),
            &[("limit", limit.as_str())],
        ),
    };
    url.context("build Reddit URL")
}

/// Issues become drafts; pull requests are dropped.
pub fn tracker_drafts(owner: &str, repo: &str, issues: Vec<GitHubIssue>, now: DateTime<Utc>) -> Vec<FeedbackDraft> {
    issues
        .into_iter()
        .filter(|i| i.pull_request.is_none())
        .map(|i| FeedbackDraft {
            source: FeedbackSource::Tracker,
            native_id: format!("{}/{}#{}", owner, repo, i.number),
            title: i.title.trim().to_string(),
            body: i.body.unwrap_or_default(),
            url: i.html_url,
            author: i.user.map(|u| u.login).unwrap_or_else(|| "unknown".to_string()),
            created_at: DateTime::parse_from_rfc3339(&i.created_at)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or(now),
        })
        .collect()
}

pub fn forum_drafts(listing: RedditListing, now: DateTime<Utc>) -> Vec<FeedbackDraft> {
    listing
        .data
        .children
        .into_iter()
        .map(|c| c.data)
        .map(|p| FeedbackDraft {
            source: FeedbackSource::Forum,
            native_id: p.id,
            title: p.title.trim().to_string(),
            body: p.selftext,
            url: format!("https://reddit.com{}", p.permalink),
            author: if p.author.is_empty() { "unknown".to_string() } else { p.author },
            created_at: Utc.timestamp_opt(p.created_utc as i64, 0).single().unwrap_or(now),
        })
        .collect()
}

pub async fn fetch_github_issues(client: &Client, owner: &str, repo: &str, limit: usize) -> Result<Vec<FeedbackDraft>> {
    let url = github_issues_url(owner, repo, limit)?;
    let start = std::time::Instant::now();

    debug!("Fetching tracker issues - repo={}/{}, limit={}", owner, repo, limit);

    let resp = client
        .get(url.clone())
        .header("Accept", "application/vnd.github.v3+json")
        .send()
        .await
        .context("Failed to connect to GitHub. Please check your connection.")?;

    match resp.status() {
        s if s.is_success() => {}
        StatusCode::NOT_FOUND => bail!("Repository not found. Make sure it exists and is public."),
        StatusCode::FORBIDDEN => bail!("Rate limited. Please try again later."),
        s => bail!("GitHub API error: {}", s.as_u16()),
    }

    let issues: Vec<GitHubIssue> = resp.json().await.with_context(|| format!("Decoding JSON for {}", url))?;
    let fetched = issues.len();
    let drafts = tracker_drafts(owner, repo, issues, Utc::now());

    info!(
        "Tracker fetch completed - repo={}/{}, duration={:.2}s, fetched={}, issues={}",
        owner,
        repo,
        start.elapsed().as_secs_f32(),
        fetched,
        drafts.len()
    );
    Ok(drafts)
}

pub async fn fetch_reddit_posts(
    client: &Client,
    subreddit: &str,
    query: Option<&str>,
    limit: usize,
) -> Result<Vec<FeedbackDraft>> {
    let url = reddit_url(subreddit, query, limit)?;
    let start = std::time::Instant::now();

    debug!("Fetching forum posts - subreddit={}, query={:?}, limit={}", subreddit, query, limit);

    let resp = client
        .get(url.clone())
        .send()
        .await
        .context("Failed to connect to Reddit. Please check your connection.")?;

    match resp.status() {
        s if s.is_success() => {}
        StatusCode::NOT_FOUND => bail!("Subreddit not found or is private."),
        StatusCode::FORBIDDEN => bail!("Access denied. The subreddit may be private or banned."),
        StatusCode::TOO_MANY_REQUESTS => bail!("Rate limited by Reddit. Please try again later."),
        s => bail!("Reddit API error: {}", s.as_u16()),
    }

    let listing: RedditListing = resp.json().await.with_context(|| format!("Decoding JSON for {}", url))?;
    let drafts = forum_drafts(listing, Utc::now());

    info!(
        "Forum fetch completed - subreddit={}, duration={:.2}s, posts={}",
        subreddit,
        start.elapsed().as_secs_f32(),
        drafts.len()
    );
    Ok(drafts)
}

/// Re-fetches a connected source. CSV sources carry no remote to sync from.
pub async fn fetch_source(client: &Client, config: &SourceConfig) -> Result<Vec<FeedbackDraft>> {
    match config {
        SourceConfig::Tracker { owner, repo, fetch_limit } => fetch_github_issues(client, owner, repo, *fetch_limit).await,
        SourceConfig::Forum { subreddit, search_query, fetch_limit } => {
            fetch_reddit_posts(client, subreddit, search_query.as_deref(), *fetch_limit).await
        }
        SourceConfig::Tabular { filename, .. } => {
            warn!("Sync requested for CSV source - file={}", filename);
            bail!("CSV sources cannot be synced; import the file again instead")
        }
    }
}
