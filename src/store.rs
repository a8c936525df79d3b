//! Per-session JSON document store.
//!
//! Each session lives in `<data_dir>/<session>.json`. Every mutating
//! operation loads the document, applies the change and writes it back
//! through a temp file + rename, so a failed operation never leaves a
//! partially written session behind.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::chat::ChatMessage;
use crate::models::{
    Category, ConnectedSource, FeedbackDraft, FeedbackRecord, FeedbackSource, Insight, Issue, IssueStatus, Priority,
    PriorityConfig, SourceConfig,
};

/// Chat turns kept on disk; only the last few are ever sent.
const CHAT_RETAINED: usize = 20;

pub const RESET_REASON: &str = "Reset to system-computed priority";

static SESSION_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid regex"));

pub fn validate_session_id(session: &str) -> Result<()> {
    if !SESSION_ID.is_match(session) {
        bail!("Invalid session id '{}': use 1-64 letters, digits, '-' or '_'", session);
    }
    Ok(())
}

/// Stable id so re-importing the same item is a no-op.
pub fn feedback_id_for(session: &str, source: FeedbackSource, native_id: &str) -> String {
    format!("fb_{:016x}", xxh3_64(format!("{}|{}|{}", session, source, native_id).as_bytes()))
}

fn source_id_for(session: &str, config: &SourceConfig) -> String {
    format!(
        "src_{:016x}",
        xxh3_64(format!("{}|{}|{}", session, config.source(), config.describe()).as_bytes())
    )
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub sources: Vec<ConnectedSource>,
    #[serde(default)]
    pub feedback: Vec<FeedbackRecord>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default)]
    pub priority_config: PriorityConfig,
    #[serde(default)]
    pub chat: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    pub inserted: usize,
    pub skipped: usize, // already present
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Removed {
    pub feedback: usize,
    pub issues: usize,
}

/// Listing filter; `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub priority: Option<Priority>,
    pub status: Option<IssueStatus>,
    pub category: Option<Category>,
    pub source: Option<FeedbackSource>,
}

impl IssueFilter {
    fn matches(&self, issue: &Issue) -> bool {
        self.priority.map_or(true, |p| issue.priority == p)
            && self.status.map_or(true, |s| issue.status == s)
            && self.category.map_or(true, |c| issue.category == c)
            && self.source.map_or(true, |s| issue.source == s)
    }
}

pub struct SessionStore {
    session: String,
    path: PathBuf,
}

impl SessionStore {
    pub fn open(data_dir: impl AsRef<Path>, session: &str) -> Result<Self> {
        validate_session_id(session)?;
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
        Ok(Self { session: session.to_string(), path: dir.join(format!("{}.json", session)) })
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<SessionData> {
        if !self.path.exists() {
            return Ok(SessionData::default());
        }
        let raw = fs::read(&self.path).with_context(|| format!("read {:?}", self.path))?;
        serde_json::from_slice(&raw).with_context(|| format!("decode session {:?}", self.path))
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(data)?).with_context(|| format!("write {:?}", tmp))?;
        fs::rename(&tmp, &self.path).with_context(|| format!("replace {:?}", self.path))?;
        Ok(())
    }

    /// Load, mutate, save. Nothing is written when `f` fails.
    fn update<T>(&self, f: impl FnOnce(&mut SessionData) -> Result<T>) -> Result<T> {
        let mut data = self.load()?;
        let out = f(&mut data)?;
        self.save(&data)?;
        Ok(out)
    }

    // ---------- sources ----------

    /// Registers (or re-uses) the source and stores its drafts in one write.
    pub fn import(&self, config: SourceConfig, drafts: Vec<FeedbackDraft>) -> Result<(ConnectedSource, ImportOutcome)> {
        let session = self.session.clone();
        self.update(|data| {
            let now = Utc::now();
            let source_id = source_id_for(&session, &config);
            if !data.sources.iter().any(|s| s.id == source_id) {
                data.sources.push(ConnectedSource {
                    id: source_id.clone(),
                    config: config.clone(),
                    last_synced: None,
                    item_count: 0,
                    created_at: now,
                });
            }

            let mut known: HashSet<String> = data.feedback.iter().map(|f| f.id.clone()).collect();
            let mut outcome = ImportOutcome::default();
            for d in drafts {
                let id = feedback_id_for(&session, d.source, &d.native_id);
                if !known.insert(id.clone()) {
                    outcome.skipped += 1;
                    continue;
                }
                data.feedback.push(FeedbackRecord {
                    id,
                    session_id: session.clone(),
                    source_ref: source_id.clone(),
                    source: d.source,
                    native_id: d.native_id,
                    title: d.title,
                    body: d.body,
                    url: d.url,
                    author: d.author,
                    created_at: d.created_at,
                    imported_at: now,
                });
                outcome.inserted += 1;
            }

            let count = data.feedback.iter().filter(|f| f.source_ref == source_id).count();
            let source = data
                .sources
                .iter_mut()
                .find(|s| s.id == source_id)
                .context("source vanished during import")?;
            source.config = config;
            source.last_synced = Some(now);
            source.item_count = count;

            info!(
                "Import stored - session={}, source={}, inserted={}, skipped={}",
                session, source_id, outcome.inserted, outcome.skipped
            );
            Ok((source.clone(), outcome))
        })
    }

    /// Newest first.
    pub fn sources(&self) -> Result<Vec<ConnectedSource>> {
        let mut sources = self.load()?.sources;
        sources.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sources)
    }

    pub fn source(&self, id: &str) -> Result<ConnectedSource> {
        match self.load()?.sources.into_iter().find(|s| s.id == id) {
            Some(s) => Ok(s),
            None => bail!("Unknown source '{}' in session '{}'", id, self.session),
        }
    }

    /// Drops the source, its feedback and every issue derived from it.
    pub fn remove_source(&self, id: &str) -> Result<Removed> {
        self.update(|data| {
            if !data.sources.iter().any(|s| s.id == id) {
                bail!("Unknown source '{}'", id);
            }
            let doomed: HashSet<String> =
                data.feedback.iter().filter(|f| f.source_ref == id).map(|f| f.id.clone()).collect();

            let issues_before = data.issues.len();
            data.issues.retain(|i| !doomed.contains(&i.feedback_id));
            data.feedback.retain(|f| f.source_ref != id);
            data.sources.retain(|s| s.id != id);

            let removed = Removed { feedback: doomed.len(), issues: issues_before - data.issues.len() };
            info!("Source removed - id={}, feedback={}, issues={}", id, removed.feedback, removed.issues);
            Ok(removed)
        })
    }

    // ---------- feedback ----------

    pub fn feedback(&self) -> Result<Vec<FeedbackRecord>> {
        Ok(self.load()?.feedback)
    }

    /// Feedback with no issue yet, newest first.
    pub fn unanalyzed_feedback(&self) -> Result<Vec<FeedbackRecord>> {
        let data = self.load()?;
        let analyzed: HashSet<&str> = data.issues.iter().map(|i| i.feedback_id.as_str()).collect();
        let mut pending: Vec<FeedbackRecord> =
            data.feedback.iter().filter(|f| !analyzed.contains(f.id.as_str())).cloned().collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        debug!("Unanalyzed feedback - session={}, pending={}", self.session, pending.len());
        Ok(pending)
    }

    // ---------- issues ----------

    /// Insert-only: issues whose id already exists are left untouched.
    pub fn insert_issues(&self, issues: &[Issue]) -> Result<usize> {
        self.update(|data| {
            let mut known: HashSet<String> = data.issues.iter().map(|i| i.id.clone()).collect();
            let mut inserted = 0;
            for issue in issues {
                if known.insert(issue.id.clone()) {
                    data.issues.push(issue.clone());
                    inserted += 1;
                }
            }
            Ok(inserted)
        })
    }

    /// Writes back recomputed priorities. Overridden issues keep theirs;
    /// workflow fields (status, assignee, tags) are never touched.
    pub fn merge_priorities(&self, issues: &[Issue]) -> Result<usize> {
        self.update(|data| {
            let mut merged = 0;
            for fresh in issues {
                let Some(stored) = data.issues.iter_mut().find(|i| i.id == fresh.id) else {
                    continue;
                };
                if stored.priority_override {
                    continue;
                }
                if stored.priority != fresh.priority || stored.priority_reason != fresh.priority_reason {
                    stored.priority = fresh.priority;
                    stored.priority_reason = fresh.priority_reason.clone();
                    stored.updated_at = Some(Utc::now());
                    merged += 1;
                }
            }
            Ok(merged)
        })
    }

    pub fn issues(&self) -> Result<Vec<Issue>> {
        Ok(self.load()?.issues)
    }

    /// Most severe first, then newest first.
    pub fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let mut issues: Vec<Issue> = self.issues()?.into_iter().filter(|i| filter.matches(i)).collect();
        issues.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.created_at.cmp(&a.created_at)));
        Ok(issues)
    }

    pub fn issue(&self, id: &str) -> Result<Issue> {
        match self.issues()?.into_iter().find(|i| i.id == id) {
            Some(i) => Ok(i),
            None => bail!("Unknown issue '{}' in session '{}'", id, self.session),
        }
    }

    fn update_issue(&self, id: &str, f: impl FnOnce(&mut Issue)) -> Result<Issue> {
        self.update(|data| {
            let Some(issue) = data.issues.iter_mut().find(|i| i.id == id) else {
                bail!("Unknown issue '{}'", id);
            };
            f(issue);
            Ok(issue.clone())
        })
    }

    pub fn set_status(&self, id: &str, status: IssueStatus) -> Result<Issue> {
        self.update_issue(id, |i| {
            i.status = status;
            i.updated_at = Some(Utc::now());
        })
    }

    pub fn assign(&self, id: &str, assignee: Option<String>) -> Result<Issue> {
        let assignee = assignee.map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
        self.update_issue(id, |i| {
            i.assigned_to = assignee;
            i.updated_at = Some(Utc::now());
        })
    }

    /// Replaces the tag list; blanks and duplicates are dropped, order kept.
    pub fn set_tags(&self, id: &str, tags: Vec<String>) -> Result<Issue> {
        let mut seen = HashSet::new();
        let tags: Vec<String> = tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();
        self.update_issue(id, |i| {
            i.tags = tags;
            i.updated_at = Some(Utc::now());
        })
    }

    /// Manual priority. The first override records the system value; later
    /// overrides keep it.
    pub fn override_priority(&self, id: &str, priority: Priority, reason: Option<String>) -> Result<Issue> {
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| format!("Manually set to {}", priority));
        self.update_issue(id, |i| {
            if !i.priority_override {
                i.original_priority = Some(i.priority);
            }
            i.priority = priority;
            i.priority_reason = reason;
            i.priority_override = true;
            i.updated_at = Some(Utc::now());
        })
    }

    /// Restores the stored original. A no-op for issues never overridden.
    pub fn reset_priority(&self, id: &str) -> Result<Issue> {
        let current = self.issue(id)?;
        let Some(original) = current.original_priority.filter(|_| current.priority_override) else {
            debug!("Reset skipped, no override - issue={}", id);
            return Ok(current);
        };
        self.update_issue(id, |i| {
            i.priority = original;
            i.priority_reason = RESET_REASON.to_string();
            i.priority_override = false;
            i.original_priority = None;
            i.updated_at = Some(Utc::now());
        })
    }

    // ---------- insights ----------

    pub fn replace_insights(&self, insights: Vec<Insight>) -> Result<()> {
        self.update(|data| {
            data.insights = insights;
            Ok(())
        })
    }

    /// Highest impact first, newest first within an impact level.
    pub fn insights(&self, include_dismissed: bool) -> Result<Vec<Insight>> {
        let mut insights: Vec<Insight> =
            self.load()?.insights.into_iter().filter(|i| include_dismissed || !i.dismissed).collect();
        insights.sort_by(|a, b| b.impact.cmp(&a.impact).then(b.created_at.cmp(&a.created_at)));
        Ok(insights)
    }

    pub fn dismiss_insight(&self, id: &str) -> Result<Insight> {
        self.update(|data| {
            let Some(insight) = data.insights.iter_mut().find(|i| i.id == id) else {
                bail!("Unknown insight '{}'", id);
            };
            insight.dismissed = true;
            Ok(insight.clone())
        })
    }

    // ---------- configuration ----------

    pub fn priority_config(&self) -> Result<PriorityConfig> {
        Ok(self.load()?.priority_config)
    }

    pub fn set_priority_config(&self, config: PriorityConfig) -> Result<()> {
        self.update(|data| {
            data.priority_config = config;
            Ok(())
        })
    }

    pub fn reset_priority_config(&self) -> Result<PriorityConfig> {
        self.update(|data| {
            data.priority_config = PriorityConfig::default();
            Ok(data.priority_config.clone())
        })
    }

    // ---------- chat ----------

    pub fn chat_history(&self) -> Result<Vec<ChatMessage>> {
        Ok(self.load()?.chat)
    }

    pub fn append_chat(&self, turns: Vec<ChatMessage>) -> Result<()> {
        self.update(|data| {
            data.chat.extend(turns);
            let excess = data.chat.len().saturating_sub(CHAT_RETAINED);
            data.chat.drain(..excess);
            Ok(())
        })
    }

    // ---------- clearing ----------

    /// Drops every source, feedback item, issue, insight and chat turn.
    /// The keyword configuration survives.
    pub fn clear_all(&self) -> Result<()> {
        self.update(|data| {
            let config = std::mem::take(&mut data.priority_config);
            *data = SessionData { priority_config: config, ..Default::default() };
            info!("Session cleared - session={}", self.session);
            Ok(())
        })
    }

    /// Drops analysis results so the feedback can be analyzed again.
    pub fn clear_issues(&self) -> Result<usize> {
        self.update(|data| {
            let n = data.issues.len();
            data.issues.clear();
            data.insights.clear();
            info!("Issues cleared - session={}, issues={}", self.session, n);
            Ok(n)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_validated() {
        assert!(validate_session_id("team-a_2").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("../etc").is_err());
        assert!(validate_session_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn feedback_ids_are_stable_and_session_scoped() {
        let a = feedback_id_for("s1", FeedbackSource::Tracker, "o/r#1");
        assert_eq!(a, feedback_id_for("s1", FeedbackSource::Tracker, "o/r#1"));
        assert_ne!(a, feedback_id_for("s2", FeedbackSource::Tracker, "o/r#1"));
        assert_ne!(a, feedback_id_for("s1", FeedbackSource::Forum, "o/r#1"));
        assert!(a.starts_with("fb_") && a.len() == 19);
    }

    #[test]
    fn filter_matches_all_fields() {
        let issue = crate::insights::tests::issue(0, Priority::High, Category::Bug, crate::models::SentimentLabel::Neutral);
        assert!(IssueFilter::default().matches(&issue));
        assert!(IssueFilter { priority: Some(Priority::High), ..Default::default() }.matches(&issue));
        assert!(!IssueFilter { category: Some(Category::Ux), ..Default::default() }.matches(&issue));
        assert!(!IssueFilter { status: Some(IssueStatus::Done), ..Default::default() }.matches(&issue));
    }
}
