use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::Path;
use tracing::{debug, info};

use crate::budget::{truncate_chars, DERIVED_TITLE_CHARS};
use crate::models::{FeedbackDraft, FeedbackSource};

// Header variants per field, tried in order; a header matches when it
// contains the variant (case-insensitive).
const TITLE: &[&str] = &["title", "subject", "summary", "name", "issue", "heading"];
const BODY: &[&str] = &["body", "description", "content", "text", "comment", "feedback", "message", "details"];
const AUTHOR: &[&str] = &["author", "user", "username", "email", "customer", "reporter", "name", "from"];
const URL: &[&str] = &["url", "link", "href", "source_url", "reference"];
const CREATED: &[&str] = &["created", "date", "timestamp", "time", "created_at", "submitted", "datetime"];
const ID: &[&str] = &["id", "ticket", "number", "ref", "reference", "issue_id"];

/// Column positions detected from the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Columns {
    pub title: Option<usize>,
    pub body: Option<usize>,
    pub author: Option<usize>,
    pub url: Option<usize>,
    pub created: Option<usize>,
    pub id: Option<usize>,
}

fn find_column(headers: &[String], variants: &[&str]) -> Option<usize> {
    variants.iter().find_map(|v| headers.iter().position(|h| h.contains(v)))
}

pub fn detect_columns(headers: &[String]) -> Columns {
    let lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    Columns {
        title: find_column(&lower, TITLE),
        body: find_column(&lower, BODY),
        author: find_column(&lower, AUTHOR),
        url: find_column(&lower, URL),
        created: find_column(&lower, CREATED),
        id: find_column(&lower, ID),
    }
}

/// Lenient timestamp parsing; `None` when nothing fits.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%m/%d/%Y %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
        }
    }
    None
}

fn cell<'a>(row: &'a StringRecord, idx: Option<usize>) -> &'a str {
    idx.and_then(|i| row.get(i)).unwrap_or("").trim()
}

/// Parses CSV text into drafts. `now` stamps rows without a usable date.
pub fn parse_feedback(content: &str, now: DateTime<Utc>) -> Result<Vec<FeedbackDraft>> {
    if content.trim().is_empty() {
        bail!("Empty CSV file");
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to parse CSV file. Please check the format.")?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        bail!("Empty CSV file");
    }

    let cols = detect_columns(&headers);
    if cols.title.is_none() && cols.body.is_none() {
        bail!("Could not find title or body column. Found columns: {}", headers.join(", "));
    }
    debug!("CSV columns detected - headers={}, columns={:?}", headers.len(), cols);

    let mut drafts = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let row = record.with_context(|| format!("Failed to parse CSV row {}", index + 1))?;
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }

        let body = cell(&row, cols.body).to_string();
        let title = match cols.title {
            Some(_) => cell(&row, cols.title).to_string(),
            None => truncate_chars(&body, DERIVED_TITLE_CHARS).to_string(),
        };
        let native_id = match cell(&row, cols.id) {
            "" => format!("row_{}", index + 1),
            id => id.to_string(),
        };
        let author = match cell(&row, cols.author) {
            "" => "Unknown".to_string(),
            a => a.to_string(),
        };

        drafts.push(FeedbackDraft {
            source: FeedbackSource::Tabular,
            native_id,
            title: if title.is_empty() { "Untitled".to_string() } else { title },
            body,
            url: cell(&row, cols.url).to_string(),
            author,
            created_at: parse_timestamp(cell(&row, cols.created)).unwrap_or(now),
        });
    }

    Ok(drafts)
}

pub fn read_feedback_file(path: &Path) -> Result<Vec<FeedbackDraft>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    let drafts = parse_feedback(&content, Utc::now())?;
    info!("CSV parsed - file={}, rows={}", path.display(), drafts.len());
    Ok(drafts)
}
