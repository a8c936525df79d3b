use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::budget::{fallback_summary, truncate_chars, SENTIMENT_INPUT_CHARS};
use crate::capability::{Capabilities, CapabilityError, Summary};
use crate::cluster::{build_themes, qualifying_groups, theme_digests, ClusterParams};
use crate::insights::generate_insights;
use crate::models::{
    issue_id_for, Category, FeedbackRecord, Insight, Issue, IssueStatus, Priority, PriorityConfig, SentimentLabel,
    ThemeGroup,
};
use crate::scoring::{classify_with, Signals, FAILED_RATIONALE};
use crate::sentiment::Sentiment;
use crate::similarity::{SimilarityIndex, SimilarityParams};
use crate::store::SessionStore;

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub similarity: SimilarityParams,
    pub cluster: ClusterParams,
    pub pacing: Duration,       // pause between items (or between fan-out chunks)
    pub concurrency: usize,     // items whose external calls run together; 1 = sequential
    pub call_timeout: Duration, // per external call
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            similarity: SimilarityParams::default(),
            cluster: ClusterParams::default(),
            pacing: Duration::from_millis(100),
            concurrency: 1,
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Reported after every item, in input order.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub completed: usize,
    pub total: usize,
    pub issue: &'a Issue,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    pub analyzed: usize,
    pub fallbacks: usize,
    pub saved: usize,
    pub insights: usize,
}

async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, CapabilityError>>,
) -> Result<T, CapabilityError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(CapabilityError::Timeout { timeout_ms: limit.as_millis() as u64 }),
    }
}

/// Polarity of the item text; any failure (including a timeout) reads as neutral.
pub async fn fetch_sentiment<C: Capabilities>(cap: &C, text: &str, limit: Duration) -> Sentiment {
    let bounded = truncate_chars(text, SENTIMENT_INPUT_CHARS);
    match with_timeout(limit, cap.polarity(bounded)).await {
        Ok(s) => s,
        Err(CapabilityError::Unavailable) => Sentiment::neutral(),
        Err(e) => {
            warn!("Sentiment fallback to neutral - error={}", e);
            Sentiment::neutral()
        }
    }
}

fn new_issue(feedback: &FeedbackRecord) -> Issue {
    Issue {
        id: issue_id_for(&feedback.id),
        session_id: feedback.session_id.clone(),
        feedback_id: feedback.id.clone(),
        title: feedback.title.clone(),
        summary: feedback.title.clone(),
        category: Category::Other,
        priority: Priority::Low,
        priority_reason: FAILED_RATIONALE.to_string(),
        priority_override: false,
        original_priority: None,
        sentiment_score: 0.0,
        sentiment_label: SentimentLabel::Neutral,
        similar_count: None,
        status: IssueStatus::New,
        source: feedback.source,
        source_url: feedback.url.clone(),
        author: feedback.author.clone(),
        assigned_to: None,
        tags: Vec::new(),
        created_at: feedback.created_at,
        updated_at: None,
    }
}

/// Issue substituted when an item's analysis fails.
pub fn fallback_issue(feedback: &FeedbackRecord) -> Issue {
    Issue {
        summary: fallback_summary(&feedback.title, &feedback.body),
        ..new_issue(feedback)
    }
}

/// Analyzes one record. Sentiment problems degrade to neutral; a missing
/// summary falls back to the title and a missing category to "other", each
/// on its own. A summarization call that fails outright is returned as the
/// error so the caller can substitute [`fallback_issue`].
pub async fn analyze_item<C: Capabilities>(
    cap: &C,
    feedback: &FeedbackRecord,
    config: &PriorityConfig,
    similar_count: usize,
    opts: &AnalysisOptions,
) -> Result<Issue, CapabilityError> {
    let text = format!("{} {}", feedback.title, feedback.body);
    let sentiment = fetch_sentiment(cap, &text, opts.call_timeout).await;

    let classification = classify_with(
        &feedback.title,
        &feedback.body,
        config,
        Signals { sentiment: Some(sentiment.label), similar_count: Some(similar_count) },
        &opts.similarity,
    );

    let summary = match with_timeout(opts.call_timeout, cap.summarize(&feedback.title, &feedback.body)).await {
        Ok(s) => s,
        Err(CapabilityError::Unparseable(why)) => {
            debug!("Summary unparseable, using title - feedback={}, reason={}", feedback.id, why);
            Summary::default()
        }
        Err(CapabilityError::Unavailable) => Summary::default(),
        Err(e) => return Err(e),
    };

    Ok(Issue {
        summary: summary.summary.unwrap_or_else(|| feedback.title.clone()),
        category: summary.category.unwrap_or(Category::Other),
        priority: classification.priority,
        priority_reason: classification.rationale,
        sentiment_score: sentiment.score,
        sentiment_label: sentiment.label,
        similar_count: Some(similar_count),
        ..new_issue(feedback)
    })
}

/// Scores a whole batch. The similarity pass over the full batch completes
/// before any item is scored; items are then analyzed in input order, up to
/// `opts.concurrency` at a time, and a failing item is replaced by its
/// fallback issue rather than aborting the batch.
pub async fn analyze_batch<C, F>(
    cap: &C,
    feedback: &[FeedbackRecord],
    config: &PriorityConfig,
    opts: &AnalysisOptions,
    mut on_progress: F,
) -> Vec<Issue>
where
    C: Capabilities,
    F: FnMut(Progress<'_>),
{
    let total = feedback.len();
    let index = SimilarityIndex::build(feedback, &opts.similarity);
    let chunk = opts.concurrency.max(1);
    let batch_start = Instant::now();

    info!(
        "Batch analysis starting - items={}, concurrency={}, pacing_ms={}",
        total,
        chunk,
        opts.pacing.as_millis()
    );

    let mut issues = Vec::with_capacity(total);
    let mut fallbacks = 0usize;

    for start in (0..total).step_by(chunk) {
        let end = (start + chunk).min(total);

        let tasks = (start..end).map(|i| analyze_item(cap, &feedback[i], config, index.similar_count(i), opts));
        let results = futures::future::join_all(tasks).await;

        for (offset, result) in results.into_iter().enumerate() {
            let record = &feedback[start + offset];
            let issue = result.unwrap_or_else(|e| {
                warn!("Item analysis failed, using fallback - feedback={}, error={}", record.id, e);
                fallbacks += 1;
                Issue { similar_count: Some(index.similar_count(start + offset)), ..fallback_issue(record) }
            });
            issues.push(issue);
            if let Some(last) = issues.last() {
                on_progress(Progress { completed: issues.len(), total, issue: last });
            }
        }

        if end < total && !opts.pacing.is_zero() {
            tokio::time::sleep(opts.pacing).await;
        }

        let elapsed = batch_start.elapsed().as_secs_f32();
        let avg = elapsed / issues.len().max(1) as f32;
        let eta = avg * (total - issues.len()) as f32;
        debug!(
            "Analysis progress: {}/{} ({}%) | Avg item: {:.2}s | ETA: {}m {}s",
            issues.len(),
            total,
            issues.len() * 100 / total.max(1),
            avg,
            (eta / 60.0) as u32,
            (eta % 60.0) as u32
        );
    }

    info!(
        "Batch analysis completed - duration={:.2}s, items={}, fallbacks={}",
        batch_start.elapsed().as_secs_f32(),
        issues.len(),
        fallbacks
    );
    issues
}

/// Recomputes priority for every issue that is not manually overridden,
/// using stored sentiment labels and the sibling count recorded when the
/// issue's batch was analyzed. Issues saved without a count get one from a
/// similarity pass over `feedback`. Returns how many issues changed priority
/// or rationale.
pub fn rescore_issues(
    feedback: &[FeedbackRecord],
    issues: &mut [Issue],
    config: &PriorityConfig,
    params: &SimilarityParams,
) -> usize {
    let position: HashMap<&str, usize> = feedback.iter().enumerate().map(|(i, f)| (f.id.as_str(), i)).collect();
    let index = if issues.iter().any(|i| !i.priority_override && i.similar_count.is_none()) {
        SimilarityIndex::build(feedback, params)
    } else {
        SimilarityIndex::default()
    };

    let mut changed = 0usize;
    for issue in issues.iter_mut().filter(|i| !i.priority_override) {
        let Some(&pos) = position.get(issue.feedback_id.as_str()) else {
            continue;
        };
        let record = &feedback[pos];
        let c = classify_with(
            &record.title,
            &record.body,
            config,
            Signals {
                sentiment: Some(issue.sentiment_label),
                similar_count: Some(issue.similar_count.unwrap_or_else(|| index.similar_count(pos))),
            },
            params,
        );
        if c.priority != issue.priority || c.rationale != issue.priority_reason {
            issue.priority = c.priority;
            issue.priority_reason = c.rationale;
            issue.updated_at = Some(Utc::now());
            changed += 1;
        }
    }
    changed
}

/// Theme groups with externally generated labels when the capability answers
/// in time, otherwise the deterministic fallback labels.
pub async fn analyze_themes<C: Capabilities>(cap: &C, issues: &[Issue], opts: &AnalysisOptions) -> Vec<ThemeGroup> {
    let groups = qualifying_groups(issues, &opts.cluster);
    if groups.is_empty() {
        return build_themes(issues, None, &opts.cluster);
    }

    let digests = theme_digests(&groups, &opts.cluster);
    let labels = match with_timeout(opts.call_timeout, cap.label_themes(&digests)).await {
        Ok(labels) => Some(labels),
        Err(CapabilityError::Unavailable) => None,
        Err(e) => {
            warn!("Theme labelling fallback - error={}", e);
            None
        }
    };
    build_themes(issues, labels.as_deref(), &opts.cluster)
}

/// Regenerates and replaces the session's insight batch from all issues.
pub fn regenerate_insights(store: &SessionStore) -> Result<Vec<Insight>> {
    let issues = store.issues()?;
    let insights = generate_insights(&issues, Utc::now());
    store.replace_insights(insights.clone())?;
    info!("Insights regenerated - issues={}, insights={}", issues.len(), insights.len());
    Ok(insights)
}

/// Full analysis run for a session: score every unanalyzed feedback item,
/// persist each issue as it completes, then regenerate insights.
pub async fn run_analysis<C, F>(cap: &C, store: &SessionStore, opts: &AnalysisOptions, mut on_progress: F) -> Result<AnalysisReport>
where
    C: Capabilities,
    F: FnMut(usize, usize),
{
    let run_start = Instant::now();
    let pending = store.unanalyzed_feedback()?;
    if pending.is_empty() {
        info!("No new feedback to analyze - session={}", store.session());
        return Ok(AnalysisReport::default());
    }
    let config = store.priority_config()?;

    let mut saved = 0usize;
    let issues = analyze_batch(cap, &pending, &config, opts, |p| {
        // each issue is an independent row; a failed write skips only that row
        match store.insert_issues(std::slice::from_ref(p.issue)) {
            Ok(n) => saved += n,
            Err(e) => warn!("Skipping issue write - issue={}, error={:#}", p.issue.id, e),
        }
        on_progress(p.completed, p.total);
    })
    .await;

    let fallbacks = issues.iter().filter(|i| i.priority_reason == FAILED_RATIONALE).count();
    let insights = regenerate_insights(store)?;

    info!(
        "Analysis run completed - duration={:.2}s, analyzed={}, saved={}, fallbacks={}, insights={}",
        run_start.elapsed().as_secs_f32(),
        issues.len(),
        saved,
        fallbacks,
        insights.len()
    );

    Ok(AnalysisReport { analyzed: issues.len(), fallbacks, saved, insights: insights.len() })
}

/// Rescores the session's issues after a keyword configuration change.
pub fn rescore_session(store: &SessionStore, params: &SimilarityParams) -> Result<usize> {
    let feedback = store.feedback()?;
    let config = store.priority_config()?;
    let mut issues = store.issues()?;
    let mut changed = rescore_issues(&feedback, &mut issues, &config, params);
    if changed > 0 {
        changed = store.merge_priorities(&issues)?;
    }
    info!("Rescore completed - issues={}, changed={}", issues.len(), changed);
    Ok(changed)
}
