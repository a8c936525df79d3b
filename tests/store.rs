use chrono::{TimeZone, Utc};
use std::time::Duration;
use tempfile::TempDir;

use feedback_triage::capability::Offline;
use feedback_triage::chat::ChatMessage;
use feedback_triage::models::{
    FeedbackDraft, FeedbackSource, InsightType, IssueStatus, Priority, PriorityConfig, SourceConfig,
};
use feedback_triage::orchestrator::{self, AnalysisOptions};
use feedback_triage::store::{IssueFilter, SessionStore, RESET_REASON};

fn draft(n: u32, title: &str, body: &str) -> FeedbackDraft {
    FeedbackDraft {
        source: FeedbackSource::Tabular,
        native_id: format!("row_{}", n),
        title: title.into(),
        body: body.into(),
        url: String::new(),
        author: "alice".into(),
        created_at: Utc.with_ymd_and_hms(2026, 4, n, 8, 0, 0).unwrap(),
    }
}

fn drafts() -> Vec<FeedbackDraft> {
    vec![
        draft(1, "Login crash on Android", "The app crashes every time"),
        draft(2, "Security hole in auth", ""),
        draft(3, "Dark mode", ""),
    ]
}

fn csv_source() -> SourceConfig {
    SourceConfig::Tabular { filename: "export.csv".into(), row_count: 3 }
}

fn opts() -> AnalysisOptions {
    AnalysisOptions { pacing: Duration::ZERO, ..Default::default() }
}

fn open(dir: &TempDir) -> SessionStore {
    SessionStore::open(dir.path(), "team-a").unwrap()
}

async fn analyzed_store(dir: &TempDir) -> SessionStore {
    let store = open(dir);
    store.import(csv_source(), drafts()).unwrap();
    orchestrator::run_analysis(&Offline, &store, &opts(), |_, _| {}).await.unwrap();
    store
}

#[test]
fn reimport_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    let (source, first) = store.import(csv_source(), drafts()).unwrap();
    assert_eq!((first.inserted, first.skipped), (3, 0));
    assert_eq!(source.item_count, 3);
    assert!(source.last_synced.is_some());

    let (again, second) = store.import(csv_source(), drafts()).unwrap();
    assert_eq!((second.inserted, second.skipped), (0, 3));
    assert_eq!(again.id, source.id);
    assert_eq!(store.feedback().unwrap().len(), 3);
    assert_eq!(store.sources().unwrap().len(), 1);
}

#[test]
fn sessions_are_isolated() {
    let dir = TempDir::new().unwrap();
    let a = SessionStore::open(dir.path(), "a").unwrap();
    let b = SessionStore::open(dir.path(), "b").unwrap();
    a.import(csv_source(), drafts()).unwrap();
    assert!(b.feedback().unwrap().is_empty());
    assert!(SessionStore::open(dir.path(), "../escape").is_err());
}

#[tokio::test]
async fn analysis_run_saves_issues_and_insights_once() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.import(csv_source(), drafts()).unwrap();
    assert_eq!(store.unanalyzed_feedback().unwrap().len(), 3);

    let mut ticks = Vec::new();
    let report = orchestrator::run_analysis(&Offline, &store, &opts(), |done, total| ticks.push((done, total)))
        .await
        .unwrap();
    assert_eq!(ticks, vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!((report.analyzed, report.saved, report.fallbacks), (3, 3, 0));
    assert_eq!(report.insights, 1);

    let insights = store.insights(false).unwrap();
    assert_eq!(insights[0].kind, InsightType::QuickWin);
    assert_eq!(insights[0].title, "2 urgent issues need attention");

    assert!(store.unanalyzed_feedback().unwrap().is_empty());
    let rerun = orchestrator::run_analysis(&Offline, &store, &opts(), |_, _| {}).await.unwrap();
    assert_eq!(rerun.analyzed, 0);
    assert_eq!(store.issues().unwrap().len(), 3);
}

#[tokio::test]
async fn listing_orders_by_severity_then_recency() {
    let dir = TempDir::new().unwrap();
    let store = analyzed_store(&dir).await;

    let listed = store.list_issues(&IssueFilter::default()).unwrap();
    let titles: Vec<&str> = listed.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Security hole in auth", "Login crash on Android", "Dark mode"]);

    let low = store
        .list_issues(&IssueFilter { priority: Some(Priority::Low), ..Default::default() })
        .unwrap();
    assert_eq!(low.len(), 1);
}

#[tokio::test]
async fn override_and_reset_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = analyzed_store(&dir).await;
    let id = store.list_issues(&IssueFilter::default()).unwrap()[1].id.clone();
    assert_eq!(store.issue(&id).unwrap().priority, Priority::High);

    let once = store.override_priority(&id, Priority::Critical, None).unwrap();
    assert!(once.priority_override);
    assert_eq!(once.priority_reason, "Manually set to critical");
    assert_eq!(once.original_priority, Some(Priority::High));

    let twice = store.override_priority(&id, Priority::Low, Some("Customer can wait".into())).unwrap();
    assert_eq!(twice.original_priority, Some(Priority::High));
    assert_eq!(twice.priority_reason, "Customer can wait");

    let reset = store.reset_priority(&id).unwrap();
    assert_eq!(reset.priority, Priority::High);
    assert!(!reset.priority_override);
    assert_eq!(reset.priority_reason, RESET_REASON);

    let noop = store.reset_priority(&id).unwrap();
    assert_eq!(noop.priority, Priority::High);
    assert_eq!(noop.updated_at, reset.updated_at);
}

#[tokio::test]
async fn workflow_updates_persist() {
    let dir = TempDir::new().unwrap();
    let store = analyzed_store(&dir).await;
    let id = store.issues().unwrap()[0].id.clone();

    store.set_status(&id, IssueStatus::InProgress).unwrap();
    store.assign(&id, Some("  bob ".into())).unwrap();
    store.set_tags(&id, vec!["mobile".into(), " ".into(), "mobile".into(), "login".into()]).unwrap();

    let reopened = open(&dir).issue(&id).unwrap();
    assert_eq!(reopened.status, IssueStatus::InProgress);
    assert_eq!(reopened.assigned_to.as_deref(), Some("bob"));
    assert_eq!(reopened.tags, vec!["mobile", "login"]);

    let cleared = store.assign(&id, None).unwrap();
    assert!(cleared.assigned_to.is_none());
    assert!(store.set_status("issue_missing", IssueStatus::Done).is_err());
}

#[tokio::test]
async fn removing_a_source_cascades() {
    let dir = TempDir::new().unwrap();
    let store = analyzed_store(&dir).await;
    let source = store.sources().unwrap().remove(0);

    let removed = store.remove_source(&source.id).unwrap();
    assert_eq!((removed.feedback, removed.issues), (3, 3));
    assert!(store.feedback().unwrap().is_empty());
    assert!(store.issues().unwrap().is_empty());
    assert!(store.sources().unwrap().is_empty());
    assert!(store.remove_source(&source.id).is_err());
}

#[tokio::test]
async fn keyword_change_then_rescore() {
    let dir = TempDir::new().unwrap();
    let store = analyzed_store(&dir).await;

    store
        .set_priority_config(PriorityConfig { critical_keywords: vec!["dark mode".into()], ..Default::default() })
        .unwrap();
    let changed = orchestrator::rescore_session(&store, &opts().similarity).unwrap();
    assert_eq!(changed, 2);

    let by_title = |t: &str| store.issues().unwrap().into_iter().find(|i| i.title == t).unwrap();
    assert_eq!(by_title("Dark mode").priority, Priority::High);
    assert_eq!(by_title("Security hole in auth").priority, Priority::Low);
    assert_eq!(by_title("Login crash on Android").priority, Priority::High);

    assert_eq!(store.reset_priority_config().unwrap(), PriorityConfig::default());
}

#[tokio::test]
async fn rescore_keeps_similar_counts_batch_local() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let dup = "Payment screen freezes during checkout process";

    store.import(csv_source(), vec![draft(1, dup, ""), draft(2, dup, "")]).unwrap();
    orchestrator::run_analysis(&Offline, &store, &opts(), |_, _| {}).await.unwrap();
    store.import(csv_source(), vec![draft(3, dup, "")]).unwrap();
    orchestrator::run_analysis(&Offline, &store, &opts(), |_, _| {}).await.unwrap();

    let counts: Vec<Option<usize>> = store.issues().unwrap().iter().map(|i| i.similar_count).collect();
    assert_eq!(counts.iter().filter(|c| **c == Some(1)).count(), 2);
    assert_eq!(counts.iter().filter(|c| **c == Some(0)).count(), 1);

    assert_eq!(orchestrator::rescore_session(&store, &opts().similarity).unwrap(), 0);
    assert!(store.issues().unwrap().iter().all(|i| i.priority == Priority::Low));
}

#[tokio::test]
async fn insights_dismiss_and_clear() {
    let dir = TempDir::new().unwrap();
    let store = analyzed_store(&dir).await;
    let id = store.insights(false).unwrap()[0].id.clone();
    assert!(id.starts_with("insight_urgent_"));

    store.dismiss_insight(&id).unwrap();
    store.dismiss_insight(&id).unwrap();
    assert!(store.insights(false).unwrap().is_empty());
    assert_eq!(store.insights(true).unwrap().len(), 1);

    assert_eq!(store.clear_issues().unwrap(), 3);
    assert_eq!(store.unanalyzed_feedback().unwrap().len(), 3);

    store.append_chat(vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]).unwrap();
    store.clear_all().unwrap();
    assert!(store.feedback().unwrap().is_empty());
    assert!(store.chat_history().unwrap().is_empty());
}
