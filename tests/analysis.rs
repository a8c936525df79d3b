use chrono::{TimeZone, Utc};
use std::sync::Mutex;
use std::time::Duration;

use feedback_triage::api_types::ThemeLabel;
use feedback_triage::capability::{Capabilities, CapabilityError, Offline, Summary, ThemeDigest};
use feedback_triage::models::{Category, FeedbackRecord, FeedbackSource, Priority, PriorityConfig, SentimentLabel};
use feedback_triage::orchestrator::{analyze_batch, analyze_themes, rescore_issues, AnalysisOptions};
use feedback_triage::sentiment::Sentiment;

fn record(n: usize, title: &str, body: &str) -> FeedbackRecord {
    let at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
    FeedbackRecord {
        id: format!("fb_{}", n),
        session_id: "test".into(),
        source_ref: "src_csv".into(),
        source: FeedbackSource::Tabular,
        native_id: format!("row_{}", n),
        title: title.into(),
        body: body.into(),
        url: String::new(),
        author: "tester".into(),
        created_at: at,
        imported_at: at,
    }
}

fn opts() -> AnalysisOptions {
    AnalysisOptions { pacing: Duration::ZERO, ..Default::default() }
}

/// Deterministic capability set driven by markers in the title.
#[derive(Default)]
struct Stub {
    negative: bool,
    slow_polarity: Option<Duration>,
    slow_summary: Option<Duration>,
    labels: Option<Vec<ThemeLabel>>,
    summarized: Mutex<Vec<String>>,
}

impl Capabilities for Stub {
    async fn polarity(&self, _text: &str) -> Result<Sentiment, CapabilityError> {
        if let Some(d) = self.slow_polarity {
            tokio::time::sleep(d).await;
        }
        if self.negative {
            Ok(Sentiment::from_confidence(SentimentLabel::Negative, 0.9))
        } else {
            Ok(Sentiment::neutral())
        }
    }

    async fn summarize(&self, title: &str, _body: &str) -> Result<Summary, CapabilityError> {
        self.summarized.lock().unwrap().push(title.to_string());
        if let Some(d) = self.slow_summary {
            tokio::time::sleep(d).await;
        }
        if title.contains("boom") {
            return Err(CapabilityError::Transport("connection reset".into()));
        }
        if title.contains("garbled") {
            return Err(CapabilityError::Unparseable("no JSON object".into()));
        }
        if title.contains("terse") {
            return Ok(Summary { summary: Some("Login fails on Android".into()), category: None });
        }
        if title.contains("unsummarized") {
            return Ok(Summary { summary: None, category: Some(Category::Security) });
        }
        let category = if title.to_lowercase().contains("crash") { Category::Bug } else { Category::Feature };
        Ok(Summary { summary: Some(format!("Summary of {}", title)), category: Some(category) })
    }

    async fn label_themes(&self, _themes: &[ThemeDigest]) -> Result<Vec<ThemeLabel>, CapabilityError> {
        self.labels.clone().ok_or_else(|| CapabilityError::Transport("labeller down".into()))
    }

    async fn answer(&self, _prompt: &str) -> Result<String, CapabilityError> {
        Ok("stub answer".into())
    }
}

#[tokio::test]
async fn offline_batch_keeps_order_and_reports_progress() {
    let records = vec![
        record(0, "Checkout crash", ""),
        record(1, "Dark mode please", ""),
        record(2, "Typo", ""),
    ];
    let mut progress = Vec::new();
    let issues = analyze_batch(&Offline, &records, &PriorityConfig::default(), &opts(), |p| {
        progress.push((p.completed, p.total, p.issue.id.clone()));
    })
    .await;

    assert_eq!(
        progress,
        vec![
            (1, 3, "issue_fb_0".to_string()),
            (2, 3, "issue_fb_1".to_string()),
            (3, 3, "issue_fb_2".to_string()),
        ]
    );

    assert_eq!(issues[0].priority, Priority::High);
    assert_eq!(issues[0].priority_reason, "keyword \"crash\"");
    assert_eq!(issues[0].summary, "Checkout crash");
    assert_eq!(issues[0].category, Category::Other);
    assert_eq!(issues[0].sentiment_label, SentimentLabel::Neutral);

    assert_eq!(issues[1].priority, Priority::Low);
    assert_eq!(issues[1].priority_reason, "Standard priority");
}

#[tokio::test]
async fn similar_items_raise_each_other() {
    let dup = "Payment screen freezes during checkout process";
    let records = vec![
        record(0, dup, ""),
        record(1, dup, ""),
        record(2, dup, ""),
        record(3, "Typo", ""),
    ];
    let issues = analyze_batch(&Offline, &records, &PriorityConfig::default(), &opts(), |_| {}).await;

    for issue in &issues[..3] {
        assert_eq!(issue.priority, Priority::Medium);
        assert_eq!(issue.priority_reason, "2 similar issues");
    }
    assert_eq!(issues[3].priority, Priority::Low);
}

#[tokio::test]
async fn summarize_transport_failure_yields_fallback_issue() {
    let stub = Stub { negative: true, ..Default::default() };
    let records = vec![record(0, "Export boom", &"x".repeat(300)), record(1, "App crash", "")];
    let issues = analyze_batch(&stub, &records, &PriorityConfig::default(), &opts(), |_| {}).await;

    let failed = &issues[0];
    assert_eq!(failed.id, "issue_fb_0");
    assert_eq!(failed.priority, Priority::Low);
    assert_eq!(failed.priority_reason, "Analysis failed");
    assert_eq!(failed.category, Category::Other);
    assert_eq!(failed.summary.len(), 200);
    assert_eq!(failed.sentiment_label, SentimentLabel::Neutral);
    assert_eq!(failed.sentiment_score, 0.0);

    // the sibling is unaffected
    assert_eq!(issues[1].priority, Priority::Critical);
    assert_eq!(issues[1].category, Category::Bug);
    assert_eq!(issues[1].summary, "Summary of App crash");
}

#[tokio::test]
async fn unparseable_summary_keeps_the_score() {
    let stub = Stub { negative: true, ..Default::default() };
    let records = vec![record(0, "garbled crash report", "")];
    let issues = analyze_batch(&stub, &records, &PriorityConfig::default(), &opts(), |_| {}).await;

    assert_eq!(issues[0].summary, "garbled crash report");
    assert_eq!(issues[0].category, Category::Other);
    assert_eq!(issues[0].priority, Priority::Critical);
    assert_eq!(issues[0].priority_reason, "keyword \"crash\" + negative sentiment");
    assert!((issues[0].sentiment_score + 0.9).abs() < 1e-6);
}

#[tokio::test]
async fn partial_summary_keeps_the_field_it_has() {
    let records = vec![record(0, "terse login report", ""), record(1, "unsummarized token leak", "")];
    let issues = analyze_batch(&Stub::default(), &records, &PriorityConfig::default(), &opts(), |_| {}).await;

    assert_eq!(issues[0].summary, "Login fails on Android");
    assert_eq!(issues[0].category, Category::Other);
    assert_eq!(issues[1].summary, "unsummarized token leak");
    assert_eq!(issues[1].category, Category::Security);
    assert!(issues.iter().all(|i| i.priority_reason != "Analysis failed"));
}

#[tokio::test]
async fn slow_summary_times_out_to_fallback_issue() {
    let stub = Stub {
        negative: true,
        slow_summary: Some(Duration::from_millis(300)),
        ..Default::default()
    };
    let options = AnalysisOptions { call_timeout: Duration::from_millis(20), ..opts() };
    let records = vec![record(0, "App crash", &"y".repeat(250))];
    let issues = analyze_batch(&stub, &records, &PriorityConfig::default(), &options, |_| {}).await;

    let failed = &issues[0];
    assert_eq!(failed.priority, Priority::Low);
    assert_eq!(failed.priority_reason, "Analysis failed");
    assert_eq!(failed.category, Category::Other);
    assert_eq!(failed.summary, "y".repeat(200));
    assert_eq!(failed.sentiment_label, SentimentLabel::Neutral);
    assert_eq!(failed.sentiment_score, 0.0);
}

#[tokio::test]
async fn slow_polarity_times_out_to_neutral() {
    let stub = Stub {
        negative: true,
        slow_polarity: Some(Duration::from_millis(300)),
        ..Default::default()
    };
    let options = AnalysisOptions { call_timeout: Duration::from_millis(20), ..opts() };
    let issues = analyze_batch(&stub, &[record(0, "App crash", "")], &PriorityConfig::default(), &options, |_| {}).await;

    assert_eq!(issues[0].sentiment_label, SentimentLabel::Neutral);
    assert_eq!(issues[0].priority, Priority::High);
    assert_eq!(issues[0].summary, "Summary of App crash");
}

#[tokio::test]
async fn concurrency_does_not_change_results_or_order() {
    let records: Vec<FeedbackRecord> = [
        "App crash on start",
        "Search is slow",
        "Export boom",
        "Add CSV export",
        "Crash when saving",
    ]
    .iter()
    .enumerate()
    .map(|(n, t)| record(n, t, ""))
    .collect();

    let sequential = analyze_batch(&Stub::default(), &records, &PriorityConfig::default(), &opts(), |_| {}).await;
    let fanned = analyze_batch(
        &Stub::default(),
        &records,
        &PriorityConfig::default(),
        &AnalysisOptions { concurrency: 3, ..opts() },
        |_| {},
    )
    .await;

    let shape = |xs: &[feedback_triage::models::Issue]| -> Vec<(String, Priority, String)> {
        xs.iter().map(|i| (i.id.clone(), i.priority, i.priority_reason.clone())).collect()
    };
    assert_eq!(shape(&sequential), shape(&fanned));
}

#[tokio::test]
async fn themes_use_external_labels_where_given() {
    let stub = Stub {
        labels: Some(vec![ThemeLabel {
            category: "bug".into(),
            label: Some("Stability".into()),
            description: None,
        }]),
        ..Default::default()
    };
    let records = vec![
        record(0, "App crash on start", ""),
        record(1, "Add dark mode", ""),
        record(2, "Crash when saving", ""),
        record(3, "Add CSV export", ""),
    ];
    let issues = analyze_batch(&stub, &records, &PriorityConfig::default(), &opts(), |_| {}).await;
    let themes = analyze_themes(&stub, &issues, &opts()).await;

    assert_eq!(themes.len(), 2);
    assert_eq!(themes[0].label, "Stability");
    assert_eq!(themes[0].description, "2 related issues");
    assert_eq!(themes[1].label, "Feature");
    assert_eq!(themes[1].description, "2 feature issues");

    let fallback = analyze_themes(&Stub::default(), &issues, &opts()).await;
    assert_eq!(fallback[0].label, "Bug");
    assert_eq!(fallback[0].description, "2 bug issues");
}

#[tokio::test]
async fn rescore_skips_overridden_issues() {
    let records = vec![record(0, "Dark mode", ""), record(1, "Dark mode toggle", "")];
    let mut issues = analyze_batch(&Offline, &records, &PriorityConfig::default(), &opts(), |_| {}).await;
    assert!(issues.iter().all(|i| i.priority == Priority::Low));

    issues[1].priority_override = true;
    issues[1].original_priority = Some(Priority::Low);
    issues[1].priority = Priority::Medium;

    let cfg = PriorityConfig { critical_keywords: vec!["dark mode".into()], ..Default::default() };
    let changed = rescore_issues(&records, &mut issues, &cfg, &opts().similarity);

    assert_eq!(changed, 1);
    assert_eq!(issues[0].priority, Priority::High);
    assert_eq!(issues[0].priority_reason, "keyword \"dark mode\"");
    assert_eq!(issues[1].priority, Priority::Medium);
}
