use anyhow::{anyhow, bail, Result};
use awful_aj::{config, template};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use feedback_triage::api_types::ThemeLabel;
use feedback_triage::capability::{Capabilities, CapabilityError, Offline, Summary, ThemeDigest};
use feedback_triage::chat::{self, ChatMessage};
use feedback_triage::cluster::ClusterParams;
use feedback_triage::fetch::{self, http_client, normalize_subreddit, parse_repo_reference};
use feedback_triage::insights::{quick_summary, IssueStats};
use feedback_triage::llm::{LlmCapabilities, Templates};
use feedback_triage::models::{Category, FeedbackSource, IssueStatus, Priority, PriorityConfig, SourceConfig};
use feedback_triage::orchestrator::{self, AnalysisOptions};
use feedback_triage::render;
use feedback_triage::sentiment::Sentiment;
use feedback_triage::similarity::SimilarityParams;
use feedback_triage::store::{IssueFilter, SessionStore};
use feedback_triage::tabular;

/// Feedback triage - import, score and group product feedback
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding one JSON document per session
    #[arg(long, env = "FEEDBACK_TRIAGE_DATA", default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Session to operate on
    #[arg(long, env = "FEEDBACK_TRIAGE_SESSION", default_value = "default", global = true)]
    session: String,

    /// Path to awful_aj config file (overrides AJ_CONFIG environment variable)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Skip the language model; every model call uses its fallback
    #[arg(long, global = true)]
    offline: bool,

    #[command(flatten)]
    tuning: Tuning,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct Tuning {
    /// Tokens must be longer than this many characters to count for similarity
    #[arg(long, env = "FEEDBACK_TRIAGE_MIN_TOKEN_LEN", default_value_t = 4, global = true)]
    min_token_len: usize,

    /// Shared tokens needed for two items to count as similar
    #[arg(long, env = "FEEDBACK_TRIAGE_MIN_SHARED", default_value_t = 3, global = true)]
    min_shared_tokens: usize,

    /// Volume points per similar item
    #[arg(long, env = "FEEDBACK_TRIAGE_POINTS_PER_SIBLING", default_value_t = 5, global = true)]
    points_per_sibling: u32,

    /// Volume points cap
    #[arg(long, env = "FEEDBACK_TRIAGE_VOLUME_CAP", default_value_t = 20, global = true)]
    volume_cap: u32,

    /// Pause between items, in milliseconds
    #[arg(long, env = "FEEDBACK_TRIAGE_PACING_MS", default_value_t = 100, global = true)]
    pacing_ms: u64,

    /// Items analyzed concurrently
    #[arg(long, env = "FEEDBACK_TRIAGE_CONCURRENCY", default_value_t = 1, global = true)]
    concurrency: usize,

    /// Timeout per model call, in seconds
    #[arg(long, env = "FEEDBACK_TRIAGE_CALL_TIMEOUT", default_value_t = 30, global = true)]
    call_timeout_secs: u64,
}

impl Tuning {
    fn options(&self) -> AnalysisOptions {
        AnalysisOptions {
            similarity: SimilarityParams {
                min_token_len: self.min_token_len,
                min_shared_tokens: self.min_shared_tokens,
                points_per_sibling: self.points_per_sibling,
                volume_cap: self.volume_cap,
            },
            cluster: ClusterParams::default(),
            pacing: Duration::from_millis(self.pacing_ms),
            concurrency: self.concurrency.max(1),
            call_timeout: Duration::from_secs(self.call_timeout_secs.max(1)),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import feedback rows from a CSV file
    ImportCsv { file: PathBuf },
    /// Import issues from a public GitHub repository (owner/repo or URL)
    ImportGithub {
        repo: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Import posts from a subreddit, optionally filtered by a search query
    ImportReddit {
        subreddit: String,
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Re-fetch one connected source, or every remote source
    Sync { source_id: Option<String> },
    /// List connected sources
    Sources,
    /// Remove a source together with its feedback and issues
    RemoveSource { source_id: String },
    /// Analyze every feedback item that has no issue yet
    Analyze,
    /// Recompute priorities of non-overridden issues without model calls.
    /// Similar-issue counts stay as measured in each issue's analysis batch.
    Rescore,
    /// List issues, most severe first
    Issues {
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        status: Option<IssueStatus>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show one issue
    Show { issue_id: String },
    /// Set workflow status (new, in_review, in_progress, done)
    SetStatus { issue_id: String, status: IssueStatus },
    /// Assign an issue; omit the assignee to clear it
    Assign { issue_id: String, assignee: Option<String> },
    /// Replace an issue's tags
    Tag { issue_id: String, tags: Vec<String> },
    /// Override an issue's priority
    SetPriority {
        issue_id: String,
        priority: Priority,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Restore the system-computed priority
    ResetPriority { issue_id: String },
    /// Group issues into themes
    Themes {
        #[arg(long)]
        json: bool,
    },
    /// List insights, highest impact first
    Insights {
        /// Include dismissed insights
        #[arg(long)]
        all: bool,
    },
    /// Dismiss an insight
    Dismiss { insight_id: String },
    /// Rebuild insights from the current issues
    RegenerateInsights,
    /// Headline, metrics and counts
    Summary,
    /// Ask a question about the analyzed feedback
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
        /// Ignore earlier questions in this session
        #[arg(long)]
        fresh: bool,
    },
    /// Show or edit the priority keyword lists
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Delete session data
    Clear {
        /// Keep sources and feedback, drop issues and insights
        #[arg(long)]
        issues_only: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show,
    /// Replace one or more keyword tiers (comma-separated)
    Set {
        #[arg(long, value_delimiter = ',')]
        critical: Option<Vec<String>>,
        #[arg(long, value_delimiter = ',')]
        high: Option<Vec<String>>,
        #[arg(long, value_delimiter = ',')]
        medium: Option<Vec<String>>,
    },
    Reset,
}

/// Either the configured model or nothing at all.
enum Backend {
    Offline(Offline),
    Llm(Box<LlmCapabilities>),
}

impl Capabilities for Backend {
    async fn polarity(&self, text: &str) -> Result<Sentiment, CapabilityError> {
        match self {
            Backend::Offline(c) => c.polarity(text).await,
            Backend::Llm(c) => c.polarity(text).await,
        }
    }

    async fn summarize(&self, title: &str, body: &str) -> Result<Summary, CapabilityError> {
        match self {
            Backend::Offline(c) => c.summarize(title, body).await,
            Backend::Llm(c) => c.summarize(title, body).await,
        }
    }

    async fn label_themes(&self, themes: &[ThemeDigest]) -> Result<Vec<ThemeLabel>, CapabilityError> {
        match self {
            Backend::Offline(c) => c.label_themes(themes).await,
            Backend::Llm(c) => c.label_themes(themes).await,
        }
    }

    async fn answer(&self, prompt: &str) -> Result<String, CapabilityError> {
        match self {
            Backend::Offline(c) => c.answer(prompt).await,
            Backend::Llm(c) => c.answer(prompt).await,
        }
    }
}

fn resolve_paths() -> Result<(PathBuf, PathBuf, PathBuf)> {
    // 1) Base config dir: env override, else awful_aj::config_dir()
    let base_dir = if let Ok(dir) = std::env::var("AJ_CONFIG_DIR") {
        PathBuf::from(dir)
    } else {
        awful_aj::config_dir().map_err(|e| anyhow!(e.to_string()))?
    };

    // 2) Config file: AJ_CONFIG, else <base>/config.yaml
    let cfg_path = if let Ok(p) = std::env::var("AJ_CONFIG") {
        PathBuf::from(p)
    } else {
        base_dir.join("config.yaml")
    };

    // 3) Template dir: AJ_TEMPLATE_DIR, else <base>/templates
    let tpl_dir = if let Ok(p) = std::env::var("AJ_TEMPLATE_DIR") {
        PathBuf::from(p)
    } else {
        let d = base_dir.join("templates");
        // make it visible to awful_aj::template loader
        std::env::set_var("AJ_TEMPLATE_DIR", &d);
        d
    };

    Ok((base_dir, cfg_path, tpl_dir))
}

async fn load_template_env(var: &str, default: &str) -> Result<template::ChatTemplate> {
    let name = std::env::var(var).unwrap_or_else(|_| default.to_string());
    debug!("Loading template - name={}", name);
    template::load_template(&name).await.map_err(|e| anyhow!("template '{}': {}", name, e))
}

async fn backend(args: &Args) -> Result<Backend> {
    if args.offline {
        info!("Offline mode - model calls use fallbacks");
        return Ok(Backend::Offline(Offline));
    }

    let (_base_dir, default_cfg, _tpl_dir) = resolve_paths()?;
    let cfg_path = match &args.config {
        Some(p) => {
            debug!("Using config file from --config argument: {}", p);
            PathBuf::from(p)
        }
        None => {
            debug!("Using config file from environment/default: {}", default_cfg.display());
            default_cfg
        }
    };

    if !cfg_path.exists() {
        bail!(
            "awful_aj config not found at {}\n\
             Use --config to specify a config file, set AJ_CONFIG, or pass --offline.\n\
             Example config.yaml:\n\
             api_key: \"YOUR_KEY\"\napi_base: \"http://localhost:5001/v1\"\nmodel: \"qwen3_30b_a3\"\n",
            cfg_path.display()
        );
    }

    let cfg = config::load_config(cfg_path.to_str().ok_or_else(|| anyhow!("invalid config path"))?)
        .map_err(|e| anyhow!(e.to_string()))?;

    let templates = Templates {
        sentiment: load_template_env("AJ_TEMPLATE_SENTIMENT", "feedback_sentiment").await?,
        summary: load_template_env("AJ_TEMPLATE_SUMMARY", "feedback_summary").await?,
        themes: load_template_env("AJ_TEMPLATE_THEMES", "feedback_themes").await?,
        chat: load_template_env("AJ_TEMPLATE_CHAT", "feedback_chat").await?,
    };

    Ok(Backend::Llm(Box::new(LlmCapabilities::new(cfg, templates))))
}

fn parse_source_kind(s: &str) -> Result<FeedbackSource> {
    FeedbackSource::ALL
        .into_iter()
        .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| anyhow!("Unknown source kind '{}': expected tracker, forum or tabular", s))
}

fn non_empty(list: Option<Vec<String>>) -> Option<Vec<String>> {
    list.map(|xs| xs.into_iter().map(|x| x.trim().to_lowercase()).filter(|x| !x.is_empty()).collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let store = SessionStore::open(&args.data_dir, &args.session)?;
    let opts = args.tuning.options();

    debug!("Session ready - session={}, path={}", store.session(), store.path().display());

    match &args.command {
        Command::ImportCsv { file } => {
            let drafts = tabular::read_feedback_file(file)?;
            let filename = file
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| file.display().to_string());
            let config = SourceConfig::Tabular { filename, row_count: drafts.len() };
            let (source, outcome) = store.import(config, drafts)?;
            println!("Imported {} new rows ({} already present) into {}", outcome.inserted, outcome.skipped, source.id);
        }
        Command::ImportGithub { repo, limit } => {
            let (owner, repo) = parse_repo_reference(repo)?;
            let drafts = fetch::fetch_github_issues(&http_client()?, &owner, &repo, *limit).await?;
            let config = SourceConfig::Tracker { owner, repo, fetch_limit: *limit };
            let (source, outcome) = store.import(config, drafts)?;
            println!("Imported {} new issues ({} already present) into {}", outcome.inserted, outcome.skipped, source.id);
        }
        Command::ImportReddit { subreddit, query, limit } => {
            let subreddit = normalize_subreddit(subreddit)?;
            let drafts = fetch::fetch_reddit_posts(&http_client()?, &subreddit, query.as_deref(), *limit).await?;
            let config = SourceConfig::Forum { subreddit, search_query: query.clone(), fetch_limit: *limit };
            let (source, outcome) = store.import(config, drafts)?;
            println!("Imported {} new posts ({} already present) into {}", outcome.inserted, outcome.skipped, source.id);
        }
        Command::Sync { source_id } => {
            let targets = match source_id {
                Some(id) => vec![store.source(id)?],
                None => store
                    .sources()?
                    .into_iter()
                    .filter(|s| s.config.source() != FeedbackSource::Tabular)
                    .collect(),
            };
            let client = http_client()?;
            for source in targets {
                match fetch::fetch_source(&client, &source.config).await {
                    Ok(drafts) => {
                        let (synced, outcome) = store.import(source.config.clone(), drafts)?;
                        println!("{}: {} new, {} total", synced.config.describe(), outcome.inserted, synced.item_count);
                    }
                    Err(e) if source_id.is_some() => return Err(e),
                    Err(e) => warn!("Sync failed - source={}, error={:#}", source.id, e),
                }
            }
        }
        Command::Sources => print!("{}", render::render_sources(&store.sources()?)),
        Command::RemoveSource { source_id } => {
            let removed = store.remove_source(source_id)?;
            println!("Removed {} feedback items and {} issues", removed.feedback, removed.issues);
        }
        Command::Analyze => {
            let cap = backend(&args).await?;
            let report = orchestrator::run_analysis(&cap, &store, &opts, |done, total| {
                eprint!("\ranalyzed {}/{}", done, total);
                let _ = std::io::stderr().flush();
            })
            .await?;
            if report.analyzed > 0 {
                eprintln!();
            }
            println!(
                "Analyzed {} items ({} fallbacks), saved {} issues, {} insights",
                report.analyzed, report.fallbacks, report.saved, report.insights
            );
        }
        Command::Rescore => {
            let changed = orchestrator::rescore_session(&store, &opts.similarity)?;
            println!("{} issues changed priority", changed);
        }
        Command::Issues { priority, status, category, source, json } => {
            let filter = IssueFilter {
                priority: *priority,
                status: *status,
                category: category.as_deref().map(Category::parse_loose),
                source: source.as_deref().map(parse_source_kind).transpose()?,
            };
            let issues = store.list_issues(&filter)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&issues)?);
            } else {
                print!("{}", render::render_issue_table(&issues));
            }
        }
        Command::Show { issue_id } => print!("{}", render::render_issue_detail(&store.issue(issue_id)?)),
        Command::SetStatus { issue_id, status } => {
            let issue = store.set_status(issue_id, *status)?;
            println!("{} -> {}", issue.id, issue.status);
        }
        Command::Assign { issue_id, assignee } => {
            let issue = store.assign(issue_id, assignee.clone())?;
            println!("{} -> {}", issue.id, issue.assigned_to.as_deref().unwrap_or("unassigned"));
        }
        Command::Tag { issue_id, tags } => {
            let issue = store.set_tags(issue_id, tags.clone())?;
            println!("{} tags: {}", issue.id, issue.tags.join(", "));
        }
        Command::SetPriority { issue_id, priority, reason } => {
            let issue = store.override_priority(issue_id, *priority, reason.clone())?;
            println!("{} -> {} ({})", issue.id, issue.priority, issue.priority_reason);
        }
        Command::ResetPriority { issue_id } => {
            let issue = store.reset_priority(issue_id)?;
            println!("{} -> {} ({})", issue.id, issue.priority, issue.priority_reason);
        }
        Command::Themes { json } => {
            let cap = backend(&args).await?;
            let themes = orchestrator::analyze_themes(&cap, &store.issues()?, &opts).await;
            if *json {
                println!("{}", serde_json::to_string_pretty(&themes)?);
            } else {
                print!("{}", render::render_themes_markdown(&themes));
            }
        }
        Command::Insights { all } => print!("{}", render::render_insights_markdown(&store.insights(*all)?)),
        Command::Dismiss { insight_id } => {
            let insight = store.dismiss_insight(insight_id)?;
            println!("Dismissed {}", insight.id);
        }
        Command::RegenerateInsights => {
            let insights = orchestrator::regenerate_insights(&store)?;
            print!("{}", render::render_insights_markdown(&insights));
        }
        Command::Summary => {
            let issues = store.issues()?;
            print!("{}", render::render_summary(&quick_summary(&issues), &IssueStats::from_issues(&issues)));
        }
        Command::Ask { question, fresh } => {
            let cap = backend(&args).await?;
            let question = question.join(" ");
            let history = if *fresh { Vec::new() } else { store.chat_history()? };
            let issues = store.list_issues(&IssueFilter::default())?;
            let answer = chat::ask(&cap, &question, &issues, &history, opts.call_timeout).await;
            store.append_chat(vec![ChatMessage::user(&question), ChatMessage::assistant(&answer)])?;
            println!("{}", answer);
        }
        Command::Config { action } => match action {
            ConfigAction::Show => print!("{}", render::render_priority_config(&store.priority_config()?)),
            ConfigAction::Set { critical, high, medium } => {
                let mut cfg: PriorityConfig = store.priority_config()?;
                if let Some(list) = non_empty(critical.clone()) {
                    cfg.critical_keywords = list;
                }
                if let Some(list) = non_empty(high.clone()) {
                    cfg.high_keywords = list;
                }
                if let Some(list) = non_empty(medium.clone()) {
                    cfg.medium_keywords = list;
                }
                store.set_priority_config(cfg.clone())?;
                print!("{}", render::render_priority_config(&cfg));
                println!("Run `rescore` to apply the new keywords to existing issues.");
            }
            ConfigAction::Reset => print!("{}", render::render_priority_config(&store.reset_priority_config()?)),
        },
        Command::Clear { issues_only } => {
            if *issues_only {
                let n = store.clear_issues()?;
                println!("Cleared {} issues", n);
            } else {
                store.clear_all()?;
                println!("Cleared session {}", store.session());
            }
        }
    }

    debug!("Command finished - session={}", store.session());
    Ok(())
}
