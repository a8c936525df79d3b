use crate::budget::truncate_chars;
use crate::insights::{percent, IssueStats, QuickSummary};
use crate::models::{ConnectedSource, Insight, Issue, Priority, PriorityConfig, ThemeGroup};

const TITLE_WIDTH: usize = 60;

fn clip(s: &str, width: usize) -> String {
    let one_line = s.replace(['\n', '\r'], " ");
    if one_line.chars().count() <= width {
        one_line
    } else {
        format!("{}…", truncate_chars(&one_line, width.saturating_sub(1)))
    }
}

pub fn render_issue_table(issues: &[Issue]) -> String {
    if issues.is_empty() {
        return "No issues.\n".to_string();
    }
    let mut out = format!(
        "{:<26} {:<8} {:<13} {:<11} {:<8} {}\n",
        "ID", "PRIORITY", "CATEGORY", "STATUS", "SOURCE", "TITLE"
    );
    for i in issues {
        let flag = if i.priority_override { "*" } else { "" };
        out.push_str(&format!(
            "{:<26} {:<8} {:<13} {:<11} {:<8} {}\n",
            i.id,
            format!("{}{}", i.priority, flag),
            i.category,
            i.status,
            i.source,
            clip(&i.title, TITLE_WIDTH)
        ));
    }
    out
}

pub fn render_issue_detail(i: &Issue) -> String {
    let mut out = format!("{}\n{}\n\n", i.title, "=".repeat(i.title.chars().count().min(80)));
    out.push_str(&format!("id:        {}\n", i.id));
    out.push_str(&format!("priority:  {} ({})\n", i.priority, i.priority_reason));
    if let Some(original) = i.original_priority.filter(|_| i.priority_override) {
        out.push_str(&format!("computed:  {}\n", original));
    }
    out.push_str(&format!("category:  {}\n", i.category));
    out.push_str(&format!("sentiment: {} ({:+.2})\n", i.sentiment_label, i.sentiment_score));
    out.push_str(&format!("status:    {}\n", i.status));
    out.push_str(&format!("assignee:  {}\n", i.assigned_to.as_deref().unwrap_or("-")));
    if !i.tags.is_empty() {
        out.push_str(&format!("tags:      {}\n", i.tags.join(", ")));
    }
    out.push_str(&format!("source:    {} by {}\n", i.source, i.author));
    if !i.source_url.is_empty() {
        out.push_str(&format!("url:       {}\n", i.source_url));
    }
    out.push_str(&format!("\n{}\n", i.summary.trim()));
    out
}

pub fn render_sources(sources: &[ConnectedSource]) -> String {
    if sources.is_empty() {
        return "No connected sources.\n".to_string();
    }
    let mut out = format!("{:<22} {:<8} {:>6}  {:<20} {}\n", "ID", "KIND", "ITEMS", "LAST SYNCED", "SOURCE");
    for s in sources {
        let synced = s
            .last_synced
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        out.push_str(&format!(
            "{:<22} {:<8} {:>6}  {:<20} {}\n",
            s.id,
            s.config.source(),
            s.item_count,
            synced,
            s.config.describe()
        ));
    }
    out
}

pub fn render_themes_markdown(themes: &[ThemeGroup]) -> String {
    let mut md = String::from("# Themes\n\n");
    if themes.is_empty() {
        md.push_str("_No analyzed issues yet._\n");
        return md;
    }
    for t in themes {
        md.push_str(&format!("## {} ({})\n", t.label, t.issue_count));
        md.push_str(&format!("{}\n\n", t.description.trim()));
        md.push_str(&format!("- Priority: **{}**\n- Sentiment: {}\n", t.priority, t.sentiment));
        for i in &t.issues {
            md.push_str(&format!("  - [{}] {}\n", i.priority, clip(&i.title, TITLE_WIDTH)));
        }
        if t.issue_count > t.issues.len() {
            md.push_str(&format!("  - … and {} more\n", t.issue_count - t.issues.len()));
        }
        md.push('\n');
    }
    md
}

pub fn render_insights_markdown(insights: &[Insight]) -> String {
    let mut md = String::from("# Insights\n\n");
    if insights.is_empty() {
        md.push_str("_No open insights._\n");
        return md;
    }
    for i in insights {
        let dismissed = if i.dismissed { " (dismissed)" } else { "" };
        md.push_str(&format!("## {}{}\n", i.title, dismissed));
        md.push_str(&format!(
            "`{}` · {} · impact {} · effort {}\n\n",
            i.id,
            i.kind.as_str(),
            i.impact.as_str(),
            i.effort.as_str()
        ));
        md.push_str(&format!("{}\n\n**Action:** {}\n", i.description, i.action));
        if !i.related_issue_ids.is_empty() {
            md.push_str(&format!("\nRelated: {}\n", i.related_issue_ids.join(", ")));
        }
        md.push('\n');
    }
    md
}

pub fn render_summary(q: &QuickSummary, stats: &IssueStats) -> String {
    let mut out = format!("{}\n\n", q.headline);
    for m in &q.metrics {
        out.push_str(&format!("  {:<12} {}\n", m.label, m.value));
    }
    out.push_str(&format!("\n{}\n", q.recommendation));

    if stats.total > 0 {
        out.push_str("\nBy priority:\n");
        for p in Priority::DESCENDING {
            let n = stats.count(p);
            out.push_str(&format!("  {:<12} {:>4}  {:>3}%\n", p, n, percent(n, stats.total)));
        }
        out.push_str("By status:\n");
        for (s, n) in &stats.by_status {
            out.push_str(&format!("  {:<12} {:>4}\n", s, n));
        }
        out.push_str("By source:\n");
        for (s, n) in &stats.by_source {
            out.push_str(&format!("  {:<12} {:>4}\n", s, n));
        }
    }
    out
}

pub fn render_priority_config(cfg: &PriorityConfig) -> String {
    format!(
        "critical: {}\nhigh:     {}\nmedium:   {}\n",
        cfg.critical_keywords.join(", "),
        cfg.high_keywords.join(", "),
        cfg.medium_keywords.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::tests::issue;
    use crate::models::{Category, SentimentLabel};

    #[test]
    fn clip_marks_truncation() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("line\nbreak", 20), "line break");
        assert_eq!(clip("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn table_flags_overrides() {
        let mut i = issue(1, Priority::High, Category::Bug, SentimentLabel::Negative);
        i.priority_override = true;
        let table = render_issue_table(&[i]);
        assert!(table.lines().nth(1).unwrap().contains("high*"));
        assert_eq!(render_issue_table(&[]), "No issues.\n");
    }
}
