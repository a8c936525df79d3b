use crate::budget::{truncate_chars, SENTIMENT_INPUT_CHARS, SUMMARY_BODY_CHARS};
use crate::capability::ThemeDigest;
use crate::chat::{ChatMessage, Role};
use crate::insights::IssueStats;
use crate::models::Issue;

pub fn user_polarity(text: &str) -> String {
    format!(r#"Classify the sentiment of this product feedback.

FEEDBACK:
<{text}>

Respond in this exact JSON format only, no other text:
{{"label": "one of: negative, neutral, positive", "score": 0.0}}
where score is your confidence between 0 and 1."#, text = truncate_chars(text, SENTIMENT_INPUT_CHARS))
}

pub fn user_summary(title: &str, body: &str) -> String {
    format!(r#"Analyze this feedback and provide a brief summary and category.

Title: {title}
Content: {body}

Respond in this exact JSON format only, no other text:
{{"summary": "one sentence summary of the core issue", "category": "one of: bug, feature, performance, ux, documentation, security, other"}}"#,
        title = title,
        body = truncate_chars(body, SUMMARY_BODY_CHARS))
}

pub fn user_theme_labels(themes: &[ThemeDigest]) -> String {
    let lines: Vec<String> = themes
        .iter()
        .map(|t| {
            let samples: Vec<String> = t.sample_titles.iter().map(|s| format!("\"{}\"", s)).collect();
            format!("- {} ({} issues): {}", t.category, t.count, samples.join(", "))
        })
        .collect();

    format!(r#"Analyze these feedback categories and provide clear labels.

CATEGORIES:
{categories}

For each category, provide a user-friendly label and brief description.
JSON only:
{{"themes": [{{"category": "original_category", "label": "User-Friendly Label", "description": "Brief description of what users are reporting"}}]}}"#,
        categories = lines.join("\n"))
}

/// Chat prompt: aggregate counts, a numbered sample of issues, recent turns
/// (already bounded by the caller) and the question.
pub fn user_chat(stats: &IssueStats, sample: &[&Issue], history: &[ChatMessage], question: &str) -> String {
    let categories: Vec<String> = stats.by_category.iter().map(|(c, n)| format!("{}: {}", c, n)).collect();
    let issues: Vec<String> = sample
        .iter()
        .enumerate()
        .map(|(idx, i)| format!("{}. [{}] {}", idx + 1, i.priority, i.title))
        .collect();

    let mut prompt = format!(r#"You are an assistant helping a Product Manager analyze user feedback.

DATA:
- Total: {total} issues
- Priority: {critical} critical, {high} high, {medium} medium, {low} low
- Sentiment: {negative} negative, {neutral} neutral, {positive} positive
- Categories: {categories}

SAMPLE ISSUES:
{issues}

Answer concisely based on this data. Be specific and actionable."#,
        total = stats.total,
        critical = stats.critical,
        high = stats.high,
        medium = stats.medium,
        low = stats.low,
        negative = stats.negative,
        neutral = stats.neutral,
        positive = stats.positive,
        categories = categories.join(", "),
        issues = issues.join("\n"));

    prompt.push_str("\n\n");
    if !history.is_empty() {
        let turns: Vec<String> = history
            .iter()
            .map(|m| {
                let who = match m.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                format!("{}: {}", who, m.content)
            })
            .collect();
        prompt.push_str(&format!("Previous:\n{}\n\n", turns.join("\n")));
    }
    prompt.push_str(&format!("User: {}\n\nAssistant:", question));
    prompt
}
