use anyhow::{anyhow, Result};
use awful_aj::{api::ask, config::AwfulJadeConfig, template::ChatTemplate};
use tracing::{debug, info, warn};

use crate::api_types::ThemeLabel;
use crate::budget::approx_tokens;
use crate::capability::{parse_polarity, parse_summary, parse_themes, Capabilities, CapabilityError, Summary, ThemeDigest};
use crate::prompts::{user_polarity, user_summary, user_theme_labels};
use crate::sentiment::Sentiment;

/// One chat completion; `what` names the capability in the logs.
pub async fn llm_call(cfg: &AwfulJadeConfig, tpl: &ChatTemplate, user: &str, what: &str) -> Result<String> {
    let start = std::time::Instant::now();

    debug!(
        "LLM {} call starting - prompt_length={} chars, approx_tokens={}",
        what,
        user.len(),
        approx_tokens(user)
    );

    // awful_aj errors are Box<dyn Error> (not Send); flatten to text
    let answer = ask(cfg, user.to_string(), tpl, None, None, false)
        .await
        .map_err(|e| anyhow!("{} call: {}", what, e))?;

    info!(
        "LLM {} call completed - duration={:.2}s, response_length={} chars",
        what,
        start.elapsed().as_secs_f32(),
        answer.len()
    );

    Ok(answer)
}

/// One chat template per capability, loaded by name in `main`.
pub struct Templates {
    pub sentiment: ChatTemplate,
    pub summary: ChatTemplate,
    pub themes: ChatTemplate,
    pub chat: ChatTemplate,
}

/// Capabilities backed by an OpenAI-compatible endpoint through awful_aj.
pub struct LlmCapabilities {
    cfg: AwfulJadeConfig,
    templates: Templates,
}

impl LlmCapabilities {
    pub fn new(cfg: AwfulJadeConfig, templates: Templates) -> Self {
        Self { cfg, templates }
    }

    async fn call(&self, tpl: &ChatTemplate, user: &str, what: &str) -> Result<String, CapabilityError> {
        llm_call(&self.cfg, tpl, user, what).await.map_err(|e| {
            warn!("LLM {} call failed - error={}", what, e);
            CapabilityError::Transport(e.to_string())
        })
    }
}

impl Capabilities for LlmCapabilities {
    async fn polarity(&self, text: &str) -> Result<Sentiment, CapabilityError> {
        let raw = self.call(&self.templates.sentiment, &user_polarity(text), "polarity").await?;
        parse_polarity(&raw)
    }

    async fn summarize(&self, title: &str, body: &str) -> Result<Summary, CapabilityError> {
        let raw = self.call(&self.templates.summary, &user_summary(title, body), "summary").await?;
        parse_summary(&raw)
    }

    async fn label_themes(&self, themes: &[ThemeDigest]) -> Result<Vec<ThemeLabel>, CapabilityError> {
        let raw = self.call(&self.templates.themes, &user_theme_labels(themes), "themes").await?;
        parse_themes(&raw)
    }

    async fn answer(&self, prompt: &str) -> Result<String, CapabilityError> {
        let raw = self.call(&self.templates.chat, prompt, "chat").await?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CapabilityError::Unparseable("empty answer".into()));
        }
        Ok(trimmed.to_string())
    }
}
