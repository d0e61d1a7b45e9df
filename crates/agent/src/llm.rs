use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use carelane_core::config::LlmConfig;

/// Transport boundary to the planning model: prompt in, raw text out.
///
/// Implementations never interpret the completion. Parsing, validation,
/// and every decision about what the text means happen upstream, so a
/// planner backend can be swapped (or scripted in tests) without touching
/// the run semantics.
#[async_trait]
pub trait PlannerClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini `generateContent` client over plain HTTPS with API-key auth.
///
/// Temperature is pinned to zero: the planner is asked for the most
/// deterministic plan the model can produce, not for creativity.
pub struct GeminiPlanner {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_output_tokens: u32,
}

impl GeminiPlanner {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().context("llm.api_key is not configured")?;
        let base_url =
            config.base_url.clone().unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string());

        Self::new(api_key, base_url, &config.model, config.timeout_secs, config.max_output_tokens)
    }

    pub fn new(
        api_key: SecretString,
        base_url: impl Into<String>,
        model: &str,
        timeout_secs: u64,
        max_output_tokens: u32,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .context("could not build HTTP client for the planner")?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.into(),
            model: normalize_model_name(model),
            max_output_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl PlannerClient for GeminiPlanner {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = json!({
            "contents": [
                { "role": "user", "parts": [{ "text": prompt }] }
            ],
            "generationConfig": {
                "temperature": 0.0,
                "maxOutputTokens": self.max_output_tokens,
            },
        });

        // The key travels as a query parameter, so transport errors drop
        // their URL before they can surface anywhere.
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("planner request failed")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("planner response body was unreadable")?;

        if !status.is_success() {
            anyhow::bail!(
                "Gemini API error (HTTP {}). Check the configured model and API access. Response: {}",
                status.as_u16(),
                response_snippet(&text),
            );
        }

        extract_completion_text(&text)
    }
}

/// Accepts both `gemini-...` and `models/gemini-...` spellings.
fn normalize_model_name(model: &str) -> String {
    let trimmed = model.trim();
    trimmed.strip_prefix("models/").unwrap_or(trimmed).to_string()
}

/// Pulls the concatenated candidate text out of a `generateContent`
/// response. An unexpected but valid-JSON shape is handed back whole so
/// the plan parser upstream can degrade it to a refusal.
fn extract_completion_text(body: &str) -> Result<String> {
    let data: Value =
        serde_json::from_str(body).context("Gemini returned a non-JSON response body")?;

    let parts = data
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array);

    if let Some(parts) = parts {
        let texts: Vec<&str> =
            parts.iter().filter_map(|part| part.get("text").and_then(Value::as_str)).collect();
        if !texts.is_empty() {
            return Ok(texts.concat());
        }
    }

    Ok(data.to_string())
}

/// Squashes an error body onto one line and caps it, so an upstream HTML
/// error page cannot flood the surfaced message.
fn response_snippet(body: &str) -> String {
    let squashed = body.trim().replace('\n', " ");
    if squashed.chars().count() > 400 {
        let mut snippet: String = squashed.chars().take(400).collect();
        snippet.push('…');
        snippet
    } else {
        squashed
    }
}

/// Replaces every `key=` query value in `message` with `***`.
///
/// Belt-and-braces for surfaced errors: even though the Gemini client
/// strips URLs from transport failures, anything printed to an operator
/// goes through this first.
pub fn redact_api_keys(message: &str) -> String {
    let mut output = String::with_capacity(message.len());
    let mut rest = message;

    while let Some(position) = find_key_param(rest) {
        let marker_end = position + "?key=".len();
        output.push_str(&rest[..marker_end]);
        output.push_str("***");

        let after = &rest[marker_end..];
        let value_len =
            after.find(|ch: char| ch == '&' || ch.is_whitespace()).unwrap_or(after.len());
        rest = &after[value_len..];
    }

    output.push_str(rest);
    output
}

fn find_key_param(text: &str) -> Option<usize> {
    text.char_indices().find_map(|(index, ch)| {
        if ch != '?' && ch != '&' {
            return None;
        }
        let after = &text.as_bytes()[index + 1..];
        (after.len() >= 4 && after[..4].eq_ignore_ascii_case(b"key=")).then_some(index)
    })
}
