use serde_json::json;

use super::{endpoint, metadata, post_json, require_api_key, text_at, CompletionClient, CompletionResult};
use crate::config::ProviderConfig;
use crate::constants::DEFAULT_OPENAI_URL;
use crate::error::CompletionError;

const PROVIDER: &str = "Open AI";

pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    system_prompt: Option<String>,
}

impl OpenAiClient {
    pub fn new(http: reqwest::blocking::Client, cfg: &ProviderConfig) -> Result<Self, CompletionError> {
        Ok(Self {
            http,
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            api_key: require_api_key(cfg)?,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            system_prompt: None,
        })
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(&mut self, prompt: &str) -> Result<CompletionResult, CompletionError> {
        chat_completion(
            &self.http,
            PROVIDER,
            &self.base_url,
            Some(&self.api_key),
            &self.model,
            self.temperature,
            self.system_prompt.as_deref(),
            prompt,
        )
    }

    fn set_system_prompt(&mut self, prompt: &str) {
        self.system_prompt = Some(prompt.to_string());
    }

    fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    fn describe(&self) -> String {
        format!("{PROVIDER} ({})", self.model)
    }
}

/// OpenAI-compatible `/v1/chat/completions` request. Llamafile serves the same API.
#[allow(clippy::too_many_arguments)]
pub(super) fn chat_completion(
    http: &reqwest::blocking::Client,
    provider: &str,
    base_url: &str,
    api_key: Option<&str>,
    model: &str,
    temperature: f32,
    system_prompt: Option<&str>,
    prompt: &str,
) -> Result<CompletionResult, CompletionError> {
    let body = json!({
        "model": model,
        "temperature": temperature,
        "messages": chat_messages(system_prompt, prompt),
    });
    let url = endpoint(base_url, "v1/chat/completions");
    let value = post_json(http, provider, &url, api_key, &body)?;
    let text = text_at(&value, "/choices/0/message/content", provider)?;
    Ok(CompletionResult::new(
        text,
        metadata(provider, model, value.get("usage")),
    ))
}

pub(super) fn chat_messages(system_prompt: Option<&str>, prompt: &str) -> serde_json::Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": prompt}));
    serde_json::Value::Array(messages)
}
