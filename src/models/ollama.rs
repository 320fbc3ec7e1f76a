use serde_json::json;

use super::openai::chat_messages;
use super::{endpoint, metadata, post_json, text_at, CompletionClient, CompletionResult};
use crate::config::ProviderConfig;
use crate::constants::DEFAULT_OLLAMA_URL;
use crate::error::CompletionError;

const PROVIDER: &str = "Ollama";

pub struct OllamaClient {
    http: reqwest::blocking::Client,
    url: String,
    model: String,
    temperature: f32,
    system_prompt: Option<String>,
}

impl OllamaClient {
    pub fn new(http: reqwest::blocking::Client, cfg: &ProviderConfig) -> Self {
        Self {
            http,
            url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            system_prompt: None,
        }
    }
}

impl CompletionClient for OllamaClient {
    fn complete(&mut self, prompt: &str) -> Result<CompletionResult, CompletionError> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": chat_messages(self.system_prompt.as_deref(), prompt),
            "options": { "temperature": self.temperature },
        });
        let url = endpoint(&self.url, "api/chat");
        let value = post_json(&self.http, PROVIDER, &url, None, &body)?;
        let text = text_at(&value, "/message/content", PROVIDER)?;

        let usage = json!({
            "prompt_eval_count": value.get("prompt_eval_count"),
            "eval_count": value.get("eval_count"),
        });
        Ok(CompletionResult::new(
            text,
            metadata(PROVIDER, &self.model, Some(&usage)),
        ))
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
