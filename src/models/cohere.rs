use serde_json::json;

use super::{endpoint, metadata, post_json, require_api_key, text_at, CompletionClient, CompletionResult};
use crate::config::ProviderConfig;
use crate::constants::DEFAULT_COHERE_URL;
use crate::error::CompletionError;

const PROVIDER: &str = "Cohere";

/// Cohere chat API. The system instruction travels as the `preamble`.
pub struct CohereClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    preamble: Option<String>,
}

impl CohereClient {
    pub fn new(http: reqwest::blocking::Client, cfg: &ProviderConfig) -> Result<Self, CompletionError> {
        Ok(Self {
            http,
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_COHERE_URL.to_string()),
            api_key: require_api_key(cfg)?,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            preamble: None,
        })
    }
}

impl CompletionClient for CohereClient {
    fn complete(&mut self, prompt: &str) -> Result<CompletionResult, CompletionError> {
        let mut body = json!({
            "model": self.model,
            "message": prompt,
            "temperature": self.temperature,
        });
        if let (Some(preamble), Some(obj)) = (self.preamble.as_ref(), body.as_object_mut()) {
            obj.insert("preamble".to_string(), json!(preamble));
        }

        let url = endpoint(&self.base_url, "v1/chat");
        let value = post_json(&self.http, PROVIDER, &url, Some(&self.api_key), &body)?;
        let text = text_at(&value, "/text", PROVIDER)?;
        let usage = value.pointer("/meta/billed_units");
        Ok(CompletionResult::new(
            text,
            metadata(PROVIDER, &self.model, usage),
        ))
    }

    fn set_system_prompt(&mut self, prompt: &str) {
        self.preamble = Some(prompt.to_string());
    }

    fn system_prompt(&self) -> Option<&str> {
        self.preamble.as_deref()
    }

    fn describe(&self) -> String {
        format!("{PROVIDER} ({})", self.model)
    }
}
