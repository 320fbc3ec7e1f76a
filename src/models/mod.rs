//! Completion clients: one blocking HTTP client per supported provider.

mod cohere;
mod llamafile;
mod ollama;
mod openai;

use std::time::Duration;

use serde::Serialize;

use crate::config::{Provider, ProviderConfig};
use crate::error::CompletionError;

pub use cohere::CohereClient;
pub use llamafile::LlamafileClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

/// Output of one model invocation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompletionResult {
    pub text: String,
    /// Provider-specific details (model name, token usage, ...). Opaque to the core.
    pub metadata: serde_json::Value,
}

impl CompletionResult {
    pub fn new(text: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn text_only(text: impl Into<String>) -> Self {
        Self::new(text, serde_json::Value::Null)
    }
}

/// Accepts a rendered prompt and returns generated text.
///
/// Implementations hold the system instruction set through
/// [`set_system_prompt`](CompletionClient::set_system_prompt) and send it with
/// every request. A client is owned by exactly one request at a time.
pub trait CompletionClient: Send {
    fn complete(&mut self, prompt: &str) -> Result<CompletionResult, CompletionError>;

    fn set_system_prompt(&mut self, prompt: &str);

    fn system_prompt(&self) -> Option<&str>;

    /// Short human-readable label, e.g. `Ollama (llama3)`.
    fn describe(&self) -> String;
}

impl<C: CompletionClient + ?Sized> CompletionClient for Box<C> {
    fn complete(&mut self, prompt: &str) -> Result<CompletionResult, CompletionError> {
        (**self).complete(prompt)
    }

    fn set_system_prompt(&mut self, prompt: &str) {
        (**self).set_system_prompt(prompt);
    }

    fn system_prompt(&self) -> Option<&str> {
        (**self).system_prompt()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Builds the client for the configured provider.
pub fn build_client(cfg: &ProviderConfig) -> Result<Box<dyn CompletionClient>, CompletionError> {
    tracing::info!(
        provider = %cfg.provider,
        model = %cfg.model,
        temperature = cfg.temperature,
        "building completion client"
    );
    let http = http_client(cfg.request_timeout)?;
    let client: Box<dyn CompletionClient> = match cfg.provider {
        Provider::Cohere => Box::new(CohereClient::new(http, cfg)?),
        Provider::Llamafile => Box::new(LlamafileClient::new(http, cfg)),
        Provider::Ollama => Box::new(OllamaClient::new(http, cfg)),
        Provider::OpenAi => Box::new(OpenAiClient::new(http, cfg)?),
    };
    Ok(client)
}

fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client, CompletionError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?;
    Ok(client)
}

fn require_api_key(cfg: &ProviderConfig) -> Result<String, CompletionError> {
    cfg.api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CompletionError::Config(format!("{} API key not provided", cfg.provider)))
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn post_json(
    http: &reqwest::blocking::Client,
    provider: &str,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
) -> Result<serde_json::Value, CompletionError> {
    let mut request = http.post(url).json(body);
    if let Some(key) = bearer {
        request = request.bearer_auth(key);
    }
    let response = request.send()?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(CompletionError::Provider {
            provider: provider.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    let value: serde_json::Value = response.json()?;
    Ok(value)
}

fn text_at<'a>(
    value: &'a serde_json::Value,
    pointer: &str,
    provider: &str,
) -> Result<&'a str, CompletionError> {
    value
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .ok_or_else(|| CompletionError::InvalidResponse {
            provider: provider.to_string(),
            detail: format!("missing `{pointer}` in response"),
        })
}

fn metadata(provider: &str, model: &str, usage: Option<&serde_json::Value>) -> serde_json::Value {
    let mut meta = serde_json::json!({
        "provider": provider,
        "model": model,
    });
    if let (Some(usage), Some(obj)) = (usage, meta.as_object_mut()) {
        obj.insert("usage".to_string(), usage.clone());
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedClient;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            endpoint("http://localhost:11434/", "/api/chat"),
            "http://localhost:11434/api/chat"
        );
        assert_eq!(
            endpoint("https://api.openai.com", "v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn text_at_reports_missing_field() {
        let v = serde_json::json!({"choices": []});
        let err = text_at(&v, "/choices/0/message/content", "Open AI").unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse { .. }));
    }

    #[test]
    fn text_at_accepts_empty_string() {
        let v = serde_json::json!({"message": {"content": ""}});
        assert_eq!(text_at(&v, "/message/content", "Ollama").unwrap(), "");
    }

    #[test]
    fn metadata_includes_usage_when_present() {
        let usage = serde_json::json!({"total_tokens": 12});
        let meta = metadata("Ollama", "llama3", Some(&usage));
        assert_eq!(meta["usage"]["total_tokens"], 12);
        assert!(metadata("Ollama", "llama3", None).get("usage").is_none());
    }

    #[test]
    fn boxed_client_forwards_calls() {
        let mut boxed: Box<dyn CompletionClient> = Box::new(ScriptedClient::new(["ok"]));
        boxed.set_system_prompt("sys");
        assert_eq!(boxed.system_prompt(), Some("sys"));
        assert_eq!(boxed.complete("hi").unwrap().text, "ok");
    }

    #[test]
    fn build_client_rejects_missing_openai_key() {
        let cfg = ProviderConfig::defaults_for(Provider::OpenAi);
        let err = build_client(&cfg).err().expect("missing key must fail");
        assert!(matches!(err, CompletionError::Config(_)));
    }

    #[test]
    fn build_client_ollama_needs_no_key() {
        let cfg = ProviderConfig::defaults_for(Provider::Ollama);
        let client = build_client(&cfg).unwrap();
        assert_eq!(client.describe(), "Ollama (llama3)");
        assert_eq!(client.system_prompt(), None);
    }
}
