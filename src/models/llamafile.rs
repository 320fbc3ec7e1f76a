use super::openai::chat_completion;
use super::{CompletionClient, CompletionResult};
use crate::config::ProviderConfig;
use crate::constants::{DEFAULT_LLAMAFILE_MODEL, DEFAULT_LLAMAFILE_URL};
use crate::error::CompletionError;

const PROVIDER: &str = "Llamafile";

/// A local llamafile server. The model is fixed by the server, the name is informational.
pub struct LlamafileClient {
    http: reqwest::blocking::Client,
    url: String,
    model: String,
    temperature: f32,
    system_prompt: Option<String>,
}

impl LlamafileClient {
    pub fn new(http: reqwest::blocking::Client, cfg: &ProviderConfig) -> Self {
        let model = if cfg.model.trim().is_empty() {
            DEFAULT_LLAMAFILE_MODEL.to_string()
        } else {
            cfg.model.clone()
        };
        Self {
            http,
            url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_LLAMAFILE_URL.to_string()),
            model,
            temperature: cfg.temperature,
            system_prompt: None,
        }
    }
}

impl CompletionClient for LlamafileClient {
    fn complete(&mut self, prompt: &str) -> Result<CompletionResult, CompletionError> {
        chat_completion(
            &self.http,
            PROVIDER,
            &self.url,
            None,
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
        format!("{PROVIDER} ({})", self.url)
    }
}
