//! Test doubles shared by unit tests.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::CompletionError;
use crate::models::{CompletionClient, CompletionResult};

/// Replies from a fixed script and records every prompt it receives.
pub struct ScriptedClient {
    script: VecDeque<Result<String, String>>,
    prompts: Vec<String>,
    system_prompts: Vec<String>,
    delays: Vec<(usize, Duration)>,
}

impl ScriptedClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(replies.into_iter().map(|s| Ok(s.into())).collect())
    }

    /// `Err(msg)` entries fail that call with an invalid-response error.
    pub fn from_results(script: Vec<Result<String, String>>) -> Self {
        Self {
            script: script.into(),
            prompts: Vec::new(),
            system_prompts: Vec::new(),
            delays: Vec::new(),
        }
    }

    /// Sleeps for `delay` before answering the `call`-th (1-based) request.
    pub fn with_delay(mut self, call: usize, delay: Duration) -> Self {
        self.delays.push((call, delay));
        self
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn system_prompts(&self) -> &[String] {
        &self.system_prompts
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(&mut self, prompt: &str) -> Result<CompletionResult, CompletionError> {
        self.prompts.push(prompt.to_string());
        let call = self.prompts.len();
        for (_, delay) in self.delays.iter().filter(|(n, _)| *n == call) {
            std::thread::sleep(*delay);
        }
        match self.script.pop_front() {
            Some(Ok(text)) => Ok(CompletionResult::new(
                text,
                serde_json::json!({"provider": "scripted", "call": self.prompts.len()}),
            )),
            Some(Err(detail)) => Err(CompletionError::InvalidResponse {
                provider: "scripted".to_string(),
                detail,
            }),
            None => Err(CompletionError::InvalidResponse {
                provider: "scripted".to_string(),
                detail: "script exhausted".to_string(),
            }),
        }
    }

    fn set_system_prompt(&mut self, prompt: &str) {
        self.system_prompts.push(prompt.to_string());
    }

    fn system_prompt(&self) -> Option<&str> {
        self.system_prompts.last().map(String::as_str)
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
