use std::fmt;

use serde::Serialize;

use crate::constants::DEFAULT_LOG_MAX_CHARS;
use crate::error::{TemplateError, TranslationError};
use crate::models::{CompletionClient, CompletionResult};
use crate::quality::clip_for_log;

use super::prompts::PromptSet;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct LanguagePair {
    pub source_language: String,
    pub target_language: String,
}

impl LanguagePair {
    pub fn new(source_language: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            source_language: source_language.into(),
            target_language: target_language.into(),
        }
    }

    #[must_use]
    pub fn reversed(&self) -> Self {
        Self::new(self.target_language.clone(), self.source_language.clone())
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_language, self.target_language)
    }
}

/// A completion client bound to one language pair.
///
/// Owned by a single request. The core does not check that the two languages
/// differ; callers validate that before binding.
pub struct Translator<C> {
    client: C,
    prompts: PromptSet,
    languages: Option<LanguagePair>,
    system_prompt: Option<String>,
    log_max_chars: usize,
}

impl<C: CompletionClient> Translator<C> {
    pub fn new(client: C) -> Self {
        Self::with_prompts(client, PromptSet::builtin())
    }

    pub fn with_prompts(client: C, prompts: PromptSet) -> Self {
        Self {
            client,
            prompts,
            languages: None,
            system_prompt: None,
            log_max_chars: DEFAULT_LOG_MAX_CHARS,
        }
    }

    pub fn with_languages(
        client: C,
        source_language: &str,
        target_language: &str,
    ) -> Result<Self, TemplateError> {
        let mut t = Self::new(client);
        t.switch_languages(source_language, target_language)?;
        Ok(t)
    }

    #[must_use]
    pub fn with_log_max_chars(mut self, max_chars: usize) -> Self {
        self.log_max_chars = max_chars;
        self
    }

    /// Rebinds both languages and pushes the re-rendered system instruction to
    /// the client. Nothing changes if the system template fails to render.
    pub fn switch_languages(
        &mut self,
        source_language: &str,
        target_language: &str,
    ) -> Result<(), TemplateError> {
        let system = self.prompts.system.render(&[
            ("source_language", source_language),
            ("target_language", target_language),
        ])?;
        self.client.set_system_prompt(&system);
        self.languages = Some(LanguagePair::new(source_language, target_language));
        self.system_prompt = Some(system);
        tracing::debug!(
            source = source_language,
            target = target_language,
            "switched translation languages"
        );
        Ok(())
    }

    pub fn languages(&self) -> Option<&LanguagePair> {
        self.languages.as_ref()
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_client(self) -> C {
        self.client
    }

    pub fn log_max_chars(&self) -> usize {
        self.log_max_chars
    }

    /// The prompt [`translate`](Self::translate) would send for `source_text`.
    pub fn translate_prompt(&self, source_text: &str) -> Result<String, TranslationError> {
        let pair = self.languages.as_ref().ok_or(TranslationError::LanguagesNotSet)?;
        let prompt = self.prompts.translate.render(&[
            ("source_language", &pair.source_language),
            ("target_language", &pair.target_language),
            ("source_text", source_text),
        ])?;
        Ok(prompt)
    }

    /// One completion call, no retry.
    pub fn translate(&mut self, source_text: &str) -> Result<CompletionResult, TranslationError> {
        let prompt = self.translate_prompt(source_text)?;
        self.complete(&prompt)
    }

    /// Sends an already rendered prompt through the bound client.
    pub fn complete(&mut self, prompt: &str) -> Result<CompletionResult, TranslationError> {
        tracing::debug!(prompt = %clip_for_log(prompt, self.log_max_chars), "completion request");
        let result = self.client.complete(prompt)?;
        tracing::debug!(
            output = %clip_for_log(&result.text, self.log_max_chars),
            "completion response"
        );
        Ok(result)
    }
}
