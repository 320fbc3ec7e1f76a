//! Error types for the translation core.

use std::time::Duration;

use thiserror::Error;

use crate::agent::AgentStep;
use crate::pipeline::ReflectionStage;

/// A prompt template could not be rendered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template `{template}` references placeholder `{{{placeholder}}}` with no value")]
    MissingPlaceholder { template: String, placeholder: String },

    #[error("template `{template}` references unknown placeholder `{{{placeholder}}}`")]
    UnknownPlaceholder { template: String, placeholder: String },
}

/// One completion round trip failed.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned {status}: {body}")]
    Provider {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("invalid response from {provider}: {detail}")]
    InvalidResponse { provider: String, detail: String },

    #[error("client configuration error: {0}")]
    Config(String),
}

/// A translation-level operation failed.
#[derive(Error, Debug)]
pub enum TranslationError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("source and target languages are not set; call switch_languages first")]
    LanguagesNotSet,

    #[error("request deadline exceeded after {elapsed:?}")]
    DeadlineExceeded { elapsed: Duration },
}

/// A reflective pipeline run aborted at `stage`.
#[derive(Error, Debug)]
#[error("stage {index} ({name}) failed: {source}", index = .stage.index(), name = .stage.name())]
pub struct StageError {
    pub stage: ReflectionStage,
    #[source]
    pub source: TranslationError,
}

impl StageError {
    pub fn new(stage: ReflectionStage, source: impl Into<TranslationError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// The reasoning model could not produce a decision.
#[derive(Error, Debug)]
pub enum ReasonerError {
    /// The reply was not a usable decision. Fed back to the model as a turn.
    #[error("malformed decision: {0}")]
    Malformed(String),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// The agentic controller could not produce an answer.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("reasoning model failed: {0}")]
    Reasoner(#[source] CompletionError),

    #[error("no final answer after {max_turns} turns")]
    TurnLimitExceeded {
        max_turns: usize,
        steps: Vec<AgentStep>,
    },

    #[error("request deadline exceeded after {elapsed:?}")]
    DeadlineExceeded { elapsed: Duration },

    #[error("source and target languages are not set; call switch_languages first")]
    LanguagesNotSet,

    #[error(transparent)]
    Template(#[from] TemplateError),
}
