pub mod agent;
pub mod agentflow;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod quality;

#[cfg(test)]
mod testing;

pub use agent::{AgentAction, AgentStep, AgenticOutcome};
pub use agentflow::{AgenticController, CompletionReasoner, ReasoningEngine};
pub use error::{
    CompletionError, ControllerError, ReasonerError, StageError, TemplateError, TranslationError,
};
pub use models::{build_client, CompletionClient, CompletionResult};
pub use pipeline::{LanguagePair, ReflectionStage, ReflectionTrace, ReflectivePipeline, Translator};
