mod config;
mod prompts;
mod reflective;
mod trace;
mod translator;

pub use config::{init_default_config, PipelineConfig, PipelineOverrides};
pub use prompts::{
    default_prompt_files, PromptSet, PromptTemplate, DEFAULT_PROMPTS_DIR, NO_MISSING_KNOWLEDGE,
};
pub use reflective::{ReflectionStage, ReflectivePipeline};
pub use trace::{ReflectionTrace, TraceWriter};
pub use translator::{LanguagePair, Translator};
