use std::time::{Duration, Instant};

use serde::Serialize;

use crate::constants::DEFAULT_MAX_TRIPLETS;
use crate::error::{StageError, TranslationError};
use crate::models::{CompletionClient, CompletionResult};
use crate::progress::ConsoleProgress;
use crate::quality::signals_no_missing_knowledge;

use super::trace::{ReflectionTrace, TraceWriter};
use super::translator::Translator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionStage {
    Extract,
    Translate,
    Assess,
    Improve,
}

impl ReflectionStage {
    pub const ALL: [ReflectionStage; 4] = [
        ReflectionStage::Extract,
        ReflectionStage::Translate,
        ReflectionStage::Assess,
        ReflectionStage::Improve,
    ];

    /// 1-based position in the run.
    pub fn index(self) -> usize {
        match self {
            Self::Extract => 1,
            Self::Translate => 2,
            Self::Assess => 3,
            Self::Improve => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Translate => "translate",
            Self::Assess => "assess",
            Self::Improve => "improve",
        }
    }
}

/// Extract -> translate -> assess -> improve over one bound [`Translator`].
///
/// Stages run strictly in order, one completion call each, except that the
/// improve stage copies the initial translation verbatim (no call) when the
/// assessment reports nothing missing. Any failure aborts the run; a returned
/// trace always holds four results.
pub struct ReflectivePipeline<C> {
    translator: Translator<C>,
    max_triplets: usize,
    timeout: Option<Duration>,
    trace: TraceWriter,
    progress: ConsoleProgress,
}

impl<C: CompletionClient> ReflectivePipeline<C> {
    pub fn new(translator: Translator<C>) -> Self {
        Self {
            translator,
            max_triplets: DEFAULT_MAX_TRIPLETS,
            timeout: None,
            trace: TraceWriter::disabled(),
            progress: ConsoleProgress::new(false),
        }
    }

    #[must_use]
    pub fn with_max_triplets(mut self, max_triplets: usize) -> Self {
        self.max_triplets = max_triplets.max(1);
        self
    }

    /// Whole-run budget, checked before and after each stage. An in-flight call
    /// is never interrupted; an overrun is reported once it returns.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_trace_writer(mut self, trace: TraceWriter) -> Self {
        self.trace = trace;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ConsoleProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn translator(&self) -> &Translator<C> {
        &self.translator
    }

    pub fn translator_mut(&mut self) -> &mut Translator<C> {
        &mut self.translator
    }

    pub fn into_translator(self) -> Translator<C> {
        self.translator
    }

    pub fn reflective_translate(&mut self, source_text: &str) -> Result<ReflectionTrace, StageError> {
        let started = Instant::now();
        let pair = self
            .translator
            .languages()
            .cloned()
            .ok_or_else(|| StageError::new(ReflectionStage::Translate, TranslationError::LanguagesNotSet))?;
        let run = match self.trace.for_run(source_text) {
            Ok(run) => run,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "trace disabled for this run");
                TraceWriter::disabled()
            }
        };
        tracing::info!(languages = %pair, max_triplets = self.max_triplets, "reflective translation started");
        self.progress.info(format!(
            "Reflective translation {pair} via {}",
            self.translator.client().describe()
        ));

        let max_triplets = self.max_triplets.to_string();
        let prompt = self
            .translator
            .prompts()
            .extract_triplets
            .render(&[
                ("source_text", source_text),
                ("max_knowledge_triplets", &max_triplets),
            ])
            .map_err(|e| StageError::new(ReflectionStage::Extract, e))?;
        let knowledge = self.run_stage(ReflectionStage::Extract, &prompt, started, &run, |t| {
            t.complete(&prompt)
        })?;

        let prompt = self
            .translator
            .translate_prompt(source_text)
            .map_err(|e| StageError::new(ReflectionStage::Translate, e))?;
        let initial = self.run_stage(ReflectionStage::Translate, &prompt, started, &run, |t| {
            t.translate(source_text)
        })?;

        let prompt = self
            .translator
            .prompts()
            .assess
            .render(&[
                ("source_language", &pair.source_language),
                ("target_language", &pair.target_language),
                ("source_text", source_text),
                ("translated_text", &initial.text),
                ("knowledge_triplets", &knowledge.text),
            ])
            .map_err(|e| StageError::new(ReflectionStage::Assess, e))?;
        let assessment = self.run_stage(ReflectionStage::Assess, &prompt, started, &run, |t| {
            t.complete(&prompt)
        })?;

        let improved = if signals_no_missing_knowledge(&assessment.text) {
            self.check_deadline(ReflectionStage::Improve, started)?;
            self.progress.progress(ReflectionStage::Improve.name(), 4, 4);
            tracing::info!("assessment found nothing missing; keeping initial translation");
            run.write_step_text(4, "improve", "output", &initial.text);
            self.check_deadline(ReflectionStage::Improve, started)?;
            CompletionResult::new(
                initial.text.clone(),
                serde_json::json!({ "pass_through": true }),
            )
        } else {
            let prompt = self
                .translator
                .prompts()
                .improve
                .render(&[
                    ("source_language", &pair.source_language),
                    ("target_language", &pair.target_language),
                    ("source_text", source_text),
                    ("translated_text", &initial.text),
                    ("improvement_suggestions", &assessment.text),
                ])
                .map_err(|e| StageError::new(ReflectionStage::Improve, e))?;
            self.run_stage(ReflectionStage::Improve, &prompt, started, &run, |t| {
                t.complete(&prompt)
            })?
        };

        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "reflective translation finished");
        Ok(ReflectionTrace::new(knowledge, initial, assessment, improved))
    }

    fn run_stage<F>(
        &mut self,
        stage: ReflectionStage,
        prompt: &str,
        started: Instant,
        run: &TraceWriter,
        call: F,
    ) -> Result<CompletionResult, StageError>
    where
        F: FnOnce(&mut Translator<C>) -> Result<CompletionResult, TranslationError>,
    {
        self.check_deadline(stage, started)?;
        self.progress.progress(stage.name(), stage.index(), ReflectionStage::ALL.len());
        tracing::debug!(stage = stage.name(), index = stage.index(), "stage started");
        run.write_step_text(stage.index(), stage.name(), "prompt", prompt);

        let result = call(&mut self.translator).map_err(|e| {
            tracing::warn!(stage = stage.name(), error = %e, "stage failed");
            StageError::new(stage, e)
        })?;

        run.write_step_text(stage.index(), stage.name(), "output", &result.text);
        self.check_deadline(stage, started)?;
        Ok(result)
    }

    fn check_deadline(&self, stage: ReflectionStage, started: Instant) -> Result<(), StageError> {
        match self.timeout {
            Some(limit) if started.elapsed() >= limit => Err(StageError::new(
                stage,
                TranslationError::DeadlineExceeded {
                    elapsed: started.elapsed(),
                },
            )),
            _ => Ok(()),
        }
    }
}
