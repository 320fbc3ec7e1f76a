use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::agent::{
    action_specs, parse_args, render_action_catalog, render_history, ActionSpec, AgentAction,
    AgentStep, AgenticOutcome, AssessArgs, Decision, DecisionResponse, ExtractArgs, TranslateArgs,
};
use crate::constants::{DEFAULT_LOG_MAX_CHARS, DEFAULT_MAX_AGENT_TURNS, DEFAULT_MAX_TRIPLETS};
use crate::error::{ControllerError, ReasonerError, TranslationError};
use crate::models::{CompletionClient, CompletionResult};
use crate::pipeline::{LanguagePair, PromptTemplate, Translator};
use crate::progress::ConsoleProgress;
use crate::quality::{clip_for_log, must_extract_json_obj};

#[derive(Clone, Copy, Debug)]
pub struct AgentTask<'a> {
    pub source_text: &'a str,
    pub languages: &'a LanguagePair,
    pub actions: &'a [ActionSpec],
    pub steps: &'a [AgentStep],
}

pub trait ReasoningEngine {
    fn decide(&mut self, task: &AgentTask<'_>) -> Result<Decision, ReasonerError>;
}

/// Asks a completion model for one JSON decision per turn.
pub struct CompletionReasoner<C> {
    client: C,
    template: PromptTemplate,
    log_max_chars: usize,
}

impl<C: CompletionClient> CompletionReasoner<C> {
    pub fn new(client: C, template: PromptTemplate) -> Self {
        Self {
            client,
            template,
            log_max_chars: DEFAULT_LOG_MAX_CHARS,
        }
    }

    #[must_use]
    pub fn with_log_max_chars(mut self, max_chars: usize) -> Self {
        self.log_max_chars = max_chars;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn render_prompt(&self, task: &AgentTask<'_>) -> Result<String, ReasonerError> {
        let actions = render_action_catalog(task.actions);
        let history = render_history(task.steps);
        let prompt = self.template.render(&[
            ("source_language", &task.languages.source_language),
            ("target_language", &task.languages.target_language),
            ("actions", &actions),
            ("source_text", task.source_text),
            ("history", &history),
        ])?;
        Ok(prompt)
    }
}

impl<C: CompletionClient> ReasoningEngine for CompletionReasoner<C> {
    fn decide(&mut self, task: &AgentTask<'_>) -> Result<Decision, ReasonerError> {
        let prompt = self.render_prompt(task)?;
        let reply = self.client.complete(&prompt)?;
        tracing::debug!(reply = %clip_for_log(&reply.text, self.log_max_chars), "reasoner reply");

        let v = must_extract_json_obj(&reply.text)
            .map_err(|e| ReasonerError::Malformed(format!("{e:#}")))?;
        let resp: DecisionResponse = serde_json::from_value(v)
            .map_err(|e| ReasonerError::Malformed(e.to_string()))?;
        resp.into_decision().map_err(ReasonerError::Malformed)
    }
}

/// Action failures are fed back to the engine as observations.
pub struct AgenticController<C, R> {
    translator: Translator<C>,
    reasoner: R,
    max_turns: usize,
    max_triplets: usize,
    timeout: Option<Duration>,
    progress: ConsoleProgress,
}

impl<C: CompletionClient, R: ReasoningEngine> AgenticController<C, R> {
    pub fn new(translator: Translator<C>, reasoner: R) -> Self {
        Self {
            translator,
            reasoner,
            max_turns: DEFAULT_MAX_AGENT_TURNS,
            max_triplets: DEFAULT_MAX_TRIPLETS,
            timeout: None,
            progress: ConsoleProgress::new(false),
        }
    }

    #[must_use]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    #[must_use]
    pub fn with_max_triplets(mut self, max_triplets: usize) -> Self {
        self.max_triplets = max_triplets.max(1);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
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

    pub fn reasoner(&self) -> &R {
        &self.reasoner
    }

    pub fn translate(
        &mut self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<CompletionResult, TranslationError> {
        self.bind_languages(source_language, target_language)?;
        self.translator.translate(text)
    }

    pub fn extract(
        &mut self,
        text: &str,
        max_triplets: Option<usize>,
    ) -> Result<CompletionResult, TranslationError> {
        let max_triplets = max_triplets.unwrap_or(self.max_triplets).max(1).to_string();
        let prompt = self.translator.prompts().extract_triplets.render(&[
            ("source_text", text),
            ("max_knowledge_triplets", &max_triplets),
        ])?;
        self.translator.complete(&prompt)
    }

    pub fn assess(
        &mut self,
        source_text: &str,
        translated_text: &str,
        knowledge_triplets: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<CompletionResult, TranslationError> {
        self.bind_languages(source_language, target_language)?;
        let prompt = self.translator.prompts().assess.render(&[
            ("source_language", source_language),
            ("target_language", target_language),
            ("source_text", source_text),
            ("translated_text", translated_text),
            ("knowledge_triplets", knowledge_triplets),
        ])?;
        self.translator.complete(&prompt)
    }

    /// Errors come back as text meant for the reasoning model.
    pub fn invoke(&mut self, action: AgentAction, arguments: &Value) -> Result<String, String> {
        let result = match action {
            AgentAction::Translate => {
                let a: TranslateArgs = parse_args(action, arguments)?;
                self.translate(&a.text, &a.source_language, &a.target_language)
            }
            AgentAction::Extract => {
                let a: ExtractArgs = parse_args(action, arguments)?;
                self.extract(&a.text, a.max_triplets)
            }
            AgentAction::Assess => {
                let a: AssessArgs = parse_args(action, arguments)?;
                self.assess(
                    &a.source_text,
                    &a.translated_text,
                    &a.knowledge_triplets,
                    &a.source_language,
                    &a.target_language,
                )
            }
            AgentAction::Finish | AgentAction::Invalid => {
                return Err(format!("`{}` cannot be invoked as an action", action.name()));
            }
        };
        result
            .map(|r| r.text)
            .map_err(|e| format!("`{}` failed: {e}", action.name()))
    }

    pub fn agentic_translate(&mut self, source_text: &str) -> Result<AgenticOutcome, ControllerError> {
        let started = Instant::now();
        let pair = self
            .translator
            .languages()
            .cloned()
            .ok_or(ControllerError::LanguagesNotSet)?;
        let specs = action_specs();
        let mut steps: Vec<AgentStep> = Vec::new();

        tracing::info!(languages = %pair, max_turns = self.max_turns, "agentic translation started");
        self.progress
            .info(format!("Agentic translation {pair} via {}", self.translator.client().describe()));

        for turn in 1..=self.max_turns {
            self.check_deadline(started)?;
            self.progress.progress("turn", turn, self.max_turns);

            let task = AgentTask {
                source_text,
                languages: &pair,
                actions: &specs,
                steps: &steps,
            };
            let decision = match self.reasoner.decide(&task) {
                Ok(d) => d,
                Err(ReasonerError::Malformed(detail)) => {
                    tracing::warn!(turn, detail = %detail, "reasoner reply rejected");
                    steps.push(AgentStep {
                        turn,
                        action: AgentAction::Invalid,
                        thought: String::new(),
                        arguments: Value::Null,
                        observation: format!("invalid reply: {detail}"),
                        failed: true,
                    });
                    continue;
                }
                Err(ReasonerError::Completion(e)) => return Err(ControllerError::Reasoner(e)),
                Err(ReasonerError::Template(e)) => return Err(ControllerError::Template(e)),
            };
            self.check_deadline(started)?;

            match decision {
                Decision::Finish { thought, answer } => {
                    tracing::info!(
                        turns = turn,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "agentic translation finished"
                    );
                    steps.push(AgentStep {
                        turn,
                        action: AgentAction::Finish,
                        thought,
                        arguments: json!({ "answer": &answer }),
                        observation: String::new(),
                        failed: false,
                    });
                    return Ok(AgenticOutcome { answer, steps });
                }
                Decision::Act {
                    thought,
                    action,
                    arguments,
                } => {
                    tracing::debug!(turn, action = action.name(), "invoking action");
                    let (observation, failed) = match self.invoke(action, &arguments) {
                        Ok(text) => (text, false),
                        Err(msg) => {
                            tracing::warn!(turn, action = action.name(), error = %msg, "action failed");
                            (msg, true)
                        }
                    };
                    self.check_deadline(started)?;
                    steps.push(AgentStep {
                        turn,
                        action,
                        thought,
                        arguments,
                        observation,
                        failed,
                    });
                }
            }
        }

        tracing::warn!(max_turns = self.max_turns, "agent turn limit reached");
        Err(ControllerError::TurnLimitExceeded {
            max_turns: self.max_turns,
            steps,
        })
    }

    fn bind_languages(&mut self, source: &str, target: &str) -> Result<(), TranslationError> {
        let wanted = LanguagePair::new(source.trim(), target.trim());
        if self.translator.languages() != Some(&wanted) {
            self.translator
                .switch_languages(&wanted.source_language, &wanted.target_language)?;
        }
        Ok(())
    }

    fn check_deadline(&self, started: Instant) -> Result<(), ControllerError> {
        match self.timeout {
            Some(limit) if started.elapsed() >= limit => Err(ControllerError::DeadlineExceeded {
                elapsed: started.elapsed(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::CompletionError;
    use crate::pipeline::PromptSet;
    use crate::testing::ScriptedClient;

    const FOX: &str = "The quick brown fox jumps over the lazy dog.";

    struct ScriptedReasoner {
        script: VecDeque<Result<Decision, ReasonerError>>,
        seen_steps: Vec<usize>,
        delay: Duration,
    }

    impl ScriptedReasoner {
        fn new(script: Vec<Result<Decision, ReasonerError>>) -> Self {
            Self {
                script: script.into(),
                seen_steps: Vec::new(),
                delay: Duration::ZERO,
            }
        }
    }

    impl ReasoningEngine for ScriptedReasoner {
        fn decide(&mut self, task: &AgentTask<'_>) -> Result<Decision, ReasonerError> {
            self.seen_steps.push(task.steps.len());
            std::thread::sleep(self.delay);
            self.script
                .pop_front()
                .unwrap_or_else(|| Ok(act(AgentAction::Extract, json!({"text": task.source_text}))))
        }
    }

    fn act(action: AgentAction, arguments: Value) -> Decision {
        Decision::Act {
            thought: String::new(),
            action,
            arguments,
        }
    }

    fn finish(answer: &str) -> Decision {
        Decision::Finish {
            thought: "done".to_string(),
            answer: answer.to_string(),
        }
    }

    fn controller(
        replies: Vec<&str>,
        decisions: Vec<Result<Decision, ReasonerError>>,
    ) -> AgenticController<ScriptedClient, ScriptedReasoner> {
        let translator = Translator::with_languages(ScriptedClient::new(replies), "English", "Deutsch").unwrap();
        AgenticController::new(translator, ScriptedReasoner::new(decisions))
    }

    #[test]
    fn runs_actions_until_finish() {
        let mut c = controller(
            vec!["(fox, jumps over, dog)", "Der Fuchs springt.", "NO_MISSING_KNOWLEDGE"],
            vec![
                Ok(act(AgentAction::Extract, json!({"text": FOX, "max_triplets": 2}))),
                Ok(act(
                    AgentAction::Translate,
                    json!({"text": FOX, "source_language": "English", "target_language": "Deutsch"}),
                )),
                Ok(act(
                    AgentAction::Assess,
                    json!({
                        "source_text": FOX,
                        "translated_text": "Der Fuchs springt.",
                        "triplets": "(fox, jumps over, dog)",
                        "source_lang": "English",
                        "target_lang": "Deutsch"
                    }),
                )),
                Ok(finish("Der Fuchs springt.")),
            ],
        );
        let outcome = c.agentic_translate(FOX).unwrap();

        assert_eq!(outcome.answer, "Der Fuchs springt.");
        let actions: Vec<AgentAction> = outcome.steps.iter().map(|s| s.action).collect();
        assert_eq!(
            actions,
            vec![
                AgentAction::Extract,
                AgentAction::Translate,
                AgentAction::Assess,
                AgentAction::Finish
            ]
        );
        assert!(outcome.steps.iter().all(|s| !s.failed));
        assert_eq!(outcome.steps[0].observation, "(fox, jumps over, dog)");
        assert_eq!(c.reasoner().seen_steps, vec![0, 1, 2, 3]);

        let prompts = c.translator().client().prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("Extract up to 2 knowledge triplets"));
        assert!(prompts[2].contains("(fox, jumps over, dog)"));
    }

    #[test]
    fn malformed_arguments_become_an_observation() {
        let mut c = controller(
            vec![],
            vec![
                Ok(act(AgentAction::Translate, json!({"text": FOX}))),
                Ok(finish("x")),
            ],
        );
        let outcome = c.agentic_translate(FOX).unwrap();
        assert!(outcome.steps[0].failed);
        assert!(outcome.steps[0].observation.contains("source_language"));
        assert!(c.translator().client().prompts().is_empty());
    }

    #[test]
    fn failed_completion_inside_action_is_recoverable() {
        let translator = Translator::with_languages(
            ScriptedClient::from_results(vec![Err("rate limited".to_string())]),
            "English",
            "Deutsch",
        )
        .unwrap();
        let reasoner = ScriptedReasoner::new(vec![
            Ok(act(AgentAction::Extract, json!({"text": FOX}))),
            Ok(finish("Der Fuchs")),
        ]);
        let mut c = AgenticController::new(translator, reasoner);
        let outcome = c.agentic_translate(FOX).unwrap();
        assert!(outcome.steps[0].failed);
        assert!(outcome.steps[0].observation.contains("rate limited"));
        assert_eq!(outcome.answer, "Der Fuchs");
    }

    #[test]
    fn malformed_decision_is_fed_back() {
        let mut c = controller(
            vec![],
            vec![Err(ReasonerError::Malformed("no_json_object_start".to_string())), Ok(finish("ok"))],
        );
        let outcome = c.agentic_translate(FOX).unwrap();
        assert_eq!(outcome.steps[0].action, AgentAction::Invalid);
        assert!(outcome.steps[0].failed);
        assert_eq!(c.reasoner().seen_steps, vec![0, 1]);
    }

    #[test]
    fn reasoner_failure_aborts() {
        let mut c = controller(
            vec![],
            vec![Err(ReasonerError::Completion(CompletionError::InvalidResponse {
                provider: "scripted".to_string(),
                detail: "boom".to_string(),
            }))],
        );
        let err = c.agentic_translate(FOX).unwrap_err();
        assert!(matches!(err, ControllerError::Reasoner(_)));
    }

    #[test]
    fn turn_limit_returns_steps() {
        let replies = vec!["t"; 3];
        let mut c = controller(replies, vec![]).with_max_turns(3);
        match c.agentic_translate(FOX).unwrap_err() {
            ControllerError::TurnLimitExceeded { max_turns, steps } => {
                assert_eq!(max_turns, 3);
                assert_eq!(steps.len(), 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn translate_action_switches_languages() {
        let mut c = controller(
            vec!["Le renard."],
            vec![
                Ok(act(
                    AgentAction::Translate,
                    json!({"text": FOX, "source_language": "English", "target_language": "Français"}),
                )),
                Ok(finish("Le renard.")),
            ],
        );
        c.agentic_translate(FOX).unwrap();
        assert_eq!(
            c.translator().languages(),
            Some(&LanguagePair::new("English", "Français"))
        );
        assert!(c.translator().client().prompts()[0].contains("English to Français"));
    }

    #[test]
    fn finish_cannot_be_invoked() {
        let mut c = controller(vec![], vec![]);
        let err = c.invoke(AgentAction::Finish, &json!({})).unwrap_err();
        assert!(err.contains("cannot be invoked"));
    }

    #[test]
    fn unbound_languages_fail_fast() {
        let translator = Translator::new(ScriptedClient::new(Vec::<&str>::new()));
        let mut c = AgenticController::new(translator, ScriptedReasoner::new(vec![Ok(finish("x"))]));
        assert!(matches!(c.agentic_translate(FOX), Err(ControllerError::LanguagesNotSet)));
        assert!(c.reasoner().seen_steps.is_empty());
    }

    #[test]
    fn exhausted_budget_stops_the_loop() {
        let mut c = controller(vec![], vec![Ok(finish("x"))]).with_timeout(Duration::ZERO);
        assert!(matches!(
            c.agentic_translate(FOX),
            Err(ControllerError::DeadlineExceeded { .. })
        ));
    }

    #[test]
    fn slow_action_overruns_budget() {
        let client = ScriptedClient::new(["(fox, jumps over, dog)"]).with_delay(1, Duration::from_millis(300));
        let translator = Translator::with_languages(client, "English", "Deutsch").unwrap();
        let reasoner = ScriptedReasoner::new(vec![
            Ok(act(AgentAction::Extract, json!({"text": FOX}))),
            Ok(finish("Der Fuchs")),
        ]);
        let mut c = AgenticController::new(translator, reasoner).with_timeout(Duration::from_millis(100));

        assert!(matches!(
            c.agentic_translate(FOX),
            Err(ControllerError::DeadlineExceeded { .. })
        ));
        assert_eq!(c.reasoner().seen_steps, vec![0]);
    }

    #[test]
    fn slow_finish_decision_overruns_budget() {
        let translator = Translator::with_languages(ScriptedClient::new(Vec::<&str>::new()), "English", "Deutsch").unwrap();
        let mut reasoner = ScriptedReasoner::new(vec![Ok(finish("Der Fuchs"))]);
        reasoner.delay = Duration::from_millis(300);
        let mut c = AgenticController::new(translator, reasoner).with_timeout(Duration::from_millis(100));

        assert!(matches!(
            c.agentic_translate(FOX),
            Err(ControllerError::DeadlineExceeded { .. })
        ));
    }

    #[test]
    fn completion_reasoner_parses_json_reply() {
        let client = ScriptedClient::new([
            "Sure, here it is: {\"thought\": \"done\", \"action\": \"finish\", \"answer\": \"Der Fuchs\"}",
            "I think we should translate.",
            "{\"action\": \"summarize\"}",
        ]);
        let mut r = CompletionReasoner::new(client, PromptSet::builtin().agent);
        let pair = LanguagePair::new("English", "Deutsch");
        let specs = action_specs();
        let task = AgentTask {
            source_text: FOX,
            languages: &pair,
            actions: &specs,
            steps: &[],
        };

        assert_eq!(
            r.decide(&task).unwrap(),
            Decision::Finish {
                thought: "done".to_string(),
                answer: "Der Fuchs".to_string()
            }
        );
        assert!(matches!(r.decide(&task), Err(ReasonerError::Malformed(_))));
        assert!(matches!(r.decide(&task), Err(ReasonerError::Malformed(_))));

        let prompt = &r.client().prompts()[0];
        assert!(prompt.contains(FOX));
        assert!(prompt.contains("- assess:"));
        assert!(prompt.contains("(none yet)"));
        assert!(prompt.contains("from English to Deutsch"));
    }

    #[test]
    fn completion_reasoner_surfaces_client_failure() {
        let client = ScriptedClient::from_results(vec![Err("down".to_string())]);
        let mut r = CompletionReasoner::new(client, PromptSet::builtin().agent);
        let pair = LanguagePair::new("English", "Deutsch");
        let task = AgentTask {
            source_text: FOX,
            languages: &pair,
            actions: &[],
            steps: &[],
        };
        assert!(matches!(r.decide(&task), Err(ReasonerError::Completion(_))));
    }
}
