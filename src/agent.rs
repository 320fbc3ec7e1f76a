//! Data exchanged between the agentic controller and its reasoning model.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAction {
    Translate,
    Extract,
    Assess,
    Finish,
    /// The reasoning model's reply could not be understood.
    Invalid,
}

impl AgentAction {
    pub const CALLABLE: [AgentAction; 3] = [
        AgentAction::Extract,
        AgentAction::Translate,
        AgentAction::Assess,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "translate" => Some(Self::Translate),
            "extract" => Some(Self::Extract),
            "assess" => Some(Self::Assess),
            "finish" => Some(Self::Finish),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Translate => "translate",
            Self::Extract => "extract",
            Self::Assess => "assess",
            Self::Finish => "finish",
            Self::Invalid => "invalid",
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TranslateArgs {
    pub text: String,
    #[serde(alias = "source_lang")]
    pub source_language: String,
    #[serde(alias = "target_lang")]
    pub target_language: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExtractArgs {
    pub text: String,
    #[serde(default)]
    pub max_triplets: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AssessArgs {
    pub source_text: String,
    pub translated_text: String,
    #[serde(alias = "triplets")]
    pub knowledge_triplets: String,
    #[serde(alias = "source_lang")]
    pub source_language: String,
    #[serde(alias = "target_lang")]
    pub target_language: String,
}

/// Decodes the JSON arguments of one action call. The error text goes back to
/// the reasoning model, so it names the action and the offending field.
pub fn parse_args<T: DeserializeOwned>(action: AgentAction, arguments: &Value) -> Result<T, String> {
    if !arguments.is_object() {
        return Err(format!(
            "invalid arguments for `{}`: expected a JSON object, got {arguments}",
            action.name()
        ));
    }
    serde_json::from_value(arguments.clone())
        .map_err(|e| format!("invalid arguments for `{}`: {e}", action.name()))
}

/// How an action is presented to the reasoning model. The description and
/// the parameter schema are all the model knows about it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

pub fn action_specs() -> Vec<ActionSpec> {
    vec![
        ActionSpec {
            name: AgentAction::Extract.name(),
            description: "Extract knowledge triplets (subject, predicate, object) from `text`. \
                Returns the triplets as plain text, one per line. `max_triplets` caps how many \
                are returned.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "text to extract triplets from"},
                    "max_triplets": {"type": "integer", "minimum": 1}
                },
                "required": ["text"]
            }),
        },
        ActionSpec {
            name: AgentAction::Translate.name(),
            description: "Translate `text` from `source_language` to `target_language`. \
                Returns only the translated text.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "source_language": {"type": "string"},
                    "target_language": {"type": "string"}
                },
                "required": ["text", "source_language", "target_language"]
            }),
        },
        ActionSpec {
            name: AgentAction::Assess.name(),
            description: "Check `translated_text` against the knowledge triplets of \
                `source_text`. Returns the triplets missing from the translation, in \
                `source_language`, each with a short justification, or exactly \
                NO_MISSING_KNOWLEDGE when nothing is missing.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "source_text": {"type": "string"},
                    "translated_text": {"type": "string"},
                    "knowledge_triplets": {"type": "string", "description": "output of `extract`"},
                    "source_language": {"type": "string"},
                    "target_language": {"type": "string"}
                },
                "required": [
                    "source_text",
                    "translated_text",
                    "knowledge_triplets",
                    "source_language",
                    "target_language"
                ]
            }),
        },
    ]
}

#[must_use]
pub fn render_action_catalog(specs: &[ActionSpec]) -> String {
    let mut out = String::new();
    for spec in specs {
        out.push_str(&format!(
            "- {}: {}\n  arguments: {}\n",
            spec.name, spec.description, spec.parameters
        ));
    }
    out.push_str("- finish: Stop and return `answer` as the final translation.\n");
    out
}

/// One turn of the reasoning loop.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentStep {
    pub turn: usize,
    pub action: AgentAction,
    pub thought: String,
    pub arguments: Value,
    pub observation: String,
    /// The observation is an error message rather than an action result.
    pub failed: bool,
}

#[must_use]
pub fn render_history(steps: &[AgentStep]) -> String {
    if steps.is_empty() {
        return "(none yet)".to_string();
    }
    let mut out = String::new();
    for step in steps {
        out.push_str(&format!("Turn {}: {}", step.turn, step.action.name()));
        if !step.arguments.is_null() {
            out.push_str(&format!(" {}", step.arguments));
        }
        out.push('\n');
        if !step.thought.is_empty() {
            out.push_str(&format!("Thought: {}\n", step.thought));
        }
        let label = if step.failed { "Error" } else { "Observation" };
        out.push_str(&format!("{label}: {}\n\n", step.observation));
    }
    out.trim_end().to_string()
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Act {
        thought: String,
        action: AgentAction,
        arguments: Value,
    },
    Finish {
        thought: String,
        answer: String,
    },
}

/// Raw reply of the reasoning model.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct DecisionResponse {
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub answer: String,
}

impl DecisionResponse {
    pub fn into_decision(self) -> Result<Decision, String> {
        let thought = self.thought.trim().to_string();
        match AgentAction::parse(&self.action) {
            Some(AgentAction::Finish) => {
                let answer = self.answer.trim();
                if answer.is_empty() {
                    return Err("`finish` needs a non-empty `answer`".to_string());
                }
                Ok(Decision::Finish {
                    thought,
                    answer: answer.to_string(),
                })
            }
            Some(action) => Ok(Decision::Act {
                thought,
                action,
                arguments: self.arguments,
            }),
            None if self.action.trim().is_empty() => Err("missing `action`".to_string()),
            None => Err(format!(
                "unknown action `{}`; use one of extract, translate, assess, finish",
                self.action.trim()
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgenticOutcome {
    pub answer: String,
    pub steps: Vec<AgentStep>,
}
