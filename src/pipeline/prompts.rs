use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::PromptsSection;
use crate::error::TemplateError;

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

pub const DEFAULT_SYSTEM: &str = "system.txt";
pub const DEFAULT_TRANSLATE: &str = "translate.txt";
pub const DEFAULT_EXTRACT_TRIPLETS: &str = "extract_triplets.txt";
pub const DEFAULT_ASSESS: &str = "assess.txt";
pub const DEFAULT_IMPROVE: &str = "improve.txt";
pub const DEFAULT_AGENT: &str = "agent.txt";

/// Marker the assessment prompt asks for when every triplet survived translation.
pub const NO_MISSING_KNOWLEDGE: &str = "NO_MISSING_KNOWLEDGE";

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex"));

/// A named prompt skeleton with `{placeholder}` tokens.
///
/// Braces that do not enclose an identifier (JSON examples, `{...}`) are plain text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    name: String,
    text: String,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Distinct placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for cap in PLACEHOLDER_RE.captures_iter(&self.text) {
            if let Some(m) = cap.get(1) {
                if !out.contains(&m.as_str()) {
                    out.push(m.as_str());
                }
            }
        }
        out
    }

    /// Substitutes every placeholder in one pass. Fails without producing output
    /// if any placeholder has no value; values are inserted verbatim and never
    /// re-scanned. Variables the template does not use are ignored.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<String, TemplateError> {
        for p in self.placeholders() {
            if !vars.iter().any(|(k, _)| *k == p) {
                return Err(TemplateError::MissingPlaceholder {
                    template: self.name.clone(),
                    placeholder: p.to_string(),
                });
            }
        }

        let out = PLACEHOLDER_RE.replace_all(&self.text, |cap: &Captures<'_>| {
            let key = &cap[1];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
                .unwrap_or_default()
        });
        Ok(out.into_owned())
    }

    /// Rejects placeholders outside `allowed`; used to vet user-supplied overrides.
    pub fn check_placeholders(&self, allowed: &[&str]) -> Result<(), TemplateError> {
        match self.placeholders().into_iter().find(|p| !allowed.contains(p)) {
            Some(p) => Err(TemplateError::UnknownPlaceholder {
                template: self.name.clone(),
                placeholder: p.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// The templates one translation request uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptSet {
    pub system: PromptTemplate,
    pub translate: PromptTemplate,
    pub extract_triplets: PromptTemplate,
    pub assess: PromptTemplate,
    pub improve: PromptTemplate,
    pub agent: PromptTemplate,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptSet {
    pub fn builtin() -> Self {
        Self {
            system: PromptTemplate::new("system", DEFAULT_SYSTEM_TEXT),
            translate: PromptTemplate::new("translate", DEFAULT_TRANSLATE_TEXT),
            extract_triplets: PromptTemplate::new(
                "extract_triplets",
                DEFAULT_EXTRACT_TRIPLETS_TEXT,
            ),
            assess: PromptTemplate::new("assess", DEFAULT_ASSESS_TEXT),
            improve: PromptTemplate::new("improve", DEFAULT_IMPROVE_TEXT),
            agent: PromptTemplate::new("agent", DEFAULT_AGENT_TEXT),
        }
    }

    /// Built-in templates, with any file overrides from the `[prompts]` table.
    /// Relative paths resolve against the config file's directory.
    pub fn load(config_path: &Path, p: &PromptsSection) -> anyhow::Result<Self> {
        let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let mut set = Self::builtin();
        let overrides: [(&mut PromptTemplate, &Option<String>, &[&str]); 6] = [
            (&mut set.system, &p.system, SYSTEM_VARS),
            (&mut set.translate, &p.translate, TRANSLATE_VARS),
            (&mut set.extract_triplets, &p.extract_triplets, EXTRACT_TRIPLETS_VARS),
            (&mut set.assess, &p.assess, ASSESS_VARS),
            (&mut set.improve, &p.improve, IMPROVE_VARS),
            (&mut set.agent, &p.agent, AGENT_VARS),
        ];
        for (slot, path, allowed) in overrides {
            let Some(path) = path.as_deref() else {
                continue;
            };
            let text = read_prompt(config_dir, slot.name(), path)?;
            let tmpl = PromptTemplate::new(slot.name(), text);
            tmpl.check_placeholders(allowed)
                .with_context(|| format!("prompt override: {path}"))?;
            *slot = tmpl;
        }
        Ok(set)
    }
}

fn read_prompt(config_dir: &Path, key: &str, path: &str) -> anyhow::Result<String> {
    let mut p = PathBuf::from(path);
    if p.is_relative() {
        p = config_dir.join(&p);
    }
    if !p.exists() {
        return Err(anyhow!(
            "prompt file not found for {key}: {} (run: lexinetz --init-config)",
            p.display()
        ));
    }
    let text =
        std::fs::read_to_string(&p).with_context(|| format!("read prompt: {}", p.display()))?;
    Ok(text)
}

pub fn default_prompt_files() -> Vec<(&'static str, &'static str)> {
    vec![
        (DEFAULT_SYSTEM, DEFAULT_SYSTEM_TEXT),
        (DEFAULT_TRANSLATE, DEFAULT_TRANSLATE_TEXT),
        (DEFAULT_EXTRACT_TRIPLETS, DEFAULT_EXTRACT_TRIPLETS_TEXT),
        (DEFAULT_ASSESS, DEFAULT_ASSESS_TEXT),
        (DEFAULT_IMPROVE, DEFAULT_IMPROVE_TEXT),
        (DEFAULT_AGENT, DEFAULT_AGENT_TEXT),
    ]
}

const SYSTEM_VARS: &[&str] = &["source_language", "target_language"];
const TRANSLATE_VARS: &[&str] = &["source_language", "target_language", "source_text"];
const EXTRACT_TRIPLETS_VARS: &[&str] = &["source_text", "max_knowledge_triplets"];
const ASSESS_VARS: &[&str] = &[
    "source_language",
    "target_language",
    "source_text",
    "translated_text",
    "knowledge_triplets",
];
const IMPROVE_VARS: &[&str] = &[
    "source_language",
    "target_language",
    "source_text",
    "translated_text",
    "improvement_suggestions",
];
const AGENT_VARS: &[&str] = &[
    "source_language",
    "target_language",
    "source_text",
    "actions",
    "history",
];

pub const DEFAULT_SYSTEM_TEXT: &str = "You are an expert linguist, who specialises in translation from {source_language} to {target_language}.";

pub const DEFAULT_TRANSLATE_TEXT: &str = r#"This is a {source_language} to {target_language} translation task.
The text in the {source_language} may contain idiomatic expressions. You must output idiomatic equivalents for such expressions in the {target_language}.
Please provide the {target_language} translation for the following text. Do not provide any explanations or any other text apart from the translation.
{source_language}: {source_text}

{target_language}:"#;

pub const DEFAULT_EXTRACT_TRIPLETS_TEXT: &str = r#"Extract up to {max_knowledge_triplets} knowledge triplets from the text below.
A knowledge triplet states one fact from the text in the form (subject, predicate, object).
Write the triplets in the same language as the text.
Output one triplet per line and nothing else.

Text: {source_text}

Knowledge triplets:"#;

pub const DEFAULT_ASSESS_TEXT: &str = r#"This is an assessment of a {source_language} to {target_language} translation.
You are given knowledge triplets of the form (subject, predicate, object) that were extracted from the {source_language} text.
Judge the translation using ONLY these triplets. Do not introduce facts that are not in the triplets.
For every triplet whose meaning is missing from, or distorted in, the {target_language} translation, output the triplet in {source_language} followed by a one-sentence justification.
If the translation preserves every triplet, output exactly NO_MISSING_KNOWLEDGE and nothing else.

{source_language}: {source_text}

{target_language}: {translated_text}

Knowledge triplets:
{knowledge_triplets}

Missing triplets:"#;

pub const DEFAULT_IMPROVE_TEXT: &str = r#"This is a {source_language} to {target_language} translation improvement task.
You are given a {source_language} text, its current {target_language} translation, and an assessment listing knowledge from the {source_language} text that the translation lost.
Revise the translation so that it also conveys the missing knowledge, keeping idiomatic {target_language}.
If the assessment says that nothing is missing, output the current translation exactly as it is, character for character.
Do not provide any explanations or any other text apart from the translation.

{source_language}: {source_text}

Current {target_language} translation: {translated_text}

Assessment: {improvement_suggestions}

Improved {target_language} translation:"#;

pub const DEFAULT_AGENT_TEXT: &str = r#"You translate text from {source_language} to {target_language} by calling actions, one per reply.
A good plan: extract knowledge triplets from the source text, translate it, assess the translation against the triplets, and translate again with the missing knowledge in mind if the assessment finds gaps.

Actions:
{actions}

Reply with exactly ONE JSON object and nothing else, in one of these two forms:
{"thought": "why this step", "action": "<action name>", "arguments": {...}}
{"thought": "why you are done", "action": "finish", "answer": "<the final {target_language} translation only>"}

Source text:
{source_text}

Previous steps:
{history}

Next JSON object:"#;
