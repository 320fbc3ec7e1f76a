use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};

use crate::agentflow::{AgenticController, CompletionReasoner};
use crate::config::{
    load_config, locate_config, process_env, resolve_provider_config, AppConfig, ProviderConfig,
    ProviderOverrides,
};
use crate::constants::{
    CONFIG_FILENAME, DEFAULT_LOG_MAX_CHARS, DEFAULT_MAX_AGENT_TURNS, DEFAULT_MAX_TRIPLETS,
};
use crate::models::{build_client, CompletionClient};
use crate::progress::ConsoleProgress;

use super::prompts::{default_prompt_files, PromptSet, DEFAULT_PROMPTS_DIR};
use super::reflective::ReflectivePipeline;
use super::trace::TraceWriter;
use super::translator::{LanguagePair, Translator};

/// Pipeline settings given on the command line.
#[derive(Clone, Debug, Default)]
pub struct PipelineOverrides {
    pub max_triplets: Option<usize>,
    pub max_agent_turns: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub trace_dir: Option<PathBuf>,
    pub trace_prompts: Option<bool>,
}

/// Everything needed to serve translation requests, resolved once at startup.
///
/// Each request gets its own clients and [`Translator`] from the factory methods.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub config_path: Option<PathBuf>,
    pub provider: ProviderConfig,
    pub prompts: PromptSet,
    pub max_triplets: usize,
    pub max_agent_turns: usize,
    pub timeout: Option<Duration>,
    pub trace_dir: PathBuf,
    pub trace_prompts: bool,
    pub log_max_chars: usize,
}

impl PipelineConfig {
    pub fn from_file_and_args(
        config_path: Option<PathBuf>,
        provider: &ProviderOverrides,
        pipeline: &PipelineOverrides,
    ) -> anyhow::Result<Self> {
        if let Some(p) = config_path.as_ref() {
            if !p.exists() {
                return Err(anyhow!("config file not found: {}", p.display()));
            }
        }
        let cfg_file = locate_config(config_path);
        let file_cfg = match cfg_file.as_ref() {
            Some(p) if p.exists() => load_config(p)?,
            _ => AppConfig::default(),
        };
        if let Some(p) = cfg_file.as_ref() {
            tracing::info!(path = %p.display(), "using config file");
        }
        Self::from_app_config(cfg_file, &file_cfg, process_env, provider, pipeline)
    }

    pub fn from_app_config(
        config_path: Option<PathBuf>,
        file_cfg: &AppConfig,
        env: impl Fn(&str) -> Option<String>,
        provider: &ProviderOverrides,
        pipeline: &PipelineOverrides,
    ) -> anyhow::Result<Self> {
        let provider =
            resolve_provider_config(&file_cfg.provider, env, provider).context("resolve provider")?;

        let prompts = match config_path.as_ref() {
            Some(p) => PromptSet::load(p, &file_cfg.prompts).context("load prompts")?,
            None => PromptSet::builtin(),
        };

        let p = &file_cfg.pipeline;
        let max_triplets = pipeline
            .max_triplets
            .or(p.max_triplets)
            .unwrap_or(DEFAULT_MAX_TRIPLETS)
            .max(1);
        let max_agent_turns = pipeline
            .max_agent_turns
            .or(p.max_agent_turns)
            .unwrap_or(DEFAULT_MAX_AGENT_TURNS)
            .max(1);
        let timeout = pipeline
            .timeout_secs
            .or(p.timeout_secs)
            .filter(|s| *s > 0)
            .map(Duration::from_secs);

        let base_dir = config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let trace_dir = match pipeline.trace_dir.clone() {
            Some(dir) => dir,
            None => {
                let dir = PathBuf::from(p.trace_dir.clone().unwrap_or_else(|| "_trace".to_string()));
                if dir.is_absolute() {
                    dir
                } else {
                    base_dir.join(dir)
                }
            }
        };
        let trace_prompts = pipeline
            .trace_prompts
            .or(p.trace_prompts)
            .unwrap_or(false);
        let log_max_chars = p.log_max_chars.unwrap_or(DEFAULT_LOG_MAX_CHARS);

        Ok(Self {
            config_path,
            provider,
            prompts,
            max_triplets,
            max_agent_turns,
            timeout,
            trace_dir,
            trace_prompts,
            log_max_chars,
        })
    }

    /// A fresh client and translator bound to `pair`.
    pub fn translator(&self, pair: &LanguagePair) -> anyhow::Result<Translator<Box<dyn CompletionClient>>> {
        let client = build_client(&self.provider).context("build completion client")?;
        let mut translator =
            Translator::with_prompts(client, self.prompts.clone()).with_log_max_chars(self.log_max_chars);
        translator
            .switch_languages(&pair.source_language, &pair.target_language)
            .context("render system prompt")?;
        Ok(translator)
    }

    pub fn reflective_pipeline(
        &self,
        pair: &LanguagePair,
        progress: ConsoleProgress,
    ) -> anyhow::Result<ReflectivePipeline<Box<dyn CompletionClient>>> {
        let trace = TraceWriter::new(self.trace_dir.clone(), self.trace_prompts)?;
        let mut pipeline = ReflectivePipeline::new(self.translator(pair)?)
            .with_max_triplets(self.max_triplets)
            .with_trace_writer(trace)
            .with_progress(progress);
        if let Some(t) = self.timeout {
            pipeline = pipeline.with_timeout(t);
        }
        Ok(pipeline)
    }

    /// The reasoning model gets its own client so its instruction stays separate
    /// from the translator's system prompt.
    pub fn agentic_controller(
        &self,
        pair: &LanguagePair,
        progress: ConsoleProgress,
    ) -> anyhow::Result<
        AgenticController<Box<dyn CompletionClient>, CompletionReasoner<Box<dyn CompletionClient>>>,
    > {
        let reasoner_client = build_client(&self.provider).context("build reasoning client")?;
        let reasoner = CompletionReasoner::new(reasoner_client, self.prompts.agent.clone())
            .with_log_max_chars(self.log_max_chars);
        let mut controller = AgenticController::new(self.translator(pair)?, reasoner)
            .with_max_turns(self.max_agent_turns)
            .with_max_triplets(self.max_triplets)
            .with_progress(progress);
        if let Some(t) = self.timeout {
            controller = controller.with_timeout(t);
        }
        Ok(controller)
    }
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;

    for (fname, body) in default_prompt_files() {
        let p = prompts_dir.join(fname);
        if p.exists() && !force {
            continue;
        }
        std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[provider]
# One of: "Cohere", "Llamafile", "Ollama", "Open AI".
# Environment variables (LLM_PROVIDER, OLLAMA_MODEL, OPENAI_API_KEY, ...) override these.
name = "Ollama"
model = "llama3"
base_url = "http://localhost:11434"
# api_key = "..."
# 0.0..=1.0 (Open AI: 0.0..=2.0)
temperature = 0.4
request_timeout_secs = 120

[pipeline]
max_triplets = 10
max_agent_turns = 10
# Budget for one whole request, checked between model calls.
# timeout_secs = 300

trace_dir = "_trace"
trace_prompts = false
log_max_chars = 240

# Uncomment to use the editable copies in prompts/.
[prompts]
# system = "prompts/system.txt"
# translate = "prompts/translate.txt"
# extract_triplets = "prompts/extract_triplets.txt"
# assess = "prompts/assess.txt"
# improve = "prompts/improve.txt"
# agent = "prompts/agent.txt"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, Provider};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn init_writes_loadable_config_and_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_default_config(dir.path(), false).unwrap();
        assert!(path.ends_with("lexinetz.toml"));
        for (fname, body) in default_prompt_files() {
            let written = std::fs::read_to_string(dir.path().join("prompts").join(fname)).unwrap();
            assert_eq!(written, body);
        }

        let app = load_config(&path).unwrap();
        let cfg = PipelineConfig::from_app_config(
            Some(path.clone()),
            &app,
            no_env,
            &ProviderOverrides::default(),
            &PipelineOverrides::default(),
        )
        .unwrap();
        assert_eq!(cfg.provider.provider, Provider::Ollama);
        assert_eq!(cfg.max_triplets, 10);
        assert_eq!(cfg.trace_dir, dir.path().join("_trace"));
        assert!(!cfg.trace_prompts);
        assert_eq!(cfg.prompts, PromptSet::builtin());
    }

    #[test]
    fn init_keeps_existing_files_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_default_config(dir.path(), false).unwrap();
        std::fs::write(&path, "# mine").unwrap();
        init_default_config(dir.path(), false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine");
        init_default_config(dir.path(), true).unwrap();
        assert_ne!(std::fs::read_to_string(&path).unwrap(), "# mine");
    }

    #[test]
    fn overrides_beat_file_values() {
        let app: AppConfig = toml::from_str(
            r#"
[pipeline]
max_triplets = 4
max_agent_turns = 6
timeout_secs = 30
"#,
        )
        .unwrap();
        let cli = PipelineOverrides {
            max_triplets: Some(7),
            timeout_secs: Some(0),
            ..Default::default()
        };
        let cfg = PipelineConfig::from_app_config(None, &app, no_env, &ProviderOverrides::default(), &cli)
            .unwrap();
        assert_eq!(cfg.max_triplets, 7);
        assert_eq!(cfg.max_agent_turns, 6);
        assert_eq!(cfg.timeout, None);
        assert_eq!(cfg.trace_dir, PathBuf::from("./_trace"));
    }

    #[test]
    fn translator_factory_binds_languages() {
        let cfg = PipelineConfig::from_app_config(
            None,
            &AppConfig::default(),
            no_env,
            &ProviderOverrides::default(),
            &PipelineOverrides::default(),
        )
        .unwrap();
        let pair = LanguagePair::new("English", "Italiano");
        let t = cfg.translator(&pair).unwrap();
        assert_eq!(t.languages(), Some(&pair));
        assert_eq!(t.client().system_prompt(), t.system_prompt());

        let a = cfg.translator(&pair).unwrap();
        let b = cfg.translator(&pair.reversed()).unwrap();
        assert_ne!(a.system_prompt(), b.system_prompt());
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let err = PipelineConfig::from_file_and_args(
            Some(PathBuf::from("/nonexistent/lexinetz.toml")),
            &ProviderOverrides::default(),
            &PipelineOverrides::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
