use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::constants::{
    CONFIG_FILENAME, DEFAULT_COHERE_MODEL, DEFAULT_LLAMAFILE_MODEL, DEFAULT_LLAMAFILE_URL,
    DEFAULT_LLM_PROVIDER, DEFAULT_LLM_TEMPERATURE, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL,
    DEFAULT_OPENAI_MODEL, DEFAULT_REQUEST_TIMEOUT_SECS, ENV_KEY_COHERE_API_KEY,
    ENV_KEY_COHERE_MODEL, ENV_KEY_CONFIG, ENV_KEY_LLAMAFILE_URL, ENV_KEY_LLM_PROVIDER,
    ENV_KEY_LLM_TEMPERATURE, ENV_KEY_OLLAMA_MODEL, ENV_KEY_OLLAMA_URL, ENV_KEY_OPENAI_API_KEY,
    ENV_KEY_OPENAI_MODEL,
};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub prompts: PromptsSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ProviderSection {
    /// One of "Cohere", "Llamafile", "Ollama", "Open AI".
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Server URL (Llamafile/Ollama) or API base override (Cohere/Open AI).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineSection {
    #[serde(default)]
    pub max_triplets: Option<usize>,
    #[serde(default)]
    pub max_agent_turns: Option<usize>,

    /// Budget for one whole translation request, checked between model calls.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub trace_dir: Option<String>,
    #[serde(default)]
    pub trace_prompts: Option<bool>,
    #[serde(default)]
    pub log_max_chars: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub translate: Option<String>,
    #[serde(default)]
    pub extract_triplets: Option<String>,
    #[serde(default)]
    pub assess: Option<String>,
    #[serde(default)]
    pub improve: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Provider {
    Cohere,
    Llamafile,
    Ollama,
    OpenAi,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Cohere,
        Provider::Llamafile,
        Provider::Ollama,
        Provider::OpenAi,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "cohere" => Some(Self::Cohere),
            "llamafile" => Some(Self::Llamafile),
            "ollama" => Some(Self::Ollama),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cohere => "Cohere",
            Self::Llamafile => "Llamafile",
            Self::Ollama => "Ollama",
            Self::OpenAi => "Open AI",
        }
    }

    pub fn max_temperature(self) -> f32 {
        match self {
            Self::OpenAi => 2.0,
            _ => 1.0,
        }
    }

    pub fn requires_api_key(self) -> bool {
        matches!(self, Self::Cohere | Self::OpenAi)
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::Cohere => DEFAULT_COHERE_MODEL,
            Self::Llamafile => DEFAULT_LLAMAFILE_MODEL,
            Self::Ollama => DEFAULT_OLLAMA_MODEL,
            Self::OpenAi => DEFAULT_OPENAI_MODEL,
        }
    }

    fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::Llamafile => Some(DEFAULT_LLAMAFILE_URL),
            Self::Ollama => Some(DEFAULT_OLLAMA_URL),
            Self::Cohere | Self::OpenAi => None,
        }
    }

    fn env_api_key(self) -> Option<&'static str> {
        match self {
            Self::Cohere => Some(ENV_KEY_COHERE_API_KEY),
            Self::OpenAi => Some(ENV_KEY_OPENAI_API_KEY),
            Self::Llamafile | Self::Ollama => None,
        }
    }

    fn env_model(self) -> Option<&'static str> {
        match self {
            Self::Cohere => Some(ENV_KEY_COHERE_MODEL),
            Self::Ollama => Some(ENV_KEY_OLLAMA_MODEL),
            Self::OpenAi => Some(ENV_KEY_OPENAI_MODEL),
            Self::Llamafile => None,
        }
    }

    fn env_base_url(self) -> Option<&'static str> {
        match self {
            Self::Llamafile => Some(ENV_KEY_LLAMAFILE_URL),
            Self::Ollama => Some(ENV_KEY_OLLAMA_URL),
            Self::Cohere | Self::OpenAi => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fully resolved settings for constructing one completion client.
///
/// Built once by the configuration layer and passed by value; nothing in the
/// translation core reads the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub request_timeout: Duration,
}

impl ProviderConfig {
    pub fn defaults_for(provider: Provider) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            api_key: None,
            base_url: provider.default_base_url().map(str::to_string),
            temperature: DEFAULT_LLM_TEMPERATURE,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let max = self.provider.max_temperature();
        if !(0.0..=max).contains(&self.temperature) {
            return Err(anyhow!(
                "temperature {} out of range for {} (0.0..={max})",
                self.temperature,
                self.provider
            ));
        }
        if self.model.trim().is_empty() {
            return Err(anyhow!("{} model name is empty", self.provider));
        }
        if self.provider.requires_api_key()
            && self.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(anyhow!("{} requires an API key", self.provider));
        }
        Ok(())
    }
}

/// Provider settings given on the command line; highest precedence.
#[derive(Clone, Debug, Default)]
pub struct ProviderOverrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
}

/// Resolves provider settings: defaults, then the config file, then `env`, then `cli`.
///
/// File values other than the provider name only apply when the file names the
/// same provider that wins resolution (or names none).
pub fn resolve_provider_config(
    file: &ProviderSection,
    env: impl Fn(&str) -> Option<String>,
    cli: &ProviderOverrides,
) -> anyhow::Result<ProviderConfig> {
    let provider_name = cli
        .provider
        .clone()
        .or_else(|| env(ENV_KEY_LLM_PROVIDER))
        .or_else(|| file.name.clone())
        .unwrap_or_else(|| DEFAULT_LLM_PROVIDER.to_string());
    let provider = Provider::parse(&provider_name).ok_or_else(|| {
        anyhow!(
            "unknown LLM provider: {provider_name} (expected one of: {})",
            Provider::ALL.map(Provider::name).join(", ")
        )
    })?;

    let file_applies = file
        .name
        .as_deref()
        .map_or(true, |n| Provider::parse(n) == Some(provider));

    let mut cfg = ProviderConfig::defaults_for(provider);
    if file_applies {
        if let Some(m) = non_blank(file.model.clone()) {
            cfg.model = m;
        }
        if let Some(k) = non_blank(file.api_key.clone()) {
            cfg.api_key = Some(k);
        }
        if let Some(u) = non_blank(file.base_url.clone()) {
            cfg.base_url = Some(u);
        }
        if let Some(t) = file.temperature {
            cfg.temperature = t;
        }
        if let Some(secs) = file.request_timeout_secs {
            cfg.request_timeout = Duration::from_secs(secs.max(1));
        }
    }

    if let Some(m) = provider.env_model().and_then(|k| non_blank(env(k))) {
        cfg.model = m;
    }
    if let Some(k) = provider.env_api_key().and_then(|k| non_blank(env(k))) {
        cfg.api_key = Some(k);
    }
    if let Some(u) = provider.env_base_url().and_then(|k| non_blank(env(k))) {
        cfg.base_url = Some(u);
    }
    if let Some(t) = non_blank(env(ENV_KEY_LLM_TEMPERATURE)) {
        cfg.temperature = t
            .trim()
            .parse()
            .with_context(|| format!("parse {ENV_KEY_LLM_TEMPERATURE}={t}"))?;
    }

    if let Some(m) = non_blank(cli.model.clone()) {
        cfg.model = m;
    }
    if let Some(k) = non_blank(cli.api_key.clone()) {
        cfg.api_key = Some(k);
    }
    if let Some(u) = non_blank(cli.base_url.clone()) {
        cfg.base_url = Some(u);
    }
    if let Some(t) = cli.temperature {
        cfg.temperature = t;
    }

    cfg.validate()?;
    Ok(cfg)
}

/// Reads a process environment variable, treating blank values as unset.
pub fn process_env(key: &str) -> Option<String> {
    non_blank(std::env::var(key).ok())
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

/// Config path from `--config`, then `LEXINETZ_CONFIG`, then an upward search.
pub fn locate_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit
        .or_else(|| process_env(ENV_KEY_CONFIG).map(PathBuf::from))
        .or_else(|| {
            let cwd = std::env::current_dir().ok()?;
            find_default_config(&cwd, CONFIG_FILENAME)
        })
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn provider_parse_accepts_display_names() {
        assert_eq!(Provider::parse("Open AI"), Some(Provider::OpenAi));
        assert_eq!(Provider::parse("openai"), Some(Provider::OpenAi));
        assert_eq!(Provider::parse("OLLAMA"), Some(Provider::Ollama));
        assert_eq!(Provider::parse("llamafile"), Some(Provider::Llamafile));
        assert_eq!(Provider::parse("Cohere"), Some(Provider::Cohere));
        assert_eq!(Provider::parse("bard"), None);
    }

    #[test]
    fn defaults_resolve_to_local_ollama() {
        let cfg = resolve_provider_config(
            &ProviderSection::default(),
            env_from(&[]),
            &ProviderOverrides::default(),
        )
        .unwrap();
        assert_eq!(cfg.provider, Provider::Ollama);
        assert_eq!(cfg.model, "llama3");
        assert_eq!(cfg.base_url.as_deref(), Some("http://localhost:11434"));
        assert!((cfg.temperature - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn env_overrides_file_and_cli_overrides_env() {
        let file = ProviderSection {
            name: Some("Open AI".to_string()),
            model: Some("gpt-4o-mini".to_string()),
            temperature: Some(0.2),
            ..Default::default()
        };
        let env = env_from(&[("OPENAI_API_KEY", "sk-env"), ("OPENAI_MODEL", "gpt-4o")]);
        let cli = ProviderOverrides {
            temperature: Some(1.5),
            ..Default::default()
        };
        let cfg = resolve_provider_config(&file, env, &cli).unwrap();
        assert_eq!(cfg.provider, Provider::OpenAi);
        assert_eq!(cfg.model, "gpt-4o");
        assert_eq!(cfg.api_key.as_deref(), Some("sk-env"));
        assert!((cfg.temperature - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn file_model_ignored_when_env_switches_provider() {
        let file = ProviderSection {
            name: Some("Ollama".to_string()),
            model: Some("mistral".to_string()),
            ..Default::default()
        };
        let env = env_from(&[("LLM_PROVIDER", "Cohere"), ("COHERE_API_KEY", "co-key")]);
        let cfg = resolve_provider_config(&file, env, &ProviderOverrides::default()).unwrap();
        assert_eq!(cfg.provider, Provider::Cohere);
        assert_eq!(cfg.model, "command-r-plus");
    }

    #[test]
    fn file_tuning_ignored_when_env_switches_provider() {
        let file = ProviderSection {
            name: Some("Open AI".to_string()),
            temperature: Some(1.8),
            request_timeout_secs: Some(5),
            ..Default::default()
        };
        let env = env_from(&[("LLM_PROVIDER", "Ollama")]);
        let cfg = resolve_provider_config(&file, env, &ProviderOverrides::default()).unwrap();
        assert_eq!(cfg.provider, Provider::Ollama);
        assert!((cfg.temperature - DEFAULT_LLM_TEMPERATURE).abs() < f32::EPSILON);
        assert_ne!(cfg.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn temperature_upper_bound_depends_on_provider() {
        let cli = ProviderOverrides {
            temperature: Some(1.5),
            ..Default::default()
        };
        let err = resolve_provider_config(&ProviderSection::default(), env_from(&[]), &cli)
            .unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let cli = ProviderOverrides {
            provider: Some("Cohere".to_string()),
            ..Default::default()
        };
        let err = resolve_provider_config(&ProviderSection::default(), env_from(&[]), &cli)
            .unwrap_err();
        assert!(err.to_string().contains("API key"), "{err}");
    }

    #[test]
    fn unknown_provider_lists_choices() {
        let env = env_from(&[("LLM_PROVIDER", "Bard")]);
        let err = resolve_provider_config(&ProviderSection::default(), env, &ProviderOverrides::default())
            .unwrap_err();
        assert!(err.to_string().contains("Open AI"), "{err}");
    }

    #[test]
    fn bad_env_temperature_is_an_error() {
        let env = env_from(&[("LLM_TEMPERATURE", "warm")]);
        assert!(resolve_provider_config(&ProviderSection::default(), env, &ProviderOverrides::default())
            .is_err());
    }

    #[test]
    fn load_config_reads_all_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexinetz.toml");
        std::fs::write(
            &path,
            r#"
[provider]
name = "Llamafile"
base_url = "http://127.0.0.1:9000"

[pipeline]
max_triplets = 5
trace_prompts = true

[prompts]
assess = "prompts/assess.txt"
"#,
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.provider.name.as_deref(), Some("Llamafile"));
        assert_eq!(cfg.pipeline.max_triplets, Some(5));
        assert_eq!(cfg.pipeline.trace_prompts, Some(true));
        assert_eq!(cfg.prompts.assess.as_deref(), Some("prompts/assess.txt"));
        assert!(cfg.prompts.translate.is_none());
    }

    #[test]
    fn find_file_upwards_walks_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("lexinetz.toml"), "").unwrap();
        let found = find_file_upwards(&nested, "lexinetz.toml", 4).unwrap();
        assert_eq!(found, dir.path().join("lexinetz.toml"));
        assert!(find_file_upwards(&nested, "lexinetz.toml", 1).is_none());
    }
}
