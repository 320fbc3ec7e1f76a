pub const PROJECT_NAME: &str = "lexinetz";
pub const PROJECT_HEADLINE: &str = "knowledge based language translation";

pub const CONFIG_FILENAME: &str = "lexinetz.toml";
pub const ENV_KEY_CONFIG: &str = "LEXINETZ_CONFIG";

/// Languages offered by the front ends, named in their own script.
pub const SUPPORTED_LANGUAGES: [&str; 15] = [
    "English",
    "Español",
    "Français",
    "Italiano",
    "Deutsch",
    "Português",
    "Suomi",
    "Svenska",
    "Dansk",
    "Norsk",
    "Nederlands",
    "Polski",
    "日本語",
    "中文",
    "한국어",
];

pub const ENV_KEY_LLM_PROVIDER: &str = "LLM_PROVIDER";
pub const ENV_KEY_COHERE_API_KEY: &str = "COHERE_API_KEY";
pub const ENV_KEY_COHERE_MODEL: &str = "COHERE_MODEL";
pub const ENV_KEY_LLAMAFILE_URL: &str = "LLAMAFILE_URL";
pub const ENV_KEY_OLLAMA_URL: &str = "OLLAMA_URL";
pub const ENV_KEY_OLLAMA_MODEL: &str = "OLLAMA_MODEL";
pub const ENV_KEY_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_KEY_OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const ENV_KEY_LLM_TEMPERATURE: &str = "LLM_TEMPERATURE";

pub const DEFAULT_LLM_PROVIDER: &str = "Ollama";
pub const DEFAULT_COHERE_URL: &str = "https://api.cohere.com";
pub const DEFAULT_COHERE_MODEL: &str = "command-r-plus";
pub const DEFAULT_LLAMAFILE_URL: &str = "http://localhost:8080";
pub const DEFAULT_LLAMAFILE_MODEL: &str = "LLaMA_CPP";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo-0125";
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.4;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_MAX_TRIPLETS: usize = 10;
pub const DEFAULT_MAX_AGENT_TURNS: usize = 10;
pub const DEFAULT_LOG_MAX_CHARS: usize = 240;

#[must_use]
pub fn is_supported_language(name: &str) -> bool {
    let name = name.trim();
    SUPPORTED_LANGUAGES
        .iter()
        .any(|l| l.eq_ignore_ascii_case(name))
}
