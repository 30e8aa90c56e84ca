use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_TOOL_RESULTS: usize = 10;
pub const DEFAULT_MEMORY_TTL_MS: u64 = 15 * 60 * 1000;
pub const DEFAULT_AGENT_ID: &str = "default-agent";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub api_base: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_turns: u32,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub default_agent_id: String,
    pub max_tool_results: usize,
    pub memory_ttl_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub api_base: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub max_tool_results: Option<usize>,
    pub memory_ttl_ms: Option<u64>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig { api_base: "http://api:8080".to_string(), timeout_secs: 30 },
            llm: LlmConfig {
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                timeout_secs: 60,
                max_turns: 8,
            },
            agent: AgentConfig {
                default_agent_id: DEFAULT_AGENT_ID.to_string(),
                max_tool_results: DEFAULT_MAX_TOOL_RESULTS,
                memory_ttl_ms: DEFAULT_MEMORY_TTL_MS,
            },
            server: ServerConfig { bind_address: "0.0.0.0".to_string(), port: 4005 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("copilot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Live agent mode is enabled only when an OpenAI key is present.
    pub fn llm_configured(&self) -> bool {
        self.llm
            .api_key
            .as_ref()
            .map(|value| !value.expose_secret().trim().is_empty())
            .unwrap_or(false)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(backend) = patch.backend {
            if let Some(api_base) = backend.api_base {
                self.backend.api_base = api_base;
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_turns) = llm.max_turns {
                self.llm.max_turns = max_turns;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(default_agent_id) = agent.default_agent_id {
                self.agent.default_agent_id = default_agent_id;
            }
            if let Some(max_tool_results) = agent.max_tool_results {
                self.agent.max_tool_results = max_tool_results;
            }
            if let Some(memory_ttl_ms) = agent.memory_ttl_ms {
                self.agent.memory_ttl_ms = memory_ttl_ms;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("API_BASE") {
            self.backend.api_base = value;
        }
        if let Some(value) = read_env("API_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("API_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OPENAI_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("OPENAI_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("OPENAI_BASE_URL") {
            self.llm.base_url = value;
        }

        if let Some(value) = read_env("AGENT_CHATKIT_AGENT_ID") {
            self.agent.default_agent_id = value;
        }
        // Limits from the environment are lenient: anything unusable keeps the default.
        let max_results =
            read_env("AGENT_MAX_TOOL_RESULTS").or_else(|| read_env("AGENT_PROXY_MAX_RESULTS"));
        if let Some(value) = max_results {
            self.agent.max_tool_results =
                positive_or(&value, DEFAULT_MAX_TOOL_RESULTS as u64) as usize;
        }
        let memory_ttl =
            read_env("AGENT_PROXY_MEMORY_TTL_MS").or_else(|| read_env("AGENT_MEMORY_TTL_MS"));
        if let Some(value) = memory_ttl {
            self.agent.memory_ttl_ms = positive_or(&value, DEFAULT_MEMORY_TTL_MS);
        }

        if let Some(value) = read_env("BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PORT") {
            self.server.port = parse_u16("PORT", &value)?;
        }

        if let Some(value) = read_env("LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(api_base) = overrides.api_base {
            self.backend.api_base = api_base;
        }
        if let Some(openai_api_key) = overrides.openai_api_key {
            self.llm.api_key = Some(secret_value(openai_api_key));
        }
        if let Some(openai_model) = overrides.openai_model {
            self.llm.model = openai_model;
        }
        if let Some(openai_base_url) = overrides.openai_base_url {
            self.llm.base_url = openai_base_url;
        }
        if let Some(max_tool_results) = overrides.max_tool_results {
            self.agent.max_tool_results = max_tool_results;
        }
        if let Some(memory_ttl_ms) = overrides.memory_ttl_ms {
            self.agent.memory_ttl_ms = memory_ttl_ms;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_backend(&self.backend)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("copilot.toml"), PathBuf::from("config/copilot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    let api_base = backend.api_base.trim();
    if !api_base.starts_with("http://") && !api_base.starts_with("https://") {
        return Err(ConfigError::Validation(
            "backend.api_base must start with http:// or https://".to_string(),
        ));
    }

    if backend.timeout_secs == 0 || backend.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "backend.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.max_turns == 0 {
        return Err(ConfigError::Validation(
            "llm.max_turns must be greater than zero".to_string(),
        ));
    }

    let base_url = llm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_tool_results == 0 {
        return Err(ConfigError::Validation(
            "agent.max_tool_results must be greater than zero".to_string(),
        ));
    }

    if agent.memory_ttl_ms == 0 {
        return Err(ConfigError::Validation(
            "agent.memory_ttl_ms must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn positive_or(value: &str, fallback: u64) -> u64 {
    value.trim().parse::<u64>().ok().filter(|parsed| *parsed > 0).unwrap_or(fallback)
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    backend: Option<BackendPatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    api_base: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_turns: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    default_agent_id: Option<String>,
    max_tool_results: Option<usize>,
    memory_ttl_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
