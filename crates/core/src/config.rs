use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub guardrails: GuardrailConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Maximum think→tool→observe iterations per question.
    pub max_iterations: u32,
    /// Region prefix appended to economic queries with no country mention.
    pub region_context: String,
    /// Whether a failed indicator lookup triggers the search-and-save cycle.
    pub auto_recovery: bool,
    pub circuit_failure_threshold: u32,
    pub circuit_cooldown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GuardrailConfig {
    pub max_length: usize,
    pub rate_limit_requests: usize,
    pub rate_limit_window_secs: u64,
    pub enable_content_filter: bool,
    pub enable_pii_detection: bool,
    pub enable_rate_limiting: bool,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub forecast_ttl_secs: u64,
    pub forecast_max_entries: usize,
    pub search_ttl_secs: u64,
    pub search_max_entries: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Ollama,
    OpenAi,
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
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub log_level: Option<String>,
    pub max_iterations: Option<u32>,
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
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "mistral".to_string(),
                timeout_secs: 60,
            },
            agent: AgentConfig {
                max_iterations: 3,
                region_context: "Moldova".to_string(),
                auto_recovery: true,
                circuit_failure_threshold: 3,
                circuit_cooldown_secs: 300,
            },
            guardrails: GuardrailConfig {
                max_length: 5000,
                rate_limit_requests: 50,
                rate_limit_window_secs: 60,
                enable_content_filter: true,
                enable_pii_detection: true,
                enable_rate_limiting: true,
            },
            cache: CacheConfig {
                forecast_ttl_secs: 15 * 60,
                forecast_max_entries: 100,
                search_ttl_secs: 30 * 60,
                search_max_entries: 256,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected ollama|openai)"
            ))),
        }
    }
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
    /// Load order: built-in defaults, then `econ.toml` (if present), then
    /// `ECON_*` environment variables, then programmatic overrides. Validation
    /// runs once on the merged result.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("econ.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(api_key.into());
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_iterations) = agent.max_iterations {
                self.agent.max_iterations = max_iterations;
            }
            if let Some(region_context) = agent.region_context {
                self.agent.region_context = region_context;
            }
            if let Some(auto_recovery) = agent.auto_recovery {
                self.agent.auto_recovery = auto_recovery;
            }
            if let Some(threshold) = agent.circuit_failure_threshold {
                self.agent.circuit_failure_threshold = threshold;
            }
            if let Some(cooldown) = agent.circuit_cooldown_secs {
                self.agent.circuit_cooldown_secs = cooldown;
            }
        }

        if let Some(guardrails) = patch.guardrails {
            if let Some(max_length) = guardrails.max_length {
                self.guardrails.max_length = max_length;
            }
            if let Some(requests) = guardrails.rate_limit_requests {
                self.guardrails.rate_limit_requests = requests;
            }
            if let Some(window) = guardrails.rate_limit_window_secs {
                self.guardrails.rate_limit_window_secs = window;
            }
            if let Some(enabled) = guardrails.enable_content_filter {
                self.guardrails.enable_content_filter = enabled;
            }
            if let Some(enabled) = guardrails.enable_pii_detection {
                self.guardrails.enable_pii_detection = enabled;
            }
            if let Some(enabled) = guardrails.enable_rate_limiting {
                self.guardrails.enable_rate_limiting = enabled;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(ttl) = cache.forecast_ttl_secs {
                self.cache.forecast_ttl_secs = ttl;
            }
            if let Some(max_entries) = cache.forecast_max_entries {
                self.cache.forecast_max_entries = max_entries;
            }
            if let Some(ttl) = cache.search_ttl_secs {
                self.cache.search_ttl_secs = ttl;
            }
            if let Some(max_entries) = cache.search_max_entries {
                self.cache.search_max_entries = max_entries;
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
        if let Some(value) = read_env("ECON_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("ECON_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("ECON_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("ECON_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("ECON_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("ECON_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ECON_AGENT_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_u32("ECON_AGENT_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("ECON_AGENT_REGION_CONTEXT") {
            self.agent.region_context = value;
        }
        if let Some(value) = read_env("ECON_AGENT_AUTO_RECOVERY") {
            self.agent.auto_recovery = parse_bool("ECON_AGENT_AUTO_RECOVERY", &value)?;
        }
        if let Some(value) = read_env("ECON_AGENT_CIRCUIT_FAILURE_THRESHOLD") {
            self.agent.circuit_failure_threshold =
                parse_u32("ECON_AGENT_CIRCUIT_FAILURE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("ECON_AGENT_CIRCUIT_COOLDOWN_SECS") {
            self.agent.circuit_cooldown_secs =
                parse_u64("ECON_AGENT_CIRCUIT_COOLDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("ECON_GUARDRAILS_MAX_LENGTH") {
            self.guardrails.max_length =
                parse_u64("ECON_GUARDRAILS_MAX_LENGTH", &value)? as usize;
        }
        if let Some(value) = read_env("ECON_GUARDRAILS_RATE_LIMIT_REQUESTS") {
            self.guardrails.rate_limit_requests =
                parse_u64("ECON_GUARDRAILS_RATE_LIMIT_REQUESTS", &value)? as usize;
        }
        if let Some(value) = read_env("ECON_GUARDRAILS_RATE_LIMIT_WINDOW_SECS") {
            self.guardrails.rate_limit_window_secs =
                parse_u64("ECON_GUARDRAILS_RATE_LIMIT_WINDOW_SECS", &value)?;
        }

        if let Some(value) = read_env("ECON_CACHE_FORECAST_TTL_SECS") {
            self.cache.forecast_ttl_secs = parse_u64("ECON_CACHE_FORECAST_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("ECON_CACHE_SEARCH_TTL_SECS") {
            self.cache.search_ttl_secs = parse_u64("ECON_CACHE_SEARCH_TTL_SECS", &value)?;
        }

        let log_level = read_env("ECON_LOGGING_LEVEL").or_else(|| read_env("ECON_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("ECON_LOGGING_FORMAT").or_else(|| read_env("ECON_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(max_iterations) = overrides.max_iterations {
            self.agent.max_iterations = max_iterations;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_guardrails(&self.guardrails)?;
        validate_cache(&self.cache)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("econ.toml"), PathBuf::from("config/econ.toml")]
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation("llm.timeout_secs must be in range 1..=300".to_string()));
    }

    match llm.provider {
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_iterations == 0 || agent.max_iterations > 10 {
        return Err(ConfigError::Validation(
            "agent.max_iterations must be in range 1..=10".to_string(),
        ));
    }
    if agent.circuit_failure_threshold == 0 {
        return Err(ConfigError::Validation(
            "agent.circuit_failure_threshold must be greater than zero".to_string(),
        ));
    }
    if agent.circuit_cooldown_secs == 0 {
        return Err(ConfigError::Validation(
            "agent.circuit_cooldown_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_guardrails(guardrails: &GuardrailConfig) -> Result<(), ConfigError> {
    if guardrails.max_length == 0 {
        return Err(ConfigError::Validation(
            "guardrails.max_length must be greater than zero".to_string(),
        ));
    }
    if guardrails.enable_rate_limiting {
        if guardrails.rate_limit_requests == 0 {
            return Err(ConfigError::Validation(
                "guardrails.rate_limit_requests must be greater than zero".to_string(),
            ));
        }
        if guardrails.rate_limit_window_secs == 0 {
            return Err(ConfigError::Validation(
                "guardrails.rate_limit_window_secs must be greater than zero".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.forecast_ttl_secs == 0 || cache.search_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "cache TTLs must be greater than zero".to_string(),
        ));
    }
    if cache.forecast_max_entries == 0 || cache.search_max_entries == 0 {
        return Err(ConfigError::Validation(
            "cache max entries must be greater than zero".to_string(),
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

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    guardrails: Option<GuardrailPatch>,
    cache: Option<CachePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_iterations: Option<u32>,
    region_context: Option<String>,
    auto_recovery: Option<bool>,
    circuit_failure_threshold: Option<u32>,
    circuit_cooldown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GuardrailPatch {
    max_length: Option<usize>,
    rate_limit_requests: Option<usize>,
    rate_limit_window_secs: Option<u64>,
    enable_content_filter: Option<bool>,
    enable_pii_detection: Option<bool>,
    enable_rate_limiting: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    forecast_ttl_secs: Option<u64>,
    forecast_max_entries: Option<usize>,
    search_ttl_secs: Option<u64>,
    search_max_entries: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
