use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::knowledge::{KnowledgeBaseEndpoint, QueryOptions};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub knowledge_base: KnowledgeBaseConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct KnowledgeBaseConfig {
    pub id: String,
    pub host: String,
    pub endpoint_key: SecretString,
    pub top: u32,
    pub score_threshold: f64,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub log_personal_information: bool,
    pub emission_timeout_ms: u64,
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
    pub knowledge_base_id: Option<String>,
    pub knowledge_base_host: Option<String>,
    pub knowledge_base_endpoint_key: Option<String>,
    pub log_personal_information: Option<bool>,
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
            knowledge_base: KnowledgeBaseConfig {
                id: String::new(),
                host: String::new(),
                endpoint_key: String::new().into(),
                top: 1,
                score_threshold: 0.3,
                timeout_secs: 10,
            },
            telemetry: TelemetryConfig { log_personal_information: false, emission_timeout_ms: 2_000 },
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

impl KnowledgeBaseConfig {
    pub fn endpoint(&self) -> KnowledgeBaseEndpoint {
        KnowledgeBaseEndpoint {
            knowledge_base_id: self.id.clone(),
            host: self.host.clone(),
            endpoint_key: self.endpoint_key.clone(),
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            top: self.top,
            score_threshold: self.score_threshold,
            strict_filters: Vec::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TelemetryConfig {
    pub fn emission_timeout(&self) -> Duration {
        Duration::from_millis(self.emission_timeout_ms)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let config = Self::load_unvalidated(options)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves only the logging section. Commands that never reach the knowledge
    /// base use this so a missing endpoint does not block them.
    pub fn load_logging(options: LoadOptions) -> Result<LoggingConfig, ConfigError> {
        let config = Self::load_unvalidated(options)?;
        validate_logging(&config.logging)?;
        Ok(config.logging)
    }

    fn load_unvalidated(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("assistant.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(knowledge_base) = patch.knowledge_base {
            if let Some(id) = knowledge_base.id {
                self.knowledge_base.id = id;
            }
            if let Some(host) = knowledge_base.host {
                self.knowledge_base.host = host;
            }
            if let Some(endpoint_key) = knowledge_base.endpoint_key {
                self.knowledge_base.endpoint_key = secret_value(endpoint_key);
            }
            if let Some(top) = knowledge_base.top {
                self.knowledge_base.top = top;
            }
            if let Some(score_threshold) = knowledge_base.score_threshold {
                self.knowledge_base.score_threshold = score_threshold;
            }
            if let Some(timeout_secs) = knowledge_base.timeout_secs {
                self.knowledge_base.timeout_secs = timeout_secs;
            }
        }

        if let Some(telemetry) = patch.telemetry {
            if let Some(log_personal_information) = telemetry.log_personal_information {
                self.telemetry.log_personal_information = log_personal_information;
            }
            if let Some(emission_timeout_ms) = telemetry.emission_timeout_ms {
                self.telemetry.emission_timeout_ms = emission_timeout_ms;
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
        if let Some(value) = read_env("ASSISTANT_KB_ID") {
            self.knowledge_base.id = value;
        }
        if let Some(value) = read_env("ASSISTANT_KB_HOST") {
            self.knowledge_base.host = value;
        }
        if let Some(value) = read_env("ASSISTANT_KB_ENDPOINT_KEY") {
            self.knowledge_base.endpoint_key = secret_value(value);
        }
        if let Some(value) = read_env("ASSISTANT_KB_TOP") {
            self.knowledge_base.top = parse_u32("ASSISTANT_KB_TOP", &value)?;
        }
        if let Some(value) = read_env("ASSISTANT_KB_SCORE_THRESHOLD") {
            self.knowledge_base.score_threshold =
                parse_f64("ASSISTANT_KB_SCORE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("ASSISTANT_KB_TIMEOUT_SECS") {
            self.knowledge_base.timeout_secs = parse_u64("ASSISTANT_KB_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ASSISTANT_TELEMETRY_LOG_PERSONAL_INFORMATION") {
            self.telemetry.log_personal_information =
                parse_bool("ASSISTANT_TELEMETRY_LOG_PERSONAL_INFORMATION", &value)?;
        }
        if let Some(value) = read_env("ASSISTANT_TELEMETRY_EMISSION_TIMEOUT_MS") {
            self.telemetry.emission_timeout_ms =
                parse_u64("ASSISTANT_TELEMETRY_EMISSION_TIMEOUT_MS", &value)?;
        }

        let log_level =
            read_env("ASSISTANT_LOGGING_LEVEL").or_else(|| read_env("ASSISTANT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ASSISTANT_LOGGING_FORMAT").or_else(|| read_env("ASSISTANT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(id) = overrides.knowledge_base_id {
            self.knowledge_base.id = id;
        }
        if let Some(host) = overrides.knowledge_base_host {
            self.knowledge_base.host = host;
        }
        if let Some(endpoint_key) = overrides.knowledge_base_endpoint_key {
            self.knowledge_base.endpoint_key = secret_value(endpoint_key);
        }
        if let Some(log_personal_information) = overrides.log_personal_information {
            self.telemetry.log_personal_information = log_personal_information;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_knowledge_base(&self.knowledge_base)?;
        validate_telemetry(&self.telemetry)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("assistant.toml"), PathBuf::from("config/assistant.toml")]
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

fn validate_knowledge_base(knowledge_base: &KnowledgeBaseConfig) -> Result<(), ConfigError> {
    if knowledge_base.id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "knowledge_base.id is required. Find it under the knowledge base's publish settings"
                .to_string(),
        ));
    }

    let host = knowledge_base.host.trim();
    if host.is_empty() {
        return Err(ConfigError::Validation("knowledge_base.host is required".to_string()));
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        return Err(ConfigError::Validation(
            "knowledge_base.host must start with http:// or https://".to_string(),
        ));
    }

    if knowledge_base.endpoint_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "knowledge_base.endpoint_key is required. Set ASSISTANT_KB_ENDPOINT_KEY".to_string(),
        ));
    }

    if knowledge_base.top == 0 {
        return Err(ConfigError::Validation(
            "knowledge_base.top must be greater than zero".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&knowledge_base.score_threshold) {
        return Err(ConfigError::Validation(
            "knowledge_base.score_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    if knowledge_base.timeout_secs == 0 || knowledge_base.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "knowledge_base.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_telemetry(telemetry: &TelemetryConfig) -> Result<(), ConfigError> {
    if telemetry.emission_timeout_ms == 0 || telemetry.emission_timeout_ms > 30_000 {
        return Err(ConfigError::Validation(
            "telemetry.emission_timeout_ms must be in range 1..=30000".to_string(),
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

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    knowledge_base: Option<KnowledgeBasePatch>,
    telemetry: Option<TelemetryPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct KnowledgeBasePatch {
    id: Option<String>,
    host: Option<String>,
    endpoint_key: Option<String>,
    top: Option<u32>,
    score_threshold: Option<f64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TelemetryPatch {
    log_personal_information: Option<bool>,
    emission_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
