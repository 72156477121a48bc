use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default stream topic for robot messages, as published by the DingTalk
/// open platform.
pub const TOPIC_ROBOT: &str = "/v1.0/im/bot/messages/get";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub webhook: WebhookConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub topic: String,
    pub auto_ack: bool,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub base_url: String,
    pub robot: RobotProfile,
    pub secret: Option<SecretString>,
    pub access_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Which flavor of DingTalk robot the webhook targets. A custom robot signs
/// the URL with a shared secret; a company robot authenticates with an
/// access-token header. The two credentials are mutually exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotProfile {
    Custom,
    Company,
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
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub topic: Option<String>,
    pub auto_ack: Option<bool>,
    pub webhook_enabled: Option<bool>,
    pub webhook_url: Option<String>,
    pub webhook_robot: Option<RobotProfile>,
    pub webhook_secret: Option<String>,
    pub webhook_access_token: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
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
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig {
                client_id: String::new(),
                client_secret: String::new().into(),
                topic: TOPIC_ROBOT.to_string(),
                auto_ack: true,
                max_retries: 5,
                base_delay_ms: 250,
                max_delay_ms: 5_000,
            },
            webhook: WebhookConfig {
                enabled: false,
                base_url: String::new(),
                robot: RobotProfile::Custom,
                secret: None,
                access_token: None,
                timeout_secs: 10,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for RobotProfile {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "custom" => Ok(Self::Custom),
            "company" => Ok(Self::Company),
            other => Err(ConfigError::Validation(format!(
                "unsupported robot profile `{other}` (expected custom|company)"
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
    /// Loads configuration with precedence env > file > default, then applies
    /// programmatic overrides and validates the result.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("dingbridge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_lookup(|key| env::var(key).ok())?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(stream) = patch.stream {
            if let Some(client_id) = stream.client_id {
                self.stream.client_id = client_id;
            }
            if let Some(client_secret_value) = stream.client_secret {
                self.stream.client_secret = secret_value(client_secret_value);
            }
            if let Some(topic) = stream.topic {
                self.stream.topic = topic;
            }
            if let Some(auto_ack) = stream.auto_ack {
                self.stream.auto_ack = auto_ack;
            }
            if let Some(max_retries) = stream.max_retries {
                self.stream.max_retries = max_retries;
            }
            if let Some(base_delay_ms) = stream.base_delay_ms {
                self.stream.base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = stream.max_delay_ms {
                self.stream.max_delay_ms = max_delay_ms;
            }
        }

        if let Some(webhook) = patch.webhook {
            if let Some(enabled) = webhook.enabled {
                self.webhook.enabled = enabled;
            }
            if let Some(base_url) = webhook.base_url {
                self.webhook.base_url = base_url;
            }
            if let Some(robot) = webhook.robot {
                self.webhook.robot = robot;
            }
            if let Some(secret_str) = webhook.secret {
                self.webhook.secret = Some(secret_value(secret_str));
            }
            if let Some(access_token_value) = webhook.access_token {
                self.webhook.access_token = Some(secret_value(access_token_value));
            }
            if let Some(timeout_secs) = webhook.timeout_secs {
                self.webhook.timeout_secs = timeout_secs;
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

    fn apply_env_lookup<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(client_id) = lookup("DINGBRIDGE_STREAM_CLIENT_ID") {
            self.stream.client_id = client_id;
        }
        if let Some(client_secret_env) = lookup("DINGBRIDGE_STREAM_CLIENT_SECRET") {
            self.stream.client_secret = secret_value(client_secret_env);
        }
        if let Some(topic) = lookup("DINGBRIDGE_STREAM_TOPIC") {
            self.stream.topic = topic;
        }
        if let Some(auto_ack) = lookup("DINGBRIDGE_STREAM_AUTO_ACK") {
            self.stream.auto_ack = parse_bool("DINGBRIDGE_STREAM_AUTO_ACK", &auto_ack)?;
        }
        if let Some(max_retries) = lookup("DINGBRIDGE_STREAM_MAX_RETRIES") {
            self.stream.max_retries = parse_number("DINGBRIDGE_STREAM_MAX_RETRIES", &max_retries)?;
        }

        if let Some(enabled) = lookup("DINGBRIDGE_WEBHOOK_ENABLED") {
            self.webhook.enabled = parse_bool("DINGBRIDGE_WEBHOOK_ENABLED", &enabled)?;
        }
        if let Some(base_url) = lookup("DINGBRIDGE_WEBHOOK_URL") {
            self.webhook.base_url = base_url;
        }
        if let Some(robot) = lookup("DINGBRIDGE_WEBHOOK_ROBOT") {
            self.webhook.robot = robot.parse()?;
        }
        if let Some(secret_env) = lookup("DINGBRIDGE_WEBHOOK_SECRET") {
            self.webhook.secret = Some(secret_value(secret_env));
        }
        if let Some(access_token_env) = lookup("DINGBRIDGE_WEBHOOK_ACCESS_TOKEN") {
            self.webhook.access_token = Some(secret_value(access_token_env));
        }
        if let Some(timeout_secs) = lookup("DINGBRIDGE_WEBHOOK_TIMEOUT_SECS") {
            self.webhook.timeout_secs =
                parse_number("DINGBRIDGE_WEBHOOK_TIMEOUT_SECS", &timeout_secs)?;
        }

        if let Some(level) = lookup("DINGBRIDGE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("DINGBRIDGE_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(client_id) = overrides.client_id {
            self.stream.client_id = client_id;
        }
        if let Some(client_secret_override) = overrides.client_secret {
            self.stream.client_secret = secret_value(client_secret_override);
        }
        if let Some(topic) = overrides.topic {
            self.stream.topic = topic;
        }
        if let Some(auto_ack) = overrides.auto_ack {
            self.stream.auto_ack = auto_ack;
        }
        if let Some(enabled) = overrides.webhook_enabled {
            self.webhook.enabled = enabled;
        }
        if let Some(webhook_url) = overrides.webhook_url {
            self.webhook.base_url = webhook_url;
        }
        if let Some(robot) = overrides.webhook_robot {
            self.webhook.robot = robot;
        }
        if let Some(secret_override) = overrides.webhook_secret {
            self.webhook.secret = Some(secret_value(secret_override));
        }
        if let Some(access_token_override) = overrides.webhook_access_token {
            self.webhook.access_token = Some(secret_value(access_token_override));
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.topic.trim().is_empty() {
            return Err(ConfigError::Validation("stream.topic must not be empty".to_owned()));
        }

        let has_client_id = !self.stream.client_id.trim().is_empty();
        let has_client_secret = !self.stream.client_secret.expose_secret().trim().is_empty();
        if has_client_id != has_client_secret {
            return Err(ConfigError::Validation(
                "stream.client_id and stream.client_secret must be set together".to_owned(),
            ));
        }

        if self.stream.max_delay_ms < self.stream.base_delay_ms {
            return Err(ConfigError::Validation(
                "stream.max_delay_ms must not be smaller than stream.base_delay_ms".to_owned(),
            ));
        }

        if self.webhook.enabled {
            self.validate_webhook()?;
        }

        Ok(())
    }

    fn validate_webhook(&self) -> Result<(), ConfigError> {
        if self.webhook.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "webhook.base_url is required when the webhook is enabled".to_owned(),
            ));
        }
        if self.webhook.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "webhook.timeout_secs must be greater than zero".to_owned(),
            ));
        }

        match self.webhook.robot {
            RobotProfile::Custom => {
                if self.webhook.secret.is_none() {
                    return Err(ConfigError::Validation(
                        "webhook.secret is required for a custom robot".to_owned(),
                    ));
                }
                if self.webhook.access_token.is_some() {
                    return Err(ConfigError::Validation(
                        "webhook.access_token is not valid for a custom robot".to_owned(),
                    ));
                }
            }
            RobotProfile::Company => {
                if self.webhook.access_token.is_none() {
                    return Err(ConfigError::Validation(
                        "webhook.access_token is required for a company robot".to_owned(),
                    ));
                }
                if self.webhook.secret.is_some() {
                    return Err(ConfigError::Validation(
                        "webhook.secret is not valid for a company robot".to_owned(),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride { key: key.to_owned(), value: value.to_owned() }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    if let Ok(env_path) = env::var("DINGBRIDGE_CONFIG") {
        let candidate = PathBuf::from(env_path);
        return candidate.exists().then_some(candidate);
    }
    let default = PathBuf::from("dingbridge.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw).map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    stream: Option<StreamPatch>,
    webhook: Option<WebhookPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamPatch {
    client_id: Option<String>,
    client_secret: Option<String>,
    topic: Option<String>,
    auto_ack: Option<bool>,
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    robot: Option<RobotProfile>,
    secret: Option<String>,
    access_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

/// Redacts a secret for display: first four characters, then an ellipsis.
pub fn redact_secret(value: &str) -> String {
    if value.is_empty() {
        return "(unset)".to_owned();
    }
    let prefix: String = value.chars().take(4).collect();
    format!("{prefix}…")
}
