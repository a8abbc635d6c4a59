use reqwest::Url;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_PATH: &str = "config/agent.toml";
pub const DEFAULT_MODEL: &str = "gpt-4.1";
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant.";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const SERVER_URL_ENV: &str = "MCP_SERVER_URL";
pub const MODEL_ENV: &str = "OPENAI_MODEL";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

static ENV_LOADER: Once = Once::new();

#[derive(Clone)]
pub struct AppConfig {
    pub model: String,
    pub instructions: String,
    pub mcp_server_url: String,
    pub openai_base_url: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
    pub insecure_tls: bool,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("model", &self.model)
            .field("instructions", &self.instructions)
            .field("mcp_server_url", &self.mcp_server_url)
            .field("openai_base_url", &self.openai_base_url)
            .field("api_key", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("insecure_tls", &self.insecure_tls)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {path:?}")]
    NotFound { path: PathBuf },
    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("MCP server URL is not set (set MCP_SERVER_URL, mcp_server_url or --server-url)")]
    MissingServerUrl,
    #[error("OpenAI API key is not set (set OPENAI_API_KEY or api_key)")]
    MissingApiKey,
    #[error("{field} '{value}' is not a valid URL: {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("request timeout must be at least one second")]
    ZeroTimeout,
}

/// Values given on the command line; they win over every other source.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub mcp_server_url: Option<String>,
    pub openai_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub insecure_tls: bool,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    model: Option<String>,
    instructions: Option<String>,
    mcp_server_url: Option<String>,
    openai_base_url: Option<String>,
    api_key: Option<String>,
    request_timeout_secs: Option<u64>,
    insecure_tls: Option<bool>,
}

/// Loads `.env` into the process environment once. Variables already set
/// in the environment are left untouched.
pub fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "Loaded environment file"),
        Err(err) if err.not_found() => {}
        Err(err) => debug!(%err, "Ignoring unreadable environment file"),
    });
}

impl AppConfig {
    /// Layers defaults, the TOML file, the environment and `overrides`.
    ///
    /// Without an explicit `path` the default location is tried and a
    /// missing file is not an error.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        ensure_env_loaded();
        let raw = match path {
            Some(path) => read_raw(path)?,
            None => match read_raw(Path::new(DEFAULT_CONFIG_PATH)) {
                Ok(raw) => raw,
                Err(ConfigError::NotFound { .. }) => {
                    info!("Configuration file not found; using defaults and environment");
                    RawConfig::default()
                }
                Err(other) => return Err(other),
            },
        };
        resolve(raw, |key| std::env::var(key).ok(), overrides)
    }
}

fn read_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    debug!(path = %path.display(), "Reading agent configuration file");
    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn resolve<F>(raw: RawConfig, env: F, overrides: &ConfigOverrides) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());

    let mcp_server_url = overrides
        .mcp_server_url
        .clone()
        .or_else(|| env(SERVER_URL_ENV))
        .or(raw.mcp_server_url)
        .ok_or(ConfigError::MissingServerUrl)?;
    validate_url("mcp_server_url", &mcp_server_url)?;

    let openai_base_url = overrides
        .openai_base_url
        .clone()
        .or_else(|| env(BASE_URL_ENV))
        .or(raw.openai_base_url)
        .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
    validate_url("openai_base_url", &openai_base_url)?;

    let api_key = env(API_KEY_ENV)
        .or(raw.api_key)
        .filter(|key| !key.trim().is_empty())
        .ok_or(ConfigError::MissingApiKey)?;

    let request_timeout_secs = overrides
        .request_timeout_secs
        .or(raw.request_timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    if request_timeout_secs == 0 {
        return Err(ConfigError::ZeroTimeout);
    }

    Ok(AppConfig {
        model: overrides
            .model
            .clone()
            .or_else(|| env(MODEL_ENV))
            .or(raw.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        instructions: overrides
            .instructions
            .clone()
            .or(raw.instructions)
            .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string()),
        mcp_server_url,
        openai_base_url,
        api_key,
        request_timeout_secs,
        insecure_tls: overrides.insecure_tls || raw.insecure_tls.unwrap_or(false),
    })
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|err| ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: err.to_string(),
        })
}
