//! Process configuration, read once from the environment at start-up.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not valid: {message}")]
    Invalid { name: &'static str, message: String },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

/// Remote model settings. Absent when `LLM_API_URL` is unset, in which case
/// budget insights use the local heuristic only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub llm: Option<LlmSettings>,
}

impl ApiConfig {
    /// In-memory stores, no model, the given signing secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: jwt_secret.into(),
            use_persistent_stores: false,
            database_url: None,
            llm: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                message: e.to_string(),
            })?;

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let use_persistent_stores = match var("USE_PERSISTENT_STORES") {
            None => false,
            Some(v) => v.parse::<bool>().map_err(|e| ConfigError::Invalid {
                name: "USE_PERSISTENT_STORES",
                message: e.to_string(),
            })?,
        };

        let database_url = var("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let llm = match var("LLM_API_URL") {
            None => None,
            Some(api_url) => {
                let timeout_secs = match var("LLM_TIMEOUT_SECS") {
                    None => DEFAULT_LLM_TIMEOUT_SECS,
                    Some(v) => v.parse::<u64>().map_err(|e| ConfigError::Invalid {
                        name: "LLM_TIMEOUT_SECS",
                        message: e.to_string(),
                    })?,
                };
                Some(LlmSettings {
                    api_url,
                    model: var("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                    api_key: var("LLM_API_KEY"),
                    timeout: Duration::from_secs(timeout_secs),
                })
            }
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            use_persistent_stores,
            database_url,
            llm,
        })
    }
}
