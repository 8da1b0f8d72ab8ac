//! Process configuration, read from the environment (and `.env`, loaded by the binary).

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::completion::{CompletionOptions, RecencyFilter};
use crate::llm::perplexity::{mask_key, PerplexityConfig, DEFAULT_BASE_URL};
use crate::llm::find_model;

pub const API_KEY_VAR: &str = "PERPLEXITY_API_KEY";
pub const BASE_URL_VAR: &str = "PERPLEXITY_BASE_URL";
pub const DEFAULT_MODEL_VAR: &str = "STOCK_CHAT_DEFAULT_MODEL";
pub const SESSION_DB_VAR: &str = "STOCK_CHAT_SESSION_DB";
pub const STOCK_DATA_URL_VAR: &str = "STOCK_DATA_BASE_URL";
pub const TIMEOUT_VAR: &str = "STOCK_CHAT_TIMEOUT_SECS";
pub const RECENCY_VAR: &str = "STOCK_CHAT_RECENCY_FILTER";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{var} has an invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_model: Option<String>,
    pub session_db: Option<PathBuf>,
    pub stock_data_url: Option<String>,
    pub timeout: Duration,
    pub recency_filter: RecencyFilter,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &mask_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("session_db", &self.session_db)
            .field("stock_data_url", &self.stock_data_url)
            .field("timeout", &self.timeout)
            .field("recency_filter", &self.recency_filter)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get(API_KEY_VAR).ok_or(ConfigError::Missing(API_KEY_VAR))?;
        let base_url = get(BASE_URL_VAR)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let default_model = get(DEFAULT_MODEL_VAR);
        if let Some(model) = &default_model {
            if find_model(model).is_none() {
                return Err(ConfigError::Invalid {
                    var: DEFAULT_MODEL_VAR,
                    value: model.clone(),
                    reason: "not a known model".to_string(),
                });
            }
        }

        let timeout = match get(TIMEOUT_VAR) {
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                Ok(_) => {
                    return Err(ConfigError::Invalid {
                        var: TIMEOUT_VAR,
                        value: raw,
                        reason: "must be greater than zero".to_string(),
                    })
                }
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        var: TIMEOUT_VAR,
                        value: raw,
                        reason: e.to_string(),
                    })
                }
            },
        };

        let recency_filter = match get(RECENCY_VAR) {
            None => RecencyFilter::default(),
            Some(raw) => RecencyFilter::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                var: RECENCY_VAR,
                value: raw.clone(),
                reason: "expected hour, day, week or month".to_string(),
            })?,
        };

        Ok(Self {
            api_key,
            base_url,
            default_model,
            session_db: get(SESSION_DB_VAR).map(PathBuf::from),
            stock_data_url: get(STOCK_DATA_URL_VAR).map(|u| u.trim_end_matches('/').to_string()),
            timeout,
            recency_filter,
        })
    }

    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            recency_filter: self.recency_filter,
            ..CompletionOptions::default()
        }
    }

    pub fn perplexity(&self) -> PerplexityConfig {
        PerplexityConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            timeout: self.timeout,
        }
    }
}
