//! Application-level settings shared by binaries

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::LogFormat;

/// Errors raised while reading settings from the environment
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// A variable was present but could not be parsed
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Process-wide settings that are not specific to analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Application name, used in the HTTP user agent
    pub app_name: String,
    /// Environment (development, production, ...)
    pub environment: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            app_name: "stock-signals".to_string(),
            environment: "development".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl AppSettings {
    /// Read settings from `STOCK_SIGNALS_ENV` and `STOCK_SIGNALS_LOG_FORMAT`.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(env) = lookup("STOCK_SIGNALS_ENV") {
            settings.environment = env;
        }

        if let Some(format) = lookup("STOCK_SIGNALS_LOG_FORMAT") {
            settings.log_format = format.parse().map_err(|reason| SettingsError::Invalid {
                name: "STOCK_SIGNALS_LOG_FORMAT".to_string(),
                reason,
            })?;
        }

        Ok(settings)
    }

    /// User agent string for outbound HTTP requests
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.app_name, env!("CARGO_PKG_VERSION"))
    }
}
