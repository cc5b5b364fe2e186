//! Configuration for signal aggregation runs

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_TTL;
use crate::error::{ConfigError, OracleError};
use crate::oracle::anthropic::DEFAULT_MODEL;
use crate::oracle::{AnthropicOracle, CommandOracle, CommandPreset, Oracle};
use crate::rate_limit::DEFAULT_MIN_INTERVAL;
use crate::scoring::{ScoringConfig, WeightPreset, normalize_weights};

/// Which oracle answers prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OracleBackend {
    /// Local assistant CLI
    Command(CommandPreset),
    /// Anthropic Messages API
    Anthropic,
}

impl Default for OracleBackend {
    fn default() -> Self {
        Self::Command(CommandPreset::Claude)
    }
}

impl fmt::Display for OracleBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(CommandPreset::Claude) => f.write_str("command:claude"),
            Self::Command(CommandPreset::Codex) => f.write_str("command:codex"),
            Self::Command(CommandPreset::Opencode) => f.write_str("command:opencode"),
            Self::Anthropic => f.write_str("anthropic"),
        }
    }
}

impl FromStr for OracleBackend {
    type Err = ConfigError;

    /// Accepts `anthropic`, `command:<preset>` or a bare preset name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if name == "anthropic" {
            return Ok(Self::Anthropic);
        }
        let preset = name.strip_prefix("command:").unwrap_or(&name);
        CommandPreset::parse(preset)
            .map(Self::Command)
            .ok_or_else(|| ConfigError::invalid("oracle", format!("unknown backend '{s}'")))
    }
}

impl TryFrom<String> for OracleBackend {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OracleBackend> for String {
    fn from(backend: OracleBackend) -> Self {
        backend.to_string()
    }
}

/// Configuration for the engine and its collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// SQLite database file
    pub db_path: PathBuf,

    pub oracle: OracleBackend,

    /// Custom command template; overrides the preset when set
    pub oracle_command: Option<String>,

    /// Per-prompt oracle timeout
    pub oracle_timeout: Duration,

    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub anthropic_requests_per_minute: u32,

    /// Financial Modeling Prep API key (fundamentals, analyst and US insider data)
    pub fmp_api_key: Option<String>,

    /// Finnhub API key (news)
    pub finnhub_api_key: Option<String>,

    pub http_timeout: Duration,
    pub user_agent: String,

    /// Default lifetime of a cached fetch
    pub cache_ttl: Duration,

    /// Per-source cache lifetimes, keyed by source name
    pub cache_ttl_overrides: HashMap<String, Duration>,

    /// Minimum spacing between requests to one domain
    pub rate_limit_interval: Duration,

    pub scoring: ScoringConfig,

    /// Reuse stored results for categories whose input did not change
    pub reuse_unchanged_analyses: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("stock-signals.db"),
            oracle: OracleBackend::default(),
            oracle_command: None,
            oracle_timeout: Duration::from_secs(300),
            anthropic_api_key: None,
            anthropic_model: DEFAULT_MODEL.to_string(),
            anthropic_requests_per_minute: 50,
            fmp_api_key: None,
            finnhub_api_key: None,
            http_timeout: Duration::from_secs(30),
            user_agent: format!("stock-signals/{}", env!("CARGO_PKG_VERSION")),
            cache_ttl: DEFAULT_TTL,
            cache_ttl_overrides: HashMap::new(),
            rate_limit_interval: DEFAULT_MIN_INTERVAL,
            scoring: ScoringConfig::default(),
            reuse_unchanged_analyses: true,
        }
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::invalid(name, e.to_string()))
}

impl SignalConfig {
    /// Create a new configuration builder
    pub fn builder() -> SignalConfigBuilder {
        SignalConfigBuilder::default()
    }

    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with variables from `lookup`; empty values are ignored
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = var("STOCK_SIGNALS_DB") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(backend) = var("STOCK_SIGNALS_ORACLE") {
            config.oracle = backend.parse()?;
        }
        config.oracle_command = var("STOCK_SIGNALS_ORACLE_CMD");
        if let Some(secs) = var("STOCK_SIGNALS_ORACLE_TIMEOUT_SECS") {
            config.oracle_timeout = parse_secs("STOCK_SIGNALS_ORACLE_TIMEOUT_SECS", &secs)?;
        }
        config.anthropic_api_key = var("ANTHROPIC_API_KEY");
        if let Some(model) = var("ANTHROPIC_MODEL") {
            config.anthropic_model = model;
        }
        config.fmp_api_key = var("FMP_API_KEY");
        config.finnhub_api_key = var("FINNHUB_API_KEY");
        if let Some(preset) = var("STOCK_SIGNALS_WEIGHTS") {
            let preset: WeightPreset = preset.parse()?;
            config.scoring.weights = preset.weights();
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oracle == OracleBackend::Anthropic && self.anthropic_api_key.is_none() {
            return Err(ConfigError::Missing(
                "ANTHROPIC_API_KEY (required by the anthropic oracle)".to_string(),
            ));
        }
        if self.oracle_timeout.is_zero() {
            return Err(ConfigError::invalid("oracle_timeout", "must be greater than 0"));
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::invalid("http_timeout", "must be greater than 0"));
        }
        if self.anthropic_requests_per_minute == 0 {
            return Err(ConfigError::invalid("anthropic_requests_per_minute", "must be greater than 0"));
        }
        if let Some(command) = &self.oracle_command {
            if command.trim().is_empty() {
                return Err(ConfigError::invalid("oracle_command", "cannot be empty"));
            }
        }

        self.scoring.validate()
    }

    /// Build the configured oracle
    pub fn build_oracle(&self) -> Result<Arc<dyn Oracle>, OracleError> {
        let oracle: Arc<dyn Oracle> = match (&self.oracle, &self.oracle_command) {
            (OracleBackend::Anthropic, _) => {
                let key = self
                    .anthropic_api_key
                    .clone()
                    .ok_or_else(|| OracleError::Unavailable("ANTHROPIC_API_KEY is not set".to_string()))?;
                Arc::new(AnthropicOracle::new(
                    key,
                    self.anthropic_model.clone(),
                    self.oracle_timeout,
                    self.anthropic_requests_per_minute,
                )?)
            }
            (OracleBackend::Command(_), Some(template)) => {
                Arc::new(CommandOracle::from_template(template, self.oracle_timeout)?)
            }
            (OracleBackend::Command(preset), None) => Arc::new(CommandOracle::preset(*preset, self.oracle_timeout)),
        };
        Ok(oracle)
    }
}

/// Builder for SignalConfig
#[derive(Debug, Default)]
pub struct SignalConfigBuilder {
    db_path: Option<PathBuf>,
    oracle: Option<OracleBackend>,
    oracle_command: Option<String>,
    oracle_timeout: Option<Duration>,
    anthropic_api_key: Option<String>,
    anthropic_model: Option<String>,
    fmp_api_key: Option<String>,
    finnhub_api_key: Option<String>,
    http_timeout: Option<Duration>,
    cache_ttl: Option<Duration>,
    cache_ttl_overrides: HashMap<String, Duration>,
    rate_limit_interval: Option<Duration>,
    weights: Option<WeightPreset>,
    thresholds: Option<(f64, f64)>,
    reuse_unchanged_analyses: Option<bool>,
}

impl SignalConfigBuilder {
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    pub fn oracle(mut self, backend: OracleBackend) -> Self {
        self.oracle = Some(backend);
        self
    }

    /// Custom command template, `{prompt}` marking the prompt argument
    pub fn oracle_command(mut self, template: impl Into<String>) -> Self {
        self.oracle_command = Some(template.into());
        self
    }

    pub fn oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = Some(timeout);
        self
    }

    pub fn anthropic_api_key(mut self, key: impl Into<String>) -> Self {
        self.anthropic_api_key = Some(key.into());
        self
    }

    pub fn anthropic_model(mut self, model: impl Into<String>) -> Self {
        self.anthropic_model = Some(model.into());
        self
    }

    pub fn fmp_api_key(mut self, key: impl Into<String>) -> Self {
        self.fmp_api_key = Some(key.into());
        self
    }

    pub fn finnhub_api_key(mut self, key: impl Into<String>) -> Self {
        self.finnhub_api_key = Some(key.into());
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Cache lifetime for one source, e.g. `finnhub`
    pub fn cache_ttl_for(mut self, source: impl Into<String>, ttl: Duration) -> Self {
        self.cache_ttl_overrides.insert(source.into(), ttl);
        self
    }

    pub fn rate_limit_interval(mut self, interval: Duration) -> Self {
        self.rate_limit_interval = Some(interval);
        self
    }

    pub fn weights(mut self, preset: WeightPreset) -> Self {
        self.weights = Some(preset);
        self
    }

    pub fn thresholds(mut self, buy: f64, sell: f64) -> Self {
        self.thresholds = Some((buy, sell));
        self
    }

    pub fn reuse_unchanged_analyses(mut self, reuse: bool) -> Self {
        self.reuse_unchanged_analyses = Some(reuse);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SignalConfig, ConfigError> {
        let defaults = SignalConfig::default();

        let mut scoring = self.weights.map_or(defaults.scoring.clone(), ScoringConfig::from_preset);
        scoring.weights = normalize_weights(&scoring.weights);
        if let Some((buy, sell)) = self.thresholds {
            scoring.buy_threshold = buy;
            scoring.sell_threshold = sell;
        }

        let config = SignalConfig {
            db_path: self.db_path.unwrap_or(defaults.db_path),
            oracle: self.oracle.unwrap_or(defaults.oracle),
            oracle_command: self.oracle_command,
            oracle_timeout: self.oracle_timeout.unwrap_or(defaults.oracle_timeout),
            anthropic_api_key: self.anthropic_api_key,
            anthropic_model: self.anthropic_model.unwrap_or(defaults.anthropic_model),
            anthropic_requests_per_minute: defaults.anthropic_requests_per_minute,
            fmp_api_key: self.fmp_api_key,
            finnhub_api_key: self.finnhub_api_key,
            http_timeout: self.http_timeout.unwrap_or(defaults.http_timeout),
            user_agent: defaults.user_agent,
            cache_ttl: self.cache_ttl.unwrap_or(defaults.cache_ttl),
            cache_ttl_overrides: self.cache_ttl_overrides,
            rate_limit_interval: self.rate_limit_interval.unwrap_or(defaults.rate_limit_interval),
            scoring,
            reuse_unchanged_analyses: self.reuse_unchanged_analyses.unwrap_or(defaults.reuse_unchanged_analyses),
        };

        config.validate()?;
        Ok(config)
    }
}
