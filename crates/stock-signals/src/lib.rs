//! Multi-source signal aggregation for tracked securities
//!
//! For one ticker the engine fetches market, analyst, insider, news and
//! sector data, asks an analysis oracle to score seven categories, and
//! combines the scores into a buy/hold/sell recommendation.
//!
//! - Fetches go through [`Fetcher`], which consults a [`FetchCache`] before
//!   taking a per-domain [`Throttle`] permit
//! - [`MarketRouter`] picks market-specific insider and sector sources; an
//!   unknown market fails the run instead of falling back to US sources
//! - Oracle replies are clamped and normalized by [`validation`] before they
//!   are persisted; an unreachable oracle yields a neutral result
//! - Results are appended to a [`Store`] (SQLite or in-memory)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stock_signals::{AnalysisEngine, ProgressEmitter, SignalConfig, SqliteStore};
//!
//! let config = SignalConfig::from_env()?;
//! let store = Arc::new(SqliteStore::open(&config.db_path)?);
//! let engine = AnalysisEngine::builder()
//!     .store(store)
//!     .sources(sources)
//!     .oracle(config.build_oracle()?)
//!     .build()?;
//!
//! let report = engine.run("AAPL", &ProgressEmitter::none()).await?;
//! println!("{} {}", report.synthesis.overall_score, report.synthesis.recommendation);
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod oracle;
pub mod prompts;
pub mod rate_limit;
pub mod resolver;
pub mod router;
pub mod scoring;
pub mod sources;
pub mod store;
pub mod validation;

pub use cache::{FetchCache, MemoryFetchCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{OracleBackend, SignalConfig};
pub use engine::{AnalysisEngine, Progress, ProgressEmitter, ProgressStream, RunReport, RunState};
pub use error::{ConfigError, EngineError, FetchError, OracleError, Result, RoutingError, StoreError};
pub use fetcher::Fetcher;
pub use model::{Category, Confidence, DashboardRow, Market, NewTicker, Recommendation, SignalResult, Synthesis, Ticker};
pub use oracle::{Oracle, OracleReply};
pub use rate_limit::{DomainRateLimiter, Throttle};
pub use resolver::{DirectoryResolver, Resolution, StaticResolver, SymbolResolver};
pub use router::{MarketRoute, MarketRouter};
pub use scoring::{ScoringConfig, WeightPreset, score_to_recommendation, weighted_score};
pub use sources::{DataSource, SourceRequest, SourceRole, SourceSet};
pub use store::{MemoryStore, SqliteStore, Store, TickerUpdate};
