//! Shared utilities for stock-signals
//!
//! Logging setup and environment-driven application settings used by the
//! library and the `stock-signals` binary.

pub mod config;
pub mod logging;

pub use config::{AppSettings, SettingsError};
pub use logging::{LogFormat, init_tracing};
