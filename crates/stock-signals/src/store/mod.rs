//! Persistence of tickers, signal results and syntheses
//!
//! Signal and synthesis rows are append-only. Every run adds seven signal
//! rows and one synthesis row; nothing is ever updated in place except the
//! ticker record itself.

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::Duration;

use crate::error::StoreError;
use crate::model::{Category, DashboardRow, Market, NewTicker, SignalResult, Synthesis, Ticker};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Editable ticker fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickerUpdate {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub market: Option<Market>,
}

impl TickerUpdate {
    /// Apply to a ticker; a market change drops the stored resolution
    pub fn apply(&self, ticker: &mut Ticker) {
        if let Some(name) = &self.name {
            ticker.name.clone_from(name);
        }
        if let Some(sector) = &self.sector {
            ticker.sector = Some(sector.clone());
        }
        if let Some(market) = &self.market {
            if *market != ticker.market {
                ticker.market = market.clone();
                ticker.resolved_symbol = None;
            }
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a ticker unless the symbol is already tracked
    ///
    /// Returns whether a row was inserted.
    async fn add_ticker(&self, ticker: &NewTicker) -> Result<bool, StoreError>;

    /// Remove a ticker together with its signals and syntheses
    async fn remove_ticker(&self, symbol: &str) -> Result<bool, StoreError>;

    /// Tracked tickers ordered by symbol
    async fn list_tickers(&self) -> Result<Vec<Ticker>, StoreError>;

    async fn get_ticker(&self, symbol: &str) -> Result<Option<Ticker>, StoreError>;

    async fn update_ticker(&self, symbol: &str, update: &TickerUpdate) -> Result<Option<Ticker>, StoreError>;

    /// Record the canonical trading symbol found for a ticker
    async fn set_resolution(&self, symbol: &str, resolved_symbol: &str) -> Result<(), StoreError>;

    async fn save_signal(&self, signal: &SignalResult) -> Result<(), StoreError>;

    /// Signal rows for a ticker, newest first
    async fn signal_history(&self, symbol: &str, limit: usize) -> Result<Vec<SignalResult>, StoreError>;

    /// The newest row of each category, in analysis order
    async fn latest_signals(&self, symbol: &str) -> Result<Vec<SignalResult>, StoreError>;

    /// Newest oracle-produced row for the same category and input
    async fn find_signal(
        &self,
        symbol: &str,
        category: Category,
        input_hash: &str,
    ) -> Result<Option<SignalResult>, StoreError>;

    async fn save_synthesis(&self, synthesis: &Synthesis) -> Result<(), StoreError>;

    async fn latest_synthesis(&self, symbol: &str) -> Result<Option<Synthesis>, StoreError>;

    /// Synthesis rows for a ticker, newest first
    async fn synthesis_history(&self, symbol: &str, limit: usize) -> Result<Vec<Synthesis>, StoreError>;

    /// Every ticker with its latest synthesis, best score first and unscored last
    async fn dashboard(&self) -> Result<Vec<DashboardRow>, StoreError>;

    /// Whether any ticker lacks a synthesis younger than `max_age`
    async fn is_stale(&self, max_age: Duration) -> Result<bool, StoreError>;
}

/// Dashboard order: score descending, unscored last, then symbol
pub(crate) fn sort_dashboard(rows: &mut [DashboardRow]) {
    rows.sort_by(|a, b| {
        let a_score = a.latest.as_ref().map(|s| s.overall_score);
        let b_score = b.latest.as_ref().map(|s| s.overall_score);
        match (a_score, b_score) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.ticker.symbol.cmp(&b.ticker.symbol))
    });
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::Recommendation;

    fn ticker(symbol: &str, market: Market) -> Ticker {
        Ticker {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            sector: None,
            market,
            resolved_symbol: Some(format!("{symbol}.L")),
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_market_change_clears_resolution() {
        let mut t = ticker("HSBC", Market::Uk);
        TickerUpdate {
            sector: Some("Financial Services".to_string()),
            ..TickerUpdate::default()
        }
        .apply(&mut t);
        assert_eq!(t.resolved_symbol.as_deref(), Some("HSBC.L"));

        TickerUpdate {
            market: Some(Market::Us),
            ..TickerUpdate::default()
        }
        .apply(&mut t);
        assert_eq!(t.market, Market::Us);
        assert!(t.resolved_symbol.is_none());
    }

    #[test]
    fn test_dashboard_order() {
        let row = |symbol: &str, score: Option<f64>| DashboardRow {
            ticker: ticker(symbol, Market::Us),
            latest: score.map(|overall_score| Synthesis {
                symbol: symbol.to_string(),
                overall_score,
                recommendation: Recommendation::Hold,
                narrative: String::new(),
                signal_scores: Default::default(),
                created_at: Utc::now(),
            }),
        };
        let mut rows = vec![row("AAA", None), row("BBB", Some(-2.0)), row("CCC", Some(4.5)), row("ABC", None)];
        sort_dashboard(&mut rows);
        let order: Vec<&str> = rows.iter().map(|r| r.ticker.symbol.as_str()).collect();
        assert_eq!(order, vec!["CCC", "BBB", "AAA", "ABC"]);
    }
}
