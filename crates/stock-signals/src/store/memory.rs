use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::RwLock;

use super::{Store, TickerUpdate, sort_dashboard};
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::model::{Category, DashboardRow, NewTicker, SignalResult, Synthesis, Ticker, normalize_symbol};

#[derive(Default)]
struct Tables {
    tickers: BTreeMap<String, Ticker>,
    signals: Vec<SignalResult>,
    syntheses: Vec<Synthesis>,
}

/// Volatile [`Store`] kept in process memory
pub struct MemoryStore {
    tables: RwLock<Tables>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            clock,
        }
    }

    /// Total signal rows across all tickers
    pub async fn signal_count(&self) -> usize {
        self.tables.read().await.signals.len()
    }

    pub async fn synthesis_count(&self) -> usize {
        self.tables.read().await.syntheses.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Rows for `symbol`, newest first; ties keep the later insert first
fn newest_first<'a, T: 'a>(
    rows: &'a [T],
    matches: impl Fn(&T) -> bool,
    created_at: impl Fn(&T) -> chrono::DateTime<chrono::Utc>,
) -> Vec<&'a T> {
    let mut found: Vec<&T> = rows.iter().rev().filter(|r| matches(*r)).collect();
    found.sort_by_key(|r| std::cmp::Reverse(created_at(r)));
    found
}

#[async_trait]
impl Store for MemoryStore {
    async fn add_ticker(&self, ticker: &NewTicker) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let symbol = normalize_symbol(&ticker.symbol);
        if tables.tickers.contains_key(&symbol) {
            return Ok(false);
        }
        tables.tickers.insert(
            symbol.clone(),
            Ticker {
                symbol,
                name: ticker.name.clone(),
                sector: ticker.sector.clone(),
                market: ticker.market.clone(),
                resolved_symbol: None,
                added_at: self.clock.now(),
            },
        );
        Ok(true)
    }

    async fn remove_ticker(&self, symbol: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let symbol = normalize_symbol(symbol);
        let removed = tables.tickers.remove(&symbol).is_some();
        tables.signals.retain(|s| s.symbol != symbol);
        tables.syntheses.retain(|s| s.symbol != symbol);
        Ok(removed)
    }

    async fn list_tickers(&self) -> Result<Vec<Ticker>, StoreError> {
        Ok(self.tables.read().await.tickers.values().cloned().collect())
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Option<Ticker>, StoreError> {
        Ok(self.tables.read().await.tickers.get(&normalize_symbol(symbol)).cloned())
    }

    async fn update_ticker(&self, symbol: &str, update: &TickerUpdate) -> Result<Option<Ticker>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.tickers.get_mut(&normalize_symbol(symbol)).map(|ticker| {
            update.apply(ticker);
            ticker.clone()
        }))
    }

    async fn set_resolution(&self, symbol: &str, resolved_symbol: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(ticker) = tables.tickers.get_mut(&normalize_symbol(symbol)) {
            ticker.resolved_symbol = Some(resolved_symbol.to_string());
        }
        Ok(())
    }

    async fn save_signal(&self, signal: &SignalResult) -> Result<(), StoreError> {
        self.tables.write().await.signals.push(signal.clone());
        Ok(())
    }

    async fn signal_history(&self, symbol: &str, limit: usize) -> Result<Vec<SignalResult>, StoreError> {
        let symbol = normalize_symbol(symbol);
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.signals, |s| s.symbol == symbol, |s| s.created_at)
            .into_iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn latest_signals(&self, symbol: &str) -> Result<Vec<SignalResult>, StoreError> {
        let symbol = normalize_symbol(symbol);
        let tables = self.tables.read().await;
        let rows = newest_first(&tables.signals, |s| s.symbol == symbol, |s| s.created_at);
        Ok(Category::ALL
            .into_iter()
            .filter_map(|category| rows.iter().find(|s| s.category == category).map(|s| (*s).clone()))
            .collect())
    }

    async fn find_signal(
        &self,
        symbol: &str,
        category: Category,
        input_hash: &str,
    ) -> Result<Option<SignalResult>, StoreError> {
        let symbol = normalize_symbol(symbol);
        let tables = self.tables.read().await;
        Ok(newest_first(
            &tables.signals,
            |s| s.symbol == symbol && s.category == category && s.input_hash == input_hash && !s.fallback,
            |s| s.created_at,
        )
        .first()
        .map(|s| (*s).clone()))
    }

    async fn save_synthesis(&self, synthesis: &Synthesis) -> Result<(), StoreError> {
        self.tables.write().await.syntheses.push(synthesis.clone());
        Ok(())
    }

    async fn latest_synthesis(&self, symbol: &str) -> Result<Option<Synthesis>, StoreError> {
        Ok(self.synthesis_history(symbol, 1).await?.into_iter().next())
    }

    async fn synthesis_history(&self, symbol: &str, limit: usize) -> Result<Vec<Synthesis>, StoreError> {
        let symbol = normalize_symbol(symbol);
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.syntheses, |s| s.symbol == symbol, |s| s.created_at)
            .into_iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn dashboard(&self) -> Result<Vec<DashboardRow>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<DashboardRow> = tables
            .tickers
            .values()
            .map(|ticker| DashboardRow {
                ticker: ticker.clone(),
                latest: newest_first(&tables.syntheses, |s| s.symbol == ticker.symbol, |s| s.created_at)
                    .first()
                    .map(|s| (*s).clone()),
            })
            .collect();
        sort_dashboard(&mut rows);
        Ok(rows)
    }

    async fn is_stale(&self, max_age: Duration) -> Result<bool, StoreError> {
        let cutoff = self.clock.now() - max_age;
        let tables = self.tables.read().await;
        Ok(tables.tickers.keys().any(|symbol| {
            !tables
                .syntheses
                .iter()
                .any(|s| &s.symbol == symbol && s.created_at > cutoff)
        }))
    }
}
