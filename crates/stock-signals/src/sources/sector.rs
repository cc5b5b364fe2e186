//! Sector context: sector ETF and benchmark performance versus the ticker

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::warn;

use super::yahoo::{Bar, fetch_history};
use super::{DataSource, SourceRequest, pct_change, round2};
use crate::error::FetchError;
use crate::fetcher::Fetcher;

/// Return windows in trading days
const WINDOWS: [(&str, usize); 3] = [("1w", 5), ("1m", 21), ("3m", 63)];

/// Percentage returns over each window, keyed by window name
pub fn window_returns(bars: &[Bar]) -> Map<String, Value> {
    let mut returns = Map::new();
    let Some(last) = bars.last() else {
        return returns;
    };
    for (name, days) in WINDOWS {
        let value = bars
            .len()
            .checked_sub(days + 1)
            .and_then(|i| pct_change(bars[i].close, last.close));
        returns.insert(name.to_string(), json!(value));
    }
    returns
}

/// Ticker return minus comparison return, per window
pub fn relative_strength(ticker: &Map<String, Value>, basis: &Map<String, Value>) -> Map<String, Value> {
    WINDOWS
        .iter()
        .map(|(name, _)| {
            let diff = match (ticker.get(*name).and_then(Value::as_f64), basis.get(*name).and_then(Value::as_f64)) {
                (Some(t), Some(b)) => json!(round2(t - b)),
                _ => Value::Null,
            };
            ((*name).to_string(), diff)
        })
        .collect()
}

/// Sector ETF and benchmark comparison for one ticker
pub struct SectorEtfSource {
    fetcher: Fetcher,
    history_days: i64,
}

impl SectorEtfSource {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            history_days: 120,
        }
    }

    async fn returns_for(&self, symbol: &str) -> Option<Map<String, Value>> {
        match fetch_history(&self.fetcher, symbol, self.history_days).await {
            Ok(bars) => Some(window_returns(&bars)),
            Err(e) => {
                warn!(symbol, error = %e, "Comparison history unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl DataSource for SectorEtfSource {
    fn name(&self) -> &str {
        "sector-etf"
    }

    async fn fetch(&self, request: &SourceRequest<'_>) -> Result<Value, FetchError> {
        let ticker = window_returns(&fetch_history(&self.fetcher, request.symbol, self.history_days).await?);
        let sector = self.returns_for(request.sector_etf).await;
        let benchmark = if request.benchmark == request.sector_etf {
            sector.clone()
        } else {
            self.returns_for(request.benchmark).await
        };

        if sector.is_none() && benchmark.is_none() {
            return Err(FetchError::NoData {
                symbol: request.symbol.to_string(),
                reason: format!("no history for {} or {}", request.sector_etf, request.benchmark),
            });
        }

        Ok(json!({
            "sector": request.sector,
            "sector_etf": request.sector_etf,
            "benchmark": request.benchmark,
            "returns": {
                "ticker": ticker,
                "sector_etf": sector,
                "benchmark": benchmark,
            },
            "relative_strength": {
                "vs_sector": sector.as_ref().map(|s| relative_strength(&ticker, s)),
                "vs_benchmark": benchmark.as_ref().map(|b| relative_strength(&ticker, b)),
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: i as i64,
                open: close,
                high: close,
                low: close,
                close,
                volume: 0,
            })
            .collect()
    }

    #[test]
    fn test_window_returns() {
        let mut closes = vec![100.0; 70];
        closes.push(110.0);
        let returns = window_returns(&bars(&closes));
        assert_eq!(returns["1w"], 10.0);
        assert_eq!(returns["3m"], 10.0);
    }

    #[test]
    fn test_short_history_gives_nulls() {
        let returns = window_returns(&bars(&[100.0, 101.0, 102.0]));
        assert!(returns["1w"].is_null());
        assert!(window_returns(&[]).is_empty());
    }

    #[test]
    fn test_relative_strength() {
        let ticker: Map<String, Value> = serde_json::from_value(json!({"1w": 5.0, "1m": 8.0, "3m": null})).unwrap();
        let etf: Map<String, Value> = serde_json::from_value(json!({"1w": 2.0, "1m": 10.0, "3m": 1.0})).unwrap();
        let rs = relative_strength(&ticker, &etf);
        assert_eq!(rs["1w"], 3.0);
        assert_eq!(rs["1m"], -2.0);
        assert!(rs["3m"].is_null());
    }
}
