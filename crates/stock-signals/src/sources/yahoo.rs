//! Yahoo Finance price history, fundamentals and technical indicators

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use ta::Next;
use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage, MovingAverageConvergenceDivergence,
    RelativeStrengthIndex, SimpleMovingAverage,
};
use time::OffsetDateTime;
use tracing::warn;
use yahoo_finance_api as yahoo;

use super::fmp::FmpClient;
use super::{DataSource, SourceRequest, pct_change, round2};
use crate::error::FetchError;
use crate::fetcher::Fetcher;

const YAHOO_DOMAIN: &str = "query1.finance.yahoo.com";

/// Trading days in a year, used for the 52-week range
const YEAR_BARS: usize = 252;

/// One daily OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Daily history for `symbol` over the last `days` calendar days
///
/// Bars are cached as JSON so repeated runs and the sector adapter share one
/// download per symbol.
pub async fn fetch_history(fetcher: &Fetcher, symbol: &str, days: i64) -> Result<Vec<Bar>, FetchError> {
    let key = format!("yahoo:history:{symbol}:{days}");
    let owned = symbol.to_string();
    let body = fetcher
        .cached(&key, YAHOO_DOMAIN, fetcher.ttl_for("yahoo"), || async move {
            let bars = download_history(&owned, days).await?;
            Ok(serde_json::to_string(&bars)?)
        })
        .await?;
    Ok(serde_json::from_str(&body)?)
}

async fn download_history(symbol: &str, days: i64) -> Result<Vec<Bar>, FetchError> {
    let provider = yahoo::YahooConnector::new().map_err(|e| FetchError::Yahoo(e.to_string()))?;

    let end = OffsetDateTime::now_utc();
    let start = end - time::Duration::days(days);

    let response = provider
        .get_quote_history(symbol, start, end)
        .await
        .map_err(|e| FetchError::Yahoo(e.to_string()))?;
    let quotes = response.quotes().map_err(|e| FetchError::Yahoo(e.to_string()))?;

    let bars: Vec<Bar> = quotes
        .iter()
        .map(|q| Bar {
            timestamp: q.timestamp as i64,
            open: q.open,
            high: q.high,
            low: q.low,
            close: q.close,
            volume: q.volume,
        })
        .collect();

    if bars.is_empty() {
        return Err(FetchError::NoData {
            symbol: symbol.to_string(),
            reason: "empty price history".to_string(),
        });
    }
    Ok(bars)
}

/// Market data adapter: fundamentals plus technicals in one payload
pub struct YahooMarketData {
    fetcher: Fetcher,
    fmp: Option<FmpClient>,
    history_days: i64,
}

impl YahooMarketData {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            fmp: None,
            history_days: 400,
        }
    }

    /// Enrich fundamentals with FMP profile and TTM ratios
    pub fn with_fmp(mut self, fmp: Option<FmpClient>) -> Self {
        self.fmp = fmp;
        self
    }

    async fn fmp_fundamentals(&self, symbol: &str) -> Value {
        let Some(fmp) = &self.fmp else {
            return Value::Null;
        };
        let profile = fmp.profile(symbol).await.unwrap_or_else(|e| {
            warn!(symbol, error = %e, "FMP profile unavailable");
            Value::Null
        });
        let ratios = fmp.ratios_ttm(symbol).await.unwrap_or_else(|e| {
            warn!(symbol, error = %e, "FMP ratios unavailable");
            Value::Null
        });
        json!({ "profile": first_element(profile), "ratios_ttm": first_element(ratios) })
    }
}

/// FMP wraps single records in one-element arrays
fn first_element(value: Value) -> Value {
    match value {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    }
}

#[async_trait]
impl DataSource for YahooMarketData {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch(&self, request: &SourceRequest<'_>) -> Result<Value, FetchError> {
        let bars = fetch_history(&self.fetcher, request.symbol, self.history_days).await?;
        let technicals = technical_summary(&bars);

        let mut fundamentals = json!({
            "symbol": request.symbol,
            "currency": request.currency,
            "price": technicals["price"],
            "week52_high": technicals["week52_high"],
            "week52_low": technicals["week52_low"],
        });
        let enriched = self.fmp_fundamentals(request.symbol).await;
        if let (Some(target), Value::Object(extra)) = (fundamentals.as_object_mut(), enriched) {
            target.extend(extra);
        }

        Ok(json!({
            "fundamentals": fundamentals,
            "technicals": technicals,
        }))
    }
}

fn last_of<I>(mut indicator: I, closes: &[f64]) -> Option<f64>
where
    I: Next<f64, Output = f64>,
{
    closes.iter().map(|&close| indicator.next(close)).last().map(round2)
}

fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period {
        return None;
    }
    last_of(SimpleMovingAverage::new(period).ok()?, closes)
}

fn ema(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period {
        return None;
    }
    last_of(ExponentialMovingAverage::new(period).ok()?, closes)
}

fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() <= period {
        return None;
    }
    last_of(RelativeStrengthIndex::new(period).ok()?, closes)
}

fn macd(closes: &[f64]) -> Value {
    if closes.len() < 35 {
        return Value::Null;
    }
    let Ok(mut indicator) = MovingAverageConvergenceDivergence::new(12, 26, 9) else {
        return Value::Null;
    };
    match closes.iter().map(|&close| indicator.next(close)).last() {
        Some(out) => json!({
            "macd": round2(out.macd),
            "signal": round2(out.signal),
            "histogram": round2(out.histogram),
        }),
        None => Value::Null,
    }
}

fn bollinger(closes: &[f64]) -> Value {
    if closes.len() < 20 {
        return Value::Null;
    }
    let Ok(mut bands) = BollingerBands::new(20, 2.0) else {
        return Value::Null;
    };
    match closes.iter().map(|&close| bands.next(close)).last() {
        Some(out) => json!({
            "upper": round2(out.upper),
            "middle": round2(out.average),
            "lower": round2(out.lower),
        }),
        None => Value::Null,
    }
}

fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() <= period {
        return None;
    }
    let mut indicator = AverageTrueRange::new(period).ok()?;
    let mut last = None;
    for bar in bars {
        let item = ta::DataItem::builder()
            .open(bar.open)
            .high(bar.high)
            .low(bar.low)
            .close(bar.close)
            .volume(bar.volume as f64)
            .build()
            .ok()?;
        last = Some(indicator.next(&item));
    }
    last.map(round2)
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn volume_trend(bars: &[Bar]) -> &'static str {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
    let recent = average(&volumes[volumes.len().saturating_sub(20)..]);
    let baseline = average(&volumes[volumes.len().saturating_sub(60)..]);
    match (recent, baseline) {
        (Some(recent), Some(baseline)) if baseline > 0.0 => {
            let ratio = recent / baseline;
            if ratio > 1.2 {
                "rising"
            } else if ratio < 0.8 {
                "falling"
            } else {
                "flat"
            }
        }
        _ => "unknown",
    }
}

/// Price statistics and indicators for the latest bar
pub fn technical_summary(bars: &[Bar]) -> Value {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let Some(&price) = closes.last() else {
        return json!({});
    };

    let change_over = |n: usize| {
        closes
            .len()
            .checked_sub(n + 1)
            .and_then(|i| pct_change(closes[i], price))
    };

    let year = &bars[bars.len().saturating_sub(YEAR_BARS)..];
    let high = year.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = year.iter().map(|b| b.low).fold(f64::MAX, f64::min);

    let sma_200 = sma(&closes, 200);
    json!({
        "price": round2(price),
        "change_1d_pct": change_over(1),
        "change_1w_pct": change_over(5),
        "change_1m_pct": change_over(21),
        "change_3m_pct": change_over(63),
        "sma_20": sma(&closes, 20),
        "sma_50": sma(&closes, 50),
        "sma_200": sma_200,
        "above_sma_200": sma_200.map(|s| price > s),
        "ema_12": ema(&closes, 12),
        "ema_26": ema(&closes, 26),
        "macd": macd(&closes),
        "rsi_14": rsi(&closes, 14),
        "atr_14": atr(bars, 14),
        "bollinger_20_2": bollinger(&closes),
        "week52_high": round2(high),
        "week52_low": round2(low),
        "pct_from_52w_high": pct_change(high, price),
        "volume_trend": volume_trend(bars),
        "bars": bars.len(),
    })
}
