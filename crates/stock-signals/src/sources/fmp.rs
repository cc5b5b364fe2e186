//! Financial Modeling Prep: analyst consensus, insider trades, company profile

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{Value, json};
use tracing::warn;

use super::{DataSource, SourceRequest};
use crate::error::FetchError;
use crate::fetcher::Fetcher;

const FMP_BASE_URL: &str = "https://financialmodelingprep.com";

/// Thin FMP client that routes every call through the fetch gateway
///
/// The API key is part of the request URL but never of the cache key.
#[derive(Clone)]
pub struct FmpClient {
    fetcher: Fetcher,
    api_key: String,
    base_url: String,
}

impl FmpClient {
    pub fn new(fetcher: Fetcher, api_key: impl Into<String>) -> Self {
        Self {
            fetcher,
            api_key: api_key.into(),
            base_url: FMP_BASE_URL.to_string(),
        }
    }

    /// Client only when a non-empty key is configured
    pub fn from_key(fetcher: Fetcher, api_key: Option<String>) -> Option<Self> {
        api_key.filter(|k| !k.trim().is_empty()).map(|k| Self::new(fetcher, k))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, FetchError> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| FetchError::InvalidUrl(format!("{path}: {e}")))?;
        url.query_pairs_mut().extend_pairs(query.iter().copied());

        let key = format!("fmp:{url}");
        url.query_pairs_mut().append_pair("apikey", &self.api_key);

        let value: Value = self.fetcher.get_json(&key, url.as_str(), self.fetcher.ttl_for("fmp")).await?;
        if let Some(message) = value.get("Error Message").and_then(Value::as_str) {
            return Err(FetchError::Malformed(format!("FMP: {message}")));
        }
        Ok(value)
    }

    pub async fn profile(&self, symbol: &str) -> Result<Value, FetchError> {
        self.get(&format!("/api/v3/profile/{symbol}"), &[]).await
    }

    pub async fn ratios_ttm(&self, symbol: &str) -> Result<Value, FetchError> {
        self.get(&format!("/api/v3/ratios-ttm/{symbol}"), &[]).await
    }

    pub async fn price_target_consensus(&self, symbol: &str) -> Result<Value, FetchError> {
        self.get("/api/v4/price-target-consensus", &[("symbol", symbol)]).await
    }

    pub async fn grades(&self, symbol: &str, limit: usize) -> Result<Value, FetchError> {
        let limit = limit.to_string();
        self.get(&format!("/api/v3/grade/{symbol}"), &[("limit", &limit)]).await
    }

    pub async fn insider_trading(&self, symbol: &str) -> Result<Value, FetchError> {
        self.get("/api/v4/insider-trading", &[("symbol", symbol), ("page", "0")]).await
    }
}

/// FMP listings drop the London suffix
pub(crate) fn bare_symbol(symbol: &str) -> &str {
    symbol.strip_suffix(".L").unwrap_or(symbol)
}

fn require(client: Option<&FmpClient>) -> Result<&FmpClient, FetchError> {
    client.ok_or_else(|| FetchError::NotConfigured("FMP API key".to_string()))
}

/// Analyst price targets and recent rating changes
pub struct FmpAnalystData {
    client: Option<FmpClient>,
}

impl FmpAnalystData {
    pub fn new(client: Option<FmpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for FmpAnalystData {
    fn name(&self) -> &str {
        "fmp-analyst"
    }

    async fn fetch(&self, request: &SourceRequest<'_>) -> Result<Value, FetchError> {
        let client = require(self.client.as_ref())?;
        let symbol = request.symbol;

        let consensus = client.price_target_consensus(symbol).await?;
        let grades = client.grades(symbol, 10).await.unwrap_or_else(|e| {
            warn!(symbol, error = %e, "FMP grades unavailable");
            Value::Array(Vec::new())
        });

        let consensus = match consensus {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            Value::Array(_) => {
                return Err(FetchError::NoData {
                    symbol: symbol.to_string(),
                    reason: "no analyst coverage".to_string(),
                });
            }
            other => other,
        };

        Ok(json!({
            "price_target_consensus": consensus,
            "recent_grades": grades,
        }))
    }
}

/// Map FMP transaction codes to readable labels
pub fn transaction_label(code: &str) -> &str {
    match code {
        "P-Purchase" => "Purchase",
        "S-Sale" => "Sale",
        "A-Award" => "Award",
        "M-Exempt" => "Exercise",
        other => other,
    }
}

fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Normalize one FMP insider-trading record
pub fn insider_trade(item: &Value, fallback_symbol: &str) -> Value {
    let price = as_number(item.get("price"));
    let qty = as_number(item.get("securitiesTransacted"));
    let value = match (price, qty) {
        (Some(p), Some(q)) if p != 0.0 && q != 0.0 => json!((p * q).round()),
        _ => Value::Null,
    };
    let ticker = item
        .get("symbol")
        .and_then(Value::as_str)
        .unwrap_or(fallback_symbol);

    json!({
        "filing_date": as_text(item.get("filingDate")),
        "trade_date": as_text(item.get("transactionDate")),
        "ticker": ticker,
        "insider_name": as_text(item.get("reportingName")),
        "title": as_text(item.get("typeOfOwner")),
        "trade_type": transaction_label(item.get("transactionType").and_then(Value::as_str).unwrap_or_default()),
        "price": price,
        "qty": qty,
        "owned": as_number(item.get("securitiesOwned")),
        "value": value,
    })
}

/// SEC Form 4 insider trades via FMP
pub struct FmpInsiderTrades {
    client: Option<FmpClient>,
}

impl FmpInsiderTrades {
    pub fn new(client: Option<FmpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for FmpInsiderTrades {
    fn name(&self) -> &str {
        "fmp-insider"
    }

    async fn fetch(&self, request: &SourceRequest<'_>) -> Result<Value, FetchError> {
        let client = require(self.client.as_ref())?;
        let bare = bare_symbol(request.symbol);
        let data = client.insider_trading(bare).await?;

        let trades: Vec<Value> = data
            .as_array()
            .map(|items| items.iter().map(|item| insider_trade(item, bare)).collect())
            .unwrap_or_default();

        Ok(json!({ "insider_trades": trades }))
    }
}
