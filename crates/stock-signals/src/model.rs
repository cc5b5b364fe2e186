//! Domain types shared by the engine, the store and the CLI

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trading venue group a ticker belongs to
///
/// Parsing never fails: unknown codes become [`Market::Other`] so that the
/// router, not the parser, decides whether a market can be served.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Market {
    #[default]
    Us,
    Uk,
    Other(String),
}

impl Market {
    pub fn code(&self) -> &str {
        match self {
            Self::Us => "US",
            Self::Uk => "UK",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.code())
    }
}

impl From<&str> for Market {
    fn from(s: &str) -> Self {
        let code = s.trim().to_ascii_uppercase();
        match code.as_str() {
            "US" => Self::Us,
            "UK" | "GB" => Self::Uk,
            _ => Self::Other(code),
        }
    }
}

impl From<String> for Market {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Market> for String {
    fn from(market: Market) -> Self {
        market.code().to_string()
    }
}

impl FromStr for Market {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

/// One of the seven signal dimensions, in analysis order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Fundamentals,
    AnalystConsensus,
    InsiderActivity,
    Technicals,
    Sentiment,
    SectorContext,
    RiskAssessment,
}

impl Category {
    /// All categories in the order the engine analyzes them
    pub const ALL: [Category; 7] = [
        Category::Fundamentals,
        Category::AnalystConsensus,
        Category::InsiderActivity,
        Category::Technicals,
        Category::Sentiment,
        Category::SectorContext,
        Category::RiskAssessment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fundamentals => "fundamentals",
            Self::AnalystConsensus => "analyst_consensus",
            Self::InsiderActivity => "insider_activity",
            Self::Technicals => "technicals",
            Self::Sentiment => "sentiment",
            Self::SectorContext => "sector_context",
            Self::RiskAssessment => "risk_assessment",
        }
    }

    /// Human readable label used in progress messages and prompts
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fundamentals => "fundamentals",
            Self::AnalystConsensus => "analyst consensus",
            Self::InsiderActivity => "insider activity",
            Self::Technicals => "technicals",
            Self::Sentiment => "sentiment",
            Self::SectorContext => "sector context",
            Self::RiskAssessment => "risk assessment",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// Oracle-reported confidence in a score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown confidence '{other}'")),
        }
    }
}

/// Final verdict of a synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Buy,
    Hold,
    Sell,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Hold => "hold",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "hold" => Ok(Self::Hold),
            "sell" => Ok(Self::Sell),
            other => Err(format!("unknown recommendation '{other}'")),
        }
    }
}

/// A tracked security
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    /// Uppercase user-facing symbol, unique
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub market: Market,
    /// Canonical exchange symbol used for data fetches, once resolved
    pub resolved_symbol: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl Ticker {
    /// Symbol used for data fetches: the resolved one when known
    pub fn trading_symbol(&self) -> &str {
        self.resolved_symbol.as_deref().unwrap_or(&self.symbol)
    }
}

/// Normalize a user-entered symbol
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

/// Ticker intake request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicker {
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub market: Market,
}

impl NewTicker {
    /// Create an intake request; the symbol is uppercased and the market defaults to US
    pub fn new(symbol: impl AsRef<str>, name: impl Into<String>) -> Self {
        Self {
            symbol: normalize_symbol(symbol.as_ref()),
            name: name.into(),
            sector: None,
            market: Market::Us,
        }
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn with_market(mut self, market: impl Into<Market>) -> Self {
        self.market = market.into();
        self
    }
}

/// One category's evaluation for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub symbol: String,
    pub category: Category,
    /// Always within [-10, 10]
    pub score: f64,
    pub confidence: Confidence,
    pub narrative: String,
    /// Payload sent to the oracle
    pub raw_data: serde_json::Value,
    /// SHA-256 of the canonical JSON of `raw_data`
    pub input_hash: String,
    /// Produced by the neutral fallback rather than the oracle
    pub fallback: bool,
    pub created_at: DateTime<Utc>,
}

/// Overall verdict for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub symbol: String,
    /// Always within [-10, 10]
    pub overall_score: f64,
    pub recommendation: Recommendation,
    pub narrative: String,
    pub signal_scores: BTreeMap<Category, f64>,
    pub created_at: DateTime<Utc>,
}

/// Ticker together with its latest synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardRow {
    pub ticker: Ticker,
    pub latest: Option<Synthesis>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_parsing() {
        assert_eq!(Market::from("us"), Market::Us);
        assert_eq!(Market::from(" UK "), Market::Uk);
        assert_eq!(Market::from("jp"), Market::Other("JP".to_string()));
        assert_eq!(Market::Other("JP".to_string()).to_string(), "JP");
    }

    #[test]
    fn test_market_serde_as_string() {
        let json = serde_json::to_string(&Market::Uk).unwrap();
        assert_eq!(json, "\"UK\"");
        let back: Market = serde_json::from_str("\"de\"").unwrap();
        assert_eq!(back, Market::Other("DE".to_string()));
    }

    #[test]
    fn test_category_round_trip_names() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
        assert!("macro".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_map_serializes_with_string_keys() {
        let scores: BTreeMap<Category, f64> = [(Category::Fundamentals, 2.5), (Category::RiskAssessment, -1.0)]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&scores).unwrap();
        assert_eq!(json["fundamentals"], 2.5);
        assert_eq!(json["risk_assessment"], -1.0);
    }

    #[test]
    fn test_new_ticker_normalizes() {
        let ticker = NewTicker::new(" aapl ", "Apple Inc.");
        assert_eq!(ticker.symbol, "AAPL");
        assert_eq!(ticker.market, Market::Us);

        let ticker = NewTicker::new("vod", "Vodafone").with_market("uk").with_sector("Communication Services");
        assert_eq!(ticker.market, Market::Uk);
        assert_eq!(ticker.sector.as_deref(), Some("Communication Services"));
    }

    #[test]
    fn test_trading_symbol_prefers_resolution() {
        let mut ticker = Ticker {
            symbol: "HSBC".to_string(),
            name: "HSBC".to_string(),
            sector: None,
            market: Market::Uk,
            resolved_symbol: None,
            added_at: Utc::now(),
        };
        assert_eq!(ticker.trading_symbol(), "HSBC");
        ticker.resolved_symbol = Some("HSBA.L".to_string());
        assert_eq!(ticker.trading_symbol(), "HSBA.L");
    }
}
