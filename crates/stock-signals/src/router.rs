//! Market router: which feeds and comparison basis serve a market
//!
//! Routing is a pure table lookup. A market without an explicit route is an
//! error rather than a silent fallback to another market's feeds.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::model::Market;

/// Insider-activity data feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsiderFeed {
    /// US SEC Form 4 filings
    SecForm4,
    /// UK RNS director dealings announcements
    RnsDirectorDealings,
}

impl fmt::Display for InsiderFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SecForm4 => "sec_form4",
            Self::RnsDirectorDealings => "rns_director_dealings",
        })
    }
}

/// Sector-context data feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorFeed {
    UsSectorEtfs,
    UkSectorEtfs,
}

impl fmt::Display for SectorFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UsSectorEtfs => "us_sector_etfs",
            Self::UkSectorEtfs => "uk_sector_etfs",
        })
    }
}

/// US sector ETFs (SPDR Select Sector)
pub const US_SECTOR_ETFS: &[(&str, &str)] = &[
    ("Technology", "XLK"),
    ("Healthcare", "XLV"),
    ("Financial Services", "XLF"),
    ("Consumer Cyclical", "XLY"),
    ("Consumer Defensive", "XLP"),
    ("Energy", "XLE"),
    ("Industrials", "XLI"),
    ("Basic Materials", "XLB"),
    ("Real Estate", "XLRE"),
    ("Utilities", "XLU"),
    ("Communication Services", "XLC"),
];

/// London-listed sector ETFs
pub const UK_SECTOR_ETFS: &[(&str, &str)] = &[
    ("Technology", "IITU.L"),
    ("Healthcare", "IUHC.L"),
    ("Financial Services", "IUFS.L"),
    ("Consumer Cyclical", "IUCD.L"),
    ("Consumer Defensive", "IUCS.L"),
    ("Energy", "IUES.L"),
    ("Industrials", "IUIS.L"),
    ("Basic Materials", "IUMS.L"),
    ("Real Estate", "IUKP.L"),
    ("Utilities", "IUUS.L"),
    ("Communication Services", "IUCM.L"),
];

/// Everything the engine needs to know about a market
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketRoute {
    pub market: Market,
    pub insider_feed: InsiderFeed,
    pub sector_feed: SectorFeed,
    /// Sector name to sector ETF
    pub sector_etfs: &'static [(&'static str, &'static str)],
    /// ETF used when the sector is unknown or unmapped
    pub fallback_etf: &'static str,
    /// Broad market benchmark
    pub benchmark: &'static str,
    pub currency: &'static str,
}

impl MarketRoute {
    pub fn us() -> Self {
        Self {
            market: Market::Us,
            insider_feed: InsiderFeed::SecForm4,
            sector_feed: SectorFeed::UsSectorEtfs,
            sector_etfs: US_SECTOR_ETFS,
            fallback_etf: "SPY",
            benchmark: "SPY",
            currency: "USD",
        }
    }

    pub fn uk() -> Self {
        Self {
            market: Market::Uk,
            insider_feed: InsiderFeed::RnsDirectorDealings,
            sector_feed: SectorFeed::UkSectorEtfs,
            sector_etfs: UK_SECTOR_ETFS,
            fallback_etf: "ISF.L",
            benchmark: "ISF.L",
            currency: "GBP",
        }
    }

    /// Comparison ETF for a sector, case-insensitive, with the fallback
    pub fn sector_etf(&self, sector: Option<&str>) -> &'static str {
        let Some(sector) = sector.map(str::trim) else {
            return self.fallback_etf;
        };
        self.sector_etfs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(sector) || alias(sector).is_some_and(|a| a == *name))
            .map_or(self.fallback_etf, |(_, etf)| *etf)
    }
}

/// Alternate sector spellings seen in provider profiles
fn alias(sector: &str) -> Option<&'static str> {
    match sector.to_ascii_lowercase().as_str() {
        "financial" | "financials" => Some("Financial Services"),
        "health care" => Some("Healthcare"),
        "materials" => Some("Basic Materials"),
        "consumer discretionary" => Some("Consumer Cyclical"),
        "consumer staples" => Some("Consumer Defensive"),
        "information technology" => Some("Technology"),
        _ => None,
    }
}

/// Lookup table from market to route
#[derive(Debug, Clone)]
pub struct MarketRouter {
    routes: HashMap<Market, MarketRoute>,
}

impl MarketRouter {
    /// Router with the US and UK routes
    pub fn new() -> Self {
        Self::empty().with_route(MarketRoute::us()).with_route(MarketRoute::uk())
    }

    /// Router that rejects every market
    pub fn empty() -> Self {
        Self { routes: HashMap::new() }
    }

    pub fn with_route(mut self, route: MarketRoute) -> Self {
        self.routes.insert(route.market.clone(), route);
        self
    }

    pub fn route(&self, market: &Market) -> Result<&MarketRoute, RoutingError> {
        self.routes
            .get(market)
            .ok_or_else(|| RoutingError::UnknownMarket(market.clone()))
    }

    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.routes.keys()
    }
}

impl Default for MarketRouter {
    fn default() -> Self {
        Self::new()
    }
}
