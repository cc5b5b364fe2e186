//! Data-source adapters
//!
//! Every adapter answers one question for one symbol and returns an opaque
//! JSON payload. The engine forwards payloads into prompts without looking
//! inside them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FetchError, RoutingError};
use crate::fetcher::Fetcher;
use crate::model::Market;
use crate::router::{InsiderFeed, MarketRoute, SectorFeed};

pub mod finnhub;
pub mod fmp;
pub mod investegate;
pub mod sector;
pub mod yahoo;

pub use finnhub::FinnhubNews;
pub use fmp::{FmpAnalystData, FmpClient, FmpInsiderTrades};
pub use investegate::InvestegateDealings;
pub use sector::SectorEtfSource;
pub use yahoo::YahooMarketData;

/// Adapter roles, in the order the engine fetches them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    /// Price history, fundamentals and technicals
    MarketData,
    AnalystData,
    InsiderActivity,
    News,
    SectorContext,
}

impl SourceRole {
    pub const ALL: [SourceRole; 5] = [
        SourceRole::MarketData,
        SourceRole::AnalystData,
        SourceRole::InsiderActivity,
        SourceRole::News,
        SourceRole::SectorContext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarketData => "market_data",
            Self::AnalystData => "analyst_data",
            Self::InsiderActivity => "insider_activity",
            Self::News => "news",
            Self::SectorContext => "sector_context",
        }
    }

    /// Progress step shown while this role is fetched
    pub fn step(&self) -> &'static str {
        match self {
            Self::MarketData => "Fetching market data...",
            Self::AnalystData => "Fetching analyst data...",
            Self::InsiderActivity => "Scraping insider data...",
            Self::News => "Fetching news...",
            Self::SectorContext => "Fetching sector context...",
        }
    }
}

impl fmt::Display for SourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an adapter is asked for
#[derive(Debug, Clone, Copy)]
pub struct SourceRequest<'a> {
    /// Canonical trading symbol
    pub symbol: &'a str,
    pub market: &'a Market,
    pub sector: Option<&'a str>,
    /// Comparison ETF for the ticker's sector
    pub sector_etf: &'a str,
    /// Broad market benchmark
    pub benchmark: &'a str,
    pub currency: &'a str,
}

impl<'a> SourceRequest<'a> {
    pub fn new(symbol: &'a str, sector: Option<&'a str>, route: &'a MarketRoute) -> Self {
        Self {
            symbol,
            market: &route.market,
            sector,
            sector_etf: route.sector_etf(sector),
            benchmark: route.benchmark,
            currency: route.currency,
        }
    }
}

/// One data-source adapter
#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, request: &SourceRequest<'_>) -> Result<Value, FetchError>;
}

/// Payload substituted when an adapter fails
pub fn degraded_payload() -> Value {
    Value::Object(Map::new())
}

/// Registered adapters, with market-dependent roles keyed by feed
#[derive(Clone)]
pub struct SourceSet {
    market_data: Arc<dyn DataSource>,
    analyst: Arc<dyn DataSource>,
    news: Arc<dyn DataSource>,
    insider: HashMap<InsiderFeed, Arc<dyn DataSource>>,
    sector: HashMap<SectorFeed, Arc<dyn DataSource>>,
}

impl SourceSet {
    pub fn new(market_data: Arc<dyn DataSource>, analyst: Arc<dyn DataSource>, news: Arc<dyn DataSource>) -> Self {
        Self {
            market_data,
            analyst,
            news,
            insider: HashMap::new(),
            sector: HashMap::new(),
        }
    }

    pub fn with_insider(mut self, feed: InsiderFeed, source: Arc<dyn DataSource>) -> Self {
        self.insider.insert(feed, source);
        self
    }

    pub fn with_sector(mut self, feed: SectorFeed, source: Arc<dyn DataSource>) -> Self {
        self.sector.insert(feed, source);
        self
    }

    /// Live adapters for the US and UK routes
    pub fn live(fetcher: Fetcher, fmp: Option<FmpClient>, finnhub_key: Option<String>) -> Self {
        let market_data = Arc::new(YahooMarketData::new(fetcher.clone()).with_fmp(fmp.clone()));
        let sector = Arc::new(SectorEtfSource::new(fetcher.clone()));
        let news = Arc::new(FinnhubNews::new(fetcher.clone(), finnhub_key));

        Self::new(
            market_data,
            Arc::new(FmpAnalystData::new(fmp.clone())),
            news,
        )
        .with_insider(InsiderFeed::SecForm4, Arc::new(FmpInsiderTrades::new(fmp)))
        .with_insider(
            InsiderFeed::RnsDirectorDealings,
            Arc::new(InvestegateDealings::new(fetcher)),
        )
        .with_sector(SectorFeed::UsSectorEtfs, sector.clone())
        .with_sector(SectorFeed::UkSectorEtfs, sector)
    }

    /// Pick the adapter for each role on `route`
    pub fn for_route(&self, route: &MarketRoute) -> Result<RoutedSources, RoutingError> {
        let insider = self
            .insider
            .get(&route.insider_feed)
            .ok_or_else(|| RoutingError::MissingSource {
                role: SourceRole::InsiderActivity.to_string(),
                feed: route.insider_feed.to_string(),
            })?;
        let sector = self
            .sector
            .get(&route.sector_feed)
            .ok_or_else(|| RoutingError::MissingSource {
                role: SourceRole::SectorContext.to_string(),
                feed: route.sector_feed.to_string(),
            })?;

        Ok(RoutedSources {
            adapters: vec![
                (SourceRole::MarketData, Arc::clone(&self.market_data)),
                (SourceRole::AnalystData, Arc::clone(&self.analyst)),
                (SourceRole::InsiderActivity, Arc::clone(insider)),
                (SourceRole::News, Arc::clone(&self.news)),
                (SourceRole::SectorContext, Arc::clone(sector)),
            ],
        })
    }
}

/// Adapters chosen for one run, in fetch order
pub struct RoutedSources {
    adapters: Vec<(SourceRole, Arc<dyn DataSource>)>,
}

impl RoutedSources {
    pub fn iter(&self) -> impl Iterator<Item = (SourceRole, &Arc<dyn DataSource>)> {
        self.adapters.iter().map(|(role, source)| (*role, source))
    }

    pub fn get(&self, role: SourceRole) -> Option<&Arc<dyn DataSource>> {
        self.adapters.iter().find(|(r, _)| *r == role).map(|(_, source)| source)
    }
}

/// Percentage change between two prices, rounded to 2 places
pub(crate) fn pct_change(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 || !from.is_finite() || !to.is_finite() {
        return None;
    }
    Some(round2((to - from) / from * 100.0))
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::router::MarketRouter;

    struct Named(&'static str);

    #[async_trait]
    impl DataSource for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn fetch(&self, _request: &SourceRequest<'_>) -> Result<Value, FetchError> {
            Ok(json!({ "source": self.0 }))
        }
    }

    fn base_set() -> SourceSet {
        SourceSet::new(Arc::new(Named("market")), Arc::new(Named("analyst")), Arc::new(Named("news")))
    }

    #[test]
    fn test_routes_pick_market_specific_feeds() {
        let set = base_set()
            .with_insider(InsiderFeed::SecForm4, Arc::new(Named("form4")))
            .with_insider(InsiderFeed::RnsDirectorDealings, Arc::new(Named("rns")))
            .with_sector(SectorFeed::UsSectorEtfs, Arc::new(Named("us-etf")))
            .with_sector(SectorFeed::UkSectorEtfs, Arc::new(Named("uk-etf")));
        let router = MarketRouter::new();

        let us = set.for_route(router.route(&Market::Us).unwrap()).unwrap();
        assert_eq!(us.get(SourceRole::InsiderActivity).unwrap().name(), "form4");

        let uk = set.for_route(router.route(&Market::Uk).unwrap()).unwrap();
        assert_eq!(uk.get(SourceRole::InsiderActivity).unwrap().name(), "rns");
        assert_eq!(uk.get(SourceRole::SectorContext).unwrap().name(), "uk-etf");

        let roles: Vec<_> = uk.iter().map(|(role, _)| role).collect();
        assert_eq!(roles, SourceRole::ALL.to_vec());
    }

    #[test]
    fn test_missing_feed_is_routing_error() {
        let set = base_set().with_sector(SectorFeed::UsSectorEtfs, Arc::new(Named("us-etf")));
        let err = set.for_route(&MarketRoute::us()).err().unwrap();
        assert_eq!(
            err,
            RoutingError::MissingSource {
                role: "insider_activity".to_string(),
                feed: "sec_form4".to_string(),
            }
        );
    }

    #[test]
    fn test_request_carries_route_context() {
        let route = MarketRoute::uk();
        let request = SourceRequest::new("VOD.L", Some("Communication Services"), &route);
        assert_eq!(request.sector_etf, "IUCM.L");
        assert_eq!(request.benchmark, "ISF.L");
        assert_eq!(request.currency, "GBP");
    }

    #[test]
    fn test_pct_change() {
        assert_eq!(pct_change(100.0, 110.0), Some(10.0));
        assert_eq!(pct_change(0.0, 110.0), None);
        assert_eq!(degraded_payload(), json!({}));
    }
}
