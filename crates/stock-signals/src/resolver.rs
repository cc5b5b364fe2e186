//! Symbol resolution: user symbol to canonical exchange symbol
//!
//! Resolution happens before any source is fetched. A symbol that matches no
//! listing, or several, on its market stops the run instead of guessing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cached::{Cached, TimedCache};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::model::Market;

/// Outcome of resolving one symbol on one market
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Canonical(String),
    Ambiguous(Vec<String>),
    NotFound,
}

#[async_trait]
pub trait SymbolResolver: Send + Sync {
    async fn resolve(&self, symbol: &str, market: &Market) -> Result<Resolution, FetchError>;
}

/// A listing returned by a directory search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub symbol: String,
    pub exchange: String,
}

impl Listing {
    pub fn new(symbol: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
        }
    }
}

/// Searchable directory of exchange listings
#[async_trait]
pub trait ListingDirectory: Send + Sync {
    async fn listings(&self, query: &str) -> Result<Vec<Listing>, FetchError>;
}

const US_EXCHANGES: &[&str] = &["NMS", "NYQ", "NGM", "NCM", "ASE", "PCX", "BTS", "NAS", "NYS"];
const UK_EXCHANGES: &[&str] = &["LSE", "IOB"];

/// Market an exchange code belongs to, if any we route
pub fn exchange_market(exchange: &str) -> Option<Market> {
    let code = exchange.to_ascii_uppercase();
    if US_EXCHANGES.contains(&code.as_str()) {
        Some(Market::Us)
    } else if UK_EXCHANGES.contains(&code.as_str()) {
        Some(Market::Uk)
    } else {
        None
    }
}

/// Yahoo Finance symbol search
pub struct YahooSearchDirectory {
    fetcher: Fetcher,
}

impl YahooSearchDirectory {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

/// Listings from a Yahoo search response body
pub fn parse_search(body: &Value) -> Vec<Listing> {
    body.get("quotes")
        .and_then(Value::as_array)
        .map(|quotes| {
            quotes
                .iter()
                .filter_map(|q| {
                    let symbol = q.get("symbol")?.as_str()?;
                    let exchange = q.get("exchange")?.as_str()?;
                    Some(Listing::new(symbol, exchange))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ListingDirectory for YahooSearchDirectory {
    async fn listings(&self, query: &str) -> Result<Vec<Listing>, FetchError> {
        let url = Url::parse_with_params(
            "https://query2.finance.yahoo.com/v1/finance/search",
            &[("q", query), ("quotesCount", "10"), ("newsCount", "0")],
        )
        .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let body: Value = self
            .fetcher
            .get_json(url.as_str(), url.as_str(), self.fetcher.ttl_for("yahoo-search"))
            .await?;
        Ok(parse_search(&body))
    }
}

/// Common names for London listings whose ticker differs
const UK_ALIASES: &[(&str, &str)] = &[
    ("HSBC", "HSBA"),
    ("BP", "BP"),
    ("LLOYDS", "LLOY"),
    ("BAE", "BA"),
    ("RELX", "REL"),
];

fn root_of(symbol: &str) -> &str {
    symbol.split('.').next().unwrap_or(symbol)
}

/// Directory-backed resolver with an alias table and memoization
pub struct DirectoryResolver {
    directory: Arc<dyn ListingDirectory>,
    memo: Mutex<TimedCache<String, Resolution>>,
}

impl DirectoryResolver {
    pub fn new(directory: Arc<dyn ListingDirectory>) -> Self {
        Self::with_ttl(directory, Duration::from_secs(24 * 60 * 60))
    }

    pub fn with_ttl(directory: Arc<dyn ListingDirectory>, ttl: Duration) -> Self {
        Self {
            directory,
            memo: Mutex::new(TimedCache::with_lifespan(ttl)),
        }
    }

    fn roots_for(symbol: &str, market: &Market) -> Vec<String> {
        let mut roots = vec![root_of(symbol).to_string()];
        if *market == Market::Uk {
            if let Some((_, alias)) = UK_ALIASES.iter().find(|(name, _)| *name == roots[0]) {
                roots.push((*alias).to_string());
            }
        }
        roots
    }

    /// Pick among directory listings for `symbol` on `market`
    pub fn choose(symbol: &str, market: &Market, listings: &[Listing]) -> Resolution {
        let roots = Self::roots_for(symbol, market);
        let mut candidates: Vec<String> = listings
            .iter()
            .filter(|l| exchange_market(&l.exchange).as_ref() == Some(market))
            .filter(|l| roots.iter().any(|r| root_of(&l.symbol).eq_ignore_ascii_case(r)))
            .map(|l| l.symbol.to_ascii_uppercase())
            .collect();
        // Alias roots query the directory again, so repeats need not be adjacent
        let mut seen = HashSet::new();
        candidates.retain(|c| seen.insert(c.clone()));

        if let Some(exact) = candidates.iter().find(|c| c.as_str() == symbol) {
            return Resolution::Canonical(exact.clone());
        }
        // Alias hits beat a bare-root hit
        if roots.len() > 1 {
            let aliased: Vec<&String> = candidates.iter().filter(|c| root_of(c) == roots[1]).collect();
            if let [single] = aliased.as_slice() {
                return Resolution::Canonical((*single).clone());
            }
        }
        match candidates.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Canonical(candidates.remove(0)),
            _ => Resolution::Ambiguous(candidates),
        }
    }
}

#[async_trait]
impl SymbolResolver for DirectoryResolver {
    async fn resolve(&self, symbol: &str, market: &Market) -> Result<Resolution, FetchError> {
        let memo_key = format!("{market}:{symbol}");
        if let Some(hit) = self.memo.lock().await.cache_get(&memo_key).cloned() {
            return Ok(hit);
        }

        let mut listings = Vec::new();
        for root in Self::roots_for(symbol, market) {
            listings.extend(self.directory.listings(&root).await?);
        }
        let resolution = Self::choose(symbol, market, &listings);
        debug!(symbol, %market, ?resolution, "Resolved symbol");

        self.memo.lock().await.cache_set(memo_key, resolution.clone());
        Ok(resolution)
    }
}

/// Fixed mapping, for tests and explicit overrides
///
/// Unmapped symbols resolve to themselves unless the resolver is strict.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<(String, Market), Resolution>,
    strict: bool,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unmapped symbols are reported as not found
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn with(mut self, symbol: &str, market: Market, resolution: Resolution) -> Self {
        self.entries.insert((symbol.to_string(), market), resolution);
        self
    }
}

#[async_trait]
impl SymbolResolver for StaticResolver {
    async fn resolve(&self, symbol: &str, market: &Market) -> Result<Resolution, FetchError> {
        let found = self.entries.get(&(symbol.to_string(), market.clone())).cloned();
        Ok(found.unwrap_or_else(|| {
            if self.strict {
                Resolution::NotFound
            } else {
                Resolution::Canonical(symbol.to_string())
            }
        }))
    }
}
