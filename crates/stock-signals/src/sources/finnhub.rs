//! Finnhub company news

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::fmp::bare_symbol;
use super::{DataSource, SourceRequest};
use crate::error::FetchError;
use crate::fetcher::Fetcher;

const FINNHUB_NEWS_URL: &str = "https://finnhub.io/api/v1/company-news";

/// Articles kept per payload
const MAX_ARTICLES: usize = 20;

/// Finnhub news article, trimmed to what a prompt needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    #[serde(default)]
    pub datetime: i64,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub url: String,
}

/// Company news for the last 14 days
pub struct FinnhubNews {
    fetcher: Fetcher,
    api_key: Option<String>,
    lookback_days: i64,
}

impl FinnhubNews {
    pub fn new(fetcher: Fetcher, api_key: Option<String>) -> Self {
        Self {
            fetcher,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            lookback_days: 14,
        }
    }
}

#[async_trait]
impl DataSource for FinnhubNews {
    fn name(&self) -> &str {
        "finnhub"
    }

    async fn fetch(&self, request: &SourceRequest<'_>) -> Result<Value, FetchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FetchError::NotConfigured("Finnhub API key".to_string()))?;

        let to = Utc::now().date_naive();
        let from = to - Duration::days(self.lookback_days);
        let symbol = bare_symbol(request.symbol);

        let mut url = Url::parse(FINNHUB_NEWS_URL).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("symbol", symbol)
            .append_pair("from", &from.to_string())
            .append_pair("to", &to.to_string());
        let key = format!("finnhub:{url}");
        url.query_pairs_mut().append_pair("token", api_key);

        let mut articles: Vec<NewsArticle> =
            self.fetcher.get_json(&key, url.as_str(), self.fetcher.ttl_for("finnhub")).await?;
        articles.sort_by(|a, b| b.datetime.cmp(&a.datetime));
        articles.truncate(MAX_ARTICLES);

        Ok(json!({
            "news_articles": articles,
            "from": from.to_string(),
            "to": to.to_string(),
        }))
    }
}
