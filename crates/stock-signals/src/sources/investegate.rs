//! UK director dealings from Investegate RNS listings

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use tracing::warn;

use super::fmp::bare_symbol;
use super::{DataSource, SourceRequest};
use crate::error::FetchError;
use crate::fetcher::Fetcher;

const INVESTEGATE_BASE_URL: &str = "https://www.investegate.co.uk";

/// Announcements opened per run
const MAX_DETAILS: usize = 5;

fn compile(pattern: &str) -> Result<Regex, FetchError> {
    Regex::new(pattern).map_err(|e| FetchError::Malformed(format!("bad pattern: {e}")))
}

/// Link to one announcement on the listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub url: String,
    pub headline: String,
    pub date: String,
}

fn strip_tags(html: &str, tags: &Regex) -> String {
    tags.replace_all(html, " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Announcement links on a listing page that mention `bare_symbol`
pub fn matching_announcements(html: &str, bare_symbol: &str) -> Result<Vec<Announcement>, FetchError> {
    let links = compile(r#"(?is)<a\s[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)?;
    let tags = compile(r"(?s)<[^>]*>")?;
    let date = compile(r"\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4}|\d{4}[/\-]\d{1,2}[/\-]\d{1,2}|\d{1,2} [A-Z][a-z]{2} \d{4}")?;
    let symbol = bare_symbol.to_ascii_uppercase();

    let mut found = Vec::new();
    for caps in links.captures_iter(html) {
        let href = &caps[1];
        if !href.contains("/announcement/") {
            continue;
        }
        let headline = strip_tags(&caps[2], &tags);
        if !headline.to_ascii_uppercase().contains(&symbol) && !href.to_ascii_uppercase().contains(&symbol) {
            continue;
        }

        // Dates sit next to the link in the listing row
        let start = caps.get(0).map_or(0, |m| m.start());
        let mut window_start = start.saturating_sub(300);
        while !html.is_char_boundary(window_start) {
            window_start -= 1;
        }
        let row = strip_tags(&html[window_start..start], &tags);
        let date = date.find_iter(&row).last().map(|m| m.as_str().to_string()).unwrap_or_default();

        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{INVESTEGATE_BASE_URL}/{}", href.trim_start_matches('/'))
        };
        found.push(Announcement { url, headline, date });
    }
    Ok(found)
}

fn field(text: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    re.captures(text).map(|caps| caps[1].trim().to_string())
}

/// Best-effort trade details from one announcement body
pub fn parse_dealing(body_html: &str, announcement: &Announcement) -> Value {
    let body = Regex::new(r"(?s)<[^>]*>")
        .map(|tags| tags.replace_all(body_html, "\n").into_owned())
        .unwrap_or_else(|_| body_html.to_string());

    json!({
        "filing_date": announcement.date,
        "trade_date": announcement.date,
        "insider_name": field(&body, r"(?i)(?:Director|PDMR)\s*:\s*([^\n]+)").unwrap_or_default(),
        "trade_type": field(&body, r"(?i)(?:Nature of (?:the )?transaction|Type)[:\s]+(Purchase|Sale|Buy|Sell|Award)").unwrap_or_default(),
        "price": field(&body, r"(?i)(?:Price per share|Price\(s\)|Price)[:\s]+([£$p\d.,]+)").unwrap_or_default(),
        "qty": field(&body, r"(?i)(?:Number of (?:shares|securities)|Volume\(s\)|Shares)[:\s]+([\d,]+)").unwrap_or_default(),
        "value": field(&body, r"(?i)(?:Aggregate value|Value|Total)[:\s]+([£$\d.,]+)").unwrap_or_default(),
        "headline": announcement.headline,
        "url": announcement.url,
    })
}

/// RNS director dealings for London-listed tickers
pub struct InvestegateDealings {
    fetcher: Fetcher,
    listing_url: String,
}

impl InvestegateDealings {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            listing_url: format!("{INVESTEGATE_BASE_URL}/category/directors-dealings"),
        }
    }

    pub fn with_listing_url(mut self, url: impl Into<String>) -> Self {
        self.listing_url = url.into();
        self
    }
}

#[async_trait]
impl DataSource for InvestegateDealings {
    fn name(&self) -> &str {
        "investegate"
    }

    async fn fetch(&self, request: &SourceRequest<'_>) -> Result<Value, FetchError> {
        let bare = bare_symbol(request.symbol);
        let ttl = self.fetcher.ttl_for("investegate");
        let listing = self.fetcher.get_text(&self.listing_url, ttl).await?;

        let mut trades = Vec::new();
        for announcement in matching_announcements(&listing, bare)?.into_iter().take(MAX_DETAILS) {
            match self.fetcher.get_text(&announcement.url, ttl).await {
                Ok(body) => trades.push(parse_dealing(&body, &announcement)),
                Err(e) => {
                    warn!(url = %announcement.url, error = %e, "Announcement unavailable");
                    trades.push(parse_dealing("", &announcement));
                }
            }
        }

        Ok(json!({ "insider_trades": trades }))
    }
}
