//! SQLite-backed store and fetch cache

use std::path::Path;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Store, TickerUpdate, sort_dashboard};
use crate::cache::{FetchCache, expiry};
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::model::{Category, DashboardRow, Market, NewTicker, SignalResult, Synthesis, Ticker, normalize_symbol};

const CREATE_TABLES_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tickers (
    symbol TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    sector TEXT,
    market TEXT NOT NULL DEFAULT 'US',
    resolved_symbol TEXT,
    added_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS signal_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL REFERENCES tickers(symbol) ON DELETE CASCADE,
    category TEXT NOT NULL,
    score REAL NOT NULL,
    confidence TEXT NOT NULL,
    narrative TEXT NOT NULL,
    raw_data TEXT NOT NULL,
    input_hash TEXT NOT NULL,
    fallback INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_signal_results_symbol
ON signal_results(symbol, id DESC);

CREATE INDEX IF NOT EXISTS idx_signal_results_hash
ON signal_results(symbol, category, input_hash);

CREATE TABLE IF NOT EXISTS syntheses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL REFERENCES tickers(symbol) ON DELETE CASCADE,
    overall_score REAL NOT NULL,
    recommendation TEXT NOT NULL,
    narrative TEXT NOT NULL,
    signal_scores TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_syntheses_symbol
ON syntheses(symbol, id DESC);

-- Timestamps in milliseconds since the epoch
CREATE TABLE IF NOT EXISTS fetch_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    content TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fetch_cache_key
ON fetch_cache(key, fetched_at DESC);
";

const SIGNAL_COLUMNS: &str =
    "symbol, category, score, confidence, narrative, raw_data, input_hash, fallback, created_at";
const SYNTHESIS_COLUMNS: &str = "symbol, overall_score, recommendation, narrative, signal_scores, created_at";
const TICKER_COLUMNS: &str = "symbol, name, sector, market, resolved_symbol, added_at";

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}

fn parse_field<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T, StoreError> {
    raw.parse().map_err(StoreError::Corrupt)
}

/// Text columns as read, before domain parsing
struct TickerRow {
    symbol: String,
    name: String,
    sector: Option<String>,
    market: String,
    resolved_symbol: Option<String>,
    added_at: String,
}

impl TickerRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            symbol: row.get(0)?,
            name: row.get(1)?,
            sector: row.get(2)?,
            market: row.get(3)?,
            resolved_symbol: row.get(4)?,
            added_at: row.get(5)?,
        })
    }

    fn into_ticker(self) -> Result<Ticker, StoreError> {
        Ok(Ticker {
            symbol: self.symbol,
            name: self.name,
            sector: self.sector,
            market: Market::from(self.market),
            resolved_symbol: self.resolved_symbol,
            added_at: parse_timestamp(&self.added_at)?,
        })
    }
}

struct SignalRow {
    symbol: String,
    category: String,
    score: f64,
    confidence: String,
    narrative: String,
    raw_data: String,
    input_hash: String,
    fallback: bool,
    created_at: String,
}

impl SignalRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            symbol: row.get(0)?,
            category: row.get(1)?,
            score: row.get(2)?,
            confidence: row.get(3)?,
            narrative: row.get(4)?,
            raw_data: row.get(5)?,
            input_hash: row.get(6)?,
            fallback: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_signal(self) -> Result<SignalResult, StoreError> {
        Ok(SignalResult {
            symbol: self.symbol,
            category: parse_field(&self.category)?,
            score: self.score,
            confidence: parse_field(&self.confidence)?,
            narrative: self.narrative,
            raw_data: serde_json::from_str(&self.raw_data)?,
            input_hash: self.input_hash,
            fallback: self.fallback,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct SynthesisRow {
    symbol: String,
    overall_score: f64,
    recommendation: String,
    narrative: String,
    signal_scores: String,
    created_at: String,
}

impl SynthesisRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            symbol: row.get(0)?,
            overall_score: row.get(1)?,
            recommendation: row.get(2)?,
            narrative: row.get(3)?,
            signal_scores: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_synthesis(self) -> Result<Synthesis, StoreError> {
        Ok(Synthesis {
            symbol: self.symbol,
            overall_score: self.overall_score,
            recommendation: parse_field(&self.recommendation)?,
            narrative: self.narrative,
            signal_scores: serde_json::from_str(&self.signal_scores)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Run a query and parse every row it returns
fn query_rows<R, T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    read: fn(&Row<'_>) -> rusqlite::Result<R>,
    convert: fn(R) -> Result<T, StoreError>,
) -> Result<Vec<T>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt.query_map(params, read)?.collect::<rusqlite::Result<Vec<R>>>()?;
    raw.into_iter().map(convert).collect()
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// [`Store`] and [`FetchCache`] over one SQLite database
///
/// rusqlite connections are `Send` but not `Sync`, so the connection sits
/// behind a tokio mutex. Queries are short and never span an await.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        info!(db_path = %path.display(), "Opened signal store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(CREATE_TABLES_SQL)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used for `added_at` and cache expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn add_ticker(&self, ticker: &NewTicker) -> Result<bool, StoreError> {
        let db = self.db.lock().await;
        let inserted = db.execute(
            "INSERT OR IGNORE INTO tickers (symbol, name, sector, market, added_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                normalize_symbol(&ticker.symbol),
                ticker.name,
                ticker.sector,
                ticker.market.code(),
                timestamp(self.clock.now()),
            ],
        )?;
        Ok(inserted > 0)
    }

    async fn remove_ticker(&self, symbol: &str) -> Result<bool, StoreError> {
        let db = self.db.lock().await;
        let removed = db.execute("DELETE FROM tickers WHERE symbol = ?1", params![normalize_symbol(symbol)])?;
        Ok(removed > 0)
    }

    async fn list_tickers(&self) -> Result<Vec<Ticker>, StoreError> {
        let db = self.db.lock().await;
        query_rows(
            &db,
            &format!("SELECT {TICKER_COLUMNS} FROM tickers ORDER BY symbol"),
            params![],
            TickerRow::read,
            TickerRow::into_ticker,
        )
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Option<Ticker>, StoreError> {
        let db = self.db.lock().await;
        db.query_row(
            &format!("SELECT {TICKER_COLUMNS} FROM tickers WHERE symbol = ?1"),
            params![normalize_symbol(symbol)],
            TickerRow::read,
        )
        .optional()?
        .map(TickerRow::into_ticker)
        .transpose()
    }

    async fn update_ticker(&self, symbol: &str, update: &TickerUpdate) -> Result<Option<Ticker>, StoreError> {
        let Some(mut ticker) = self.get_ticker(symbol).await? else {
            return Ok(None);
        };
        update.apply(&mut ticker);

        let db = self.db.lock().await;
        db.execute(
            "UPDATE tickers SET name = ?2, sector = ?3, market = ?4, resolved_symbol = ?5 WHERE symbol = ?1",
            params![
                ticker.symbol,
                ticker.name,
                ticker.sector,
                ticker.market.code(),
                ticker.resolved_symbol,
            ],
        )?;
        Ok(Some(ticker))
    }

    async fn set_resolution(&self, symbol: &str, resolved_symbol: &str) -> Result<(), StoreError> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE tickers SET resolved_symbol = ?2 WHERE symbol = ?1",
            params![normalize_symbol(symbol), resolved_symbol],
        )?;
        Ok(())
    }

    async fn save_signal(&self, signal: &SignalResult) -> Result<(), StoreError> {
        let raw_data = serde_json::to_string(&signal.raw_data)?;
        let db = self.db.lock().await;
        db.execute(
            &format!("INSERT INTO signal_results ({SIGNAL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
            params![
                signal.symbol,
                signal.category.as_str(),
                signal.score,
                signal.confidence.as_str(),
                signal.narrative,
                raw_data,
                signal.input_hash,
                signal.fallback,
                timestamp(signal.created_at),
            ],
        )?;
        debug!(symbol = %signal.symbol, category = %signal.category, "Saved signal result");
        Ok(())
    }

    async fn signal_history(&self, symbol: &str, limit: usize) -> Result<Vec<SignalResult>, StoreError> {
        let db = self.db.lock().await;
        query_rows(
            &db,
            &format!("SELECT {SIGNAL_COLUMNS} FROM signal_results WHERE symbol = ?1 ORDER BY id DESC LIMIT ?2"),
            params![normalize_symbol(symbol), limit_param(limit)],
            SignalRow::read,
            SignalRow::into_signal,
        )
    }

    async fn latest_signals(&self, symbol: &str) -> Result<Vec<SignalResult>, StoreError> {
        let db = self.db.lock().await;
        let latest = query_rows(
            &db,
            &format!(
                "SELECT {SIGNAL_COLUMNS} FROM signal_results WHERE id IN \
                 (SELECT MAX(id) FROM signal_results WHERE symbol = ?1 GROUP BY category)"
            ),
            params![normalize_symbol(symbol)],
            SignalRow::read,
            SignalRow::into_signal,
        )?;
        Ok(Category::ALL
            .into_iter()
            .filter_map(|category| latest.iter().find(|s| s.category == category).cloned())
            .collect())
    }

    async fn find_signal(
        &self,
        symbol: &str,
        category: Category,
        input_hash: &str,
    ) -> Result<Option<SignalResult>, StoreError> {
        let db = self.db.lock().await;
        db.query_row(
            &format!(
                "SELECT {SIGNAL_COLUMNS} FROM signal_results \
                 WHERE symbol = ?1 AND category = ?2 AND input_hash = ?3 AND fallback = 0 \
                 ORDER BY id DESC LIMIT 1"
            ),
            params![normalize_symbol(symbol), category.as_str(), input_hash],
            SignalRow::read,
        )
        .optional()?
        .map(SignalRow::into_signal)
        .transpose()
    }

    async fn save_synthesis(&self, synthesis: &Synthesis) -> Result<(), StoreError> {
        let signal_scores = serde_json::to_string(&synthesis.signal_scores)?;
        let db = self.db.lock().await;
        db.execute(
            &format!("INSERT INTO syntheses ({SYNTHESIS_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                synthesis.symbol,
                synthesis.overall_score,
                synthesis.recommendation.as_str(),
                synthesis.narrative,
                signal_scores,
                timestamp(synthesis.created_at),
            ],
        )?;
        Ok(())
    }

    async fn latest_synthesis(&self, symbol: &str) -> Result<Option<Synthesis>, StoreError> {
        Ok(self.synthesis_history(symbol, 1).await?.into_iter().next())
    }

    async fn synthesis_history(&self, symbol: &str, limit: usize) -> Result<Vec<Synthesis>, StoreError> {
        let db = self.db.lock().await;
        query_rows(
            &db,
            &format!("SELECT {SYNTHESIS_COLUMNS} FROM syntheses WHERE symbol = ?1 ORDER BY id DESC LIMIT ?2"),
            params![normalize_symbol(symbol), limit_param(limit)],
            SynthesisRow::read,
            SynthesisRow::into_synthesis,
        )
    }

    async fn dashboard(&self) -> Result<Vec<DashboardRow>, StoreError> {
        let tickers = self.list_tickers().await?;
        let mut latest = {
            let db = self.db.lock().await;
            query_rows(
                &db,
                &format!(
                    "SELECT {SYNTHESIS_COLUMNS} FROM syntheses WHERE id IN \
                     (SELECT MAX(id) FROM syntheses GROUP BY symbol)"
                ),
                params![],
                SynthesisRow::read,
                SynthesisRow::into_synthesis,
            )?
        };

        let mut rows: Vec<DashboardRow> = tickers
            .into_iter()
            .map(|ticker| {
                let position = latest.iter().position(|s| s.symbol == ticker.symbol);
                DashboardRow {
                    latest: position.map(|i| latest.swap_remove(i)),
                    ticker,
                }
            })
            .collect();
        sort_dashboard(&mut rows);
        Ok(rows)
    }

    async fn is_stale(&self, max_age: Duration) -> Result<bool, StoreError> {
        let cutoff = self.clock.now() - max_age;
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT t.symbol, MAX(s.created_at) FROM tickers t \
             LEFT JOIN syntheses s ON s.symbol = t.symbol GROUP BY t.symbol",
        )?;
        let newest = stmt
            .query_map([], |row| row.get::<_, Option<String>>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for created_at in newest {
            match created_at {
                Some(raw) if parse_timestamp(&raw)? > cutoff => {}
                _ => return Ok(true),
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl FetchCache for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now().timestamp_millis();
        let db = self.db.lock().await;
        Ok(db
            .query_row(
                "SELECT content FROM fetch_cache WHERE key = ?1 AND expires_at >= ?2 \
                 ORDER BY fetched_at DESC, id DESC LIMIT 1",
                params![key, now],
                |row| row.get(0),
            )
            .optional()?)
    }

    async fn put(&self, key: &str, content: &str, ttl: StdDuration) -> Result<(), StoreError> {
        let now = self.clock.now();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO fetch_cache (key, content, fetched_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![key, content, now.timestamp_millis(), expiry(now, ttl).timestamp_millis()],
        )?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now().timestamp_millis();
        let db = self.db.lock().await;
        let purged = db.execute("DELETE FROM fetch_cache WHERE expires_at < ?1", params![now])?;
        if purged > 0 {
            debug!(purged, "Purged expired cache entries");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{Confidence, Recommendation};

    fn store_in(dir: &TempDir) -> SqliteStore {
        SqliteStore::open(dir.path().join("signals.db")).unwrap()
    }

    fn signal(category: Category, score: f64, hash: &str, fallback: bool) -> SignalResult {
        SignalResult {
            symbol: "AAPL".to_string(),
            category,
            score,
            confidence: Confidence::High,
            narrative: "### Summary\nfine".to_string(),
            raw_data: json!({"price": 190.5, "tags": ["a", "b"]}),
            input_hash: hash.to_string(),
            fallback,
            created_at: Utc::now(),
        }
    }

    fn synthesis(symbol: &str, score: f64) -> Synthesis {
        Synthesis {
            symbol: symbol.to_string(),
            overall_score: score,
            recommendation: Recommendation::Buy,
            narrative: "overall".to_string(),
            signal_scores: [(Category::Fundamentals, score)].into_iter().collect::<BTreeMap<_, _>>(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_ticker_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(store.add_ticker(&NewTicker::new("vod", "Vodafone").with_market("UK")).await.unwrap());
        assert!(!store.add_ticker(&NewTicker::new("VOD", "Other")).await.unwrap());

        store.set_resolution("VOD", "VOD.L").await.unwrap();
        let ticker = store.get_ticker("vod").await.unwrap().unwrap();
        assert_eq!(ticker.market, Market::Uk);
        assert_eq!(ticker.trading_symbol(), "VOD.L");
        assert_eq!(ticker.name, "Vodafone");

        let update = TickerUpdate {
            sector: Some("Communication Services".to_string()),
            market: Some(Market::Us),
            ..TickerUpdate::default()
        };
        let updated = store.update_ticker("VOD", &update).await.unwrap().unwrap();
        assert!(updated.resolved_symbol.is_none());
        let reloaded = store.get_ticker("VOD").await.unwrap().unwrap();
        assert_eq!(reloaded.sector.as_deref(), Some("Communication Services"));
        assert_eq!(reloaded.resolved_symbol, None);
    }

    #[tokio::test]
    async fn test_signals_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = store_in(&dir);
            store.add_ticker(&NewTicker::new("AAPL", "Apple")).await.unwrap();
            store.save_signal(&signal(Category::Technicals, 3.5, "h1", false)).await.unwrap();
            store.save_signal(&signal(Category::Technicals, 0.0, "h1", true)).await.unwrap();
        }

        let store = store_in(&dir);
        let history = store.signal_history("AAPL", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].fallback);
        assert_eq!(history[1].raw_data["tags"][1], "b");

        let reused = store.find_signal("AAPL", Category::Technicals, "h1").await.unwrap().unwrap();
        assert_eq!(reused.score, 3.5);
        assert!(store.find_signal("AAPL", Category::Technicals, "h2").await.unwrap().is_none());

        let latest = store.latest_signals("AAPL").await.unwrap();
        assert_eq!(latest.len(), 1);
        assert!(latest[0].fallback);
    }

    #[tokio::test]
    async fn test_reads_match_any_symbol_case() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_ticker(&NewTicker::new("aapl", "Apple")).await.unwrap();
        store.save_signal(&signal(Category::Technicals, 3.5, "h1", false)).await.unwrap();
        store.save_synthesis(&synthesis("AAPL", 3.5)).await.unwrap();

        assert_eq!(store.signal_history("aapl", 10).await.unwrap().len(), 1);
        assert_eq!(store.latest_signals("aapl").await.unwrap().len(), 1);
        assert!(store.find_signal("aapl", Category::Technicals, "h1").await.unwrap().is_some());
        assert_eq!(store.synthesis_history("aapl", 10).await.unwrap().len(), 1);
        assert_eq!(store.latest_synthesis("aapl").await.unwrap().map(|s| s.overall_score), Some(3.5));
    }

    #[tokio::test]
    async fn test_remove_cascades() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add_ticker(&NewTicker::new("AAPL", "Apple")).await.unwrap();
        store.save_signal(&signal(Category::Sentiment, 1.0, "h", false)).await.unwrap();
        store.save_synthesis(&synthesis("AAPL", 1.0)).await.unwrap();

        assert!(store.remove_ticker("AAPL").await.unwrap());
        store.add_ticker(&NewTicker::new("AAPL", "Apple")).await.unwrap();
        assert!(store.signal_history("AAPL", 10).await.unwrap().is_empty());
        assert!(store.latest_synthesis("AAPL").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dashboard_and_staleness() {
        let clock = Arc::new(ManualClock::default());
        let store = SqliteStore::open_in_memory().unwrap().with_clock(clock.clone());
        for symbol in ["AAPL", "MSFT", "NVDA"] {
            store.add_ticker(&NewTicker::new(symbol, symbol)).await.unwrap();
        }
        store.save_synthesis(&synthesis("AAPL", -1.0)).await.unwrap();
        store.save_synthesis(&synthesis("NVDA", 2.0)).await.unwrap();
        store.save_synthesis(&synthesis("NVDA", 6.0)).await.unwrap();

        let rows = store.dashboard().await.unwrap();
        let order: Vec<(&str, Option<f64>)> = rows
            .iter()
            .map(|r| (r.ticker.symbol.as_str(), r.latest.as_ref().map(|s| s.overall_score)))
            .collect();
        assert_eq!(order, vec![("NVDA", Some(6.0)), ("AAPL", Some(-1.0)), ("MSFT", None)]);

        assert!(store.is_stale(Duration::hours(24)).await.unwrap());
        store.remove_ticker("MSFT").await.unwrap();
        clock.set(Utc::now());
        assert!(!store.is_stale(Duration::hours(24)).await.unwrap());
        clock.advance(Duration::days(2));
        assert!(store.is_stale(Duration::hours(24)).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_cache_expiry_and_append() {
        let clock = Arc::new(ManualClock::default());
        let store = SqliteStore::open_in_memory().unwrap().with_clock(clock.clone());
        let day = StdDuration::from_secs(24 * 60 * 60);

        store.put("k", "first", day).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("first"));

        clock.advance(Duration::hours(1));
        store.put("k", "second", StdDuration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("second"));

        // Newest entry expires first; the older one is still fresh
        clock.advance(Duration::minutes(5));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("first"));

        clock.advance(Duration::hours(24));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.purge_expired().await.unwrap(), 2);
    }
}
