//! In-process fakes shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use stock_signals::router::{InsiderFeed, SectorFeed};
use stock_signals::{
    AnalysisEngine, Category, DataSource, FetchError, ManualClock, MemoryStore, NewTicker, Oracle, OracleError,
    OracleReply, SourceRequest, SourceSet, StaticResolver,
};

/// Source that returns a fixed payload and records who asked
pub struct RecordingSource {
    name: String,
    payload: Value,
    fail: AtomicBool,
    calls: AtomicUsize,
    symbols: Mutex<Vec<String>>,
}

impl RecordingSource {
    pub fn new(name: &str, payload: Value) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            payload,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            symbols: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        let source = Self::new(name, json!({}));
        source.fail.store(true, Ordering::SeqCst);
        source
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn symbols(&self) -> Vec<String> {
        self.symbols.lock().await.clone()
    }
}

#[async_trait]
impl DataSource for RecordingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &SourceRequest<'_>) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.symbols.lock().await.push(request.symbol.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Status {
                source_name: self.name.clone(),
                status: 503,
            });
        }
        Ok(self.payload.clone())
    }
}

/// One fake per role and feed
pub struct Sources {
    pub market_data: Arc<RecordingSource>,
    pub analyst: Arc<RecordingSource>,
    pub news: Arc<RecordingSource>,
    pub sec_form4: Arc<RecordingSource>,
    pub rns: Arc<RecordingSource>,
    pub us_sector: Arc<RecordingSource>,
    pub uk_sector: Arc<RecordingSource>,
}

impl Sources {
    pub fn healthy() -> Self {
        Self {
            market_data: RecordingSource::new(
                "market",
                json!({
                    "fundamentals": {"pe_ratio": 28.4, "profit_margin": 0.25},
                    "technicals": {"rsi_14": 55.1, "sma_50": 182.3},
                }),
            ),
            analyst: RecordingSource::new("analyst", json!({"consensus": "buy", "target": 210.0})),
            news: RecordingSource::new("news", json!({"articles": [{"headline": "Record quarter"}]})),
            sec_form4: RecordingSource::new("sec_form4", json!({"trades": [{"type": "P-Purchase"}]})),
            rns: RecordingSource::new("rns", json!({"dealings": [{"type": "Buy"}]})),
            us_sector: RecordingSource::new("us_sector", json!({"etf": "XLK", "relative_1m": 1.2})),
            uk_sector: RecordingSource::new("uk_sector", json!({"etf": "ISF.L", "relative_1m": -0.4})),
        }
    }

    pub fn with_sec_form4(mut self, source: Arc<RecordingSource>) -> Self {
        self.sec_form4 = source;
        self
    }

    pub fn set(&self) -> SourceSet {
        SourceSet::new(self.market_data.clone(), self.analyst.clone(), self.news.clone())
            .with_insider(InsiderFeed::SecForm4, self.sec_form4.clone())
            .with_insider(InsiderFeed::RnsDirectorDealings, self.rns.clone())
            .with_sector(SectorFeed::UsSectorEtfs, self.us_sector.clone())
            .with_sector(SectorFeed::UkSectorEtfs, self.uk_sector.clone())
    }

    pub fn total_calls(&self) -> usize {
        [
            &self.market_data,
            &self.analyst,
            &self.news,
            &self.sec_form4,
            &self.rns,
            &self.us_sector,
            &self.uk_sector,
        ]
        .iter()
        .map(|s| s.calls())
        .sum()
    }
}

/// Oracle answering from a per-category script
pub struct ScriptedOracle {
    replies: HashMap<Category, Value>,
    synthesis: Value,
    unavailable: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            synthesis: json!({
                "overall_score": 4.5,
                "recommendation": "buy",
                "narrative": "## Summary\n\nSolid across the board.",
                "entry_strategy": "Scale in below 180.",
            }),
            unavailable: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new()
        }
    }

    pub fn with_reply(mut self, category: Category, reply: Value) -> Self {
        self.replies.insert(category, reply);
        self
    }

    pub fn with_synthesis(mut self, reply: Value) -> Self {
        self.synthesis = reply;
        self
    }

    pub async fn prompt_count(&self) -> usize {
        self.prompts.lock().await.len()
    }

    fn category_of(prompt: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| prompt.contains(&format!("Data ({}):", c.label())))
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn evaluate(&self, prompt: &str) -> Result<OracleReply, OracleError> {
        self.prompts.lock().await.push(prompt.to_string());
        if self.unavailable {
            return Err(OracleError::Unavailable("scripted outage".to_string()));
        }

        let reply = if prompt.contains("\"overall_score\"") {
            self.synthesis.clone()
        } else {
            Self::category_of(prompt)
                .and_then(|c| self.replies.get(&c).cloned())
                .unwrap_or_else(|| json!({"score": 4, "confidence": "high", "narrative": "Looks constructive."}))
        };
        let fields = reply.as_object().cloned().unwrap_or_default();
        Ok(OracleReply::from_fields(fields))
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub sources: Sources,
    pub oracle: Arc<ScriptedOracle>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(sources: Sources, oracle: ScriptedOracle) -> Self {
        let clock = Arc::new(ManualClock::default());
        Self {
            store: Arc::new(MemoryStore::with_clock(clock.clone())),
            sources,
            oracle: Arc::new(oracle),
            clock,
        }
    }

    pub fn engine(&self) -> AnalysisEngine {
        self.engine_with(StaticResolver::new(), true)
    }

    pub fn engine_with(&self, resolver: StaticResolver, reuse: bool) -> AnalysisEngine {
        AnalysisEngine::builder()
            .store(self.store.clone())
            .sources(self.sources.set())
            .oracle(self.oracle.clone())
            .resolver(Arc::new(resolver))
            .clock(self.clock.clone())
            .reuse_unchanged_analyses(reuse)
            .build()
            .unwrap()
    }

    pub async fn track(&self, ticker: NewTicker) {
        use stock_signals::Store;
        assert!(self.store.add_ticker(&ticker).await.unwrap());
    }
}
