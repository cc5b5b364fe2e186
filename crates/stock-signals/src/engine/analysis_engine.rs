//! Per-ticker analysis run: resolve, fetch, analyze each category, synthesize

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument, warn};

use super::progress::{Progress, ProgressEmitter, ProgressStream};
use super::state::{RunReport, RunState};
use crate::clock::{Clock, SystemClock};
use crate::error::{ConfigError, EngineError, Result, RoutingError};
use crate::model::{Category, SignalResult, Synthesis, Ticker, normalize_symbol};
use crate::oracle::{Oracle, OracleReply};
use crate::prompts::{PromptContext, category_prompt, synthesis_prompt};
use crate::resolver::{Resolution, StaticResolver, SymbolResolver};
use crate::router::{MarketRoute, MarketRouter};
use crate::scoring::ScoringConfig;
use crate::sources::{RoutedSources, SourceRequest, SourceRole, SourceSet, degraded_payload};
use crate::store::Store;
use crate::validation::{UNAVAILABLE_NARRATIVE, ValidatedSignal, clamp_score, fallback_signal, validate_reply};

pub const SYNTHESIS_STEP: &str = "Generating overall recommendation...";

/// SHA-256 hex digest of a payload's canonical JSON
///
/// Object keys are re-inserted in sorted order first, so equal payloads hash
/// equally whether or not serde_json's `preserve_order` feature is enabled.
pub fn input_hash(payload: &Value) -> String {
    let canonical = serde_json::to_string(&canonicalize(payload)).unwrap_or_default();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Source payloads gathered in FETCHING
#[derive(Debug, Clone, Default)]
pub struct FetchedPayloads {
    payloads: BTreeMap<SourceRole, Value>,
    degraded: Vec<SourceRole>,
}

impl FetchedPayloads {
    pub fn insert(&mut self, role: SourceRole, payload: Value) {
        self.payloads.insert(role, payload);
    }

    pub fn mark_degraded(&mut self, role: SourceRole) {
        self.degraded.push(role);
        self.payloads.insert(role, degraded_payload());
    }

    pub fn get(&self, role: SourceRole) -> Value {
        self.payloads.get(&role).cloned().unwrap_or_else(degraded_payload)
    }

    pub fn degraded(&self) -> &[SourceRole] {
        &self.degraded
    }

    fn market_section(&self, section: &str) -> Value {
        self.payloads
            .get(&SourceRole::MarketData)
            .and_then(|market| market.get(section))
            .cloned()
            .unwrap_or_else(degraded_payload)
    }

    /// Payload a category's prompt is built from
    ///
    /// Risk assessment sees every payload, keyed by source role.
    pub fn input_for(&self, category: Category) -> Value {
        match category {
            Category::Fundamentals => self.market_section("fundamentals"),
            Category::Technicals => self.market_section("technicals"),
            Category::AnalystConsensus => self.get(SourceRole::AnalystData),
            Category::InsiderActivity => self.get(SourceRole::InsiderActivity),
            Category::Sentiment => self.get(SourceRole::News),
            Category::SectorContext => self.get(SourceRole::SectorContext),
            Category::RiskAssessment => {
                let union: Map<String, Value> = SourceRole::ALL
                    .into_iter()
                    .map(|role| (role.as_str().to_string(), self.get(role)))
                    .collect();
                Value::Object(union)
            }
        }
    }
}

fn bullet_section(title: &str, items: &[String]) -> String {
    let mut section = format!("\n\n### {title}\n");
    for item in items {
        section.push_str(&format!("\n- {item}"));
    }
    section
}

/// Category-specific reply fields folded into the stored narrative
fn narrative_extras(category: Category, reply: &OracleReply) -> String {
    let mut extras = String::new();
    match category {
        Category::Technicals => {
            let support = reply.string_list("support_levels");
            if !support.is_empty() {
                extras.push_str(&bullet_section("Support Levels", &support));
            }
            let resistance = reply.string_list("resistance_levels");
            if !resistance.is_empty() {
                extras.push_str(&bullet_section("Resistance Levels", &resistance));
            }
            let entry = reply.string_list("entry_price");
            let stop = reply.string_list("stop_loss");
            if !entry.is_empty() || !stop.is_empty() {
                extras.push_str("\n\n### Trade Levels\n");
                if let Some(entry) = entry.first() {
                    extras.push_str(&format!("\n- **Entry:** {entry}"));
                }
                if let Some(stop) = stop.first() {
                    extras.push_str(&format!("\n- **Stop-loss:** {stop}"));
                }
            }
        }
        Category::RiskAssessment => {
            for (key, title) in [("bull_case", "Bull Case"), ("bear_case", "Bear Case")] {
                if let Some(case) = reply.text(key) {
                    extras.push_str(&format!("\n\n### {title}\n\n{case}"));
                }
            }
        }
        _ => {}
    }
    extras
}

/// Drives analysis runs against injected collaborators
pub struct AnalysisEngine {
    store: Arc<dyn Store>,
    sources: SourceSet,
    oracle: Arc<dyn Oracle>,
    router: MarketRouter,
    resolver: Arc<dyn SymbolResolver>,
    scoring: ScoringConfig,
    clock: Arc<dyn Clock>,
    reuse_unchanged_analyses: bool,
}

impl AnalysisEngine {
    pub fn builder() -> AnalysisEngineBuilder {
        AnalysisEngineBuilder::default()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Run one analysis, reporting progress through `progress`
    ///
    /// Fetch and oracle failures degrade the run; only an untracked ticker, a
    /// routing or resolution failure, or a store failure abort it. Either way
    /// exactly one `done` event is emitted.
    #[instrument(skip(self, progress), fields(symbol = %symbol))]
    pub async fn run(&self, symbol: &str, progress: &ProgressEmitter) -> Result<RunReport> {
        let symbol = normalize_symbol(symbol);
        let mut state = RunState::Resolving;
        match self.execute(&symbol, progress, &mut state).await {
            Ok(report) => {
                info!(
                    overall_score = report.synthesis.overall_score,
                    recommendation = %report.synthesis.recommendation,
                    degraded = report.degraded_sources.len(),
                    "Analysis complete"
                );
                progress.emit(Progress::complete(&symbol));
                Ok(report)
            }
            Err(err) => {
                let failed_in = state.fail();
                error!(%err, %failed_in, %state, "Analysis failed");
                progress.emit(Progress::failed(&symbol, &err));
                Err(err)
            }
        }
    }

    /// Spawn a run and observe it as a stream of progress events
    ///
    /// Must be called inside a tokio runtime.
    pub fn stream(self: Arc<Self>, symbol: impl Into<String>) -> ProgressStream {
        let symbol = symbol.into();
        let (emitter, rx) = ProgressEmitter::channel();
        let task = tokio::spawn(async move {
            // Outcome already reported through the terminal event
            let _ = self.run(&symbol, &emitter).await;
        });
        ProgressStream::new(rx, task)
    }

    /// Analyze several tickers one after another
    pub async fn refresh(&self, symbols: &[String], progress: &ProgressEmitter) -> Vec<(String, Result<RunReport>)> {
        let mut outcomes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let outcome = self.run(symbol, progress).await;
            outcomes.push((normalize_symbol(symbol), outcome));
        }
        outcomes
    }

    /// Analyze every tracked ticker
    pub async fn refresh_all(&self, progress: &ProgressEmitter) -> Result<Vec<(String, Result<RunReport>)>> {
        let symbols: Vec<String> = self
            .store
            .list_tickers()
            .await?
            .into_iter()
            .map(|t| t.symbol)
            .collect();
        info!(count = symbols.len(), "Refreshing all tickers");
        Ok(self.refresh(&symbols, progress).await)
    }

    async fn execute(&self, symbol: &str, progress: &ProgressEmitter, state: &mut RunState) -> Result<RunReport> {
        *state = RunState::Resolving;
        let ticker = self
            .store
            .get_ticker(symbol)
            .await?
            .ok_or_else(|| EngineError::NotFound(symbol.to_string()))?;
        let route = self.router.route(&ticker.market)?;
        let sources = self.sources.for_route(route)?;
        let trading_symbol = self.resolve(&ticker).await?;

        *state = RunState::Fetching;
        let payloads = self.fetch_all(&ticker, &trading_symbol, route, &sources, progress).await;

        let ctx = PromptContext {
            symbol: &trading_symbol,
            sector: ticker.sector.as_deref(),
            market: &ticker.market,
            currency: route.currency,
        };
        let mut signals = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            *state = RunState::Analyzing(category);
            signals.push(self.analyze(&ticker.symbol, category, &ctx, &payloads, progress).await?);
        }

        *state = RunState::Synthesizing;
        progress.emit(Progress::step(&ticker.symbol, SYNTHESIS_STEP));
        let synthesis = self.synthesize(&ticker.symbol, &ctx, &signals).await?;

        *state = RunState::Done;
        Ok(RunReport {
            symbol: ticker.symbol.clone(),
            trading_symbol,
            market: ticker.market.clone(),
            signals,
            synthesis,
            degraded_sources: payloads.degraded().to_vec(),
        })
    }

    /// Canonical trading symbol, resolving and recording it on first use
    async fn resolve(&self, ticker: &Ticker) -> Result<String> {
        if let Some(resolved) = &ticker.resolved_symbol {
            return Ok(resolved.clone());
        }

        let unresolved = || RoutingError::Unresolved {
            symbol: ticker.symbol.clone(),
            market: ticker.market.clone(),
        };
        let resolution = self
            .resolver
            .resolve(&ticker.symbol, &ticker.market)
            .await
            .map_err(|err| {
                warn!(%err, "Symbol lookup failed");
                unresolved()
            })?;

        match resolution {
            Resolution::Canonical(resolved) => {
                debug!(resolved = %resolved, "Resolved trading symbol");
                self.store.set_resolution(&ticker.symbol, &resolved).await?;
                Ok(resolved)
            }
            Resolution::Ambiguous(candidates) => Err(RoutingError::Ambiguous {
                symbol: ticker.symbol.clone(),
                market: ticker.market.clone(),
                candidates,
            }
            .into()),
            Resolution::NotFound => Err(unresolved().into()),
        }
    }

    async fn fetch_all(
        &self,
        ticker: &Ticker,
        trading_symbol: &str,
        route: &MarketRoute,
        sources: &RoutedSources,
        progress: &ProgressEmitter,
    ) -> FetchedPayloads {
        let request = SourceRequest::new(trading_symbol, ticker.sector.as_deref(), route);
        let mut payloads = FetchedPayloads::default();
        for (role, source) in sources.iter() {
            progress.emit(Progress::step(&ticker.symbol, role.step()));
            match source.fetch(&request).await {
                Ok(payload) => {
                    debug!(role = %role, source = source.name(), "Fetched payload");
                    payloads.insert(role, payload);
                }
                Err(err) => {
                    warn!(role = %role, source = source.name(), %err, "Source failed, continuing with empty payload");
                    payloads.mark_degraded(role);
                }
            }
        }
        payloads
    }

    async fn analyze(
        &self,
        symbol: &str,
        category: Category,
        ctx: &PromptContext<'_>,
        payloads: &FetchedPayloads,
        progress: &ProgressEmitter,
    ) -> Result<SignalResult> {
        let input = payloads.input_for(category);
        let hash = input_hash(&input);

        let reused = if self.reuse_unchanged_analyses {
            self.store.find_signal(symbol, category, &hash).await?
        } else {
            None
        };

        let (validated, fallback) = if let Some(previous) = reused {
            progress.emit(
                Progress::step(symbol, format!("Using cached {}...", category.label())).with_category(category),
            );
            debug!(category = %category, "Input unchanged, reusing previous analysis");
            let validated = ValidatedSignal {
                score: previous.score,
                confidence: previous.confidence,
                narrative: previous.narrative,
                warnings: Vec::new(),
            };
            (validated, false)
        } else {
            progress.emit(Progress::step(symbol, format!("Analyzing {}...", category.label())).with_category(category));
            match self.oracle.evaluate(&category_prompt(category, ctx, &input)).await {
                Ok(reply) => {
                    let mut validated = validate_reply(&reply);
                    validated.narrative.push_str(&narrative_extras(category, &reply));
                    (validated, false)
                }
                Err(err) => {
                    warn!(category = %category, oracle = self.oracle.name(), %err, "Oracle failed, using neutral result");
                    (fallback_signal(), true)
                }
            }
        };

        let signal = SignalResult {
            symbol: symbol.to_string(),
            category,
            score: validated.score,
            confidence: validated.confidence,
            narrative: validated.narrative,
            raw_data: input,
            input_hash: hash,
            fallback,
            created_at: self.clock.now(),
        };
        self.store.save_signal(&signal).await?;
        Ok(signal)
    }

    async fn synthesize(&self, symbol: &str, ctx: &PromptContext<'_>, signals: &[SignalResult]) -> Result<Synthesis> {
        let signal_scores: BTreeMap<Category, f64> = signals.iter().map(|s| (s.category, s.score)).collect();
        let (weighted, warning) = clamp_score(self.scoring.weighted_score(&signal_scores));
        if let Some(warning) = warning {
            warn!(%warning, "Corrected weighted score");
        }

        let (overall_score, recommendation, narrative) = match self.oracle.evaluate(&synthesis_prompt(ctx, signals)).await
        {
            Ok(reply) => {
                let overall_score = match reply.number("overall_score") {
                    Some(raw) => {
                        let (score, warning) = clamp_score(raw);
                        if let Some(warning) = warning {
                            warn!(%warning, "Corrected synthesis score");
                        }
                        score
                    }
                    None => {
                        debug!(weighted, "Synthesis gave no score, using weighted score");
                        weighted
                    }
                };
                let recommendation = reply
                    .text("recommendation")
                    .and_then(|r| r.parse().ok())
                    .unwrap_or_else(|| self.scoring.recommend(overall_score));

                let mut narrative = reply
                    .narrative()
                    .map_or_else(|| UNAVAILABLE_NARRATIVE.to_string(), str::to_string);
                if let Some(entry) = reply.text("entry_strategy") {
                    narrative.push_str("\n\n## Entry Strategy\n\n");
                    narrative.push_str(entry);
                }
                (overall_score, recommendation, narrative)
            }
            Err(err) => {
                warn!(oracle = self.oracle.name(), %err, "Synthesis failed, using weighted score");
                (weighted, self.scoring.recommend(weighted), UNAVAILABLE_NARRATIVE.to_string())
            }
        };

        let synthesis = Synthesis {
            symbol: symbol.to_string(),
            overall_score,
            recommendation,
            narrative,
            signal_scores,
            created_at: self.clock.now(),
        };
        self.store.save_synthesis(&synthesis).await?;
        Ok(synthesis)
    }
}

/// Builder for [`AnalysisEngine`]
///
/// Store, sources and oracle are required. The router defaults to the US and
/// UK routes, the resolver to a pass-through [`StaticResolver`].
pub struct AnalysisEngineBuilder {
    store: Option<Arc<dyn Store>>,
    sources: Option<SourceSet>,
    oracle: Option<Arc<dyn Oracle>>,
    router: MarketRouter,
    resolver: Arc<dyn SymbolResolver>,
    scoring: ScoringConfig,
    clock: Arc<dyn Clock>,
    reuse_unchanged_analyses: bool,
}

impl Default for AnalysisEngineBuilder {
    fn default() -> Self {
        Self {
            store: None,
            sources: None,
            oracle: None,
            router: MarketRouter::new(),
            resolver: Arc::new(StaticResolver::new()),
            scoring: ScoringConfig::default(),
            clock: Arc::new(SystemClock),
            reuse_unchanged_analyses: true,
        }
    }
}

impl AnalysisEngineBuilder {
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sources(mut self, sources: SourceSet) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn Oracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn router(mut self, router: MarketRouter) -> Self {
        self.router = router;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn SymbolResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Reuse stored results for categories whose input did not change
    pub fn reuse_unchanged_analyses(mut self, reuse: bool) -> Self {
        self.reuse_unchanged_analyses = reuse;
        self
    }

    pub fn build(self) -> std::result::Result<AnalysisEngine, ConfigError> {
        self.scoring.validate()?;
        Ok(AnalysisEngine {
            store: self.store.ok_or_else(|| ConfigError::Missing("store".to_string()))?,
            sources: self.sources.ok_or_else(|| ConfigError::Missing("data sources".to_string()))?,
            oracle: self.oracle.ok_or_else(|| ConfigError::Missing("oracle".to_string()))?,
            router: self.router,
            resolver: self.resolver,
            scoring: self.scoring,
            clock: self.clock,
            reuse_unchanged_analyses: self.reuse_unchanged_analyses,
        })
    }
}
