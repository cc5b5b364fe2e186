//! End-to-end runs of the analysis engine against in-process fakes
//!
//! Store, sources, oracle, resolver and clock are all fakes, so these tests
//! exercise routing, degradation, validation and persistence without touching
//! the network.

mod common;

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use common::{Harness, RecordingSource, ScriptedOracle, Sources};
use stock_signals::engine::analysis_engine::SYNTHESIS_STEP;
use stock_signals::validation::UNAVAILABLE_NARRATIVE;
use stock_signals::{
    AnalysisEngine, Category, Confidence, ConfigError, EngineError, Market, NewTicker, Progress, ProgressEmitter,
    Recommendation, Resolution, RoutingError, ScoringConfig, SourceRole, StaticResolver, Store,
};

fn drain(rx: &mut UnboundedReceiver<Progress>) -> Vec<Progress> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn assert_single_terminal(events: &[Progress]) {
    assert_eq!(events.iter().filter(|e| e.done).count(), 1, "events: {events:?}");
    assert!(events.last().is_some_and(|e| e.done));
}

// ============================================================================
// Complete runs
// ============================================================================

#[tokio::test]
async fn test_us_run_persists_every_category_and_a_synthesis() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::new());
    harness
        .track(NewTicker::new("aapl", "Apple Inc.").with_sector("Technology"))
        .await;
    let engine = harness.engine();
    let (progress, mut rx) = ProgressEmitter::channel();

    let report = tokio_test::assert_ok!(engine.run("AAPL", &progress).await);

    let categories: Vec<Category> = report.signals.iter().map(|s| s.category).collect();
    assert_eq!(categories, Category::ALL.to_vec());
    assert!(!report.is_degraded());
    assert_eq!(report.market, Market::Us);
    assert_eq!(harness.store.signal_count().await, 7);
    assert_eq!(harness.store.synthesis_count().await, 1);

    assert_eq!(report.synthesis.overall_score, 4.5);
    assert_eq!(report.synthesis.recommendation, Recommendation::Buy);
    assert!(report.synthesis.narrative.contains("## Entry Strategy\n\nScale in below 180."));
    assert_eq!(report.synthesis.signal_scores.len(), 7);
    assert_eq!(report.synthesis.signal_scores[&Category::Technicals], 4.0);

    assert_eq!(harness.sources.sec_form4.calls(), 1);
    assert_eq!(harness.sources.us_sector.calls(), 1);
    assert_eq!(harness.sources.rns.calls(), 0);
    assert_eq!(harness.sources.uk_sector.calls(), 0);

    let events = drain(&mut rx);
    assert_single_terminal(&events);
    let steps: Vec<&str> = events.iter().map(|e| e.step.as_str()).collect();
    assert_eq!(steps.first(), Some(&"Fetching market data..."));
    assert!(steps.contains(&"Scraping insider data..."));
    assert!(steps.contains(&"Analyzing analyst consensus..."));
    assert_eq!(steps[steps.len() - 2], SYNTHESIS_STEP);
    assert_eq!(steps.last(), Some(&"Complete"));
}

#[tokio::test]
async fn test_category_inputs_come_from_their_sources() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::new());
    harness.track(NewTicker::new("AAPL", "Apple Inc.")).await;

    let report = harness.engine().run("AAPL", &ProgressEmitter::none()).await.unwrap();

    let technicals = report.signal(Category::Technicals).unwrap();
    assert_eq!(technicals.raw_data, json!({"rsi_14": 55.1, "sma_50": 182.3}));
    let analyst = report.signal(Category::AnalystConsensus).unwrap();
    assert_eq!(analyst.raw_data["consensus"], "buy");

    let risk = report.signal(Category::RiskAssessment).unwrap();
    for role in SourceRole::ALL {
        assert!(risk.raw_data.get(role.as_str()).is_some(), "risk input lacks {role}");
    }
    assert_eq!(risk.input_hash.len(), 64);
}

#[tokio::test]
async fn test_stream_ends_with_one_done_event() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::new());
    harness.track(NewTicker::new("MSFT", "Microsoft")).await;
    let engine = Arc::new(harness.engine());

    let events: Vec<Progress> = engine.stream("MSFT").collect().await;

    assert_single_terminal(&events);
    assert!(!events.iter().any(Progress::is_error));
    let analyzing = events.iter().filter(|e| e.category.is_some()).count();
    assert_eq!(analyzing, 7);
    assert_eq!(harness.store.synthesis_count().await, 1);
}

// ============================================================================
// Degraded runs
// ============================================================================

#[tokio::test]
async fn test_failed_insider_source_degrades_to_empty_payload() {
    let sources = Sources::healthy().with_sec_form4(RecordingSource::failing("sec_form4"));
    let harness = Harness::new(sources, ScriptedOracle::new());
    harness.track(NewTicker::new("AAPL", "Apple Inc.")).await;

    let report = harness.engine().run("AAPL", &ProgressEmitter::none()).await.unwrap();

    assert_eq!(report.degraded_sources, vec![SourceRole::InsiderActivity]);
    assert_eq!(report.signals.len(), 7);
    let insider = report.signal(Category::InsiderActivity).unwrap();
    assert_eq!(insider.raw_data, json!({}));
    assert!(!insider.fallback);
    let risk = report.signal(Category::RiskAssessment).unwrap();
    assert_eq!(risk.raw_data["insider_activity"], json!({}));
    assert_eq!(harness.store.synthesis_count().await, 1);
}

#[tokio::test]
async fn test_unreachable_oracle_yields_neutral_results() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::unavailable());
    harness.track(NewTicker::new("AAPL", "Apple Inc.")).await;
    let (progress, mut rx) = ProgressEmitter::channel();

    let report = harness.engine().run("AAPL", &progress).await.unwrap();

    for signal in &report.signals {
        assert_eq!(signal.score, 0.0);
        assert_eq!(signal.confidence, Confidence::Low);
        assert_eq!(signal.narrative, UNAVAILABLE_NARRATIVE);
        assert!(signal.fallback);
    }
    assert_eq!(report.synthesis.overall_score, 0.0);
    assert_eq!(report.synthesis.recommendation, Recommendation::Hold);
    assert_eq!(report.synthesis.narrative, UNAVAILABLE_NARRATIVE);

    let events = drain(&mut rx);
    assert_single_terminal(&events);
    assert!(!events.iter().any(Progress::is_error));
}

#[tokio::test]
async fn test_out_of_range_replies_are_corrected() {
    let oracle = ScriptedOracle::new()
        .with_reply(
            Category::Technicals,
            json!({
                "score": 50,
                "confidence": "HIGH",
                "narrative": "Breakout.",
                "support_levels": ["171.20", "165.00"],
                "entry_price": "176.50",
                "stop_loss": "168.00",
            }),
        )
        .with_reply(
            Category::RiskAssessment,
            json!({"score": -99, "confidence": "medium", "narrative": "Crowded.", "bear_case": "Multiple compression."}),
        )
        .with_reply(Category::Sentiment, json!({"score": 2, "confidence": "maybe", "narrative": "Mixed."}));
    let harness = Harness::new(Sources::healthy(), oracle);
    harness.track(NewTicker::new("AAPL", "Apple Inc.")).await;

    let report = harness.engine().run("AAPL", &ProgressEmitter::none()).await.unwrap();

    let technicals = report.signal(Category::Technicals).unwrap();
    assert_eq!(technicals.score, 10.0);
    assert_eq!(technicals.confidence, Confidence::High);
    assert!(technicals.narrative.contains("### Support Levels"));
    assert!(technicals.narrative.contains("- **Entry:** 176.50"));
    assert!(technicals.narrative.contains("- **Stop-loss:** 168.00"));

    let risk = report.signal(Category::RiskAssessment).unwrap();
    assert_eq!(risk.score, -10.0);
    assert!(risk.narrative.contains("### Bear Case\n\nMultiple compression."));

    assert_eq!(report.signal(Category::Sentiment).unwrap().confidence, Confidence::Low);
}

#[tokio::test]
async fn test_synthesis_without_score_uses_weighted_score() {
    let oracle = ScriptedOracle::new().with_synthesis(json!({"narrative": "No number this time."}));
    let harness = Harness::new(Sources::healthy(), oracle);
    harness.track(NewTicker::new("AAPL", "Apple Inc.")).await;

    let report = harness.engine().run("AAPL", &ProgressEmitter::none()).await.unwrap();

    assert!((report.synthesis.overall_score - 4.0).abs() < 0.01);
    assert_eq!(report.synthesis.recommendation, Recommendation::Buy);
    assert_eq!(report.synthesis.narrative, "No number this time.");
}

#[tokio::test]
async fn test_weighted_fallback_stays_in_range_under_extreme_weights() {
    let oracle = ScriptedOracle::new()
        .with_reply(Category::Technicals, json!({"score": 50, "confidence": "high", "narrative": "Breakout."}))
        .with_synthesis(json!({"narrative": "No number this time."}));
    let harness = Harness::new(Sources::healthy(), oracle);
    harness.track(NewTicker::new("AAPL", "Apple Inc.")).await;

    let all_on_technicals = ScoringConfig {
        weights: [(Category::Technicals, 1.0)].into_iter().collect(),
        default_weight: 0.0,
        ..ScoringConfig::default()
    };
    let engine = AnalysisEngine::builder()
        .store(harness.store.clone())
        .sources(harness.sources.set())
        .oracle(harness.oracle.clone())
        .clock(harness.clock.clone())
        .scoring(all_on_technicals)
        .build()
        .unwrap();

    let report = engine.run("AAPL", &ProgressEmitter::none()).await.unwrap();

    assert_eq!(report.synthesis.overall_score, 10.0);
    assert_eq!(report.synthesis.recommendation, Recommendation::Buy);
    let stored = harness.store.latest_synthesis("AAPL").await.unwrap().unwrap();
    assert!((-10.0..=10.0).contains(&stored.overall_score));
}

#[tokio::test]
async fn test_builder_rejects_unbalanced_weights() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::new());
    let skewed = ScoringConfig {
        weights: [(Category::Fundamentals, 1.0), (Category::Technicals, -0.9)].into_iter().collect(),
        ..ScoringConfig::default()
    };

    let err = AnalysisEngine::builder()
        .store(harness.store.clone())
        .sources(harness.sources.set())
        .oracle(harness.oracle.clone())
        .scoring(skewed)
        .build()
        .err();

    assert!(matches!(err, Some(ConfigError::Invalid { ref name, .. }) if name == "weights"));
}

// ============================================================================
// Routing and resolution
// ============================================================================

#[tokio::test]
async fn test_unknown_market_fails_before_any_fetch() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::new());
    harness.track(NewTicker::new("7203", "Toyota").with_market("JP")).await;
    let (progress, mut rx) = ProgressEmitter::channel();

    let err = harness.engine().run("7203", &progress).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::Routing(RoutingError::UnknownMarket(Market::Other(ref code))) if code == "JP"
    ));
    assert_eq!(harness.sources.total_calls(), 0);
    assert_eq!(harness.oracle.prompt_count().await, 0);
    assert_eq!(harness.store.signal_count().await, 0);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(events[0].is_error());
}

#[tokio::test]
async fn test_uk_ticker_resolves_and_uses_uk_sources() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::new());
    harness
        .track(
            NewTicker::new("HSBC", "HSBC Holdings")
                .with_market("UK")
                .with_sector("Financial Services"),
        )
        .await;
    let resolver = StaticResolver::new().with("HSBC", Market::Uk, Resolution::Canonical("HSBA.L".to_string()));

    let report = harness
        .engine_with(resolver, true)
        .run("HSBC", &ProgressEmitter::none())
        .await
        .unwrap();

    assert_eq!(report.trading_symbol, "HSBA.L");
    assert_eq!(harness.sources.rns.symbols().await, vec!["HSBA.L".to_string()]);
    assert_eq!(harness.sources.uk_sector.calls(), 1);
    assert_eq!(harness.sources.sec_form4.calls(), 0);
    assert_eq!(harness.sources.us_sector.calls(), 0);

    let stored = harness.store.get_ticker("HSBC").await.unwrap().unwrap();
    assert_eq!(stored.resolved_symbol.as_deref(), Some("HSBA.L"));
    assert_eq!(report.symbol, "HSBC");
}

#[tokio::test]
async fn test_stored_resolution_skips_the_resolver() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::new());
    harness.track(NewTicker::new("HSBC", "HSBC Holdings").with_market("UK")).await;
    harness.store.set_resolution("HSBC", "HSBA.L").await.unwrap();

    // A strict resolver would reject HSBC, so reaching DONE proves it was not asked
    let report = harness
        .engine_with(StaticResolver::new().strict(), true)
        .run("HSBC", &ProgressEmitter::none())
        .await
        .unwrap();

    assert_eq!(report.trading_symbol, "HSBA.L");
}

#[tokio::test]
async fn test_ambiguous_symbol_fails_without_guessing() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::new());
    harness.track(NewTicker::new("BP", "BP plc").with_market("UK")).await;
    let resolver = StaticResolver::new().with(
        "BP",
        Market::Uk,
        Resolution::Ambiguous(vec!["BP.L".to_string(), "BPA.L".to_string()]),
    );

    let err = harness
        .engine_with(resolver, true)
        .run("BP", &ProgressEmitter::none())
        .await
        .unwrap_err();

    match err {
        EngineError::Routing(RoutingError::Ambiguous { candidates, .. }) => {
            assert_eq!(candidates, vec!["BP.L".to_string(), "BPA.L".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.sources.total_calls(), 0);
    let stored = harness.store.get_ticker("BP").await.unwrap().unwrap();
    assert!(stored.resolved_symbol.is_none());
}

#[tokio::test]
async fn test_unlisted_symbol_is_unresolved() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::new());
    harness.track(NewTicker::new("NOPE", "Nobody").with_market("UK")).await;

    let err = harness
        .engine_with(StaticResolver::new().strict(), true)
        .run("NOPE", &ProgressEmitter::none())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Routing(RoutingError::Unresolved { .. })));
    assert_eq!(harness.sources.total_calls(), 0);
}

#[tokio::test]
async fn test_untracked_ticker_is_not_found() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::new());
    let (progress, mut rx) = ProgressEmitter::channel();

    let err = harness.engine().run("msft", &progress).await.unwrap_err();

    assert!(matches!(err, EngineError::NotFound(ref s) if s == "MSFT"));
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].step, "error: ticker MSFT is not tracked");
}

// ============================================================================
// Reuse and refresh
// ============================================================================

#[tokio::test]
async fn test_unchanged_inputs_reuse_previous_analyses() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::new());
    harness.track(NewTicker::new("AAPL", "Apple Inc.")).await;
    let engine = harness.engine();

    engine.run("AAPL", &ProgressEmitter::none()).await.unwrap();
    assert_eq!(harness.oracle.prompt_count().await, 8);

    harness.clock.advance(chrono::Duration::hours(1));
    let (progress, mut rx) = ProgressEmitter::channel();
    let second = engine.run("AAPL", &progress).await.unwrap();

    // Only the synthesis went back to the oracle
    assert_eq!(harness.oracle.prompt_count().await, 9);
    assert_eq!(harness.store.signal_count().await, 14);
    assert_eq!(second.signal(Category::Fundamentals).unwrap().score, 4.0);
    let steps: Vec<String> = drain(&mut rx).into_iter().map(|e| e.step).collect();
    assert!(steps.contains(&"Using cached fundamentals...".to_string()));
}

#[tokio::test]
async fn test_reuse_can_be_disabled() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::new());
    harness.track(NewTicker::new("AAPL", "Apple Inc.")).await;
    let engine = harness.engine_with(StaticResolver::new(), false);

    engine.run("AAPL", &ProgressEmitter::none()).await.unwrap();
    engine.run("AAPL", &ProgressEmitter::none()).await.unwrap();

    assert_eq!(harness.oracle.prompt_count().await, 16);
}

#[tokio::test]
async fn test_fallback_results_are_never_reused() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::unavailable());
    harness.track(NewTicker::new("AAPL", "Apple Inc.")).await;
    harness.engine().run("AAPL", &ProgressEmitter::none()).await.unwrap();

    let recovered = Harness {
        store: harness.store.clone(),
        sources: Sources::healthy(),
        oracle: Arc::new(ScriptedOracle::new()),
        clock: harness.clock.clone(),
    };
    let report = recovered.engine().run("AAPL", &ProgressEmitter::none()).await.unwrap();

    assert!(report.signals.iter().all(|s| !s.fallback && s.score == 4.0));
    assert_eq!(recovered.oracle.prompt_count().await, 8);
}

#[tokio::test]
async fn test_refresh_all_continues_past_failures() {
    let harness = Harness::new(Sources::healthy(), ScriptedOracle::new());
    harness.track(NewTicker::new("AAPL", "Apple Inc.")).await;
    harness.track(NewTicker::new("7203", "Toyota").with_market("JP")).await;
    harness.track(NewTicker::new("MSFT", "Microsoft")).await;
    let (progress, mut rx) = ProgressEmitter::channel();

    let outcomes = harness.engine().refresh_all(&progress).await.unwrap();

    assert_eq!(outcomes.len(), 3);
    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|(_, outcome)| outcome.is_err())
        .map(|(symbol, _)| symbol.as_str())
        .collect();
    assert_eq!(failed, vec!["7203"]);
    assert_eq!(harness.store.synthesis_count().await, 2);

    let done = drain(&mut rx).into_iter().filter(|e| e.done).count();
    assert_eq!(done, 3);

    let dashboard = harness.store.dashboard().await.unwrap();
    assert_eq!(dashboard.len(), 3);
    assert_eq!(dashboard.last().unwrap().ticker.symbol, "7203");
    assert!(dashboard.last().unwrap().latest.is_none());
}
