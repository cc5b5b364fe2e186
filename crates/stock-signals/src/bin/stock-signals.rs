//! Command-line front end for the signal engine
//!
//! # Usage
//!
//! ```bash
//! export FMP_API_KEY=...
//! export FINNHUB_API_KEY=...
//!
//! stock-signals add AAPL "Apple Inc." --sector Technology
//! stock-signals add HSBC "HSBC Holdings" --market UK
//! stock-signals analyze AAPL
//! stock-signals dashboard
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use signal_utils::{AppSettings, init_tracing};
use stock_signals::resolver::YahooSearchDirectory;
use stock_signals::sources::fmp::FmpClient;
use stock_signals::{
    AnalysisEngine, DirectoryResolver, DomainRateLimiter, FetchCache, Fetcher, Market, NewTicker, OracleBackend,
    ProgressEmitter, SignalConfig, SourceSet, SqliteStore, Store, WeightPreset,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "stock-signals")]
#[command(about = "Multi-source buy/hold/sell signals for tracked tickers", long_about = None)]
struct Cli {
    /// SQLite database file (overrides STOCK_SIGNALS_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Oracle backend: claude, codex, opencode or anthropic (overrides STOCK_SIGNALS_ORACLE)
    #[arg(long, global = true)]
    oracle: Option<OracleBackend>,

    /// Category weight preset (overrides STOCK_SIGNALS_WEIGHTS)
    #[arg(long, global = true)]
    weights: Option<WeightPreset>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking a ticker
    Add {
        symbol: String,
        name: String,
        #[arg(long)]
        sector: Option<String>,
        /// Listing market (US, UK)
        #[arg(long, default_value = "US")]
        market: String,
    },
    /// Stop tracking a ticker and delete its history
    Remove { symbol: String },
    /// List tracked tickers
    List,
    /// Run a full analysis for one ticker
    Analyze { symbol: String },
    /// Analyze several tickers in turn, or every tracked ticker
    Refresh { symbols: Vec<String> },
    /// Show stored signals for a ticker
    History {
        symbol: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Latest recommendation for every tracked ticker
    Dashboard,
    /// Delete expired fetch cache entries
    PurgeCache,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = AppSettings::from_env()?;
    init_tracing(settings.log_format);

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let store = Arc::new(
        SqliteStore::open(&config.db_path).with_context(|| format!("opening {}", config.db_path.display()))?,
    );

    match cli.command {
        Commands::Add {
            symbol,
            name,
            sector,
            market,
        } => {
            let mut ticker = NewTicker::new(symbol, name).with_market(Market::from(market));
            if let Some(sector) = sector {
                ticker = ticker.with_sector(sector);
            }
            if store.add_ticker(&ticker).await? {
                println!("Tracking {} ({})", ticker.symbol, ticker.market);
            } else {
                println!("{} is already tracked", ticker.symbol);
            }
        }
        Commands::Remove { symbol } => {
            if store.remove_ticker(&symbol).await? {
                println!("Removed {symbol}");
            } else {
                println!("{symbol} is not tracked");
            }
        }
        Commands::List => {
            for ticker in store.list_tickers().await? {
                println!(
                    "{:<8} {:<4} {:<32} {}",
                    ticker.symbol,
                    ticker.market,
                    ticker.name,
                    ticker.sector.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Analyze { symbol } => {
            let engine = Arc::new(build_engine(&config, &store)?);
            let mut events = engine.stream(symbol);
            let mut failed = false;
            while let Some(event) = events.next().await {
                println!("[{}] {}", event.symbol, event.step);
                failed |= event.is_error();
            }
            if failed {
                anyhow::bail!("analysis failed");
            }
        }
        Commands::Refresh { symbols } => {
            let engine = build_engine(&config, &store)?;
            let (progress, mut rx) = ProgressEmitter::channel();
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    println!("[{}] {}", event.symbol, event.step);
                }
            });

            let outcomes = if symbols.is_empty() {
                engine.refresh_all(&progress).await?
            } else {
                engine.refresh(&symbols, &progress).await
            };
            drop(progress);
            printer.await?;

            let failures = outcomes.iter().filter(|(_, outcome)| outcome.is_err()).count();
            info!(total = outcomes.len(), failures, "Refresh finished");
            for (symbol, outcome) in &outcomes {
                match outcome {
                    Ok(report) => println!(
                        "{symbol}: {:+.2} {}",
                        report.synthesis.overall_score, report.synthesis.recommendation
                    ),
                    Err(e) => println!("{symbol}: {e}"),
                }
            }
        }
        Commands::History { symbol, limit } => {
            for signal in store.signal_history(&symbol, limit).await? {
                println!(
                    "{}  {:<12} {:+6.2}  {:<6}{}",
                    signal.created_at.format("%Y-%m-%d %H:%M"),
                    signal.category,
                    signal.score,
                    signal.confidence,
                    if signal.fallback { "  (fallback)" } else { "" }
                );
            }
            for synthesis in store.synthesis_history(&symbol, limit).await? {
                println!(
                    "{}  {:<12} {:+6.2}  {}",
                    synthesis.created_at.format("%Y-%m-%d %H:%M"),
                    "overall",
                    synthesis.overall_score,
                    synthesis.recommendation
                );
            }
        }
        Commands::Dashboard => {
            for row in store.dashboard().await? {
                match row.latest {
                    Some(latest) => println!(
                        "{:<8} {:+6.2}  {:<5} {}",
                        row.ticker.symbol,
                        latest.overall_score,
                        latest.recommendation,
                        latest.created_at.format("%Y-%m-%d %H:%M")
                    ),
                    None => println!("{:<8} {:>6}  -", row.ticker.symbol, "-"),
                }
            }
        }
        Commands::PurgeCache => {
            let purged = store.purge_expired().await?;
            println!("Purged {purged} expired cache entries");
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<SignalConfig> {
    let mut config = SignalConfig::from_env()?;
    if let Some(db) = &cli.db {
        config.db_path.clone_from(db);
    }
    if let Some(oracle) = &cli.oracle {
        config.oracle = *oracle;
    }
    if let Some(preset) = cli.weights {
        config.scoring.weights = preset.weights();
    }
    config.validate()?;
    Ok(config)
}

fn build_engine(config: &SignalConfig, store: &Arc<SqliteStore>) -> anyhow::Result<AnalysisEngine> {
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .user_agent(config.user_agent.clone())
        .build()?;

    let cache: Arc<dyn FetchCache> = store.clone();
    let fetcher = Fetcher::new(cache, Arc::new(DomainRateLimiter::new(config.rate_limit_interval)), http)
        .with_default_ttl(config.cache_ttl)
        .with_ttl_overrides(config.cache_ttl_overrides.clone());

    let fmp = FmpClient::from_key(fetcher.clone(), config.fmp_api_key.clone());
    let sources = SourceSet::live(fetcher.clone(), fmp, config.finnhub_api_key.clone());
    let resolver = DirectoryResolver::new(Arc::new(YahooSearchDirectory::new(fetcher)));

    let engine = AnalysisEngine::builder()
        .store(store.clone())
        .sources(sources)
        .oracle(config.build_oracle()?)
        .resolver(Arc::new(resolver))
        .scoring(config.scoring.clone())
        .reuse_unchanged_analyses(config.reuse_unchanged_analyses)
        .build()?;
    Ok(engine)
}
