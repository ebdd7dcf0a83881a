use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use leverage_backtester::backtest::{Orchestrator, SignalSuite};
use leverage_backtester::config::{BatchConfig, StrategyConfig};
use leverage_backtester::data::ReplayHistoryProvider;
use leverage_backtester::models::{AnalysisTask, Timeframe};
use leverage_backtester::signals::{
    DrawdownCorrelationProvider, MomentumBreakoutPredictor, SwingLevelProvider,
    WindowContextProvider,
};
use leverage_backtester::store::ResultStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = BatchConfig::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    // CLI: [instruments] [timeframes] [strategies], each comma-separated
    let args: Vec<String> = std::env::args().collect();

    let instruments: Vec<String> = args
        .get(1)
        .map(|s| s.split(',').map(str::to_string).collect())
        .unwrap_or_else(|| vec!["BTC-USD".to_string()]);

    let timeframes: Vec<Timeframe> = args
        .get(2)
        .map(|s| s.split(',').filter_map(Timeframe::from_str_loose).collect())
        .unwrap_or_else(|| vec![Timeframe::H1]);

    let strategies: Vec<String> = args
        .get(3)
        .map(|s| s.split(',').map(str::to_string).collect())
        .unwrap_or_else(|| vec!["balanced".to_string()]);

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║           LEVERAGE BACKTESTER — BATCH RUN                ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║  Instruments: {:<42} ║", instruments.join(", "));
    println!(
        "║  Timeframes:  {:<42} ║",
        timeframes
            .iter()
            .map(|tf| tf.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("║  Strategies:  {:<42} ║", strategies.join(", "));
    println!("║  Workers:     {:<42} ║", cfg.workers);
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let mut history = ReplayHistoryProvider::new();
    history.load_cached_dir(&cfg.data_dir, &instruments, &timeframes)?;

    let signals = SignalSuite {
        levels: Arc::new(SwingLevelProvider::new()),
        breakout: Some(Arc::new(MomentumBreakoutPredictor::new())),
        correlation: Arc::new(DrawdownCorrelationProvider::new()),
        context: Arc::new(WindowContextProvider::new()),
    };

    let store = Arc::new(ResultStore::open(&cfg.store_path)?);

    let mut tasks = Vec::new();
    for instrument in &instruments {
        for &tf in &timeframes {
            for strategy in &strategies {
                tasks.push(AnalysisTask::new(instrument.clone(), tf, strategy.clone()));
            }
        }
    }

    let orchestrator = Orchestrator::new(
        cfg,
        StrategyConfig::presets(),
        Arc::new(history),
        signals,
        Arc::clone(&store),
    );

    // Ctrl-C stops the batch cleanly; claims are released.
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let report = orchestrator.run_batch(tasks).await;
    report.print_summary();

    let top = store.list_by_sharpe(5).await?;
    if !top.is_empty() {
        println!("\n  TOP RESULTS BY SHARPE");
        println!("  ───────────────────────────────────");
        for r in top {
            println!(
                "  {}/{}/{}  sharpe {:+.2}  return {:+.1}%",
                r.instrument, r.timeframe, r.strategy, r.metrics.sharpe_ratio, r.metrics.total_return,
            );
        }
    }

    Ok(())
}
