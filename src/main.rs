//! Confluence Engine - Main Entry Point
//!
//! Reads one JSON `MarketContext` per line from stdin and writes one JSON
//! `TradingDecision` per line to stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use confluence_engine::config::load_config;
use confluence_engine::{DecisionEngine, MarketContext};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "CONFLUENCE_CONFIG")]
    config: String,

    /// Log level (trace, debug, info, warn, error); defaults to settings.log_level
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Validate the configuration, print the detector registry and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let config = load_config(Some(&args.config))
        .with_context(|| format!("invalid configuration in {}", args.config))?;

    // Initialize logging
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    init_logging(&log_level, args.json_logs)?;

    info!("Starting confluence engine");
    info!("Configuration file: {}", args.config);

    let engine = DecisionEngine::new(config).context("failed to build decision engine")?;

    if args.check_config {
        println!("Configuration OK");
        for (position, name) in engine.pattern_names().iter().enumerate() {
            println!("  {:>2}. {}", position + 1, name);
        }
        return Ok(());
    }

    info!("Engine initialized, reading snapshots from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let ctx: MarketContext = match serde_json::from_str(&line) {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        warn!("Failed to parse snapshot: {}", e);
                        continue;
                    }
                };
                let decision = engine.decide(&ctx);
                println!("{}", serde_json::to_string(&decision)?);
            }
            _ = &mut shutdown => {
                info!("Received shutdown signal, cleaning up...");
                break;
            }
        }
    }

    let stats = engine.stats();
    info!(
        ticks = stats.ticks,
        trades = stats.trades,
        cache_hits = stats.cache.hits,
        cache_misses = stats.cache.misses,
        "Session summary"
    );
    if stats.latency.samples > 0 {
        info!("\n{}", stats.latency);
    }

    Ok(())
}

fn init_logging(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}
