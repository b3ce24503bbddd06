//! chesslens: live UCI engine analysis from the command line.
//!
//! `analyze` runs one position to completion and prints the result.
//! `follow` reads positions from stdin, one per line, and streams every
//! analysis update as the engine deepens.

mod config;
mod render;

use std::path::{Path, PathBuf};
use std::time::Duration;

use analysis::{
    spawn_coordinator, AnalysisConfig, AnalysisEvent, AnalysisHandle, AnalysisSnapshot,
    CoordinatorConfig, EnginePhase, SearchLimit,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use engine::{StockfishConfig, StockfishEngine};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "chesslens", about = "Live UCI engine analysis")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine executable. Defaults to `CHESSLENS_ENGINE_PATH`, then a search
    /// of common install locations.
    #[arg(long, global = true)]
    engine: Option<PathBuf>,

    #[arg(long, global = true)]
    threads: Option<u32>,

    /// Hash table size in MB.
    #[arg(long, global = true)]
    hash: Option<u32>,

    /// Number of ranked lines to track (1-5).
    #[arg(long, global = true)]
    multi_pv: Option<u8>,

    /// Print snapshots as JSON, one per line.
    #[arg(long, global = true)]
    json: bool,

    /// Write logs to a daily rolling file in this directory instead of stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a single position and print the final result.
    Analyze {
        /// FEN of the position, or `startpos`.
        #[arg(long, default_value = "startpos")]
        fen: String,

        /// Coordinate moves played from the FEN, e.g. `e2e4 e7e5`.
        #[arg(long, num_args = 0..)]
        moves: Vec<String>,

        #[arg(long, conflicts_with = "movetime")]
        depth: Option<u32>,

        /// Search time in milliseconds.
        #[arg(long)]
        movetime: Option<u64>,

        /// Wall-clock budget when neither depth nor movetime is given.
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Read positions from stdin (`<fen>`, `<fen> moves ...` or
    /// `startpos moves ...`) and stream analysis updates.
    Follow {
        /// Stop each search at this depth instead of running until the next
        /// position arrives.
        #[arg(long)]
        depth: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(config::get_log_dir(cli.log_dir.clone()).as_deref())?;
    tracing::info!("chesslens starting up");

    let mut coordinator_config = CoordinatorConfig::from_env();
    if let Some(multi_pv) = cli.multi_pv {
        coordinator_config.analysis =
            AnalysisConfig::new(multi_pv, coordinator_config.analysis.search);
    }

    let engine = StockfishEngine::new(StockfishConfig {
        path: cli.engine.clone(),
        threads: cli.threads,
        hash_mb: cli.hash,
        label: Some("chesslens".to_string()),
    });

    match cli.command {
        Commands::Analyze {
            fen,
            moves,
            depth,
            movetime,
            seconds,
        } => {
            let (search, budget) = match (depth, movetime) {
                (Some(depth), _) => (SearchLimit::Depth(depth), None),
                (None, Some(ms)) => (SearchLimit::MoveTime(ms), None),
                (None, None) => (
                    SearchLimit::Infinite,
                    Some(Duration::from_secs(config::get_analysis_secs(seconds))),
                ),
            };
            coordinator_config.analysis.search = search;
            let handle = start(engine, coordinator_config).await?;
            let result = run_analyze(&handle, fen, moves, budget, cli.json).await;
            handle.shutdown().await;
            result
        }
        Commands::Follow { depth } => {
            if let Some(depth) = depth {
                coordinator_config.analysis.search = SearchLimit::Depth(depth);
            }
            let handle = start(engine, coordinator_config).await?;
            let result = run_follow(&handle, cli.json).await;
            handle.shutdown().await;
            result
        }
    }
}

fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let file_appender = tracing_appender::rolling::daily(dir, config::LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true)
                        .with_line_number(true),
                )
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

async fn start(engine: StockfishEngine, config: CoordinatorConfig) -> Result<AnalysisHandle> {
    let handle = spawn_coordinator(Box::new(engine), config);
    handle
        .initialize()
        .await
        .context("failed to start the engine")?;
    Ok(handle)
}

async fn run_analyze(
    handle: &AnalysisHandle,
    fen: String,
    moves: Vec<String>,
    budget: Option<Duration>,
    json: bool,
) -> Result<()> {
    let (_, mut events) = handle.subscribe().await?;
    handle.analyze(fen, moves).await?;

    let stop_at = budget.map(|budget| Instant::now() + budget);
    let mut stop_sent = false;
    loop {
        let stop_timer = sleep_until(stop_at.filter(|_| !stop_sent));
        tokio::select! {
            event = events.recv() => {
                let snapshot = match event {
                    Ok(AnalysisEvent::StateChanged(snapshot)) => snapshot,
                    Ok(AnalysisEvent::Error(e)) => {
                        tracing::warn!("{}", e);
                        continue;
                    }
                    Ok(AnalysisEvent::UciMessage(_)) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Skipped {} events", skipped);
                        handle.snapshot().await?
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        bail!("analysis ended unexpectedly")
                    }
                };
                if let EnginePhase::Failed { reason } = &snapshot.phase {
                    bail!("engine failed: {}", reason);
                }
                if snapshot.session.as_ref().is_some_and(|s| s.concluded) {
                    print_snapshot(&snapshot, json)?;
                    return Ok(());
                }
            }
            _ = stop_timer => {
                tracing::info!("Time budget spent, stopping search");
                handle.stop().await?;
                stop_sent = true;
            }
        }
    }
}

async fn run_follow(handle: &AnalysisHandle, json: bool) -> Result<()> {
    let (_, mut events) = handle.subscribe().await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    tracing::info!("stdin closed");
                    break;
                };
                let Some((fen, moves)) = parse_position_line(&line) else {
                    continue;
                };
                if let Err(e) = handle.analyze(fen, moves).await {
                    eprintln!("rejected: {}", e);
                }
            }
            event = events.recv() => match event {
                Ok(AnalysisEvent::StateChanged(snapshot)) => print_snapshot(&snapshot, json)?,
                Ok(AnalysisEvent::Error(e)) => tracing::warn!("{}", e),
                Ok(AnalysisEvent::UciMessage(_)) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn print_snapshot(snapshot: &AnalysisSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        println!("{}\n", render::render_text(snapshot));
    }
    Ok(())
}

/// Split an input line into a FEN (or `startpos`) and trailing moves.
/// Blank lines and `#` comments yield `None`.
fn parse_position_line(line: &str) -> Option<(String, Vec<String>)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let split = tokens.iter().position(|t| *t == "moves");
    let (head, tail) = match split {
        Some(at) => (&tokens[..at], &tokens[at + 1..]),
        None => (&tokens[..], &[][..]),
    };

    let head = match head {
        ["position", rest @ ..] => rest,
        other => other,
    };
    let fen = match head {
        ["startpos"] | [] => "startpos".to_string(),
        ["fen", rest @ ..] => rest.join(" "),
        rest => rest.join(" "),
    };
    Some((fen, tail.iter().map(|m| m.to_string()).collect()))
}
