mod input;

use anima_core::{AnimaConfig, MessageBus};
use anima_limbic::{EmotionEngine, EmotionSignalProvider, HeartbeatConfig};
use anima_memory::{JournalContinuity, SqliteDecisionJournal, SqliteStore};
use anima_reasoning::Orchestrator;
use anyhow::Context;
use clap::Parser;
use input::{parse_line, Command};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Reads requests from stdin, one per line, and writes one JSON outcome per
/// line to stdout. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "ANIMA_CONFIG", default_value = "anima.toml")]
    config: PathBuf,

    /// Path to the SQLite database (overrides the config)
    #[arg(short, long)]
    db: Option<String>,

    /// Keep everything in memory; nothing survives the process
    #[arg(long)]
    ephemeral: bool,

    /// Log as JSON lines
    #[arg(long, env = "ANIMA_LOG_JSON")]
    log_json: bool,

    /// Also write JSON logs to daily files in this directory
    #[arg(long, env = "ANIMA_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

fn init_tracing(json: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "anima.log"));
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(true);
    if json {
        Registry::default()
            .with(filter)
            .with(file_layer)
            .with(stderr.json())
            .init();
    } else {
        Registry::default()
            .with(filter)
            .with(file_layer)
            .with(stderr)
            .init();
    }
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_json, args.log_dir.as_deref());

    let mut config = AnimaConfig::load_or_default(&args.config);
    if let Some(db) = args.db {
        config.storage.db_path = db;
    }

    info!("Initializing anima...");

    let store = if args.ephemeral {
        Arc::new(SqliteStore::in_memory().await?)
    } else {
        info!("Connecting to SQLite at {}...", config.storage.db_path);
        Arc::new(SqliteStore::new(&config.storage.db_path).await?)
    };

    let shutdown = CancellationToken::new();

    // 1. Emotional state engine
    let engine = Arc::new(
        EmotionEngine::new(config.physics.clone(), HeartbeatConfig::from(&config.engine))
            .context("Invalid physics configuration")?
            .with_store(store.clone()),
    );
    if !engine.restore().await {
        info!("No usable saved state, starting from baseline");
    }
    let engine_task = engine.spawn(shutdown.child_token());

    // 2. Message bus and journal
    let bus = Arc::new(MessageBus::new(&config.bus));
    bus.subscribe(Arc::new(SqliteDecisionJournal::new(store.clone())))
        .await;
    let dispatcher = bus.spawn_dispatcher(shutdown.child_token());

    // 3. Orchestrator
    let orchestrator = Orchestrator::new(config.orchestrator.clone(), bus.clone())
        .with_provider(Arc::new(EmotionSignalProvider::new(engine.clone())))
        .with_continuity(Arc::new(JournalContinuity::new(store.clone())))
        .with_shutdown(shutdown.child_token());

    info!(instance = %config.engine.instance_id, "anima online");
    let result = serve(&engine, &orchestrator).await;

    shutdown.cancel();
    if let Err(e) = engine_task.await {
        error!("Engine task ended abnormally: {}", e);
    }
    if let Err(e) = dispatcher.await {
        error!("Bus dispatcher ended abnormally: {}", e);
    }
    if bus.dropped() > 0 {
        warn!(dropped = bus.dropped(), "Async bus messages were dropped");
    }
    info!("anima stopped");
    result
}

/// Line loop until EOF, `quit` or Ctrl-C.
async fn serve(engine: &EmotionEngine, orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else { break };

        let reply = match parse_line(&line) {
            Ok(Command::Empty) => continue,
            Ok(Command::Quit) => break,
            Ok(Command::Request(ctx)) => serde_json::to_value(orchestrator.process(ctx).await)?,
            Ok(Command::Influence(event)) => {
                let id = event.id;
                match engine.submit_influence(event) {
                    Ok(()) => json!({ "accepted": id }),
                    Err(e) => json!({ "error": e.to_string() }),
                }
            }
            Ok(Command::Snapshot) => serde_json::to_value(&*engine.snapshot())?,
            Err(e) => json!({ "error": format!("{:#}", e) }),
        };

        stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
