use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use pbf_core::{replay, run_id_for, EventStore, ScheduleStore};
use pbf_sync::bootstrap::{self, init_tracing};
use pbf_sync::{AppConfig, AppError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "Periodic mirror of an OSM PBF snapshot into object storage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Logs en nivel debug (si `RUST_LOG` no está definido).
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Registra (o actualiza) el schedule recurrente.
    Create {
        /// Primer disparo (RFC 3339). Por defecto: ahora.
        #[arg(long)]
        first_fire: Option<DateTime<Utc>>,
    },
    /// Reanuda runs abiertos y ejecuta los disparos del schedule hasta Ctrl-C.
    Worker,
    /// Ejecuta un run inmediatamente con fecha programada "ahora".
    Trigger,
    /// Muestra el log de eventos y el estado reconstruido de un run.
    Status {
        #[arg(long)]
        run: Uuid,
    },
}

/// Token cancelado al recibir Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown:requested"),
            Err(e) => warn!("shutdown:signal_handler_failed error={e}"),
        }
        child.cancel();
    });
    token
}

async fn create(cfg: &AppConfig, first_fire: Option<DateTime<Utc>>) -> Result<(), AppError> {
    let (_, schedules) = bootstrap::connect_stores(cfg).await?;
    let spec = bootstrap::schedule_spec(cfg, first_fire.unwrap_or_else(Utc::now));
    schedules.upsert(spec.clone()).await?;
    println!("schedule {} every {}s, next fire {}", spec.id, spec.interval_secs, spec.next_fire);
    Ok(())
}

async fn worker(cfg: &AppConfig) -> Result<(), AppError> {
    let services = bootstrap::build(cfg).await?;
    let shutdown = shutdown_on_ctrl_c();
    services.worker(cfg).run(shutdown).await?;
    Ok(())
}

async fn trigger(cfg: &AppConfig) -> Result<(), AppError> {
    let services = bootstrap::build(cfg).await?;
    let now = Utc::now();
    let run_id = run_id_for(&format!("{}-manual", cfg.schedule_id), now);
    info!(%run_id, scheduled_time = %now, "trigger:start");
    let outcome = services.controller
                          .run_with_cancel(run_id, now, &shutdown_on_ctrl_c())
                          .await?;
    println!("run {run_id}: {}", serde_json::to_string(&outcome).map_err(|e| AppError::Internal(e.to_string()))?);
    Ok(())
}

async fn status(cfg: &AppConfig, run_id: Uuid) -> Result<(), AppError> {
    let (events, _) = bootstrap::connect_stores(cfg).await?;
    let log = events.list(run_id).await?;
    if log.is_empty() {
        println!("run {run_id}: no events");
        return Ok(());
    }
    for ev in &log {
        let kind = serde_json::to_string(&ev.kind).map_err(|e| AppError::Internal(e.to_string()))?;
        println!("{:>4} {} {}", ev.seq, ev.ts.to_rfc3339(), kind);
    }
    let inst = replay(run_id, &log)?;
    println!("state: {:?}", inst.state);
    for slot in &inst.steps {
        println!("  {:<16} {:?} attempts={} total={}", slot.step.to_string(), slot.status, slot.attempts, slot.total_attempts);
        if let Some(err) = &slot.last_error {
            println!("  {:<16} last_error={err}", "");
        }
    }
    match &inst.status {
        Some(status) => println!("status: {status:?}"),
        None => println!("status: open"),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "info" });

    let result = match AppConfig::from_env() {
        Ok(cfg) => match cli.command {
            Commands::Create { first_fire } => create(&cfg, first_fire).await,
            Commands::Worker => worker(&cfg).await,
            Commands::Trigger => trigger(&cfg).await,
            Commands::Status { run } => status(&cfg, run).await,
        },
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        error!("{e}");
        std::process::exit(e.exit_code());
    }
}
