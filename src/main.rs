use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use datagen_worker::{
    checkpoint::CheckpointManager,
    config::Config,
    executor::{GenerationExecutor, Interrupted},
    observability,
    producer::ProducerSet,
    registry::{Stage, StageRegistry},
    store::{PgStorage, ProgressStore, Storage, schema},
    util::time::historical_window,
    validate::DataValidator,
};

/// Synthetic banking-data generator with checkpointed resume.
#[derive(Debug, Parser)]
#[command(name = "datagen-worker", version)]
struct Args {
    /// Resume the most recent interrupted run instead of starting fresh.
    #[arg(long)]
    resume: bool,

    /// Skip every stage before STAGE; a prior run must have populated them.
    #[arg(long, value_name = "STAGE")]
    skip_to: Option<String>,

    /// Generation window start (YYYY-MM-DD). Defaults to the configured
    /// historical window ending yesterday.
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Generation window end (YYYY-MM-DD).
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Delete all persisted run-status history before doing anything else.
    #[arg(long)]
    clear_history: bool,

    /// Run cross-entity validation after a successful generation pass.
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = observability::init() {
        eprintln!("failed to initialize tracing: {err}");
        return ExitCode::FAILURE;
    }
    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %format!("{err:#}"), "startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = Arc::new(Config::from_env().context("failed to load configuration")?);
    let storage = Arc::new(
        PgStorage::connect(&config)
            .await
            .context("failed to connect to storage")?,
    );
    storage
        .ensure_schema()
        .await
        .context("failed to ensure progress schema")?;
    if !storage
        .table_exists("customer")
        .await
        .context("failed to check business schema")?
    {
        info!("business tables missing, creating schema");
    }
    schema::ensure_business_tables(storage.as_ref())
        .await
        .context("failed to ensure business tables")?;

    if args.clear_history {
        let removed = storage
            .update("DELETE FROM generation_status", &[])
            .await
            .context("failed to clear run-status history")?;
        info!(removed, "cleared run-status history");
        if !args.resume && args.skip_to.is_none() {
            return Ok(ExitCode::SUCCESS);
        }
    }

    let registry = StageRegistry::new();
    // Unknown stage names fail here, before any run status is written.
    let skip_stages: Vec<String> = match &args.skip_to {
        Some(name) => {
            let stage = registry.resolve(name).map_err(|_| {
                anyhow!(
                    "unknown stage: {name}; valid stages: {}",
                    Stage::ALL
                        .iter()
                        .map(|stage| stage.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })?;
            let prefix = registry.skip_prefix(stage);
            info!(
                skip_to = %stage,
                skipped = prefix.len(),
                "skipping stages before requested stage"
            );
            prefix
                .into_iter()
                .map(|stage| stage.name().to_string())
                .collect()
        }
        None => Vec::new(),
    };

    let (default_start, default_end) = historical_window(config.history_days());
    let start_date = args.start_date.unwrap_or(default_start);
    let end_date = args.end_date.unwrap_or(default_end);
    info!(%start_date, %end_date, "generation window");

    let checkpoint = CheckpointManager::new(
        Arc::clone(&storage) as Arc<dyn ProgressStore>,
        registry,
    );
    let producers = ProducerSet::standard(&config);
    let mut executor = GenerationExecutor::new(
        Arc::clone(&config),
        Arc::clone(&storage) as Arc<dyn Storage>,
        checkpoint,
        producers,
    );

    if args.resume {
        match executor.resume_from_last().await? {
            Some(summary) => info!(
                run_id = %summary.run_id,
                current_stage = ?summary.current_stage,
                stage_progress = summary.stage_progress,
                details = %summary.details,
                "resuming previous run"
            ),
            None => {
                warn!("no resumable state found, starting fresh");
                executor.initialize_run(&skip_stages).await?;
            }
        }
    } else {
        executor.initialize_run(&skip_stages).await?;
    }

    let cancel = CancellationToken::new();
    spawn_signal_bridge(cancel.clone());

    match executor.execute(start_date, end_date, &cancel).await {
        Ok(stats) => {
            let total: u64 = stats.values().sum();
            info!(total_rows = total, "generation finished");
            for stage in Stage::ALL {
                if let Some(rows) = stats.get(stage.name()) {
                    info!(stage = %stage, rows, "stage total");
                }
            }
            if args.validate {
                report_validation(&storage, (start_date, end_date)).await?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.downcast_ref::<Interrupted>().is_some() => {
            info!("state saved; restart with --resume to continue");
            Ok(ExitCode::from(130))
        }
        Err(err) => {
            let message = format!("{err:#}");
            executor.fail_run(&message).await;
            error!(error = %message, "generation failed; rerun with --resume after fixing the cause");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn report_validation(
    storage: &Arc<PgStorage>,
    window: (NaiveDate, NaiveDate),
) -> Result<()> {
    let validator = DataValidator::new(Arc::clone(storage) as Arc<dyn Storage>);
    let report = validator
        .validate(window)
        .await
        .context("failed to run validation")?;
    for check in &report.checks {
        if check.passed {
            info!(check = %check.name, detail = %check.detail, "validation check passed");
        } else {
            warn!(check = %check.name, detail = %check.detail, "validation check FAILED");
        }
    }
    if report.passed() {
        info!("all validation checks passed");
    } else {
        warn!("validation found inconsistencies; see failed checks above");
    }
    Ok(())
}

fn spawn_signal_bridge(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_interrupt().await;
        warn!("interrupt received, pausing at the next batch boundary");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_interrupt() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() {
    let _ = tokio::signal::ctrl_c().await;
}
