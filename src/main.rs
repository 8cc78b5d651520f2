use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use slidecast::api::{AppState, create_router};
use slidecast::cli::{Cli, Command};
use slidecast::config::SlidecastConfig;
use slidecast::job::{JobId, PublicState};
use slidecast::orchestrator::JobOrchestrator;
use slidecast::owner::StaticOwnerDirectory;
use slidecast::pool::WorkerPool;
use slidecast::render::RenderClient;
use slidecast::stager::FileStager;
use slidecast::store::{InMemoryJobStore, JobStore, JsonFileJobStore};
use slidecast::ui;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = SlidecastConfig::load_from(&cli.config)?;

    match cli.command {
        Command::Serve { bind } => {
            serve(config, bind).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch {
            server,
            job_id,
            interval_secs,
        } => {
            let view = ui::watch(&server, job_id, Duration::from_secs(interval_secs.max(1))).await?;
            Ok(match view.state {
                PublicState::Error => ExitCode::FAILURE,
                _ => ExitCode::SUCCESS,
            })
        }
        Command::Purge { job_id } => purge(&config, job_id).await,
    }
}

// RUST_LOG wins; otherwise slidecast=info (debug with --verbose). LOG_FORMAT=json for JSON lines.
fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("slidecast={level},tower_http={level}")));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(env_filter)
            .init();
    }
}

async fn serve(config: SlidecastConfig, bind: Option<String>) -> Result<()> {
    let store: Arc<dyn JobStore> = match &config.storage.records_dir {
        Some(dir) => Arc::new(JsonFileJobStore::open(dir).await?),
        None => {
            warn!("no storage.records_dir configured, job records are kept in memory only");
            Arc::new(InMemoryJobStore::new())
        }
    };
    info!(
        max_upload_bytes = config.server.max_upload_bytes,
        max_buffered_bytes = config.max_buffered_upload_bytes(),
        "upload limits"
    );
    if config.tokens.is_empty() {
        warn!("no tokens configured, every upload will be rejected");
    }

    let engine = Arc::new(RenderClient::new(config.render_client_config())?);
    let orchestrator = Arc::new(JobOrchestrator::new(
        store,
        FileStager::new(&config.storage.root),
        engine,
        WorkerPool::start(config.pool_config()),
        config.retry_config(),
    ));
    let state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        owners: Arc::new(StaticOwnerDirectory::new(config.tokens.clone())),
    };
    let app = create_router(state, config.server.max_upload_bytes);

    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        %addr,
        storage = %config.storage.root.display(),
        engine = %config.engine.base_url,
        "slidecast listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("waiting for in-flight render jobs");
    orchestrator.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn purge(config: &SlidecastConfig, job_id: JobId) -> Result<ExitCode> {
    let report = FileStager::new(&config.storage.root).purge(job_id).await;
    if !report.existed {
        println!("job {job_id}: nothing to purge");
        return Ok(ExitCode::SUCCESS);
    }
    println!("job {job_id}: removed {} entries", report.removed);
    for failure in &report.failures {
        println!("  could not remove {}: {}", failure.path.display(), failure.error);
    }
    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("received shutdown signal");
}
