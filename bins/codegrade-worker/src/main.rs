mod handler;

use anyhow::Context;
use codegrade_common::jobs::{encode_response, JobResponse};
use codegrade_engine::{Engine, EngineConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, instrument, warn};

/// Responses waiting for the stdout writer
const RESPONSE_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("codegrade worker booting...");

    let config = EngineConfig::from_env(None).map_err(|e| {
        error!("Failed to load engine configuration: {:#}", e);
        e
    })?;
    let engine = Arc::new(Engine::new(config));

    let environment = engine.check_environment().await;
    let missing: Vec<&String> = environment
        .iter()
        .filter(|(_, ok)| !**ok)
        .map(|(tool, _)| tool)
        .collect();
    if missing.is_empty() {
        info!("All toolchains available");
    } else {
        warn!(?missing, "Some toolchains are unavailable; their languages will fail");
    }

    let reaper = spawn_reaper(engine.clone());
    let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
    let writer = tokio::spawn(write_responses(rx));

    worker_loop(engine, tx).await;

    if let Err(e) = writer.await.context("Response writer panicked")? {
        error!(error = %e, "Response writer failed");
    }
    if let Some(reaper) = reaper {
        reaper.abort();
    }

    info!("Worker shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("CODEGRADE_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // stdout carries responses, logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Read jobs until EOF or Ctrl-C, then wait for in-flight jobs to finish
#[instrument(skip_all)]
async fn worker_loop(engine: Arc<Engine>, tx: mpsc::Sender<JobResponse>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut jobs = JoinSet::new();
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let engine = engine.clone();
                    let tx = tx.clone();
                    jobs.spawn(async move {
                        let response = handler::handle_line(&engine, &line).await;
                        if tx.send(response).await.is_err() {
                            warn!("Response writer is gone, dropping response");
                        }
                    });
                }
                Ok(None) => {
                    info!("Input closed, draining in-flight jobs...");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read input");
                    break;
                }
            },
            _ = &mut shutdown => {
                warn!("Received shutdown signal, draining in-flight jobs...");
                break;
            }
            Some(finished) = jobs.join_next(), if !jobs.is_empty() => {
                if let Err(e) = finished {
                    error!(error = %e, "Job task panicked");
                }
            }
        }
    }

    while let Some(finished) = jobs.join_next().await {
        if let Err(e) = finished {
            error!(error = %e, "Job task panicked");
        }
    }
}

async fn write_responses(mut rx: mpsc::Receiver<JobResponse>) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(response) = rx.recv().await {
        let line = encode_response(&response).context("Failed to encode response")?;
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

/// Periodically remove workspaces older than `reaper.max_age_secs`
fn spawn_reaper(engine: Arc<Engine>) -> Option<JoinHandle<()>> {
    let interval_secs = engine.config().reaper.interval_secs;
    if interval_secs == 0 {
        info!("Workspace reaper disabled");
        return None;
    }
    let max_age = Duration::from_secs(engine.config().reaper.max_age_secs);

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let removed = engine.sweep_stale(max_age).await;
            if removed > 0 {
                info!(removed, "Removed stale workspaces");
            }
        }
    }))
}
