use anyhow::{Context, Result};
use bhop_records::database_ops::worker_manager::{Scheduler, WorkerManager};
use bhop_records::logging::{init_tracing, LogFormat, DEFAULT_FILTER};
use bhop_records::util::config::SyncConfig;
use bhop_records::util::env as env_util;
use bhop_records::{connect_db, Feeds};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // --- logging -------------------------------------------------------------
    env_util::init_env();
    init_tracing(DEFAULT_FILTER, LogFormat::from_env_or(LogFormat::Full))?;

    let cfg = SyncConfig::from_env();
    let db = connect_db(&cfg).await.context("open database")?;
    let feeds = Feeds::from_config(&cfg)?;

    // --- startup bulk sync ---------------------------------------------------
    if cfg.sync_on_startup {
        info!("startup: running bulk sync");
        if let Err(e) = WorkerManager::new(db.clone())
            .run_all(vec![feeds.bulk_worker()])
            .await
        {
            warn!(error = %e, "startup: bulk sync failed; continuing with schedule");
        }
    }

    // --- intervals -----------------------------------------------------------
    let scheduler = Arc::new(
        Scheduler::new(db.clone())
            .every(cfg.records_interval, feeds.records_worker())
            .every(cfg.bulk_interval, feeds.bulk_worker()),
    );
    info!(
        records_secs = cfg.records_interval.as_secs(),
        bulk_secs = cfg.bulk_interval.as_secs(),
        "scheduler: started"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(5);
    let runner = {
        let scheduler = scheduler.clone();
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move { scheduler.run(&shutdown_tx).await })
    };

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutdown requested; waiting for running syncs to finish");
    let _ = shutdown_tx.send(());
    runner.await.context("scheduler task")?;

    for (name, m) in scheduler.metrics().await {
        info!(
            worker = name,
            runs = m.runs,
            failures = m.failures,
            last_error = ?m.last_error,
            "scheduler: final metrics"
        );
    }
    db.pool.close().await;
    Ok(())
}
