use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, Instrument};

use crate::database_ops::db::Db;
use crate::database_ops::fastdl::{bulk_sync_file_hashes, FileHashSource};
use crate::database_ops::reconcile::reconcile_recent;
use crate::database_ops::sourcejump::RecordFeed;
use crate::database_ops::tas_sheet::{sync_tas, TasSource};

#[async_trait::async_trait]
pub trait SyncWorker: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, db: &Db) -> Result<()>;
}

/// Incremental reconciliation of the recent-records feed.
pub struct RecordsWorker {
    pub feed: Arc<dyn RecordFeed>,
    pub hashes: Arc<dyn FileHashSource>,
}

#[async_trait::async_trait]
impl SyncWorker for RecordsWorker {
    fn name(&self) -> &'static str {
        "records"
    }
    async fn run(&self, db: &Db) -> Result<()> {
        reconcile_recent(db, self.feed.as_ref(), self.hashes.as_ref()).await?;
        Ok(())
    }
}

/// File-hash table followed by the TAS sheet. A failed hash sync does not
/// prevent the TAS pass; the first error is reported.
pub struct BulkWorker {
    pub hashes: Arc<dyn FileHashSource>,
    pub tas: Arc<dyn TasSource>,
}

#[async_trait::async_trait]
impl SyncWorker for BulkWorker {
    fn name(&self) -> &'static str {
        "bulk"
    }
    async fn run(&self, db: &Db) -> Result<()> {
        let hashes = bulk_sync_file_hashes(db, self.hashes.as_ref()).await;
        if let Err(e) = &hashes {
            error!(error = %e, "bulk: file hash sync failed");
        }
        let tas = sync_tas(db, self.tas.as_ref()).await;
        hashes?;
        tas?;
        Ok(())
    }
}

pub struct WorkerManager {
    db: Db,
}

impl WorkerManager {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Run all workers concurrently, logging outcomes. Returns first error if any.
    pub async fn run_all(&self, workers: Vec<Arc<dyn SyncWorker>>) -> Result<()> {
        let mut tasks = Vec::with_capacity(workers.len());
        for w in workers {
            let db = self.db.clone();
            tasks.push(tokio::spawn(async move {
                info!(worker = w.name(), "starting worker");
                let res = w.run(&db).await;
                match &res {
                    Ok(_) => info!(worker = w.name(), "worker finished"),
                    Err(e) => error!(worker = w.name(), error = %e, "worker failed"),
                }
                res
            }));
        }
        let mut first_err: Option<anyhow::Error> = None;
        for r in join_all(tasks).await {
            let res = r.map_err(anyhow::Error::from).and_then(|inner| inner);
            if let Err(e) = res {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerMetrics {
    pub runs: u64,
    pub failures: u64,
    pub last_run_ms: u64,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

struct Cadence {
    worker: Arc<dyn SyncWorker>,
    every: Duration,
    metrics: Arc<Mutex<WorkerMetrics>>,
}

/// Owns the periodic sync tasks. Each cadence runs in its own task and never
/// overlaps itself; different cadences run independently of each other.
pub struct Scheduler {
    db: Db,
    cadences: Vec<Cadence>,
}

impl Scheduler {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            cadences: Vec::new(),
        }
    }

    pub fn every(mut self, every: Duration, worker: Arc<dyn SyncWorker>) -> Self {
        self.cadences.push(Cadence {
            worker,
            every,
            metrics: Arc::new(Mutex::new(WorkerMetrics::default())),
        });
        self
    }

    pub async fn metrics(&self) -> Vec<(&'static str, WorkerMetrics)> {
        let mut out = Vec::with_capacity(self.cadences.len());
        for c in &self.cadences {
            out.push((c.worker.name(), c.metrics.lock().await.clone()));
        }
        out
    }

    /// Run every cadence until `shutdown` fires. The first run of each
    /// cadence happens one full period after start.
    pub async fn run(&self, shutdown: &broadcast::Sender<()>) {
        let mut tasks = JoinSet::new();
        for c in &self.cadences {
            let db = self.db.clone();
            let worker = c.worker.clone();
            let metrics = c.metrics.clone();
            let every = c.every;
            let mut rx = shutdown.subscribe();

            tasks.spawn(async move {
                let mut ticker = tokio::time::interval(every);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {},
                        _ = rx.recv() => {
                            info!(worker = worker.name(), "scheduler: shutdown");
                            break;
                        }
                    }
                    let span = tracing::info_span!("sync.tick", worker = worker.name());
                    run_once(&db, worker.as_ref(), &metrics)
                        .instrument(span)
                        .await;
                }
            });
        }
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "scheduler: task panicked");
            }
        }
    }
}

async fn run_once(db: &Db, worker: &dyn SyncWorker, metrics: &Mutex<WorkerMetrics>) {
    let started = Instant::now();
    let res = worker.run(db).await;

    let mut m = metrics.lock().await;
    m.last_run_ms = started.elapsed().as_millis() as u64;
    m.last_finished_at = Some(Utc::now());
    match res {
        Ok(()) => {
            m.runs += 1;
            info!(
                worker = worker.name(),
                elapsed_ms = m.last_run_ms,
                total_runs = m.runs,
                failures = m.failures,
                "scheduler: tick complete"
            );
        }
        Err(e) => {
            m.failures += 1;
            error!(worker = worker.name(), error = %e, "scheduler: tick failed");
            m.last_error = Some(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        runs: AtomicUsize,
        running: AtomicUsize,
        overlapped: AtomicUsize,
        fail: bool,
    }

    impl Counting {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                runs: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                overlapped: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait::async_trait]
    impl SyncWorker for Counting {
        fn name(&self) -> &'static str {
            self.name
        }
        async fn run(&self, _db: &Db) -> Result<()> {
            if self.running.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(15)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("{} failed", self.name);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn cadences_tick_until_shutdown() {
        let db = Db::connect_in_memory().await.unwrap();
        let fast = Counting::new("fast", false);
        let slow = Counting::new("slow", true);
        let scheduler = Arc::new(
            Scheduler::new(db)
                .every(Duration::from_millis(5), fast.clone())
                .every(Duration::from_millis(60), slow.clone()),
        );
        let (tx, _) = broadcast::channel::<()>(1);

        let handle = {
            let scheduler = scheduler.clone();
            let tx = tx.clone();
            tokio::spawn(async move { scheduler.run(&tx).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(fast.runs.load(Ordering::SeqCst) >= 3);
        assert!(slow.runs.load(Ordering::SeqCst) >= 1);
        // fast period is shorter than its run time, yet runs never overlap
        assert_eq!(fast.overlapped.load(Ordering::SeqCst), 0);

        let metrics = scheduler.metrics().await;
        assert_eq!(metrics[0].0, "fast");
        assert!(metrics[0].1.last_finished_at.is_some());
        assert_eq!(metrics[1].0, "slow");
        assert!(metrics[1].1.failures >= 1);
        assert_eq!(metrics[1].1.last_error.as_deref(), Some("slow failed"));
    }

    #[tokio::test]
    async fn run_all_reports_first_error_after_all_finish() {
        let db = Db::connect_in_memory().await.unwrap();
        let ok = Counting::new("ok", false);
        let bad = Counting::new("bad", true);
        let manager = WorkerManager::new(db);
        let workers: Vec<Arc<dyn SyncWorker>> = vec![ok.clone(), bad.clone()];
        let err = manager
            .run_all(workers)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "bad failed");
        assert_eq!(ok.runs.load(Ordering::SeqCst), 1);
        assert_eq!(bad.runs.load(Ordering::SeqCst), 1);
    }
}
