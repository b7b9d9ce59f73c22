pub mod database_ops;
pub mod normalization;
pub mod logging;

pub mod util {
    pub mod config;
    pub mod env;
}

use std::sync::Arc;

use anyhow::{Context, Result};

use database_ops::db::Db;
use database_ops::fastdl::FastDlProvider;
use database_ops::http::build_client;
use database_ops::sourcejump::SourceJumpProvider;
use database_ops::tas_sheet::TasSheetProvider;
use database_ops::worker_manager::{BulkWorker, RecordsWorker, SyncWorker};
use util::config::SyncConfig;

/// The three live feed clients, sharing one HTTP client.
#[derive(Clone)]
pub struct Feeds {
    pub records: Arc<SourceJumpProvider>,
    pub hashes: Arc<FastDlProvider>,
    pub tas: Arc<TasSheetProvider>,
}

impl Feeds {
    pub fn from_config(cfg: &SyncConfig) -> Result<Self> {
        let http = build_client(cfg.http_timeout).context("build http client")?;
        let tas = match cfg.tas_sheet_url.as_deref() {
            Some(url) => TasSheetProvider::new(url.to_string(), http.clone()),
            None => TasSheetProvider::for_sheet(
                cfg.tas_sheet_id.as_deref(),
                cfg.tas_sheet_gid.as_deref(),
                http.clone(),
            ),
        };
        Ok(Self {
            records: Arc::new(SourceJumpProvider::new(
                cfg.sourcejump_base_url.as_deref(),
                http.clone(),
            )),
            hashes: Arc::new(FastDlProvider::new(cfg.fastdl_url.as_deref(), http)),
            tas: Arc::new(tas),
        })
    }

    pub fn records_worker(&self) -> Arc<dyn SyncWorker> {
        Arc::new(RecordsWorker {
            feed: self.records.clone(),
            hashes: self.hashes.clone(),
        })
    }

    pub fn bulk_worker(&self) -> Arc<dyn SyncWorker> {
        Arc::new(BulkWorker {
            hashes: self.hashes.clone(),
            tas: self.tas.clone(),
        })
    }
}

/// Open the configured database.
pub async fn connect_db(cfg: &SyncConfig) -> Result<Db> {
    Db::connect(&cfg.database_url, cfg.max_connections).await
}
