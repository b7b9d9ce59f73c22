//! Runtime configuration assembled from the environment.

use std::time::Duration;

use crate::util::env::{env_flag, env_opt, env_parse, env_parse_opt};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://bot_data.db";

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub sourcejump_base_url: Option<String>,
    pub fastdl_url: Option<String>,
    pub fastdl_download_base: String,
    pub tas_sheet_id: Option<String>,
    pub tas_sheet_gid: Option<String>,
    /// Full export URL; wins over id/gid when set.
    pub tas_sheet_url: Option<String>,
    pub http_timeout: Option<Duration>,
    pub records_interval: Duration,
    pub bulk_interval: Duration,
    pub sync_on_startup: bool,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_opt("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            max_connections: env_parse("DB_MAX_CONNS", 5u32).max(1),
            sourcejump_base_url: env_opt("SOURCEJUMP_BASE_URL"),
            fastdl_url: env_opt("FASTDL_URL"),
            fastdl_download_base: env_opt("FASTDL_DOWNLOAD_BASE").unwrap_or_else(|| {
                crate::database_ops::fastdl::provider::DEFAULT_DOWNLOAD_BASE.into()
            }),
            tas_sheet_id: env_opt("TAS_SHEET_ID"),
            tas_sheet_gid: env_opt("TAS_SHEET_GID"),
            tas_sheet_url: env_opt("TAS_SHEET_URL"),
            http_timeout: env_parse_opt::<u64>("HTTP_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            records_interval: Duration::from_secs(
                env_parse("RECORDS_SYNC_INTERVAL_SECS", 1800u64).max(1),
            ),
            bulk_interval: Duration::from_secs(
                env_parse("BULK_SYNC_INTERVAL_SECS", 21_600u64).max(1),
            ),
            sync_on_startup: env_flag("SYNC_ON_STARTUP", true),
        }
    }
}
