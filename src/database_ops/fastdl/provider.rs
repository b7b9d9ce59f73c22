use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{parse_hash_table, FileHashEntry, FileHashSource};
use crate::database_ops::error::FeedError;
use crate::database_ops::http::fetch_text;

pub const DEFAULT_TABLE_URL: &str = "https://main.fastdl.me/69.html";
pub const DEFAULT_DOWNLOAD_BASE: &str = "https://main.fastdl.me/h2";

/// Fetches the FastDL map listing page.
#[derive(Debug, Clone)]
pub struct FastDlProvider {
    table_url: String,
    http: Client,
}

impl FastDlProvider {
    pub fn new(table_url: Option<&str>, http: Client) -> Self {
        Self {
            table_url: table_url.unwrap_or(DEFAULT_TABLE_URL).to_string(),
            http,
        }
    }
}

#[async_trait]
impl FileHashSource for FastDlProvider {
    async fn fetch_hashes(&self) -> Result<Vec<FileHashEntry>, FeedError> {
        let html = fetch_text(&self.http, &self.table_url).await?;
        let rows = parse_hash_table(&html)?;
        debug!(url = %self.table_url, bytes = html.len(), rows = rows.len(), "fastdl: table fetched");
        Ok(rows)
    }
}
