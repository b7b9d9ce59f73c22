use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{MapFeedEntry, RecordDetail, RecordFeed, RecordListEntry};
use crate::database_ops::error::FeedError;
use crate::database_ops::http::fetch_text;

pub const DEFAULT_BASE_URL: &str = "https://www.sourcejump.net";

/// HTTP client for the SourceJump record API.
///
/// Endpoints (relative to the base URL):
/// - `GET /ajax/records/wrs` - recent world records
/// - `GET /ajax/records/map/{map}` - records for one map, WR first
/// - `GET /ajax/records/id/{id}` - one record in detail
#[derive(Debug, Clone)]
pub struct SourceJumpProvider {
    base_url: String,
    http: Client,
}

impl SourceJumpProvider {
    pub fn new(base_url: Option<&str>, http: Client) -> Self {
        let base_url = base_url
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Self { base_url, http }
    }

    pub fn recent_records_url(&self) -> String {
        format!("{}/ajax/records/wrs", self.base_url)
    }

    pub fn map_records_url(&self, map: &str) -> String {
        format!(
            "{}/ajax/records/map/{}",
            self.base_url,
            urlencoding::encode(map)
        )
    }

    pub fn record_detail_url(&self, record_id: i64) -> String {
        format!("{}/ajax/records/id/{record_id}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        what: &'static str,
    ) -> Result<T, FeedError> {
        let body = fetch_text(&self.http, url).await?;
        debug!(url, bytes = body.len(), "sourcejump: fetched");
        serde_json::from_str(&body).map_err(|e| FeedError::parse(what, e))
    }
}

#[async_trait]
impl RecordFeed for SourceJumpProvider {
    async fn recent_records(&self) -> Result<Vec<RecordListEntry>, FeedError> {
        self.get_json(&self.recent_records_url(), "recent records")
            .await
    }

    async fn record_detail(&self, record_id: i64) -> Result<RecordDetail, FeedError> {
        self.get_json(&self.record_detail_url(record_id), "record detail")
            .await
    }

    async fn map_records(&self, map: &str) -> Result<Vec<MapFeedEntry>, FeedError> {
        self.get_json(&self.map_records_url(map), "map records")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::http::build_client;

    #[test]
    fn builds_endpoint_urls() {
        let p = SourceJumpProvider::new(Some("https://example.test/"), build_client(None).unwrap());
        assert_eq!(p.recent_records_url(), "https://example.test/ajax/records/wrs");
        assert_eq!(p.record_detail_url(42), "https://example.test/ajax/records/id/42");
        assert_eq!(
            p.map_records_url("bhop_a b/c"),
            "https://example.test/ajax/records/map/bhop_a%20b%2Fc"
        );
    }
}
