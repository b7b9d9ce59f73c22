use reqwest::Client;
use std::time::Duration;

use crate::database_ops::error::{truncate_for_log, FeedError};

const USER_AGENT: &str = concat!("bhop-records/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for all feeds. `timeout` of `None` keeps the
/// transport default (no overall request timeout).
pub fn build_client(timeout: Option<Duration>) -> reqwest::Result<Client> {
    let mut builder = Client::builder().user_agent(USER_AGENT);
    if let Some(t) = timeout {
        builder = builder.timeout(t);
    }
    builder.build()
}

/// GET `url` and return the body text; non-2xx answers become
/// [`FeedError::Status`] with a truncated body for the log.
pub async fn fetch_text(http: &Client, url: &str) -> Result<String, FeedError> {
    let transport = |source| FeedError::Transport {
        url: url.to_string(),
        source,
    };
    let resp = http.get(url).send().await.map_err(transport)?;
    let status = resp.status();
    if !status.is_success() {
        let body = truncate_for_log(resp.text().await.unwrap_or_default(), 2000);
        return Err(FeedError::Status {
            url: url.to_string(),
            status,
            body,
        });
    }
    resp.text().await.map_err(transport)
}
