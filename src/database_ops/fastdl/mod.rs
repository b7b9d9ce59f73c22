//! File-distribution host table.
//!
//! The host publishes an HTML page with one table row per downloadable map:
//!
//! ```text
//! <td><a href="ANY">MAP_NAME</a></td> WHITESPACE? <td>HASH</td>
//! ```
//!
//! `MAP_NAME` is any text without `<`, `HASH` is one or more lowercase hex
//! digits. Rows in any other shape are ignored. There is no schema guarantee
//! from the site, so this grammar is the whole contract.

pub mod provider;

pub use provider::FastDlProvider;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::{info, instrument};

use crate::database_ops::db::Db;
use crate::database_ops::error::FeedError;
use crate::database_ops::maps::upsert_file_hash;

const ROW_PATTERN: &str = r#"<td><a\s+href="[^"]*">([^<]+)</a></td>\s*<td>([a-f0-9]+)</td>"#;

/// One map name → content hash pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHashEntry {
    pub map: String,
    pub hash: String,
}

/// Extract every well-formed row, in document order.
pub fn parse_hash_table(html: &str) -> Result<Vec<FileHashEntry>, FeedError> {
    let re = Regex::new(ROW_PATTERN).map_err(|e| FeedError::parse("file hash row pattern", e))?;
    Ok(re
        .captures_iter(html)
        .filter_map(|c| {
            let map = c.get(1)?.as_str().trim();
            let hash = c.get(2)?.as_str();
            (!map.is_empty()).then(|| FileHashEntry {
                map: map.to_string(),
                hash: hash.to_string(),
            })
        })
        .collect())
}

/// Hash for one map: the first matching row.
pub fn find_hash<'a>(entries: &'a [FileHashEntry], map: &str) -> Option<&'a str> {
    entries
        .iter()
        .find(|e| e.map == map)
        .map(|e| e.hash.as_str())
}

/// Download URL for a map archive on the host.
pub fn download_url(base: &str, hash: &str, map: &str) -> String {
    format!("{}/{hash}/{map}.bsp.bz2", base.trim_end_matches('/'))
}

/// Source of the full file-hash table.
#[async_trait]
pub trait FileHashSource: Send + Sync {
    async fn fetch_hashes(&self) -> Result<Vec<FileHashEntry>, FeedError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHashSyncSummary {
    pub rows_seen: usize,
    pub rows_upserted: usize,
}

/// Fetch the host table and upsert every pair in one transaction. Any
/// failure (fetch, parse or storage) aborts and rolls back the whole batch.
#[instrument(skip_all)]
pub async fn bulk_sync_file_hashes(
    db: &Db,
    source: &dyn FileHashSource,
) -> Result<FileHashSyncSummary> {
    let entries = source
        .fetch_hashes()
        .await
        .context("fastdl: fetch host table")?;
    let summary = apply_file_hashes(db, &entries).await?;
    info!(
        rows_seen = summary.rows_seen,
        rows_upserted = summary.rows_upserted,
        "fastdl: bulk sync complete"
    );
    Ok(summary)
}

/// Transactional upsert of `entries`; all or nothing. Dropping the
/// uncommitted transaction on the error path rolls it back.
pub async fn apply_file_hashes(db: &Db, entries: &[FileHashEntry]) -> Result<FileHashSyncSummary> {
    let mut tx = db.pool.begin().await?;
    for entry in entries {
        upsert_file_hash(&mut *tx, &entry.map, &entry.hash)
            .await
            .with_context(|| format!("fastdl: upsert {}", entry.map))?;
    }
    tx.commit().await?;
    Ok(FileHashSyncSummary {
        rows_seen: entries.len(),
        rows_upserted: entries.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::maps::{get_file_hash, get_state};

    const FIXTURE: &str = r##"
<html><body><table>
<tr><th>Map</th><th>Hash</th></tr>
<tr><td><a href="#">bhop_alpha</a></td><td>0a1b2c3d</td></tr>
<tr><td><a  href="/maps/bhop_beta">bhop_beta</a></td>
    <td>ffff0000</td></tr>
<tr><td><a href="#">bhop_upper</a></td><td>ABCDEF</td></tr>
<tr><td><a href="#">bhop_nohash</a></td><td></td></tr>
<tr><td>bhop_nolink</td><td>abcd</td></tr>
<tr><td><a href="#">bhop_alpha</a></td><td>99999999</td></tr>
</table></body></html>
"##;

    struct FixedSource(Vec<FileHashEntry>);

    #[async_trait]
    impl FileHashSource for FixedSource {
        async fn fetch_hashes(&self) -> Result<Vec<FileHashEntry>, FeedError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl FileHashSource for BrokenSource {
        async fn fetch_hashes(&self) -> Result<Vec<FileHashEntry>, FeedError> {
            Err(FeedError::parse("host table", "truncated body"))
        }
    }

    fn entry(map: &str, hash: &str) -> FileHashEntry {
        FileHashEntry {
            map: map.into(),
            hash: hash.into(),
        }
    }

    #[test]
    fn parses_only_well_formed_rows() {
        let rows = parse_hash_table(FIXTURE).unwrap();
        assert_eq!(
            rows,
            vec![
                entry("bhop_alpha", "0a1b2c3d"),
                entry("bhop_beta", "ffff0000"),
                entry("bhop_alpha", "99999999"),
            ]
        );
    }

    #[test]
    fn lookup_takes_first_row() {
        let rows = parse_hash_table(FIXTURE).unwrap();
        assert_eq!(find_hash(&rows, "bhop_alpha"), Some("0a1b2c3d"));
        assert_eq!(find_hash(&rows, "bhop_upper"), None);
        assert_eq!(find_hash(&rows, "missing"), None);
    }

    #[test]
    fn empty_document_yields_no_rows() {
        assert!(parse_hash_table("").unwrap().is_empty());
        assert!(parse_hash_table("<p>maintenance</p>").unwrap().is_empty());
    }

    #[test]
    fn builds_download_url() {
        assert_eq!(
            download_url("https://main.fastdl.me/h2/", "abcd", "bhop_a"),
            "https://main.fastdl.me/h2/abcd/bhop_a.bsp.bz2"
        );
    }

    #[tokio::test]
    async fn bulk_sync_upserts_all_pairs() {
        let db = Db::connect_in_memory().await.unwrap();
        let src = FixedSource(vec![entry("bhop_a", "aa"), entry("bhop_b", "bb")]);
        let summary = bulk_sync_file_hashes(&db, &src).await.unwrap();
        assert_eq!(summary.rows_upserted, 2);
        assert_eq!(get_file_hash(&db, "bhop_a").await.unwrap().as_deref(), Some("aa"));
        assert_eq!(get_file_hash(&db, "bhop_b").await.unwrap().as_deref(), Some("bb"));

        // second cycle replaces in place
        let src = FixedSource(vec![entry("bhop_a", "cc")]);
        bulk_sync_file_hashes(&db, &src).await.unwrap();
        assert_eq!(get_file_hash(&db, "bhop_a").await.unwrap().as_deref(), Some("cc"));
    }

    #[tokio::test]
    async fn failure_on_later_item_rolls_back_whole_batch() {
        let db = Db::connect_in_memory().await.unwrap();
        upsert_file_hash(&db.pool, "bhop_a", "0000").await.unwrap();

        // the third pair violates the lowercase-hex constraint
        let src = FixedSource(vec![
            entry("bhop_a", "1111"),
            entry("bhop_b", "2222"),
            entry("bhop_c", "NOT-HEX"),
        ]);
        assert!(bulk_sync_file_hashes(&db, &src).await.is_err());

        assert_eq!(get_file_hash(&db, "bhop_a").await.unwrap().as_deref(), Some("0000"));
        assert_eq!(get_state(&db, "bhop_b").await.unwrap(), None);
        assert_eq!(get_state(&db, "bhop_c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_before_writing() {
        let db = Db::connect_in_memory().await.unwrap();
        assert!(bulk_sync_file_hashes(&db, &BrokenSource).await.is_err());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bhop_maps")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
