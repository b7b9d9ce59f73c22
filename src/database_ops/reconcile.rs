//! Incremental reconciliation of the recent-records feed into the map store.
//!
//! Per list entry:
//! 1. skip when the stored token for `entry.map` already equals `entry.id`
//! 2. fetch the record detail
//! 3. re-check state under `detail.map`, which is the name used for storage
//! 4. existing row: `update_wr` with `detail.id` as the new token
//! 5. no row: best-effort file hash lookup, then `create_map`
//!
//! Failures in steps 1-5 are logged and counted per entry; only a failure to
//! fetch the list itself fails the run.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::database_ops::error::FeedError;
use crate::database_ops::fastdl::{find_hash, FileHashEntry, FileHashSource};
use crate::database_ops::maps::{MapKey, MapStore, NewMap, WrUpdate};
use crate::database_ops::sourcejump::{non_blank, RecordDetail, RecordFeed, RecordListEntry};
use crate::normalization::try_parse_time;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub entries_seen: usize,
    pub skipped_current: usize,
    pub created: usize,
    pub updated: usize,
    /// Details whose time text could not be parsed.
    pub skipped_bad_time: usize,
    pub feed_errors: usize,
    pub storage_errors: usize,
}

enum Outcome {
    Current,
    Created,
    Updated,
    BadTime,
}

enum ItemError {
    Feed(FeedError),
    Storage(anyhow::Error),
}

/// Host table fetched at most once per run, on the first create.
struct HashCache<'a> {
    source: &'a dyn FileHashSource,
    table: Option<Vec<FileHashEntry>>,
}

impl<'a> HashCache<'a> {
    fn new(source: &'a dyn FileHashSource) -> Self {
        Self {
            source,
            table: None,
        }
    }

    async fn lookup(&mut self, map: &str) -> Option<String> {
        if self.table.is_none() {
            match self.source.fetch_hashes().await {
                Ok(rows) => self.table = Some(rows),
                Err(e) => {
                    warn!(map, kind = e.kind(), error = %e, "reconcile: hash lookup failed, creating without hash");
                    return None;
                }
            }
        }
        self.table
            .as_deref()
            .and_then(|rows| find_hash(rows, map))
            .map(str::to_string)
    }
}

/// Run one reconciliation pass over the recent-records feed.
#[instrument(skip_all)]
pub async fn reconcile_recent(
    store: &dyn MapStore,
    feed: &dyn RecordFeed,
    hashes: &dyn FileHashSource,
) -> Result<ReconcileSummary> {
    let entries = feed
        .recent_records()
        .await
        .context("reconcile: fetch recent records")?;

    let mut summary = ReconcileSummary {
        entries_seen: entries.len(),
        ..Default::default()
    };
    let mut cache = HashCache::new(hashes);

    for entry in &entries {
        match reconcile_entry(store, feed, &mut cache, entry).await {
            Ok(Outcome::Current) => summary.skipped_current += 1,
            Ok(Outcome::Created) => summary.created += 1,
            Ok(Outcome::Updated) => summary.updated += 1,
            Ok(Outcome::BadTime) => summary.skipped_bad_time += 1,
            Err(ItemError::Feed(e)) => {
                warn!(record_id = entry.id, map = %entry.map, kind = e.kind(), error = %e, "reconcile: entry skipped");
                summary.feed_errors += 1;
            }
            Err(ItemError::Storage(e)) => {
                warn!(record_id = entry.id, map = %entry.map, kind = "storage", error = %e, "reconcile: entry skipped");
                summary.storage_errors += 1;
            }
        }
    }

    info!(
        entries = summary.entries_seen,
        skipped_current = summary.skipped_current,
        created = summary.created,
        updated = summary.updated,
        skipped_bad_time = summary.skipped_bad_time,
        feed_errors = summary.feed_errors,
        storage_errors = summary.storage_errors,
        "reconcile: pass complete"
    );
    Ok(summary)
}

async fn reconcile_entry(
    store: &dyn MapStore,
    feed: &dyn RecordFeed,
    cache: &mut HashCache<'_>,
    entry: &RecordListEntry,
) -> Result<Outcome, ItemError> {
    let listed = store
        .get_state(&entry.map)
        .await
        .map_err(ItemError::Storage)?;
    if listed.is_some_and(|s| s.is_current(entry.id)) {
        return Ok(Outcome::Current);
    }

    let detail = feed
        .record_detail(entry.id)
        .await
        .map_err(ItemError::Feed)?;
    if try_parse_time(&detail.time).is_none() {
        debug!(record_id = detail.id, time = %detail.time, "reconcile: unparseable time");
        return Ok(Outcome::BadTime);
    }

    match store
        .get_state(&detail.map)
        .await
        .map_err(ItemError::Storage)?
    {
        Some(state) => {
            store
                .update_wr(MapKey::Id(state.id), &wr_update(&detail))
                .await
                .map_err(ItemError::Storage)?;
            debug!(map = %detail.map, record_id = detail.id, "reconcile: wr updated");
            Ok(Outcome::Updated)
        }
        None => {
            let file_hash = cache.lookup(&detail.map).await;
            store
                .create_map(&new_map(&detail, file_hash))
                .await
                .map_err(ItemError::Storage)?;
            debug!(map = %detail.map, record_id = detail.id, "reconcile: map created");
            Ok(Outcome::Created)
        }
    }
}

fn owned(s: &str) -> Option<String> {
    non_blank(s).map(str::to_string)
}

fn wr_update(detail: &RecordDetail) -> WrUpdate {
    WrUpdate {
        wr_time: detail.time.clone(),
        wr_runner: owned(&detail.name),
        hostname: owned(&detail.hostname),
        source_record_id: detail.id,
    }
}

fn new_map(detail: &RecordDetail, file_hash: Option<String>) -> NewMap {
    NewMap {
        name: detail.map.clone(),
        tier: detail.tier,
        wr_time: detail.time.clone(),
        wr_runner: owned(&detail.name),
        hostname: owned(&detail.hostname),
        source_record_id: Some(detail.id),
        file_hash,
    }
}
