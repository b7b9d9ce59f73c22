use tracing::{info, warn};

use crate::database_ops::db::Db;
use crate::database_ops::maps::{get_full_details, save_map_wr, MapDetails};
use crate::database_ops::sourcejump::{non_blank, MapFeedEntry, RecordFeed};

/// Fill in the WR of a map that has none stored yet.
///
/// Calls the per-map feed once, persists the first entry through
/// [`save_map_wr`] and returns the refreshed details. Feed or storage
/// failures are logged and the input is returned as far as it could be
/// completed; a map that already has a WR time is returned untouched.
pub async fn ensure_map_wr(db: &Db, feed: &dyn RecordFeed, details: MapDetails) -> MapDetails {
    if details.record.wr_time_seconds.is_some() {
        return details;
    }
    let map = details.record.name.clone();
    info!(map = %map, "lazy fill: fetching wr");

    let entry = match feed.map_wr(&map).await {
        Ok(entry) => entry,
        Err(e) => {
            warn!(map = %map, kind = e.kind(), error = %e, "lazy fill: feed failed");
            return details;
        }
    };

    if let Err(e) = save_map_wr(db, &map, &entry).await {
        warn!(map = %map, error = %e, "lazy fill: save failed");
        return merge(details, &entry);
    }

    match get_full_details(db, &map).await {
        Ok(Some(fresh)) => fresh,
        Ok(None) => merge(details, &entry),
        Err(e) => {
            warn!(map = %map, error = %e, "lazy fill: reload failed");
            merge(details, &entry)
        }
    }
}

fn merge(mut details: MapDetails, entry: &MapFeedEntry) -> MapDetails {
    let record = &mut details.record;
    record.wr_time_seconds = entry.seconds();
    record.wr_runner = non_blank(&entry.name).map(str::to_string);
    record.wr_source_record_id = Some(entry.id);
    record.tier = entry.tier.or(record.tier);
    details.wr_server = non_blank(&entry.hostname).map(str::to_string);
    details
}
