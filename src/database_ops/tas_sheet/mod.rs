//! TAS spreadsheet export: CSV with a header row and the columns
//! `map, time, runner, server`. Extra columns are ignored.

use anyhow::{Context, Result};
use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord, Trim};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use crate::database_ops::db::Db;
use crate::database_ops::error::FeedError;
use crate::database_ops::http::fetch_text;
use crate::database_ops::maps::update_tas;
use crate::normalization::try_parse_time;

pub const DEFAULT_SHEET_ID: &str = "1D02pV-VWrJK8M_GVpk434YvfEZbkfUIplEQlOlq0rTc";
pub const DEFAULT_SHEET_GID: &str = "1663410541";

/// One data row of the sheet, still in text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TasRow {
    pub map: String,
    pub time: String,
    pub runner: Option<String>,
    pub server: Option<String>,
}

pub fn sheet_export_url(sheet_id: &str, gid: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{sheet_id}/export?format=csv&gid={gid}")
}

fn column(rec: &StringRecord, idx: usize) -> Option<String> {
    rec.get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse the CSV body. The first row is the header; rows with fewer than
/// two columns are dropped here. A malformed document is a parse failure.
pub fn parse_tas_csv(body: &str) -> Result<Vec<TasRow>, FeedError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(|e| FeedError::parse("tas sheet csv", e))?;
        if rec.len() < 2 {
            continue;
        }
        rows.push(TasRow {
            map: rec.get(0).unwrap_or_default().to_string(),
            time: rec.get(1).unwrap_or_default().to_string(),
            runner: column(&rec, 2),
            server: column(&rec, 3),
        });
    }
    Ok(rows)
}

#[async_trait]
pub trait TasSource: Send + Sync {
    async fn fetch_rows(&self) -> Result<Vec<TasRow>, FeedError>;
}

#[derive(Debug, Clone)]
pub struct TasSheetProvider {
    url: String,
    http: Client,
}

impl TasSheetProvider {
    pub fn new(url: String, http: Client) -> Self {
        Self { url, http }
    }

    /// Provider for a sheet id/gid pair, defaulting to the public TAS sheet.
    pub fn for_sheet(sheet_id: Option<&str>, gid: Option<&str>, http: Client) -> Self {
        Self::new(
            sheet_export_url(
                sheet_id.unwrap_or(DEFAULT_SHEET_ID),
                gid.unwrap_or(DEFAULT_SHEET_GID),
            ),
            http,
        )
    }
}

#[async_trait]
impl TasSource for TasSheetProvider {
    async fn fetch_rows(&self) -> Result<Vec<TasRow>, FeedError> {
        let body = fetch_text(&self.http, &self.url).await?;
        parse_tas_csv(&body)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TasSyncSummary {
    pub rows_seen: usize,
    pub rows_applied: usize,
    /// Rows whose map has no stored record.
    pub rows_unmatched: usize,
    pub rows_bad_time: usize,
    pub rows_failed: usize,
}

/// Apply every sheet row through `update_tas`. Rows are independent: a bad
/// time or a storage failure on one row is logged and the rest continue.
#[instrument(skip_all)]
pub async fn sync_tas(db: &Db, source: &dyn TasSource) -> Result<TasSyncSummary> {
    let rows = source.fetch_rows().await.context("tas: fetch sheet")?;
    let summary = apply_tas_rows(db, &rows).await;
    info!(
        rows_seen = summary.rows_seen,
        rows_applied = summary.rows_applied,
        rows_unmatched = summary.rows_unmatched,
        rows_bad_time = summary.rows_bad_time,
        rows_failed = summary.rows_failed,
        "tas: sync complete"
    );
    Ok(summary)
}

pub async fn apply_tas_rows(db: &Db, rows: &[TasRow]) -> TasSyncSummary {
    let mut summary = TasSyncSummary {
        rows_seen: rows.len(),
        ..Default::default()
    };
    for row in rows {
        if row.map.is_empty() {
            summary.rows_unmatched += 1;
            continue;
        }
        let Some(seconds) = try_parse_time(&row.time) else {
            debug!(map = %row.map, time = %row.time, "tas: unparseable time, row skipped");
            summary.rows_bad_time += 1;
            continue;
        };
        match update_tas(
            db,
            &row.map,
            seconds,
            row.runner.as_deref(),
            row.server.as_deref(),
        )
        .await
        {
            Ok(0) => summary.rows_unmatched += 1,
            Ok(_) => summary.rows_applied += 1,
            Err(e) => {
                warn!(map = %row.map, error = %e, "tas: update failed");
                summary.rows_failed += 1;
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::maps::{create_map, get_full_details, NewMap};

    const SHEET: &str = "\
Map,Time,Runner,Server,Notes
bhop_a,1:02.500,alice,EU-1,first
bhop_b,not-a-time,bob,EU-1
bhop_c, 12.345 ,carol,,
bhop_short
bhop_d,0:59.000
";

    struct FixedSheet(String);

    #[async_trait]
    impl TasSource for FixedSheet {
        async fn fetch_rows(&self) -> Result<Vec<TasRow>, FeedError> {
            parse_tas_csv(&self.0)
        }
    }

    async fn seeded(names: &[&str]) -> Db {
        let db = Db::connect_in_memory().await.unwrap();
        for name in names {
            create_map(
                &db,
                &NewMap {
                    name: name.to_string(),
                    wr_time: "1:00.000".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        db
    }

    #[test]
    fn parses_rows_and_drops_short_ones() {
        let rows = parse_tas_csv(SHEET).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0],
            TasRow {
                map: "bhop_a".into(),
                time: "1:02.500".into(),
                runner: Some("alice".into()),
                server: Some("EU-1".into()),
            }
        );
        assert_eq!(rows[2].time, "12.345");
        assert_eq!(rows[2].server, None);
        assert_eq!(rows[3].runner, None);
    }

    #[test]
    fn header_only_sheet_is_empty() {
        assert!(parse_tas_csv("Map,Time,Runner,Server\n").unwrap().is_empty());
        assert!(parse_tas_csv("").unwrap().is_empty());
    }

    #[test]
    fn export_url_embeds_sheet_and_gid() {
        assert_eq!(
            sheet_export_url("abc", "42"),
            "https://docs.google.com/spreadsheets/d/abc/export?format=csv&gid=42"
        );
    }

    #[tokio::test]
    async fn bad_row_is_skipped_and_neighbours_applied() {
        let db = seeded(&["bhop_a", "bhop_b", "bhop_c"]).await;
        let summary = sync_tas(&db, &FixedSheet(SHEET.into())).await.unwrap();

        assert_eq!(summary.rows_seen, 4);
        assert_eq!(summary.rows_applied, 2);
        assert_eq!(summary.rows_bad_time, 1);
        assert_eq!(summary.rows_unmatched, 1);
        assert_eq!(summary.rows_failed, 0);

        let a = get_full_details(&db, "bhop_a").await.unwrap().unwrap();
        assert_eq!(a.record.tas_time_seconds, Some(62.5));
        assert_eq!(a.record.tas_runner.as_deref(), Some("alice"));
        assert_eq!(a.tas_server.as_deref(), Some("EU-1"));

        let b = get_full_details(&db, "bhop_b").await.unwrap().unwrap();
        assert_eq!(b.record.tas_time_seconds, None);

        let c = get_full_details(&db, "bhop_c").await.unwrap().unwrap();
        assert_eq!(c.record.tas_time_seconds, Some(12.345));
        assert_eq!(c.tas_server, None);
    }

    #[tokio::test]
    async fn storage_failure_on_one_row_does_not_stop_the_rest() {
        let db = seeded(&["bhop_a", "bhop_b", "bhop_c"]).await;
        sqlx::query(
            "CREATE TRIGGER reject_bhop_b BEFORE UPDATE ON bhop_maps
             WHEN NEW.name = 'bhop_b'
             BEGIN SELECT RAISE(ABORT, 'bhop_b is read-only'); END",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let sheet = "\
Map,Time,Runner,Server
bhop_a,10.000,alice,EU-1
bhop_b,20.000,bob,ONLY-B
bhop_c,30.000,carol,EU-1
";
        let summary = sync_tas(&db, &FixedSheet(sheet.into())).await.unwrap();
        assert_eq!(summary.rows_seen, 3);
        assert_eq!(summary.rows_applied, 2);
        assert_eq!(summary.rows_failed, 1);

        for (name, secs) in [("bhop_a", 10.0), ("bhop_c", 30.0)] {
            let d = get_full_details(&db, name).await.unwrap().unwrap();
            assert_eq!(d.record.tas_time_seconds, Some(secs));
        }
        let b = get_full_details(&db, "bhop_b").await.unwrap().unwrap();
        assert_eq!(b.record.tas_time_seconds, None);
        // the failed row's server was interned in the rolled-back write
        let servers: Vec<String> = sqlx::query_scalar("SELECT name FROM servers ORDER BY name")
            .fetch_all(&db.pool)
            .await
            .unwrap();
        assert_eq!(servers, vec!["EU-1"]);
    }

    #[tokio::test]
    async fn tas_sync_leaves_wr_fields_alone() {
        let db = seeded(&["bhop_a"]).await;
        sync_tas(&db, &FixedSheet(SHEET.into())).await.unwrap();
        let a = get_full_details(&db, "bhop_a").await.unwrap().unwrap();
        assert_eq!(a.record.wr_time_seconds, Some(60.0));
    }
}
