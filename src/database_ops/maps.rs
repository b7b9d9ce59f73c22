//! Per-map record persistence.
//!
//! One `bhop_maps` row per map name. WR, TAS and file-hash columns are owned by
//! different sync paths and every update below touches only its own group.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::{FromRow, Sqlite};
use tracing::{debug, instrument};

use crate::database_ops::db::Db;
use crate::database_ops::servers::{ensure_server_on, ServerId};
use crate::database_ops::sourcejump::{non_blank, MapFeedEntry};
use crate::normalization::try_parse_time;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct MapRecord {
    pub id: i64,
    pub name: String,
    pub tier: Option<i64>,
    pub wr_time_seconds: Option<f64>,
    pub wr_runner: Option<String>,
    /// Upstream record id of the stored WR; a change-detection token only.
    pub wr_source_record_id: Option<i64>,
    pub tas_time_seconds: Option<f64>,
    pub tas_runner: Option<String>,
    pub wr_server_id: Option<ServerId>,
    pub tas_server_id: Option<ServerId>,
    pub file_hash: Option<String>,
}

/// A map row with its server references resolved to display names.
#[derive(Debug, Clone, PartialEq)]
pub struct MapDetails {
    pub record: MapRecord,
    pub wr_server: Option<String>,
    pub tas_server: Option<String>,
}

/// What the Reconciler needs to decide skip / update / create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapState {
    pub id: i64,
    pub source_record_id: Option<i64>,
}

impl MapState {
    pub fn is_current(&self, record_id: i64) -> bool {
        self.source_record_id == Some(record_id)
    }
}

/// Row addressing for updates.
#[derive(Debug, Clone, Copy)]
pub enum MapKey<'a> {
    Id(i64),
    Name(&'a str),
}

/// Fields for a new map row. `wr_time` is raw feed text.
#[derive(Debug, Clone, Default)]
pub struct NewMap {
    pub name: String,
    pub tier: Option<i64>,
    pub wr_time: String,
    pub wr_runner: Option<String>,
    pub hostname: Option<String>,
    pub source_record_id: Option<i64>,
    pub file_hash: Option<String>,
}

/// WR replacement for an existing row. `wr_time` is raw feed text.
#[derive(Debug, Clone, Default)]
pub struct WrUpdate {
    pub wr_time: String,
    pub wr_runner: Option<String>,
    pub hostname: Option<String>,
    pub source_record_id: i64,
}

fn parse_wr_time(text: &str) -> Result<f64> {
    try_parse_time(text).ok_or_else(|| anyhow!("invalid time text {text:?}"))
}

fn require_name(name: &str) -> Result<&str> {
    if name.trim().is_empty() {
        return Err(anyhow!("map name must not be blank"));
    }
    Ok(name)
}

fn owned_non_blank(s: Option<&str>) -> Option<String> {
    s.and_then(non_blank).map(str::to_string)
}

const MAP_COLUMNS: &str = "m.id AS id, m.name AS name, m.tier AS tier, \
     m.wr_time_seconds AS wr_time_seconds, m.wr_runner AS wr_runner, \
     m.wr_source_record_id AS wr_source_record_id, m.tas_time_seconds AS tas_time_seconds, \
     m.tas_runner AS tas_runner, m.wr_server_id AS wr_server_id, \
     m.tas_server_id AS tas_server_id, m.file_hash AS file_hash";

/// Existence, id and change-detection token for `map_name`.
pub async fn get_state(db: &Db, map_name: &str) -> Result<Option<MapState>> {
    let row: Option<(i64, Option<i64>)> =
        sqlx::query_as("SELECT id, wr_source_record_id FROM bhop_maps WHERE name = ?")
            .bind(map_name)
            .fetch_optional(&db.pool)
            .await?;
    Ok(row.map(|(id, source_record_id)| MapState {
        id,
        source_record_id,
    }))
}

/// Full row for `map_name` with server display names joined in. Like every
/// lookup here the name is matched exactly; callers trim user input.
pub async fn get_full_details(db: &Db, map_name: &str) -> Result<Option<MapDetails>> {
    #[derive(FromRow)]
    struct Joined {
        #[sqlx(flatten)]
        record: MapRecord,
        wr_server: Option<String>,
        tas_server: Option<String>,
    }

    let q = format!(
        "SELECT {MAP_COLUMNS}, s1.name AS wr_server, s2.name AS tas_server
         FROM bhop_maps m
         LEFT JOIN servers s1 ON m.wr_server_id = s1.id
         LEFT JOIN servers s2 ON m.tas_server_id = s2.id
         WHERE m.name = ?"
    );
    let row = sqlx::query_as::<_, Joined>(&q)
        .bind(map_name)
        .fetch_optional(&db.pool)
        .await?;
    Ok(row.map(|j| MapDetails {
        record: j.record,
        wr_server: j.wr_server,
        tas_server: j.tas_server,
    }))
}

/// Insert a new map row. Fails on a blank name, an invalid time or when the
/// name already exists. The server resolve and the insert share one
/// transaction, so a failed create leaves no new server behind either.
#[instrument(skip(db, new), fields(map = %new.name))]
pub async fn create_map(db: &Db, new: &NewMap) -> Result<i64> {
    let name = require_name(&new.name)?;
    let wr_time = parse_wr_time(&new.wr_time)?;

    let mut tx = db.pool.begin().await?;
    let server_id = ensure_server_on(&mut *tx, new.hostname.as_deref().unwrap_or("")).await?;

    let id = sqlx::query(
        "INSERT INTO bhop_maps
            (name, tier, wr_time_seconds, wr_runner, wr_source_record_id, wr_server_id, file_hash)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(new.tier)
    .bind(wr_time)
    .bind(owned_non_blank(new.wr_runner.as_deref()))
    .bind(new.source_record_id)
    .bind(server_id)
    .bind(owned_non_blank(new.file_hash.as_deref()))
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();
    tx.commit().await?;
    debug!(map_id = id, "map created");
    Ok(id)
}

/// Replace WR fields and the change-detection token. TAS and file-hash
/// columns are untouched. Returns affected rows (0 when the map is absent).
#[instrument(skip(db, wr))]
pub async fn update_wr(db: &Db, key: MapKey<'_>, wr: &WrUpdate) -> Result<u64> {
    let wr_time = parse_wr_time(&wr.wr_time)?;
    let mut tx = db.pool.begin().await?;
    let server_id = ensure_server_on(&mut *tx, wr.hostname.as_deref().unwrap_or("")).await?;

    let set = "UPDATE bhop_maps
               SET wr_time_seconds = ?, wr_runner = ?, wr_server_id = ?, wr_source_record_id = ?";
    let q = match key {
        MapKey::Id(_) => format!("{set} WHERE id = ?"),
        MapKey::Name(_) => format!("{set} WHERE name = ?"),
    };
    let query = sqlx::query(&q)
        .bind(wr_time)
        .bind(owned_non_blank(wr.wr_runner.as_deref()))
        .bind(server_id)
        .bind(wr.source_record_id);
    let query = match key {
        MapKey::Id(id) => query.bind(id),
        MapKey::Name(name) => query.bind(name),
    };
    let affected = query.execute(&mut *tx).await?.rows_affected();
    tx.commit().await?;
    Ok(affected)
}

/// Replace TAS fields of `map_name`. Returns affected rows.
#[instrument(skip(db))]
pub async fn update_tas(
    db: &Db,
    map_name: &str,
    tas_time_seconds: f64,
    runner: Option<&str>,
    server_name: Option<&str>,
) -> Result<u64> {
    let mut tx = db.pool.begin().await?;
    let server_id = ensure_server_on(&mut *tx, server_name.unwrap_or("")).await?;
    let res = sqlx::query(
        "UPDATE bhop_maps SET tas_time_seconds = ?, tas_runner = ?, tas_server_id = ? WHERE name = ?",
    )
    .bind(tas_time_seconds)
    .bind(owned_non_blank(runner))
    .bind(server_id)
    .bind(map_name)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(res.rows_affected())
}

/// Insert-or-update of the file hash alone, keyed by map name. Generic over
/// the executor so the bulk sync can run it inside one transaction.
pub async fn upsert_file_hash<'e, E>(executor: E, map_name: &str, hash: &str) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO bhop_maps (name, file_hash) VALUES (?, ?)
         ON CONFLICT(name) DO UPDATE SET file_hash = excluded.file_hash",
    )
    .bind(map_name)
    .bind(hash)
    .execute(executor)
    .await?;
    Ok(())
}

/// Stored file hash of `map_name`, if any.
pub async fn get_file_hash(db: &Db, map_name: &str) -> Result<Option<String>> {
    let hash: Option<Option<String>> =
        sqlx::query_scalar("SELECT file_hash FROM bhop_maps WHERE name = ?")
            .bind(map_name)
            .fetch_optional(&db.pool)
            .await?;
    Ok(hash.flatten())
}

/// Case-insensitive substring search over map names, lexicographic order.
pub async fn search_maps(db: &Db, query: &str, limit: i64) -> Result<Vec<String>> {
    let escaped = query
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let pattern = format!("%{escaped}%");
    let names = sqlx::query_scalar::<_, String>(
        "SELECT name FROM bhop_maps WHERE name LIKE ? ESCAPE '\\' ORDER BY name LIMIT ?",
    )
    .bind(pattern)
    .bind(limit.max(0))
    .fetch_all(&db.pool)
    .await?;
    Ok(names)
}

/// Persist the WR from a per-map feed entry: update the existing row by name
/// (WR fields, tier, token) or create it when absent.
#[instrument(skip(db, entry), fields(map = %map_name, record_id = entry.id))]
pub async fn save_map_wr(db: &Db, map_name: &str, entry: &MapFeedEntry) -> Result<()> {
    let map_name = require_name(map_name)?;
    let seconds = entry
        .seconds()
        .ok_or_else(|| anyhow!("map feed entry {} has no valid time", entry.id))?;
    let mut tx = db.pool.begin().await?;
    let server_id = ensure_server_on(&mut *tx, &entry.hostname).await?;

    sqlx::query(
        "INSERT INTO bhop_maps
            (name, tier, wr_time_seconds, wr_runner, wr_source_record_id, wr_server_id)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET
            tier = COALESCE(excluded.tier, bhop_maps.tier),
            wr_time_seconds = excluded.wr_time_seconds,
            wr_runner = excluded.wr_runner,
            wr_source_record_id = excluded.wr_source_record_id,
            wr_server_id = excluded.wr_server_id",
    )
    .bind(map_name)
    .bind(entry.tier)
    .bind(seconds)
    .bind(owned_non_blank(Some(entry.name.as_str())))
    .bind(entry.id)
    .bind(server_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

/// Store operations the Reconciler depends on.
#[async_trait]
pub trait MapStore: Send + Sync {
    async fn get_state(&self, map_name: &str) -> Result<Option<MapState>>;
    async fn create_map(&self, new: &NewMap) -> Result<i64>;
    async fn update_wr(&self, key: MapKey<'_>, wr: &WrUpdate) -> Result<u64>;
}

#[async_trait]
impl MapStore for Db {
    async fn get_state(&self, map_name: &str) -> Result<Option<MapState>> {
        get_state(self, map_name).await
    }

    async fn create_map(&self, new: &NewMap) -> Result<i64> {
        create_map(self, new).await
    }

    async fn update_wr(&self, key: MapKey<'_>, wr: &WrUpdate) -> Result<u64> {
        update_wr(self, key, wr).await
    }
}
