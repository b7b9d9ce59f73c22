//! Record feeds: recent world records, per-map record lists and record detail.
//!
//! Only the fields the sync consumes are interpreted; anything else in the
//! payloads is accepted and dropped. Numeric fields are decoded leniently
//! (number or numeric string) because the upstream is not consistent.

pub mod provider;

pub use provider::SourceJumpProvider;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::database_ops::error::FeedError;

/// Summary row from the recent-records feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordListEntry {
    #[serde(deserialize_with = "de_i64")]
    pub id: i64,
    /// Runner display name.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: String,
    pub map: String,
    #[serde(default)]
    pub time: String,
    #[serde(default, alias = "wrdif")]
    pub wr_dif: String,
    #[serde(default, rename = "steamid", alias = "steamId", alias = "SteamID")]
    pub steam_id: String,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub tier: Option<i64>,
}

/// Full record keyed by record id. Its `map` and `hostname` are the
/// authoritative values for persistence.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDetail {
    #[serde(deserialize_with = "de_i64")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub banned: Option<i64>,
    pub map: String,
    #[serde(default)]
    pub time: String,
    #[serde(default, rename = "steamid", alias = "steamId", alias = "SteamID")]
    pub steam_id: String,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub tier: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub sync: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub strafes: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub jumps: Option<i64>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub hostname: String,
    /// Opaque upstream flags; never persisted.
    #[serde(default)]
    pub invalid: Option<Value>,
    #[serde(default, alias = "badzones")]
    pub bad_zones: Option<Value>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub points: Option<i64>,
}

/// Entry of the per-map record list; the first entry is the map's WR.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapFeedEntry {
    #[serde(deserialize_with = "de_i64")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: String,
    pub map: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub time: String,
    #[serde(
        default,
        alias = "timeseconds",
        alias = "time_seconds",
        deserialize_with = "de_opt_f64"
    )]
    pub time_seconds: Option<f64>,
    #[serde(default, alias = "wrdif")]
    pub wr_dif: String,
    #[serde(default, rename = "steamid", alias = "steamId", alias = "SteamID")]
    pub steam_id: String,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub tier: Option<i64>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub points: Option<i64>,
}

impl MapFeedEntry {
    /// Numeric seconds when the feed supplied them, else parsed from `time`.
    pub fn seconds(&self) -> Option<f64> {
        self.time_seconds
            .filter(|s| s.is_finite() && *s >= 0.0)
            .or_else(|| crate::normalization::try_parse_time(&self.time))
    }
}

/// The three JSON record feeds.
#[async_trait]
pub trait RecordFeed: Send + Sync {
    async fn recent_records(&self) -> Result<Vec<RecordListEntry>, FeedError>;

    async fn record_detail(&self, record_id: i64) -> Result<RecordDetail, FeedError>;

    async fn map_records(&self, map: &str) -> Result<Vec<MapFeedEntry>, FeedError>;

    /// Current WR for `map`: the first entry of its record list.
    async fn map_wr(&self, map: &str) -> Result<MapFeedEntry, FeedError> {
        self.map_records(map)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FeedError::Empty {
                what: format!("record list for {map}"),
            })
    }
}

/// Treat blank strings as absent.
pub(crate) fn non_blank(s: &str) -> Option<&str> {
    let t = s.trim();
    (!t.is_empty()).then_some(t)
}

fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn de_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let v = Value::deserialize(d)?;
    value_as_i64(&v).ok_or_else(|| serde::de::Error::custom(format!("expected integer, got {v}")))
}

fn de_opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(value_as_i64(&Value::deserialize(d)?))
}

fn de_opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(value_as_f64(&Value::deserialize(d)?))
}
