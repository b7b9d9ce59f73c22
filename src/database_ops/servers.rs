use anyhow::Result;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, instrument};

use crate::database_ops::db::Db;

/// Interned id of a host/server display name (`servers.id`).
pub type ServerId = i64;

/// Resolve a server display name to its stable id, creating it on first sight.
///
/// Blank names mean "no server" and resolve to `None` without touching the
/// table. The insert is `INSERT OR IGNORE` followed by a mandatory re-read, so
/// two tasks racing on the same new name both end up with the one id that won.
#[instrument(skip(db))]
pub async fn ensure_server(db: &Db, name: &str) -> Result<Option<ServerId>> {
    let mut conn = db.pool.acquire().await?;
    ensure_server_on(&mut *conn, name).await
}

/// [`ensure_server`] on a caller-owned connection, typically an open
/// transaction, so the new row commits or rolls back with the caller's write.
pub async fn ensure_server_on(conn: &mut SqliteConnection, name: &str) -> Result<Option<ServerId>> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }

    if let Some(id) = find_server_on(&mut *conn, name).await? {
        return Ok(Some(id));
    }

    let inserted = sqlx::query("INSERT OR IGNORE INTO servers (name) VALUES (?)")
        .bind(name)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    debug!(server = %name, inserted, "server interned");

    let id: ServerId = sqlx::query_scalar("SELECT id FROM servers WHERE name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    Ok(Some(id))
}

/// Look up a server id by exact display name.
pub async fn find_server(db: &Db, name: &str) -> Result<Option<ServerId>> {
    let mut conn = db.pool.acquire().await?;
    find_server_on(&mut *conn, name).await
}

async fn find_server_on(conn: &mut SqliteConnection, name: &str) -> Result<Option<ServerId>> {
    let row = sqlx::query("SELECT id FROM servers WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| r.get::<i64, _>("id")))
}
