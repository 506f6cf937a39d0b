//! Connection pooling for the record store.
//!
//! Pools are built over r2d2 and migrated before they are handed out, so any
//! connection taken from a [`DbPool`] sees the current schema.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tapedeck_common::{Error, Result};

use crate::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;

pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Open (or create) the store at `db_path`.
///
/// Connections enforce foreign keys and wait up to five seconds on a locked
/// database before failing.
///
/// # Example
///
/// ```no_run
/// use tapedeck_db::pool::init_pool;
///
/// let pool = init_pool("/var/lib/tapedeck/tapedeck.db").unwrap();
/// let conn = pool.get().unwrap();
/// ```
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
    });
    build(manager, 4)
}

/// An in-memory store, used by tests and dry runs.
///
/// Every `:memory:` connection is its own database, so the pool holds a
/// single connection.
///
/// ```
/// use tapedeck_db::pool::init_memory_pool;
///
/// let pool = init_memory_pool().unwrap();
/// let conn = pool.get().unwrap();
/// ```
pub fn init_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    build(manager, 1)
}

fn build(manager: SqliteConnectionManager, max_size: u32) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create connection pool: {}", e)))?;

    let mut conn = get_conn(&pool)?;
    let applied = migrations::run_migrations(&mut conn)
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;
    if applied > 0 {
        tracing::info!(applied, version = migrations::latest_version(), "Record store migrated");
    }

    Ok(pool)
}

/// Take a connection, mapping pool exhaustion into the common error type.
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_pool_is_migrated() {
        let pool = init_memory_pool().unwrap();
        assert_eq!(pool.max_size(), 1);

        let conn = get_conn(&pool).unwrap();
        assert_eq!(
            migrations::current_version(&conn).unwrap(),
            migrations::latest_version()
        );
    }

    #[test]
    fn test_connections_enforce_foreign_keys() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);

        // A unit record must reference an imported unit.
        let orphan = conn.execute(
            "INSERT INTO unit_records (checksum, record, reconciled_at) VALUES ('ff', '{}', '2024-01-01T00:00:00Z')",
            [],
        );
        assert!(orphan.is_err());
    }

    #[test]
    fn test_file_pool_reopens_without_remigrating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tapedeck.db");
        let path = path.to_string_lossy();

        {
            let pool = init_pool(&path).unwrap();
            let conn = get_conn(&pool).unwrap();
            conn.execute(
                "INSERT INTO group_records (group_key, record, reconciled_at) VALUES (?, ?, ?)",
                rusqlite::params!["tv:Fargo:S01", "{}", "2024-01-01T00:00:00Z"],
            )
            .unwrap();
        }

        let pool = init_pool(&path).unwrap();
        let conn = get_conn(&pool).unwrap();
        let record: String = conn
            .query_row(
                "SELECT record FROM group_records WHERE group_key = ?",
                ["tv:Fargo:S01"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(record, "{}");
    }
}
