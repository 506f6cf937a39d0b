//! Schema migrations for the record store.
//!
//! Migrations are embedded SQL scripts applied in order. The applied version
//! lives in SQLite's `user_version` pragma, so a store file carries its own
//! schema level without a bookkeeping table.

use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration {version} ({name}) failed: {source}")]
    Failed {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },

    #[error("Store schema version {found} is newer than this build supports ({supported})")]
    TooNew { found: u32, supported: u32 },
}

/// Ordered `(name, sql)` scripts; the version of each is its 1-based index.
const MIGRATIONS: &[(&str, &str)] = &[("initial", include_str!("001_initial.sql"))];

/// The schema version a fully migrated store reports.
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// The schema version recorded in the store.
pub fn current_version(conn: &Connection) -> Result<u32, MigrationError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the schema up to [`latest_version`].
///
/// Each script runs in its own transaction together with the version bump.
/// Returns the number of scripts applied.
pub fn run_migrations(conn: &mut Connection) -> Result<usize, MigrationError> {
    let found = current_version(conn)?;
    let supported = latest_version();
    if found > supported {
        return Err(MigrationError::TooNew { found, supported });
    }

    let pending = &MIGRATIONS[found as usize..];
    for (offset, (name, sql)) in pending.iter().enumerate() {
        let version = found + offset as u32 + 1;
        let failed = |source| MigrationError::Failed {
            version,
            name: *name,
            source,
        };

        let tx = conn.transaction()?;
        tx.execute_batch(sql).map_err(failed)?;
        tx.pragma_update(None, "user_version", version)
            .map_err(failed)?;
        tx.commit().map_err(failed)?;

        tracing::debug!(version, name, "Applied migration");
    }

    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_run_migrations_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);

        assert_eq!(run_migrations(&mut conn).unwrap(), MIGRATIONS.len());
        assert_eq!(current_version(&conn).unwrap(), latest_version());

        assert_eq!(run_migrations(&mut conn).unwrap(), 0);
    }

    #[test]
    fn test_schema_created() {
        let conn = migrated();

        for table in ["content_units", "unit_records", "group_records"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_newer_store_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", latest_version() + 1)
            .unwrap();

        let err = run_migrations(&mut conn).unwrap_err();
        assert!(matches!(err, MigrationError::TooNew { .. }));
    }

    #[test]
    fn test_kind_check_constraint() {
        let conn = migrated();

        // An episode row without a season violates the CHECK constraint.
        let result = conn.execute(
            "INSERT INTO content_units (checksum, kind, series, episode) VALUES ('ab', 'episode', 'Fargo', 1)",
            [],
        );
        assert!(result.is_err());
    }
}
