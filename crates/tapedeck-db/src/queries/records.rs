//! Merged record queries.
//!
//! Records are stored as JSON documents. A unit record is keyed by the
//! content checksum, a group record by the JSON form of its [`GroupKey`].
//! The display form is for logs only: `Heat (1995)` without a year and
//! `Heat` from 1995 render alike but are different groups.
//! Both writes are upserts: the caller decides what the new document is.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tapedeck_common::{Checksum, Error, GroupKey, Result};

/// A stored record together with the time it was last written.
#[derive(Debug, Clone)]
pub struct StoredRecord<T> {
    pub record: T,
    pub reconciled_at: DateTime<Utc>,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("invalid reconciled_at '{raw}': {e}")))
}

fn group_column(group_key: &GroupKey) -> Result<String> {
    Ok(serde_json::to_string(group_key)?)
}

/// Insert or replace the merged record for a content unit.
pub fn put_unit_record<T: Serialize>(
    conn: &Connection,
    checksum: &Checksum,
    record: &T,
    reconciled_at: DateTime<Utc>,
) -> Result<()> {
    let json = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO unit_records (checksum, record, reconciled_at)
         VALUES (:checksum, :record, :reconciled_at)
         ON CONFLICT(checksum) DO UPDATE SET
             record = excluded.record,
             reconciled_at = excluded.reconciled_at",
        rusqlite::named_params! {
            ":checksum": checksum.as_str(),
            ":record": json,
            ":reconciled_at": reconciled_at.to_rfc3339(),
        },
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Get the merged record for a content unit.
pub fn get_unit_record<T: DeserializeOwned>(
    conn: &Connection,
    checksum: &Checksum,
) -> Result<Option<StoredRecord<T>>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT record, reconciled_at FROM unit_records WHERE checksum = :checksum",
            rusqlite::named_params! { ":checksum": checksum.as_str() },
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| Error::database(e.to_string()))?;

    row.map(|(json, at)| -> Result<StoredRecord<T>> {
        Ok(StoredRecord {
            record: serde_json::from_str(&json)?,
            reconciled_at: parse_timestamp(&at)?,
        })
    })
    .transpose()
}

/// Insert or replace the merged record for a lookup group.
pub fn put_group_record<T: Serialize>(
    conn: &Connection,
    group_key: &GroupKey,
    record: &T,
    reconciled_at: DateTime<Utc>,
) -> Result<()> {
    let json = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO group_records (group_key, record, reconciled_at)
         VALUES (:group_key, :record, :reconciled_at)
         ON CONFLICT(group_key) DO UPDATE SET
             record = excluded.record,
             reconciled_at = excluded.reconciled_at",
        rusqlite::named_params! {
            ":group_key": group_column(group_key)?,
            ":record": json,
            ":reconciled_at": reconciled_at.to_rfc3339(),
        },
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Get the merged record for a lookup group.
pub fn get_group_record<T: DeserializeOwned>(
    conn: &Connection,
    group_key: &GroupKey,
) -> Result<Option<StoredRecord<T>>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT record, reconciled_at FROM group_records WHERE group_key = :group_key",
            rusqlite::named_params! { ":group_key": group_column(group_key)? },
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| Error::database(e.to_string()))?;

    row.map(|(json, at)| -> Result<StoredRecord<T>> {
        Ok(StoredRecord {
            record: serde_json::from_str(&json)?,
            reconciled_at: parse_timestamp(&at)?,
        })
    })
    .transpose()
}

/// Count stored unit and group records, in that order.
pub fn count_records(conn: &Connection) -> Result<(usize, usize)> {
    let units: i64 = conn
        .query_row("SELECT COUNT(*) FROM unit_records", [], |row| row.get(0))
        .map_err(|e| Error::database(e.to_string()))?;
    let groups: i64 = conn
        .query_row("SELECT COUNT(*) FROM group_records", [], |row| row.get(0))
        .map_err(|e| Error::database(e.to_string()))?;
    Ok((units as usize, groups as usize))
}
