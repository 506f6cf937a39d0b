//! Content unit queries.
//!
//! Content units are written by the import stage and only read during
//! reconciliation.

use rusqlite::Connection;
use tapedeck_common::{Checksum, ContentKind, ContentUnit, Error, Result};

/// Parse a content unit from a database row.
///
/// Expects columns in order: checksum, kind, title, year, series, season, episode.
fn parse_unit_row(row: &rusqlite::Row) -> rusqlite::Result<ContentUnit> {
    let checksum: String = row.get(0)?;
    let checksum = Checksum::parse(checksum).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let kind: String = row.get(1)?;

    let kind = match kind.as_str() {
        "movie" => ContentKind::Movie {
            title: row.get(2)?,
            year: row.get(3)?,
        },
        "episode" => ContentKind::Episode {
            series: row.get(4)?,
            season: row.get(5)?,
            episode: row.get(6)?,
        },
        other => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown content kind: {other}").into(),
            ))
        }
    };

    Ok(ContentUnit { checksum, kind })
}

/// Insert a content unit.
///
/// Re-inserting a checksum that already exists is rejected: units are
/// immutable once imported.
pub fn insert_unit(conn: &Connection, unit: &ContentUnit) -> Result<()> {
    let (kind, title, year, series, season, episode) = match &unit.kind {
        ContentKind::Movie { title, year } => {
            ("movie", Some(title.as_str()), *year, None, None, None)
        }
        ContentKind::Episode {
            series,
            season,
            episode,
        } => (
            "episode",
            None,
            None,
            Some(series.as_str()),
            Some(*season),
            Some(*episode),
        ),
    };

    conn.execute(
        "INSERT INTO content_units (checksum, kind, title, year, series, season, episode)
         VALUES (:checksum, :kind, :title, :year, :series, :season, :episode)",
        rusqlite::named_params! {
            ":checksum": unit.checksum.as_str(),
            ":kind": kind,
            ":title": title,
            ":year": year,
            ":series": series,
            ":season": season,
            ":episode": episode,
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::invalid_input(format!(
                "content unit {} already exists or is incomplete",
                unit.checksum
            ))
        }
        other => Error::database(other.to_string()),
    })?;

    Ok(())
}

/// Insert a content unit unless its checksum is already present.
///
/// Returns `true` when a row was written. An existing row is left untouched
/// even if its identity differs.
pub fn ensure_unit(conn: &Connection, unit: &ContentUnit) -> Result<bool> {
    if get_unit(conn, &unit.checksum)?.is_some() {
        return Ok(false);
    }
    insert_unit(conn, unit)?;
    Ok(true)
}

/// Get a content unit by checksum.
pub fn get_unit(conn: &Connection, checksum: &Checksum) -> Result<Option<ContentUnit>> {
    let result = conn.query_row(
        "SELECT checksum, kind, title, year, series, season, episode
         FROM content_units WHERE checksum = :checksum",
        rusqlite::named_params! { ":checksum": checksum.as_str() },
        parse_unit_row,
    );

    match result {
        Ok(unit) => Ok(Some(unit)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List every content unit, ordered for stable batch composition.
pub fn list_units(conn: &Connection) -> Result<Vec<ContentUnit>> {
    let mut stmt = conn
        .prepare(
            "SELECT checksum, kind, title, year, series, season, episode
             FROM content_units
             ORDER BY kind, series, season, episode, title, checksum",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let units = stmt
        .query_map([], parse_unit_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(units)
}
