//! Persistence of merged records.

use chrono::Utc;
use tapedeck_common::{Checksum, ContentUnit, GroupKey, Result};
use tapedeck_db::pool::{get_conn, DbPool};
use tapedeck_db::queries::{content_units, records};

use crate::metadata::merge::MergedRecord;

/// Everything written for one group in a single commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCommit {
    pub key: GroupKey,
    pub group: MergedRecord,
    /// Final unit records, group fields already propagated.
    pub units: Vec<(ContentUnit, MergedRecord)>,
}

/// Storage for authoritative records.
pub trait RecordStore: Send + Sync {
    fn load_unit(&self, checksum: &Checksum) -> Result<Option<MergedRecord>>;

    fn load_group(&self, key: &GroupKey) -> Result<Option<MergedRecord>>;

    /// Write the group record and every unit record atomically.
    fn commit_group(&self, commit: &GroupCommit) -> Result<()>;
}

/// [`RecordStore`] backed by the SQLite pool.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: DbPool,
}

impl SqliteRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl RecordStore for SqliteRecordStore {
    fn load_unit(&self, checksum: &Checksum) -> Result<Option<MergedRecord>> {
        let conn = get_conn(&self.pool)?;
        Ok(records::get_unit_record(&conn, checksum)?.map(|stored| stored.record))
    }

    fn load_group(&self, key: &GroupKey) -> Result<Option<MergedRecord>> {
        let conn = get_conn(&self.pool)?;
        Ok(records::get_group_record(&conn, key)?.map(|stored| stored.record))
    }

    fn commit_group(&self, commit: &GroupCommit) -> Result<()> {
        let mut conn = get_conn(&self.pool)?;
        let tx = conn
            .transaction()
            .map_err(|e| tapedeck_common::Error::database(e.to_string()))?;
        let now = Utc::now();

        records::put_group_record(&tx, &commit.key, &commit.group, now)?;
        for (unit, record) in &commit.units {
            content_units::ensure_unit(&tx, unit)?;
            records::put_unit_record(&tx, &unit.checksum, record, now)?;
        }

        tx.commit()
            .map_err(|e| tapedeck_common::Error::database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::provider::ProviderId;
    use tapedeck_db::pool::init_memory_pool;
    use tapedeck_db::queries::records::count_records;

    fn commit() -> GroupCommit {
        let mut group = MergedRecord::new();
        group.insert("network", "FX", ProviderId::Tmdb);
        let mut unit = group.clone();
        unit.insert("depisode", "Lorne Malvo arrives in Bemidji.", ProviderId::Tvmaze);
        GroupCommit {
            key: GroupKey::Season {
                series: "Fargo".into(),
                season: 1,
            },
            group,
            units: vec![(
                ContentUnit::episode(Checksum::parse("a1").unwrap(), "Fargo", 1, 1),
                unit,
            )],
        }
    }

    #[test]
    fn commit_then_load() {
        let store = SqliteRecordStore::new(init_memory_pool().unwrap());
        let commit = commit();
        store.commit_group(&commit).unwrap();

        let group = store.load_group(&commit.key).unwrap().unwrap();
        assert_eq!(group, commit.group);
        let unit = store
            .load_unit(&Checksum::parse("a1").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(unit.value("depisode"), Some("Lorne Malvo arrives in Bemidji."));
        assert_eq!(unit.get("network").unwrap().source, ProviderId::Tmdb);
    }

    #[test]
    fn recommit_overwrites() {
        let store = SqliteRecordStore::new(init_memory_pool().unwrap());
        let mut commit = commit();
        store.commit_group(&commit).unwrap();

        commit.group.insert("network", "FX Networks", ProviderId::Scrape);
        store.commit_group(&commit).unwrap();

        assert_eq!(
            store.load_group(&commit.key).unwrap().unwrap().value("network"),
            Some("FX Networks")
        );
        let conn = store.pool().get().unwrap();
        assert_eq!(count_records(&conn).unwrap(), (1, 1));
    }

    #[test]
    fn missing_records_load_as_none() {
        let store = SqliteRecordStore::new(init_memory_pool().unwrap());
        assert!(store.load_unit(&Checksum::parse("ff").unwrap()).unwrap().is_none());
        assert!(store
            .load_group(&GroupKey::Movie {
                title: "Heat".into(),
                year: None
            })
            .unwrap()
            .is_none());
    }
}
