use crate::{AllocationStore, Result, StorageError};
use mbcas_core::PodAllocation;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const ALLOCATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("pod_allocations");

/// redb-backed allocation store for a standalone reconciler process that
/// needs its view of PodAllocation records to survive a restart.
pub struct RedbAllocationStore {
    db: Arc<Database>,
}

impl RedbAllocationStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("opening PodAllocation store at {}", path.as_ref().display());

        let db = Database::create(path.as_ref())
            .map_err(|e| StorageError::database_error(format!("failed to create database: {}", e), Some(Box::new(e))))?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ALLOCATIONS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl AllocationStore for RedbAllocationStore {
    fn get(&self, name: &str) -> Result<Option<PodAllocation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ALLOCATIONS_TABLE)?;
        match table.get(name)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<PodAllocation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ALLOCATIONS_TABLE)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            out.push(serde_json::from_slice(value.value())?);
        }
        Ok(out)
    }

    fn put(&self, record: PodAllocation, expected_generation: Option<u64>) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ALLOCATIONS_TABLE)?;
            let current_generation = match table.get(record.name.as_str())? {
                Some(value) => {
                    let existing: PodAllocation = serde_json::from_slice(value.value())?;
                    Some(existing.generation)
                }
                None => None,
            };
            match (expected_generation, current_generation) {
                (None, None) => {}
                (Some(exp), Some(cur)) if exp == cur => {}
                (expected, Some(found)) => {
                    return Err(StorageError::conflict(record.name, expected, found));
                }
                (Some(_), None) => {
                    return Err(StorageError::conflict(record.name, expected_generation, 0));
                }
            }
            let bytes = serde_json::to_vec(&record)?;
            debug!("writing PodAllocation record {}", record.name);
            table.insert(record.name.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ALLOCATIONS_TABLE)?;
            table.remove(name)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbcas_core::{PodAllocationSpec, PodRef, Reason};
    use tempfile::tempdir;

    fn record(name: &str) -> PodAllocation {
        let mut r = PodAllocation::new(
            &PodRef::new("default", name, "uid-1"),
            PodAllocationSpec {
                namespace: "default".into(),
                pod_name: name.into(),
                pod_uid: "uid-1".into(),
                desired_cpu_request: "300m".into(),
                desired_cpu_limit: "300m".into(),
                weight: 1.0,
                reason: Reason::Market,
            },
        );
        r.name = format!("default-{name}");
        r
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = RedbAllocationStore::new(dir.path().join("allocations.redb")).unwrap();
        store.put(record("web"), None).unwrap();
        let fetched = store.get("default-web").unwrap().unwrap();
        assert_eq!(fetched.spec.desired_cpu_limit, "300m");
    }

    #[test]
    fn put_rejects_stale_generation() {
        let dir = tempdir().unwrap();
        let store = RedbAllocationStore::new(dir.path().join("allocations.redb")).unwrap();
        store.put(record("web"), None).unwrap();
        let err = store.put(record("web"), Some(7)).unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[test]
    fn list_returns_all_records() {
        let dir = tempdir().unwrap();
        let store = RedbAllocationStore::new(dir.path().join("allocations.redb")).unwrap();
        store.put(record("a"), None).unwrap();
        store.put(record("b"), None).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
    }
}
