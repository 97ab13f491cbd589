use crate::{AllocationStore, Result, StorageError};
use mbcas_core::PodAllocation;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory allocation store used by tests and by an agent co-located
/// with its reconciler. Not durable across process restarts.
#[derive(Default)]
pub struct InMemoryAllocationStore {
    records: RwLock<HashMap<String, PodAllocation>>,
}

impl InMemoryAllocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AllocationStore for InMemoryAllocationStore {
    fn get(&self, name: &str) -> Result<Option<PodAllocation>> {
        Ok(self.records.read().get(name).cloned())
    }

    fn list(&self) -> Result<Vec<PodAllocation>> {
        Ok(self.records.read().values().cloned().collect())
    }

    fn put(&self, record: PodAllocation, expected_generation: Option<u64>) -> Result<()> {
        let mut records = self.records.write();
        let current_generation = records.get(&record.name).map(|r| r.generation);
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
        records.insert(record.name.clone(), record);
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.records.write().remove(name);
        Ok(())
    }
}
