use crate::Result;
use mbcas_core::PodAllocation;

/// The shared medium between the per-node agent and the cluster reconciler.
/// Both sides use optimistic concurrency: a write only succeeds when the
/// caller's view of `generation` is still current.
pub trait AllocationStore: Send + Sync {
    /// Fetch a record by its deterministic name (`PodRef::record_name`).
    fn get(&self, name: &str) -> Result<Option<PodAllocation>>;

    /// List every record currently stored, for reconcile-all sweeps.
    fn list(&self) -> Result<Vec<PodAllocation>>;

    /// Insert or update a record. `expected_generation` must match the
    /// stored generation (or the record must be absent, for `None`) or the
    /// call fails with a conflict that the caller resolves by re-reading
    /// and retrying.
    fn put(&self, record: PodAllocation, expected_generation: Option<u64>) -> Result<()>;

    /// Remove a record (tombstone on missing pod).
    fn delete(&self, name: &str) -> Result<()>;
}
