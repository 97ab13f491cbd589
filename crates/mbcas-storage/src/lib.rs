//! MBCAS Storage - the PodAllocation record store shared between the
//! per-node agent and the cluster reconciler.

pub mod error;
pub mod memory;
pub mod redb_backend;
pub mod store;

pub use error::{Result, StorageError};
pub use memory::InMemoryAllocationStore;
pub use redb_backend::RedbAllocationStore;
pub use store::AllocationStore;
