//! MBCAS Reconciler - the cluster-level control loop that watches
//! PodAllocation records and drives the platform's in-place resize
//! subresource.

pub mod backoff;
pub mod config;
pub mod decide;
pub mod ordering;
pub mod reconciler;

pub use backoff::backoff_duration;
pub use config::ReconcilerConfig;
pub use decide::{decide, ReconcileAction};
pub use ordering::{order_for_node, PendingItem};
pub use reconciler::Reconciler;
