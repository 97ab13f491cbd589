//! MBCAS Core - shared domain types, errors, and quantity parsing for the
//! market-based CPU allocation system.
//!
//! This crate provides:
//! - The domain data model (pod identity, samples, bids, allocations, PodAllocation records)
//! - Error types with miette diagnostics
//! - Millicore quantity parsing shared by every component

pub mod error;
pub mod events;
pub mod quantities;
pub mod types;

pub use error::{ErrorKind, MbcasError, Result};
pub use events::{AllocationEvent, WatchEventType};
pub use types::{
    Allocation, Bid, DemandEstimate, Phase, PodAllocation, PodAllocationSpec, PodAllocationStatus,
    PodPolicy, PodRef, Reason, Sample,
};

// Re-export k8s-openapi types used at the orchestration-platform boundary.
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Node, Pod};
