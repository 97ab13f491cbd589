use crate::types::PodAllocation;
use serde::{Deserialize, Serialize};

/// Watch event type for PodAllocation record changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

/// Emitted by the allocation store whenever a PodAllocation record changes,
/// so the reconciler's watch loop and the writer's idempotency check can
/// share a single source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationEvent {
    pub event_type: WatchEventType,
    pub record_name: String,
    pub record: Option<PodAllocation>,
}

impl AllocationEvent {
    pub fn added(record: PodAllocation) -> Self {
        Self {
            event_type: WatchEventType::Added,
            record_name: record.name.clone(),
            record: Some(record),
        }
    }

    pub fn modified(record: PodAllocation) -> Self {
        Self {
            event_type: WatchEventType::Modified,
            record_name: record.name.clone(),
            record: Some(record),
        }
    }

    pub fn deleted(record_name: impl Into<String>) -> Self {
        Self {
            event_type: WatchEventType::Deleted,
            record_name: record_name.into(),
            record: None,
        }
    }
}
