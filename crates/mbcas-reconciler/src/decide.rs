use mbcas_core::{PodAllocation, Result};
use mbcas_platform::CpuResizePatch;

/// What the reconciler should do with one `Pending` record, given whether
/// its pod is still present.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileAction {
    /// Pod is gone; tombstone the record.
    Tombstone,
    /// Record already reflects the pod's current generation; no platform
    /// call needed.
    Skip,
    /// Apply this patch to the pod's primary container.
    Apply(CpuResizePatch),
}

/// Decide the action for `record`. `pod_present` and `pod_uid` come from a
/// prior `get_pod` lookup; `None` means the pod is absent.
pub fn decide(record: &PodAllocation, pod_uid: Option<&str>) -> Result<ReconcileAction> {
    let Some(pod_uid) = pod_uid else {
        return Ok(ReconcileAction::Tombstone);
    };

    // The pod was recreated under the same name; the stale record belongs
    // to a different UID and is itself stale, not applicable to this pod.
    if pod_uid != record.spec.pod_uid {
        return Ok(ReconcileAction::Tombstone);
    }

    if record.status.phase == mbcas_core::Phase::Applied && record.status.applied_generation == record.generation {
        return Ok(ReconcileAction::Skip);
    }

    let request_mc = record.request_mc().map_err(mbcas_core::MbcasError::internal)?;
    let limit_mc = record.limit_mc().map_err(mbcas_core::MbcasError::internal)?;
    Ok(ReconcileAction::Apply(CpuResizePatch {
        request_mc,
        limit_mc,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbcas_core::{PodAllocationSpec, PodRef, Reason};

    fn record() -> PodAllocation {
        PodAllocation::new(
            &PodRef::new("default", "web", "uid-1"),
            PodAllocationSpec {
                namespace: "default".into(),
                pod_name: "web".into(),
                pod_uid: "uid-1".into(),
                desired_cpu_request: "400m".into(),
                desired_cpu_limit: "400m".into(),
                weight: 1.0,
                reason: Reason::Market,
            },
        )
    }

    #[test]
    fn absent_pod_is_tombstoned() {
        assert_eq!(decide(&record(), None).unwrap(), ReconcileAction::Tombstone);
    }

    #[test]
    fn recreated_pod_with_new_uid_is_tombstoned() {
        assert_eq!(decide(&record(), Some("uid-2")).unwrap(), ReconcileAction::Tombstone);
    }

    #[test]
    fn already_applied_same_generation_is_skipped() {
        let mut record = record();
        record.status.phase = mbcas_core::Phase::Applied;
        record.status.applied_generation = record.generation;
        assert_eq!(decide(&record, Some("uid-1")).unwrap(), ReconcileAction::Skip);
    }

    #[test]
    fn pending_record_yields_apply_patch() {
        let action = decide(&record(), Some("uid-1")).unwrap();
        assert_eq!(action, ReconcileAction::Apply(CpuResizePatch { request_mc: 400, limit_mc: 400 }));
    }
}
