use mbcas_core::quantities::{format_millicores, parse_millicores};
use mbcas_core::{MbcasError, PodAllocation, PodAllocationSpec, PodRef, Reason, Result};
use mbcas_storage::{AllocationStore, StorageError};
use tracing::{debug, info};

/// Decides whether a newly solved allocation is worth publishing, and
/// writes it through the optimistic-concurrency store when it is.
pub struct AllocationWriter<'a> {
    store: &'a dyn AllocationStore,
    hysteresis_pct: u32,
}

impl<'a> AllocationWriter<'a> {
    pub fn new(store: &'a dyn AllocationStore, hysteresis_pct: u32) -> Self {
        Self { store, hysteresis_pct }
    }

    /// Publish `desired_mc` for `pod` if it clears the hysteresis
    /// threshold against the last-published record, if the shadow price
    /// crossed a sign or order-of-magnitude boundary, or if `force` is
    /// set (the SLO fast path). Returns whether a write actually happened.
    pub fn maybe_publish(
        &self,
        pod: &PodRef,
        desired_mc: i64,
        weight: f64,
        shadow_price: f64,
        reason: Reason,
        force: bool,
    ) -> Result<bool> {
        let name = pod.record_name();
        let existing = self
            .store
            .get(&name)
            .map_err(|e| MbcasError::internal(format!("reading {name}: {e}")))?;

        let should_publish = match &existing {
            None => true,
            Some(record) => {
                force
                    || self.exceeds_hysteresis(record, desired_mc)
                    || shadow_price_regime_changed(record.status.shadow_price, shadow_price)
            }
        };

        if !should_publish {
            debug!(pod = %pod, desired_mc, "within hysteresis band, skipping publish");
            return Ok(false);
        }

        let (generation, expected) = match &existing {
            None => (1, None),
            Some(record) => (record.generation + 1, Some(record.generation)),
        };

        let spec = PodAllocationSpec {
            namespace: pod.namespace.clone(),
            pod_name: pod.name.clone(),
            pod_uid: pod.uid.clone(),
            desired_cpu_request: format_millicores(desired_mc),
            desired_cpu_limit: format_millicores(desired_mc),
            weight,
            reason,
        };

        let mut record = existing.unwrap_or_else(|| PodAllocation::new(pod, spec.clone()));
        record.generation = generation;
        record.spec = spec;
        record.status.shadow_price = shadow_price;
        record.status.phase = mbcas_core::Phase::Pending;

        match self.store.put(record, expected) {
            Ok(()) => {
                info!(pod = %pod, desired_mc, %reason, "published allocation");
                Ok(true)
            }
            Err(StorageError::Conflict { expected, found, .. }) => {
                Err(MbcasError::conflict(name, expected.unwrap_or(0), found))
            }
            Err(e) => Err(MbcasError::internal(format!("writing {name}: {e}"))),
        }
    }

    fn exceeds_hysteresis(&self, record: &PodAllocation, desired_mc: i64) -> bool {
        let Ok(previous_mc) = parse_millicores(&record.spec.desired_cpu_limit) else {
            return true;
        };
        if previous_mc == 0 {
            return desired_mc != 0;
        }
        let delta_pct = ((desired_mc - previous_mc).abs() as f64 / previous_mc as f64) * 100.0;
        delta_pct > self.hysteresis_pct as f64
    }
}

fn shadow_price_regime_changed(old: f64, new: f64) -> bool {
    if old.signum() != new.signum() {
        return true;
    }
    order_of_magnitude(old) != order_of_magnitude(new)
}

fn order_of_magnitude(x: f64) -> i32 {
    if x.abs() < 1e-12 {
        i32::MIN
    } else {
        x.abs().log10().floor() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbcas_storage::InMemoryAllocationStore;

    fn pod() -> PodRef {
        PodRef::new("default", "web", "uid-1")
    }

    #[test]
    fn first_publish_always_writes() {
        let store = InMemoryAllocationStore::new();
        let writer = AllocationWriter::new(&store, 5);
        let wrote = writer.maybe_publish(&pod(), 300, 1.0, 0.0, Reason::Market, false).unwrap();
        assert!(wrote);
        assert!(store.get("default-web").unwrap().is_some());
    }

    #[test]
    fn small_change_within_hysteresis_is_skipped() {
        let store = InMemoryAllocationStore::new();
        let writer = AllocationWriter::new(&store, 5);
        writer.maybe_publish(&pod(), 300, 1.0, 0.0, Reason::Market, false).unwrap();

        let wrote = writer.maybe_publish(&pod(), 305, 1.0, 0.0, Reason::Market, false).unwrap();
        assert!(!wrote);
    }

    #[test]
    fn change_beyond_hysteresis_publishes_and_bumps_generation() {
        let store = InMemoryAllocationStore::new();
        let writer = AllocationWriter::new(&store, 5);
        writer.maybe_publish(&pod(), 300, 1.0, 0.0, Reason::Market, false).unwrap();

        let wrote = writer.maybe_publish(&pod(), 400, 1.0, 0.0, Reason::Market, false).unwrap();
        assert!(wrote);
        let record = store.get("default-web").unwrap().unwrap();
        assert_eq!(record.generation, 2);
        assert_eq!(record.spec.desired_cpu_limit, "400m");
    }

    #[test]
    fn shadow_price_sign_change_forces_publish_even_within_hysteresis() {
        let store = InMemoryAllocationStore::new();
        let writer = AllocationWriter::new(&store, 5);
        writer.maybe_publish(&pod(), 300, 1.0, -1.0, Reason::Market, false).unwrap();

        let wrote = writer.maybe_publish(&pod(), 301, 1.0, 1.0, Reason::Market, false).unwrap();
        assert!(wrote);
    }

    #[test]
    fn forced_publish_bypasses_hysteresis() {
        let store = InMemoryAllocationStore::new();
        let writer = AllocationWriter::new(&store, 5);
        writer.maybe_publish(&pod(), 300, 1.0, 0.0, Reason::Market, false).unwrap();

        let wrote = writer.maybe_publish(&pod(), 301, 1.0, 0.0, Reason::SloViolation, true).unwrap();
        assert!(wrote);
    }

    #[test]
    fn identical_resolve_is_a_no_op() {
        let store = InMemoryAllocationStore::new();
        let writer = AllocationWriter::new(&store, 5);
        writer.maybe_publish(&pod(), 300, 1.0, 0.0, Reason::Market, false).unwrap();
        let before = store.get("default-web").unwrap().unwrap();

        let wrote = writer.maybe_publish(&pod(), 300, 1.0, 0.0, Reason::Market, false).unwrap();
        assert!(!wrote);
        let after = store.get("default-web").unwrap().unwrap();
        assert_eq!(before.generation, after.generation);
    }
}
