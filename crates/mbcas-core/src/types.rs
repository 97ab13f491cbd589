use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label a pod must carry to participate in the market.
pub const MANAGED_LABEL: &str = "mbcas.io/managed";
pub const ANNOTATION_TARGET_LATENCY_MS: &str = "mbcas.io/target-latency-ms";
pub const ANNOTATION_WEIGHT: &str = "mbcas.io/weight";
pub const ANNOTATION_MIN: &str = "mbcas.io/min";
pub const ANNOTATION_MAX: &str = "mbcas.io/max";

/// Stable identity for a managed workload, independent of its presentation
/// name. Carried alongside derived state instead of a back-pointer to the
/// live pod object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

impl PodRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: uid.into(),
        }
    }

    /// Deterministic PodAllocation record name, derived once and used
    /// consistently everywhere a record is looked up or written.
    pub fn record_name(&self) -> String {
        format!("{}-{}", self.namespace, self.name)
    }
}

impl std::fmt::Display for PodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Policy annotations read off a managed pod. Unset fields fall back to the
/// documented defaults at the call site that builds a bid, not here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodPolicy {
    pub target_latency_ms: Option<u32>,
    pub weight: Option<f64>,
    pub min_mc: Option<i64>,
    pub max_mc: Option<i64>,
}

impl PodPolicy {
    /// Extract policy annotations from a pod's annotation map. Malformed
    /// values are dropped (treated as absent) rather than rejected — an
    /// operator typo should degrade to the default, not break scheduling.
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        Self {
            target_latency_ms: annotations
                .get(ANNOTATION_TARGET_LATENCY_MS)
                .and_then(|v| v.parse().ok()),
            weight: annotations.get(ANNOTATION_WEIGHT).and_then(|v| v.parse().ok()),
            min_mc: annotations
                .get(ANNOTATION_MIN)
                .and_then(|v| crate::quantities::parse_millicores(v).ok()),
            max_mc: annotations
                .get(ANNOTATION_MAX)
                .and_then(|v| crate::quantities::parse_millicores(v).ok()),
        }
    }

    pub fn is_managed(annotations: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
        labels.get(MANAGED_LABEL).map(String::as_str) == Some("true")
            || annotations.get(MANAGED_LABEL).map(String::as_str) == Some("true")
    }
}

/// A single cgroup/PSI reading for one pod at one instant.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub cpu_usage_ns: u64,
    pub throttled_ns: u64,
    pub nr_throttled: u64,
    pub pressure_some: f64,
    pub timestamp: std::time::Instant,
}

/// Smoothed per-pod demand state carried across ticks in the agent's ring.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemandEstimate {
    pub usage_mc: f64,
    pub throttling_ratio: f64,
    pub latent_demand_mc: f64,
}

/// A participant's bid into the market for one solve pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Bid {
    pub uid: String,
    pub demand_mc: i64,
    pub weight: f64,
    pub min_mc: i64,
    pub max_mc: i64,
}

impl Bid {
    /// 0 ≤ min ≤ demand ≤ max must hold; capacity against node-wide
    /// usable CPU is checked by the solver against the full bid set,
    /// not here.
    pub fn is_well_formed(&self) -> bool {
        0 <= self.min_mc && self.min_mc <= self.demand_mc && self.demand_mc <= self.max_mc
    }
}

/// Solver output for one node: per-bid allocation plus the shared shadow
/// price.
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    pub per_pod_mc: BTreeMap<String, i64>,
    pub shadow_price: f64,
    pub degraded: bool,
}

/// Why a PodAllocation record holds its current desired values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Reason {
    Market,
    SloViolation,
    FastUp,
    Degraded,
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Reason::Market => "Market",
            Reason::SloViolation => "SLOViolation",
            Reason::FastUp => "FastUp",
            Reason::Degraded => "Degraded",
        };
        write!(f, "{}", s)
    }
}

/// Reconciliation state of a PodAllocation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Phase {
    Pending,
    Applied,
    Failed,
}

/// Spec half of a PodAllocation record — what the agent wants applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodAllocationSpec {
    pub namespace: String,
    pub pod_name: String,
    pub pod_uid: String,
    pub desired_cpu_request: String,
    pub desired_cpu_limit: String,
    pub weight: f64,
    pub reason: Reason,
}

/// Status half of a PodAllocation record — what the reconciler observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodAllocationStatus {
    pub phase: Phase,
    pub applied_generation: u64,
    pub last_applied_time: Option<chrono::DateTime<chrono::Utc>>,
    pub message: Option<String>,
    pub shadow_price: f64,
}

impl Default for PodAllocationStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Pending,
            applied_generation: 0,
            last_applied_time: None,
            message: None,
            shadow_price: 0.0,
        }
    }
}

/// The full published record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodAllocation {
    pub name: String,
    pub generation: u64,
    pub spec: PodAllocationSpec,
    pub status: PodAllocationStatus,
}

impl PodAllocation {
    pub fn new(pod_ref: &PodRef, spec: PodAllocationSpec) -> Self {
        Self {
            name: pod_ref.record_name(),
            generation: 1,
            spec,
            status: PodAllocationStatus::default(),
        }
    }

    /// desired-request must be ≤ desired-limit; checked against the
    /// parsed millicore values, not the string representation.
    pub fn request_mc(&self) -> Result<i64, String> {
        crate::quantities::parse_millicores(&self.spec.desired_cpu_request)
    }

    pub fn limit_mc(&self) -> Result<i64, String> {
        crate::quantities::parse_millicores(&self.spec.desired_cpu_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_name_is_deterministic_and_stable() {
        let pod = PodRef::new("default", "web", "uid-1");
        assert_eq!(pod.record_name(), "default-web");
        // Same namespace+name yields the same record name regardless of UID
        let pod2 = PodRef::new("default", "web", "uid-2");
        assert_eq!(pod.record_name(), pod2.record_name());
    }

    #[test]
    fn policy_falls_back_to_none_on_malformed_values() {
        let mut annotations = BTreeMap::new();
        annotations.insert(ANNOTATION_WEIGHT.to_string(), "not-a-float".to_string());
        let policy = PodPolicy::from_annotations(&annotations);
        assert_eq!(policy.weight, None);
    }

    #[test]
    fn bid_well_formed_checks_ordering() {
        let bid = Bid {
            uid: "a".into(),
            demand_mc: 300,
            weight: 1.0,
            min_mc: 100,
            max_mc: 1000,
        };
        assert!(bid.is_well_formed());

        let bad = Bid {
            min_mc: 500,
            ..bid
        };
        assert!(!bad.is_well_formed());
    }

    #[test]
    fn managed_requires_exact_true_value() {
        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "yes".to_string());
        assert!(!PodPolicy::is_managed(&BTreeMap::new(), &labels));
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
        assert!(PodPolicy::is_managed(&BTreeMap::new(), &labels));
    }
}
