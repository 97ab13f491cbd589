use async_trait::async_trait;
use mbcas_core::types::Sample;
use mbcas_core::Result;

/// A pluggable source of per-pod samples. The cgroup reader is the only
/// implementation today; a metrics-endpoint fallback can be added without
/// touching the estimator or the tick loop.
#[async_trait]
pub trait DemandSource: Send + Sync {
    async fn sample(&self, uid: &str) -> Result<Sample>;
}
