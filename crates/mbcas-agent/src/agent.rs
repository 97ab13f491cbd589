use crate::config::AgentConfig;
use crate::guardrail::{FastGuardrail, LatencySource};
use crate::market_pass::run_market_pass;
use crate::pods::extract_managed;
use crate::tracer::PathTracer;
use crate::writer::AllocationWriter;
use mbcas_core::types::DemandEstimate;
use mbcas_core::{MbcasError, Reason, Result};
use mbcas_market::{build_bid, split_path_into_coalitions, Allocator, Coalition};
use mbcas_platform::{CpuResizePatch, PlatformClient};
use mbcas_sensor::{DemandEstimator, DemandSource};
use mbcas_storage::AllocationStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The per-node agent: sensing, bidding, solving, coalition stability, the
/// fast guardrail, and publishing, wired against real or mock
/// implementations of each capability.
pub struct Agent {
    config: AgentConfig,
    platform: Arc<dyn PlatformClient>,
    store: Arc<dyn AllocationStore>,
    allocator: Arc<dyn Allocator>,
    sensor: Arc<dyn DemandSource>,
    latency_source: Option<Arc<dyn LatencySource>>,
    tracer: Arc<dyn PathTracer>,

    estimator: DemandEstimator,
    guardrail: FastGuardrail,
    last_estimate: HashMap<String, DemandEstimate>,
    last_allocated_mc: HashMap<String, i64>,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AgentConfig,
        platform: Arc<dyn PlatformClient>,
        store: Arc<dyn AllocationStore>,
        allocator: Arc<dyn Allocator>,
        sensor: Arc<dyn DemandSource>,
        latency_source: Option<Arc<dyn LatencySource>>,
        tracer: Arc<dyn PathTracer>,
    ) -> Self {
        let guardrail = FastGuardrail::new(config.guardrail_multiplier, config.guardrail_cooldown);
        Self {
            config,
            platform,
            store,
            allocator,
            sensor,
            latency_source,
            tracer,
            estimator: DemandEstimator::new(),
            guardrail,
            last_estimate: HashMap::new(),
            last_allocated_mc: HashMap::new(),
        }
    }

    /// Run until `token` is cancelled. Sensing happens every tick;
    /// solve/publish happens every `ticks_per_solve` ticks, per §5's
    /// sequential Sense→Estimate→Bid→Solve→(Coalition+Guardrail)→Publish
    /// ordering for that pass.
    pub async fn run(&mut self, token: CancellationToken) -> Result<()> {
        let ticks_per_solve = self.config.ticks_per_solve();
        let mut tick_count: u32 = 0;

        info!(node = %self.config.node_name, tick_ms = ?self.config.tick, "agent starting");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("agent shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.tick) => {
                    tick_count = tick_count.wrapping_add(1);

                    let pods = match self.list_managed_pods().await {
                        Ok(pods) => pods,
                        Err(e) => {
                            warn!(error = %e, "failed to list pods this tick");
                            continue;
                        }
                    };

                    self.sense_and_estimate(&pods).await;

                    if tick_count % ticks_per_solve == 0 {
                        if let Err(e) = self.solve_and_publish(&pods).await {
                            warn!(error = %e, "solve/publish pass failed this cycle");
                        }
                    }

                    let live: HashSet<String> = pods.iter().map(|p| p.pod_ref.uid.clone()).collect();
                    self.estimator.cleanup(&live);
                    self.guardrail.cleanup(&live);
                    self.last_estimate.retain(|uid, _| live.contains(uid));
                    self.last_allocated_mc.retain(|uid, _| live.contains(uid));
                }
            }
        }
    }

    async fn list_managed_pods(&self) -> Result<Vec<crate::pods::ManagedPod>> {
        let pods = self
            .platform
            .list_pods_on_node(&self.config.node_name)
            .await
            .map_err(|e| MbcasError::transient("platform pod list", e.to_string()))?;
        Ok(pods.iter().filter_map(extract_managed).collect())
    }

    async fn sense_and_estimate(&mut self, pods: &[crate::pods::ManagedPod]) {
        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool_size));
        let mut handles = Vec::with_capacity(pods.len());

        for managed in pods {
            let uid = managed.pod_ref.uid.clone();
            let sensor = self.sensor.clone();
            let permit = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await;
                (uid.clone(), sensor.sample(&uid).await)
            }));
        }

        for handle in handles {
            let Ok((uid, result)) = handle.await else {
                continue;
            };
            match result {
                Ok(sample) => {
                    let max_mc = self.last_allocated_mc.get(&uid).copied().unwrap_or(1_000_000) as f64;
                    if let Some(estimate) = self.estimator.update(&uid, sample, max_mc) {
                        debug!(uid, latent_demand_mc = estimate.latent_demand_mc, "demand estimate updated");
                        self.last_estimate.insert(uid, estimate);
                    }
                }
                Err(e) if e.kind() == mbcas_core::ErrorKind::NotFound => {
                    self.last_estimate.remove(&uid);
                }
                Err(e) => {
                    warn!(uid, error = %e, "cgroup sample failed");
                }
            }
        }
    }

    async fn solve_and_publish(&mut self, pods: &[crate::pods::ManagedPod]) -> Result<()> {
        if pods.is_empty() {
            return Ok(());
        }

        let node = self
            .platform
            .get_node(&self.config.node_name)
            .await
            .map_err(|e| MbcasError::transient("platform node lookup", e.to_string()))?;
        let allocatable_mc = node_allocatable_mc(&node).unwrap_or(0);
        let usable_mc = self.config.usable_capacity_mc(allocatable_mc);

        let bids: Vec<_> = pods
            .iter()
            .map(|managed| {
                let estimate = self.last_estimate.get(&managed.pod_ref.uid).copied();
                build_bid(&managed.pod_ref.uid, managed.request_mc, &managed.policy, allocatable_mc, estimate)
            })
            .collect();

        let traced = self.tracer.traced_paths(&self.config.node_name).await;
        let coalitions: Vec<Coalition> = traced
            .iter()
            .flat_map(|(path_id, uids)| split_path_into_coalitions(path_id, uids))
            .collect();

        let pass = run_market_pass(&bids, usable_mc, self.allocator.as_ref(), &coalitions, self.config.epsilon_core_mc);
        if pass.any_unstable {
            warn!(node = %self.config.node_name, "coalition left UnstableAccepted after bounded repair attempts");
        }

        let mut allocation = pass.allocation;
        let now = Instant::now();
        let mut overrides: HashMap<String, Reason> = HashMap::new();

        for managed in pods {
            let uid = &managed.pod_ref.uid;
            let current_mc = allocation.per_pod_mc.get(uid).copied().unwrap_or(managed.request_mc);

            if let Some(floor) = self.guardrail.cooldown_floor(uid, now) {
                if current_mc < floor {
                    allocation.per_pod_mc.insert(uid.clone(), floor);
                }
            }

            let observed = match &self.latency_source {
                Some(source) => source.observed_latency_ms(uid).await.unwrap_or(None),
                None => None,
            };
            let max_mc = managed.policy.max_mc.unwrap_or(allocatable_mc).min(allocatable_mc);
            if let Some(guardrail_override) =
                self.guardrail
                    .observe(uid, managed.policy.target_latency_ms, observed, current_mc, max_mc, now)
            {
                allocation.per_pod_mc.insert(uid.clone(), guardrail_override.desired_mc);
                overrides.insert(uid.clone(), Reason::SloViolation);
            }
        }

        let writer = AllocationWriter::new(self.store.as_ref(), self.config.hysteresis_pct);
        let mut published: HashMap<String, i64> = HashMap::new();
        for managed in pods {
            let uid = &managed.pod_ref.uid;
            let Some(&desired_mc) = allocation.per_pod_mc.get(uid) else {
                continue;
            };
            let forced = overrides.contains_key(uid);
            let reason = overrides.get(uid).copied().unwrap_or(if allocation.degraded {
                Reason::Degraded
            } else {
                Reason::Market
            });
            let weight = managed.policy.weight.unwrap_or(1.0);

            match writer.maybe_publish(&managed.pod_ref, desired_mc, weight, allocation.shadow_price, reason, forced) {
                Ok(true) => {
                    self.last_allocated_mc.insert(uid.clone(), desired_mc);
                    published.insert(uid.clone(), desired_mc);
                }
                Ok(false) => {}
                Err(e) => error!(uid, error = %e, "failed to publish allocation"),
            }
        }

        self.apply_resizes(pods, &published).await;
        Ok(())
    }

    /// Apply in-place resizes only for pods the writer actually published
    /// this pass, so a pod the hysteresis gate skipped isn't resized anyway
    /// (that would reintroduce the churn hysteresis exists to suppress).
    /// This keeps a standalone reconciler process optional for a
    /// single-node deployment; a clustered deployment disables this and
    /// lets the reconciler own application (§4.7).
    async fn apply_resizes(&self, pods: &[crate::pods::ManagedPod], published: &HashMap<String, i64>) {
        for managed in pods {
            let Some(&mc) = published.get(&managed.pod_ref.uid) else {
                continue;
            };
            let patch = CpuResizePatch { request_mc: mc, limit_mc: mc };
            if let Err(e) = self
                .platform
                .resize_pod_cpu(&managed.pod_ref.namespace, &managed.pod_ref.name, patch)
                .await
            {
                debug!(pod = %managed.pod_ref, error = %e, "resize not applied by agent; leaving to reconciler");
            }
        }
    }
}

fn node_allocatable_mc(node: &mbcas_core::Node) -> Option<i64> {
    let cpu = node.status.as_ref()?.allocatable.as_ref()?.get("cpu")?;
    mbcas_core::quantities::parse_millicores(&cpu.0).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_allocatable_parses_cpu_quantity() {
        use mbcas_core::k8s_openapi::api::core::v1::{Node, NodeStatus};
        use mbcas_core::k8s_openapi::apimachinery::pkg::api::resource::Quantity;
        use std::collections::BTreeMap;

        let mut node = Node::default();
        node.status = Some(NodeStatus {
            allocatable: Some(BTreeMap::from([("cpu".to_string(), Quantity("3800m".to_string()))])),
            ..Default::default()
        });
        assert_eq!(node_allocatable_mc(&node), Some(3800));
    }
}
