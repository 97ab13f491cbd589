use mbcas_core::types::{DemandEstimate, Sample};
use std::collections::{HashMap, HashSet};

const USAGE_HALF_LIFE_SECS: f64 = 10.0;
const THROTTLE_HALF_LIFE_SECS: f64 = 4.0;
const THROTTLE_EPSILON: f64 = 0.01;
const NS_PER_MILLICORE_SECOND: f64 = 1_000_000.0;

#[derive(Debug, Clone)]
struct PodDemandState {
    last_sample: Sample,
    smoothed_usage_mc: f64,
    smoothed_throttling_ratio: f64,
}

/// Stateful, per-pod smoothing of cgroup samples into a demand estimate.
/// Owned by the agent tick loop; never shared between tasks.
#[derive(Default)]
pub struct DemandEstimator {
    states: HashMap<String, PodDemandState>,
}

impl DemandEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one new sample in for `uid`. Returns `None` on the pod's first
    /// sample (warm-up) or if the clock did not advance since the last one.
    pub fn update(&mut self, uid: &str, sample: Sample, max_mc: f64) -> Option<DemandEstimate> {
        let Some(prev) = self.states.get(uid).cloned() else {
            self.states.insert(
                uid.to_string(),
                PodDemandState {
                    last_sample: sample,
                    smoothed_usage_mc: 0.0,
                    smoothed_throttling_ratio: 0.0,
                },
            );
            return None;
        };

        let dt = sample
            .timestamp
            .checked_duration_since(prev.last_sample.timestamp)?
            .as_secs_f64();
        if dt <= 0.0 {
            return None;
        }

        let cpu_delta_ns = sample.cpu_usage_ns.saturating_sub(prev.last_sample.cpu_usage_ns) as f64;
        let throttled_delta_ns = sample.throttled_ns.saturating_sub(prev.last_sample.throttled_ns) as f64;

        let usage_mc = cpu_delta_ns / (dt * NS_PER_MILLICORE_SECOND);
        let raw_throttling_ratio = if cpu_delta_ns + throttled_delta_ns > 0.0 {
            throttled_delta_ns / (cpu_delta_ns + throttled_delta_ns)
        } else {
            0.0
        };

        let usage_alpha = ewma_alpha(dt, USAGE_HALF_LIFE_SECS);
        let throttle_alpha = ewma_alpha(dt, THROTTLE_HALF_LIFE_SECS);

        let smoothed_usage_mc = prev.smoothed_usage_mc + usage_alpha * (usage_mc - prev.smoothed_usage_mc);
        let smoothed_throttling_ratio =
            prev.smoothed_throttling_ratio + throttle_alpha * (raw_throttling_ratio - prev.smoothed_throttling_ratio);

        self.states.insert(
            uid.to_string(),
            PodDemandState {
                last_sample: sample,
                smoothed_usage_mc,
                smoothed_throttling_ratio,
            },
        );

        Some(DemandEstimate {
            usage_mc: smoothed_usage_mc,
            throttling_ratio: smoothed_throttling_ratio,
            latent_demand_mc: latent_demand_mc(smoothed_usage_mc, smoothed_throttling_ratio, max_mc),
        })
    }

    /// Forget state for pods no longer present on the node.
    pub fn cleanup(&mut self, live_uids: &HashSet<String>) {
        self.states.retain(|uid, _| live_uids.contains(uid));
    }
}

fn ewma_alpha(dt_secs: f64, half_life_secs: f64) -> f64 {
    1.0 - 0.5_f64.powf(dt_secs / half_life_secs)
}

/// Infer demand beyond observed usage from throttling pressure, clamped to
/// the pod's policy maximum.
pub fn latent_demand_mc(usage_mc: f64, throttling_ratio: f64, max_mc: f64) -> f64 {
    if throttling_ratio < THROTTLE_EPSILON {
        usage_mc.min(max_mc)
    } else {
        (usage_mc * (1.0 + throttling_ratio / (1.0 - throttling_ratio))).min(max_mc)
    }
}
