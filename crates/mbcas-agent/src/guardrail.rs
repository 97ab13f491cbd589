use async_trait::async_trait;
use mbcas_core::Result;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// An external sink reporting observed per-pod latency, independent of the
/// cgroup demand signal. The cgroup reader answers "how much CPU is this
/// pod using"; this answers "is it meeting its SLO".
#[async_trait]
pub trait LatencySource: Send + Sync {
    async fn observed_latency_ms(&self, uid: &str) -> Result<Option<f64>>;
}

/// An override the guardrail has published for the writer to honor instead
/// of (or clamped against) the solver's output. Communicated as a
/// single-slot mailbox per pod: a fresh override replaces any stale one,
/// and the writer is the only reader.
#[derive(Debug, Clone, Copy)]
pub struct GuardrailOverride {
    pub desired_mc: i64,
    pub cooldown_until: Instant,
}

#[derive(Debug, Clone, Copy)]
struct PodGuardrailState {
    consecutive_violations: u32,
    cooldown_until: Option<Instant>,
    cooldown_floor_mc: i64,
}

/// Tracks SLO-violation streaks and active cooldowns per pod. Owned by the
/// agent tick loop; never shared between tasks.
pub struct FastGuardrail {
    multiplier: f64,
    cooldown: Duration,
    states: HashMap<String, PodGuardrailState>,
}

impl FastGuardrail {
    pub fn new(multiplier: f64, cooldown: Duration) -> Self {
        Self {
            multiplier,
            cooldown,
            states: HashMap::new(),
        }
    }

    /// Fold in one tick's latency observation for `uid`. Returns an
    /// override once the pod has exceeded `target_latency_ms` for two
    /// consecutive ticks. `current_mc` is the pod's last-applied limit.
    pub fn observe(
        &mut self,
        uid: &str,
        target_latency_ms: Option<u32>,
        observed_latency_ms: Option<f64>,
        current_mc: i64,
        max_mc: i64,
        now: Instant,
    ) -> Option<GuardrailOverride> {
        let (Some(target), Some(observed)) = (target_latency_ms, observed_latency_ms) else {
            self.states.remove(uid);
            return None;
        };

        let state = self.states.entry(uid.to_string()).or_insert(PodGuardrailState {
            consecutive_violations: 0,
            cooldown_until: None,
            cooldown_floor_mc: 0,
        });

        if observed <= target as f64 {
            state.consecutive_violations = 0;
            return None;
        }

        state.consecutive_violations += 1;
        if state.consecutive_violations < 2 {
            return None;
        }

        let desired_mc = ((current_mc as f64 * self.multiplier).round() as i64).min(max_mc);
        let cooldown_until = now + self.cooldown;
        state.cooldown_until = Some(cooldown_until);
        state.cooldown_floor_mc = desired_mc;
        state.consecutive_violations = 0;

        Some(GuardrailOverride {
            desired_mc,
            cooldown_until,
        })
    }

    /// The floor the solver may not lower `uid` below, if its cooldown is
    /// still active at `now`.
    pub fn cooldown_floor(&self, uid: &str, now: Instant) -> Option<i64> {
        let state = self.states.get(uid)?;
        let until = state.cooldown_until?;
        if now < until {
            Some(state.cooldown_floor_mc)
        } else {
            None
        }
    }

    pub fn cleanup(&mut self, live_uids: &std::collections::HashSet<String>) {
        self.states.retain(|uid, _| live_uids.contains(uid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_violation_does_not_trigger() {
        let mut guardrail = FastGuardrail::new(1.5, Duration::from_secs(30));
        let now = Instant::now();
        let result = guardrail.observe("uid-1", Some(100), Some(200.0), 400, 4000, now);
        assert!(result.is_none());
    }

    #[test]
    fn two_consecutive_violations_trigger_override() {
        let mut guardrail = FastGuardrail::new(1.5, Duration::from_secs(30));
        let now = Instant::now();
        assert!(guardrail.observe("uid-1", Some(100), Some(200.0), 400, 4000, now).is_none());
        let result = guardrail.observe("uid-1", Some(100), Some(200.0), 400, 4000, now).unwrap();
        assert_eq!(result.desired_mc, 600);
    }

    #[test]
    fn override_is_capped_at_policy_max() {
        let mut guardrail = FastGuardrail::new(1.5, Duration::from_secs(30));
        let now = Instant::now();
        guardrail.observe("uid-1", Some(100), Some(200.0), 3000, 4000, now);
        let result = guardrail.observe("uid-1", Some(100), Some(200.0), 3000, 4000, now).unwrap();
        assert_eq!(result.desired_mc, 4000);
    }

    #[test]
    fn meeting_target_resets_the_streak() {
        let mut guardrail = FastGuardrail::new(1.5, Duration::from_secs(30));
        let now = Instant::now();
        guardrail.observe("uid-1", Some(100), Some(200.0), 400, 4000, now);
        assert!(guardrail.observe("uid-1", Some(100), Some(50.0), 400, 4000, now).is_none());
        assert!(guardrail.observe("uid-1", Some(100), Some(200.0), 400, 4000, now).is_none());
    }

    #[test]
    fn cooldown_floor_expires_after_window() {
        let mut guardrail = FastGuardrail::new(1.5, Duration::from_millis(10));
        let now = Instant::now();
        guardrail.observe("uid-1", Some(100), Some(200.0), 400, 4000, now);
        guardrail.observe("uid-1", Some(100), Some(200.0), 400, 4000, now);
        assert_eq!(guardrail.cooldown_floor("uid-1", now), Some(600));

        let later = now + Duration::from_millis(20);
        assert_eq!(guardrail.cooldown_floor("uid-1", later), None);
    }
}
