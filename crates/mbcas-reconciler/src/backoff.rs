use rand::Rng;
use std::time::Duration;

/// Exponential back-off with a hard cap: `base * 2^(attempt-1)`, clamped at
/// `cap`, then jittered by ±50% so pods hitting the same platform blip at
/// once don't all retry at identical wall-clock offsets. `attempt` is
/// 1-based; `attempt == 0` is treated as `1`.
pub fn backoff_duration(attempt: u32, base: Duration, cap: Duration) -> Duration {
    jittered(backoff_duration_unjittered(attempt, base, cap))
}

fn backoff_duration_unjittered(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let attempt = attempt.max(1);
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    let scaled = base.checked_mul(factor as u32).unwrap_or(cap);
    scaled.min(cap)
}

fn jittered(d: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.5..1.5);
    d.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_is_base_delay_within_jitter_band() {
        let d = backoff_duration(1, Duration::from_millis(500), Duration::from_secs(30));
        assert!(d >= Duration::from_millis(250) && d <= Duration::from_millis(750));
    }

    #[test]
    fn doubles_each_attempt_before_jitter() {
        let base = Duration::from_millis(500);
        let cap = Duration::from_secs(30);
        assert_eq!(backoff_duration_unjittered(2, base, cap), Duration::from_millis(1000));
        assert_eq!(backoff_duration_unjittered(3, base, cap), Duration::from_millis(2000));
    }

    #[test]
    fn clamps_at_cap_within_jitter_band() {
        let base = Duration::from_millis(500);
        let cap = Duration::from_secs(30);
        let d = backoff_duration(20, base, cap);
        assert!(d >= cap.mul_f64(0.5) && d <= cap.mul_f64(1.5));
    }

    #[test]
    fn repeated_calls_are_not_all_identical() {
        let base = Duration::from_millis(500);
        let cap = Duration::from_secs(30);
        let samples: Vec<Duration> = (0..20).map(|_| backoff_duration(3, base, cap)).collect();
        assert!(samples.windows(2).any(|w| w[0] != w[1]));
    }
}
