use mbcas_core::MbcasError;
use std::time::Duration;

/// Cluster-level reconciler configuration, loaded once at process start
/// from the environment.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub platform_url: String,
    pub worker_count: usize,
    pub queue_capacity: usize,
    /// How often a full sweep of the store re-enqueues every Pending key,
    /// catching anything a requeue dropped. Not specified precisely by
    /// the design doc; chosen to be well inside the backoff cap.
    pub resync_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Bound on in-worker retry attempts for one key within a single
    /// dequeue before leaving it Pending for the next resync sweep.
    pub max_attempts_per_cycle: u32,
}

impl ReconcilerConfig {
    pub fn defaults(platform_url: impl Into<String>) -> Self {
        Self {
            platform_url: platform_url.into(),
            worker_count: 4,
            queue_capacity: 256,
            resync_interval: Duration::from_secs(5),
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
            max_attempts_per_cycle: 5,
        }
    }

    pub fn from_env() -> Result<Self, MbcasError> {
        let platform_url = std::env::var("PLATFORM_URL").map_err(|_| {
            MbcasError::fatal("missing required environment variable PLATFORM_URL", "set PLATFORM_URL before starting the reconciler")
        })?;
        let mut config = Self::defaults(platform_url);

        if let Ok(raw) = std::env::var("RECONCILER_WORKERS") {
            config.worker_count = raw
                .parse()
                .map_err(|_| MbcasError::fatal(format!("invalid RECONCILER_WORKERS value '{raw}'"), "set RECONCILER_WORKERS to a positive integer"))?;
        }
        if config.worker_count == 0 {
            return Err(MbcasError::fatal("RECONCILER_WORKERS must be at least 1", "set RECONCILER_WORKERS to a positive integer"));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ReconcilerConfig::defaults("http://platform");
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.backoff_base, Duration::from_millis(500));
        assert_eq!(config.backoff_cap, Duration::from_secs(30));
    }
}
