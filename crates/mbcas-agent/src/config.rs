use mbcas_core::MbcasError;
use std::time::Duration;

/// Per-node agent configuration, loaded once at process start from the
/// environment. Field names track the env vars that populate them.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub node_name: String,
    pub platform_url: String,
    pub system_reserve_percent: u32,
    pub tick: Duration,
    pub solve: Duration,
    pub hysteresis_pct: u32,
    pub epsilon_core_mc: f64,
    pub max_coalition_size: usize,
    pub guardrail_multiplier: f64,
    pub guardrail_cooldown: Duration,
    pub worker_pool_size: usize,
}

impl AgentConfig {
    /// Defaults matching the documented env-derived configuration. Callers
    /// still need `node_name` and `platform_url` before this is usable.
    pub fn defaults(node_name: impl Into<String>, platform_url: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            platform_url: platform_url.into(),
            system_reserve_percent: 10,
            tick: Duration::from_millis(1000),
            solve: Duration::from_millis(5000),
            hysteresis_pct: 5,
            epsilon_core_mc: 0.05,
            max_coalition_size: 8,
            guardrail_multiplier: 1.5,
            guardrail_cooldown: Duration::from_secs(30),
            worker_pool_size: 16,
        }
    }

    /// Load from the environment, falling back to the documented defaults
    /// for any var that is absent. `NODE_NAME` and `PLATFORM_URL` are
    /// mandatory; their absence is a fatal config error (exit code 1).
    pub fn from_env() -> Result<Self, MbcasError> {
        let node_name = required_env("NODE_NAME")?;
        let platform_url = required_env("PLATFORM_URL")?;
        let mut config = Self::defaults(node_name, platform_url);

        if let Some(v) = parsed_env::<u32>("SYSTEM_RESERVE_PERCENT")? {
            config.system_reserve_percent = v;
        }
        if let Some(v) = parsed_env::<u64>("TICK_MS")? {
            config.tick = Duration::from_millis(v);
        }
        if let Some(v) = parsed_env::<u64>("SOLVE_MS")? {
            config.solve = Duration::from_millis(v);
        }
        if let Some(v) = parsed_env::<u32>("HYSTERESIS_PCT")? {
            config.hysteresis_pct = v;
        }
        if let Some(v) = parsed_env::<f64>("EPSILON_CORE")? {
            config.epsilon_core_mc = v;
        }
        if let Some(v) = parsed_env::<usize>("MAX_COALITION_SIZE")? {
            config.max_coalition_size = v;
        }
        if let Some(v) = parsed_env::<f64>("GUARDRAIL_MULTIPLIER")? {
            config.guardrail_multiplier = v;
        }
        if let Some(v) = parsed_env::<u64>("GUARDRAIL_COOLDOWN_S")? {
            config.guardrail_cooldown = Duration::from_secs(v);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), MbcasError> {
        if self.system_reserve_percent >= 100 {
            return Err(MbcasError::fatal(
                format!("SYSTEM_RESERVE_PERCENT={} leaves no usable capacity", self.system_reserve_percent),
                "set SYSTEM_RESERVE_PERCENT to a value below 100",
            ));
        }
        if self.tick.is_zero() || self.solve.is_zero() {
            return Err(MbcasError::fatal(
                "TICK_MS and SOLVE_MS must be positive",
                "check TICK_MS and SOLVE_MS",
            ));
        }
        if self.solve < self.tick {
            return Err(MbcasError::fatal(
                "SOLVE_MS must be >= TICK_MS",
                "the solver runs on a multiple of the sensing tick",
            ));
        }
        Ok(())
    }

    /// How many sensing ticks make up one solve pass, rounded to at least 1.
    pub fn ticks_per_solve(&self) -> u32 {
        (self.solve.as_millis() / self.tick.as_millis()).max(1) as u32
    }

    /// Usable capacity after the system reserve, in millicores.
    pub fn usable_capacity_mc(&self, node_allocatable_mc: i64) -> i64 {
        let reserved = node_allocatable_mc * self.system_reserve_percent as i64 / 100;
        (node_allocatable_mc - reserved).max(0)
    }
}

fn required_env(key: &str) -> Result<String, MbcasError> {
    std::env::var(key).map_err(|_| {
        MbcasError::fatal(format!("missing required environment variable {key}"), format!("set {key} before starting the agent"))
    })
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, MbcasError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| MbcasError::fatal(format!("invalid value for {key}: '{raw}'"), format!("check the format expected for {key}"))),
        Err(_) => Ok(None),
    }
}
