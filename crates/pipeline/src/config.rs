use std::time::Duration;

/// Tunables for the task runner, driver and stuck-run sweeper.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// A running run with no activity for this long is considered stuck;
    /// a pair claimed longer ago than this may be reclaimed.
    pub stale_run_threshold: Duration,
    /// Maximum runs recovered per sweep.
    pub sweep_batch_size: i64,
    /// Lease of the sweep lock; must exceed the time one sweep takes.
    pub sweep_lock_ttl: Duration,
    /// Upper bound on a single provider call.
    pub provider_timeout: Duration,
    /// A run resumed this many times is failed instead of resumed again.
    pub max_resume_attempts: i32,
    /// How many runs the status query returns.
    pub recent_runs_limit: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stale_run_threshold: Duration::from_secs(600),
            sweep_batch_size: 10,
            sweep_lock_ttl: Duration::from_secs(300),
            provider_timeout: Duration::from_secs(120),
            max_resume_attempts: 3,
            recent_runs_limit: 5,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `STALE_RUN_THRESHOLD_SECS` | `600`   |
    /// | `SWEEP_BATCH_SIZE`         | `10`    |
    /// | `SWEEP_LOCK_SECS`          | `300`   |
    /// | `PROVIDER_TIMEOUT_SECS`    | `120`   |
    /// | `MAX_RESUME_ATTEMPTS`      | `3`     |
    /// | `RECENT_RUNS_LIMIT`        | `5`     |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stale_run_threshold: env_secs("STALE_RUN_THRESHOLD_SECS")
                .unwrap_or(defaults.stale_run_threshold),
            sweep_batch_size: env_parse("SWEEP_BATCH_SIZE").unwrap_or(defaults.sweep_batch_size),
            sweep_lock_ttl: env_secs("SWEEP_LOCK_SECS").unwrap_or(defaults.sweep_lock_ttl),
            provider_timeout: env_secs("PROVIDER_TIMEOUT_SECS")
                .unwrap_or(defaults.provider_timeout),
            max_resume_attempts: env_parse("MAX_RESUME_ATTEMPTS")
                .unwrap_or(defaults.max_resume_attempts),
            recent_runs_limit: env_parse("RECENT_RUNS_LIMIT")
                .unwrap_or(defaults.recent_runs_limit),
        }
    }

    /// Staleness threshold as a chrono duration, for cutoff arithmetic.
    pub fn stale_threshold(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.stale_run_threshold)
            .unwrap_or_else(|_| chrono::Duration::seconds(600))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}
