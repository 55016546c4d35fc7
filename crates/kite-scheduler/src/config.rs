//! Scheduler defaults: concurrency cap, hook grace period, artifact and
//! log directories.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Counting-semaphore permit count for the whole run. Defaults to the
    /// logical CPU count.
    pub max_concurrency: usize,
    /// Best-effort grace period between SIGTERM and SIGKILL for a
    /// cancelled/timed-out child process, and the bound on how long a hook
    /// may run after its owning segment's timeout has already elapsed.
    pub hook_grace: Duration,
    pub artifacts_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get(),
            hook_grace: Duration::from_secs(5),
            artifacts_dir: PathBuf::from(".kite/artifacts"),
            logs_dir: PathBuf::from(".kite/logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_logical_cpu_count() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrency, num_cpus::get());
        assert_eq!(config.hook_grace, Duration::from_secs(5));
        assert_eq!(config.artifacts_dir, PathBuf::from(".kite/artifacts"));
        assert_eq!(config.logs_dir, PathBuf::from(".kite/logs"));
    }
}
