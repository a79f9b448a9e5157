use serde::{Deserialize, Serialize};

/// Executor section of the server configuration.
///
/// Every field has a default so an absent config file (or key) yields a
/// working setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub job_pool: usize,
    pub job_queue: usize,
    pub run_pool: usize,
    pub run_queue: usize,

    /// Grace seconds added on top of the CPU limit for the hard
    /// `RLIMIT_CPU` ceiling and the wall-clock deadline.
    pub extra_cpu_time: f64,

    /// Seconds.
    pub compile_timeout: f64,
    /// KB.
    pub compile_memory: u64,

    /// Default CPU seconds when a request passes 0.
    pub cpu_time_limit: f64,
    /// Default KB when a request passes 0.
    pub memory_limit: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            job_pool: 5,
            job_queue: 500,
            run_pool: 5,
            run_queue: 500,
            extra_cpu_time: 0.5,
            compile_timeout: 5.0,
            compile_memory: 262144,
            cpu_time_limit: 5.0,
            memory_limit: 262144,
        }
    }
}
