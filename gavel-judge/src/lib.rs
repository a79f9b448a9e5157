#![deny(clippy::all)]

//! Judging core: the two-tier scheduler (job pool feeding a run pool), the
//! per-submission pipeline, outcome classification, and the language
//! registry. Everything is constructed at startup and passed down
//! explicitly; there is no process-wide mutable state.

pub mod compare;
pub mod config;
pub mod job_pool;
pub mod lang;
pub mod outcome;
pub mod pipeline;
pub mod run_pool;
pub mod runner;
pub mod store;
pub mod workdir;

mod worker;

pub use self::config::ExecutorConfig;
pub use self::store::TestDataStore;
pub use self::worker::WorkerState;

use self::job_pool::JobPool;
use self::lang::LanguageRegistry;
use self::pipeline::Pipeline;
use self::run_pool::RunPool;
use self::workdir::WorkdirFactory;

use gavel_protocol::{JobPoolReport, JudgeResult, RunPoolReport, SubmitRequest};
use gavel_sandbox::SeccompFilter;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

/// Per-submission scratch directories live here, relative to the process
/// working directory.
const WORKDIR_ROOT: &str = "tem";

/// The judge as one object: owns both pools, the registry and the shared
/// seccomp program.
pub struct JudgeModule {
    job_pool: JobPool,
    run_pool: Arc<RunPool>,
    registry: Arc<LanguageRegistry>,
}

impl JudgeModule {
    pub fn new(
        config: ExecutorConfig,
        registry: Arc<LanguageRegistry>,
        store: Option<Arc<dyn TestDataStore>>,
    ) -> Result<Self> {
        Self::with_workdir_root(config, registry, store, WORKDIR_ROOT)
    }

    pub fn with_workdir_root(
        config: ExecutorConfig,
        registry: Arc<LanguageRegistry>,
        store: Option<Arc<dyn TestDataStore>>,
        workdir_root: impl AsRef<Path>,
    ) -> Result<Self> {
        let run_pool = Arc::new(RunPool::new(config.run_pool, config.run_queue));
        let filter = Arc::new(
            SeccompFilter::run_default().context("failed to build the seccomp filter")?,
        );
        let pipeline = Arc::new(Pipeline::new(
            config.clone(),
            registry.clone(),
            run_pool.clone(),
            WorkdirFactory::new(workdir_root.as_ref()),
            filter,
            store,
        ));
        let job_pool = JobPool::new(config.job_pool, config.job_queue, pipeline);

        Ok(Self {
            job_pool,
            run_pool,
            registry,
        })
    }

    /// Submit and block until the judge result is ready (or the queue
    /// rejects the submission).
    pub fn submit(&self, request: SubmitRequest) -> JudgeResult {
        self.job_pool
            .submit(request)
            .recv()
            .unwrap_or_else(|_| JudgeResult::internal_error("job reply channel closed"))
    }

    pub fn job_status(&self) -> JobPoolReport {
        self.job_pool.report()
    }

    pub fn run_status(&self) -> RunPoolReport {
        self.run_pool.report()
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }
}
