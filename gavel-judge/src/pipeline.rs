//! The judging pipeline: prepare a workdir, compile, fan the test cases out
//! into the run pool, compare, aggregate.

use crate::compare::outputs_match;
use crate::config::ExecutorConfig;
use crate::job_pool::JudgeDriver;
use crate::lang::{render_template, LanguageRegistry};
use crate::run_pool::RunPool;
use crate::runner::SandboxRun;
use crate::store::TestDataStore;
use crate::workdir::{Workdir, WorkdirFactory};

use gavel_protocol::{
    CompilationResult, JudgeResult, Language, Status, StatusId, SubmitRequest, TestResult,
    TestcaseKind,
};
use gavel_sandbox::{Limiter, SeccompFilter};
use gavel_utils::cancel::CancelToken;

use std::fs;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use tracing::debug;

pub struct Pipeline {
    config: ExecutorConfig,
    registry: Arc<LanguageRegistry>,
    run_pool: Arc<RunPool>,
    workdirs: WorkdirFactory,
    filter: Arc<SeccompFilter>,
    store: Option<Arc<dyn TestDataStore>>,
}

/// One test case after mode resolution.
enum CaseInput {
    Ready {
        stdin: Vec<u8>,
        expected: Option<String>,
    },
    Failed(String),
}

/// A test case in flight through the run pool.
enum CaseReply {
    Pending(Receiver<TestResult>, Option<String>),
    Immediate(TestResult),
}

impl Pipeline {
    pub fn new(
        config: ExecutorConfig,
        registry: Arc<LanguageRegistry>,
        run_pool: Arc<RunPool>,
        workdirs: WorkdirFactory,
        filter: Arc<SeccompFilter>,
        store: Option<Arc<dyn TestDataStore>>,
    ) -> Self {
        workdirs.wipe();
        Self {
            config,
            registry,
            run_pool,
            workdirs,
            filter,
            store,
        }
    }

    fn prepare_workdir(&self, language: &Language, source: &str) -> Result<Workdir, JudgeResult> {
        let workdir = self.workdirs.create().map_err(|err| {
            JudgeResult::internal_error(format!("failed to create workdir: {:#}", err))
        })?;

        let source_path = workdir.join(&language.source_file);
        fs::write(&source_path, source).map_err(|err| {
            JudgeResult::internal_error(format!("failed to write source file: {}", err))
        })?;

        Ok(workdir)
    }

    /// Compile through the run pool (no seccomp; compile-specific limits).
    /// `Err` carries the whole-submission result for infrastructure
    /// failures and legitimate compile errors alike.
    fn compile(
        &self,
        language: &Language,
        workdir: &Workdir,
        token: &CancelToken,
    ) -> Result<CompilationResult, JudgeResult> {
        let command = render_template(&language.compile_cmd, "");
        let limiter = Limiter {
            cpu_time: self.config.compile_timeout,
            memory: self.config.compile_memory,
        };

        let task = SandboxRun::new(
            command,
            workdir.path().to_owned(),
            limiter,
            self.config.extra_cpu_time,
            Vec::new(),
            false,
            None,
        );
        let test = self.run_pool.submit_and_wait(Box::new(task), token.child());

        let compilation = CompilationResult {
            success: test.status.is(StatusId::Accepted),
            output: test.stderr.clone(),
            compile_time: test.time,
            message: test.message.clone(),
        };

        if test.status.is(StatusId::InternalError) {
            let mut result = JudgeResult::internal_error(test.message);
            result.compilation = compilation;
            return Err(result);
        }

        if !compilation.success {
            let result = JudgeResult {
                status: StatusId::CompilationError.status(),
                compilation,
                ..JudgeResult::default()
            };
            return Err(result);
        }

        Ok(compilation)
    }

    fn collect_cases(&self, request: &SubmitRequest) -> Vec<CaseInput> {
        match request.testcase_type {
            TestcaseKind::Single => vec![CaseInput::Ready {
                stdin: request.stdin.clone().into_bytes(),
                expected: nonempty(&request.expected_output),
            }],
            TestcaseKind::Multiple => request
                .testcases
                .iter()
                .map(|tc| CaseInput::Ready {
                    stdin: tc.stdin.clone().into_bytes(),
                    expected: nonempty(&tc.expected_output),
                })
                .collect(),
            TestcaseKind::File => request
                .testcases
                .iter()
                .map(|tc| self.resolve_file_case(tc))
                .collect(),
        }
    }

    fn resolve_file_case(&self, tc: &gavel_protocol::TestcaseRequest) -> CaseInput {
        let store = match &self.store {
            Some(store) => store,
            None => return CaseInput::Failed("test data store is not available".to_owned()),
        };

        let stdin = if tc.stdin.is_empty() {
            Vec::new()
        } else {
            match store.read_file(&tc.stdin) {
                Ok(bytes) => bytes,
                Err(err) => {
                    return CaseInput::Failed(format!("failed to read input file: {:#}", err))
                }
            }
        };

        let expected = if tc.expected_output.is_empty() {
            None
        } else {
            match store.read_file(&tc.expected_output) {
                Ok(bytes) => nonempty(&String::from_utf8_lossy(&bytes)),
                Err(err) => {
                    return CaseInput::Failed(format!(
                        "failed to read expected output file: {:#}",
                        err
                    ))
                }
            }
        };

        CaseInput::Ready { stdin, expected }
    }

    fn run_limiter(&self, request: &SubmitRequest) -> Limiter {
        Limiter {
            cpu_time: if request.cpu_time_limit > 0.0 {
                request.cpu_time_limit
            } else {
                self.config.cpu_time_limit
            },
            memory: if request.memory_limit > 0 {
                request.memory_limit
            } else {
                self.config.memory_limit
            },
        }
    }
}

impl JudgeDriver for Pipeline {
    fn judge(&self, request: &SubmitRequest, token: &CancelToken) -> JudgeResult {
        if token.is_cancelled() {
            return JudgeResult::internal_error("cancelled before execution");
        }

        let language = match self.registry.by_id(request.language_id) {
            Some(language) => language.clone(),
            None => return JudgeResult::internal_error("language not found"),
        };
        debug!("judging submission, language = {}", language.name);

        // Removed on every exit path below, this function's drop included.
        let workdir = match self.prepare_workdir(&language, &request.source_code) {
            Ok(workdir) => workdir,
            Err(result) => return result,
        };

        let mut result = JudgeResult::default();
        if language.compile_cmd.trim().is_empty() {
            result.compilation.success = true;
        } else {
            match self.compile(&language, &workdir, token) {
                Ok(compilation) => result.compilation = compilation,
                Err(failed) => return failed,
            }
        }

        let cases = self.collect_cases(request);
        if cases.is_empty() {
            result.status = StatusId::InternalError.status();
            result.message = "No testcases provided.".to_owned();
            return result;
        }

        let limiter = self.run_limiter(request);

        // Fan out: every case is enqueued before the first reply is awaited,
        // so cases run concurrently while results keep submission order.
        let replies: Vec<CaseReply> = cases
            .into_iter()
            .map(|case| match case {
                CaseInput::Ready { stdin, expected } => {
                    let task = SandboxRun::new(
                        language.run_cmd.clone(),
                        workdir.path().to_owned(),
                        limiter,
                        self.config.extra_cpu_time,
                        stdin,
                        true,
                        Some(self.filter.clone()),
                    );
                    CaseReply::Pending(self.run_pool.submit(Box::new(task), token.child()), expected)
                }
                CaseInput::Failed(message) => {
                    CaseReply::Immediate(TestResult::internal_error(message))
                }
            })
            .collect();

        let tests: Vec<TestResult> = replies
            .into_iter()
            .map(|reply| match reply {
                CaseReply::Pending(rx, expected) => {
                    let mut test = rx
                        .recv()
                        .unwrap_or_else(|_| TestResult::internal_error("run reply channel closed"));
                    if let Some(expected) = expected {
                        if test.status.is(StatusId::Accepted)
                            && !outputs_match(&test.stdout, &expected)
                        {
                            test.status = StatusId::WrongAnswer.status();
                        }
                    }
                    test
                }
                CaseReply::Immediate(test) => test,
            })
            .collect();

        let (status, max_time, max_memory) = aggregate(&tests);
        result.status = status;
        result.max_time = max_time;
        result.max_memory = max_memory;
        result.test_results = tests;
        result
    }
}

/// Worst outcome wins; time and memory are maxima across cases.
fn aggregate(tests: &[TestResult]) -> (Status, f64, u64) {
    let mut status = StatusId::Accepted.status();
    let mut max_time = 0.0f64;
    let mut max_memory = 0u64;
    for test in tests {
        if test.status.id > status.id {
            status = test.status.clone();
        }
        max_time = max_time.max(test.time);
        max_memory = max_memory.max(test.memory);
    }
    (status, max_time, max_memory)
}

fn nonempty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_result(status: StatusId, time: f64, memory: u64) -> TestResult {
        TestResult {
            status: status.status(),
            stdout: String::new(),
            stderr: String::new(),
            message: String::new(),
            time,
            memory,
        }
    }

    #[test]
    fn aggregate_takes_worst_status_and_maxima() {
        let tests = vec![
            test_result(StatusId::Accepted, 0.5, 2048),
            test_result(StatusId::TimeLimitExceeded, 2.1, 1024),
            test_result(StatusId::WrongAnswer, 0.2, 8192),
        ];
        let (status, max_time, max_memory) = aggregate(&tests);
        assert!(status.is(StatusId::TimeLimitExceeded));
        assert_eq!(max_time, 2.1);
        assert_eq!(max_memory, 8192);
    }

    #[test]
    fn aggregate_of_all_accepted_is_accepted() {
        let tests = vec![
            test_result(StatusId::Accepted, 0.1, 100),
            test_result(StatusId::Accepted, 0.3, 200),
        ];
        let (status, ..) = aggregate(&tests);
        assert!(status.is(StatusId::Accepted));
    }

    fn pipeline(root: &TempDir, langs: &str) -> Pipeline {
        let registry = Arc::new(LanguageRegistry::from_slice(langs.as_bytes()).unwrap());
        Pipeline::new(
            ExecutorConfig::default(),
            registry,
            Arc::new(RunPool::new(2, 10)),
            WorkdirFactory::new(root.path().join("tem")),
            Arc::new(SeccompFilter::run_default().unwrap()),
            None,
        )
    }

    const INTERPRETED: &str = r#"[
        {"name": "Shell", "source_file": "main.sh",
         "compile_cmd": "", "run_cmd": "bash main.sh"}
    ]"#;

    #[test]
    fn unknown_language_is_internal_error() {
        let root = TempDir::new().unwrap();
        let p = pipeline(&root, INTERPRETED);
        let request = SubmitRequest {
            source_code: "echo hi".to_owned(),
            language_id: 99,
            stdin: String::new(),
            expected_output: String::new(),
            testcase_type: TestcaseKind::Single,
            testcases: Vec::new(),
            cpu_time_limit: 0.0,
            memory_limit: 0,
        };
        let result = p.judge(&request, &CancelToken::new());
        assert!(result.status.is(StatusId::InternalError));
        assert_eq!(result.message, "language not found");
    }

    #[test]
    fn empty_testcase_list_is_rejected() {
        let root = TempDir::new().unwrap();
        let p = pipeline(&root, INTERPRETED);
        let request = SubmitRequest {
            source_code: "echo hi".to_owned(),
            language_id: 1,
            stdin: String::new(),
            expected_output: String::new(),
            testcase_type: TestcaseKind::Multiple,
            testcases: Vec::new(),
            cpu_time_limit: 0.0,
            memory_limit: 0,
        };
        let result = p.judge(&request, &CancelToken::new());
        assert!(result.status.is(StatusId::InternalError));
        assert_eq!(result.message, "No testcases provided.");
        // No-compile language: compilation is vacuously successful.
        assert!(result.compilation.success);
    }

    #[test]
    fn cancelled_submission_short_circuits() {
        let root = TempDir::new().unwrap();
        let p = pipeline(&root, INTERPRETED);
        let token = CancelToken::new();
        token.cancel();
        let request = SubmitRequest {
            source_code: "echo hi".to_owned(),
            language_id: 1,
            stdin: String::new(),
            expected_output: String::new(),
            testcase_type: TestcaseKind::Single,
            testcases: Vec::new(),
            cpu_time_limit: 0.0,
            memory_limit: 0,
        };
        let result = p.judge(&request, &token);
        assert!(result.status.is(StatusId::InternalError));
    }

    #[test]
    fn file_mode_without_a_store_fails_per_case() {
        let root = TempDir::new().unwrap();
        let p = pipeline(&root, INTERPRETED);
        let request = SubmitRequest {
            source_code: "echo hi".to_owned(),
            language_id: 1,
            stdin: String::new(),
            expected_output: String::new(),
            testcase_type: TestcaseKind::File,
            testcases: vec![gavel_protocol::TestcaseRequest {
                stdin: "in1.txt".to_owned(),
                expected_output: String::new(),
            }],
            cpu_time_limit: 0.0,
            memory_limit: 0,
        };
        let result = p.judge(&request, &CancelToken::new());
        assert!(result.status.is(StatusId::InternalError));
        assert_eq!(result.test_results.len(), 1);
        assert_eq!(
            result.test_results[0].message,
            "test data store is not available"
        );
    }
}
