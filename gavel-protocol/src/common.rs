use crate::status::{Status, StatusId};

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// How the test cases of a submission are delivered.
///
/// The numeric discriminant is part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestcaseKind {
    /// One implicit test case taken from the request's top-level
    /// `stdin` / `expected_output` fields.
    #[default]
    Single,
    /// Inline list of test cases carried in the request body.
    Multiple,
    /// Test cases named by `stdin` / `expected_output` referring to files in
    /// the blob store.
    File,
}

impl TestcaseKind {
    fn as_u8(self) -> u8 {
        match self {
            TestcaseKind::Single => 0,
            TestcaseKind::Multiple => 1,
            TestcaseKind::File => 2,
        }
    }
}

impl Serialize for TestcaseKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for TestcaseKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(TestcaseKind::Single),
            1 => Ok(TestcaseKind::Multiple),
            2 => Ok(TestcaseKind::File),
            other => Err(de::Error::custom(format!(
                "invalid testcase_type: {}",
                other
            ))),
        }
    }
}

/// One test case as carried by the request body.
///
/// In `File` mode both fields name blobs in the store instead of holding the
/// data inline; an empty name means "absent".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestcaseRequest {
    #[serde(default)]
    pub stdin: String,
    #[serde(default)]
    pub expected_output: String,
}

/// Body of `POST /executor`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitRequest {
    #[validate(length(min = 1))]
    pub source_code: String,

    pub language_id: u32,

    #[serde(default)]
    pub stdin: String,

    #[serde(default)]
    pub expected_output: String,

    #[serde(default)]
    pub testcase_type: TestcaseKind,

    #[serde(default)]
    pub testcases: Vec<TestcaseRequest>,

    /// Seconds; 0 means "use the configured default".
    #[serde(default)]
    pub cpu_time_limit: f64,

    /// KB; 0 means "use the configured default".
    #[serde(default)]
    pub memory_limit: u64,
}

/// Result of judging one test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub status: Status,
    pub stdout: String,
    pub stderr: String,
    pub message: String,
    /// CPU seconds (user + system).
    pub time: f64,
    /// Peak resident set size in KB.
    pub memory: u64,
}

impl TestResult {
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            status: StatusId::InternalError.status(),
            stdout: String::new(),
            stderr: String::new(),
            message: message.into(),
            time: 0.0,
            memory: 0,
        }
    }
}

/// Result of the compile step.
///
/// `message` is only populated on infrastructure failure; a legitimate
/// compile failure surfaces its diagnostics through `output`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilationResult {
    pub success: bool,
    pub output: String,
    pub compile_time: f64,
    pub message: String,
}

/// Response of `POST /executor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeResult {
    pub status: Status,
    pub message: String,
    pub compilation: CompilationResult,
    pub test_results: Vec<TestResult>,
    pub max_time: f64,
    pub max_memory: u64,
}

impl Default for JudgeResult {
    fn default() -> Self {
        Self {
            status: StatusId::Pending.status(),
            message: String::new(),
            compilation: CompilationResult::default(),
            test_results: Vec::new(),
            max_time: 0.0,
            max_memory: 0,
        }
    }
}

impl JudgeResult {
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            status: StatusId::InternalError.status(),
            message: message.into(),
            ..Self::default()
        }
    }
}

/// One entry of the language table (`lang.json`).
///
/// Ids are assigned from the position in the table (1-based) at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    #[serde(default)]
    pub id: u32,
    pub name: String,
    pub source_file: String,
    #[serde(default)]
    pub compile_cmd: String,
    pub run_cmd: String,
}

/// `GET /languages` exposes only the id and the display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageSummary {
    pub id: u32,
    pub name: String,
}

/// One worker's row in a pool status report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerReport {
    pub id: usize,
    pub status: String,
    /// Seconds since the current task started; 0 when idle.
    pub time_used: f64,
}

/// Body of `GET /job/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPoolReport {
    pub job_queue_num: usize,
    pub job_pool_num: usize,
    pub job_num: i64,
    pub runner_status: Vec<RunnerReport>,
}

/// Body of `GET /run/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPoolReport {
    pub run_queue_num: usize,
    pub run_pool_num: usize,
    pub runner_status: Vec<RunnerReport>,
}
