//! Execution result types

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Exit code reported for a step killed by its timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported for a step whose shell could not be started
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// How a single step ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    /// Exited non-zero. A step killed by a signal reports `128 + signal`.
    Failed { code: i32 },
    /// Killed after exceeding its timeout
    TimedOut { after_ms: u64 },
    SpawnFailed { message: String },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Passed)
    }

    /// Process-style exit code. Timeouts use [`TIMEOUT_EXIT_CODE`] instead
    /// of whatever the killed process would have returned.
    pub fn exit_code(&self) -> i32 {
        match self {
            StepOutcome::Passed => 0,
            StepOutcome::Failed { code } => *code,
            StepOutcome::TimedOut { .. } => TIMEOUT_EXIT_CODE,
            StepOutcome::SpawnFailed { .. } => SPAWN_FAILURE_EXIT_CODE,
        }
    }
}

/// Result of a step execution
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub label: String,
    pub outcome: StepOutcome,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Captured output; empty when output is inherited
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl StepResult {
    pub fn success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Final classification of a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    Failed,
    /// Marked `failing` and failed, as expected
    KnownFailure,
    /// Marked `failing` but passed
    UnexpectedPass,
    Skipped,
}

impl CaseStatus {
    /// Whether this status should turn a run red
    pub fn is_regression(&self) -> bool {
        matches!(self, CaseStatus::Failed)
    }
}

/// Result of a test case execution
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub name: String,
    pub status: CaseStatus,
    pub steps: Vec<StepResult>,
}

impl CaseResult {
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CaseStatus::Skipped,
            steps: Vec::new(),
        }
    }

    /// The step that ended the case, if any failed
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.success())
    }
}

/// Result of a suite execution
#[derive(Debug, Clone, Serialize)]
pub struct SuiteResult {
    pub key: String,
    pub name: String,
    pub cases: Vec<CaseResult>,
    /// Errors raised by `before_all`/`after_all`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hook_errors: Vec<String>,
}

impl SuiteResult {
    pub fn count(&self, status: CaseStatus) -> usize {
        self.cases.iter().filter(|c| c.status == status).count()
    }

    /// No regressions and no hook failures
    pub fn success(&self) -> bool {
        self.hook_errors.is_empty() && !self.cases.iter().any(|c| c.status.is_regression())
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub suites: Vec<SuiteResult>,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.suites.iter().all(SuiteResult::success)
    }

    pub fn count(&self, status: CaseStatus) -> usize {
        self.suites.iter().map(|s| s.count(status)).sum()
    }

    /// Cases marked `failing` that passed
    pub fn unexpected_passes(&self) -> impl Iterator<Item = (&SuiteResult, &CaseResult)> {
        self.suites.iter().flat_map(|suite| {
            suite
                .cases
                .iter()
                .filter(|c| c.status == CaseStatus::UnexpectedPass)
                .map(move |c| (suite, c))
        })
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
