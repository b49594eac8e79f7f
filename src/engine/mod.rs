//! Local execution engine
//!
//! This module contains:
//! - `executor` - Runs suites, cases and steps on this machine
//! - `process` - Spawns a step's shell and enforces its timeout
//! - `error` - Executor error types
//! - `result` - Step, case, suite and run result types

pub mod error;
pub mod executor;
pub mod process;
pub mod result;

pub use error::ExecutorError;
pub use executor::{step_cwd, ExecutorConfig, LocalExecutor};
pub use process::{ProcessOutput, StepProcess};
pub use result::{
    CaseResult, CaseStatus, RunResult, StepOutcome, StepResult, SuiteResult,
    SPAWN_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE,
};
