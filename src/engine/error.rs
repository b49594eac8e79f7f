//! Executor error types

use crate::workflow::ModelError;

/// Errors that stop the executor itself.
///
/// A failing or timed-out step is not an error; it is reported as a
/// [`StepOutcome`](crate::engine::StepOutcome).
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Invalid suite: {0}")]
    Model(#[from] ModelError),

    #[error("Suite not found: {0}")]
    SuiteNotFound(String),
}
