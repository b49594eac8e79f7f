//! Construction errors for steps, cases and suites

/// Errors raised while building or validating the suite model.
///
/// These fail fast at suite-definition time so that a renderer or the
/// executor never sees a degenerate step, case or suite.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Step '{0}' has no commands")]
    EmptyStep(String),

    #[error("Step '{0}' has a zero timeout")]
    ZeroTimeout(String),

    #[error("Test case name cannot be empty")]
    EmptyCaseName,

    #[error("Test case '{0}' has no steps")]
    EmptyCase(String),

    #[error("Suite '{0}' has no test cases")]
    EmptySuite(String),

    #[error("Suite '{suite}' has more than one test case named '{case}'")]
    DuplicateCase { suite: String, case: String },

    #[error("Template error: {0}")]
    Template(String),
}
