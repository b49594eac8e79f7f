//! Renderers: lower a suite into a textual execution target
//!
//! - `shell` - Standalone bash script per suite
//! - `buildkite` - Buildkite pipeline manifest, one unit per case
//! - `quote` - Shell quoting helpers shared by both

pub mod buildkite;
pub mod quote;
pub mod shell;

use crate::workflow::ModelError;

pub use buildkite::{
    concurrency_key, key_part, CommandUnit, GroupStep, Pipeline, PipelineFactory, PipelineOptions,
    PIPELINE_FILE,
};
pub use shell::{render_case, render_step, render_suite, to_script, KILL_AFTER_MULTIPLIER};

/// Errors that can occur while rendering
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Invalid suite: {0}")]
    Model(#[from] ModelError),

    #[error("Serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Pipeline key '{0}' is used more than once")]
    DuplicateKey(String),
}
