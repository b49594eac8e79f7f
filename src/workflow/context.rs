//! Render/run context for suite templates
//!
//! A [`Context`] is the snapshot a suite template is evaluated against.
//! Cases and steps only ever see it by shared reference; `before_all`
//! hooks are the one place allowed to change `work_dir` and `data`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the runtime binary used when none is configured
pub const DEFAULT_BIN: &str = "bun";

/// Where a suite is going to end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderTarget {
    /// Run directly by the local executor
    #[default]
    Local,
    /// Rendered to a standalone shell script
    Shell,
    /// Rendered to a Buildkite pipeline
    Buildkite,
}

impl fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderTarget::Local => "local",
            RenderTarget::Shell => "shell",
            RenderTarget::Buildkite => "buildkite",
        };
        f.write_str(name)
    }
}

/// The environment a suite template renders against
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    /// Running on a developer machine rather than in CI
    pub is_local: bool,

    /// Runtime binary name or path. Use this instead of hardcoding it into steps.
    pub bin: String,

    pub target: RenderTarget,

    /// Base directory every step's working directory is resolved against
    pub work_dir: PathBuf,

    /// Free-form data populated by `before_all`
    pub data: Option<Value>,
}

impl Context {
    /// Context for running suites on this machine
    pub fn local(bin: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            is_local: true,
            bin: bin.into(),
            target: RenderTarget::Local,
            work_dir: work_dir.into(),
            data: None,
        }
    }

    /// Context for rendering suites to `target`
    pub fn render(bin: impl Into<String>, target: RenderTarget) -> Self {
        Self {
            is_local: target == RenderTarget::Shell,
            bin: bin.into(),
            target,
            work_dir: PathBuf::from("."),
            data: None,
        }
    }

    /// Resolve a path relative to the context's working directory
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.work_dir.join(path)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::local(DEFAULT_BIN, ".")
    }
}
