//! # ecosystem-ci
//!
//! Describe multi-step package test workflows (checkout, install, build,
//! test) once, then render them as a bash script, render them as a
//! Buildkite pipeline, or run them directly on this machine.
//!
//! ## Features
//!
//! - **Declarative suites** - Literal cases or the `install-and-test` template, in YAML
//! - **Shell renderer** - One self-contained bash script per suite
//! - **Buildkite renderer** - One group per suite, one command unit per case
//! - **Local executor** - One subprocess per step, with per-step timeouts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ecosystem_ci::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let suite = TestSuite::new(
//!         Some("smoke".to_string()),
//!         vec![TestCase::from_steps("hello", ["echo hi"])?],
//!     )?;
//!
//!     let script = to_script(&render_suite(&suite)?);
//!     println!("{}", script);
//!
//!     let mut registry = SuiteRegistry::new();
//!     registry.insert("smoke", suite);
//!
//!     let executor = LocalExecutor::new(ExecutorConfig::default());
//!     let result = executor.run_all(&registry, &Context::default()).await?;
//!     println!("Run completed: success={}", result.success());
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod render;
pub mod workflow;

// Re-export main types
pub use engine::{
    CaseResult, CaseStatus, ExecutorConfig, ExecutorError, LocalExecutor, RunResult, StepOutcome,
    StepResult, SuiteResult, TIMEOUT_EXIT_CODE,
};
pub use render::{
    concurrency_key, render_suite, to_script, Pipeline, PipelineFactory, PipelineOptions,
    RenderError,
};
pub use workflow::{
    Context, EcosystemConfig, EcosystemSuite, LoadError, ModelError, RenderTarget, Step,
    StepOptions, SuiteLoader, SuiteRegistry, TestCase, TestSuite,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::engine::{
        CaseStatus, ExecutorConfig, ExecutorError, LocalExecutor, RunResult, StepOutcome,
    };
    pub use crate::render::{
        concurrency_key, render_case, render_suite, to_script, PipelineFactory, PipelineOptions,
        RenderError, PIPELINE_FILE,
    };
    pub use crate::workflow::{
        Context, EcosystemConfig, EcosystemSuite, InstallAndTest, LoadError, ModelError, Package,
        RenderTarget, Step, StepOptions, SuiteLoader, SuiteRegistry, TestCase, TestCaseOptions,
        TestSuite,
    };
}
