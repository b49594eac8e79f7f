//! Test suites, lifecycle hooks and suite templates
//!
//! A suite is either a ready [`TestSuite`] value or a [`SuiteTemplate`]
//! evaluated against a [`Context`]. [`EcosystemSuite::reify`] is the one
//! place where that distinction is resolved.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::case::TestCase;
use super::context::Context;
use super::error::ModelError;

/// Errors returned by suite lifecycle hooks
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

/// Setup and teardown around a whole suite run
#[async_trait]
pub trait SuiteHooks: Send + Sync {
    /// Runs once before any case. May change `ctx.work_dir` and `ctx.data`.
    async fn before_all(&self, _ctx: &mut Context) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs once after all cases, even if a case or `before_all` failed
    async fn after_all(&self, _ctx: &Context) -> Result<(), HookError> {
        Ok(())
    }
}

/// Creates a directory under the working directory and moves the suite's
/// working directory into it. Only acts on local contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnterWorkDir {
    pub dir: String,
}

impl EnterWorkDir {
    pub fn new(dir: impl Into<String>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SuiteHooks for EnterWorkDir {
    async fn before_all(&self, ctx: &mut Context) -> Result<(), HookError> {
        if !ctx.is_local {
            return Ok(());
        }
        let dir = ctx.resolve(&self.dir);
        tokio::fs::create_dir_all(&dir).await?;
        debug!("Entering work directory {}", dir.display());
        ctx.work_dir = dir;
        Ok(())
    }
}

// ============================================================================
// TestSuite
// ============================================================================

/// An ordered list of test cases sharing setup/teardown hooks
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "RawTestSuite")]
pub struct TestSuite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub cases: Vec<TestCase>,

    #[serde(skip_serializing)]
    pub hooks: Option<Arc<dyn SuiteHooks>>,
}

impl TestSuite {
    pub fn new(name: Option<String>, cases: Vec<TestCase>) -> Result<TestSuite, ModelError> {
        let suite = TestSuite {
            name,
            cases,
            hooks: None,
        };
        suite.validate()?;
        Ok(suite)
    }

    pub fn with_hooks(mut self, hooks: impl SuiteHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Name for display; falls back to a placeholder for unnamed suites
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    /// Check the suite invariants, including every case
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.cases.is_empty() {
            return Err(ModelError::EmptySuite(self.display_name().to_string()));
        }
        let mut seen = HashSet::new();
        for case in &self.cases {
            case.validate()?;
            if !seen.insert(case.name.as_str()) {
                return Err(ModelError::DuplicateCase {
                    suite: self.display_name().to_string(),
                    case: case.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub async fn before_all(&self, ctx: &mut Context) -> Result<(), HookError> {
        match &self.hooks {
            Some(hooks) => hooks.before_all(ctx).await,
            None => Ok(()),
        }
    }

    pub async fn after_all(&self, ctx: &Context) -> Result<(), HookError> {
        match &self.hooks {
            Some(hooks) => hooks.after_all(ctx).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuite")
            .field("name", &self.name)
            .field("cases", &self.cases)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTestSuite {
    name: Option<String>,
    cases: Vec<TestCase>,
    /// Subdirectory to create and run in when running locally
    work_dir: Option<String>,
}

impl TryFrom<RawTestSuite> for TestSuite {
    type Error = ModelError;

    fn try_from(raw: RawTestSuite) -> Result<Self, Self::Error> {
        let suite = TestSuite::new(raw.name, raw.cases)?;
        Ok(match raw.work_dir {
            Some(dir) => suite.with_hooks(EnterWorkDir::new(dir)),
            None => suite,
        })
    }
}

// ============================================================================
// Templates
// ============================================================================

/// Builds a suite from a resolved context
#[async_trait]
pub trait SuiteTemplate: Send + Sync {
    async fn build(&self, ctx: &Context) -> Result<TestSuite, ModelError>;
}

#[async_trait]
impl<F> SuiteTemplate for F
where
    F: Fn(&Context) -> Result<TestSuite, ModelError> + Send + Sync,
{
    async fn build(&self, ctx: &Context) -> Result<TestSuite, ModelError> {
        self(ctx)
    }
}

/// Either a suite value or a template that produces one
#[derive(Clone)]
pub enum EcosystemSuite {
    Suite(TestSuite),
    Template(Arc<dyn SuiteTemplate>),
}

impl EcosystemSuite {
    pub fn template(template: impl SuiteTemplate + 'static) -> Self {
        EcosystemSuite::Template(Arc::new(template))
    }

    /// Resolve into a validated [`TestSuite`], calling the template if needed
    pub async fn reify(&self, ctx: &Context) -> Result<TestSuite, ModelError> {
        let suite = match self {
            EcosystemSuite::Suite(suite) => suite.clone(),
            EcosystemSuite::Template(template) => template.build(ctx).await?,
        };
        suite.validate()?;
        Ok(suite)
    }
}

impl From<TestSuite> for EcosystemSuite {
    fn from(suite: TestSuite) -> Self {
        EcosystemSuite::Suite(suite)
    }
}

impl fmt::Debug for EcosystemSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcosystemSuite::Suite(suite) => f.debug_tuple("Suite").field(suite).finish(),
            EcosystemSuite::Template(_) => f.write_str("Template(..)"),
        }
    }
}
