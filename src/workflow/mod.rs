//! Suite model and definitions
//!
//! This module contains all types for defining and loading suites:
//! - `step` - Step, StepInput and the normalization rules
//! - `case` - TestCase
//! - `suite` - TestSuite, lifecycle hooks and suite templates
//! - `context` - Context a suite is rendered or run against
//! - `templates` - Install-and-test template and the checkout step
//! - `config` - `ecosystem.yaml` configuration
//! - `registry` - Named suites in definition order
//! - `loader` - Load suite definitions from files and directories

pub mod case;
pub mod config;
pub mod context;
pub mod error;
pub mod loader;
pub mod registry;
pub mod step;
pub mod suite;
pub mod templates;

pub use case::{TestCase, TestCaseOptions};
pub use config::{EcosystemConfig, SuiteDefinition, DEFAULT_INHERIT_ENV, DEFAULT_KILL_GRACE_MS};
pub use context::{Context, RenderTarget, DEFAULT_BIN};
pub use error::ModelError;
pub use loader::{LoadError, SuiteLoader};
pub use registry::SuiteRegistry;
pub use step::{CommandSpec, EnvMap, Metadata, Step, StepInput, StepOptions};
pub use suite::{EcosystemSuite, EnterWorkDir, HookError, SuiteHooks, SuiteTemplate, TestSuite};
pub use templates::{checkout, InstallAndTest, Package, DEFAULT_REPOS_DIR};
