//! Ecosystem configuration
//!
//! Loaded from `ecosystem.yaml`:
//!
//! ```yaml
//! bin: bun
//! inherit_env: [PATH, CI, TERM]
//!
//! pipeline:
//!   namespace: ecosystem-ci
//!   agents:
//!     queue: linux-x64
//!
//! suites:
//!   foundation-regression:
//!     kind: install-and-test
//!     name: foundation regression
//!     packages:
//!       minipass:
//!         repository: https://github.com/isaacs/minipass
//!
//!   smoke:
//!     kind: suite
//!     cases:
//!       - name: hello
//!         steps: ["echo hi"]
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::context::DEFAULT_BIN;
use super::registry::SuiteRegistry;
use super::suite::{EcosystemSuite, TestSuite};
use super::templates::InstallAndTest;
use crate::render::buildkite::PipelineOptions;

/// Environment variables passed through to locally spawned steps
pub const DEFAULT_INHERIT_ENV: &[&str] = &["PATH", "CI", "TTY", "BUN_DEBUG_QUIET_LOGS", "TERM"];

/// Grace period between SIGTERM and SIGKILL for timed-out steps
pub const DEFAULT_KILL_GRACE_MS: u64 = 2000;

fn default_bin() -> String {
    DEFAULT_BIN.to_string()
}

fn default_inherit_env() -> Vec<String> {
    DEFAULT_INHERIT_ENV.iter().map(|s| s.to_string()).collect()
}

fn default_kill_grace_ms() -> u64 {
    DEFAULT_KILL_GRACE_MS
}

/// How one suite is defined in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SuiteDefinition {
    /// Cases spelled out literally
    Suite(TestSuite),
    /// Cases generated from a list of git repositories
    InstallAndTest(InstallAndTest),
}

impl SuiteDefinition {
    pub fn into_suite(self) -> EcosystemSuite {
        match self {
            SuiteDefinition::Suite(suite) => EcosystemSuite::Suite(suite),
            SuiteDefinition::InstallAndTest(template) => EcosystemSuite::template(template),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EcosystemConfig {
    /// Runtime binary name or path
    #[serde(default = "default_bin")]
    pub bin: String,

    /// Ambient environment variables passed to local steps
    #[serde(default = "default_inherit_env")]
    pub inherit_env: Vec<String>,

    /// Grace period after SIGTERM before a timed-out step is killed
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    #[serde(default)]
    pub pipeline: PipelineOptions,

    /// Directory of additional suite files, relative to the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suites_dir: Option<String>,

    #[serde(default)]
    pub suites: IndexMap<String, SuiteDefinition>,
}

impl Default for EcosystemConfig {
    fn default() -> Self {
        Self {
            bin: default_bin(),
            inherit_env: default_inherit_env(),
            kill_grace_ms: default_kill_grace_ms(),
            pipeline: PipelineOptions::default(),
            suites_dir: None,
            suites: IndexMap::new(),
        }
    }
}

impl EcosystemConfig {
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, crate::workflow::LoadError> {
        crate::workflow::SuiteLoader::load_config(path.as_ref())
    }

    /// Build the registry of named suites, in definition order
    pub fn registry(&self) -> SuiteRegistry {
        let mut registry = SuiteRegistry::new();
        for (key, definition) in &self.suites {
            registry.insert(key.clone(), definition.clone().into_suite());
        }
        registry
    }
}
