//! Buildkite pipeline renderer
//!
//! One `group` per suite and one command unit per case. Steps are not
//! separate units: a case's steps are flattened into a single script body,
//! rendered the same way the shell renderer renders a case.
//!
//! ```yaml
//! agents:
//!   arch: x64
//!   os: linux
//!   queue: ecosystem-ci
//! steps:
//!   - group: oss-apps
//!     key: oss-apps
//!     steps:
//!       - label: oss-apps / remotion
//!         key: oss-apps-remotion
//!         command: |-
//!           set +e
//!           ...
//!         soft_fail: true
//!         concurrency_group: ecosystem-ci/oss-apps/remotion/main
//!         concurrency: 1
//!         concurrency_method: eager
//! ```
//!
//! Names that are not already slugs get a short digest appended to their
//! key, so `socket.io` and `socket-io` never share a key or a concurrency
//! group. `$` in commands and env values is doubled because
//! `buildkite-agent pipeline upload` interpolates variables.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::workflow::step::merge_metadata;
use crate::workflow::{Context, EcosystemSuite, Metadata, TestCase, TestSuite};

use super::shell::{env_line, render_case_body};
use super::RenderError;

/// File name the manifest is written to
pub const PIPELINE_FILE: &str = "ecosystem-ci.yml";

/// Unit fields that step metadata may not override
const RESERVED_KEYS: &[&str] = &[
    "label",
    "key",
    "skip",
    "env",
    "command",
    "soft_fail",
    "concurrency_group",
    "concurrency",
    "concurrency_method",
];

fn default_namespace() -> String {
    "ecosystem-ci".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_agents() -> BTreeMap<String, String> {
    [("queue", "ecosystem-ci"), ("os", "linux"), ("arch", "x64")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn default_bootstrap() -> Vec<String> {
    vec!["{bin} --version".to_string(), "{bin} --revision".to_string()]
}

fn default_true() -> bool {
    true
}

/// Pipeline-wide settings, read from the `pipeline` section of the config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineOptions {
    /// Prefix of every concurrency group
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Branch the pipeline is built for; part of every concurrency group
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Agent selection, emitted verbatim
    #[serde(default = "default_agents")]
    pub agents: BTreeMap<String, String>,

    /// Lines run before each case. `{bin}` expands to the runtime binary.
    #[serde(default = "default_bootstrap")]
    pub bootstrap: Vec<String>,

    /// Prefix unit labels with the suite name
    #[serde(default = "default_true")]
    pub qualify_labels: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            branch: default_branch(),
            agents: default_agents(),
            bootstrap: default_bootstrap(),
            qualify_labels: true,
        }
    }
}

// ============================================================================
// Manifest
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub agents: BTreeMap<String, String>,
    pub steps: Vec<GroupStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStep {
    pub group: String,
    pub key: String,
    pub steps: Vec<CommandUnit>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One executable unit; runs a whole test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandUnit {
    pub label: String,
    pub key: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub skip: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    pub command: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub soft_fail: bool,

    pub concurrency_group: String,
    pub concurrency: u32,
    pub concurrency_method: String,

    /// Aggregated step metadata (`artifact_paths`, `plugins`, ...)
    #[serde(flatten)]
    pub metadata: Metadata,
}

// ============================================================================
// Keys
// ============================================================================

static NON_SLUG_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lowercase, with runs of anything but `[a-z0-9]` collapsed into `-`
pub fn slug(s: &str) -> String {
    NON_SLUG_CHARS
        .replace_all(&s.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Key-safe form of `name`: the slug itself when `name` already is one,
/// otherwise the slug plus the first 8 hex digits of its SHA-256. Never empty.
pub fn key_part(name: &str) -> String {
    let slugged = slug(name);
    if !slugged.is_empty() && slugged == name {
        return slugged;
    }
    let digest = hex::encode(&Sha256::digest(name.as_bytes())[..4]);
    if slugged.is_empty() {
        digest
    } else {
        format!("{slugged}-{digest}")
    }
}

/// Concurrency group for one case on one branch.
///
/// The same inputs always give the same key, and inputs that differ in any
/// part give different keys.
pub fn concurrency_key(namespace: &str, suite: &str, case: &str, branch: &str) -> String {
    [namespace, suite, case, branch]
        .iter()
        .map(|part| key_part(part))
        .collect::<Vec<_>>()
        .join("/")
}

/// Escape `$` so the agent passes it through to the shell at run time
fn escape_interpolation(s: &str) -> String {
    s.replace('$', "$$")
}

// ============================================================================
// Factory
// ============================================================================

/// Accumulates suites into one [`Pipeline`]
pub struct PipelineFactory {
    ctx: Context,
    options: PipelineOptions,
    pipeline: Pipeline,
    keys: HashSet<String>,
}

impl PipelineFactory {
    pub fn new(ctx: Context, options: PipelineOptions) -> Self {
        let pipeline = Pipeline {
            agents: options.agents.clone(),
            steps: Vec::new(),
        };
        Self {
            ctx,
            options,
            pipeline,
            keys: HashSet::new(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Reify `suite` against this factory's context and add it as a group
    pub async fn add_test_suite(&mut self, suite: &EcosystemSuite) -> Result<&mut Self, RenderError> {
        let suite = suite.reify(&self.ctx).await?;
        self.push_suite(&suite)?;
        Ok(self)
    }

    /// Add an already-reified suite as a group
    pub fn push_suite(&mut self, suite: &TestSuite) -> Result<&mut Self, RenderError> {
        suite.validate()?;
        let suite_name = suite.display_name();
        debug!("Adding suite '{}' to pipeline", suite_name);

        let units = suite
            .cases
            .iter()
            .map(|case| self.unit(suite_name, case))
            .collect::<Result<Vec<_>, _>>()?;
        let group = GroupStep {
            group: suite_name.to_string(),
            key: key_part(suite_name),
            steps: units,
        };

        // Reserve keys only once the whole group is known to be valid
        let mut keys = self.keys.clone();
        for key in std::iter::once(&group.key).chain(group.steps.iter().map(|u| &u.key)) {
            if !keys.insert(key.clone()) {
                return Err(RenderError::DuplicateKey(key.clone()));
            }
        }
        self.keys = keys;

        self.pipeline.steps.push(group);
        Ok(self)
    }

    fn unit(&self, suite_name: &str, case: &TestCase) -> Result<CommandUnit, RenderError> {
        let soft_fail = case.failing && !case.skip;

        let mut body = vec![if soft_fail { "set +e" } else { "set -e" }.to_string()];
        body.extend(
            self.options
                .bootstrap
                .iter()
                .map(|line| line.replace("{bin}", &self.ctx.bin)),
        );

        let mut env = BTreeMap::new();
        for (key, value) in case.env.iter().flatten() {
            match value {
                Some(value) => {
                    env.insert(key.clone(), escape_interpolation(value));
                }
                None => body.push(env_line(key, None)),
            }
        }

        let mut lines = render_case_body(case)?;
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        body.extend(lines);

        let label = if self.options.qualify_labels {
            format!("{} / {}", suite_name, case.name)
        } else {
            case.name.clone()
        };

        Ok(CommandUnit {
            label,
            key: format!("{}-{}", key_part(suite_name), key_part(&case.name)),
            skip: case.skip,
            env,
            command: escape_interpolation(&body.join("\n")),
            soft_fail,
            concurrency_group: concurrency_key(
                &self.options.namespace,
                suite_name,
                &case.name,
                &self.options.branch,
            ),
            concurrency: 1,
            concurrency_method: "eager".to_string(),
            metadata: aggregate_metadata(case),
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn into_pipeline(self) -> Pipeline {
        self.pipeline
    }

    pub fn to_yaml(&self) -> Result<String, RenderError> {
        Ok(serde_yaml::to_string(&self.pipeline)?)
    }
}

/// Deep-merge every step's metadata in order; later steps win per key
fn aggregate_metadata(case: &TestCase) -> Metadata {
    let mut merged = Metadata::new();
    for metadata in case.steps.iter().filter_map(|s| s.metadata.as_ref()) {
        merge_metadata(&mut merged, metadata.clone());
    }
    for key in RESERVED_KEYS {
        if merged.remove(*key).is_some() {
            warn!("Ignoring reserved metadata key '{}' in case '{}'", key, case.name);
        }
    }
    merged
}
