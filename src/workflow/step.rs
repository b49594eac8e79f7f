//! Step definitions and normalization
//!
//! A [`Step`] is one shell command group. Steps can be written as a raw
//! command string, a list of command lines, or a fully spelled-out object;
//! all three normalize into the same canonical value.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ModelError;

/// Environment overrides. A `None` value unsets the variable.
pub type EnvMap = BTreeMap<String, Option<String>>;

/// Orchestrator-specific extras (artifact paths, plugins, ...).
pub type Metadata = serde_json::Map<String, Value>;

// ============================================================================
// Inputs
// ============================================================================

/// A command given either as one (possibly multi-line) string or as a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    One(String),
    Many(Vec<String>),
}

impl CommandSpec {
    /// Normalize into trimmed, non-blank command lines
    pub fn into_lines(self) -> Vec<String> {
        match self {
            CommandSpec::One(command) => split_lines(&command),
            CommandSpec::Many(lines) => lines
                .into_iter()
                .map(|line| line.trim().to_string())
                .filter(|line| !line.is_empty())
                .collect(),
        }
    }

    /// Substitute `{bin}` with the selected runtime binary
    pub fn with_bin(&self, bin: &str) -> CommandSpec {
        match self {
            CommandSpec::One(command) => CommandSpec::One(command.replace("{bin}", bin)),
            CommandSpec::Many(lines) => {
                CommandSpec::Many(lines.iter().map(|l| l.replace("{bin}", bin)).collect())
            }
        }
    }
}

/// Everything a [`Step`] can be built from
#[derive(Debug, Clone, PartialEq)]
pub enum StepInput {
    /// A raw command string; multi-line input is split into lines
    Command(String),
    /// Command lines, one per entry
    Lines(Vec<String>),
    /// An already-built step that further options get merged into
    Built(Step),
}

impl From<&str> for StepInput {
    fn from(command: &str) -> Self {
        StepInput::Command(command.to_string())
    }
}

impl From<String> for StepInput {
    fn from(command: String) -> Self {
        StepInput::Command(command)
    }
}

impl From<Vec<String>> for StepInput {
    fn from(lines: Vec<String>) -> Self {
        StepInput::Lines(lines)
    }
}

impl From<&[&str]> for StepInput {
    fn from(lines: &[&str]) -> Self {
        StepInput::Lines(lines.iter().map(|l| l.to_string()).collect())
    }
}

impl From<CommandSpec> for StepInput {
    fn from(input: CommandSpec) -> Self {
        match input {
            CommandSpec::One(command) => StepInput::Command(command),
            CommandSpec::Many(lines) => StepInput::Lines(lines),
        }
    }
}

impl From<Step> for StepInput {
    fn from(step: Step) -> Self {
        StepInput::Built(step)
    }
}

/// Optional fields applied while building a [`Step`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOptions {
    pub name: Option<String>,
    pub key: Option<String>,
    pub env: Option<EnvMap>,
    pub cwd: Option<String>,
    pub timeout: Option<u64>,
    pub metadata: Option<Metadata>,
}

impl StepOptions {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set an environment variable for this step
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(EnvMap::new)
            .insert(key.into(), Some(value.into()));
        self
    }

    /// Unset an environment variable for this step
    pub fn unset(mut self, key: impl Into<String>) -> Self {
        self.env.get_or_insert_with(EnvMap::new).insert(key.into(), None);
        self
    }

    /// Replace the whole environment override map
    pub fn env_map(mut self, env: Option<EnvMap>) -> Self {
        self.env = env;
        self
    }

    /// Timeout in milliseconds
    pub fn timeout(mut self, ms: u64) -> Self {
        self.timeout = Some(ms);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value);
        self
    }
}

// ============================================================================
// Step
// ============================================================================

/// A single shell command group with its own env, cwd and timeout
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Stable identifier, used for cross-referencing and pipeline keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Each entry is one shell command line
    pub run: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvMap>,

    /// Working directory, relative to the case's `cwd`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Orchestrator extras; ignored by the shell renderer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Step {
    /// Build a step from any supported input, applying `options`.
    ///
    /// For a [`StepInput::Built`] step, scalar fields already set on the
    /// step win over `options`; `env` and `metadata` are merged key by key
    /// with `options` winning per key.
    pub fn new(input: impl Into<StepInput>, options: StepOptions) -> Result<Step, ModelError> {
        let step = match input.into() {
            StepInput::Command(command) => Step::from_lines(split_lines(&command), options),
            StepInput::Lines(lines) => {
                Step::from_lines(CommandSpec::Many(lines).into_lines(), options)
            }
            StepInput::Built(mut step) => {
                step.absorb(options);
                step
            }
        };
        step.validate()?;
        Ok(step)
    }

    /// Build a step from a command with no extra options
    pub fn command(input: impl Into<StepInput>) -> Result<Step, ModelError> {
        Step::new(input, StepOptions::default())
    }

    fn from_lines(run: Vec<String>, options: StepOptions) -> Step {
        Step {
            name: options.name,
            key: options.key,
            run,
            env: options.env,
            cwd: options.cwd,
            timeout: options.timeout,
            metadata: options.metadata,
        }
    }

    fn absorb(&mut self, options: StepOptions) {
        if self.name.is_none() {
            self.name = options.name;
        }
        if self.key.is_none() {
            self.key = options.key;
        }
        if self.cwd.is_none() {
            self.cwd = options.cwd;
        }
        if self.timeout.is_none() {
            self.timeout = options.timeout;
        }
        if let Some(env) = options.env {
            merge_env(self.env.get_or_insert_with(EnvMap::new), &env);
        }
        if let Some(metadata) = options.metadata {
            merge_metadata(self.metadata.get_or_insert_with(Metadata::new), metadata);
        }
    }

    /// Check the step invariants
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.run.is_empty() {
            return Err(ModelError::EmptyStep(
                self.name.clone().unwrap_or_else(|| "<anonymous>".to_string()),
            ));
        }
        if self.timeout == Some(0) {
            return Err(ModelError::ZeroTimeout(self.label().to_string()));
        }
        Ok(())
    }

    /// Display label: the name, falling back to the first command line
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or_else(|| self.run.first().map(String::as_str))
            .unwrap_or("<anonymous>")
    }
}

impl TryFrom<&str> for Step {
    type Error = ModelError;

    fn try_from(command: &str) -> Result<Self, Self::Error> {
        Step::command(command)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Full {
            name: Option<String>,
            key: Option<String>,
            run: CommandSpec,
            env: Option<EnvMap>,
            cwd: Option<String>,
            timeout: Option<u64>,
            metadata: Option<Metadata>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StepHelper {
            Command(String),
            Lines(Vec<String>),
            Full(Full),
        }

        let (input, options) = match StepHelper::deserialize(deserializer)? {
            StepHelper::Command(command) => (StepInput::Command(command), StepOptions::default()),
            StepHelper::Lines(lines) => (StepInput::Lines(lines), StepOptions::default()),
            StepHelper::Full(full) => (
                StepInput::from(full.run),
                StepOptions {
                    name: full.name,
                    key: full.key,
                    env: full.env,
                    cwd: full.cwd,
                    timeout: full.timeout,
                    metadata: full.metadata,
                },
            ),
        };
        Step::new(input, options).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Split a command string into trimmed, non-blank lines
pub fn split_lines(command: &str) -> Vec<String> {
    command
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Merge `overlay` into `base`; overlay wins per key
pub fn merge_env(base: &mut EnvMap, overlay: &EnvMap) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}

/// Deep-merge `overlay` into `base`. Nested objects merge recursively,
/// anything else is replaced by the overlay value.
pub fn merge_metadata(base: &mut Metadata, overlay: Metadata) {
    for (key, value) in overlay {
        match value {
            Value::Object(incoming) => match base.get_mut(&key) {
                Some(Value::Object(existing)) => merge_metadata(existing, incoming),
                _ => {
                    base.insert(key, Value::Object(incoming));
                }
            },
            other => {
                base.insert(key, other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_from_command() {
        let step = Step::command("echo \"hello\"").unwrap();
        assert_eq!(step.run, vec!["echo \"hello\"".to_string()]);
        assert_eq!(step.name, None);
        assert_eq!(step.env, None);
        assert_eq!(step.cwd, None);
    }

    #[test]
    fn test_multiline_command_is_split_and_trimmed() {
        let step = Step::command(
            r#"
            if [ -d foo ]; then
                cd foo

            fi
            "#,
        )
        .unwrap();
        assert_eq!(step.run, vec!["if [ -d foo ]; then", "cd foo", "fi"]);
    }

    #[test]
    fn test_empty_inputs_fail() {
        assert_eq!(
            Step::command(""),
            Err(ModelError::EmptyStep("<anonymous>".to_string()))
        );
        assert!(Step::command("   \n  \n").is_err());
        assert!(Step::command(Vec::<String>::new()).is_err());
        assert!(Step::command(vec!["  ".to_string()]).is_err());
    }

    #[test]
    fn test_zero_timeout_fails() {
        let result = Step::new("sleep 1", StepOptions::default().timeout(0));
        assert!(matches!(result, Err(ModelError::ZeroTimeout(_))));
    }

    #[test]
    fn test_built_step_first_write_wins() {
        let built = Step::new(
            "bun install",
            StepOptions::default().name("Install").cwd("pkg").timeout(1000),
        )
        .unwrap();

        let merged = Step::new(
            built,
            StepOptions::default()
                .name("Other")
                .cwd("elsewhere")
                .key("install-deps")
                .timeout(5),
        )
        .unwrap();

        assert_eq!(merged.name.as_deref(), Some("Install"));
        assert_eq!(merged.cwd.as_deref(), Some("pkg"));
        assert_eq!(merged.timeout, Some(1000));
        assert_eq!(merged.key.as_deref(), Some("install-deps"));
    }

    #[test]
    fn test_built_step_deep_merges_maps() {
        let built = Step::new(
            "make",
            StepOptions::default()
                .env("A", "1")
                .env("B", "1")
                .metadata("plugins", json!({ "docker": { "image": "node", "tty": true } })),
        )
        .unwrap();

        let merged = Step::new(
            built,
            StepOptions::default()
                .env("B", "2")
                .unset("C")
                .metadata("plugins", json!({ "docker": { "image": "bun" } }))
                .metadata("artifact_paths", json!(["out/*"])),
        )
        .unwrap();

        let env = merged.env.unwrap();
        assert_eq!(env.get("A"), Some(&Some("1".to_string())));
        assert_eq!(env.get("B"), Some(&Some("2".to_string())));
        assert_eq!(env.get("C"), Some(&None));

        let metadata = Value::Object(merged.metadata.unwrap());
        assert_eq!(
            metadata,
            json!({
                "plugins": { "docker": { "image": "bun", "tty": true } },
                "artifact_paths": ["out/*"],
            })
        );
    }

    #[test]
    fn test_building_twice_is_idempotent() {
        let once = Step::new("echo hi", StepOptions::default().name("greet")).unwrap();
        let twice = Step::new(once.clone(), StepOptions::default()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_label_falls_back_to_first_command() {
        let step = Step::command("echo one\necho two").unwrap();
        assert_eq!(step.label(), "echo one");

        let named = Step::new("echo one", StepOptions::default().name("First")).unwrap();
        assert_eq!(named.label(), "First");
    }

    #[test]
    fn test_deserialize_step_forms() {
        let yaml = r#"
- echo hi
- [echo one, echo two]
- name: Build
  run: |
    make
    make install
  cwd: app
  timeout: 5000
  env:
    DEBUG: "1"
    NOISY: ~
"#;
        let steps: Vec<Step> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(steps[0].run, vec!["echo hi"]);
        assert_eq!(steps[1].run, vec!["echo one", "echo two"]);
        assert_eq!(steps[2].name.as_deref(), Some("Build"));
        assert_eq!(steps[2].run, vec!["make", "make install"]);
        assert_eq!(steps[2].timeout, Some(5000));
        let env = steps[2].env.as_ref().unwrap();
        assert_eq!(env.get("NOISY"), Some(&None));
    }

    #[test]
    fn test_deserialize_empty_run_fails() {
        let result: Result<Step, _> = serde_yaml::from_str("run: []");
        assert!(result.is_err());
    }

    #[test]
    fn test_command_spec_with_bin() {
        let spec = CommandSpec::One("{bin} run build".to_string());
        assert_eq!(
            spec.with_bin("/opt/bun").into_lines(),
            vec!["/opt/bun run build"]
        );
    }
}
