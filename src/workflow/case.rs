//! Test cases: one package or target made of ordered steps

use serde::{Deserialize, Serialize};

use super::error::ModelError;
use super::step::{EnvMap, Step, StepInput};

/// An ordered list of steps for one package/target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTestCase")]
pub struct TestCase {
    /// Unique within a suite; also used in concurrency keys
    pub name: String,

    pub steps: Vec<Step>,

    /// Default working directory for every step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Environment variables to set for each step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvMap>,

    /// Known failure: a failing step does not make the case a regression
    pub failing: bool,

    /// Not executed; rendered disabled. Takes precedence over `failing`.
    pub skip: bool,
}

/// Optional fields applied while building a [`TestCase`]
#[derive(Debug, Clone, Default)]
pub struct TestCaseOptions {
    pub cwd: Option<String>,
    pub env: Option<EnvMap>,
    pub failing: bool,
    pub skip: bool,
}

impl TestCase {
    /// Build a case from a list of steps. `None` entries are dropped before
    /// the emptiness check, so conditional steps can be written as
    /// `condition.then(|| step)`.
    pub fn new<I>(
        name: impl Into<String>,
        steps: I,
        options: TestCaseOptions,
    ) -> Result<TestCase, ModelError>
    where
        I: IntoIterator<Item = Option<StepInput>>,
    {
        let name = name.into();
        let steps = steps
            .into_iter()
            .flatten()
            .map(Step::command)
            .collect::<Result<Vec<_>, _>>()?;

        let case = TestCase {
            name,
            steps,
            cwd: options.cwd,
            env: options.env,
            failing: options.failing,
            skip: options.skip,
        };
        case.validate()?;
        Ok(case)
    }

    /// Build a case from steps with default options
    pub fn from_steps<I, S>(name: impl Into<String>, steps: I) -> Result<TestCase, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<StepInput>,
    {
        TestCase::new(
            name,
            steps.into_iter().map(|s| Some(s.into())),
            TestCaseOptions::default(),
        )
    }

    /// Check the case invariants, including every step
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::EmptyCaseName);
        }
        if self.steps.is_empty() {
            return Err(ModelError::EmptyCase(self.name.clone()));
        }
        self.steps.iter().try_for_each(Step::validate)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTestCase {
    name: String,
    steps: Vec<Option<Step>>,
    cwd: Option<String>,
    env: Option<EnvMap>,
    #[serde(default)]
    failing: bool,
    #[serde(default)]
    skip: bool,
}

impl TryFrom<RawTestCase> for TestCase {
    type Error = ModelError;

    fn try_from(raw: RawTestCase) -> Result<Self, Self::Error> {
        TestCase::new(
            raw.name,
            raw.steps.into_iter().map(|s| s.map(StepInput::Built)),
            TestCaseOptions {
                cwd: raw.cwd,
                env: raw.env,
                failing: raw.failing,
                skip: raw.skip,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_from_commands() {
        let case = TestCase::from_steps("minipass", ["git clone x", "bun install"]).unwrap();
        assert_eq!(case.name, "minipass");
        assert_eq!(case.steps.len(), 2);
        assert!(!case.failing);
        assert!(!case.skip);
        assert_eq!(case.cwd, None);
        assert_eq!(case.env, None);
    }

    #[test]
    fn test_case_without_steps_fails() {
        let result = TestCase::from_steps("test", Vec::<String>::new());
        assert_eq!(result, Err(ModelError::EmptyCase("test".to_string())));
    }

    #[test]
    fn test_absent_steps_are_dropped() {
        let postinstall = false;
        let case = TestCase::new(
            "pkg",
            [
                Some(StepInput::from("bun install")),
                postinstall.then(|| StepInput::from("bun run build")),
                Some(StepInput::from("bun test")),
            ],
            TestCaseOptions::default(),
        )
        .unwrap();
        assert_eq!(case.steps.len(), 2);
        assert_eq!(case.steps[1].run, vec!["bun test"]);
    }

    #[test]
    fn test_only_absent_steps_fails() {
        let result = TestCase::new("pkg", [None, None], TestCaseOptions::default());
        assert!(matches!(result, Err(ModelError::EmptyCase(_))));
    }

    #[test]
    fn test_blank_name_fails() {
        let result = TestCase::from_steps("  ", ["echo hi"]);
        assert_eq!(result, Err(ModelError::EmptyCaseName));
    }

    #[test]
    fn test_deserialize_case() {
        let yaml = r#"
name: remotion
failing: true
cwd: remotion
steps:
  - bun install
  - ~
  - name: Test
    run: bun test
"#;
        let case: TestCase = serde_yaml::from_str(yaml).unwrap();
        assert!(case.failing);
        assert!(!case.skip);
        assert_eq!(case.cwd.as_deref(), Some("remotion"));
        assert_eq!(case.steps.len(), 2);
    }

    #[test]
    fn test_deserialize_case_without_steps_fails() {
        let result: Result<TestCase, _> = serde_yaml::from_str("name: empty\nsteps: []");
        assert!(result.is_err());
    }
}
