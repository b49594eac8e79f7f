//! Local executor - runs suites on this machine
//!
//! Per suite:
//! 1. Reify the suite against the context
//! 2. Run `before_all` (a failure skips every case)
//! 3. Run each case that passes the test filter and is not skipped;
//!    the first failing step ends the case
//! 4. Run `after_all`, always
//!
//! Everything runs sequentially. Step failures are reported in the
//! results; only an invalid suite stops the executor.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::engine::error::ExecutorError;
use crate::engine::process::StepProcess;
use crate::engine::result::{CaseResult, CaseStatus, RunResult, StepResult, SuiteResult};
use crate::workflow::{
    Context, EcosystemConfig, EcosystemSuite, Step, SuiteRegistry, TestCase,
    DEFAULT_INHERIT_ENV, DEFAULT_KILL_GRACE_MS,
};

/// Local executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Shell each step's lines are piped into
    pub shell: String,

    /// Ambient variables passed through to steps; everything else is dropped
    pub inherit_env: Vec<String>,

    /// Time between SIGTERM and SIGKILL for a timed-out step
    pub kill_grace: Duration,

    /// Capture step output instead of passing it through
    pub capture_output: bool,

    /// Only run cases whose name contains this
    pub test_filter: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            inherit_env: DEFAULT_INHERIT_ENV.iter().map(|s| s.to_string()).collect(),
            kill_grace: Duration::from_millis(DEFAULT_KILL_GRACE_MS),
            capture_output: false,
            test_filter: None,
        }
    }
}

impl ExecutorConfig {
    pub fn from_config(config: &EcosystemConfig) -> Self {
        Self {
            inherit_env: config.inherit_env.clone(),
            kill_grace: Duration::from_millis(config.kill_grace_ms),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.test_filter = filter;
        self
    }

    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }
}

/// Runs suites by spawning one subprocess per step
pub struct LocalExecutor {
    config: ExecutorConfig,
}

impl LocalExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run every suite in the registry, in order
    #[instrument(skip(self, registry, ctx))]
    pub async fn run_all(
        &self,
        registry: &SuiteRegistry,
        ctx: &Context,
    ) -> Result<RunResult, ExecutorError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!("Starting run {} ({} suites)", run_id, registry.len());

        let mut suites = Vec::with_capacity(registry.len());
        for (key, suite) in registry.iter() {
            suites.push(self.run_suite(key, suite, ctx).await?);
        }

        Ok(RunResult {
            run_id,
            started_at,
            suites,
        })
    }

    /// Run the one suite `selector` names, by registry key or suite name
    pub async fn run_selected(
        &self,
        registry: &SuiteRegistry,
        selector: &str,
        ctx: &Context,
    ) -> Result<RunResult, ExecutorError> {
        let (key, _) = registry
            .find(selector, ctx)
            .await?
            .ok_or_else(|| ExecutorError::SuiteNotFound(selector.to_string()))?;

        let mut selected = SuiteRegistry::new();
        if let Some(suite) = registry.get(&key) {
            selected.insert(key, suite.clone());
        }
        self.run_all(&selected, ctx).await
    }

    /// Run one suite. `ctx` is copied so hooks never affect other suites.
    #[instrument(skip(self, suite, ctx))]
    pub async fn run_suite(
        &self,
        key: &str,
        suite: &EcosystemSuite,
        ctx: &Context,
    ) -> Result<SuiteResult, ExecutorError> {
        let mut ctx = ctx.clone();
        let suite = suite.reify(&ctx).await?;
        let name = suite.name.clone().unwrap_or_else(|| key.to_string());
        info!("Running suite '{}' ({} cases)", name, suite.cases.len());

        let mut cases = Vec::new();
        let mut hook_errors = Vec::new();

        match suite.before_all(&mut ctx).await {
            Ok(()) => {
                for case in suite.cases.iter().filter(|c| self.matches_filter(c)) {
                    cases.push(self.run_case(case, &ctx).await);
                }
            }
            Err(e) => {
                error!("Suite '{}' before_all failed: {}", name, e);
                hook_errors.push(format!("before_all: {}", e));
                cases.extend(
                    suite
                        .cases
                        .iter()
                        .filter(|c| self.matches_filter(c))
                        .map(|c| CaseResult::skipped(c.name.clone())),
                );
            }
        }

        if let Err(e) = suite.after_all(&ctx).await {
            error!("Suite '{}' after_all failed: {}", name, e);
            hook_errors.push(format!("after_all: {}", e));
        }

        Ok(SuiteResult {
            key: key.to_string(),
            name,
            cases,
            hook_errors,
        })
    }

    /// Whether the test filter lets `case` through
    pub fn matches_filter(&self, case: &TestCase) -> bool {
        match &self.config.test_filter {
            Some(filter) => case.name.contains(filter.as_str()),
            None => true,
        }
    }

    /// Run a case's steps in order, stopping at the first failure
    #[instrument(skip(self, case, ctx), fields(case = %case.name))]
    pub async fn run_case(&self, case: &TestCase, ctx: &Context) -> CaseResult {
        if case.skip {
            info!("Skipping test case '{}'", case.name);
            return CaseResult::skipped(case.name.clone());
        }
        info!("Running test case '{}'", case.name);

        let mut steps = Vec::with_capacity(case.steps.len());
        let mut passed = true;
        for step in &case.steps {
            let result = self.run_step(step, case, ctx).await;
            let ok = result.success();
            steps.push(result);
            if !ok {
                passed = false;
                break;
            }
        }

        let status = match (passed, case.failing) {
            (true, false) => CaseStatus::Passed,
            (false, false) => CaseStatus::Failed,
            (false, true) => CaseStatus::KnownFailure,
            (true, true) => CaseStatus::UnexpectedPass,
        };
        match status {
            CaseStatus::Passed => info!("Test case '{}' passed", case.name),
            CaseStatus::Failed => error!("Test case '{}' failed", case.name),
            CaseStatus::KnownFailure => info!("Test case '{}' failed (known failure)", case.name),
            CaseStatus::UnexpectedPass => {
                warn!("Test case '{}' is marked failing but passed", case.name)
            }
            CaseStatus::Skipped => {}
        }

        CaseResult {
            name: case.name.clone(),
            status,
            steps,
        }
    }

    /// Run a single step of `case`
    #[instrument(skip(self, step, case, ctx), fields(step = %step.label()))]
    pub async fn run_step(&self, step: &Step, case: &TestCase, ctx: &Context) -> StepResult {
        let process = StepProcess {
            shell: self.config.shell.clone(),
            lines: step.run.clone(),
            cwd: step_cwd(ctx, case, step),
            env: self.step_env(case, step),
            timeout: step.timeout.map(Duration::from_millis),
            kill_grace: self.config.kill_grace,
            capture_output: self.config.capture_output,
        };
        debug!("Executing step '{}' in {}", step.label(), process.cwd.display());

        let output = process.run().await;
        if !output.outcome.is_success() {
            error!(
                "Step '{}' failed with exit code {} ({:?})",
                step.label(),
                output.outcome.exit_code(),
                output.outcome
            );
        }

        StepResult {
            label: step.label().to_string(),
            outcome: output.outcome,
            duration: output.duration,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }

    /// Environment for one step: inherited allow-list, then case env, then
    /// step env. `None` entries remove the variable.
    pub fn step_env(&self, case: &TestCase, step: &Step) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = self
            .config
            .inherit_env
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|value| (name.clone(), value)))
            .collect();

        for layer in [case.env.as_ref(), step.env.as_ref()].into_iter().flatten() {
            for (key, value) in layer {
                match value {
                    Some(value) => {
                        env.insert(key.clone(), value.clone());
                    }
                    None => {
                        env.remove(key);
                    }
                }
            }
        }
        env
    }
}

/// `ctx.work_dir / case.cwd / step.cwd`
pub fn step_cwd(ctx: &Context, case: &TestCase, step: &Step) -> PathBuf {
    let mut dir = ctx.work_dir.clone();
    if let Some(cwd) = &case.cwd {
        dir.push(cwd);
    }
    if let Some(cwd) = &step.cwd {
        dir.push(cwd);
    }
    dir
}
