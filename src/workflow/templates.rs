//! Suite templates
//!
//! [`InstallAndTest`] turns a list of git repositories into a suite where
//! each package gets one case that
//! 1. checks out the repository,
//! 2. writes a `bunfig.toml` (with optional test preloads),
//! 3. installs dependencies,
//! 4. optionally runs a postinstall command,
//! 5. runs the package's tests.

use std::path::Path;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::case::{TestCase, TestCaseOptions};
use super::context::Context;
use super::error::ModelError;
use super::step::{CommandSpec, EnvMap, Step, StepInput, StepOptions};
use super::suite::{EnterWorkDir, SuiteTemplate, TestSuite};
use crate::render::quote::single_quote;

/// Directory repositories are cloned into when running locally
pub const DEFAULT_REPOS_DIR: &str = "repos";

fn default_ref() -> String {
    "main".to_string()
}

fn default_repos_dir() -> String {
    DEFAULT_REPOS_DIR.to_string()
}

/// Build the step that clones (or, locally, resets) a repository.
///
/// Remote runs always start from a clean checkout. Local runs reuse an
/// existing clone and hard-reset it to the fetched ref.
pub fn checkout(
    repository: &str,
    git_ref: &str,
    package_name: &str,
    is_local: bool,
) -> Result<Step, ModelError> {
    let clone = format!("git clone {repository} --branch {git_ref} --depth 1 {package_name}");
    let script = if is_local {
        format!(
            r#"
if [ -d {package_name} ]; then
    echo "resetting to {git_ref}"
    cd {package_name} || exit 1
    git fetch --depth 1 --tags --prune-tags origin {git_ref}
    git reset --hard FETCH_HEAD
else
    echo "cloning {repository}/{git_ref}"
    {clone}
fi
"#
        )
    } else {
        clone
    };

    Step::new(
        script,
        StepOptions::default()
            .name(format!("Checkout {package_name}"))
            .key(format!("checkout-{package_name}")),
    )
}

/// One repository tested by [`InstallAndTest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Package {
    /// URL to the git repo. This gets cloned.
    pub repository: String,

    /// Ref to check out (branch name, commit, tag, ...)
    #[serde(rename = "ref", default = "default_ref")]
    pub git_ref: String,

    /// How to run tests. The runtime binary is prepended implicitly.
    /// Defaults to `run test`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<CommandSpec>,

    /// Environment variables set only for the test step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_env: Option<EnvMap>,

    /// Command run after install; `{bin}` expands to the runtime binary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postinstall: Option<CommandSpec>,

    /// Preload scripts added to `bunfig.toml` under `[test]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preload: Option<CommandSpec>,

    /// Timeout for the test step in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default)]
    pub failing: bool,

    #[serde(default)]
    pub skip: bool,
}

impl Package {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            git_ref: default_ref(),
            test: None,
            test_env: None,
            postinstall: None,
            preload: None,
            timeout: None,
            failing: false,
            skip: false,
        }
    }

    pub fn git_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = git_ref.into();
        self
    }

    pub fn test(mut self, test: CommandSpec) -> Self {
        self.test = Some(test);
        self
    }

    pub fn postinstall(mut self, command: impl Into<String>) -> Self {
        self.postinstall = Some(CommandSpec::One(command.into()));
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }

    fn test_command(&self, package_name: &str, bin: &str) -> Result<String, ModelError> {
        let empty = || ModelError::Template(format!("test step for '{package_name}' cannot be empty"));
        match &self.test {
            None => Ok(format!("{bin} run test")),
            Some(CommandSpec::One(test)) => {
                if test.trim().is_empty() {
                    return Err(empty());
                }
                Ok(format!("{bin} {}", test.trim()))
            }
            Some(CommandSpec::Many(args)) => {
                let first = args.first().ok_or_else(empty)?;
                let bin_name = Path::new(bin)
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or(bin);
                if first == bin || first == bin_name {
                    return Err(ModelError::Template(format!(
                        "test args for '{package_name}' must not start with '{bin}'"
                    )));
                }
                let args = args.iter().map(|arg| {
                    if arg.contains(' ') {
                        format!("\"{arg}\"")
                    } else {
                        arg.clone()
                    }
                });
                Ok(std::iter::once(bin.to_string())
                    .chain(args)
                    .collect::<Vec<_>>()
                    .join(" "))
            }
        }
    }

    /// `printf` command writing `bunfig.toml`
    fn bunfig_command(&self) -> String {
        let mut lines = vec!["[run]".to_string(), "bun=true".to_string()];
        if let Some(preload) = &self.preload {
            lines.push("[test]".to_string());
            let entries = preload
                .clone()
                .into_lines()
                .iter()
                .map(|p| format!("\"{p}\""))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("preload = [{entries}]"));
        }
        let args = lines
            .iter()
            .map(|l| single_quote(l))
            .collect::<Vec<_>>()
            .join(" ");
        format!("printf '%s\\n' {args} > bunfig.toml")
    }

    fn to_case(&self, package_name: &str, ctx: &Context) -> Result<TestCase, ModelError> {
        let bin = ctx.bin.as_str();
        let in_package = || StepOptions::default().cwd(package_name);

        let steps = [
            Some(StepInput::Built(checkout(
                &self.repository,
                &self.git_ref,
                package_name,
                ctx.is_local,
            )?)),
            Some(StepInput::Built(Step::new(
                self.bunfig_command(),
                in_package().name("Create bunfig").key("create-bunfig"),
            )?)),
            Some(StepInput::Built(Step::new(
                format!("{bin} install"),
                in_package().key("install-deps"),
            )?)),
            match &self.postinstall {
                Some(command) => Some(StepInput::Built(Step::new(
                    command.with_bin(bin),
                    in_package().key("postinstall"),
                )?)),
                None => None,
            },
            Some(StepInput::Built(Step::new(
                self.test_command(package_name, bin)?,
                StepOptions {
                    timeout: self.timeout,
                    ..in_package().key("run-tests").env_map(self.test_env.clone())
                },
            )?)),
        ];

        TestCase::new(
            package_name,
            steps,
            TestCaseOptions {
                failing: self.failing,
                skip: self.skip,
                ..TestCaseOptions::default()
            },
        )
    }
}

/// Clone, install and test a set of packages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallAndTest {
    pub name: String,

    pub packages: IndexMap<String, Package>,

    /// Directory repositories are cloned into when running locally
    #[serde(default = "default_repos_dir")]
    pub work_dir: String,
}

impl InstallAndTest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            packages: IndexMap::new(),
            work_dir: default_repos_dir(),
        }
    }

    pub fn package(mut self, name: impl Into<String>, package: Package) -> Self {
        self.packages.insert(name.into(), package);
        self
    }

    /// Evaluate the template synchronously
    pub fn build_suite(&self, ctx: &Context) -> Result<TestSuite, ModelError> {
        let cases = self
            .packages
            .iter()
            .map(|(name, package)| package.to_case(name, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TestSuite::new(Some(self.name.clone()), cases)?
            .with_hooks(EnterWorkDir::new(self.work_dir.clone())))
    }
}

#[async_trait]
impl SuiteTemplate for InstallAndTest {
    async fn build(&self, ctx: &Context) -> Result<TestSuite, ModelError> {
        self.build_suite(ctx)
    }
}
