mod common;

use common::*;
use std::path::Path;
use std::process::{Command, Output};

fn cli_command() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ecosystem-ci"))
}

/// Run the CLI inside `dir` against `dir/ecosystem.yaml`
fn run_in(dir: &Path, args: &[&str]) -> Output {
    cli_command()
        .current_dir(dir)
        .args(["-c", dir.join("ecosystem.yaml").to_str().unwrap()])
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_cli_help() {
    let output = cli_command().arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Render and run ecosystem test suites"));
    assert!(stdout.contains("render"));
    assert!(stdout.contains("test"));
    assert!(stdout.contains("list"));
    assert!(stdout.contains("validate"));
}

#[test]
fn test_cli_version() {
    let output = cli_command().arg("--version").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ecosystem-ci"));
}

#[test]
fn test_cli_render_help() {
    let output = cli_command().args(["render", "--help"]).output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--format"));
    assert!(stdout.contains("--output"));
    assert!(stdout.contains("--branch"));
}

#[test]
fn test_cli_test_help() {
    let output = cli_command().args(["test", "--help"]).output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--filter"));
    assert!(stdout.contains("--strict"));
    assert!(stdout.contains("--json"));
}

#[test]
fn test_cli_missing_config() {
    let dir = create_test_dir();
    let output = run_in(dir.path(), &["list"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Config file not found"));
}

#[test]
fn test_cli_invalid_config() {
    let dir = create_test_dir();
    write_config(dir.path(), "bin: bash\nsuites:\n  broken:\n    kind: suite\n    cases: []\n");

    let output = run_in(dir.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_cli_list() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        &config_with_suites(&[
            literal_suite("smoke", &[("a", "true"), ("b", "true")]),
            install_and_test_suite("apps"),
        ]),
    );

    let output = run_in(dir.path(), &["list"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("smoke (smoke, 2 cases)"));
    assert!(stdout.contains("apps (apps, 2 cases)"));
    assert!(stdout.contains("remotion [failing]"));
}

#[test]
fn test_cli_list_empty() {
    let dir = create_test_dir();
    write_config(dir.path(), "bin: bash\n");

    let output = run_in(dir.path(), &["list"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No suites configured"));
}

#[test]
fn test_cli_validate() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        &config_with_suites(&[
            literal_suite("smoke", &[("a", "true")]),
            install_and_test_suite("apps"),
        ]),
    );

    let output = run_in(dir.path(), &["validate"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("is valid (2 suites, 3 cases)"));
}

#[test]
fn test_cli_render_shell() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        &config_with_suites(&[install_and_test_suite("oss apps")]),
    );

    let output = run_in(dir.path(), &["render", "-f", "shell", "-o", "out"]);
    assert!(output.status.success());

    let script = dir.path().join("out/oss_apps.sh");
    let content = std::fs::read_to_string(&script).unwrap();
    assert!(content.starts_with("#!/bin/bash\n# Suite: oss apps\n"));
    assert!(content.contains("git reset --hard FETCH_HEAD"));
    assert!(content.contains("bash run build"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}

#[test]
fn test_cli_render_buildkite_with_branch() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        &config_with_suites(&[literal_suite("smoke", &[("a", "true")])]),
    );

    let output = run_in(
        dir.path(),
        &["render", "-o", "out", "--branch", "feature/login", "-b", "/opt/bun"],
    );
    assert!(output.status.success());

    let yaml = std::fs::read_to_string(dir.path().join("out/ecosystem-ci.yml")).unwrap();
    let group = ecosystem_ci::concurrency_key("ecosystem-ci", "smoke", "a", "feature/login");
    assert!(group.starts_with("ecosystem-ci/smoke/a/feature-login-"));
    assert!(yaml.contains(&group));
    assert!(yaml.contains("/opt/bun --version"));
}

#[test]
fn test_cli_render_unknown_suite() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        &config_with_suites(&[literal_suite("smoke", &[("a", "true")])]),
    );

    let output = run_in(dir.path(), &["render", "-s", "nope"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Suite not found: nope"));
}

#[test]
fn test_cli_test_passing() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        &config_with_suites(&[literal_suite("smoke", &[("a", "touch ran"), ("b", "true")])]),
    );

    let output = run_in(dir.path(), &["test"]);
    assert!(output.status.success());
    assert!(dir.path().join("ran").exists());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("✓ a"));
    assert!(stdout.contains("2 passed, 0 failed"));
}

#[test]
fn test_cli_default_command_runs_tests() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        &config_with_suites(&[literal_suite("smoke", &[("a", "touch ran")])]),
    );

    let output = run_in(dir.path(), &[]);
    assert!(output.status.success());
    assert!(dir.path().join("ran").exists());
}

#[test]
fn test_cli_test_failing() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        &config_with_suites(&[literal_suite("smoke", &[("a", "true"), ("b", "exit 3")])]),
    );

    let output = run_in(dir.path(), &["test"]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("✗ b (step 'exit 3' exited with 3)"));
}

#[test]
fn test_cli_test_filter() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        &config_with_suites(&[literal_suite("smoke", &[("good", "true"), ("bad", "exit 1")])]),
    );

    let output = run_in(dir.path(), &["test", "-t", "good"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("1 passed, 0 failed"));
}

#[test]
fn test_cli_test_strict_unexpected_pass() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        r#"bin: bash
suites:
  smoke:
    kind: suite
    cases:
      - name: flaky
        failing: true
        steps: ["true"]
"#,
    );

    let relaxed = run_in(dir.path(), &["test"]);
    assert!(relaxed.status.success());
    assert!(String::from_utf8_lossy(&relaxed.stderr).contains("marked failing but passed"));

    let strict = run_in(dir.path(), &["test", "--strict"]);
    assert_eq!(strict.status.code(), Some(1));
}

#[test]
fn test_cli_test_json() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        &config_with_suites(&[literal_suite("smoke", &[("a", "true")])]),
    );

    let output = run_in(dir.path(), &["test", "--json"]);
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(result["run_id"].is_string());
    assert_eq!(result["suites"][0]["key"], "smoke");
    assert_eq!(result["suites"][0]["cases"][0]["status"], "passed");
}

#[test]
fn test_cli_test_missing_bin() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        &config_with_suites(&[literal_suite("smoke", &[("a", "true")])]),
    );

    let output = run_in(dir.path(), &["test", "-b", "definitely-not-a-runtime-xyz"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_cli_test_unknown_suite() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        &config_with_suites(&[literal_suite("smoke", &[("a", "touch ran")])]),
    );

    let output = run_in(dir.path(), &["test", "-s", "nope"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Suite not found: nope"));
    assert!(!dir.path().join("ran").exists());
}
