mod common;

use std::process::Command;

use common::*;
use ecosystem_ci::prelude::*;

fn suite(cases: Vec<TestCase>) -> TestSuite {
    TestSuite::new(Some("s".to_string()), cases).unwrap()
}

#[test]
fn test_single_step_is_wrapped_in_subshell() {
    let lines = render_suite(&suite(vec![TestCase::from_steps("a", ["echo hi"]).unwrap()])).unwrap();

    assert_eq!(&lines[..5], &["#!/bin/bash", "# Suite: s", "", "set -eo pipefail", ""]);
    let step = lines.iter().position(|l| l == "# Step: echo hi").unwrap();
    assert_eq!(&lines[step + 1..step + 4], &["(", "    echo hi", ")"]);
}

#[test]
fn test_timeout_step_has_no_subshell() {
    let step = Step::new("echo hi", StepOptions::default().timeout(5000)).unwrap();
    let lines = render_suite(&suite(vec![TestCase::from_steps("a", [step]).unwrap()])).unwrap();

    let timeouts: Vec<_> = lines.iter().filter(|l| l.starts_with("timeout ")).collect();
    assert_eq!(timeouts.len(), 1);
    assert!(timeouts[0].contains("--kill-after=10s"));
    assert!(timeouts[0].contains(" 5s "));
    assert!(!lines.iter().any(|l| l == "(" || l == ")"));
}

#[test]
fn test_skip_only_adds_comment_prefix() {
    let active = suite(vec![TestCase::from_steps("a", ["bun install", "bun test"]).unwrap()]);
    let mut skipped = active.clone();
    skipped.cases[0].skip = true;

    let active = render_suite(&active).unwrap();
    let skipped = render_suite(&skipped).unwrap();
    assert_eq!(active.len(), skipped.len());

    // Header and the blank line after the case are outside the case block
    let block = 5..active.len() - 1;
    for i in block {
        assert_eq!(skipped[i], format!("# {}", active[i]));
    }
}

#[test]
fn test_render_is_deterministic() {
    let s = suite(vec![
        TestCase::from_steps("a", ["echo a"]).unwrap(),
        TestCase::from_steps("b", ["echo b"]).unwrap(),
    ]);
    assert_eq!(render_suite(&s).unwrap(), render_suite(&s).unwrap());
}

#[tokio::test]
async fn test_install_and_test_renders_local_checkout() {
    let template = InstallAndTest::new("oss applications").package(
        "remotion",
        Package::new("https://github.com/remotion-dev/remotion").postinstall("{bin} run build"),
    );
    let ctx = Context::render("/opt/bun", RenderTarget::Shell);
    let suite = EcosystemSuite::template(template).reify(&ctx).await.unwrap();
    let script = to_script(&render_suite(&suite).unwrap());

    assert!(script.contains("# Suite: oss applications"));
    assert!(script.contains("git reset --hard FETCH_HEAD"));
    assert!(script.contains("    /opt/bun run build\n"));
    assert!(script.contains("    cd remotion || exit 1\n"));
}

#[cfg(unix)]
#[test]
fn test_rendered_script_runs() {
    let dir = create_test_dir();
    let mut env_case = TestCase::from_steps(
        "env",
        [Step::new(
            "echo \"$GREETING\" > greeting.txt",
            StepOptions::default().env("GREETING", "hello $USER_NAME").cwd("out"),
        )
        .unwrap()],
    )
    .unwrap();
    env_case.env = Some(
        [("USER_NAME".to_string(), Some("bob".to_string()))]
            .into_iter()
            .collect(),
    );

    let s = suite(vec![
        TestCase::from_steps("setup", ["mkdir -p out"]).unwrap(),
        env_case,
        TestCase::from_steps(
            "timed",
            [Step::new(
                "if [ -d out ]; then\ntouch out/timed\nfi",
                StepOptions::default().timeout(10_000),
            )
            .unwrap()],
        )
        .unwrap(),
    ]);
    let script = write_file(dir.path(), "s.sh", &to_script(&render_suite(&s).unwrap()));

    let output = Command::new("bash")
        .arg(&script)
        .current_dir(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let greeting = std::fs::read_to_string(dir.path().join("out/greeting.txt")).unwrap();
    assert_eq!(greeting.trim(), "hello bob");
    assert!(dir.path().join("out/timed").exists());
}

#[tokio::test]
async fn test_rendered_install_and_test_passes_shellcheck() {
    let Ok(shellcheck) = which::which("shellcheck") else {
        return;
    };

    let template = InstallAndTest::new("oss applications")
        .package("minipass", Package::new("https://github.com/isaacs/minipass"))
        .package(
            "remotion",
            Package::new("https://github.com/remotion-dev/remotion")
                .postinstall("{bin} run build")
                .skip(),
        );
    let ctx = Context::render("bun", RenderTarget::Shell);
    let suite = EcosystemSuite::template(template).reify(&ctx).await.unwrap();

    let dir = create_test_dir();
    let script = write_file(dir.path(), "oss.sh", &to_script(&render_suite(&suite).unwrap()));
    let output = Command::new(shellcheck)
        .args(["--shell=bash", "--severity=warning"])
        .arg(&script)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stdout));
}
