//! Shell script renderer
//!
//! Lowers a [`TestSuite`] into one bash script. Every step runs in its own
//! subshell so `cd` and `export` inside a step never leak into the next one.
//! A step with a timeout is flattened into a single `&&` chain and handed to
//! `timeout(1)` instead.
//!
//! ```text
//! #!/bin/bash
//! # Suite: smoke
//!
//! set -eo pipefail
//!
//! # Test Case: hello
//! echo 'Running Test Case: hello'
//! # Step: echo hi
//! (
//!     echo hi
//! )
//!
//! ```

use crate::workflow::{EnvMap, ModelError, Step, TestCase, TestSuite};

use super::quote::{double_quote, single_quote, word};

/// `timeout --kill-after` is this many times the step timeout
pub const KILL_AFTER_MULTIPLIER: u64 = 2;

const INDENT: &str = "    ";

/// Render a suite into script lines. Join with `\n` (or use [`to_script`]).
pub fn render_suite(suite: &TestSuite) -> Result<Vec<String>, ModelError> {
    suite.validate()?;

    let mut lines = vec![
        "#!/bin/bash".to_string(),
        format!("# Suite: {}", suite.display_name()),
        String::new(),
        "set -eo pipefail".to_string(),
        String::new(),
    ];
    for case in &suite.cases {
        lines.extend(render_case(case)?);
        lines.push(String::new());
    }
    Ok(lines)
}

/// Render one case. Skipped cases keep every line, commented out.
pub fn render_case(case: &TestCase) -> Result<Vec<String>, ModelError> {
    let lines = render_case_body(case)?;
    if case.skip {
        Ok(lines.into_iter().map(|line| format!("# {line}")).collect())
    } else {
        Ok(lines)
    }
}

/// Render one case ignoring its `skip` flag
pub(crate) fn render_case_body(case: &TestCase) -> Result<Vec<String>, ModelError> {
    case.validate()?;

    let mut lines = vec![
        format!("# Test Case: {}", case.name),
        format!("echo {}", single_quote(&format!("Running Test Case: {}", case.name))),
    ];

    if let Some(cwd) = &case.cwd {
        lines.push(format!("pushd {} || exit 1", word(cwd)));
    }
    for step in &case.steps {
        lines.extend(render_step(step, case.env.as_ref())?);
        lines.push(String::new());
    }
    if case.cwd.is_some() {
        lines.push("popd || exit 1".to_string());
    }

    Ok(lines)
}

/// Render one step. `inherited_env` is the case environment, which the
/// step's own `env` overrides per key.
pub fn render_step(step: &Step, inherited_env: Option<&EnvMap>) -> Result<Vec<String>, ModelError> {
    step.validate()?;

    let mut lines = vec![format!("# Step: {}", step.label())];
    if let Some(name) = &step.name {
        lines.push(format!("echo {}", single_quote(name)));
    }

    let body = step_body(step, inherited_env);
    match step.timeout {
        Some(ms) => lines.push(format!(
            "timeout --kill-after={} {} bash -c {}",
            format_seconds(ms.saturating_mul(KILL_AFTER_MULTIPLIER)),
            format_seconds(ms),
            single_quote(&conjunction(&body)),
        )),
        None => {
            lines.push("(".to_string());
            lines.extend(body.iter().map(|line| format!("{INDENT}{line}")));
            lines.push(")".to_string());
        }
    }

    Ok(lines)
}

/// Join rendered lines into a script with a trailing newline
pub fn to_script(lines: &[String]) -> String {
    let mut script = lines.join("\n");
    script.push('\n');
    script
}

/// `cd`, env exports and the step commands, unindented
fn step_body(step: &Step, inherited_env: Option<&EnvMap>) -> Vec<String> {
    let mut body = Vec::new();
    if let Some(cwd) = &step.cwd {
        body.push(format!("cd {} || exit 1", word(cwd)));
    }

    // Case env first, minus anything the step overrides
    let overridden = |key: &String| step.env.as_ref().is_some_and(|env| env.contains_key(key));
    for (key, value) in inherited_env.into_iter().flatten() {
        if !overridden(key) {
            body.push(env_line(key, value.as_deref()));
        }
    }
    for (key, value) in step.env.iter().flatten() {
        body.push(env_line(key, value.as_deref()));
    }

    body.extend(step.run.iter().cloned());
    body
}

/// `export K="v"`, or `unset K` for a `None` value
pub(crate) fn env_line(key: &str, value: Option<&str>) -> String {
    match value {
        Some(value) => format!("export {key}={}", double_quote(value)),
        None => format!("unset {key}"),
    }
}

/// Whole seconds when exact, fractional otherwise: 5000 -> `5s`, 1500 -> `1.5s`
fn format_seconds(ms: u64) -> String {
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{}s", ms as f64 / 1000.0)
    }
}

const BLOCK_OPENERS: &[&str] = &["then", "do", "else", "{", "|", "&&", "||"];
const BLOCK_CLOSERS: &[&str] = &["fi", "done", "esac", "else", "elif", "then", "do", "}"];

/// Join command lines with `&&`, keeping `if`/`for`/`while` blocks valid
fn conjunction(lines: &[String]) -> String {
    let lines = logical_lines(lines);
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push_str(separator(&lines[i - 1], line));
        }
        out.push_str(line);
    }
    out
}

/// Lines as the shell would read them: `\`-continuations joined, comment
/// lines dropped, and a single trailing `;` removed (`;;` is kept).
fn logical_lines(lines: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending: Option<String> = None;

    for line in lines {
        let line = line.trim();
        let mut line = match pending.take() {
            Some(mut head) => {
                head.push(' ');
                head.push_str(line);
                head
            }
            None if line.starts_with('#') => continue,
            None => line.to_string(),
        };
        if line.ends_with('\\') {
            line.pop();
            pending = Some(line.trim_end().to_string());
        } else {
            out.push(line);
        }
    }
    out.extend(pending);

    out.into_iter()
        .map(|line| {
            if line.ends_with(';') && !line.ends_with(";;") {
                line[..line.len() - 1].trim_end().to_string()
            } else {
                line
            }
        })
        .filter(|line| !line.is_empty())
        .collect()
}

fn separator(prev: &str, next: &str) -> &'static str {
    let last = prev.split_whitespace().last().unwrap_or_default();
    let opens = BLOCK_OPENERS
        .iter()
        .any(|kw| last == *kw || last.ends_with(&format!(";{kw}")))
        || (prev.starts_with("case ") && last == "in")
        || prev.ends_with(";;");
    if opens {
        return " ";
    }

    let first = next.split_whitespace().next().unwrap_or_default();
    let first = first.trim_end_matches(';');
    if BLOCK_CLOSERS.contains(&first) {
        "; "
    } else {
        " && "
    }
}
