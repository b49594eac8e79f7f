use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_file(dir: &Path, filename: &str, content: &str) -> PathBuf {
    let path = dir.join(filename);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(&path, content).expect("Failed to write file");
    path
}

pub fn write_config(dir: &Path, content: &str) -> PathBuf {
    write_file(dir, "ecosystem.yaml", content)
}

/// A literal suite with one case per `(name, command)` pair
pub fn literal_suite(name: &str, cases: &[(&str, &str)]) -> String {
    let cases = cases
        .iter()
        .map(|(case, command)| {
            format!(
                "      - name: {}\n        steps:\n          - {:?}\n",
                case, command
            )
        })
        .collect::<String>();
    format!(
        "  {}:\n    kind: suite\n    name: {}\n    cases:\n{}",
        name, name, cases
    )
}

/// `ecosystem.yaml` content holding the given suite blocks
pub fn config_with_suites(suites: &[String]) -> String {
    format!("bin: bash\nsuites:\n{}", suites.concat())
}

pub fn install_and_test_suite(name: &str) -> String {
    format!(
        r#"  {}:
    kind: install-and-test
    name: {}
    packages:
      minipass:
        repository: https://github.com/isaacs/minipass
      remotion:
        repository: https://github.com/remotion-dev/remotion
        postinstall: "{{bin}} run build"
        failing: true
"#,
        name, name
    )
}
