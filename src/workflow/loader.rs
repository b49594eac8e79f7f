//! Suite definition loader
//!
//! Load suite definitions from YAML files, either one file per suite in a
//! directory or the full `ecosystem.yaml` configuration.

use std::path::Path;

use indexmap::IndexMap;

use super::config::{EcosystemConfig, SuiteDefinition};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },

    #[error("Suite '{key}' is defined more than once (in {file})")]
    DuplicateSuite { key: String, file: String },
}

pub struct SuiteLoader;

impl SuiteLoader {
    /// Load every `*.yaml`/`*.yml` file in `dir` as one suite definition,
    /// keyed by file stem. Files are read in name order.
    pub fn load_directory(dir: &Path) -> Result<IndexMap<String, SuiteDefinition>, LoadError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if path.is_file() && matches!(ext, Some("yaml") | Some("yml")) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut suites = IndexMap::new();
        for path in paths {
            let key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let definition = Self::load_file(&path)?;
            if suites.insert(key.clone(), definition).is_some() {
                return Err(LoadError::DuplicateSuite {
                    key,
                    file: path.display().to_string(),
                });
            }
        }

        Ok(suites)
    }

    /// Load a single suite definition file
    pub fn load_file(path: &Path) -> Result<SuiteDefinition, LoadError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
            file: path.display().to_string(),
            error: e,
        })
    }

    /// Load `ecosystem.yaml`, merging in any `suites_dir` it points at.
    /// `suites_dir` is resolved relative to the config file.
    pub fn load_config(path: &Path) -> Result<EcosystemConfig, LoadError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: EcosystemConfig =
            serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
                file: path.display().to_string(),
                error: e,
            })?;

        if let Some(dir) = &config.suites_dir {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            let dir = base.join(dir);
            for (key, definition) in Self::load_directory(&dir)? {
                if config.suites.contains_key(&key) {
                    return Err(LoadError::DuplicateSuite {
                        key,
                        file: dir.display().to_string(),
                    });
                }
                config.suites.insert(key, definition);
            }
        }

        Ok(config)
    }
}
