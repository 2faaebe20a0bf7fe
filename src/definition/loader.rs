//! Definition directory loader
//!
//! Load scripts, components and test cases from YAML files. Each file may
//! contain any of the top-level lists `scripts`, `components`, `test_cases`.

use serde::Deserialize;
use std::path::Path;

use super::repository::{DefinitionSet, DuplicateDefinition};
use super::{Component, Script, TestCase};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },

    #[error("{error} (in {file})")]
    Duplicate {
        file: String,
        error: DuplicateDefinition,
    },
}

/// Shape of a single definition file
#[derive(Debug, Default, Deserialize)]
struct DefinitionFile {
    #[serde(default)]
    scripts: Vec<Script>,
    #[serde(default)]
    components: Vec<Component>,
    #[serde(default)]
    test_cases: Vec<TestCase>,
}

pub struct DefinitionLoader;

impl DefinitionLoader {
    /// Load every `*.yaml` / `*.yml` file of a directory (non-recursive)
    pub fn load_directory(dir: &Path) -> Result<DefinitionSet, LoadError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if path.is_file() && matches!(ext, Some("yaml") | Some("yml")) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut set = DefinitionSet::new();
        for path in paths {
            let file = read_file(&path)?;
            merge_into(&mut set, file, &path.display().to_string())?;
        }
        Ok(set)
    }

    pub fn load_file(path: &Path) -> Result<DefinitionSet, LoadError> {
        let file = read_file(path)?;
        let mut set = DefinitionSet::new();
        merge_into(&mut set, file, &path.display().to_string())?;
        Ok(set)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<DefinitionSet, LoadError> {
        let file: DefinitionFile = serde_yaml::from_str(yaml).map_err(|e| LoadError::Yaml {
            file: "<string>".to_string(),
            error: e,
        })?;
        let mut set = DefinitionSet::new();
        merge_into(&mut set, file, "<string>")?;
        Ok(set)
    }
}

fn read_file(path: &Path) -> Result<DefinitionFile, LoadError> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(DefinitionFile::default());
    }
    serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
        file: path.display().to_string(),
        error: e,
    })
}

fn merge_into(set: &mut DefinitionSet, file: DefinitionFile, name: &str) -> Result<(), LoadError> {
    let duplicate = |error| LoadError::Duplicate {
        file: name.to_string(),
        error,
    };
    for script in file.scripts {
        set.insert_script(script).map_err(duplicate)?;
    }
    for component in file.components {
        set.insert_component(component).map_err(duplicate)?;
    }
    for test_case in file.test_cases {
        set.insert_test_case(test_case).map_err(duplicate)?;
    }
    Ok(())
}
