//! Case manifests
//!
//! A manifest is a YAML document listing cases, either as a bare sequence or
//! under a top-level `cases:` key:
//!
//! ```yaml
//! cases:
//!   - id: build
//!     check: command
//!     argv: [cargo, build]
//!   - id: version-banner
//!     check: output_matches
//!     argv: [./app, --version]
//!     pattern: '^app \d+\.\d+'
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::runner::TaskDescriptor;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestDoc {
    Wrapped { cases: Vec<TaskDescriptor> },
    Bare(Vec<TaskDescriptor>),
}

/// Cases loaded from one manifest file
#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    pub cases: Vec<TaskDescriptor>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let doc: ManifestDoc =
            serde_yaml::from_str(text).map_err(|source| ConfigError::ManifestParse {
                path: path.to_path_buf(),
                source,
            })?;
        let cases = match doc {
            ManifestDoc::Wrapped { cases } | ManifestDoc::Bare(cases) => cases,
        };

        let mut seen = HashSet::new();
        for case in &cases {
            if case.id.trim().is_empty() {
                return Err(ConfigError::InvalidCase {
                    case_id: case.id.clone(),
                    reason: "id must not be empty".to_string(),
                });
            }
            if !seen.insert(case.id.as_str()) {
                return Err(ConfigError::DuplicateCase(case.id.clone()));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            cases,
        })
    }

    /// Directory relative case paths resolve against
    pub fn base_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Keep only cases whose id matches `filter`, preserving manifest order
    pub fn select(self, filter: Option<&str>) -> Result<Vec<TaskDescriptor>, ConfigError> {
        let cases = match filter {
            None => self.cases,
            Some(raw) => {
                let pattern = compile_filter(raw)?;
                self.cases
                    .into_iter()
                    .filter(|c| pattern.matches(&c.id))
                    .collect()
            }
        };
        if cases.is_empty() {
            return Err(ConfigError::NoCases);
        }
        Ok(cases)
    }
}

/// Compile a case-id glob; blank patterns are rejected
pub fn compile_filter(raw: &str) -> Result<Pattern, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyPattern);
    }
    Pattern::new(trimmed).map_err(|e| ConfigError::InvalidPattern {
        pattern: trimmed.to_string(),
        reason: e.msg.to_string(),
    })
}
