use std::collections::HashSet;
use std::fmt;

use crate::CoreError;

/// One upgrade between adjacent schema versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MigrationStep {
    pub from: String,
    pub to: String,
}

impl MigrationStep {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Name of the script that performs this step: `migrate_<from>_<to>`.
    pub fn script_name(&self) -> String {
        format!("migrate_{}_{}", self.from, self.to)
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Name of the script that creates the schema at `version`.
pub fn create_script_name(version: &str) -> String {
    format!("create_{version}")
}

/// Computes the chain of adjacent steps leading from `from` to `to`.
///
/// Returns an empty chain when either version is unknown or when `from` does
/// not come strictly before `to`.
pub fn resolve<S: AsRef<str>>(versions: &[S], from: &str, to: &str) -> Vec<MigrationStep> {
    let position = |v: &str| versions.iter().position(|known| known.as_ref() == v);
    let (Some(start), Some(end)) = (position(from), position(to)) else {
        return Vec::new();
    };
    if start >= end {
        return Vec::new();
    }
    versions[start..=end]
        .windows(2)
        .map(|pair| MigrationStep::new(pair[0].as_ref(), pair[1].as_ref()))
        .collect()
}

/// The ordered, duplicate-free list of schema versions an application knows.
/// The last entry is the version a prepared store ends up at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionHistory {
    versions: Vec<String>,
}

impl VersionHistory {
    pub fn new<I, S>(versions: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let versions: Vec<String> = versions.into_iter().map(Into::into).collect();
        if versions.is_empty() {
            return Err(CoreError::InvalidVersionHistory("no versions".into()));
        }
        let mut seen = HashSet::new();
        for version in &versions {
            if version.trim().is_empty() {
                return Err(CoreError::InvalidVersionHistory("blank version".into()));
            }
            if !seen.insert(version.as_str()) {
                return Err(CoreError::InvalidVersionHistory(format!(
                    "duplicate version {version}"
                )));
            }
        }
        Ok(Self { versions })
    }

    pub fn current(&self) -> &str {
        // Non-empty by construction.
        self.versions.last().map(String::as_str).unwrap_or_default()
    }

    pub fn contains(&self, version: &str) -> bool {
        self.position(version).is_some()
    }

    pub fn position(&self, version: &str) -> Option<usize> {
        self.versions.iter().position(|v| v == version)
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub fn steps(&self, from: &str, to: &str) -> Vec<MigrationStep> {
        resolve(&self.versions, from, to)
    }

    /// Steps from `from` up to the current version.
    pub fn steps_to_current(&self, from: &str) -> Vec<MigrationStep> {
        self.steps(from, self.current())
    }
}
