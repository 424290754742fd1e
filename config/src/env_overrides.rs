use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::LoadError;

/// Per-function environment overrides, read from a JSON file shaped like
/// `{"hello": {"TABLE": "local_users"}}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct EnvOverrides(BTreeMap<String, BTreeMap<String, String>>);

impl EnvOverrides {
    #[must_use]
    pub fn from_map(map: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        Self(map)
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let overrides: Self = serde_json::from_str(&content).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(
            file = %path.display(),
            functions = overrides.0.len(),
            "Loaded environment overrides"
        );
        Ok(overrides)
    }

    #[must_use]
    pub fn for_function(&self, name: &str) -> BTreeMap<String, String> {
        self.0.get(name).cloned().unwrap_or_default()
    }
}
