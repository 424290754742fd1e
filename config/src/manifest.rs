//! Project manifest (`fnrun.toml`).
//!
//! ```toml
//! [[function]]
//! name = "hello"
//! runtime = "python3.6"
//! handler = "app.handler"
//! code_uri = "src/hello"
//! memory = 256
//! timeout = 10
//!
//! [function.environment]
//! TABLE = "users"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use fnrun_types::{ConfigError, EnvironmentVariables, FunctionConfig, Runtime};
use serde::Deserialize;

use crate::LoadError;
use crate::env_overrides::EnvOverrides;

pub const MANIFEST_FILE: &str = "fnrun.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionEntry {
    pub name: String,
    pub runtime: String,
    pub handler: String,
    /// Code directory or archive, relative to the manifest.
    #[serde(default = "default_code_uri")]
    pub code_uri: String,
    /// Memory limit in megabytes.
    pub memory: Option<u32>,
    /// Timeout in seconds.
    pub timeout: Option<u64>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

fn default_code_uri() -> String {
    ".".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct ManifestFile {
    #[serde(default, rename = "function")]
    functions: Vec<FunctionEntry>,
}

/// Parsed manifest plus the directory its relative paths resolve against.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    base_dir: PathBuf,
    functions: Vec<FunctionEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse manifest text as if it had been read from `path`.
    pub fn parse(content: &str, path: &Path) -> Result<Self, LoadError> {
        let file: ManifestFile = toml::from_str(content).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut seen = HashSet::new();
        for entry in &file.functions {
            if !seen.insert(entry.name.as_str()) {
                return Err(LoadError::DuplicateFunction {
                    name: entry.name.clone(),
                    path: path.to_path_buf(),
                });
            }
        }

        let base_dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        tracing::debug!(
            manifest = %path.display(),
            functions = file.functions.len(),
            "Loaded manifest"
        );
        Ok(Self {
            path: path.to_path_buf(),
            base_dir,
            functions: file.functions,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn functions(&self) -> &[FunctionEntry] {
        &self.functions
    }

    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&FunctionEntry> {
        self.functions.iter().find(|entry| entry.name == name)
    }

    /// Resolve `name` into a runnable [`FunctionConfig`].
    ///
    /// Declared variables are overridden by `shell` values of the same name, and both by
    /// `overrides`. Variables not declared in the manifest are never injected.
    pub fn function(
        &self,
        name: &str,
        shell: impl IntoIterator<Item = (String, String)>,
        overrides: &EnvOverrides,
    ) -> Result<FunctionConfig, LoadError> {
        let entry = self.entry(name).ok_or_else(|| LoadError::UnknownFunction {
            name: name.to_string(),
            path: self.path.clone(),
        })?;
        self.build(entry, shell, overrides)
            .map_err(|source| LoadError::Function {
                path: self.path.clone(),
                source,
            })
    }

    fn build(
        &self,
        entry: &FunctionEntry,
        shell: impl IntoIterator<Item = (String, String)>,
        overrides: &EnvOverrides,
    ) -> Result<FunctionConfig, ConfigError> {
        let runtime: Runtime = entry.runtime.parse()?;
        let invalid = |message: &str| ConfigError::InvalidFunction {
            function: entry.name.clone(),
            message: message.to_string(),
        };
        if entry.memory == Some(0) {
            return Err(invalid("memory must be greater than zero"));
        }
        if entry.timeout == Some(0) {
            return Err(invalid("timeout must be greater than zero"));
        }

        let env_vars = EnvironmentVariables::new(entry.environment.clone())
            .with_shell_env(shell)
            .with_overrides(overrides.for_function(&entry.name));

        let mut function =
            FunctionConfig::new(&entry.name, runtime, &entry.handler, self.code_path(entry))?
                .with_env_vars(env_vars);
        if let Some(memory) = entry.memory {
            function = function.with_memory_mb(memory);
        }
        if let Some(timeout) = entry.timeout {
            function = function.with_timeout_secs(timeout);
        }
        Ok(function)
    }

    fn code_path(&self, entry: &FunctionEntry) -> PathBuf {
        let code_uri = Path::new(&entry.code_uri);
        let joined = if code_uri.is_absolute() {
            code_uri.to_path_buf()
        } else {
            self.base_dir.join(code_uri)
        };
        std::path::absolute(&joined).unwrap_or(joined)
    }
}
