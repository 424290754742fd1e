//! Locating and loading fnrun configuration.
//!
//! Three inputs feed an invocation: the user config (`~/.fnrun/config.toml`), the
//! project manifest (`fnrun.toml`) and an optional JSON file of per-function
//! environment overrides.

mod env_overrides;
mod manifest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fnrun_runtime::config::{
    ContainerConfig, ExecutionMode, InvokeConfig, NativeConfig, StagingConfig,
};
use fnrun_runtime::{
    ContainerExecutor, DockerCli, EntryPoint, Executor, InterruptController, LocalRuntime,
    NativeExecutor,
};
use fnrun_types::ConfigError;
use serde::Deserialize;

pub use env_overrides::EnvOverrides;
pub use manifest::{FunctionEntry, MANIFEST_FILE, Manifest};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}: {source}", path.display())]
    Function {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error("function '{name}' is declared more than once in {}", path.display())]
    DuplicateFunction { name: String, path: PathBuf },
    #[error("function '{name}' not found in {}", path.display())]
    UnknownFunction { name: String, path: PathBuf },
}

impl LoadError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. }
            | Self::Parse { path, .. }
            | Self::Json { path, .. }
            | Self::Function { path, .. }
            | Self::DuplicateFunction { path, .. }
            | Self::UnknownFunction { path, .. } => path,
        }
    }
}

/// `~/.fnrun/config.toml`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct FnrunConfig {
    pub invoke: Option<InvokeConfig>,
    pub native: Option<NativeConfig>,
    pub container: Option<ContainerConfig>,
}

impl FnrunConfig {
    /// Load the user config, or `Ok(None)` when there is none.
    pub fn load() -> Result<Option<Self>, LoadError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, LoadError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(LoadError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(LoadError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.invoke.as_ref().map(|invoke| invoke.mode).unwrap_or_default()
    }

    /// Staging root with `${VAR}` references expanded.
    #[must_use]
    pub fn staging(&self) -> StagingConfig {
        self.invoke
            .as_ref()
            .and_then(|invoke| invoke.staging_dir.as_deref())
            .map(|dir| StagingConfig::at(expand_env_vars(dir)))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn entry_point(&self) -> EntryPoint {
        let native = self.native.clone().unwrap_or_default();
        EntryPoint::from_config(&NativeConfig {
            launcher: native.launcher.as_deref().map(expand_env_vars),
            entry_root: native.entry_root.as_deref().map(expand_env_vars),
        })
    }

    #[must_use]
    pub fn container(&self) -> ContainerConfig {
        let container = self.container.clone().unwrap_or_default();
        ContainerConfig {
            docker: container.docker.as_deref().map(expand_env_vars),
            ..container
        }
    }

    /// Build the runtime for the configured execution mode.
    #[must_use]
    pub fn local_runtime(&self, interrupts: InterruptController) -> LocalRuntime {
        let executor: Arc<dyn Executor> = match self.mode() {
            ExecutionMode::Container => {
                let container = self.container();
                Arc::new(ContainerExecutor::new(
                    Arc::new(DockerCli::from_config(&container)),
                    &container,
                    self.entry_point(),
                    interrupts,
                ))
            }
            ExecutionMode::Native => Arc::new(NativeExecutor::new(self.entry_point(), interrupts)),
        };
        tracing::debug!(executor = executor.name(), "Selected execution mode");
        LocalRuntime::new(executor, self.staging())
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".fnrun").join("config.toml"))
}

/// Replace `${VAR}` with the variable's value (empty when unset). Unclosed references
/// are kept verbatim.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&std::env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use fnrun_runtime::InterruptController;
    use fnrun_runtime::config::ExecutionMode;

    use super::{FnrunConfig, LoadError, expand_env_vars};

    #[test]
    fn expand_env_vars_no_vars() {
        assert_eq!(expand_env_vars("/tmp/fnrun"), "/tmp/fnrun");
    }

    #[test]
    fn expand_env_vars_replaces_and_blanks() {
        unsafe {
            std::env::set_var("FNRUN_TEST_STAGING", "/scratch");
            std::env::remove_var("FNRUN_TEST_MISSING");
        }
        assert_eq!(
            expand_env_vars("${FNRUN_TEST_STAGING}/events${FNRUN_TEST_MISSING}"),
            "/scratch/events"
        );
        unsafe {
            std::env::remove_var("FNRUN_TEST_STAGING");
        }
    }

    #[test]
    fn expand_env_vars_keeps_malformed_references() {
        assert_eq!(expand_env_vars("a ${} b"), "a  b");
        assert_eq!(expand_env_vars("test ${UNCLOSED"), "test ${UNCLOSED");
    }

    #[test]
    fn parse_empty_config() {
        let config: FnrunConfig = toml::from_str("").unwrap();
        assert_eq!(config.mode(), ExecutionMode::Container);
        assert_eq!(config.staging().root, None);
        assert_eq!(config.container().docker_binary(), "docker");
    }

    #[test]
    fn parse_full_config() {
        let config: FnrunConfig = toml::from_str(
            r#"
[invoke]
mode = "native"
staging_dir = "/var/tmp/fnrun"

[native]
launcher = "/bin/sh"
entry_root = "/opt/fnrun"

[container]
docker = "podman"
image_repository = "registry.local/fnrun"
network = "host"
"#,
        )
        .unwrap();

        assert_eq!(config.mode(), ExecutionMode::Native);
        assert_eq!(
            config.staging().root,
            Some(PathBuf::from("/var/tmp/fnrun"))
        );
        let command = config
            .entry_point()
            .resolve(fnrun_types::Runtime::Python27, None)
            .unwrap();
        assert_eq!(
            command.argv(),
            vec!["/bin/sh", "/opt/fnrun/python2.7/entry.sh", "normal"]
        );
        let container = config.container();
        assert_eq!(container.docker_binary(), "podman");
        assert_eq!(
            container.image_for(fnrun_types::Runtime::Go1x),
            "registry.local/fnrun:go1.x"
        );
        assert_eq!(container.network.as_deref(), Some("host"));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let result: Result<FnrunConfig, _> = toml::from_str("[invoke]\nmode = \"vm\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn load_from_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[invoke\n").unwrap();

        let err = FnrunConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
        assert_eq!(err.path(), path);
    }

    #[test]
    fn local_runtime_follows_mode() {
        let native: FnrunConfig = toml::from_str("[invoke]\nmode = \"native\"\n").unwrap();
        let runtime = native.local_runtime(InterruptController::default());
        assert!(format!("{runtime:?}").contains("native"));

        let container = FnrunConfig::default().local_runtime(InterruptController::default());
        assert!(format!("{container:?}").contains("container"));
    }

    #[test]
    fn config_path_is_under_home() {
        if let Some(path) = super::config_path() {
            assert!(path.ends_with(".fnrun/config.toml"));
        }
    }
}
