//! Configuration types used by the invocation runtime.
//!
//! These are plain deserializable settings; `fnrun-config` owns locating and
//! loading the file so the runtime has no filesystem opinions of its own.

use std::path::PathBuf;

use fnrun_types::Runtime;
use serde::Deserialize;

pub const DEFAULT_LAUNCHER: &str = "/bin/bash";
pub const DEFAULT_ENTRY_ROOT: &str = "/var/fnrun";
pub const DEFAULT_DOCKER: &str = "docker";
pub const DEFAULT_IMAGE_REPOSITORY: &str = "fnrun/runtime";
pub const DEFAULT_CODE_MOUNT: &str = "/var/task";
pub const DEFAULT_EVENT_MOUNT: &str = "/var/fnrun/event";

/// How function code is executed.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One container per invocation.
    #[default]
    Container,
    /// The launcher runs as a local subprocess (we are already inside a runtime image).
    Native,
}

/// ```toml
/// [invoke]
/// mode = "native"
/// staging_dir = "/tmp"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvokeConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Where staged events and archive copies are created.
    pub staging_dir: Option<String>,
}

/// ```toml
/// [native]
/// launcher = "/bin/bash"
/// entry_root = "/var/fnrun"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NativeConfig {
    pub launcher: Option<String>,
    /// Directory holding `<runtime>/entry.sh` launcher scripts.
    pub entry_root: Option<String>,
}

/// ```toml
/// [container]
/// docker = "podman"
/// image_repository = "registry.local/fnrun"
/// network = "host"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfig {
    pub docker: Option<String>,
    pub image_repository: Option<String>,
    pub code_mount: Option<String>,
    pub event_mount: Option<String>,
    pub network: Option<String>,
}

impl ContainerConfig {
    #[must_use]
    pub fn docker_binary(&self) -> &str {
        self.docker.as_deref().unwrap_or(DEFAULT_DOCKER)
    }

    /// Image reference for `runtime`, tagged with the runtime identifier.
    #[must_use]
    pub fn image_for(&self, runtime: Runtime) -> String {
        let repository = self
            .image_repository
            .as_deref()
            .unwrap_or(DEFAULT_IMAGE_REPOSITORY);
        format!("{repository}:{runtime}")
    }

    #[must_use]
    pub fn code_mount(&self) -> &str {
        self.code_mount.as_deref().unwrap_or(DEFAULT_CODE_MOUNT)
    }

    #[must_use]
    pub fn event_mount(&self) -> &str {
        self.event_mount.as_deref().unwrap_or(DEFAULT_EVENT_MOUNT)
    }
}

/// Root directory for transient invocation files.
#[derive(Debug, Clone, Default)]
pub struct StagingConfig {
    pub root: Option<PathBuf>,
}

impl StagingConfig {
    #[must_use]
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Configured root, else `/tmp` on unix (shared with the container engine by
    /// default), else the OS temp dir.
    #[must_use]
    pub fn root(&self) -> PathBuf {
        if let Some(root) = &self.root {
            return root.clone();
        }
        if cfg!(windows) {
            std::env::temp_dir()
        } else {
            PathBuf::from("/tmp")
        }
    }
}
