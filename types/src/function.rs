use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::{
    ConfigError, DebugContext, EnvironmentVariables, HANDLER_VAR, MEMORY_VAR, Runtime, TIMEOUT_VAR,
};

pub const DEFAULT_MEMORY_MB: u32 = 128;
pub const DEFAULT_TIMEOUT_SECS: u64 = 3;

/// Identity and runtime parameters of a function to invoke locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionConfig {
    pub name: String,
    pub runtime: Runtime,
    pub handler: String,
    pub memory_mb: u32,
    pub timeout_secs: u64,
    pub env_vars: EnvironmentVariables,
    /// Absolute path to the code directory or archive.
    pub code_path: PathBuf,
}

impl FunctionConfig {
    pub fn new(
        name: impl Into<String>,
        runtime: Runtime,
        handler: impl Into<String>,
        code_path: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let handler = handler.into();
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidFunction {
                function: name,
                message: "name must not be empty".to_string(),
            });
        }
        if handler.trim().is_empty() {
            return Err(ConfigError::InvalidFunction {
                function: name,
                message: "handler must not be empty".to_string(),
            });
        }
        Ok(Self {
            name,
            runtime,
            handler,
            memory_mb: DEFAULT_MEMORY_MB,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            env_vars: EnvironmentVariables::default(),
            code_path: code_path.into(),
        })
    }

    #[must_use]
    pub fn with_memory_mb(mut self, memory_mb: u32) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    #[must_use]
    pub fn with_env_vars(mut self, env_vars: EnvironmentVariables) -> Self {
        self.env_vars = env_vars;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolved environment for one invocation, with the install flag when `installing`.
    #[must_use]
    pub fn environment(&self, installing: bool) -> BTreeMap<String, String> {
        let mut vars = self.env_vars.clone();
        if installing {
            vars.add_install_flag();
        }
        vars.resolve([
            (HANDLER_VAR, self.handler.clone()),
            (MEMORY_VAR, self.memory_mb.to_string()),
            (TIMEOUT_VAR, self.timeout_secs.to_string()),
        ])
    }
}

/// Transient inputs of a single invocation.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub event: String,
    pub debug: Option<DebugContext>,
    /// Directory holding the project manifest.
    pub cwd: PathBuf,
    /// Dependency-bootstrap pass rather than a real invocation.
    pub installing: bool,
}

impl InvocationRequest {
    #[must_use]
    pub fn new(event: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            event: event.into(),
            debug: None,
            cwd: cwd.into(),
            installing: false,
        }
    }

    #[must_use]
    pub fn with_debug(mut self, debug: DebugContext) -> Self {
        self.debug = Some(debug);
        self
    }

    #[must_use]
    pub fn installing(mut self) -> Self {
        self.installing = true;
        self
    }

    #[must_use]
    pub fn is_debugging(&self) -> bool {
        self.debug.is_some()
    }
}
