//! Launcher command resolution.

use fnrun_types::{ConfigError, DebugContext, Runtime};

use crate::config::{DEFAULT_ENTRY_ROOT, DEFAULT_LAUNCHER, NativeConfig};

/// Mode argument passed to entry scripts when no debugger is attached.
pub const NORMAL_MODE: &str = "normal";

/// Exact argv for launching a runtime's entry script. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    program: String,
    args: Vec<String>,
}

impl LaunchCommand {
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Maps a runtime to `<launcher> <entry_root>/<runtime>/entry.sh <mode...>`.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    launcher: String,
    entry_root: String,
}

impl Default for EntryPoint {
    fn default() -> Self {
        Self::new(DEFAULT_LAUNCHER, DEFAULT_ENTRY_ROOT)
    }
}

impl EntryPoint {
    #[must_use]
    pub fn new(launcher: impl Into<String>, entry_root: impl Into<String>) -> Self {
        Self {
            launcher: launcher.into(),
            entry_root: entry_root.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &NativeConfig) -> Self {
        Self::new(
            config.launcher.as_deref().unwrap_or(DEFAULT_LAUNCHER),
            config.entry_root.as_deref().unwrap_or(DEFAULT_ENTRY_ROOT),
        )
    }

    #[must_use]
    pub fn script_path(&self, runtime: Runtime) -> String {
        format!(
            "{}/{}/entry.sh",
            self.entry_root.trim_end_matches('/'),
            runtime.as_str()
        )
    }

    /// Build the command for `runtime`.
    ///
    /// Without a debugger the script gets the `normal` mode literal. With one, the
    /// runtime must be debuggable and the script gets the port followed by the extra
    /// debug arguments.
    pub fn resolve(
        &self,
        runtime: Runtime,
        debug: Option<&DebugContext>,
    ) -> Result<LaunchCommand, ConfigError> {
        let mut args = vec![self.script_path(runtime)];
        match debug {
            None => args.push(NORMAL_MODE.to_string()),
            Some(debug) => {
                runtime.ensure_debuggable()?;
                args.push(debug.port.to_string());
                args.extend(debug.arg_tokens().map(str::to_string));
            }
        }
        Ok(LaunchCommand {
            program: self.launcher.clone(),
            args,
        })
    }
}
