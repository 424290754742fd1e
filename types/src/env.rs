//! Environment variables handed to a function's execution primitive.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const FUNCTION_NAME_VAR: &str = "_FUNC_NAME";
pub const EVENT_VAR: &str = "_FUNC_EVENT";
pub const TIMEOUT_VAR: &str = "_TIMEOUT";
pub const HANDLER_VAR: &str = "_HANDLER";
pub const MEMORY_VAR: &str = "_MEMORY_SIZE";
pub const INSTALL_VAR: &str = "_INSTALL";

const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/opt/bin";
const DEFAULT_LANG: &str = "en_US.UTF-8";

/// A function's declared environment plus the sources that may override it.
///
/// Precedence for a declared variable: explicit override, then the host shell
/// environment, then the declared value. Variables that are not declared are never
/// picked up from the shell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariables {
    #[serde(default)]
    declared: BTreeMap<String, String>,
    #[serde(skip)]
    shell: BTreeMap<String, String>,
    #[serde(skip)]
    overrides: BTreeMap<String, String>,
    #[serde(skip)]
    install: bool,
}

impl EnvironmentVariables {
    #[must_use]
    pub fn new(declared: BTreeMap<String, String>) -> Self {
        Self {
            declared,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_shell_env(mut self, shell: impl IntoIterator<Item = (String, String)>) -> Self {
        self.shell = shell.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Mark the environment as a dependency-install pass.
    pub fn add_install_flag(&mut self) {
        self.install = true;
    }

    #[must_use]
    pub fn declared(&self) -> &BTreeMap<String, String> {
        &self.declared
    }

    /// Flatten into the final variable map.
    ///
    /// `reserved` values (handler, memory, timeout) always win over declared ones.
    #[must_use]
    pub fn resolve<'a>(
        &self,
        reserved: impl IntoIterator<Item = (&'a str, String)>,
    ) -> BTreeMap<String, String> {
        let mut resolved = BTreeMap::new();
        resolved.insert("PATH".to_string(), DEFAULT_PATH.to_string());
        resolved.insert("LANG".to_string(), DEFAULT_LANG.to_string());

        for (key, declared) in &self.declared {
            let value = self
                .overrides
                .get(key)
                .or_else(|| self.shell.get(key))
                .unwrap_or(declared);
            resolved.insert(key.clone(), value.clone());
        }

        for (key, value) in reserved {
            resolved.insert(key.to_string(), value);
        }

        if self.install {
            resolved.insert(INSTALL_VAR.to_string(), "true".to_string());
        }

        resolved
    }
}
