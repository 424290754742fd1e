//! Supported function runtimes and their static properties.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Supported language runtimes.
///
/// The set is closed: identifiers outside it fail with
/// [`ConfigError::UnsupportedRuntime`] before anything is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Runtime {
    Nodejs10,
    Nodejs12,
    Python27,
    Python36,
    Java8,
    Go1x,
    Php72,
    DotnetCore22,
    Lua53,
}

/// Where a runtime expects its code to live relative to the configured code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeLayout {
    /// Mount the code path as-is.
    Source,
    /// Like `Source`, but dependency installation runs at project scope
    /// (the directory holding the manifest) instead of the code path.
    ProjectInstall,
    /// Compiled output lives in `bin/Release/<framework>/publish/` under the code path.
    Publish { framework: &'static str },
}

/// Static description of one runtime.
#[derive(Debug)]
pub struct RuntimeSpec {
    pub id: &'static str,
    /// Whether the runtime's entry script accepts a debug port.
    pub debuggable: bool,
    pub layout: CodeLayout,
}

// Indexed by `Runtime as usize`; keep in declaration order.
const RUNTIMES: [RuntimeSpec; 9] = [
    RuntimeSpec {
        id: "nodejs10",
        debuggable: true,
        layout: CodeLayout::Source,
    },
    RuntimeSpec {
        id: "nodejs12",
        debuggable: true,
        layout: CodeLayout::Source,
    },
    RuntimeSpec {
        id: "python2.7",
        debuggable: true,
        layout: CodeLayout::Source,
    },
    RuntimeSpec {
        id: "python3.6",
        debuggable: true,
        layout: CodeLayout::Source,
    },
    RuntimeSpec {
        id: "java8",
        debuggable: true,
        layout: CodeLayout::ProjectInstall,
    },
    RuntimeSpec {
        id: "go1.x",
        debuggable: false,
        layout: CodeLayout::Source,
    },
    RuntimeSpec {
        id: "php7.2",
        debuggable: false,
        layout: CodeLayout::Source,
    },
    RuntimeSpec {
        id: "dotnetcore2.2",
        debuggable: false,
        layout: CodeLayout::Publish {
            framework: "netcoreapp2.2",
        },
    },
    RuntimeSpec {
        id: "lua5.3",
        debuggable: false,
        layout: CodeLayout::Source,
    },
];

impl Runtime {
    pub const ALL: [Runtime; 9] = [
        Runtime::Nodejs10,
        Runtime::Nodejs12,
        Runtime::Python27,
        Runtime::Python36,
        Runtime::Java8,
        Runtime::Go1x,
        Runtime::Php72,
        Runtime::DotnetCore22,
        Runtime::Lua53,
    ];

    #[must_use]
    pub fn spec(self) -> &'static RuntimeSpec {
        &RUNTIMES[self as usize]
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.spec().id
    }

    #[must_use]
    pub fn supports_debugging(self) -> bool {
        self.spec().debuggable
    }

    #[must_use]
    pub fn layout(self) -> CodeLayout {
        self.spec().layout
    }

    /// Fail with a configuration error unless this runtime can be debugged.
    pub fn ensure_debuggable(self) -> Result<(), ConfigError> {
        if self.supports_debugging() {
            Ok(())
        } else {
            Err(ConfigError::DebugUnsupported {
                runtime: self.as_str().to_string(),
            })
        }
    }
}

impl FromStr for Runtime {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Runtime::ALL
            .into_iter()
            .find(|runtime| runtime.as_str() == trimmed)
            .ok_or_else(|| ConfigError::UnsupportedRuntime {
                runtime: trimmed.to_string(),
            })
    }
}

impl TryFrom<String> for Runtime {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Runtime> for String {
    fn from(value: Runtime) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
