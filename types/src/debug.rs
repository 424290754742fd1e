use serde::{Deserialize, Serialize};

/// Parameters for attaching a debugger instead of a timeout-bounded run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugContext {
    pub port: u16,
    /// Extra launch arguments, whitespace delimited.
    #[serde(default)]
    pub args: String,
}

impl DebugContext {
    #[must_use]
    pub fn new(port: u16, args: impl Into<String>) -> Self {
        Self {
            port,
            args: args.into(),
        }
    }

    /// Extra arguments as argv tokens. An empty string yields no tokens.
    pub fn arg_tokens(&self) -> impl Iterator<Item = &str> {
        self.args.split_whitespace()
    }
}
