use std::path::PathBuf;

use thiserror::Error;

/// Configuration problems detected before any execution primitive is created.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported runtime `{runtime}`")]
    UnsupportedRuntime { runtime: String },
    #[error("debugging is not supported for runtime `{runtime}`")]
    DebugUnsupported { runtime: String },
    #[error("code artifact not found: {}", path.display())]
    MissingCode { path: PathBuf },
    #[error("invalid function `{function}`: {message}")]
    InvalidFunction { function: String, message: String },
}
