//! Core domain types for fnrun.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod debug;
mod env;
mod error;
mod function;
mod ids;
mod runtime;

pub use debug::DebugContext;
pub use env::{
    EVENT_VAR, EnvironmentVariables, FUNCTION_NAME_VAR, HANDLER_VAR, INSTALL_VAR, MEMORY_VAR,
    TIMEOUT_VAR,
};
pub use error::ConfigError;
pub use function::{DEFAULT_MEMORY_MB, DEFAULT_TIMEOUT_SECS, FunctionConfig, InvocationRequest};
pub use ids::InvocationId;
pub use runtime::{CodeLayout, Runtime, RuntimeSpec};
