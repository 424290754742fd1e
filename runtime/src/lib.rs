//! Local invocation runtime: runs one function against one event, locally.
//!
//! ```text
//! LocalRuntime::invoke
//!   stage event -> resolve code dir -> Executor::execute -> cleanup
//!                                        |
//!                    ContainerExecutor ---+--- NativeExecutor
//!                    (ContainerManager)        (ChildGuard)
//! ```
//!
//! Function failures (crashes, non-zero exits, timeouts, interrupts) are reported as
//! [`InvocationOutcome`] values and log lines. Only configuration, staging and launch
//! problems surface as [`InvokeError`].

pub mod code_dir;
pub mod config;
pub mod container;
pub mod entry_point;
pub mod event;
pub mod interrupt;
mod invoke;
pub mod native;
pub mod process;

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use fnrun_types::{ConfigError, DebugContext, FunctionConfig, InvocationId};
use tokio::io::AsyncWrite;

use container::ContainerError;
use event::StagedEvent;
use interrupt::{Cancellation, Interruption, SignalSet};

pub use code_dir::CodeDir;
pub use container::{ContainerExecutor, ContainerManager, DockerCli};
pub use entry_point::{EntryPoint, LaunchCommand};
pub use interrupt::{InterruptController, OsSignals};
pub use invoke::LocalRuntime;
pub use native::NativeExecutor;

/// Destinations for a function's stdout and stderr.
pub struct Output<'a> {
    pub stdout: &'a mut (dyn AsyncWrite + Send + Unpin),
    pub stderr: &'a mut (dyn AsyncWrite + Send + Unpin),
}

impl<'a> Output<'a> {
    pub fn new(
        stdout: &'a mut (dyn AsyncWrite + Send + Unpin),
        stderr: &'a mut (dyn AsyncWrite + Send + Unpin),
    ) -> Self {
        Self { stdout, stderr }
    }
}

impl std::fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output").finish_non_exhaustive()
    }
}

/// How an invocation ended, when it did not fail before starting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The function ran to completion (successfully or not).
    Completed { exit_code: Option<i32> },
    /// The timeout fired and the execution primitive was stopped.
    TimedOut,
    /// An operator interrupt stopped the execution primitive.
    Interrupted,
}

impl InvocationOutcome {
    /// Settle an invocation once its primitive is gone.
    ///
    /// `exited` carries the exit code when the function ended before any stop was issued;
    /// such an exit wins over a timer or signal that fired concurrently.
    fn settle(exited: Option<Option<i32>>, interruption: Option<Interruption>) -> Self {
        match (exited, interruption) {
            (Some(exit_code), _) => Self::Completed { exit_code },
            (None, Some(Interruption::TimedOut)) => Self::TimedOut,
            (None, Some(Interruption::Signalled) | None) => Self::Interrupted,
        }
    }
}

/// Failures that abort an invocation before (or instead of) running the function.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to stage event: {0}")]
    Stage(#[source] io::Error),
    #[error("failed to prepare code directory {}: {source}", path.display())]
    CodeDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to start container: {0}")]
    Start(#[source] ContainerError),
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Everything an executor needs for one invocation.
///
/// The staged event is moved in so the executor can delete it at the right point of
/// its own teardown; the code directory stays owned by [`LocalRuntime`].
#[derive(Debug)]
pub struct Invocation<'a> {
    pub id: InvocationId,
    pub function: &'a FunctionConfig,
    pub env: BTreeMap<String, String>,
    pub event: StagedEvent,
    pub code_dir: &'a Path,
    pub debug: Option<&'a DebugContext>,
    pub installing: bool,
}

impl Invocation<'_> {
    #[must_use]
    pub fn cancellation(&self, signals: SignalSet) -> Cancellation {
        Cancellation::select(
            self.function.timeout(),
            self.debug.is_some(),
            self.installing,
            signals,
        )
    }
}

/// Executor future type alias.
pub type ExecFut<'a> =
    Pin<Box<dyn Future<Output = Result<InvocationOutcome, InvokeError>> + Send + 'a>>;

/// An execution strategy: starts the function, waits for it, and tears it down.
pub trait Executor: Send + Sync {
    fn name(&self) -> &'static str;

    fn execute<'a>(&'a self, invocation: Invocation<'a>, output: &'a mut Output<'_>)
    -> ExecFut<'a>;
}
