//! Containerized execution: one container per invocation.
//!
//! The engine itself is an external collaborator behind [`ContainerManager`]. The
//! executor only builds a [`ContainerDescriptor`], starts it, follows its logs and makes
//! sure it is stopped exactly once, even if the invoking future is dropped.

mod docker;

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fnrun_types::{EVENT_VAR, Runtime};

use crate::config::ContainerConfig;
use crate::entry_point::{EntryPoint, LaunchCommand};
use crate::event::EVENT_FILE_NAME;
use crate::interrupt::{InterruptController, SignalSet, Stop, StopFut};
use crate::{ExecFut, Executor, Invocation, InvocationOutcome, InvokeError, Output};

pub use docker::{DockerCli, create_args};

/// Container manager future type alias.
pub type ContainerFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, ContainerError>> + Send + 'a>>;

/// Container lifecycle primitives.
pub trait ContainerManager: Send + Sync + 'static {
    /// Create and start a container. Resolves once it is running, not once it exits.
    fn start<'a>(
        &'a self,
        descriptor: &'a ContainerDescriptor,
        install_mode: bool,
    ) -> ContainerFut<'a, ContainerHandle>;

    /// Stop and remove a container. Must succeed for an already-stopped container.
    fn stop<'a>(&'a self, handle: &'a ContainerHandle) -> ContainerFut<'a, ()>;

    /// Copy the container's stdout and stderr into `output` until it terminates, then
    /// report its exit code when one is known.
    fn stream_logs<'a>(
        &'a self,
        handle: &'a ContainerHandle,
        output: &'a mut Output<'_>,
    ) -> ContainerFut<'a, Option<i32>>;
}

/// Everything needed to create the container for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    pub name: String,
    pub image: String,
    pub runtime: Runtime,
    pub handler: String,
    /// Host code directory, mounted at `code_mount`.
    pub code_dir: PathBuf,
    pub code_mount: String,
    /// Host directory holding the staged event, mounted at `event_mount`.
    pub event_dir: PathBuf,
    pub event_mount: String,
    pub memory_mb: u32,
    pub env: BTreeMap<String, String>,
    pub network: Option<String>,
    /// Published on the same host port when a debugger is attached.
    pub debug_port: Option<u16>,
    /// Replaces the image entrypoint in debug mode.
    pub entrypoint: Option<LaunchCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` failed (exit status {status:?}): {stderr}")]
    Command {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("failed to stream container logs: {0}")]
    Logs(#[source] io::Error),
}

/// Idempotent stop target shared by the timer, the signal listener and the guard.
pub struct ContainerStop {
    manager: Arc<dyn ContainerManager>,
    handle: ContainerHandle,
    requested: AtomicBool,
    stopped: AtomicBool,
}

impl std::fmt::Debug for ContainerStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerStop")
            .field("handle", &self.handle)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl ContainerStop {
    #[must_use]
    pub fn new(manager: Arc<dyn ContainerManager>, handle: ContainerHandle) -> Self {
        Self {
            manager,
            handle,
            requested: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn handle(&self) -> &ContainerHandle {
        &self.handle
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Whether anyone has asked for the container to go away, successfully or not.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

impl Stop for ContainerStop {
    fn stop(&self) -> StopFut<'_> {
        Box::pin(async move {
            self.requested.store(true, Ordering::Release);
            if self.is_stopped() {
                return;
            }
            match self.manager.stop(&self.handle).await {
                Ok(()) => {
                    self.stopped.store(true, Ordering::Release);
                    tracing::debug!(container = %self.handle.name, "Container stopped");
                }
                Err(e) => {
                    tracing::warn!(container = %self.handle.name, "Failed to stop container: {e}");
                }
            }
        })
    }
}

/// Stops the container when dropped without an explicit [`ContainerGuard::stop`].
#[derive(Debug)]
pub struct ContainerGuard {
    target: Option<Arc<ContainerStop>>,
}

impl ContainerGuard {
    #[must_use]
    pub fn new(target: Arc<ContainerStop>) -> Self {
        Self {
            target: Some(target),
        }
    }

    pub async fn stop(mut self) {
        if let Some(target) = self.target.take() {
            target.stop().await;
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(target) = self.target.take() else {
            return;
        };
        if target.is_stopped() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { target.stop().await });
            }
            Err(_) => tracing::warn!(
                container = %target.handle.name,
                "Container left running: no async runtime available to stop it"
            ),
        }
    }
}

/// Runs each invocation in a fresh container.
pub struct ContainerExecutor {
    manager: Arc<dyn ContainerManager>,
    config: ContainerConfig,
    entry_point: EntryPoint,
    interrupts: InterruptController,
}

impl std::fmt::Debug for ContainerExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerExecutor")
            .field("config", &self.config)
            .field("entry_point", &self.entry_point)
            .finish_non_exhaustive()
    }
}

impl ContainerExecutor {
    #[must_use]
    pub fn new(
        manager: Arc<dyn ContainerManager>,
        config: &ContainerConfig,
        entry_point: EntryPoint,
        interrupts: InterruptController,
    ) -> Self {
        Self {
            manager,
            config: config.clone(),
            entry_point,
            interrupts,
        }
    }

    fn descriptor(&self, invocation: &Invocation<'_>) -> Result<ContainerDescriptor, InvokeError> {
        let function = invocation.function;
        let event_mount = self.config.event_mount().trim_end_matches('/').to_string();

        let mut env = invocation.env.clone();
        env.insert(
            EVENT_VAR.to_string(),
            format!("{event_mount}/{EVENT_FILE_NAME}"),
        );

        let (entrypoint, debug_port) = match invocation.debug {
            Some(debug) => (
                Some(self.entry_point.resolve(function.runtime, Some(debug))?),
                Some(debug.port),
            ),
            None => (None, None),
        };

        Ok(ContainerDescriptor {
            name: format!("fnrun-{}", invocation.id.short()),
            image: self.config.image_for(function.runtime),
            runtime: function.runtime,
            handler: function.handler.clone(),
            code_dir: invocation.code_dir.to_path_buf(),
            code_mount: self.config.code_mount().to_string(),
            event_dir: invocation.event.dir().to_path_buf(),
            event_mount,
            memory_mb: function.memory_mb,
            env,
            network: self.config.network.clone(),
            debug_port,
            entrypoint,
        })
    }
}

impl Executor for ContainerExecutor {
    fn name(&self) -> &'static str {
        "container"
    }

    fn execute<'a>(
        &'a self,
        invocation: Invocation<'a>,
        output: &'a mut Output<'_>,
    ) -> ExecFut<'a> {
        Box::pin(async move {
            let cancellation = invocation.cancellation(SignalSet::INTERRUPT_OR_TERMINATE);
            let descriptor = self.descriptor(&invocation)?;
            let Invocation {
                function,
                event,
                installing,
                ..
            } = invocation;

            tracing::debug!(image = %descriptor.image, name = %descriptor.name, "Starting container");
            let handle = self
                .manager
                .start(&descriptor, installing)
                .await
                .map_err(InvokeError::Start)?;
            tracing::info!(container = %handle.name, "Container started");

            let target = Arc::new(ContainerStop::new(Arc::clone(&self.manager), handle));
            let guard = ContainerGuard::new(Arc::clone(&target));
            let interrupt = self
                .interrupts
                .arm(&function.name, cancellation, target.clone());

            let logs = tokio::select! {
                result = self.manager.stream_logs(target.handle(), output) => Some(result),
                () = self.interrupts.signals().recv(SignalSet::INTERRUPT) => None,
            };

            // Read before cleanup stops the container itself.
            let stopped_early = target.stop_requested();
            let interruption = interrupt.disarm();
            event.remove();
            guard.stop().await;

            let exited = match logs {
                None => {
                    tracing::debug!("Ctrl+C was pressed. Aborting function execution");
                    None
                }
                Some(_) if stopped_early => None,
                Some(Ok(exit_code)) => Some(exit_code),
                Some(Err(e)) => {
                    tracing::warn!("{e}");
                    Some(None)
                }
            };
            Ok(InvocationOutcome::settle(exited, interruption))
        })
    }
}
