//! Native execution: the runtime's launcher script runs as a local subprocess.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fnrun_types::EVENT_VAR;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Notify;

use crate::entry_point::EntryPoint;
use crate::interrupt::{InterruptController, SignalSet, Stop, StopFut};
use crate::process::ChildGuard;
use crate::{ExecFut, Executor, Invocation, InvocationOutcome, InvokeError, Output};

/// How long to wait for pipes to close after the process tree was killed.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Output collected so far; shared so a reader stuck on an inherited pipe cannot take
/// the bytes it already read down with it.
type Captured = Arc<Mutex<Vec<u8>>>;

/// Runs functions through `<launcher> <entry_root>/<runtime>/entry.sh`.
#[derive(Debug, Clone, Default)]
pub struct NativeExecutor {
    entry_point: EntryPoint,
    interrupts: InterruptController,
}

impl NativeExecutor {
    #[must_use]
    pub fn new(entry_point: EntryPoint, interrupts: InterruptController) -> Self {
        Self {
            entry_point,
            interrupts,
        }
    }
}

/// Stop request for a child process, observed by the waiting task.
#[derive(Debug, Default)]
struct ProcessStop {
    requested: AtomicBool,
    notify: Notify,
}

impl ProcessStop {
    async fn requested(&self) {
        self.notify.notified().await;
    }
}

impl Stop for ProcessStop {
    fn stop(&self) -> StopFut<'_> {
        Box::pin(async move {
            if !self.requested.swap(true, Ordering::AcqRel) {
                self.notify.notify_one();
            }
        })
    }
}

enum Exit {
    Status(io::Result<ExitStatus>),
    StopRequested,
    LocalInterrupt,
}

impl Executor for NativeExecutor {
    fn name(&self) -> &'static str {
        "native"
    }

    fn execute<'a>(
        &'a self,
        invocation: Invocation<'a>,
        output: &'a mut Output<'_>,
    ) -> ExecFut<'a> {
        Box::pin(async move {
            let cancellation = invocation.cancellation(SignalSet::INTERRUPT);
            let Invocation {
                function,
                mut env,
                event,
                code_dir,
                debug,
                ..
            } = invocation;

            let command = self.entry_point.resolve(function.runtime, debug)?;
            env.insert(EVENT_VAR.to_string(), event.path().display().to_string());

            let mut process = Command::new(command.program());
            process
                .args(command.args())
                .env_clear()
                .envs(&env)
                .current_dir(code_dir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            #[cfg(unix)]
            crate::process::set_new_session(&mut process);

            tracing::debug!(argv = ?command.argv(), "Launching function");
            let child = process.spawn().map_err(|source| InvokeError::Spawn {
                program: command.program().to_string(),
                source,
            })?;
            let mut guard = ChildGuard::new(child);

            let (stdout, stderr) = match guard.child_mut() {
                Some(child) => (child.stdout.take(), child.stderr.take()),
                None => (None, None),
            };
            let stdout_buf = Captured::default();
            let stderr_buf = Captured::default();
            let stdout_task = tokio::spawn(collect(stdout, Arc::clone(&stdout_buf)));
            let stderr_task = tokio::spawn(collect(stderr, Arc::clone(&stderr_buf)));

            let stop = Arc::new(ProcessStop::default());
            let interrupt = self.interrupts.arm(&function.name, cancellation, stop.clone());

            let exit = match guard.child_mut() {
                Some(child) => tokio::select! {
                    status = child.wait() => Exit::Status(status),
                    () = stop.requested() => Exit::StopRequested,
                    () = self.interrupts.signals().recv(SignalSet::INTERRUPT) => Exit::LocalInterrupt,
                },
                None => Exit::StopRequested,
            };

            let exited = match exit {
                Exit::Status(status) => {
                    // Anything the launcher left running in its group goes with it.
                    guard.kill();
                    Some(exit_code(status))
                }
                Exit::StopRequested => reap(&mut guard).await,
                Exit::LocalInterrupt => {
                    tracing::debug!("Ctrl+C was pressed. Aborting function execution");
                    reap(&mut guard).await
                }
            };
            guard.disarm();
            let interruption = interrupt.disarm();

            let stdout = drain(stdout_task, &stdout_buf).await;
            let stderr = drain(stderr_task, &stderr_buf).await;
            write_captured(&mut *output.stdout, &stdout).await;
            write_captured(&mut *output.stderr, &stderr).await;

            event.remove();

            Ok(InvocationOutcome::settle(exited, interruption))
        })
    }
}

fn exit_code(status: io::Result<ExitStatus>) -> Option<i32> {
    match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!("Failed to wait for function process: {e}");
            None
        }
    }
}

/// Kill the process tree and wait for it; `None` marks a stopped run.
async fn reap(guard: &mut ChildGuard) -> Option<Option<i32>> {
    guard.kill();
    if let Some(child) = guard.child_mut()
        && let Err(e) = child.wait().await
    {
        tracing::warn!("Failed to reap killed function process: {e}");
    }
    None
}

async fn collect<R: AsyncRead + Unpin>(reader: Option<R>, buf: Captured) {
    let Some(mut reader) = reader else {
        return;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => return,
            Ok(n) => buf
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(&chunk[..n]),
            Err(e) => {
                tracing::debug!("Function output stream ended with error: {e}");
                return;
            }
        }
    }
}

/// Wait for a reader to hit EOF, then hand back everything it collected.
async fn drain(mut task: tokio::task::JoinHandle<()>, buf: &Captured) -> Vec<u8> {
    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Output reader failed: {e}"),
        Err(_) => {
            tracing::warn!("Output pipe still open after the function exited; keeping what was read");
            task.abort();
        }
    }
    std::mem::take(&mut *buf.lock().unwrap_or_else(PoisonError::into_inner))
}

async fn write_captured(sink: &mut (dyn AsyncWrite + Send + Unpin), bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let result = async {
        sink.write_all(bytes).await?;
        sink.flush().await
    }
    .await;
    if let Err(e) = result {
        tracing::warn!("Failed to write function output: {e}");
    }
}
