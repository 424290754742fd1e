//! Timeout and external-cancellation handling for an active invocation.
//!
//! Exactly one mechanism is armed per invocation: a one-shot timer for normal runs, or
//! a signal listener when a debugger is attached or dependencies are being installed.
//! Either one only ever touches the execution primitive through [`Stop`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

pub type StopFut<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
pub type SignalFut<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Terminates an execution primitive. Must be idempotent and callable from any task.
pub trait Stop: Send + Sync {
    fn stop(&self) -> StopFut<'_>;
}

/// Which process signals count as an external interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSet {
    /// Ctrl+C.
    pub interrupt: bool,
    /// SIGTERM (unix only).
    pub terminate: bool,
}

impl SignalSet {
    pub const INTERRUPT: Self = Self {
        interrupt: true,
        terminate: false,
    };
    pub const INTERRUPT_OR_TERMINATE: Self = Self {
        interrupt: true,
        terminate: true,
    };
}

/// Source of external interrupts.
pub trait SignalSource: Send + Sync + 'static {
    /// Resolves once any signal in `signals` is delivered.
    fn recv(&self, signals: SignalSet) -> SignalFut<'_>;
}

/// Process signals via `tokio::signal`.
///
/// Listening replaces the default disposition for the rest of the process lifetime.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSignals;

impl SignalSource for OsSignals {
    fn recv(&self, signals: SignalSet) -> SignalFut<'_> {
        Box::pin(async move {
            tokio::select! {
                () = ctrl_c(signals.interrupt) => {}
                () = terminate(signals.terminate) => {}
            }
        })
    }
}

async fn ctrl_c(enabled: bool) {
    if enabled {
        match tokio::signal::ctrl_c().await {
            Ok(()) => return,
            Err(e) => tracing::warn!("Failed to listen for Ctrl+C: {e}"),
        }
    }
    std::future::pending::<()>().await;
}

#[cfg(unix)]
async fn terminate(enabled: bool) {
    use tokio::signal::unix::{SignalKind, signal};

    if enabled {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                if stream.recv().await.is_some() {
                    return;
                }
            }
            Err(e) => tracing::warn!("Failed to listen for SIGTERM: {e}"),
        }
    }
    std::future::pending::<()>().await;
}

#[cfg(not(unix))]
async fn terminate(_enabled: bool) {
    std::future::pending::<()>().await;
}

/// The cancellation mechanism chosen for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    Timer(Duration),
    Signal(SignalSet),
}

impl Cancellation {
    /// Debugging and installing are operator-controlled: no timeout, signals only.
    #[must_use]
    pub fn select(timeout: Duration, debugging: bool, installing: bool, signals: SignalSet) -> Self {
        if debugging || installing {
            Self::Signal(signals)
        } else {
            Self::Timer(timeout)
        }
    }
}

/// Why an armed interrupt fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    TimedOut,
    Signalled,
}

/// Arms timers and signal listeners against a [`Stop`] target.
#[derive(Clone)]
pub struct InterruptController {
    signals: Arc<dyn SignalSource>,
}

impl std::fmt::Debug for InterruptController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptController").finish_non_exhaustive()
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new(Arc::new(OsSignals))
    }
}

impl InterruptController {
    #[must_use]
    pub fn new(signals: Arc<dyn SignalSource>) -> Self {
        Self { signals }
    }

    #[must_use]
    pub fn signals(&self) -> &dyn SignalSource {
        self.signals.as_ref()
    }

    /// Arm `cancellation` for `function`. Must be called after the execution primitive
    /// has started; the returned guard cancels the mechanism on disarm or drop.
    pub fn arm(
        &self,
        function: &str,
        cancellation: Cancellation,
        target: Arc<dyn Stop>,
    ) -> InterruptGuard {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let function = function.to_string();

        let (kind, task) = match cancellation {
            Cancellation::Timer(timeout) => {
                tracing::debug!(
                    function = %function,
                    timeout_secs = timeout.as_secs(),
                    "Starting timeout timer"
                );
                let task = tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    flag.store(true, Ordering::Release);
                    tracing::info!(
                        "Function '{function}' timed out after {} seconds",
                        timeout.as_secs()
                    );
                    target.stop().await;
                });
                (Interruption::TimedOut, task)
            }
            Cancellation::Signal(set) => {
                tracing::debug!(function = %function, ?set, "Setting up interrupt handler");
                let signals = Arc::clone(&self.signals);
                let task = tokio::spawn(async move {
                    signals.recv(set).await;
                    flag.store(true, Ordering::Release);
                    tracing::info!("Execution of function '{function}' was interrupted");
                    target.stop().await;
                });
                (Interruption::Signalled, task)
            }
        };

        InterruptGuard {
            task: Some(task),
            fired,
            kind,
        }
    }
}

/// Live cancellation mechanism for one invocation.
#[derive(Debug)]
pub struct InterruptGuard {
    task: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
    kind: Interruption,
}

impl InterruptGuard {
    /// Cancel the timer or listener and report whether it fired.
    pub fn disarm(mut self) -> Option<Interruption> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.fired.load(Ordering::Acquire).then_some(self.kind)
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
