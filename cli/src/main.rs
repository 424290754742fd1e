//! fnrun CLI - run one function from `fnrun.toml` against one event.
//!
//! ```text
//! main() -> FnrunConfig + Manifest + RequestEnv -> LocalRuntime::invoke -> ExitCode
//! ```
//!
//! Function output goes to stdout/stderr untouched; fnrun's own logs go to stderr.

mod request;

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use fnrun_config::{EnvOverrides, FnrunConfig, MANIFEST_FILE, Manifest};
use fnrun_runtime::{InterruptController, InvocationOutcome, Output};
use fnrun_types::InvocationRequest;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use request::{FNRUN_EVENT, RequestEnv};

/// Exit status after the timeout fired, matching `timeout(1)`.
const EXIT_TIMED_OUT: u8 = 124;
/// Exit status after an operator interrupt (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

async fn read_event(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        return tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read event file {}", path.display()));
    }
    tracing::info!("Reading invoke payload from stdin (set {FNRUN_EVENT} to read it from a file)");
    let mut event = String::new();
    tokio::io::stdin()
        .read_to_string(&mut event)
        .await
        .context("failed to read event from stdin")?;
    Ok(event)
}

fn exit_code(outcome: InvocationOutcome) -> ExitCode {
    match outcome {
        InvocationOutcome::Completed { exit_code: Some(0) } => ExitCode::SUCCESS,
        InvocationOutcome::Completed { exit_code: Some(code) } => {
            ExitCode::from(u8::try_from(code).ok().filter(|code| *code != 0).unwrap_or(1))
        }
        InvocationOutcome::Completed { exit_code: None } => ExitCode::FAILURE,
        InvocationOutcome::TimedOut => ExitCode::from(EXIT_TIMED_OUT),
        InvocationOutcome::Interrupted => ExitCode::from(EXIT_INTERRUPTED),
    }
}

fn manifest_path(cwd: &Path) -> PathBuf {
    cwd.join(MANIFEST_FILE)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let function_name = env::args()
        .nth(1)
        .context("usage: fnrun <function-name>")?;
    let options = RequestEnv::from_env()?;
    let config = FnrunConfig::load().ok().flatten().unwrap_or_default();

    let cwd = env::current_dir().context("failed to read the working directory")?;
    let manifest = Manifest::load(&manifest_path(&cwd))?;
    let overrides = match &options.env_vars_file {
        Some(path) => EnvOverrides::load(path)?,
        None => EnvOverrides::default(),
    };
    let function = manifest.function(&function_name, env::vars(), &overrides)?;

    let event = read_event(options.event_file.as_deref()).await?;
    let mut request = InvocationRequest::new(event, cwd);
    if let Some(debug) = options.debug {
        request = request.with_debug(debug);
    }
    if options.install {
        request = request.installing();
    }

    let runtime = config.local_runtime(InterruptController::default());
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    let outcome = runtime
        .invoke(&function, &request, &mut Output::new(&mut stdout, &mut stderr))
        .await?;

    Ok(exit_code(outcome))
}
