use std::process::Stdio;

use tokio::process::Command;

use super::{ContainerDescriptor, ContainerError, ContainerFut, ContainerHandle, ContainerManager};
use crate::Output;
use crate::config::ContainerConfig;

const NO_SUCH_CONTAINER: &str = "No such container";

/// [`ContainerManager`] that shells out to the `docker` command line.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &ContainerConfig) -> Self {
        Self::new(config.docker_binary())
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.stdin(Stdio::null()).kill_on_drop(true);
        command
    }

    /// Run `docker <args>` to completion and return its trimmed stdout.
    async fn run(&self, args: &[String]) -> Result<String, ContainerError> {
        let output = self
            .command()
            .args(args)
            .output()
            .await
            .map_err(|source| ContainerError::Spawn {
                program: self.binary.clone(),
                source,
            })?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        Err(ContainerError::Command {
            command: format!(
                "{} {}",
                self.binary,
                args.first().map_or("", String::as_str)
            ),
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// `docker rm --force`; a container that is already gone counts as removed.
    async fn remove(&self, container: &str) -> Result<(), ContainerError> {
        let args = ["rm".to_string(), "--force".to_string(), container.to_string()];
        match self.run(&args).await {
            Ok(_) => Ok(()),
            Err(ContainerError::Command { stderr, .. }) if stderr.contains(NO_SUCH_CONTAINER) => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Removes a container by name unless disarmed.
///
/// Covers the window between `docker create` and a successful `docker start`, before the
/// executor holds a handle it could stop.
struct Created {
    docker: DockerCli,
    name: Option<String>,
}

impl Created {
    fn new(docker: &DockerCli, name: &str) -> Self {
        Self {
            docker: docker.clone(),
            name: Some(name.to_string()),
        }
    }

    async fn remove(mut self) {
        if let Some(name) = self.name.take()
            && let Err(e) = self.docker.remove(&name).await
        {
            tracing::warn!(container = %name, "Failed to remove container that did not start: {e}");
        }
    }

    fn disarm(mut self) {
        self.name = None;
    }
}

impl Drop for Created {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };
        let docker = self.docker.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = docker.remove(&name).await {
                        tracing::warn!(container = %name, "Failed to remove abandoned container: {e}");
                    }
                });
            }
            Err(_) => tracing::warn!(
                container = %name,
                "Container left behind: no async runtime available to remove it"
            ),
        }
    }
}

/// Arguments for `docker create`.
///
/// Code is mounted read-only unless dependencies are being installed into it; the event
/// directory is always read-only.
#[must_use]
pub fn create_args(descriptor: &ContainerDescriptor, install_mode: bool) -> Vec<String> {
    let code_access = if install_mode { "rw" } else { "ro" };
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        descriptor.name.clone(),
        "--memory".to_string(),
        format!("{}m", descriptor.memory_mb),
        "--volume".to_string(),
        format!(
            "{}:{}:{code_access}",
            descriptor.code_dir.display(),
            descriptor.code_mount
        ),
        "--volume".to_string(),
        format!(
            "{}:{}:ro",
            descriptor.event_dir.display(),
            descriptor.event_mount
        ),
    ];
    if let Some(network) = &descriptor.network {
        args.extend(["--network".to_string(), network.clone()]);
    }
    for (key, value) in &descriptor.env {
        args.extend(["--env".to_string(), format!("{key}={value}")]);
    }
    if let Some(port) = descriptor.debug_port {
        args.extend(["--publish".to_string(), format!("{port}:{port}")]);
    }
    if let Some(entrypoint) = &descriptor.entrypoint {
        args.extend(["--entrypoint".to_string(), entrypoint.program().to_string()]);
    }
    args.push(descriptor.image.clone());
    if let Some(entrypoint) = &descriptor.entrypoint {
        args.extend(entrypoint.args().iter().cloned());
    }
    args
}

impl ContainerManager for DockerCli {
    fn start<'a>(
        &'a self,
        descriptor: &'a ContainerDescriptor,
        install_mode: bool,
    ) -> ContainerFut<'a, ContainerHandle> {
        Box::pin(async move {
            let created = Created::new(self, &descriptor.name);
            let id = match self.run(&create_args(descriptor, install_mode)).await {
                Ok(id) => id,
                // The name may belong to a container this call never made.
                Err(e) => {
                    created.disarm();
                    return Err(e);
                }
            };
            if let Err(e) = self.run(&["start".to_string(), id.clone()]).await {
                created.remove().await;
                return Err(e);
            }
            created.disarm();
            Ok(ContainerHandle {
                id,
                name: descriptor.name.clone(),
            })
        })
    }

    fn stop<'a>(&'a self, handle: &'a ContainerHandle) -> ContainerFut<'a, ()> {
        Box::pin(self.remove(&handle.id))
    }

    fn stream_logs<'a>(
        &'a self,
        handle: &'a ContainerHandle,
        output: &'a mut Output<'_>,
    ) -> ContainerFut<'a, Option<i32>> {
        Box::pin(async move {
            let mut logs = self
                .command()
                .args(["logs", "--follow", handle.id.as_str()])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|source| ContainerError::Spawn {
                    program: self.binary.clone(),
                    source,
                })?;

            let Output { stdout, stderr } = output;
            let mut log_stdout = logs.stdout.take();
            let mut log_stderr = logs.stderr.take();
            let copy_stdout = async {
                match log_stdout.as_mut() {
                    Some(reader) => tokio::io::copy(reader, &mut **stdout).await.map(|_| ()),
                    None => Ok(()),
                }
            };
            let copy_stderr = async {
                match log_stderr.as_mut() {
                    Some(reader) => tokio::io::copy(reader, &mut **stderr).await.map(|_| ()),
                    None => Ok(()),
                }
            };
            let (copied_stdout, copied_stderr) = tokio::join!(copy_stdout, copy_stderr);
            if let Err(e) = logs.wait().await {
                tracing::debug!("`docker logs` did not exit cleanly: {e}");
            }
            copied_stdout.map_err(ContainerError::Logs)?;
            copied_stderr.map_err(ContainerError::Logs)?;

            // The container may already be gone when a stop raced the log stream.
            match self.run(&["wait".to_string(), handle.id.clone()]).await {
                Ok(code) => Ok(code.parse::<i32>().ok()),
                Err(e) => {
                    tracing::debug!("Could not read container exit code: {e}");
                    Ok(None)
                }
            }
        })
    }
}
