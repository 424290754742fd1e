//! Subprocess management for native execution.

/// RAII guard that kills a child process (and its process group on Unix) on drop.
///
/// Wrap a spawned `tokio::process::Child` immediately after `spawn()` so the function's
/// process tree is torn down if the owning future is cancelled. Call `disarm()` once the
/// process has been reaped.
pub struct ChildGuard {
    child: Option<tokio::process::Child>,
    /// Captured at spawn: tokio forgets the pid once the child has been waited on, but
    /// the rest of its process group may still be alive.
    pid: Option<u32>,
}

impl ChildGuard {
    #[must_use]
    pub fn new(child: tokio::process::Child) -> Self {
        let pid = child.id();
        Self {
            child: Some(child),
            pid,
        }
    }

    pub fn child_mut(&mut self) -> Option<&mut tokio::process::Child> {
        self.child.as_mut()
    }

    /// Kill the process tree without giving up ownership; the caller still reaps it.
    ///
    /// Also valid after the leader exited, to take down children it left behind.
    pub fn kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            kill_tree(child, self.pid);
        }
    }

    pub fn disarm(&mut self) {
        self.child = None;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        kill_tree(child, self.pid);
        let _ = child.try_wait();
    }
}

fn kill_tree(child: &mut tokio::process::Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            // SAFETY: killpg has no memory-safety preconditions.
            unsafe {
                if libc::killpg(pid as i32, libc::SIGKILL) == -1 {
                    let _ = child.start_kill();
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        let _ = child.start_kill();
    }
}

/// Put the child process in its own session (Unix only) so the entire process
/// group can be killed via `killpg`.
#[cfg(unix)]
pub fn set_new_session(cmd: &mut tokio::process::Command) {
    use std::os::unix::process::CommandExt;
    // SAFETY: the pre_exec closure only calls async-signal-safe functions.
    unsafe {
        cmd.as_std_mut().pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            // Linux-only: the function dies with us even on SIGKILL.
            #[cfg(target_os = "linux")]
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::process::Stdio;
    use std::time::Duration;

    use super::{ChildGuard, set_new_session};

    #[tokio::test]
    async fn kill_terminates_process_group() {
        let mut command = tokio::process::Command::new("/bin/sh");
        command
            .args(["-c", "sleep 30 & sleep 30"])
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        set_new_session(&mut command);
        let mut guard = ChildGuard::new(command.spawn().unwrap());

        guard.kill();
        let status = tokio::time::timeout(
            Duration::from_secs(5),
            guard.child_mut().unwrap().wait(),
        )
        .await
        .expect("killed child is reaped promptly")
        .unwrap();
        assert!(!status.success());
        guard.disarm();
    }

    #[tokio::test]
    async fn kill_after_exit_reaches_leftover_children() {
        use tokio::io::AsyncBufReadExt;

        let mut command = tokio::process::Command::new("/bin/sh");
        command
            .args(["-c", "sleep 30 >/dev/null 2>&1 & echo $!"])
            .stdout(Stdio::piped());
        set_new_session(&mut command);
        let mut guard = ChildGuard::new(command.spawn().unwrap());

        let child = guard.child_mut().unwrap();
        let stdout = child.stdout.take().unwrap();
        let mut line = String::new();
        tokio::io::BufReader::new(stdout)
            .read_line(&mut line)
            .await
            .unwrap();
        let orphan: i32 = line.trim().parse().unwrap();
        assert!(child.wait().await.unwrap().success());

        guard.kill();
        guard.disarm();
        tokio::time::sleep(Duration::from_millis(200)).await;
        // SAFETY: signal 0 only probes for existence.
        let alive = unsafe { libc::kill(orphan, 0) } == 0;
        if alive {
            let stat = std::fs::read_to_string(format!("/proc/{orphan}/stat")).unwrap_or_default();
            assert!(stat.is_empty() || stat.contains(" Z "), "orphan still running: {stat}");
        }
    }

    #[tokio::test]
    async fn drop_kills_running_child() {
        let mut command = tokio::process::Command::new("/bin/sh");
        command.args(["-c", "sleep 30"]);
        set_new_session(&mut command);
        let child = command.spawn().unwrap();
        let pid = child.id().unwrap() as i32;
        drop(ChildGuard::new(child));

        // Give the kernel a moment to deliver SIGKILL.
        tokio::time::sleep(Duration::from_millis(200)).await;
        // SAFETY: signal 0 only probes for existence.
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        // A zombie still answers kill(0); make sure it is at least not running `sleep`.
        if alive {
            let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap_or_default();
            assert!(stat.is_empty() || stat.contains(" Z "), "process still running: {stat}");
        }
    }
}
