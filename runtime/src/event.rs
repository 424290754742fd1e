//! Event staging: the payload of one invocation, materialized as a file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::config::StagingConfig;

pub const EVENT_FILE_NAME: &str = "event.json";

/// A staged event file owned by exactly one invocation.
///
/// The file lives in its own temporary directory, which is removed when the value is
/// dropped or [`StagedEvent::remove`] is called.
#[derive(Debug)]
pub struct StagedEvent {
    dir: TempDir,
    path: PathBuf,
}

impl StagedEvent {
    /// Write `payload` to a fresh `event.json` under the staging root.
    pub fn write(payload: &str, staging: &StagingConfig) -> io::Result<Self> {
        let root = staging.root();
        fs::create_dir_all(&root)?;
        let dir = tempfile::Builder::new().prefix("fnrun-event-").tempdir_in(&root)?;

        // The container user is not necessarily us.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755))?;
        }

        let path = dir.path().join(EVENT_FILE_NAME);
        tracing::info!(path = %path.display(), "Writing event to a temporary file");
        fs::write(&path, payload)?;

        Ok(Self { dir, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the event file; mounted as a whole into containers.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the staged file now, logging instead of failing.
    pub fn remove(self) {
        let path = self.path;
        if let Err(e) = self.dir.close() {
            tracing::warn!(path = %path.display(), "Failed to remove staged event: {e}");
        }
    }
}
