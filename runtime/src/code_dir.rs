//! Resolution of the directory exposed to the execution primitive as function code.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use fnrun_types::{CodeLayout, FunctionConfig};
use tempfile::TempDir;

use crate::config::StagingConfig;

/// Archive extensions that are copied into a private directory before mounting.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["jar"];

/// A code directory scoped to one invocation.
///
/// Only the archive case owns anything; its temporary directory is removed when the
/// value is dropped.
#[derive(Debug)]
pub enum CodeDir {
    /// A path we do not own (the code path, a subpath of it, or the project dir).
    Existing(PathBuf),
    /// A private copy of an archive.
    Temporary { dir: TempDir, path: PathBuf },
}

impl CodeDir {
    /// Decide which directory backs `function` for this invocation.
    ///
    /// Installs run at project scope for runtimes that build from the project root;
    /// otherwise archives are copied out, publish layouts are descended into, and
    /// anything else is used as-is.
    pub fn resolve(
        function: &FunctionConfig,
        cwd: &Path,
        installing: bool,
        staging: &StagingConfig,
    ) -> io::Result<Self> {
        let code_path = &function.code_path;
        let layout = function.runtime.layout();

        if installing {
            return Ok(match layout {
                CodeLayout::ProjectInstall => Self::Existing(cwd.to_path_buf()),
                CodeLayout::Source | CodeLayout::Publish { .. } => {
                    Self::Existing(code_path.clone())
                }
            });
        }

        if is_archive(code_path) {
            return copy_archive(code_path, staging);
        }

        if let CodeLayout::Publish { framework } = layout {
            return Ok(Self::Existing(publish_dir(code_path, framework)));
        }

        tracing::debug!(path = %code_path.display(), "Code is not an archive");
        Ok(Self::Existing(code_path.clone()))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Existing(path) | Self::Temporary { path, .. } => path,
        }
    }

    #[must_use]
    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary { .. })
    }

    /// Release the scope now, logging removal failures.
    pub fn release(self) {
        if let Self::Temporary { dir, path } = self
            && let Err(e) = dir.close()
        {
            tracing::warn!(path = %path.display(), "Failed to remove code directory: {e}");
        }
    }
}

fn is_archive(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                ARCHIVE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
}

fn publish_dir(code_path: &Path, framework: &str) -> PathBuf {
    code_path
        .join("bin")
        .join("Release")
        .join(framework)
        .join("publish/")
}

fn copy_archive(archive: &Path, staging: &StagingConfig) -> io::Result<CodeDir> {
    let root = staging.root();
    fs::create_dir_all(&root)?;
    let dir = tempfile::Builder::new().prefix("fnrun-code-").tempdir_in(&root)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755))?;
    }

    tracing::info!(archive = %archive.display(), "Copying archive to a temporary directory");
    let file_name = archive
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "archive has no file name"))?;
    fs::copy(archive, dir.path().join(file_name))?;

    // Container file sharing does not follow symlinks (macOS /var -> /private/var).
    let path = fs::canonicalize(dir.path())?;
    Ok(CodeDir::Temporary { dir, path })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use fnrun_types::{FunctionConfig, Runtime};

    use super::CodeDir;
    use crate::config::StagingConfig;

    fn function(runtime: Runtime, code_path: &Path) -> FunctionConfig {
        FunctionConfig::new("fn", runtime, "index.handler", code_path).unwrap()
    }

    #[test]
    fn directory_is_used_as_is() {
        let code = tempfile::tempdir().unwrap();
        let dir = CodeDir::resolve(
            &function(Runtime::Nodejs12, code.path()),
            Path::new("/project"),
            false,
            &StagingConfig::default(),
        )
        .unwrap();
        assert_eq!(dir.path(), code.path());
        assert!(!dir.is_temporary());
    }

    #[test]
    fn java_install_runs_at_project_scope() {
        let code = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        let dir = CodeDir::resolve(
            &function(Runtime::Java8, code.path()),
            cwd.path(),
            true,
            &StagingConfig::default(),
        )
        .unwrap();
        assert_eq!(dir.path(), cwd.path());
    }

    #[test]
    fn other_installs_use_code_path() {
        let code = tempfile::tempdir().unwrap();
        for runtime in [Runtime::Python36, Runtime::DotnetCore22] {
            let dir = CodeDir::resolve(
                &function(runtime, code.path()),
                Path::new("/project"),
                true,
                &StagingConfig::default(),
            )
            .unwrap();
            assert_eq!(dir.path(), code.path(), "{runtime}");
        }
    }

    #[test]
    fn dotnet_uses_publish_layout() {
        let code = tempfile::tempdir().unwrap();
        let dir = CodeDir::resolve(
            &function(Runtime::DotnetCore22, code.path()),
            Path::new("/project"),
            false,
            &StagingConfig::default(),
        )
        .unwrap();
        assert_eq!(
            dir.path(),
            code.path().join("bin/Release/netcoreapp2.2/publish")
        );
        assert!(dir.path().to_string_lossy().ends_with("publish/"));
    }

    #[test]
    fn jar_is_copied_to_private_directory() {
        let staging_root = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let jar = project.path().join("app.jar");
        std::fs::write(&jar, b"PK\x03\x04jar").unwrap();

        let dir = CodeDir::resolve(
            &function(Runtime::Java8, &jar),
            project.path(),
            false,
            &StagingConfig::at(staging_root.path()),
        )
        .unwrap();
        assert!(dir.is_temporary());
        let copied = dir.path().join("app.jar");
        assert_eq!(std::fs::read(&copied).unwrap(), b"PK\x03\x04jar");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        let temp_path = dir.path().to_path_buf();
        dir.release();
        assert!(!temp_path.exists());
        assert!(jar.exists(), "source archive is left alone");
    }

    #[test]
    fn dropping_temporary_dir_removes_it() {
        let staging_root = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let jar = project.path().join("app.JAR");
        std::fs::write(&jar, b"jar").unwrap();

        let dir = CodeDir::resolve(
            &function(Runtime::Java8, &jar),
            project.path(),
            false,
            &StagingConfig::at(staging_root.path()),
        )
        .unwrap();
        let temp_path = dir.path().to_path_buf();
        drop(dir);
        assert!(!temp_path.exists());
    }

    #[test]
    fn non_archive_file_is_passed_through() {
        let project = tempfile::tempdir().unwrap();
        let script = project.path().join("index.js");
        std::fs::write(&script, b"exports.handler = () => {}").unwrap();

        let dir = CodeDir::resolve(
            &function(Runtime::Nodejs12, &script),
            project.path(),
            false,
            &StagingConfig::default(),
        )
        .unwrap();
        assert_eq!(dir.path(), script);
    }

    #[test]
    fn java_install_with_jar_still_uses_project() {
        let project = tempfile::tempdir().unwrap();
        let jar = project.path().join("app.jar");
        std::fs::write(&jar, b"jar").unwrap();

        let dir = CodeDir::resolve(
            &function(Runtime::Java8, &jar),
            project.path(),
            true,
            &StagingConfig::default(),
        )
        .unwrap();
        assert!(!dir.is_temporary());
        assert_eq!(dir.path(), project.path());
    }
}
