// ABOUTME: PID file guard that keeps two instances of the same tool apart
// ABOUTME: Created exclusively on start, removed unconditionally on drop

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Holds `<run_dir>/<tool>.pid` for the lifetime of the value.
///
/// With no run directory configured the guard does nothing and running
/// several instances is left to the operator. The marker is removed on drop
/// without checking whether another process touched it in the meantime.
#[derive(Debug)]
pub struct PidFile {
    path: Option<PathBuf>,
}

impl PidFile {
    pub fn acquire(run_dir: Option<&Path>, tool: &str) -> Result<Self> {
        let Some(run_dir) = run_dir else {
            tracing::debug!("No run directory configured, not creating a pid file");
            return Ok(Self { path: None });
        };

        let path = run_dir.join(format!("{}.pid", tool));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::LockHeld {
                    path,
                    tool: tool.to_string(),
                });
            }
            Err(e) => {
                return Err(Error::io(
                    format!("Can not create pid file '{}'", path.display()),
                    e,
                ));
            }
        };

        // from here on drop cleans up, even if writing the pid fails
        let guard = Self {
            path: Some(path.clone()),
        };
        writeln!(file, "{}", std::process::id())
            .map_err(|e| Error::io(format!("Writing pid file '{}' failed", path.display()), e))?;
        tracing::debug!("Created pid file {:?}", path);

        Ok(guard)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("Failed to remove pid file {:?}: {}", path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pid_file_lifecycle() {
        let dir = tempdir().unwrap();
        let pid_path = dir.path().join("extract-log.pid");
        {
            let lock = PidFile::acquire(Some(dir.path()), "extract-log").unwrap();
            assert_eq!(lock.path(), Some(pid_path.as_path()));
            let content = fs::read_to_string(&pid_path).unwrap();
            assert_eq!(content.trim(), std::process::id().to_string());
        }
        assert!(!pid_path.exists());
    }

    #[test]
    fn test_second_instance_is_refused() {
        let dir = tempdir().unwrap();
        let _first = PidFile::acquire(Some(dir.path()), "extract-log").unwrap();
        let err = PidFile::acquire(Some(dir.path()), "extract-log").unwrap_err();
        match err {
            Error::LockHeld { path, tool } => {
                assert_eq!(path, dir.path().join("extract-log.pid"));
                assert_eq!(tool, "extract-log");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_different_tools_do_not_conflict() {
        let dir = tempdir().unwrap();
        let _a = PidFile::acquire(Some(dir.path()), "extract-log").unwrap();
        let _b = PidFile::acquire(Some(dir.path()), "assemble-diff").unwrap();
    }

    #[test]
    fn test_no_run_dir_is_noop() {
        let a = PidFile::acquire(None, "extract-log").unwrap();
        let b = PidFile::acquire(None, "extract-log").unwrap();
        assert!(a.path().is_none());
        assert!(b.path().is_none());
    }

    #[test]
    fn test_missing_run_dir_is_io_error() {
        let dir = tempdir().unwrap();
        let err = PidFile::acquire(Some(&dir.path().join("missing")), "check-db").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
