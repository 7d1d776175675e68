// ABOUTME: Crash-safe file output: temp file, fsync, link or rename, directory fsync
// ABOUTME: A file written here is either absent or complete under its final name

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// What to do when the final file name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    No,
    Yes,
}

/// Suffix of the staging file written next to the final name.
pub const TEMP_SUFFIX: &str = ".new";

/// Write `data` to `dir/file_name` so that the final name only ever holds
/// the complete content.
///
/// The bytes go to `dir/file_name.new` first and are synced, then the temp
/// file is moved to the final name and the directory itself is synced so
/// the move survives a crash.
///
/// # Errors
///
/// Returns [`Error::Io`] naming the failing path for any step, including an
/// existing final file when `overwrite` is [`Overwrite::No`].
pub fn write_data_to_file(
    data: &[u8],
    dir: &Path,
    file_name: &str,
    overwrite: Overwrite,
) -> Result<PathBuf> {
    let final_path = dir.join(file_name);
    if overwrite == Overwrite::No && final_path.exists() {
        return Err(Error::io(
            format!("Output file '{}' already exists", final_path.display()),
            std::io::Error::from(std::io::ErrorKind::AlreadyExists),
        ));
    }

    let temp_path = stage(data, dir, file_name)?;
    commit(&temp_path, &final_path, overwrite)?;
    Ok(final_path)
}

/// First half of [`write_data_to_file`]: write and sync the temp file.
pub fn stage(data: &[u8], dir: &Path, file_name: &str) -> Result<PathBuf> {
    let temp_path = dir.join(format!("{}{}", file_name, TEMP_SUFFIX));

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| Error::io(format!("Opening '{}' failed", temp_path.display()), e))?;
    file.write_all(data)
        .map_err(|e| Error::io(format!("Writing '{}' failed", temp_path.display()), e))?;
    file.sync_all()
        .map_err(|e| Error::io(format!("Syncing '{}' failed", temp_path.display()), e))?;

    Ok(temp_path)
}

/// Second half of [`write_data_to_file`]: move the temp file into place and
/// sync the directory entry.
///
/// With [`Overwrite::No`] the final name is created by a hard link, which
/// fails if the name exists at that moment, and the temp name is removed
/// afterwards. [`Overwrite::Yes`] renames over whatever is there.
pub fn commit(temp_path: &Path, final_path: &Path, overwrite: Overwrite) -> Result<()> {
    let moved = match overwrite {
        Overwrite::Yes => fs::rename(temp_path, final_path),
        Overwrite::No => fs::hard_link(temp_path, final_path),
    };
    if let Err(e) = moved {
        if overwrite == Overwrite::No {
            remove_temp(temp_path);
        }
        return Err(Error::io(
            format!(
                "Moving '{}' to '{}' failed",
                temp_path.display(),
                final_path.display()
            ),
            e,
        ));
    }
    if overwrite == Overwrite::No {
        fs::remove_file(temp_path).map_err(|e| {
            Error::io(format!("Removing '{}' failed", temp_path.display()), e)
        })?;
    }

    let dir = final_path.parent().unwrap_or_else(|| Path::new("."));
    sync_dir(dir)
}

fn remove_temp(temp_path: &Path) {
    if let Err(e) = fs::remove_file(temp_path) {
        tracing::warn!("Failed to remove temp file {:?}: {}", temp_path, e);
    }
}

/// Flush a directory's entries to durable storage.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> Result<()> {
    // an empty parent means the current directory
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let handle = fs::File::open(dir).map_err(|e| {
        Error::io(
            format!("Opening output directory failed for '{}'", dir.display()),
            e,
        )
    })?;
    handle.sync_all().map_err(|e| {
        Error::io(
            format!("Syncing output directory failed for '{}'", dir.display()),
            e,
        )
    })
}

#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
