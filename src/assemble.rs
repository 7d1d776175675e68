// ABOUTME: Diff assembler - turns a replication log file into a gzipped osmChange diff
// ABOUTME: Resolves authors once, rebuilds every object version and streams bounded buffers

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::logfile::{diff_file_name, read_log};
use crate::osm::{ChangeBuffer, Header, OscFile};
use crate::reconstruct::Reconstructor;
use crate::store::{ObjectStore, Transactional};
use crate::users::ChangesetUsers;

/// Default in-memory buffer size before a flush to the output file.
pub const BUFFER_SIZE: usize = 1024 * 1024;

/// Room kept free in a buffer for the next record.
const FLUSH_MARGIN: usize = 1024;

#[derive(Debug, Clone)]
pub struct AssembleOptions {
    pub log_file: PathBuf,
    /// Where the diff goes. Next to the log file when unset.
    pub output_dir: Option<PathBuf>,
    pub buffer_size: usize,
    /// Written into the `generator` attribute of the diff.
    pub generator: String,
}

impl AssembleOptions {
    pub fn new(log_file: impl Into<PathBuf>) -> Self {
        Self {
            log_file: log_file.into(),
            output_dir: None,
            buffer_size: BUFFER_SIZE,
            generator: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleSummary {
    pub output: PathBuf,
    pub objects: usize,
    pub changesets: usize,
    pub flushes: usize,
}

/// Output path for a log file: same base name with the diff suffix, in
/// `output_dir` or next to the log.
pub fn diff_path_for(log_file: &Path, output_dir: Option<&Path>) -> Result<PathBuf> {
    let name = log_file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            Error::Config(format!(
                "Log file name '{}' is not usable",
                log_file.display()
            ))
        })?;
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => log_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    Ok(dir.join(diff_file_name(name)))
}

/// Assemble the diff for one log file inside `session`.
///
/// Nothing is written until the log has been read and every changeset
/// author resolved. On any later failure the partial output is removed.
/// The session is committed before the diff is finalized; it only reads.
pub async fn assemble<S>(session: S, options: &AssembleOptions) -> Result<AssembleSummary>
where
    S: ObjectStore + Transactional,
{
    tracing::info!("Reading log file {:?}...", options.log_file);
    let records = read_log(&options.log_file)?;
    tracing::info!("Found {} object changes in log.", records.len());

    let mut users = ChangesetUsers::from_records(&records);
    tracing::info!("Resolving {} changesets...", users.len());
    users.populate(&session).await?;

    let output = diff_path_for(&options.log_file, options.output_dir.as_deref())?;
    tracing::info!("Writing diff to {:?}...", output);
    let mut file = OscFile::create(&output, &Header::new(options.generator.clone()))?;

    let reconstructor = Reconstructor::new(&session, &users);
    let threshold = options.buffer_size.saturating_sub(FLUSH_MARGIN);
    let mut buffer = ChangeBuffer::new();
    let mut flushes = 0;

    for record in &records {
        reconstructor.reconstruct_into(record, &mut buffer).await?;
        if buffer.committed() > threshold {
            tracing::info!(
                "Flushing {} objects ({} bytes)...",
                buffer.len(),
                buffer.committed()
            );
            file.write_buffer(std::mem::take(&mut buffer))?;
            flushes += 1;
        }
    }
    if !buffer.is_empty() {
        file.write_buffer(buffer)?;
        flushes += 1;
    }

    session.commit().await?;
    let output = file.close()?;
    tracing::info!("Wrote and synced diff {:?} with {} objects.", output, records.len());

    Ok(AssembleSummary {
        output,
        objects: records.len(),
        changesets: users.len(),
        flushes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_path_next_to_log() {
        let path = diff_path_for(Path::new("/var/log/osm/20261017T090503-0-10.log"), None).unwrap();
        assert_eq!(path, PathBuf::from("/var/log/osm/20261017T090503-0-10.osc.gz"));
    }

    #[test]
    fn test_diff_path_in_output_dir() {
        let path = diff_path_for(
            Path::new("/var/log/osm/a.log"),
            Some(Path::new("/srv/changes")),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/srv/changes/a.osc.gz"));
    }

    #[test]
    fn test_diff_path_for_bare_file_name() {
        let path = diff_path_for(Path::new("a.log"), None).unwrap();
        assert_eq!(path, PathBuf::from("./a.osc.gz"));
    }

    #[test]
    fn test_diff_path_needs_file_name() {
        assert!(matches!(
            diff_path_for(Path::new("/"), None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_default_options() {
        let options = AssembleOptions::new("x.log");
        assert_eq!(options.buffer_size, BUFFER_SIZE);
        assert!(options.output_dir.is_none());
        assert!(options.generator.starts_with("osm-changefeed/"));
    }
}
