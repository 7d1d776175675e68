// ABOUTME: Replication log extractor - drains a logical slot into a durable log file
// ABOUTME: Peeks without consuming and only advances the slot after the file is on disk

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::durable::{write_data_to_file, Overwrite};
use crate::error::Result;
use crate::logfile::{log_file_name, LogEntry, Payload};
use crate::lsn::Lsn;
use crate::store::{ReplicationSlot, SlotChange, Transactional};

/// Settings for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Name of the logical replication slot to peek.
    pub slot: String,
    /// Directory the log file is written to.
    pub log_dir: PathBuf,
    /// Advance the slot to the batch's high-water mark once the log is written.
    pub catchup: bool,
    /// Drop rows at or before this position (for re-runs after a partial failure).
    pub ignore_earlier_than: Option<Lsn>,
}

/// How an extraction run ended. Only [`ExtractOutcome::Written`] produces a
/// file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// The slot had nothing pending.
    NoChanges,
    /// The slot had rows but none was later than the threshold.
    AllFiltered { discarded: usize },
    /// A log file was written.
    Written {
        path: PathBuf,
        entries: usize,
        discarded: usize,
        high_water: Option<Lsn>,
        caught_up: bool,
    },
}

/// Rows that survived filtering, in server emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub entries: Vec<LogEntry>,
    /// LSN of the last retained commit marker.
    pub high_water: Option<Lsn>,
    pub discarded: usize,
    /// Number of retained `N` entries.
    pub changes: usize,
}

impl Batch {
    /// The log file content: one `<lsn> <xid> <payload>` line per entry.
    pub fn to_log_text(&self) -> String {
        let mut text = String::with_capacity(self.entries.len() * 50);
        for entry in &self.entries {
            text.push_str(&entry.to_string());
            text.push('\n');
        }
        text
    }

    /// Position encoded in the log file name.
    fn name_lsn(&self) -> Lsn {
        self.high_water
            .or_else(|| self.entries.last().map(|entry| entry.lsn))
            .unwrap_or_default()
    }
}

/// Parse, classify and filter peeked rows.
///
/// Rows at or before `threshold` are dropped entirely. Order is kept as the
/// server emitted it.
pub fn filter_rows(rows: Vec<SlotChange>, threshold: Option<Lsn>) -> Result<Batch> {
    let mut batch = Batch::default();

    for row in rows {
        let lsn: Lsn = row.lsn.parse()?;
        if threshold.is_some_and(|t| lsn <= t) {
            batch.discarded += 1;
            continue;
        }

        match Payload::classify(&row.data)? {
            Payload::Commit => batch.high_water = Some(lsn),
            Payload::Change(_) => batch.changes += 1,
            Payload::Other => {}
        }

        batch.entries.push(LogEntry {
            lsn,
            xid: row.xid,
            payload: row.data,
        });
    }

    Ok(batch)
}

/// Run one extraction inside `session` and commit it.
///
/// The slot is only advanced when `catchup` is set, a log file was written
/// and synced, and the batch contains a commit marker. Any error before the
/// write leaves the slot untouched; the session is then dropped and the
/// transaction rolls back. The advance itself is not transactional, so it
/// is the last step before the commit.
pub async fn extract<S, Tz>(
    session: S,
    options: &ExtractOptions,
    now: &DateTime<Tz>,
) -> Result<ExtractOutcome>
where
    S: ReplicationSlot + Transactional,
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    tracing::info!("Reading replication log...");
    let rows = session.peek_changes(&options.slot).await?;

    if rows.is_empty() {
        tracing::info!("No changes found.");
        tracing::info!("Did not write log file.");
        session.commit().await?;
        return Ok(ExtractOutcome::NoChanges);
    }
    tracing::info!("There are {} entries in the replication log.", rows.len());

    let batch = filter_rows(rows, options.ignore_earlier_than)?;
    if batch.discarded > 0 {
        tracing::info!(
            "Ignored {} entries at or before {}.",
            batch.discarded,
            options.ignore_earlier_than.unwrap_or_default()
        );
    }

    if batch.entries.is_empty() {
        tracing::info!("No changes left after filtering.");
        tracing::info!("Did not write log file.");
        session.commit().await?;
        return Ok(ExtractOutcome::AllFiltered {
            discarded: batch.discarded,
        });
    }

    match batch.high_water {
        Some(lsn) => tracing::info!("LSN is {}", lsn),
        None => tracing::warn!("Batch has no commit marker, the slot can not be advanced."),
    }
    tracing::info!("{} of {} entries are object changes.", batch.changes, batch.entries.len());

    let path = write_log(&batch, &options.log_dir, now)?;
    tracing::info!("Wrote and synced log {:?}.", path);

    let caught_up = match (options.catchup, batch.high_water) {
        (true, Some(lsn)) => {
            tracing::info!("Catching up to {}...", lsn);
            session.advance_slot(&options.slot, lsn).await?;
            true
        }
        (true, None) => false,
        (false, _) => {
            tracing::info!("Not catching up (use --catchup if you want this).");
            false
        }
    };

    session.commit().await?;

    Ok(ExtractOutcome::Written {
        path,
        entries: batch.entries.len(),
        discarded: batch.discarded,
        high_water: batch.high_water,
        caught_up,
    })
}

fn write_log<Tz>(batch: &Batch, log_dir: &Path, now: &DateTime<Tz>) -> Result<PathBuf>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let file_name = log_file_name(now, batch.name_lsn());
    tracing::info!("Writing log to {:?}...", log_dir.join(&file_name));
    write_data_to_file(
        batch.to_log_text().as_bytes(),
        log_dir,
        &file_name,
        Overwrite::No,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn rows(specs: &[(&str, &str, &str)]) -> Vec<SlotChange> {
        specs
            .iter()
            .map(|(lsn, xid, data)| SlotChange::new(*lsn, *xid, *data))
            .collect()
    }

    #[test]
    fn test_filter_without_threshold_keeps_everything() {
        let batch = filter_rows(
            rows(&[
                ("0/10", "7", "N n42 v1 c5"),
                ("0/20", "7", "C 7"),
                ("0/30", "8", "X unrelated"),
            ]),
            None,
        )
        .unwrap();
        assert_eq!(batch.entries.len(), 3);
        assert_eq!(batch.discarded, 0);
        assert_eq!(batch.changes, 1);
        assert_eq!(batch.high_water, Some("0/20".parse().unwrap()));
    }

    #[test]
    fn test_filter_keeps_exactly_rows_after_threshold() {
        let threshold: Lsn = "0/20".parse().unwrap();
        let batch = filter_rows(
            rows(&[
                ("0/10", "7", "N n1 v1 c5"),
                ("0/20", "7", "C 7"),
                ("0/21", "8", "N n2 v1 c6"),
                ("0/100", "8", "C 8"),
                ("1/0", "9", "N w3 v2 c6"),
                ("1/8", "9", "C 9"),
            ]),
            Some(threshold),
        )
        .unwrap();
        let kept: Vec<String> = batch.entries.iter().map(|e| e.lsn.to_string()).collect();
        assert_eq!(kept, vec!["0/21", "0/100", "1/0", "1/8"]);
        assert_eq!(batch.discarded, 2);
        assert_eq!(batch.changes, 2);
        assert_eq!(batch.high_water, Some("1/8".parse().unwrap()));
    }

    #[test]
    fn test_filter_high_water_is_last_commit() {
        let batch = filter_rows(
            rows(&[
                ("0/10", "7", "C 7"),
                ("0/20", "8", "N n1 v1 c5"),
                ("0/30", "8", "C 8"),
                ("0/40", "9", "N n2 v1 c5"),
            ]),
            None,
        )
        .unwrap();
        assert_eq!(batch.high_water, Some("0/30".parse().unwrap()));
        assert_eq!(batch.name_lsn(), "0/30".parse().unwrap());
    }

    #[test]
    fn test_filter_rejects_bad_lsn() {
        let err = filter_rows(rows(&[("nope", "7", "C 7")]), None).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_log_text() {
        let batch = filter_rows(
            rows(&[("0/16B2D48", "7", "N n42 v1 c5"), ("0/16B2D50", "7", "C 7")]),
            None,
        )
        .unwrap();
        assert_eq!(
            batch.to_log_text(),
            "0/16b2d48 7 N n42 v1 c5\n0/16b2d50 7 C 7\n"
        );
    }
}
