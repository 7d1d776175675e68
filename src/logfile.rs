// ABOUTME: Replication log file format shared by extract-log and assemble-diff
// ABOUTME: Classifies change feed payloads, names log files and reads them back

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, TimeZone};

use crate::error::{Error, Result};
use crate::lsn::Lsn;
use crate::osm::ObjectType;

pub const LOG_SUFFIX: &str = ".log";
pub const DIFF_SUFFIX: &str = ".osc.gz";

/// One line of a replication log: `<lsn> <xid> <payload>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub lsn: Lsn,
    pub xid: String,
    pub payload: String,
}

impl LogEntry {
    pub fn kind(&self) -> Result<Payload> {
        Payload::classify(&self.payload)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lsn, self.xid, self.payload)
    }
}

/// What a change feed payload describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// `C <xid>`: end of a transaction.
    Commit,
    /// `N ...`: a new object version.
    Change(ChangeRecord),
    /// Anything else. Kept in the log, ignored when assembling.
    Other,
}

impl Payload {
    pub fn classify(payload: &str) -> Result<Self> {
        match payload.split_whitespace().next() {
            Some("C") => Ok(Payload::Commit),
            Some("N") => ChangeRecord::parse(payload).map(Payload::Change),
            _ => Ok(Payload::Other),
        }
    }
}

/// Identifies one object version named by an `N` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeRecord {
    pub object_type: ObjectType,
    pub id: i64,
    pub version: i64,
    pub changeset: i64,
}

impl ChangeRecord {
    /// Parse `N <type><id> v<version> c<changeset>`.
    ///
    /// The type letter may also stand alone (`N n 42 v1 c5`) and is
    /// accepted in either case.
    pub fn parse(payload: &str) -> Result<Self> {
        let malformed = || Error::Format(format!("malformed change entry '{}'", payload));

        let mut tokens = payload.split_whitespace();
        if tokens.next() != Some("N") {
            return Err(malformed());
        }

        let object = tokens.next().ok_or_else(malformed)?;
        let mut chars = object.chars();
        let object_type = chars
            .next()
            .and_then(ObjectType::from_char)
            .ok_or_else(malformed)?;
        let id_text = match chars.as_str() {
            "" => tokens.next().ok_or_else(malformed)?,
            rest => rest,
        };
        let id = parse_number(id_text).ok_or_else(malformed)?;

        let version = tokens
            .next()
            .and_then(|t| t.strip_prefix('v'))
            .and_then(parse_number)
            .ok_or_else(malformed)?;
        let changeset = tokens
            .next()
            .and_then(|t| t.strip_prefix('c'))
            .and_then(parse_number)
            .ok_or_else(malformed)?;

        if tokens.next().is_some() {
            return Err(malformed());
        }

        Ok(Self {
            object_type,
            id,
            version,
            changeset,
        })
    }
}

fn parse_number(text: &str) -> Option<i64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Split a log line into `(lsn, xid, payload)`.
pub fn parse_line(line: &str) -> Result<LogEntry> {
    let malformed = || Error::Format(format!("malformed log line '{}'", line));

    let (lsn, rest) = line.split_once(' ').ok_or_else(malformed)?;
    let (xid, payload) = rest.split_once(' ').ok_or_else(malformed)?;
    if xid.is_empty() || payload.is_empty() {
        return Err(malformed());
    }

    Ok(LogEntry {
        lsn: lsn.parse()?,
        xid: xid.to_string(),
        payload: payload.to_string(),
    })
}

/// Read the change records of a log file in file order. Commit markers and
/// unknown payloads are skipped.
pub fn read_log(path: &Path) -> Result<Vec<ChangeRecord>> {
    let file = File::open(path)
        .map_err(|e| Error::io(format!("Opening log file '{}' failed", path.display()), e))?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| {
            Error::io(format!("Reading log file '{}' failed", path.display()), e)
        })?;
        if line.is_empty() {
            continue;
        }
        let entry = parse_line(&line).map_err(|e| at_line(e, path, index + 1))?;
        if let Payload::Change(record) = entry.kind().map_err(|e| at_line(e, path, index + 1))? {
            records.push(record);
        }
    }
    Ok(records)
}

fn at_line(err: Error, path: &Path, line: usize) -> Error {
    match err {
        Error::Format(msg) => Error::Format(format!("{}:{}: {}", path.display(), line, msg)),
        other => other,
    }
}

/// `<YYYYMMDDTHHMMSS>-<lsn with '/' as '-'>.log`
pub fn log_file_name<Tz>(now: &DateTime<Tz>, lsn: Lsn) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!(
        "{}-{}{}",
        now.format("%Y%m%dT%H%M%S"),
        lsn.to_file_component(),
        LOG_SUFFIX
    )
}

/// Diff file name for a log file name: the suffix after the last dot is
/// replaced, or the diff suffix appended if there is none.
pub fn diff_file_name(log_file_name: &str) -> String {
    let stem = match log_file_name.rfind('.') {
        Some(pos) if pos > 0 => &log_file_name[..pos],
        _ => log_file_name,
    };
    format!("{}{}", stem, DIFF_SUFFIX)
}
