// ABOUTME: Configuration file shared by extract-log, assemble-diff and check-db
// ABOUTME: Loads TOML, fills defaults and renders the libpq connection string

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "osm-changefeed.toml";

const DEFAULT_DIR: &str = "/tmp";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub replication_slot: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "osm".to_string(),
            user: "osm".to_string(),
            password: "osm".to_string(),
            replication_slot: "rs".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    database: DatabaseConfig,
    log_dir: Option<String>,
    changes_dir: Option<String>,
    run_dir: Option<String>,
}

/// Resolved configuration. The three directories are independent values;
/// an empty string in the file leaves a directory unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database: DatabaseConfig,
    log_dir: Option<PathBuf>,
    changes_dir: Option<PathBuf>,
    run_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            log_dir: Some(PathBuf::from(DEFAULT_DIR)),
            changes_dir: Some(PathBuf::from(DEFAULT_DIR)),
            run_dir: Some(PathBuf::from(DEFAULT_DIR)),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Can not read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
            .map_err(|e| Error::Config(format!("{} (in '{}')", strip_prefix(&e), path.display())))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let document: toml::Table = toml::from_str(contents)
            .map_err(|e| Error::Config(format!("invalid TOML: {}", e)))?;

        if let Some(database) = document.get("database") {
            if !database.is_table() {
                return Err(Error::Config("'database' entry must be a table.".to_string()));
            }
        }

        let file: ConfigFile = toml::Value::Table(document)
            .try_into()
            .map_err(|e: toml::de::Error| Error::Config(e.message().to_string()))?;

        Ok(Self {
            database: file.database,
            log_dir: directory(file.log_dir),
            changes_dir: directory(file.changes_dir),
            run_dir: directory(file.run_dir),
        })
    }

    /// Connection string in libpq key/value form. Empty values are skipped.
    pub fn connection_string(&self) -> String {
        let db = &self.database;
        let port = db.port.to_string();
        [
            ("host", db.host.as_str()),
            ("port", port.as_str()),
            ("dbname", db.dbname.as_str()),
            ("user", db.user.as_str()),
            ("password", db.password.as_str()),
        ]
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}", key, quote_conninfo_value(value)))
        .collect::<Vec<_>>()
        .join(" ")
    }

    pub fn replication_slot(&self) -> &str {
        &self.database.replication_slot
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    pub fn changes_dir(&self) -> Option<&Path> {
        self.changes_dir.as_deref()
    }

    pub fn run_dir(&self) -> Option<&Path> {
        self.run_dir.as_deref()
    }

    /// Like [`Config::log_dir`] but a missing value is a configuration error.
    pub fn require_log_dir(&self) -> Result<&Path> {
        self.log_dir()
            .ok_or_else(|| Error::Config("'log_dir' must be set.".to_string()))
    }

    /// Log the effective configuration. The password is never shown.
    pub fn log_summary(&self) {
        let db = &self.database;
        tracing::info!("Config:");
        tracing::info!("  Database:");
        tracing::info!("    Host: {}", db.host);
        tracing::info!("    Port: {}", db.port);
        tracing::info!("    Name: {}", db.dbname);
        tracing::info!("    User: {}", db.user);
        tracing::info!("    Password: (not shown)");
        tracing::info!("    Replication Slot: {}", db.replication_slot);
        tracing::info!("  Directory for log files: {}", show_dir(self.log_dir()));
        tracing::info!(
            "  Directory for change files: {}",
            show_dir(self.changes_dir())
        );
        tracing::info!("  Directory for run files: {}", show_dir(self.run_dir()));
    }
}

fn directory(value: Option<String>) -> Option<PathBuf> {
    match value {
        None => Some(PathBuf::from(DEFAULT_DIR)),
        Some(dir) if dir.is_empty() => None,
        Some(dir) => Some(PathBuf::from(dir)),
    }
}

fn show_dir(dir: Option<&Path>) -> String {
    dir.map(|d| d.display().to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}

fn strip_prefix(err: &Error) -> String {
    match err {
        Error::Config(msg) => msg.clone(),
        other => other.to_string(),
    }
}

// libpq accepts bare values only when they contain no whitespace, quotes or
// backslashes.
fn quote_conninfo_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}
