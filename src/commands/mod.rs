// ABOUTME: Entry points for the extract-log, assemble-diff and check-db binaries
// ABOUTME: Shared argument handling, logging setup and exit-code mapping

pub mod assemble_diff;
pub mod check_db;
pub mod extract_log;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser};

use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::error::Error;

/// Options every tool accepts.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Config file
    #[arg(
        short = 'c',
        long = "config",
        env = "OSM_CHANGEFEED_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log: String,
    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl CommonArgs {
    /// Initialize logging to stderr.
    ///
    /// `--quiet` wins, then `RUST_LOG`, then `--log`.
    pub fn init_logging(&self) {
        let env_filter = if self.quiet {
            tracing_subscriber::EnvFilter::new("warn")
        } else {
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(self.log.clone()))
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    pub fn load_config(&self) -> anyhow::Result<Config> {
        tracing::info!("Reading config from {:?}", self.config);
        let config = Config::load(&self.config)
            .with_context(|| format!("Failed to load config from {:?}", self.config))?;
        config.log_summary();
        Ok(config)
    }
}

/// Parse the command line, or report why not.
///
/// `--help` and `--version` exit 0; anything else clap rejects exits with
/// `usage_exit`.
pub fn parse_args<P: Parser>(usage_exit: u8) -> Result<P, ExitCode> {
    P::try_parse().map_err(|e| {
        let code = if e.use_stderr() { usage_exit } else { 0 };
        let _ = e.print();
        ExitCode::from(code)
    })
}

/// Exit code for a failed run: the code of the first typed error in the
/// chain, 2 if there is none.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(Error::exit_code)
        .unwrap_or(2)
}

/// Print the error chain the way the tools report failures.
pub fn report(err: &anyhow::Error) {
    eprintln!("Error: {:#}", err);
}
