// ABOUTME: Library root for osm-changefeed
// ABOUTME: Exposes the log extraction and diff assembly stages shared by the binaries

pub mod assemble;
pub mod commands;
pub mod config;
pub mod durable;
pub mod error;
pub mod extract;
pub mod lock;
pub mod logfile;
pub mod lsn;
pub mod osm;
pub mod postgres;
pub mod reconstruct;
pub mod store;
pub mod users;

pub use error::{Error, Result};
pub use lsn::Lsn;
