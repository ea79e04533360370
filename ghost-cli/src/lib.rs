//! # Ghost CLI
//!
//! Host environment for the Ghost offline proxy: a local HTTP front that
//! deploys one proxy version at startup and answers every request through it.

pub mod cli;
pub mod config;
pub mod error;
pub mod server;

pub use cli::CliArgs;
pub use config::{AppConfig, StorageConfig, StorageKind};
pub use error::{AppError, Result};
pub use server::{CACHE_STATUS_HEADER, ProxyServer};
