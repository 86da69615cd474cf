//! dashprobe Common Library
//!
//! Shared records and the error taxonomy used by the test runner and the CLI.

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result, StepError};
pub use types::*;

/// dashprobe version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default download directory used by the browser session
pub fn default_download_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("Downloads")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
