//! Error types for supplyscan.
//!
//! The taxonomy follows the propagation policy of the scanner: only invalid
//! caller input and cache-directory initialisation are fatal. Lockfile and
//! feed parse failures are logged and skipped by their callers; network and
//! rate-limit failures are recorded per source and never abort a scan.

use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All error scenarios the scanner core can produce.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid caller input (missing required field, bad scan root).
    #[error("invalid input: {0}")]
    Input(String),

    /// Malformed lockfile or feed payload.
    #[error("parse error: {path}: {reason}")]
    Parse {
        /// File path or feed identifier the payload came from.
        path: String,
        /// Why parsing failed.
        reason: String,
    },

    /// HTTP transport failure talking to a feed or the audit registry.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A feed answered 403 or 429.
    #[error("rate limited by {feed} (status {status})")]
    RateLimited {
        /// Source identifier of the throttling feed.
        feed: String,
        /// HTTP status code that triggered this.
        status: u16,
    },

    /// Cache file I/O failure. Non-fatal: writes are logged and dropped,
    /// reads are treated as cache absence.
    #[error("cache error: {path}: {source}")]
    Cache {
        /// The cache file involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Cache directory could not be initialised. Aborts startup.
    #[error("initialisation failed: {0}")]
    Init(String),
}

impl Error {
    /// Builds a parse error from anything path-like and reason-like.
    pub fn parse(path: impl Into<String>, reason: impl ToString) -> Self {
        Error::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
