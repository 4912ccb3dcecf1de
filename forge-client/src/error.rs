//! Error types for the Forge coordinator client
//!
//! Coordinator operations never surface these directly; they classify every
//! exchange into a closed outcome enum. Errors here cover the one thing that
//! can fail before any exchange happens: constructing a transport.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for client construction
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when constructing a transport client
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured trust bundle could not be read from disk
    #[error("failed to read trust bundle {path}: {source}")]
    TrustBundleRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The trust bundle did not contain valid PEM certificates
    #[error("invalid certificate in trust bundle {path}: {source}")]
    TrustBundleInvalid {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },

    /// The underlying HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}
