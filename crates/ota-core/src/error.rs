//! Errors surfaced by an update run.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::http::HttpError;
use crate::resolver::ResolveError;

/// Step of the transfer a network failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStep {
    Connect,
    Identity,
    Upload,
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStep::Connect => write!(f, "Connect"),
            TransferStep::Identity => write!(f, "Identity check"),
            TransferStep::Upload => write!(f, "Upload"),
        }
    }
}

#[derive(Error, Debug)]
pub enum OtaError {
    #[error("host or espid must be specified")]
    MissingTarget,

    #[error("Resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("{step} against {host} failed: {source}")]
    Http {
        step: TransferStep,
        host: String,
        source: HttpError,
    },

    #[error("Device at {host} sent an invalid identity payload: {message}")]
    InvalidIdentity { host: String, message: String },

    #[error("ESP ID mismatch: wanted {wanted}, got {got}")]
    IdentityMismatch { wanted: String, got: String },

    #[error("Failed to read firmware {}: {source}", .path.display())]
    FirmwareRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl OtaError {
    pub(crate) fn http(step: TransferStep, host: &str, source: HttpError) -> Self {
        OtaError::Http {
            step,
            host: host.to_string(),
            source,
        }
    }
}
