use std::time::Duration;

use shared::catalog::Track;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("catalog error ({status}): {message}")]
    Catalog { status: u16, message: String },

    #[error("search timed out after {}s", .0.as_secs_f64())]
    SearchTimeout(Duration),

    #[error("destination playlist not found: {0}")]
    PlaylistNotFound(String),

    #[error("playlist provisioning failed: {0}")]
    ProvisioningFailed(String),

    #[error("writing tracks to playlist failed: {0}")]
    WriteFailed(String),

    #[error("{} track(s) missing from playlist after write", missing.len())]
    WriteVerificationFailed { missing: Vec<Track> },

    #[error("no manual decision received before timeout")]
    ResolutionTimeout,

    #[error("no manual selection is pending")]
    NoPendingRequest,

    #[error("manual resolution channel closed")]
    ResolutionClosed,

    #[error("conversion cancelled")]
    Cancelled,

    #[error("session not found")]
    SessionNotFound,

    #[error("a conversion is already running for this session")]
    ConversionInProgress,

    #[error("source playlist {0} is not part of this session")]
    PlaylistNotInSession(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ConvertError {
    pub fn catalog(status: u16, message: impl Into<String>) -> Self {
        ConvertError::Catalog {
            status,
            message: message.into(),
        }
    }
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
