use thiserror::Error;

/// Failures opening or reading a location provider.
#[derive(Debug, Error)]
pub enum LocationError {
    /// The OS refused access to the receiver.
    #[error("location permission denied: {0}")]
    PermissionDenied(String),

    /// No receiver at the configured path, or it vanished.
    #[error("location provider unavailable: {0}")]
    Unavailable(String),

    #[error("location provider I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LocationError {
    pub(crate) fn from_open(what: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => LocationError::PermissionDenied(what.to_string()),
            std::io::ErrorKind::NotFound => LocationError::Unavailable(what.to_string()),
            _ => LocationError::Io(err),
        }
    }
}
