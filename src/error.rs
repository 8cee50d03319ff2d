use thiserror::Error;

/// Unified error type for the torpool orchestrator
#[derive(Error, Debug)]
pub enum TorPoolError {
    // Startup errors
    #[error("Launch failed: {0}")]
    Launch(String),

    #[error("Control authentication failed: {0}")]
    ControlAuth(String),

    #[error("Control protocol error: {0}")]
    ControlProtocol(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for torpool operations
pub type Result<T> = std::result::Result<T, TorPoolError>;

impl TorPoolError {
    /// Check if this error occurred while bringing the cluster up
    ///
    /// Startup errors abort the whole sequence; the caller proceeds
    /// straight to teardown.
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            TorPoolError::Launch(_) | TorPoolError::ControlAuth(_)
        )
    }
}
