//! Error taxonomy
//!
//! Every failure detected while composing or starting the server is fatal to
//! process start; callers propagate these with `?` and never retry.

use thiserror::Error;

/// Result alias used across the Warden crates
pub type Result<T> = std::result::Result<T, Error>;

/// Startup-fatal errors
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or inconsistent topology, unknown service names, or a
    /// decision logger that could not be constructed
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The lifecycle manager failed to bind or start a composed server
    #[error("startup error: {0}")]
    Startup(String),

    /// A gateway handler attachment failed mid-sequence
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }

    /// True for errors that indicate a bad config file rather than a runtime fault
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Json(_))
    }
}

/// Failure while attaching one service's gateway routes
#[derive(Debug, Error)]
#[error("failed to register gateway handlers for {service}: {reason}")]
pub struct RegistrationError {
    pub service: String,
    pub reason: String,
}

impl RegistrationError {
    pub fn new(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            reason: reason.into(),
        }
    }
}
