//! Error taxonomy shared by the catalog, session engine and history recorder.
//!
//! Storage plumbing reports `anyhow::Error`. Failures a caller can act on travel
//! inside it as a [`ServiceError`] and are recovered by downcast when a command
//! converts the result into a [`CommandError`].

use std::fmt;

use log::error;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// A circuit or session that the caller referenced does not exist.
    #[error("{0}")]
    NotFound(String),
    /// A payload field is malformed or out of range. Always raised before commit.
    #[error("{0}")]
    Validation(String),
}

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn circuit_not_found() -> Self {
        Self::not_found("Circuit not found")
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 422,
        }
    }
}

/// Transport-neutral failure returned by the command surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandError {
    pub status: u16,
    pub message: String,
}

impl CommandError {
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_validation(&self) -> bool {
        self.status == 422
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for CommandError {}

impl From<ServiceError> for CommandError {
    fn from(err: ServiceError) -> Self {
        Self {
            status: err.status_code(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for CommandError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<ServiceError>() {
            Some(service_err) => service_err.clone().into(),
            None => {
                error!("Command failed: {err:#}");
                Self {
                    status: 500,
                    message: err.to_string(),
                }
            }
        }
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::validation(format!("Invalid payload: {err}")).into()
    }
}
