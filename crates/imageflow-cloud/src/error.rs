//! Cloud platform error types

use imageflow_core::SizeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("credential bundle unusable: {0}")]
    Credentials(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("{step} failed: {message}")]
    UploadFailed { step: String, message: String },

    #[error("{step} failed: {message}")]
    RegistrationFailed { step: String, message: String },

    #[error("upload quota check failed: {0}")]
    Quota(#[from] SizeError),

    #[error("object '{name}' missing from bucket '{bucket}' after upload")]
    ObjectMissing { bucket: String, name: String },

    #[error("object '{name}' already exists in bucket '{bucket}'")]
    ObjectExists { bucket: String, name: String },

    #[error("command execution failed: {0}")]
    CommandFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CloudError {
    /// Missing or invalid credentials: a precondition failure, never retried
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            CloudError::Credentials(_) | CloudError::AuthenticationFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
