//! OCI platform error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OciError {
    #[error("oci CLI not found. Please install: https://docs.oracle.com/iaas/Content/API/SDKDocs/cliinstall.htm")]
    OciNotFound,

    #[error("credential bundle {dir}: {message}")]
    Credentials { dir: String, message: String },

    #[error("oci command failed: {0}")]
    CommandFailed(String),

    #[error("unexpected oci output: {0}")]
    UnexpectedOutput(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<OciError> for imageflow_cloud::CloudError {
    fn from(err: OciError) -> Self {
        let message = err.to_string();
        match err {
            OciError::Credentials { .. } => imageflow_cloud::CloudError::Credentials(message),
            _ => imageflow_cloud::CloudError::CommandFailed(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, OciError>;
