use thiserror::Error;

/// Project configuration errors
///
/// Every variant is a configuration error in the pipeline's taxonomy:
/// fatal, never retried.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("failed to read project file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("image not defined: {0}")]
    MissingImage(String),

    #[error("missing publish setting '{0}' (set it in imageflow.kdl or pass it on the command line)")]
    MissingPublishSetting(&'static str),
}

pub type Result<T> = std::result::Result<T, FlowError>;
