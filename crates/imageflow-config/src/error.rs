use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("home directory not found; pass --credentials explicitly")]
    HomeDirNotFound,

    #[error(
        "project root not found\n\
        search started at: {0}\n\
        hint: run inside a directory containing imageflow.kdl or a packer/ directory,\n\
        or set IMAGEFLOW_PROJECT_ROOT"
    )]
    ProjectRootNotFound(PathBuf),

    #[error("project root does not exist: {0}")]
    InvalidProjectRoot(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
