//! Locating the project and the credential bundle
//!
//! These are the only lookups that depend on process state (working
//! directory, home directory). Everything downstream receives explicit paths.

pub mod error;

pub use error::*;

use imageflow_core::PROJECT_FILE;
use imageflow_core::model::DEFAULT_PACKER_DIR;
use std::path::{Path, PathBuf};

/// Directory name of the OCI credential bundle under the home directory
pub const CREDENTIALS_DIR_NAME: &str = ".oci";

/// Resolve the project root
///
/// Search order:
/// 1. an explicitly given root (command line or `IMAGEFLOW_PROJECT_ROOT`), used as-is
/// 2. from `start` upwards, the first directory containing `imageflow.kdl`
/// 3. `start` itself when it contains a `packer/` directory
pub fn find_project_root(explicit: Option<&Path>, start: &Path) -> Result<PathBuf> {
    if let Some(root) = explicit {
        if root.is_dir() {
            tracing::debug!(root = %root.display(), "Using explicit project root");
            return Ok(root.to_path_buf());
        }
        return Err(ConfigError::InvalidProjectRoot(root.to_path_buf()));
    }

    let mut current = start.to_path_buf();
    loop {
        if current.join(PROJECT_FILE).is_file() {
            tracing::debug!(root = %current.display(), "Found project root ({})", PROJECT_FILE);
            return Ok(current);
        }
        if !current.pop() {
            break;
        }
    }

    if start.join(DEFAULT_PACKER_DIR).is_dir() {
        tracing::debug!(root = %start.display(), "Found project root (packer/)");
        return Ok(start.to_path_buf());
    }

    Err(ConfigError::ProjectRootNotFound(start.to_path_buf()))
}

/// Default credential bundle location: `~/.oci`
pub fn default_credentials_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(CREDENTIALS_DIR_NAME))
        .ok_or(ConfigError::HomeDirNotFound)
}
