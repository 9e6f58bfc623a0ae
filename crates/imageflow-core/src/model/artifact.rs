//! Build artifacts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// File extension of the disk images produced by the build tool
pub const DISK_IMAGE_EXTENSION: &str = "qcow2";

/// Position of an artifact in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    /// Hardened base image, built from configuration only
    Base,
    /// Image built on top of the base artifact
    Derived,
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactRole::Base => write!(f, "base"),
            ArtifactRole::Derived => write!(f, "derived"),
        }
    }
}

/// A built disk image and the directory bundle holding it
///
/// The bundle contains exactly one disk image plus optional sidecar files.
/// Once handed downstream it is only ever read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    /// Logical name, e.g. "base-hardened"
    pub name: String,

    pub role: ArtifactRole,

    /// Bundle directory
    pub dir: PathBuf,

    /// The disk image inside `dir`
    pub image: PathBuf,
}

impl BuildArtifact {
    pub fn new(
        name: impl Into<String>,
        role: ArtifactRole,
        dir: impl Into<PathBuf>,
        image: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            dir: dir.into(),
            image: image.into(),
        }
    }

    /// File name of the disk image
    pub fn image_file_name(&self) -> Option<&str> {
        self.image.file_name().and_then(|n| n.to_str())
    }

    /// Fixed object name used when the image is uploaded
    pub fn object_name(&self) -> String {
        format!("{}.{}", self.name, DISK_IMAGE_EXTENSION)
    }

    /// Re-root the artifact at another bundle directory, keeping the image file name
    pub fn relocated(&self, dir: &Path) -> Self {
        let image = match self.image.file_name() {
            Some(file) => dir.join(file),
            None => dir.join(self.object_name()),
        };
        Self {
            name: self.name.clone(),
            role: self.role,
            dir: dir.to_path_buf(),
            image,
        }
    }
}
