//! Data model
//!
//! Build artifacts, image definitions, and the project and publish target
//! that tie them together.

mod artifact;
mod image;
mod project;

pub use artifact::{ArtifactRole, BuildArtifact, DISK_IMAGE_EXTENSION};
pub use image::{BaseRef, DEFAULT_BASE_VARIABLE, ImageSpec};
pub use project::{
    DEFAULT_ARTIFACTS_DIR, DEFAULT_OUTPUT_DIR, DEFAULT_PACKER_DIR, DEFAULT_PROFILE,
    DEFAULT_REGION, Project, PublishSettings, PublishTarget, ValidateSettings,
};
