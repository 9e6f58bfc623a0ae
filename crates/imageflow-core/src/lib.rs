//! imageflow core
//!
//! Shared data model of the image pipeline: build artifacts, the project
//! definition parsed from `imageflow.kdl`, the publish target, and the size
//! accounting routine used by both the standalone validation and the
//! publisher's quota check.

pub mod error;
pub mod model;
pub mod parser;
pub mod size;

pub use error::{FlowError, Result};
pub use model::{
    ArtifactRole, BaseRef, BuildArtifact, DISK_IMAGE_EXTENSION, ImageSpec, Project,
    PublishSettings, PublishTarget, ValidateSettings,
};
pub use parser::{PROJECT_FILE, load_project, parse_kdl_file, parse_kdl_string};
pub use size::{
    Ceiling, DEFAULT_MAX_IMAGE_SIZE_GB, GIB, SizeEntry, SizeError, SizeReport,
    UPLOAD_QUOTA_BYTES, format_gib,
};
