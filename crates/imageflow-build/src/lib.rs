//! imageflow build stages
//!
//! Builds the base and derived disk images with Packer inside isolated
//! workspaces, exports the resulting bundles, and measures their virtual
//! size with `qemu-img` for the standalone size validation.

pub mod builder;
pub mod error;
pub mod export;
pub mod inspect;
pub mod packer;
pub mod progress;
pub mod validator;
pub mod workspace;

pub use builder::{BuiltImage, DEFINITION_SUFFIX, ImageBuilder};
pub use error::{BuildError, Result};
pub use export::{image_pattern, locate_artifact};
pub use inspect::{ImageInfo, QemuImg, SizeInspector};
pub use packer::{BuildTool, OutputMode, Packer};
pub use progress::BuildProgress;
pub use validator::SizeValidator;
pub use workspace::{BuildWorkspace, remove_stale_workspaces};
