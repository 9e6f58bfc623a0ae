//! Project definition

use super::image::ImageSpec;
use crate::error::{FlowError, Result};
use crate::size::DEFAULT_MAX_IMAGE_SIZE_GB;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_PACKER_DIR: &str = "packer";
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
pub const DEFAULT_OUTPUT_DIR: &str = "output-qemu";
pub const DEFAULT_REGION: &str = "uk-london-1";
pub const DEFAULT_PROFILE: &str = "DEFAULT";

/// Project - the image pipeline blueprint
///
/// Paths are relative to the project root unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,

    /// Directory holding the build-definition files
    pub packer_dir: PathBuf,

    /// Directory exported artifacts are written to, one subdirectory per image
    pub artifacts_dir: PathBuf,

    /// Directory the build tool writes its disk image into, relative to the build workspace
    pub output_dir: String,

    pub images: Vec<ImageSpec>,

    #[serde(default)]
    pub publish: PublishSettings,

    #[serde(default)]
    pub validate: ValidateSettings,
}

/// Publish settings as written in the project file; any of them may be
/// supplied later on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishSettings {
    pub bucket: Option<String>,
    pub compartment: Option<String>,
    pub region: String,
    /// Profile selected in the credential bundle's config file
    pub profile: String,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            bucket: None,
            compartment: None,
            region: DEFAULT_REGION.to_string(),
            profile: DEFAULT_PROFILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateSettings {
    /// Per-image ceiling of the standalone validation, in GiB
    pub max_image_size_gb: u64,
}

impl Default for ValidateSettings {
    fn default() -> Self {
        Self {
            max_image_size_gb: DEFAULT_MAX_IMAGE_SIZE_GB,
        }
    }
}

/// Where artifacts are uploaded and under which identity they are registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTarget {
    pub bucket: String,
    pub compartment_id: String,
    pub region: String,
}

impl PublishTarget {
    pub fn new(
        bucket: impl Into<String>,
        compartment_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self> {
        let target = Self {
            bucket: bucket.into(),
            compartment_id: compartment_id.into(),
            region: region.into(),
        };
        for (field, value) in [
            ("bucket", &target.bucket),
            ("compartment", &target.compartment_id),
            ("region", &target.region),
        ] {
            if value.trim().is_empty() {
                return Err(FlowError::InvalidConfig(format!(
                    "publish target {} must not be empty",
                    field
                )));
            }
        }
        Ok(target)
    }
}

impl PublishSettings {
    /// Merge command-line overrides and build the publish target
    pub fn resolve_target(
        &self,
        bucket: Option<&str>,
        compartment: Option<&str>,
        region: Option<&str>,
    ) -> Result<PublishTarget> {
        let bucket = bucket
            .or(self.bucket.as_deref())
            .ok_or(FlowError::MissingPublishSetting("bucket"))?;
        let compartment = compartment
            .or(self.compartment.as_deref())
            .ok_or(FlowError::MissingPublishSetting("compartment"))?;
        let region = region.unwrap_or(&self.region);
        PublishTarget::new(bucket, compartment, region)
    }
}

impl Project {
    /// Layout used when no project file exists: a `packer/` directory with
    /// `base-hardened.pkr.hcl` and `proxmox-ampere.pkr.hcl`.
    pub fn default_layout(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            packer_dir: PathBuf::from(DEFAULT_PACKER_DIR),
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            images: vec![
                ImageSpec::new("base-hardened", "base-hardened.pkr.hcl"),
                ImageSpec::new("proxmox-ampere", "proxmox-ampere.pkr.hcl")
                    .with_base("base-hardened"),
            ],
            publish: PublishSettings::default(),
            validate: ValidateSettings::default(),
        }
    }

    /// The single image without a base
    pub fn base_image(&self) -> Result<&ImageSpec> {
        let mut bases = self.images.iter().filter(|i| !i.is_derived());
        let base = bases
            .next()
            .ok_or_else(|| FlowError::MissingImage("base image".to_string()))?;
        if let Some(extra) = bases.next() {
            return Err(FlowError::InvalidConfig(format!(
                "only one base image is supported, found '{}' and '{}'",
                base.name, extra.name
            )));
        }
        Ok(base)
    }

    /// The single image built on the base image
    pub fn derived_image(&self) -> Result<&ImageSpec> {
        let mut derived = self.images.iter().filter(|i| i.is_derived());
        let image = derived
            .next()
            .ok_or_else(|| FlowError::MissingImage("derived image".to_string()))?;
        if let Some(extra) = derived.next() {
            return Err(FlowError::InvalidConfig(format!(
                "only one derived image is supported, found '{}' and '{}'",
                image.name, extra.name
            )));
        }
        Ok(image)
    }

    /// Check the image graph: one base, one derived image built on it,
    /// unique names and non-empty templates.
    pub fn validate(&self) -> Result<()> {
        // build workspaces are created under the artifacts directory and
        // hold a copy of the packer directory
        if lexical(&self.artifacts_dir).starts_with(lexical(&self.packer_dir)) {
            return Err(FlowError::InvalidConfig(format!(
                "artifacts directory {} must not be inside the packer directory {}",
                self.artifacts_dir.display(),
                self.packer_dir.display()
            )));
        }

        for (i, image) in self.images.iter().enumerate() {
            if image.template.trim().is_empty() {
                return Err(FlowError::InvalidConfig(format!(
                    "image '{}' requires a template",
                    image.name
                )));
            }
            if self.images[..i].iter().any(|other| other.name == image.name) {
                return Err(FlowError::InvalidConfig(format!(
                    "image '{}' is defined twice",
                    image.name
                )));
            }
        }

        let base = self.base_image()?;
        let derived = self.derived_image()?;
        if let Some(base_ref) = &derived.base
            && base_ref.image != base.name
        {
            return Err(FlowError::InvalidConfig(format!(
                "image '{}' is built on '{}', which is not the base image '{}'",
                derived.name, base_ref.image, base.name
            )));
        }
        Ok(())
    }
}

/// `path` without `.` components
fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
