//! Image build definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Variable the derived build receives the base image path through
pub const DEFAULT_BASE_VARIABLE: &str = "source_image";

/// One image the pipeline builds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    /// Logical artifact name
    pub name: String,

    /// Build-definition file inside the packer directory
    pub template: String,

    /// Extra `-var` overrides passed to the build
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Set for derived images
    #[serde(default)]
    pub base: Option<BaseRef>,
}

/// Reference from a derived image to the image it is built on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRef {
    /// Name of the base image
    pub image: String,

    /// Build variable carrying the base disk image path
    pub variable: String,
}

impl ImageSpec {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            variables: BTreeMap::new(),
            base: None,
        }
    }

    pub fn with_base(mut self, image: impl Into<String>) -> Self {
        self.base = Some(BaseRef {
            image: image.into(),
            variable: DEFAULT_BASE_VARIABLE.to_string(),
        });
        self
    }

    pub fn is_derived(&self) -> bool {
        self.base.is_some()
    }
}
