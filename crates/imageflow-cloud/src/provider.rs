//! Cloud platform traits

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Object storage operations the publisher needs
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload `file` as object `name`. With `overwrite`, an existing object
    /// of that name is replaced.
    async fn put_object(&self, bucket: &str, file: &Path, name: &str, overwrite: bool)
    -> Result<()>;

    /// Every object currently in the bucket
    async fn list_objects(&self, bucket: &str) -> Result<Vec<StoredObject>>;
}

/// Compute image registration
#[async_trait]
pub trait ImageRegistry: Send + Sync {
    /// Declare an uploaded object as a launchable image. Not idempotent:
    /// registering the same display name twice may create two images.
    async fn create_image(&self, request: &ImageRegistration) -> Result<RegisteredImage>;
}

/// A platform providing both storage and image registration
#[async_trait]
pub trait CloudPlatform: ObjectStorage + ImageRegistry {
    /// Returns the platform name (e.g., "oci")
    fn name(&self) -> &str;

    /// Returns the platform display name for UI
    fn display_name(&self) -> &str;

    /// Check that credentials are present and usable
    async fn check_auth(&self) -> Result<AuthStatus>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// An object as reported by the storage listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub name: String,
    /// Stored size in bytes
    pub size: u64,
}

/// Request to register an uploaded object as a compute image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRegistration {
    pub compartment_id: String,
    pub display_name: String,
    pub bucket: String,
    pub object_name: String,
    pub region: String,
}

/// A registered compute image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredImage {
    pub id: String,
    pub display_name: String,
    pub lifecycle_state: Option<String>,
}
