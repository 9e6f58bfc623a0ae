//! OCI platform implementation

use crate::credentials::CredentialBundle;
use crate::error::OciError;
use crate::oci::{CreateImageConfig, OciCli};
use async_trait::async_trait;
use imageflow_cloud::{
    AuthStatus, CloudError, CloudPlatform, ImageRegistration, ImageRegistry, ObjectStorage,
    RegisteredImage, StoredObject,
};
use std::path::Path;

/// Oracle Cloud Infrastructure: Object Storage plus custom images
pub struct OciPlatform {
    cli: OciCli,
}

impl OciPlatform {
    /// Validate the credential bundle and bind the CLI to it
    pub fn new(credentials_dir: &Path, profile: &str) -> imageflow_cloud::Result<Self> {
        let bundle = CredentialBundle::load(credentials_dir, profile)?;
        Ok(Self::with_cli(OciCli::new(bundle)))
    }

    pub fn with_cli(cli: OciCli) -> Self {
        Self { cli }
    }

    pub fn cli(&self) -> &OciCli {
        &self.cli
    }
}

#[async_trait]
impl ObjectStorage for OciPlatform {
    async fn put_object(
        &self,
        bucket: &str,
        file: &Path,
        name: &str,
        overwrite: bool,
    ) -> imageflow_cloud::Result<()> {
        if !overwrite {
            let existing = self.list_objects(bucket).await?;
            if existing.iter().any(|o| o.name == name) {
                return Err(CloudError::ObjectExists {
                    bucket: bucket.to_string(),
                    name: name.to_string(),
                });
            }
        }
        tracing::info!(bucket, object = name, file = %file.display(), "Uploading");
        self.cli.put_object(bucket, file, name).await?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> imageflow_cloud::Result<Vec<StoredObject>> {
        let objects = self.cli.list_objects(bucket).await?;
        objects
            .into_iter()
            .map(|o| match o.size {
                Some(size) => Ok(StoredObject { name: o.name, size }),
                None => Err(CloudError::from(OciError::UnexpectedOutput(format!(
                    "object {} listed without a size",
                    o.name
                )))),
            })
            .collect()
    }
}

#[async_trait]
impl ImageRegistry for OciPlatform {
    async fn create_image(
        &self,
        request: &ImageRegistration,
    ) -> imageflow_cloud::Result<RegisteredImage> {
        let config = CreateImageConfig {
            compartment_id: request.compartment_id.clone(),
            display_name: request.display_name.clone(),
            bucket: request.bucket.clone(),
            object_name: request.object_name.clone(),
            region: request.region.clone(),
        };
        tracing::info!(image = %request.display_name, region = %request.region, "Creating image");
        let image = self.cli.create_image(&config).await?;
        Ok(RegisteredImage {
            id: image.id,
            display_name: image
                .display_name
                .unwrap_or_else(|| request.display_name.clone()),
            lifecycle_state: image.lifecycle_state,
        })
    }
}

#[async_trait]
impl CloudPlatform for OciPlatform {
    fn name(&self) -> &str {
        "oci"
    }

    fn display_name(&self) -> &str {
        "Oracle Cloud Infrastructure"
    }

    async fn check_auth(&self) -> imageflow_cloud::Result<AuthStatus> {
        match self.cli.check_auth().await {
            Ok(namespace) => Ok(AuthStatus::ok(format!(
                "profile {} (namespace {})",
                self.cli.bundle().profile,
                namespace
            ))),
            Err(OciError::OciNotFound) => Ok(AuthStatus::failed("oci CLI is not installed")),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }
}
