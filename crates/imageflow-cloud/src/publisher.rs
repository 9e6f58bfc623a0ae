//! Publisher
//!
//! Uploads artifacts, checks the platform quota against what the bucket now
//! holds, then registers each upload as a compute image. The sequence is
//! fail-fast and never rolls back: uploads overwrite, so a re-run repairs a
//! partial publish, while a duplicated registration has to be cleaned up by
//! hand.

use crate::error::{CloudError, Result};
use crate::provider::{CloudPlatform, ImageRegistration, RegisteredImage};
use crate::report::{PublishEventKind, PublishReport};
use imageflow_core::{
    ArtifactRole, BuildArtifact, Ceiling, PublishTarget, SizeEntry, SizeReport,
    UPLOAD_QUOTA_BYTES,
};
use std::time::Instant;

pub struct Publisher<P: CloudPlatform> {
    platform: P,
}

impl<P: CloudPlatform> Publisher<P> {
    pub fn new(platform: P) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Upload, verify the quota, register
    pub async fn publish(
        &self,
        artifacts: &[BuildArtifact],
        target: &PublishTarget,
    ) -> Result<PublishReport> {
        let started = Instant::now();
        if artifacts.is_empty() {
            return Err(CloudError::InvalidConfig("nothing to publish".to_string()));
        }
        let mut report = PublishReport::new();

        self.ensure_authenticated().await?;
        let ordered = ordered(artifacts);
        self.upload_all(&ordered, target, &mut report).await?;
        let quota = self.verify_quota(&ordered, target, &mut report).await?;
        report.quota = Some(quota);
        self.register_all(&ordered, target, &mut report).await?;

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Fail unless the platform accepts the credentials
    pub async fn ensure_authenticated(&self) -> Result<()> {
        let status = self.platform.check_auth().await?;
        if !status.authenticated {
            return Err(CloudError::AuthenticationFailed(
                status
                    .error
                    .unwrap_or_else(|| format!("{} rejected the credentials", self.platform.display_name())),
            ));
        }
        tracing::debug!(
            platform = self.platform.name(),
            account = status.account_info.as_deref().unwrap_or("-"),
            "Authenticated"
        );
        Ok(())
    }

    /// Upload every artifact under its fixed object name, overwriting
    pub async fn upload_all(
        &self,
        artifacts: &[&BuildArtifact],
        target: &PublishTarget,
        report: &mut PublishReport,
    ) -> Result<()> {
        for artifact in artifacts {
            let object = artifact.object_name();
            self.platform
                .put_object(&target.bucket, &artifact.image, &object, true)
                .await
                .map_err(|e| CloudError::UploadFailed {
                    step: step_name(artifact.role, "upload"),
                    message: e.to_string(),
                })?;
            report.record(PublishEventKind::Uploaded {
                artifact: artifact.name.clone(),
                object,
            });
        }
        Ok(())
    }

    /// Sum the sizes of every object in the bucket and enforce the upload
    /// quota. The quota covers the whole bucket, not just this run's uploads.
    pub async fn verify_quota(
        &self,
        artifacts: &[&BuildArtifact],
        target: &PublishTarget,
        report: &mut PublishReport,
    ) -> Result<SizeReport> {
        let objects = self.platform.list_objects(&target.bucket).await?;

        for artifact in artifacts {
            let object = artifact.object_name();
            if !objects.iter().any(|o| o.name == object) {
                return Err(CloudError::ObjectMissing {
                    bucket: target.bucket.clone(),
                    name: object,
                });
            }
        }

        let entries = objects
            .into_iter()
            .map(|o| SizeEntry::new(o.name, o.size))
            .collect();
        let sizes =
            SizeReport::from_entries(entries, &format!("objects in bucket {}", target.bucket))?;
        sizes.enforce(Ceiling::Aggregate(UPLOAD_QUOTA_BYTES))?;

        report.record(PublishEventKind::QuotaVerified {
            total: sizes.total,
            ceiling: UPLOAD_QUOTA_BYTES,
        });
        Ok(sizes)
    }

    /// Register every uploaded artifact as a compute image named after it
    pub async fn register_all(
        &self,
        artifacts: &[&BuildArtifact],
        target: &PublishTarget,
        report: &mut PublishReport,
    ) -> Result<Vec<RegisteredImage>> {
        if report.quota_verified_at().is_none() {
            return Err(CloudError::InvalidConfig(
                "refusing to register images before the upload quota was verified".to_string(),
            ));
        }

        let mut images = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let request = ImageRegistration {
                compartment_id: target.compartment_id.clone(),
                display_name: artifact.name.clone(),
                bucket: target.bucket.clone(),
                object_name: artifact.object_name(),
                region: target.region.clone(),
            };
            let image = self
                .platform
                .create_image(&request)
                .await
                .map_err(|e| CloudError::RegistrationFailed {
                    step: step_name(artifact.role, "registration"),
                    message: e.to_string(),
                })?;
            report.record(PublishEventKind::Registered {
                artifact: artifact.name.clone(),
                image_id: image.id.clone(),
            });
            report.images.push(image.clone());
            images.push(image);
        }
        Ok(images)
    }
}

/// Base image first, then derived, preserving order within a role
fn ordered(artifacts: &[BuildArtifact]) -> Vec<&BuildArtifact> {
    let mut ordered: Vec<&BuildArtifact> = artifacts.iter().collect();
    ordered.sort_by_key(|a| match a.role {
        ArtifactRole::Base => 0,
        ArtifactRole::Derived => 1,
    });
    ordered
}

fn step_name(role: ArtifactRole, action: &str) -> String {
    format!("{} image {}", role, action)
}
