//! In-memory platform
//!
//! Stores object sizes instead of contents and keeps a trace of every call.
//! Used for dry runs and tests.

use crate::error::{CloudError, Result};
use crate::provider::{
    AuthStatus, CloudPlatform, ImageRegistration, ImageRegistry, ObjectStorage, RegisteredImage,
    StoredObject,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryPlatform {
    /// (bucket, object name) -> size
    objects: Mutex<BTreeMap<(String, String), u64>>,
    calls: Mutex<Vec<String>>,
    failing_uploads: HashSet<String>,
    failing_registrations: HashSet<String>,
    unauthenticated: bool,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make uploads of object `name` fail
    pub fn fail_upload(mut self, name: impl Into<String>) -> Self {
        self.failing_uploads.insert(name.into());
        self
    }

    /// Make registrations with display name `name` fail
    pub fn fail_registration(mut self, name: impl Into<String>) -> Self {
        self.failing_registrations.insert(name.into());
        self
    }

    pub fn unauthenticated(mut self) -> Self {
        self.unauthenticated = true;
        self
    }

    /// Pre-populate an object, e.g. one left by an earlier run
    pub fn with_object(self, bucket: &str, name: &str, size: u64) -> Self {
        self.lock_objects()
            .insert((bucket.to_string(), name.to_string()), size);
        self
    }

    /// Calls made so far, in order: `put <bucket>/<name>`, `list <bucket>`,
    /// `create <display name>`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn objects(&self, bucket: &str) -> Vec<StoredObject> {
        self.lock_objects()
            .iter()
            .filter(|((b, _), _)| b == bucket)
            .map(|((_, name), size)| StoredObject {
                name: name.clone(),
                size: *size,
            })
            .collect()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), u64>> {
        // a poisoned map is still consistent: every write is a single insert
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStorage for MemoryPlatform {
    async fn put_object(
        &self,
        bucket: &str,
        file: &Path,
        name: &str,
        overwrite: bool,
    ) -> Result<()> {
        self.record(format!("put {}/{}", bucket, name));
        if self.failing_uploads.contains(name) {
            return Err(CloudError::CommandFailed(format!(
                "upload of {} rejected",
                name
            )));
        }
        let size = tokio::fs::metadata(file).await?.len();
        let key = (bucket.to_string(), name.to_string());
        let mut objects = self.lock_objects();
        if !overwrite && objects.contains_key(&key) {
            return Err(CloudError::ObjectExists {
                bucket: bucket.to_string(),
                name: name.to_string(),
            });
        }
        objects.insert(key, size);
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<StoredObject>> {
        self.record(format!("list {}", bucket));
        Ok(self.objects(bucket))
    }
}

#[async_trait]
impl ImageRegistry for MemoryPlatform {
    async fn create_image(&self, request: &ImageRegistration) -> Result<RegisteredImage> {
        self.record(format!("create {}", request.display_name));
        if self.failing_registrations.contains(&request.display_name) {
            return Err(CloudError::CommandFailed(format!(
                "registration of {} rejected",
                request.display_name
            )));
        }
        let known = self
            .lock_objects()
            .contains_key(&(request.bucket.clone(), request.object_name.clone()));
        if !known {
            return Err(CloudError::ObjectMissing {
                bucket: request.bucket.clone(),
                name: request.object_name.clone(),
            });
        }
        Ok(RegisteredImage {
            id: format!("memory.image.{}.{}", request.region, request.display_name),
            display_name: request.display_name.clone(),
            lifecycle_state: Some("AVAILABLE".to_string()),
        })
    }
}

#[async_trait]
impl CloudPlatform for MemoryPlatform {
    fn name(&self) -> &str {
        "memory"
    }

    fn display_name(&self) -> &str {
        "In-memory (dry run)"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        if self.unauthenticated {
            Ok(AuthStatus::failed("no credentials"))
        } else {
            Ok(AuthStatus::ok("dry-run"))
        }
    }
}
