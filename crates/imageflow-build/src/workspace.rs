//! Isolated build workspaces
//!
//! Each build runs in a scratch copy of the configuration directory, so the
//! tool's side effects never reach the source tree. The workspace is removed
//! when dropped, taking any partial output with it.

use crate::error::{BuildError, Result};
use imageflow_core::{ArtifactRole, BuildArtifact, DISK_IMAGE_EXTENSION};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Directory inside the workspace the base image is staged into
pub const BASE_STAGING_DIR: &str = "base";

/// Name prefix of scratch workspaces
pub const WORKSPACE_PREFIX: &str = ".imageflow-build-";

pub struct BuildWorkspace {
    dir: TempDir,
}

impl BuildWorkspace {
    /// Create a workspace under `scratch_root` holding a copy of `config_dir`
    pub fn prepare(config_dir: &Path, scratch_root: &Path) -> Result<Self> {
        fs::create_dir_all(scratch_root)?;
        if scratch_root.canonicalize()?.starts_with(config_dir.canonicalize()?) {
            return Err(BuildError::InvalidConfig(format!(
                "{} is inside {}; the workspace would copy itself",
                scratch_root.display(),
                config_dir.display()
            )));
        }
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(scratch_root)?;
        tracing::debug!(
            from = %config_dir.display(),
            workspace = %dir.path().display(),
            "Preparing build workspace"
        );
        copy_dir_all(config_dir, dir.path())?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Copy the base artifact's disk image into the workspace and return its
    /// path there. This path is the only thing the derived build learns
    /// about the base artifact.
    pub fn stage_base_image(&self, base: &BuildArtifact) -> Result<PathBuf> {
        if !base.image.is_file() {
            return Err(BuildError::BaseImageNotFound(base.image.clone()));
        }
        let staging = self.path().join(BASE_STAGING_DIR);
        fs::create_dir_all(&staging)?;
        let file_name = base
            .image_file_name()
            .map(str::to_string)
            .unwrap_or_else(|| base.object_name());
        let target = staging.join(file_name);
        fs::copy(&base.image, &target)?;
        Ok(target)
    }

    /// Find the single disk image the build wrote to `output_dir`
    pub fn collect_output(
        &self,
        output_dir: &str,
        name: &str,
        role: ArtifactRole,
    ) -> Result<BuildArtifact> {
        let dir = self.path().join(output_dir);
        let images = disk_images_in(&dir)?;
        match images.as_slice() {
            [image] => Ok(BuildArtifact::new(name, role, &dir, image)),
            _ => Err(BuildError::UnexpectedOutput {
                stage: format!("{} image build", role),
                dir,
                found: images.len(),
            }),
        }
    }
}

/// Remove workspaces and export staging directories an interrupted run left
/// in `scratch_root`. Returns how many were removed.
pub fn remove_stale_workspaces(scratch_root: &Path) -> Result<usize> {
    if !scratch_root.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(scratch_root)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let stale = name.starts_with(WORKSPACE_PREFIX)
            || (name.starts_with('.') && name.ends_with(".partial"));
        if stale && entry.file_type()?.is_dir() {
            tracing::info!(dir = %entry.path().display(), "Removing stale build directory");
            fs::remove_dir_all(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Disk image files directly inside `dir`, sorted. A missing directory has none.
pub fn disk_images_in(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(DISK_IMAGE_EXTENSION)
        {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Recursively copy `src` into `dst`
pub(crate) fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}
