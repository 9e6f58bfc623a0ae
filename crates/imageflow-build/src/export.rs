//! Exported artifacts on disk
//!
//! Exported bundles live at `<artifacts>/<name>/` and hold exactly one
//! `*.qcow2` file.

use crate::error::{BuildError, Result};
use crate::workspace::copy_dir_all;
use imageflow_core::{ArtifactRole, BuildArtifact, DISK_IMAGE_EXTENSION};
use std::fs;
use std::path::{Path, PathBuf};

/// Glob pattern matching an exported artifact's disk image
pub fn image_pattern(artifacts_dir: &Path, name: &str) -> String {
    artifacts_dir
        .join(name)
        .join(format!("*.{}", DISK_IMAGE_EXTENSION))
        .display()
        .to_string()
}

/// Move a bundle to `<artifacts_dir>/<name>`
///
/// The bundle is first moved to a hidden staging directory and then
/// renamed into place, so a reader never sees a half-written export.
pub(crate) fn export_bundle(artifact: &BuildArtifact, artifacts_dir: &Path) -> Result<BuildArtifact> {
    fs::create_dir_all(artifacts_dir)?;
    let dest = artifacts_dir.join(&artifact.name);
    let staging = artifacts_dir.join(format!(".{}.partial", artifact.name));

    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    move_dir(&artifact.dir, &staging)?;
    if dest.exists() {
        fs::remove_dir_all(&dest)?;
    }
    fs::rename(&staging, &dest)?;

    tracing::info!(artifact = %artifact.name, dest = %dest.display(), "Exported artifact");
    Ok(artifact.relocated(&dest))
}

fn move_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) => {
            // different filesystem
            tracing::debug!(error = %e, "rename failed, copying {}", src.display());
            copy_dir_all(src, dst)?;
            fs::remove_dir_all(src)
        }
    }
}

/// Find an exported artifact
pub fn locate_artifact(artifacts_dir: &Path, name: &str, role: ArtifactRole) -> Result<BuildArtifact> {
    let pattern = image_pattern(artifacts_dir, name);
    let images = glob::glob(&pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect::<Vec<PathBuf>>();

    match images.as_slice() {
        [] => Err(BuildError::ArtifactNotFound(pattern)),
        [image] => Ok(BuildArtifact::new(name, role, artifacts_dir.join(name), image)),
        _ => Err(BuildError::UnexpectedOutput {
            stage: format!("{} artifact lookup", role),
            dir: artifacts_dir.join(name),
            found: images.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(root: &Path, name: &str, file: &str) -> BuildArtifact {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), name).unwrap();
        BuildArtifact::new(name, ArtifactRole::Base, &dir, dir.join(file))
    }

    #[test]
    fn test_export_replaces_previous_export() {
        let work = tempfile::tempdir().unwrap();
        let artifacts = tempfile::tempdir().unwrap();
        let stale = artifacts.path().join("base-hardened");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("old.qcow2"), "old").unwrap();

        let artifact = bundle(work.path(), "base-hardened", "base-hardened.qcow2");
        let exported = export_bundle(&artifact, artifacts.path()).unwrap();

        assert!(!stale.join("old.qcow2").exists());
        assert_eq!(fs::read_to_string(&exported.image).unwrap(), "base-hardened");
        assert!(!artifacts.path().join(".base-hardened.partial").exists());
    }

    #[test]
    fn test_locate_artifact() {
        let artifacts = tempfile::tempdir().unwrap();
        bundle(artifacts.path(), "proxmox-ampere", "proxmox-ampere.qcow2");

        let found =
            locate_artifact(artifacts.path(), "proxmox-ampere", ArtifactRole::Derived).unwrap();
        assert_eq!(found.role, ArtifactRole::Derived);
        assert!(found.image.ends_with("proxmox-ampere/proxmox-ampere.qcow2"));
    }

    #[test]
    fn test_locate_missing_artifact() {
        let artifacts = tempfile::tempdir().unwrap();
        let err = locate_artifact(artifacts.path(), "base-hardened", ArtifactRole::Base).unwrap_err();
        match err {
            BuildError::ArtifactNotFound(pattern) => {
                assert!(pattern.ends_with("base-hardened/*.qcow2"))
            }
            other => panic!("expected ArtifactNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_locate_ambiguous_artifact() {
        let artifacts = tempfile::tempdir().unwrap();
        bundle(artifacts.path(), "base-hardened", "a.qcow2");
        fs::write(artifacts.path().join("base-hardened").join("b.qcow2"), "b").unwrap();
        assert!(matches!(
            locate_artifact(artifacts.path(), "base-hardened", ArtifactRole::Base),
            Err(BuildError::UnexpectedOutput { found: 2, .. })
        ));
    }
}
