//! Standalone size validation of local artifacts
//!
//! Advisory: the publisher repeats its own quota check regardless of the
//! outcome here.

use crate::error::{BuildError, Result};
use crate::export::{image_pattern, locate_artifact};
use crate::inspect::SizeInspector;
use imageflow_core::{ArtifactRole, BuildArtifact, Ceiling, SizeEntry, SizeError, SizeReport};
use std::path::Path;

pub struct SizeValidator<I: SizeInspector> {
    inspector: I,
}

impl<I: SizeInspector> SizeValidator<I> {
    pub fn new(inspector: I) -> Self {
        Self { inspector }
    }

    /// Virtual size of every artifact and their sum
    pub async fn measure(&self, artifacts: &[BuildArtifact]) -> Result<SizeReport> {
        let mut entries = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let bytes = self.inspector.virtual_size(&artifact.image).await?;
            tracing::debug!(artifact = %artifact.name, bytes, "Measured virtual size");
            entries.push(SizeEntry::new(&artifact.name, bytes));
        }
        Ok(SizeReport::from_entries(entries, "the given artifacts")?)
    }

    /// Measure and enforce every ceiling
    pub async fn validate(
        &self,
        artifacts: &[BuildArtifact],
        ceilings: &[Ceiling],
    ) -> Result<SizeReport> {
        let report = self.measure(artifacts).await?;
        report.enforce_all(ceilings)?;
        Ok(report)
    }

    /// Locate the named artifacts under `artifacts_dir`, then validate them.
    /// Any expected artifact that is missing is a "not found" error.
    pub async fn validate_exported(
        &self,
        artifacts_dir: &Path,
        expected: &[(&str, ArtifactRole)],
        ceilings: &[Ceiling],
    ) -> Result<SizeReport> {
        if expected.is_empty() {
            return Err(SizeError::NotFound {
                pattern: image_pattern(artifacts_dir, "*"),
            }
            .into());
        }
        let mut artifacts = Vec::with_capacity(expected.len());
        for (name, role) in expected {
            match locate_artifact(artifacts_dir, name, *role) {
                Ok(artifact) => artifacts.push(artifact),
                Err(BuildError::ArtifactNotFound(pattern)) => {
                    return Err(SizeError::NotFound { pattern }.into());
                }
                Err(e) => return Err(e),
            }
        }
        self.validate(&artifacts, ceilings).await
    }
}
