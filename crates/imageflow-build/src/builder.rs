//! Base and derived image builders

use crate::error::{BuildError, Result};
use crate::export;
use crate::packer::BuildTool;
use crate::workspace::BuildWorkspace;
use imageflow_core::{ArtifactRole, BuildArtifact, ImageSpec};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Extension of the build-definition files
pub const DEFINITION_SUFFIX: &str = ".pkr.hcl";

/// An image that finished building but still lives in its workspace
///
/// Dropping it discards the build. [`BuiltImage::export`] moves it out.
pub struct BuiltImage {
    artifact: BuildArtifact,
    workspace: BuildWorkspace,
}

impl BuiltImage {
    pub fn artifact(&self) -> &BuildArtifact {
        &self.artifact
    }

    /// Move the artifact bundle to `<artifacts_dir>/<name>`, replacing a
    /// previous export of the same name
    pub fn export(self, artifacts_dir: &Path) -> Result<BuildArtifact> {
        let exported = export::export_bundle(&self.artifact, artifacts_dir)?;
        drop(self.workspace);
        Ok(exported)
    }
}

/// Runs the build tool for the pipeline's images
pub struct ImageBuilder<T: BuildTool> {
    tool: T,
    config_dir: PathBuf,
    scratch_dir: PathBuf,
    output_dir: String,
}

impl<T: BuildTool> ImageBuilder<T> {
    /// * `config_dir` - directory holding the build-definition files
    /// * `scratch_dir` - where build workspaces are created
    /// * `output_dir` - directory the tool writes its image to, relative to the workspace
    pub fn new(
        tool: T,
        config_dir: impl Into<PathBuf>,
        scratch_dir: impl Into<PathBuf>,
        output_dir: impl Into<String>,
    ) -> Self {
        Self {
            tool,
            config_dir: config_dir.into(),
            scratch_dir: scratch_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    /// Check the configuration directory before anything runs: it must
    /// exist, hold at least one build definition, and hold the image's template.
    pub fn check_definitions(&self, image: &ImageSpec) -> Result<()> {
        if !self.config_dir.is_dir() {
            return Err(BuildError::ConfigDirNotFound(self.config_dir.clone()));
        }

        let mut has_definition = false;
        for entry in std::fs::read_dir(&self.config_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file()
                && entry.file_name().to_string_lossy().ends_with(DEFINITION_SUFFIX)
            {
                has_definition = true;
                break;
            }
        }
        if !has_definition {
            return Err(BuildError::NoDefinitions(self.config_dir.clone()));
        }

        let template = self.config_dir.join(&image.template);
        if !template.is_file() {
            return Err(BuildError::DefinitionNotFound(template));
        }
        Ok(())
    }

    /// Build the base image from configuration alone
    pub async fn build_base(&self, image: &ImageSpec) -> Result<BuiltImage> {
        if image.is_derived() {
            return Err(BuildError::InvalidConfig(format!(
                "'{}' is a derived image, not a base image",
                image.name
            )));
        }
        self.check_definitions(image)?;

        let workspace = BuildWorkspace::prepare(&self.config_dir, &self.scratch_dir)?;
        let variables = build_variables(image, None);
        self.run(image, ArtifactRole::Base, workspace, variables)
            .await
    }

    /// Build the derived image on top of `base`
    ///
    /// The base image path reaches the build only as the variable named by
    /// the image's base reference; there is no implicit default base.
    pub async fn build_derived(
        &self,
        image: &ImageSpec,
        base: Option<&BuildArtifact>,
    ) -> Result<BuiltImage> {
        let base = base.ok_or_else(|| BuildError::MissingBaseArtifact {
            image: image.name.clone(),
        })?;
        let base_ref = image.base.as_ref().ok_or_else(|| {
            BuildError::InvalidConfig(format!("'{}' has no base image", image.name))
        })?;
        if base_ref.image != base.name {
            return Err(BuildError::InvalidConfig(format!(
                "'{}' is built on '{}', got artifact '{}'",
                image.name, base_ref.image, base.name
            )));
        }
        if !base.image.is_file() {
            return Err(BuildError::BaseImageNotFound(base.image.clone()));
        }
        self.check_definitions(image)?;

        let workspace = BuildWorkspace::prepare(&self.config_dir, &self.scratch_dir)?;
        let staged = workspace.stage_base_image(base)?;
        let variables = build_variables(image, Some((&base_ref.variable, &staged)));
        self.run(image, ArtifactRole::Derived, workspace, variables)
            .await
    }

    async fn run(
        &self,
        image: &ImageSpec,
        role: ArtifactRole,
        workspace: BuildWorkspace,
        variables: BTreeMap<String, String>,
    ) -> Result<BuiltImage> {
        let stage = format!("{} image build", role);
        tracing::info!(image = %image.name, tool = self.tool.name(), "Starting {}", stage);

        self.tool
            .init(workspace.path())
            .await
            .map_err(|e| e.in_stage(&stage))?;
        self.tool
            .build(workspace.path(), &image.template, &variables)
            .await
            .map_err(|e| e.in_stage(&stage))?;

        let artifact = workspace
            .collect_output(&self.output_dir, &image.name, role)
            .map_err(|e| e.in_stage(&stage))?;
        tracing::info!(image = %image.name, path = %artifact.image.display(), "Finished {}", stage);

        Ok(BuiltImage {
            artifact,
            workspace,
        })
    }
}

/// Variables passed to the build: `headless=true`, then the image's own
/// overrides, then the base image path for derived builds
fn build_variables(image: &ImageSpec, base: Option<(&String, &PathBuf)>) -> BTreeMap<String, String> {
    let mut variables = BTreeMap::new();
    variables.insert("headless".to_string(), "true".to_string());
    variables.extend(image.variables.clone());
    if let Some((name, path)) = base {
        variables.insert(name.clone(), path.display().to_string());
    }
    variables
}
