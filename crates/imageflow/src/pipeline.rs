//! Pipeline driver
//!
//! Named stage functions over explicit configuration. Each stage takes and
//! returns model types and records an event, so a run can be inspected after
//! the fact. Nothing here reads the environment.

use anyhow::Context;
use chrono::{DateTime, Utc};
use imageflow_build::{
    BuildTool, ImageBuilder, OutputMode, Packer, QemuImg, SizeInspector, SizeValidator,
    locate_artifact, remove_stale_workspaces,
};
use imageflow_cloud::{CloudPlatform, PublishReport, Publisher};
use imageflow_core::{
    ArtifactRole, BuildArtifact, Ceiling, Project, PublishTarget, SizeReport, UPLOAD_QUOTA_BYTES,
};
use std::fmt;
use std::path::PathBuf;

/// Everything a run needs, resolved up front
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Project root; relative project paths are resolved against it
    pub root: PathBuf,
    pub project: Project,
    pub packer: PathBuf,
    pub qemu_img: PathBuf,
    pub output: OutputMode,
}

impl PipelineConfig {
    pub fn new(root: impl Into<PathBuf>, project: Project) -> Self {
        Self {
            root: root.into(),
            project,
            packer: PathBuf::from("packer"),
            qemu_img: PathBuf::from("qemu-img"),
            output: OutputMode::default(),
        }
    }

    pub fn packer_dir(&self) -> PathBuf {
        self.root.join(&self.project.packer_dir)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join(&self.project.artifacts_dir)
    }

    /// Ceilings of the standalone validation
    pub fn ceilings(&self, max_image_size_gb: Option<u64>) -> Vec<Ceiling> {
        let per_image =
            max_image_size_gb.unwrap_or(self.project.validate.max_image_size_gb);
        vec![
            Ceiling::per_image_gb(per_image),
            Ceiling::Aggregate(UPLOAD_QUOTA_BYTES),
        ]
    }
}

/// Pipeline stages, named as they appear in messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BuildBase,
    BuildDerived,
    Validate,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::BuildBase => "base image build",
            Stage::BuildDerived => "derived image build",
            Stage::Validate => "size validation",
            Stage::Upload => "upload",
        };
        f.write_str(label)
    }
}

/// Error context naming the failed stage
#[derive(Debug, Clone, Copy)]
pub struct StageFailed(pub Stage);

impl fmt::Display for StageFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed { detail: String },
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct StageEvent {
    pub at: DateTime<Utc>,
    pub stage: Stage,
    pub outcome: StageOutcome,
}

/// A pipeline bound to its tools
pub struct Pipeline<T: BuildTool, I: SizeInspector> {
    config: PipelineConfig,
    builder: ImageBuilder<T>,
    validator: SizeValidator<I>,
    events: Vec<StageEvent>,
}

impl Pipeline<Packer, QemuImg> {
    /// Pipeline running the real `packer` and `qemu-img`
    pub fn new(config: PipelineConfig) -> Self {
        let packer = Packer::new(&config.packer).with_output(config.output);
        let qemu_img = QemuImg::new(&config.qemu_img);
        Self::with_tools(config, packer, qemu_img)
    }
}

impl<T: BuildTool, I: SizeInspector> Pipeline<T, I> {
    pub fn with_tools(config: PipelineConfig, tool: T, inspector: I) -> Self {
        // scratch workspaces live next to the exports so the final move is a rename
        let builder = ImageBuilder::new(
            tool,
            config.packer_dir(),
            config.artifacts_dir(),
            config.project.output_dir.clone(),
        );
        Self {
            config,
            builder,
            validator: SizeValidator::new(inspector),
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn events(&self) -> &[StageEvent] {
        &self.events
    }

    /// Build and export the base image
    pub async fn build_base(&mut self) -> anyhow::Result<BuildArtifact> {
        let result = self.run_build_base().await;
        self.finish(Stage::BuildBase, result, |a| a.image.display().to_string())
    }

    async fn run_build_base(&self) -> anyhow::Result<BuildArtifact> {
        self.remove_stale()?;
        let image = self.config.project.base_image()?;
        let built = self.builder.build_base(image).await?;
        Ok(built.export(&self.config.artifacts_dir())?)
    }

    /// Build and export the derived image on top of `base`
    pub async fn build_derived(
        &mut self,
        base: Option<&BuildArtifact>,
    ) -> anyhow::Result<BuildArtifact> {
        let result = self.run_build_derived(base).await;
        self.finish(Stage::BuildDerived, result, |a| {
            a.image.display().to_string()
        })
    }

    async fn run_build_derived(&self, base: Option<&BuildArtifact>) -> anyhow::Result<BuildArtifact> {
        self.remove_stale()?;
        let image = self.config.project.derived_image()?;
        let built = self.builder.build_derived(image, base).await?;
        Ok(built.export(&self.config.artifacts_dir())?)
    }

    /// Leftovers of an interrupted build hold full disk images
    fn remove_stale(&self) -> anyhow::Result<()> {
        let removed = remove_stale_workspaces(&self.config.artifacts_dir())?;
        if removed > 0 {
            tracing::warn!(removed, "Removed build directories left by an interrupted run");
        }
        Ok(())
    }

    /// The base artifact exported by an earlier run, if any
    pub fn exported_base(&self) -> anyhow::Result<Option<BuildArtifact>> {
        let base = self.config.project.base_image()?;
        match locate_artifact(&self.config.artifacts_dir(), &base.name, ArtifactRole::Base) {
            Ok(artifact) => Ok(Some(artifact)),
            Err(imageflow_build::BuildError::ArtifactNotFound(pattern)) => {
                tracing::debug!(%pattern, "No exported base artifact");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Both exported artifacts, base first
    pub fn exported_artifacts(&self) -> anyhow::Result<Vec<BuildArtifact>> {
        let artifacts_dir = self.config.artifacts_dir();
        let mut artifacts = Vec::with_capacity(2);
        for (image, role) in self.expected_artifacts()? {
            artifacts.push(locate_artifact(&artifacts_dir, image, role)?);
        }
        Ok(artifacts)
    }

    fn expected_artifacts(&self) -> anyhow::Result<[(&str, ArtifactRole); 2]> {
        let project = &self.config.project;
        Ok([
            (project.base_image()?.name.as_str(), ArtifactRole::Base),
            (project.derived_image()?.name.as_str(), ArtifactRole::Derived),
        ])
    }

    /// Measure the exported artifacts against `ceilings`
    pub async fn validate(&mut self, ceilings: &[Ceiling]) -> anyhow::Result<SizeReport> {
        let result = self.run_validate(ceilings).await;
        self.finish(Stage::Validate, result, |r| r.to_string())
    }

    async fn run_validate(&self, ceilings: &[Ceiling]) -> anyhow::Result<SizeReport> {
        let expected = self.expected_artifacts()?;
        Ok(self
            .validator
            .validate_exported(&self.config.artifacts_dir(), &expected, ceilings)
            .await?)
    }

    /// Upload the exported artifacts, verify the quota and register them
    pub async fn publish<P: CloudPlatform>(
        &mut self,
        publisher: &Publisher<P>,
        target: &PublishTarget,
    ) -> anyhow::Result<PublishReport> {
        let result = self.run_publish(publisher, target).await;
        self.finish(Stage::Upload, result, |r| {
            format!("{} images registered", r.images.len())
        })
    }

    async fn run_publish<P: CloudPlatform>(
        &self,
        publisher: &Publisher<P>,
        target: &PublishTarget,
    ) -> anyhow::Result<PublishReport> {
        let artifacts = self.exported_artifacts()?;
        Ok(publisher.publish(&artifacts, target).await?)
    }

    /// Record the outcome of a stage and attach the stage to its error
    fn finish<V>(
        &mut self,
        stage: Stage,
        result: anyhow::Result<V>,
        detail: impl FnOnce(&V) -> String,
    ) -> anyhow::Result<V> {
        let outcome = match &result {
            Ok(value) => StageOutcome::Completed {
                detail: detail(value),
            },
            Err(e) => StageOutcome::Failed {
                error: format!("{:#}", e),
            },
        };
        match &outcome {
            StageOutcome::Completed { detail } => tracing::info!(%stage, %detail, "Stage completed"),
            StageOutcome::Failed { error } => tracing::debug!(%stage, %error, "Stage failed"),
        }
        self.events.push(StageEvent {
            at: Utc::now(),
            stage,
            outcome,
        });
        result.context(StageFailed(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use imageflow_build::BuildError;
    use imageflow_cloud::{CloudError, MemoryPlatform};
    use imageflow_core::{GIB, SizeError};
    use std::collections::{BTreeMap, HashMap};
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    /// Writes `<output-qemu>/<template stem>.qcow2`, recording the variables
    #[derive(Default)]
    struct FakePacker {
        builds: Mutex<Vec<(String, BTreeMap<String, String>)>>,
        fail: Option<String>,
    }

    #[async_trait]
    impl BuildTool for FakePacker {
        fn name(&self) -> &str {
            "fake-packer"
        }

        async fn init(&self, _workdir: &Path) -> imageflow_build::Result<()> {
            Ok(())
        }

        async fn build(
            &self,
            workdir: &Path,
            template: &str,
            variables: &BTreeMap<String, String>,
        ) -> imageflow_build::Result<()> {
            if let Ok(mut builds) = self.builds.lock() {
                builds.push((template.to_string(), variables.clone()));
            }
            if self.fail.as_deref() == Some(template) {
                return Err(BuildError::BuildFailed {
                    stage: "packer build".to_string(),
                    command: format!("packer build {}", template),
                    status: "exit status: 1".to_string(),
                    output: "Build 'qemu' errored".to_string(),
                });
            }
            let stem = template.trim_end_matches(".pkr.hcl");
            let out = workdir.join("output-qemu");
            fs::create_dir_all(&out)?;
            fs::write(out.join(format!("{}.qcow2", stem)), stem)?;
            Ok(())
        }
    }

    /// Virtual sizes keyed by artifact name
    struct FakeInspector(HashMap<String, u64>);

    #[async_trait]
    impl SizeInspector for FakeInspector {
        async fn virtual_size(&self, image: &Path) -> imageflow_build::Result<u64> {
            let stem = image
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            Ok(self.0.get(stem).copied().unwrap_or(0))
        }
    }

    struct Fixture {
        root: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let packer = root.path().join("packer");
            fs::create_dir_all(&packer).unwrap();
            fs::write(packer.join("base-hardened.pkr.hcl"), "source {}").unwrap();
            fs::write(packer.join("proxmox-ampere.pkr.hcl"), "source {}").unwrap();
            Self { root }
        }

        fn pipeline(
            &self,
            tool: FakePacker,
            sizes: &[(&str, u64)],
        ) -> Pipeline<FakePacker, FakeInspector> {
            let config = PipelineConfig::new(
                self.root.path(),
                Project::default_layout("oci-free-tier"),
            );
            let sizes = sizes.iter().map(|(n, b)| (n.to_string(), *b)).collect();
            Pipeline::with_tools(config, tool, FakeInspector(sizes))
        }
    }

    fn target() -> PublishTarget {
        PublishTarget::new("images", "ocid1.compartment.oc1..test", "uk-london-1").unwrap()
    }

    fn stage_failed(err: &anyhow::Error) -> Option<Stage> {
        err.downcast_ref::<StageFailed>().map(|s| s.0)
    }

    #[tokio::test]
    async fn test_full_run_records_stages_in_order() {
        let fixture = Fixture::new();
        let mut pipeline = fixture.pipeline(
            FakePacker::default(),
            &[("base-hardened", 8 * GIB), ("proxmox-ampere", 9 * GIB)],
        );

        let base = pipeline.build_base().await.unwrap();
        let derived = pipeline.build_derived(Some(&base)).await.unwrap();
        let ceilings = pipeline.config().ceilings(None);
        let report = pipeline.validate(&ceilings).await.unwrap();
        let publisher = Publisher::new(MemoryPlatform::new());
        let published = pipeline.publish(&publisher, &target()).await.unwrap();

        assert_eq!(
            base.image,
            fixture.root.path().join("artifacts/base-hardened/base-hardened.qcow2")
        );
        assert!(derived.image.is_file());
        assert_eq!(report.total, 17 * GIB);
        assert_eq!(published.images.len(), 2);

        let stages: Vec<Stage> = pipeline.events().iter().map(|e| e.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::BuildBase,
                Stage::BuildDerived,
                Stage::Validate,
                Stage::Upload
            ]
        );
        assert!(
            pipeline
                .events()
                .iter()
                .all(|e| matches!(e.outcome, StageOutcome::Completed { .. }))
        );
    }

    #[tokio::test]
    async fn test_build_removes_interrupted_workspaces() {
        let fixture = Fixture::new();
        let leftover = fixture.root.path().join("artifacts/.imageflow-build-old");
        fs::create_dir_all(leftover.join("base")).unwrap();
        fs::write(leftover.join("base/base-hardened.qcow2"), b"old").unwrap();

        let mut pipeline = fixture.pipeline(FakePacker::default(), &[]);
        pipeline.build_base().await.unwrap();

        assert!(!leftover.exists());
        let names: Vec<_> = fs::read_dir(fixture.root.path().join("artifacts"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["base-hardened"]);
    }

    #[tokio::test]
    async fn test_derived_build_receives_staged_base() {
        let fixture = Fixture::new();
        let mut pipeline = fixture.pipeline(FakePacker::default(), &[]);

        let base = pipeline.build_base().await.unwrap();
        pipeline.build_derived(Some(&base)).await.unwrap();

        let builds = pipeline.builder.tool().builds.lock().unwrap().clone();
        assert_eq!(builds.len(), 2);
        let (template, vars) = &builds[1];
        assert_eq!(template, "proxmox-ampere.pkr.hcl");
        assert!(vars["source_image"].ends_with("base/base-hardened.qcow2"));
        assert_eq!(vars["headless"], "true");
    }

    #[tokio::test]
    async fn test_derived_without_base_fails() {
        let fixture = Fixture::new();
        let mut pipeline = fixture.pipeline(FakePacker::default(), &[]);

        assert!(pipeline.exported_base().unwrap().is_none());
        let err = pipeline.build_derived(None).await.unwrap_err();
        assert_eq!(stage_failed(&err), Some(Stage::BuildDerived));
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingBaseArtifact { .. })
        ));
        assert!(pipeline.builder.tool().builds.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_base_build_leaves_no_artifact() {
        let fixture = Fixture::new();
        let tool = FakePacker {
            fail: Some("base-hardened.pkr.hcl".to_string()),
            ..Default::default()
        };
        let mut pipeline = fixture.pipeline(tool, &[]);

        let err = pipeline.build_base().await.unwrap_err();
        assert_eq!(err.to_string(), "base image build failed");
        assert!(format!("{:#}", err).contains("Build 'qemu' errored"));
        assert!(pipeline.exported_base().unwrap().is_none());
        assert!(matches!(
            pipeline.events()[0].outcome,
            StageOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_validate_over_quota() {
        let fixture = Fixture::new();
        let mut pipeline = fixture.pipeline(
            FakePacker::default(),
            &[("base-hardened", 12 * GIB), ("proxmox-ampere", 10 * GIB)],
        );
        let base = pipeline.build_base().await.unwrap();
        pipeline.build_derived(Some(&base)).await.unwrap();

        // per-image ceiling raised so only the aggregate quota applies
        let ceilings = pipeline.config().ceilings(Some(12));
        let err = pipeline.validate(&ceilings).await.unwrap_err();

        assert_eq!(stage_failed(&err), Some(Stage::Validate));
        match err.downcast_ref::<BuildError>() {
            Some(BuildError::Size(SizeError::LimitExceeded { report, overage, .. })) => {
                assert_eq!(report.total, 22 * GIB);
                assert_eq!(*overage, 2 * GIB);
            }
            other => panic!("expected LimitExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validate_without_artifacts_is_not_found() {
        let fixture = Fixture::new();
        let mut pipeline = fixture.pipeline(FakePacker::default(), &[]);
        let ceilings = pipeline.config().ceilings(None);

        let err = pipeline.validate(&ceilings).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::Size(SizeError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_publish_failure_names_step() {
        let fixture = Fixture::new();
        let mut pipeline = fixture.pipeline(FakePacker::default(), &[]);
        let base = pipeline.build_base().await.unwrap();
        pipeline.build_derived(Some(&base)).await.unwrap();

        let publisher =
            Publisher::new(MemoryPlatform::new().fail_upload("proxmox-ampere.qcow2"));
        let err = pipeline.publish(&publisher, &target()).await.unwrap_err();

        assert_eq!(stage_failed(&err), Some(Stage::Upload));
        assert!(matches!(
            err.downcast_ref::<CloudError>(),
            Some(CloudError::UploadFailed { step, .. }) if step == "derived image upload"
        ));
        assert!(
            !publisher
                .platform()
                .calls()
                .iter()
                .any(|c| c.starts_with("create"))
        );
    }

    #[test]
    fn test_ceilings_default_from_project() {
        let config = PipelineConfig::new("/tmp", Project::default_layout("p"));
        assert_eq!(
            config.ceilings(None),
            vec![
                Ceiling::per_image_gb(10),
                Ceiling::Aggregate(UPLOAD_QUOTA_BYTES)
            ]
        );
        assert_eq!(config.ceilings(Some(4))[0], Ceiling::per_image_gb(4));
    }
}
