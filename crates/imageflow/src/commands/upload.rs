use super::print_stage;
use crate::pipeline::{Pipeline, PipelineConfig, Stage, StageFailed};
use anyhow::Context;
use colored::Colorize;
use imageflow_build::{BuildTool, SizeInspector};
use imageflow_cloud::{CloudPlatform, MemoryPlatform, PublishReport, Publisher};
use imageflow_cloud_oci::OciPlatform;
use imageflow_core::PublishTarget;
use std::path::PathBuf;

/// Command-line overrides of the project's `publish` settings
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub bucket: Option<String>,
    pub compartment: Option<String>,
    pub region: Option<String>,
    pub credentials: Option<PathBuf>,
    pub profile: Option<String>,
    pub dry_run: bool,
}

pub async fn handle(config: PipelineConfig, options: &UploadOptions) -> anyhow::Result<()> {
    let plan = UploadPlan::prepare(&config, options)?;
    let mut pipeline = Pipeline::new(config);
    let report = upload(&mut pipeline, &plan).await?;

    println!();
    println!("{}", "✓ Images uploaded and registered".green().bold());
    print_images(&report);
    Ok(())
}

/// Publish target and platform, resolved before any stage runs
pub struct UploadPlan {
    target: PublishTarget,
    publisher: PlannedPublisher,
}

enum PlannedPublisher {
    DryRun(Publisher<MemoryPlatform>),
    Oci(Publisher<OciPlatform>),
}

impl UploadPlan {
    /// Resolve the target and validate the credential bundle. Both are
    /// fatal preconditions, so `run` checks them before building.
    pub fn prepare(config: &PipelineConfig, options: &UploadOptions) -> anyhow::Result<Self> {
        let settings = &config.project.publish;
        let target = settings.resolve_target(
            options.bucket.as_deref(),
            options.compartment.as_deref(),
            options.region.as_deref(),
        )?;

        if options.dry_run {
            return Ok(Self {
                target,
                publisher: PlannedPublisher::DryRun(Publisher::new(MemoryPlatform::new())),
            });
        }

        let profile = options
            .profile
            .clone()
            .unwrap_or_else(|| settings.profile.clone());
        let credentials = match &options.credentials {
            Some(dir) => dir.clone(),
            None => imageflow_config::default_credentials_dir()?,
        };
        let platform =
            OciPlatform::new(&credentials, &profile).context(StageFailed(Stage::Upload))?;
        Ok(Self {
            target,
            publisher: PlannedPublisher::Oci(Publisher::new(platform)),
        })
    }
}

pub async fn upload<T: BuildTool, I: SizeInspector>(
    pipeline: &mut Pipeline<T, I>,
    plan: &UploadPlan,
) -> anyhow::Result<PublishReport> {
    let target = &plan.target;
    print_stage(&format!(
        "Uploading to bucket {} ({})",
        target.bucket.cyan(),
        target.region
    ));

    match &plan.publisher {
        PlannedPublisher::DryRun(publisher) => {
            println!("  {}", "dry run: nothing leaves this machine".yellow());
            publish(pipeline, publisher, target).await
        }
        PlannedPublisher::Oci(publisher) => publish(pipeline, publisher, target).await,
    }
}

async fn publish<T: BuildTool, I: SizeInspector, P: CloudPlatform>(
    pipeline: &mut Pipeline<T, I>,
    publisher: &Publisher<P>,
    target: &PublishTarget,
) -> anyhow::Result<PublishReport> {
    let report = pipeline.publish(publisher, target).await?;
    for event in &report.events {
        println!("  {} {}", "✓".green(), event.kind);
    }
    Ok(report)
}

pub fn print_images(report: &PublishReport) {
    println!("{}", "Images:".bold());
    for image in &report.images {
        println!(
            "  - {}: {} ({})",
            image.display_name.cyan(),
            image.id,
            image.lifecycle_state.as_deref().unwrap_or("unknown")
        );
    }
}
