use super::{display_path, print_artifacts, print_next_steps, print_stage};
use crate::pipeline::{Pipeline, PipelineConfig};
use colored::Colorize;
use imageflow_build::{BuildTool, SizeInspector};
use imageflow_core::BuildArtifact;

pub async fn handle_base(config: PipelineConfig) -> anyhow::Result<()> {
    let mut pipeline = Pipeline::new(config);
    let base = build_base(&mut pipeline).await?;

    println!();
    println!("{}", "✓ Base image built".green().bold());
    print_artifacts(&pipeline.config().root, &[base]);
    print_next_steps(&[("imageflow build-derived", "Build the derived image")]);
    Ok(())
}

pub async fn handle_derived(config: PipelineConfig) -> anyhow::Result<()> {
    let mut pipeline = Pipeline::new(config);
    let base = pipeline.exported_base()?;
    let derived = build_derived(&mut pipeline, base.as_ref()).await?;

    println!();
    println!("{}", "✓ Derived image built".green().bold());
    print_artifacts(&pipeline.config().root, &[derived]);
    print_next_steps(&[("imageflow validate", "Check sizes against the quota")]);
    Ok(())
}

pub async fn handle_all(config: PipelineConfig) -> anyhow::Result<()> {
    let mut pipeline = Pipeline::new(config);
    let artifacts = build_all(&mut pipeline).await?;

    println!();
    println!("{}", "✓ Build complete!".green().bold());
    print_artifacts(&pipeline.config().root, &artifacts);
    print_next_steps(&[
        ("imageflow validate", "Check sizes against the quota"),
        (
            "imageflow upload --bucket <bucket> --compartment <ocid>",
            "Upload and register the images",
        ),
    ]);
    Ok(())
}

/// Base, then derived on top of it
pub async fn build_all<T: BuildTool, I: SizeInspector>(
    pipeline: &mut Pipeline<T, I>,
) -> anyhow::Result<Vec<BuildArtifact>> {
    let base = build_base(pipeline).await?;
    let derived = build_derived(pipeline, Some(&base)).await?;
    Ok(vec![base, derived])
}

async fn build_base<T: BuildTool, I: SizeInspector>(
    pipeline: &mut Pipeline<T, I>,
) -> anyhow::Result<BuildArtifact> {
    let name = pipeline.config().project.base_image()?.name.clone();
    print_stage(&format!("Building base image {}", name.cyan()));
    let base = pipeline.build_base().await?;
    println!(
        "  {} {}",
        "✓".green(),
        display_path(&pipeline.config().root, &base.image)
    );
    Ok(base)
}

async fn build_derived<T: BuildTool, I: SizeInspector>(
    pipeline: &mut Pipeline<T, I>,
    base: Option<&BuildArtifact>,
) -> anyhow::Result<BuildArtifact> {
    let name = pipeline.config().project.derived_image()?.name.clone();
    print_stage(&format!("Building derived image {}", name.cyan()));
    if let Some(base) = base {
        println!(
            "  base: {}",
            display_path(&pipeline.config().root, &base.image)
        );
    }
    let derived = pipeline.build_derived(base).await?;
    println!(
        "  {} {}",
        "✓".green(),
        display_path(&pipeline.config().root, &derived.image)
    );
    Ok(derived)
}
