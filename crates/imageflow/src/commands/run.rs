use super::upload::{UploadOptions, UploadPlan, print_images};
use super::{build, print_artifacts, upload, validate};
use crate::pipeline::{Pipeline, PipelineConfig, StageEvent, StageOutcome};
use colored::Colorize;
use imageflow_core::format_gib;

/// Every stage in order, stopping at the first failure
pub async fn handle(
    config: PipelineConfig,
    max_size_gb: Option<u64>,
    options: &UploadOptions,
) -> anyhow::Result<()> {
    let started = std::time::Instant::now();
    // a bad target or credential bundle must not wait for the builds
    let plan = UploadPlan::prepare(&config, options)?;
    let mut pipeline = Pipeline::new(config);

    let artifacts = build::build_all(&mut pipeline).await?;
    let sizes = validate::validate(&mut pipeline, max_size_gb).await?;
    let report = upload::upload(&mut pipeline, &plan).await?;

    println!();
    println!("{}", "✓ Pipeline complete!".green().bold());
    print_artifacts(&pipeline.config().root, &artifacts);
    println!("{} {}", "Size:".bold(), format_gib(sizes.total));
    print_images(&report);
    print_trace(pipeline.events());
    println!(
        "{}",
        format!("Finished in {}s", started.elapsed().as_secs()).dimmed()
    );
    Ok(())
}

fn print_trace(events: &[StageEvent]) {
    println!("{}", "Stages:".bold());
    for event in events {
        let (mark, detail) = match &event.outcome {
            StageOutcome::Completed { detail } => ("✓".green(), detail),
            StageOutcome::Failed { error } => ("✗".red(), error),
        };
        let stage = format!("{:<20}", event.stage.to_string());
        println!(
            "  {} {} {} {}",
            mark,
            event.at.format("%H:%M:%S").to_string().dimmed(),
            stage,
            detail
        );
    }
}
