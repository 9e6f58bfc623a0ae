use super::print_stage;
use crate::pipeline::{Pipeline, PipelineConfig};
use colored::Colorize;
use imageflow_build::{BuildTool, SizeInspector};
use imageflow_core::{Ceiling, SizeReport, format_gib};

pub async fn handle(config: PipelineConfig, max_size_gb: Option<u64>) -> anyhow::Result<()> {
    let mut pipeline = Pipeline::new(config);
    validate(&mut pipeline, max_size_gb).await?;

    println!();
    println!("{}", "✓ Images fit the upload quota".green().bold());
    Ok(())
}

pub async fn validate<T: BuildTool, I: SizeInspector>(
    pipeline: &mut Pipeline<T, I>,
    max_size_gb: Option<u64>,
) -> anyhow::Result<SizeReport> {
    let ceilings = pipeline.config().ceilings(max_size_gb);
    print_stage("Validating image sizes");
    for ceiling in &ceilings {
        println!("  {}", ceiling.to_string().dimmed());
    }

    let report = pipeline.validate(&ceilings).await?;
    print_report(&report, &ceilings);
    Ok(report)
}

fn print_report(report: &SizeReport, ceilings: &[Ceiling]) {
    let width = report
        .entries
        .iter()
        .map(|e| e.name.len())
        .max()
        .unwrap_or(0);
    for entry in &report.entries {
        let name = format!("{:<width$}", entry.name, width = width);
        println!("  {}  {:>12}", name.cyan(), format_gib(entry.bytes));
    }
    let quota = ceilings
        .iter()
        .find(|c| matches!(c, Ceiling::Aggregate(_)))
        .map(|c| format!(" of {}", format_gib(c.bytes())))
        .unwrap_or_default();
    let total = format!("{:<width$}", "total", width = width);
    println!("  {}  {:>12}{}", total.bold(), format_gib(report.total), quota);
}
