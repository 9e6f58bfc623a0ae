pub mod build;
pub mod run;
pub mod upload;
pub mod validate;

use colored::Colorize;
use imageflow_core::BuildArtifact;
use std::path::Path;

/// Path shown relative to the project root where possible
pub fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

pub fn print_stage(title: &str) {
    println!();
    println!("{} {}", "→".blue(), title.bold());
}

pub fn print_artifacts(root: &Path, artifacts: &[BuildArtifact]) {
    println!("{}", "Artifacts:".bold());
    for artifact in artifacts {
        println!(
            "  - {} ({}): {}/",
            artifact.name.cyan(),
            artifact.role,
            display_path(root, &artifact.dir)
        );
    }
}

pub fn print_next_steps(steps: &[(&str, &str)]) {
    if steps.is_empty() {
        return;
    }
    println!();
    println!("{}", "Next steps:".bold());
    for (i, (command, what)) in steps.iter().enumerate() {
        println!("  {}. {}: {}", i + 1, what, command.cyan());
    }
}
