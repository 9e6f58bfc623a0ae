mod commands;
mod pipeline;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use imageflow_build::{BuildError, OutputMode};
use imageflow_cloud::CloudError;
use pipeline::{PipelineConfig, StageFailed};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imageflow")]
#[command(about = "Build, size-check and publish OCI Free Tier disk images", long_about = None)]
struct Cli {
    /// Project root (default: nearest directory with imageflow.kdl, or the
    /// current directory when it has packer/)
    #[arg(long, global = true, env = "IMAGEFLOW_PROJECT_ROOT")]
    project_root: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the hardened base image
    BuildBase {
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Build the derived image on top of the exported base image
    BuildDerived {
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Build the base image, then the derived image
    BuildAll {
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Check exported image sizes against the upload quota
    Validate {
        #[command(flatten)]
        validate: ValidateArgs,
    },
    /// Upload exported images and register them as compute images
    Upload {
        #[command(flatten)]
        upload: UploadArgs,
    },
    /// Build, validate and upload in one go
    Run {
        #[command(flatten)]
        build: BuildArgs,
        #[command(flatten)]
        validate: ValidateArgs,
        #[command(flatten)]
        upload: UploadArgs,
    },
    /// Show version information
    Version,
}

#[derive(Args, Clone)]
struct BuildArgs {
    /// packer executable
    #[arg(long, env = "IMAGEFLOW_PACKER", default_value = "packer")]
    packer: PathBuf,

    /// Print packer output instead of a spinner
    #[arg(long)]
    stream: bool,
}

#[derive(Args, Clone)]
struct ValidateArgs {
    /// Per-image ceiling in GiB (default: imageflow.kdl, else 10)
    #[arg(long, value_name = "GB")]
    max_size_gb: Option<u64>,

    /// qemu-img executable
    #[arg(long, env = "IMAGEFLOW_QEMU_IMG", default_value = "qemu-img")]
    qemu_img: PathBuf,
}

#[derive(Args, Clone)]
struct UploadArgs {
    /// Object Storage bucket
    #[arg(long, env = "IMAGEFLOW_BUCKET")]
    bucket: Option<String>,

    /// Compartment OCID images are registered in
    #[arg(long, env = "IMAGEFLOW_COMPARTMENT")]
    compartment: Option<String>,

    /// Region (default: imageflow.kdl, else uk-london-1)
    #[arg(long, env = "IMAGEFLOW_REGION")]
    region: Option<String>,

    /// Credential bundle directory (default: ~/.oci)
    #[arg(long, env = "IMAGEFLOW_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Profile in the credential bundle's config
    #[arg(long, env = "IMAGEFLOW_PROFILE")]
    profile: Option<String>,

    /// Run against an in-memory platform; nothing leaves this machine
    #[arg(long)]
    dry_run: bool,
}

impl UploadArgs {
    fn options(&self) -> commands::upload::UploadOptions {
        commands::upload::UploadOptions {
            bucket: self.bucket.clone(),
            compartment: self.compartment.clone(),
            region: self.region.clone(),
            credentials: self.credentials.clone(),
            profile: self.profile.clone(),
            dry_run: self.dry_run,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = dispatch(cli).await {
        report_failure(&err);
        std::process::exit(1);
    }
    Ok(())
}

/// Logs go to stderr; stdout carries progress and summaries
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    // version needs no project
    if matches!(cli.command, Commands::Version) {
        println!("imageflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = load_config(cli.project_root.as_deref())?;

    match cli.command {
        Commands::BuildBase { build } => {
            apply_build_args(&mut config, &build);
            commands::build::handle_base(config).await
        }
        Commands::BuildDerived { build } => {
            apply_build_args(&mut config, &build);
            commands::build::handle_derived(config).await
        }
        Commands::BuildAll { build } => {
            apply_build_args(&mut config, &build);
            commands::build::handle_all(config).await
        }
        Commands::Validate { validate } => {
            config.qemu_img = validate.qemu_img;
            commands::validate::handle(config, validate.max_size_gb).await
        }
        Commands::Upload { upload } => commands::upload::handle(config, &upload.options()).await,
        Commands::Run {
            build,
            validate,
            upload,
        } => {
            apply_build_args(&mut config, &build);
            config.qemu_img = validate.qemu_img;
            commands::run::handle(config, validate.max_size_gb, &upload.options()).await
        }
        Commands::Version => Ok(()),
    }
}

fn load_config(explicit_root: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let cwd = std::env::current_dir().context("cannot read the working directory")?;
    let root = imageflow_config::find_project_root(explicit_root, &cwd)?;
    let project = imageflow_core::load_project(&root)
        .with_context(|| format!("invalid project at {}", root.display()))?;
    tracing::debug!(project = %project.name, root = %root.display(), "Project loaded");
    Ok(PipelineConfig::new(root, project))
}

fn apply_build_args(config: &mut PipelineConfig, build: &BuildArgs) {
    config.packer = build.packer.clone();
    if build.stream {
        config.output = OutputMode::Stream;
    }
}

/// `✗ <stage> failed: <error>` on stderr
fn report_failure(err: &anyhow::Error) {
    let headline = match err.downcast_ref::<StageFailed>() {
        Some(failed) => failed.to_string(),
        None => "configuration error".to_string(),
    };

    let detail = if let Some(build) = err.downcast_ref::<BuildError>() {
        build.user_message()
    } else if let Some(cloud) = err.downcast_ref::<CloudError>()
        && cloud.is_precondition()
    {
        format!(
            "{}\n\nhint: check the credential bundle (--credentials, default ~/.oci) and --profile",
            cloud
        )
    } else {
        let skip = usize::from(err.downcast_ref::<StageFailed>().is_some());
        err.chain()
            .skip(skip)
            .map(|cause| cause.to_string())
            .collect::<Vec<_>>()
            .join(": ")
    };

    eprintln!();
    eprintln!("{} {}: {}", "✗".red().bold(), headline.red().bold(), detail);
}
