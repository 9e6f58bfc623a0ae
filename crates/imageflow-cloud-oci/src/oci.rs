//! oci CLI wrapper
//!
//! Wraps the `oci` CLI commands used for publishing images.

use crate::credentials::CredentialBundle;
use crate::error::{OciError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// oci CLI wrapper bound to one credential bundle and profile
pub struct OciCli {
    program: String,
    bundle: CredentialBundle,
}

impl OciCli {
    pub fn new(bundle: CredentialBundle) -> Self {
        Self {
            program: "oci".to_string(),
            bundle,
        }
    }

    /// Use a different executable, e.g. a wrapper script
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn bundle(&self) -> &CredentialBundle {
        &self.bundle
    }

    /// Check that the CLI is installed and the profile can reach the tenancy
    pub async fn check_auth(&self) -> Result<String> {
        let which = Command::new("which").arg(&self.program).output().await?;
        if !which.status.success() {
            return Err(OciError::OciNotFound);
        }

        let output = self.run_command(&["os", "ns", "get"]).await?;
        let namespace: DataEnvelope<String> = serde_json::from_str(&output)?;
        Ok(namespace.data)
    }

    /// Run an oci command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let config_file = self.bundle.config_file();
        let mut cmd = Command::new(&self.program);
        cmd.arg("--config-file")
            .arg(&config_file)
            .arg("--profile")
            .arg(&self.bundle.profile);
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(
            "Running: {} --config-file {} --profile {} {}",
            self.program,
            config_file.display(),
            self.bundle.profile,
            args.join(" ")
        );

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OciError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Upload a file, replacing any object of the same name
    pub async fn put_object(&self, bucket: &str, file: &Path, name: &str) -> Result<()> {
        let file = file.to_string_lossy();
        self.run_command(&[
            "os",
            "object",
            "put",
            "--bucket-name",
            bucket,
            "--file",
            file.as_ref(),
            "--name",
            name,
            "--force",
        ])
        .await?;
        Ok(())
    }

    /// List every object in the bucket with its size
    pub async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>> {
        let output = self
            .run_command(&[
                "os",
                "object",
                "list",
                "--bucket-name",
                bucket,
                "--all",
                "--fields",
                "size",
            ])
            .await?;
        parse_object_list(&output)
    }

    /// Register an uploaded object as a custom compute image
    pub async fn create_image(&self, config: &CreateImageConfig) -> Result<ImageInfo> {
        let output = self
            .run_command(&[
                "compute",
                "image",
                "create",
                "--compartment-id",
                config.compartment_id.as_str(),
                "--display-name",
                config.display_name.as_str(),
                "--bucket-name",
                config.bucket.as_str(),
                "--object-name",
                config.object_name.as_str(),
                "--region",
                config.region.as_str(),
            ])
            .await?;
        parse_image(&output)
    }
}

/// The `{"data": ...}` wrapper around every oci JSON response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Object information from `os object list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub name: String,
    pub size: Option<u64>,
}

/// Image information from `compute image create`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ImageInfo {
    pub id: String,
    pub display_name: Option<String>,
    pub lifecycle_state: Option<String>,
}

/// Configuration for creating an image
#[derive(Debug, Clone)]
pub struct CreateImageConfig {
    pub compartment_id: String,
    pub display_name: String,
    pub bucket: String,
    pub object_name: String,
    pub region: String,
}

/// An empty bucket produces no output at all
pub fn parse_object_list(output: &str) -> Result<Vec<ObjectSummary>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    let list: DataEnvelope<Vec<ObjectSummary>> = serde_json::from_str(output)?;
    Ok(list.data)
}

pub fn parse_image(output: &str) -> Result<ImageInfo> {
    if output.trim().is_empty() {
        return Err(OciError::UnexpectedOutput(
            "compute image create printed nothing".to_string(),
        ));
    }
    let image: DataEnvelope<ImageInfo> = serde_json::from_str(output)?;
    Ok(image.data)
}
