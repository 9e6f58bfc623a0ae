//! Disk image size inspection via `qemu-img`

use crate::error::{BuildError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Reports the virtual size of a disk image
#[async_trait]
pub trait SizeInspector: Send + Sync {
    /// Logical (as-mounted) size in bytes, not the compressed file size
    async fn virtual_size(&self, image: &Path) -> Result<u64>;
}

/// Output of `qemu-img info --output=json`
#[derive(Debug, Clone, Deserialize)]
pub struct ImageInfo {
    #[serde(rename = "virtual-size")]
    pub virtual_size: u64,

    #[serde(rename = "actual-size")]
    pub actual_size: Option<u64>,

    pub format: Option<String>,

    pub filename: Option<String>,
}

impl ImageInfo {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// `qemu-img` CLI wrapper
pub struct QemuImg {
    program: PathBuf,
}

impl Default for QemuImg {
    fn default() -> Self {
        Self::new("qemu-img")
    }
}

impl QemuImg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub async fn info(&self, image: &Path) -> Result<ImageInfo> {
        tracing::debug!(
            "Running: {} info --output=json {}",
            self.program.display(),
            image.display()
        );

        let output = Command::new(&self.program)
            .arg("info")
            .arg("--output=json")
            .arg(image)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    BuildError::ToolNotFound(self.program.display().to_string())
                }
                _ => BuildError::Io(e),
            })?;

        if !output.status.success() {
            return Err(BuildError::InspectFailed {
                path: image.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        ImageInfo::parse(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl SizeInspector for QemuImg {
    async fn virtual_size(&self, image: &Path) -> Result<u64> {
        Ok(self.info(image).await?.virtual_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qemu_img_info() {
        let json = r#"{
            "virtual-size": 10737418240,
            "filename": "/artifacts/base-hardened/base-hardened.qcow2",
            "cluster-size": 65536,
            "format": "qcow2",
            "actual-size": 1863057408,
            "dirty-flag": false
        }"#;
        let info = ImageInfo::parse(json).unwrap();
        assert_eq!(info.virtual_size, 10 * imageflow_core::GIB);
        assert_eq!(info.actual_size, Some(1863057408));
        assert_eq!(info.format.as_deref(), Some("qcow2"));
    }

    #[test]
    fn test_parse_missing_virtual_size() {
        assert!(matches!(
            ImageInfo::parse(r#"{"format": "qcow2"}"#),
            Err(BuildError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_qemu_img() {
        let inspector = QemuImg::new("/nonexistent/qemu-img");
        let err = inspector
            .virtual_size(Path::new("/tmp/x.qcow2"))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::ToolNotFound(_)));
    }
}
