//! OCI platform for imageflow
//!
//! This crate implements the imageflow cloud traits for Oracle Cloud
//! Infrastructure, uploading disk images to Object Storage and registering
//! them as custom compute images.
//!
//! # Requirements
//!
//! - `oci` CLI must be installed
//! - A credential bundle directory (default `~/.oci`) whose `config` defines
//!   the selected profile
//!
//! # Example
//!
//! ```ignore
//! use imageflow_cloud::Publisher;
//! use imageflow_cloud_oci::OciPlatform;
//!
//! let platform = OciPlatform::new(&credentials_dir, "DEFAULT")?;
//! let report = Publisher::new(platform).publish(&artifacts, &target).await?;
//! ```

pub mod credentials;
pub mod error;
pub mod oci;
pub mod provider;

pub use credentials::CredentialBundle;
pub use error::{OciError, Result};
pub use oci::{CreateImageConfig, ImageInfo, ObjectSummary, OciCli};
pub use provider::OciPlatform;
