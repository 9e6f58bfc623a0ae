//! imageflow cloud publishing
//!
//! Platform abstraction for uploading disk images and registering them as
//! compute images, and the [`Publisher`] that sequences those calls.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              imageflow upload                │
//! └─────────────────┬───────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────┐
//! │              imageflow-cloud                 │
//! │  Publisher: upload → quota check → register  │
//! │  trait CloudPlatform: ObjectStorage          │
//! │                     + ImageRegistry          │
//! └───────┬─────────────────┬───────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │      oci      │ │    memory     │
//! │  (oci CLI)    │ │   (dry run)   │
//! └───────────────┘ └───────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod provider;
pub mod publisher;
pub mod report;

// Re-exports
pub use error::{CloudError, Result};
pub use memory::MemoryPlatform;
pub use provider::{
    AuthStatus, CloudPlatform, ImageRegistration, ImageRegistry, ObjectStorage, RegisteredImage,
    StoredObject,
};
pub use publisher::Publisher;
pub use report::{PublishEvent, PublishEventKind, PublishReport};
