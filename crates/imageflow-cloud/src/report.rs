//! Publish trace

use crate::provider::RegisteredImage;
use chrono::{DateTime, Utc};
use imageflow_core::SizeReport;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One step the publisher completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublishEventKind {
    /// Disk image uploaded under `object`
    Uploaded { artifact: String, object: String },
    /// Aggregate size of the bucket checked against the upload quota
    QuotaVerified { total: u64, ceiling: u64 },
    /// Object registered as a compute image
    Registered { artifact: String, image_id: String },
}

impl fmt::Display for PublishEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishEventKind::Uploaded { artifact, object } => {
                write!(f, "uploaded {} as {}", artifact, object)
            }
            PublishEventKind::QuotaVerified { total, ceiling } => write!(
                f,
                "quota verified: {} of {}",
                imageflow_core::format_gib(*total),
                imageflow_core::format_gib(*ceiling)
            ),
            PublishEventKind::Registered { artifact, image_id } => {
                write!(f, "registered {} as {}", artifact, image_id)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishEvent {
    pub at: DateTime<Utc>,
    pub kind: PublishEventKind,
}

/// Result of a completed publish
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishReport {
    /// Completed steps in order
    pub events: Vec<PublishEvent>,

    /// Bucket contents measured by the quota check
    pub quota: Option<SizeReport>,

    pub images: Vec<RegisteredImage>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl PublishReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: PublishEventKind) {
        tracing::info!("{}", kind);
        self.events.push(PublishEvent {
            at: Utc::now(),
            kind,
        });
    }

    /// Position of the quota check in the trace
    pub fn quota_verified_at(&self) -> Option<usize> {
        self.events
            .iter()
            .position(|e| matches!(e.kind, PublishEventKind::QuotaVerified { .. }))
    }

    pub fn uploaded_objects(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match &e.kind {
                PublishEventKind::Uploaded { object, .. } => Some(object.as_str()),
                _ => None,
            })
            .collect()
    }
}
