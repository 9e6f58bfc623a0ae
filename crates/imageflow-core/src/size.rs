//! Size accounting
//!
//! One routine computes a [`SizeReport`] from per-image sizes; callers then
//! enforce whichever [`Ceiling`] applies at their call site. The standalone
//! validation uses a caller-supplied per-image ceiling plus the aggregate
//! quota, the publisher always enforces [`UPLOAD_QUOTA_BYTES`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Aggregate storage quota of the target platform (20 GiB). Not configurable.
pub const UPLOAD_QUOTA_BYTES: u64 = 20 * GIB;

/// Default per-image ceiling of the standalone validation, in GiB
pub const DEFAULT_MAX_IMAGE_SIZE_GB: u64 = 10;

/// Size of one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEntry {
    pub name: String,
    pub bytes: u64,
}

impl SizeEntry {
    pub fn new(name: impl Into<String>, bytes: u64) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Per-image sizes and their exact sum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeReport {
    pub entries: Vec<SizeEntry>,
    pub total: u64,
}

/// Maximum permitted size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ceiling {
    /// Limit on the sum of all images
    Aggregate(u64),
    /// Limit every image must respect on its own
    PerImage(u64),
}

impl Ceiling {
    pub fn bytes(&self) -> u64 {
        match self {
            Ceiling::Aggregate(bytes) | Ceiling::PerImage(bytes) => *bytes,
        }
    }

    pub fn per_image_gb(gb: u64) -> Self {
        Ceiling::PerImage(gb.saturating_mul(GIB))
    }
}

impl fmt::Display for Ceiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ceiling::Aggregate(bytes) => write!(f, "aggregate ceiling {}", format_gib(*bytes)),
            Ceiling::PerImage(bytes) => write!(f, "per-image ceiling {}", format_gib(*bytes)),
        }
    }
}

#[derive(Error, Debug)]
pub enum SizeError {
    #[error("no artifacts found matching {pattern}")]
    NotFound { pattern: String },

    #[error("total size of {0} overflows 64 bits")]
    Overflow(String),

    #[error("{ceiling} exceeded by {} ({offenders}); {report}", format_gib(*overage))]
    LimitExceeded {
        ceiling: Ceiling,
        report: SizeReport,
        overage: u64,
        offenders: String,
    },
}

pub type Result<T> = std::result::Result<T, SizeError>;

impl SizeReport {
    /// Sum the entries. `pattern` describes what was searched for and is
    /// only used when there is nothing to sum.
    pub fn from_entries(entries: Vec<SizeEntry>, pattern: &str) -> Result<Self> {
        if entries.is_empty() {
            return Err(SizeError::NotFound {
                pattern: pattern.to_string(),
            });
        }

        let total = entries
            .iter()
            .try_fold(0u64, |acc, e| acc.checked_add(e.bytes))
            .ok_or_else(|| SizeError::Overflow(pattern.to_string()))?;

        Ok(Self { entries, total })
    }

    /// Fail if the ceiling is exceeded. The report travels with the error
    /// unchanged, so the total is still the exact sum.
    pub fn enforce(&self, ceiling: Ceiling) -> Result<()> {
        let limit = ceiling.bytes();
        match ceiling {
            Ceiling::Aggregate(_) => {
                if self.total > limit {
                    return Err(SizeError::LimitExceeded {
                        ceiling,
                        report: self.clone(),
                        overage: self.total - limit,
                        offenders: format!("total {}", format_gib(self.total)),
                    });
                }
            }
            Ceiling::PerImage(_) => {
                let over: Vec<&SizeEntry> =
                    self.entries.iter().filter(|e| e.bytes > limit).collect();
                if let Some(worst) = over.iter().map(|e| e.bytes).max() {
                    let offenders = over
                        .iter()
                        .map(|e| format!("{} {}", e.name, format_gib(e.bytes)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Err(SizeError::LimitExceeded {
                        ceiling,
                        report: self.clone(),
                        overage: worst - limit,
                        offenders,
                    });
                }
            }
        }
        Ok(())
    }

    /// Enforce several ceilings in order, stopping at the first violation
    pub fn enforce_all(&self, ceilings: &[Ceiling]) -> Result<()> {
        ceilings.iter().try_for_each(|c| self.enforce(*c))
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.bytes)
    }
}

impl fmt::Display for SizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            write!(f, "{} {}, ", entry.name, format_gib(entry.bytes))?;
        }
        write!(f, "total {}", format_gib(self.total))
    }
}

/// Render a byte count in GiB with two decimals
pub fn format_gib(bytes: u64) -> String {
    format!("{:.2} GiB", bytes as f64 / GIB as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(sizes: &[(&str, u64)]) -> SizeReport {
        let entries = sizes
            .iter()
            .map(|(name, bytes)| SizeEntry::new(*name, *bytes))
            .collect();
        SizeReport::from_entries(entries, "artifacts/*/*.qcow2").unwrap()
    }

    #[test]
    fn test_within_aggregate_ceiling() {
        let r = report(&[("base-hardened", 8 * GIB), ("proxmox-ampere", 9 * GIB)]);
        assert_eq!(r.total, 17 * GIB);
        r.enforce(Ceiling::Aggregate(UPLOAD_QUOTA_BYTES)).unwrap();
    }

    #[test]
    fn test_over_aggregate_ceiling_reports_exact_total() {
        let r = report(&[("base-hardened", 12 * GIB), ("proxmox-ampere", 10 * GIB)]);
        match r.enforce(Ceiling::Aggregate(UPLOAD_QUOTA_BYTES)) {
            Err(SizeError::LimitExceeded {
                report, overage, ..
            }) => {
                assert_eq!(report.total, 22 * GIB);
                assert_eq!(overage, 2 * GIB);
            }
            other => panic!("expected LimitExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_exactly_at_ceiling_passes() {
        let r = report(&[("a", 10 * GIB), ("b", 10 * GIB)]);
        r.enforce(Ceiling::Aggregate(20 * GIB)).unwrap();
        r.enforce(Ceiling::PerImage(10 * GIB)).unwrap();
    }

    #[test]
    fn test_per_image_ceiling_names_offenders() {
        let r = report(&[("base-hardened", 12 * GIB), ("proxmox-ampere", 9 * GIB)]);
        let err = r.enforce(Ceiling::per_image_gb(10)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("per-image ceiling 10.00 GiB"));
        assert!(message.contains("base-hardened 12.00 GiB"));
        assert!(!message.contains("(proxmox-ampere"));
        assert!(message.contains("total 21.00 GiB"));
    }

    #[test]
    fn test_per_image_and_aggregate_are_independent() {
        // each image fits its own ceiling, the sum does not
        let r = report(&[("a", 9 * GIB), ("b", 9 * GIB), ("c", 9 * GIB)]);
        r.enforce(Ceiling::per_image_gb(10)).unwrap();
        let err = r
            .enforce_all(&[
                Ceiling::per_image_gb(10),
                Ceiling::Aggregate(UPLOAD_QUOTA_BYTES),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            SizeError::LimitExceeded {
                ceiling: Ceiling::Aggregate(_),
                ..
            }
        ));
    }

    #[test]
    fn test_empty_is_not_found() {
        let err = SizeReport::from_entries(Vec::new(), "artifacts/base-hardened/*.qcow2")
            .unwrap_err();
        assert!(matches!(err, SizeError::NotFound { .. }));
        assert!(err.to_string().contains("artifacts/base-hardened/*.qcow2"));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let entries = vec![SizeEntry::new("a", u64::MAX), SizeEntry::new("b", 1)];
        assert!(matches!(
            SizeReport::from_entries(entries, "x"),
            Err(SizeError::Overflow(_))
        ));
    }

    #[test]
    fn test_total_is_sum_for_arbitrary_sizes() {
        let sizes = [0u64, 1, 511, GIB + 7, 3 * GIB, 123_456_789];
        for window in 1..=sizes.len() {
            let entries: Vec<SizeEntry> = sizes[..window]
                .iter()
                .enumerate()
                .map(|(i, b)| SizeEntry::new(format!("img-{}", i), *b))
                .collect();
            let expected: u64 = sizes[..window].iter().sum();
            let r = SizeReport::from_entries(entries, "x").unwrap();
            assert_eq!(r.total, expected);
            let tight = Ceiling::Aggregate(expected.saturating_sub(1));
            if expected > 0 {
                match r.enforce(tight) {
                    Err(SizeError::LimitExceeded { report, overage, .. }) => {
                        assert_eq!(report.total, expected);
                        assert_eq!(overage, 1);
                    }
                    other => panic!("expected LimitExceeded, got {:?}", other),
                }
            }
            r.enforce(Ceiling::Aggregate(expected)).unwrap();
        }
    }

    #[test]
    fn test_report_display() {
        let r = report(&[("base-hardened", 8 * GIB), ("proxmox-ampere", 9 * GIB)]);
        assert_eq!(
            r.to_string(),
            "base-hardened 8.00 GiB, proxmox-ampere 9.00 GiB, total 17.00 GiB"
        );
        assert_eq!(r.get("proxmox-ampere"), Some(9 * GIB));
    }
}
