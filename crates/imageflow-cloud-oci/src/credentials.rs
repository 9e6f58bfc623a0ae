//! Credential bundle
//!
//! The bundle is the directory the `oci` CLI reads its configuration from
//! (by default `~/.oci`). It is only ever read.

use crate::error::{OciError, Result};
use config::{File, FileFormat, Source};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Config file name inside the bundle
pub const CONFIG_FILE_NAME: &str = "config";

/// Section every other profile inherits from
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Keys every profile must define, directly or through `[DEFAULT]`
pub const REQUIRED_KEYS: [&str; 5] = ["user", "fingerprint", "tenancy", "region", "key_file"];

/// A validated credential bundle
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    pub dir: PathBuf,
    pub profile: String,
    pub entries: BTreeMap<String, String>,
}

impl CredentialBundle {
    /// Load and validate `profile` from `<dir>/config`
    pub fn load(dir: &Path, profile: &str) -> Result<Self> {
        let fail = |message: String| OciError::Credentials {
            dir: dir.display().to_string(),
            message,
        };

        if !dir.is_dir() {
            return Err(fail("directory does not exist".to_string()));
        }
        let config_path = dir.join(CONFIG_FILE_NAME);
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| fail(format!("cannot read {}: {}", CONFIG_FILE_NAME, e)))?;

        let mut profiles = parse_profiles(&content)
            .map_err(|e| fail(format!("cannot parse {}: {}", CONFIG_FILE_NAME, e)))?;
        let not_found = || fail(format!("profile [{}] not found", profile));
        let defaults = profiles.remove(DEFAULT_SECTION);
        let entries = if profile.eq_ignore_ascii_case(DEFAULT_SECTION) {
            defaults.ok_or_else(not_found)?
        } else {
            let own = profiles
                .remove(&profile.to_uppercase())
                .ok_or_else(not_found)?;
            let mut entries = defaults.unwrap_or_default();
            entries.extend(own);
            entries
        };

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|k| entries.get(*k).is_none_or(|v| v.is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(fail(format!(
                "profile [{}] is missing {}",
                profile,
                missing.join(", ")
            )));
        }

        let bundle = Self {
            dir: dir.to_path_buf(),
            profile: profile.to_string(),
            entries,
        };
        if bundle.key_file().is_none() {
            return Err(fail(format!(
                "key_file {} not found",
                bundle.get("key_file").unwrap_or_default()
            )));
        }

        tracing::debug!(dir = %dir.display(), profile, "Credential bundle loaded");
        Ok(bundle)
    }

    pub fn config_file(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE_NAME)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Region the profile defaults to
    pub fn region(&self) -> Option<&str> {
        self.get("region")
    }

    /// Resolve the API signing key. The bundle may be mounted somewhere
    /// other than where its config was written, so a key of the same file
    /// name inside the bundle wins over the literal path.
    pub fn key_file(&self) -> Option<PathBuf> {
        let raw = self.get("key_file")?;
        let candidates = [
            Path::new(raw).file_name().map(|name| self.dir.join(name)),
            expand_home(raw),
        ];
        candidates.into_iter().flatten().find(|p| p.is_file())
    }
}

fn expand_home(raw: &str) -> Option<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => std::env::var_os("HOME").map(|home| PathBuf::from(home).join(rest)),
        None => Some(PathBuf::from(raw)),
    }
}

/// Parse the INI config into `section -> key -> value`. Section names are
/// upper-cased and keys lower-cased, so lookups ignore case.
fn parse_profiles(
    content: &str,
) -> std::result::Result<BTreeMap<String, BTreeMap<String, String>>, config::ConfigError> {
    let mut profiles = BTreeMap::new();
    for (section, value) in File::from_str(content, FileFormat::Ini).collect()? {
        // keys outside any section are not a profile
        let Ok(table) = value.into_table() else {
            continue;
        };
        let mut entries = BTreeMap::new();
        for (key, value) in table {
            entries.insert(key.to_lowercase(), value.into_string()?);
        }
        profiles.insert(section.to_uppercase(), entries);
    }
    Ok(profiles)
}
