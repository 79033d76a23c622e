//! Loaded units and their identities

use std::fmt;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::module::registry::manifest::UnitManifest;

/// Canonical identity of a unit: its self-reported name and version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitIdentity {
    pub name: String,
    pub version: String,
}

impl UnitIdentity {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    /// `name@version`
    pub fn full_name(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Case-insensitive cache key
    pub fn cache_key(&self) -> String {
        self.full_name().to_lowercase()
    }
}

impl fmt::Display for UnitIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// What a caller asks the loader for
///
/// `"Alpha"` matches any version of unit `Alpha`; `"Alpha@1.0.0"` pins the
/// version as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRequest {
    pub name: String,
    pub version: Option<String>,
}

impl UnitRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Name compared case-insensitively, version exactly when pinned
    pub fn matches(&self, identity: &UnitIdentity) -> bool {
        self.name.eq_ignore_ascii_case(&identity.name)
            && self
                .version
                .as_deref()
                .map_or(true, |v| v == identity.version)
    }
}

impl From<&str> for UnitRequest {
    fn from(s: &str) -> Self {
        match s.split_once('@') {
            Some((name, version)) if !version.is_empty() => {
                UnitRequest::new(name.trim()).with_version(version.trim())
            }
            _ => UnitRequest::new(s.trim().trim_end_matches('@')),
        }
    }
}

impl From<String> for UnitRequest {
    fn from(s: String) -> Self {
        UnitRequest::from(s.as_str())
    }
}

impl From<&UnitIdentity> for UnitRequest {
    fn from(identity: &UnitIdentity) -> Self {
        UnitRequest::new(identity.name.clone()).with_version(identity.version.clone())
    }
}

impl fmt::Display for UnitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

/// A unit loaded through a [`UnitLoader`](super::UnitLoader)
///
/// Shared as `Arc<LoadedUnit>`; the loader holds one strong reference in its
/// cache until it is released.
#[derive(Debug)]
pub struct LoadedUnit {
    identity: UnitIdentity,
    path: PathBuf,
    fingerprint: String,
    manifest: UnitManifest,
    context_id: Uuid,
}

impl LoadedUnit {
    pub(crate) fn new(
        path: PathBuf,
        fingerprint: String,
        manifest: UnitManifest,
        context_id: Uuid,
    ) -> Self {
        Self {
            identity: manifest.identity(),
            path,
            fingerprint,
            manifest,
            context_id,
        }
    }

    pub fn identity(&self) -> &UnitIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn version(&self) -> &str {
        &self.identity.version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hex SHA-256 of the unit file contents
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn manifest(&self) -> &UnitManifest {
        &self.manifest
    }

    /// Id of the loader context that owns this unit
    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    /// Component ids in discovery order
    pub fn component_ids(&self) -> impl Iterator<Item = &str> {
        self.manifest.components.iter().map(|c| c.id.as_str())
    }
}
