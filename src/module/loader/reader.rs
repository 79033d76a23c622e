//! Unit file readers
//!
//! A [`UnitReader`] turns a candidate file into a [`UnitImage`]. The loader
//! owns caching, identity checks and search order; readers only parse.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::module::registry::manifest::UnitManifest;
use crate::module::validation::{ManifestValidator, ValidationResult};

/// Supported unit file extensions, in probe preference order
pub const UNIT_EXTENSIONS: &[&str] = &["bin", "unit"];

/// Failure to read a single candidate unit
///
/// None of these abort a resolution; the loader logs them and moves on.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("Malformed unit {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Failed to load unit {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected error loading unit {path:?}: {reason}")]
    Internal { path: PathBuf, reason: String },
}

impl UnitError {
    pub fn path(&self) -> &Path {
        match self {
            UnitError::Malformed { path, .. }
            | UnitError::Io { path, .. }
            | UnitError::Internal { path, .. } => path,
        }
    }
}

/// Parsed contents of a unit file
#[derive(Debug, Clone)]
pub struct UnitImage {
    pub manifest: UnitManifest,
    /// Hex SHA-256 of the file bytes
    pub fingerprint: String,
}

/// Reads unit files from disk
pub trait UnitReader: Send + Sync {
    /// File extensions this reader understands, in preference order
    fn extensions(&self) -> &[&str];

    /// Read and validate one unit file
    fn read(&self, path: &Path) -> Result<UnitImage, UnitError>;
}

/// Reader for TOML unit manifests
pub struct ManifestUnitReader {
    validator: ManifestValidator,
}

impl ManifestUnitReader {
    pub fn new() -> Self {
        Self {
            validator: ManifestValidator::new(),
        }
    }
}

impl Default for ManifestUnitReader {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitReader for ManifestUnitReader {
    fn extensions(&self) -> &[&str] {
        UNIT_EXTENSIONS
    }

    fn read(&self, path: &Path) -> Result<UnitImage, UnitError> {
        let bytes = std::fs::read(path).map_err(|source| UnitError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let fingerprint = hex::encode(Sha256::digest(&bytes));

        let text = std::str::from_utf8(&bytes).map_err(|e| UnitError::Malformed {
            path: path.to_path_buf(),
            reason: format!("not valid UTF-8: {}", e),
        })?;

        let manifest = UnitManifest::from_toml_str(text).map_err(|e| UnitError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if let ValidationResult::Invalid(errors) = self.validator.validate(&manifest) {
            return Err(UnitError::Malformed {
                path: path.to_path_buf(),
                reason: errors.join("; "),
            });
        }

        debug!(
            "Read unit {} from {:?} ({} components)",
            manifest.identity(),
            path,
            manifest.components.len()
        );

        Ok(UnitImage {
            manifest,
            fingerprint,
        })
    }
}
