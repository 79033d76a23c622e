//! Unit manifest validation
//!
//! Validates unit manifests for structure before a unit is accepted by the
//! loader.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::module::registry::manifest::UnitManifest;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Manifest is valid
    Valid,
    /// Manifest is invalid with specific errors
    Invalid(Vec<String>),
}

/// Manifest validator
pub struct ManifestValidator {
    /// Maximum unit name length
    max_name_len: usize,
    /// Maximum number of components per unit
    max_components: usize,
}

impl ManifestValidator {
    /// Create a new manifest validator
    pub fn new() -> Self {
        Self {
            max_name_len: 128,
            max_components: 1024,
        }
    }

    /// Validate a unit manifest
    pub fn validate(&self, manifest: &UnitManifest) -> ValidationResult {
        let mut errors = Vec::new();

        if manifest.unit.name.is_empty() {
            errors.push("Unit name cannot be empty".to_string());
        } else if !self.is_valid_name(&manifest.unit.name) {
            errors.push(format!(
                "Invalid unit name: {} (must start alphanumeric, then alphanumeric, '.', '-' or '_')",
                manifest.unit.name
            ));
        }

        if manifest.unit.version.is_empty() {
            errors.push("Unit version cannot be empty".to_string());
        } else if !self.is_valid_version(&manifest.unit.version) {
            errors.push(format!(
                "Invalid version format: {} (expected semantic versioning)",
                manifest.unit.version
            ));
        }

        if let Err(component_errors) = self.validate_components(manifest) {
            errors.extend(component_errors);
        }

        if errors.is_empty() {
            debug!("Manifest validation passed for unit: {}", manifest.unit.name);
            ValidationResult::Valid
        } else {
            warn!(
                "Manifest validation failed for unit {}: {:?}",
                manifest.unit.name, errors
            );
            ValidationResult::Invalid(errors)
        }
    }

    #[inline]
    fn is_valid_name(&self, name: &str) -> bool {
        if name.is_empty() || name.len() > self.max_name_len {
            return false;
        }

        if !name.chars().next().is_some_and(|c| c.is_alphanumeric()) {
            return false;
        }

        name.chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    }

    /// Accepts: major.minor[.patch][-prerelease][+build]
    #[inline]
    fn is_valid_version(&self, version: &str) -> bool {
        let base = version.split_once('+').map_or(version, |(base, _)| base);
        let version_part = base.split_once('-').map_or(base, |(core, _)| core);

        let nums: Vec<&str> = version_part.split('.').collect();
        if nums.len() < 2 || nums.len() > 3 {
            return false;
        }

        nums.iter().all(|n| {
            !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) && n.parse::<u32>().is_ok()
        })
    }

    fn validate_components(&self, manifest: &UnitManifest) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if manifest.components.len() > self.max_components {
            errors.push(format!(
                "Too many components: {} (max {})",
                manifest.components.len(),
                self.max_components
            ));
        }

        let mut seen = HashSet::new();
        for component in &manifest.components {
            let id = component.id.trim();
            if id.is_empty() {
                errors.push("Component id cannot be empty".to_string());
                continue;
            }
            if !id
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, ':' | '_' | '-' | '.'))
            {
                errors.push(format!("Invalid component id: {}", id));
            }
            if !seen.insert(id) {
                errors.push(format!("Duplicate component id: {}", id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for ManifestValidator {
    fn default() -> Self {
        Self::new()
    }
}
