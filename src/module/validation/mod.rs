//! Unit validation
//!
//! Structural checks applied to unit manifests before the loader accepts them.

pub mod manifest_validator;

pub use manifest_validator::{ManifestValidator, ValidationResult};
