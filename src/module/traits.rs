//! Module contract and module system errors
//!
//! Defines the trait every discoverable module implements and the error types
//! the composition run reports.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::config::{ConfigError, ConfigSection};
use crate::module::loader::UnitIdentity;
use crate::module::registry::ServiceRegistry;

/// Module trait that all discoverable modules implement
///
/// A module is instantiated with its no-argument constructor (see
/// [`ModuleCatalog`](crate::module::registry::ModuleCatalog)), asked for its
/// declared name and contract version, then given the shared registry and the
/// configuration section rooted at its name.
pub trait Module: Send + Sync {
    /// Logical module name, also the name of its configuration section
    fn name(&self) -> &str;

    /// Version of the module contract this module was written against
    fn contract_version(&self) -> &str;

    /// Contribute service registrations
    ///
    /// Called exactly once per composition run. Registrations added here are
    /// attributed to this module for conflict diagnostics.
    fn configure(
        &self,
        registry: &mut ServiceRegistry,
        config: &ConfigSection<'_>,
    ) -> Result<(), ModuleError>;
}

/// Per-module pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleState {
    /// Instantiated from a unit, not yet processed
    Discovered,
    /// `configure` is running
    Configuring,
    /// `configure` returned successfully
    ConfigOk,
    /// `configure` (or settings binding) failed
    ConfigFailed,
    /// Registrations diffed against earlier modules
    ConflictChecked,
    /// Fully registered, lifecycle hook invoked
    Registered,
    /// Skipped: failed configuration or incompatible contract version
    Rejected,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::Discovered => "discovered",
            ModuleState::Configuring => "configuring",
            ModuleState::ConfigOk => "config-ok",
            ModuleState::ConfigFailed => "config-failed",
            ModuleState::ConflictChecked => "conflict-checked",
            ModuleState::Registered => "registered",
            ModuleState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Identity of a discovered module, handed to lifecycle observers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleInfo {
    /// Catalog id of the component the module was built from
    pub component_id: String,
    /// Declared module name
    pub name: String,
    /// Declared contract version
    pub contract_version: String,
    /// Unit the module was discovered in
    pub unit: UnitIdentity,
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (v{}) [{}]", self.name, self.contract_version, self.component_id)
    }
}

/// Failures raised by module code while configuring services
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Module configuration failed: {0}")]
    Configuration(String),

    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Missing required setting '{0}'")]
    MissingSetting(String),

    #[error("Failed to bind settings for section '{section}': {reason}")]
    SettingsBinding { section: String, reason: String },

    #[error("Module version incompatible: declared {declared}, expected {expected}")]
    VersionIncompatible { declared: String, expected: String },

    #[error("Module constructor failed: {0}")]
    Construction(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Fatal composition errors; the only errors that abort a batch
///
/// Besides a failing critical module, a batch aborts when the base
/// configuration cannot be overlaid with the runtime overrides.
#[derive(Debug, Error)]
pub enum ModuleLoadError {
    #[error("Critical module '{module}' failed to configure services.")]
    CriticalModuleFailed {
        module: String,
        #[source]
        source: ModuleError,
    },

    #[error("Critical module '{module}' rejected: {source}")]
    CriticalModuleRejected {
        module: String,
        #[source]
        source: ModuleError,
    },

    #[error("Module configuration could not be built: {0}")]
    Configuration(#[from] ConfigError),
}

impl ModuleLoadError {
    /// Name of the module that aborted the batch, if a module did
    pub fn module(&self) -> Option<&str> {
        match self {
            ModuleLoadError::CriticalModuleFailed { module, .. }
            | ModuleLoadError::CriticalModuleRejected { module, .. } => Some(module),
            ModuleLoadError::Configuration(_) => None,
        }
    }
}
