//! Host configuration
//!
//! File-based configuration for a host embedding the module system: where to
//! look for units, which modules are critical, runtime overrides, and logging.
//! Loaded from TOML or JSON and applied to a [`ModuleHostBuilder`].

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::module::builder::ModuleHostBuilder;
use crate::module::version::VersionCompatibilityStrategy;

/// Module system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Unit files or directories, searched in order
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<String>,

    /// Modules whose configuration failure aborts the run
    #[serde(default)]
    pub critical_modules: Vec<String>,

    #[serde(default)]
    pub version_compatibility: VersionCompatibilityStrategy,

    /// Baseline contract version (no version check when unset)
    #[serde(default)]
    pub expected_contract_version: Option<String>,

    /// Parent section of all module sections
    #[serde(default)]
    pub config_root: Option<String>,

    /// Loader context name
    #[serde(default = "default_context_name")]
    pub context_name: String,

    /// Module-specific setting overrides (`module -> key -> value`)
    #[serde(default)]
    pub overrides: BTreeMap<String, BTreeMap<String, String>>,
}

fn default_search_paths() -> Vec<String> {
    vec!["modules".to_string()]
}

fn default_context_name() -> String {
    crate::module::builder::DEFAULT_CONTEXT_NAME.to_string()
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            search_paths: default_search_paths(),
            critical_modules: Vec::new(),
            version_compatibility: VersionCompatibilityStrategy::default(),
            expected_contract_version: None,
            config_root: None,
            context_name: default_context_name(),
            overrides: BTreeMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "modhost::module=debug"); `RUST_LOG` wins
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON log lines (needs the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Host configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub modules: ModulesConfig,

    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl HostConfig {
    /// Load configuration from TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read host config {:?}", path))?;
        let config: HostConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse host config {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read host config {:?}", path))?;
        let config: HostConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse host config {:?}", path))?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Feed the `[modules]` section into a builder
    ///
    /// Search paths and critical modules replace what the builder holds;
    /// overrides are added on top of any already recorded.
    pub fn apply(&self, builder: ModuleHostBuilder) -> ModuleHostBuilder {
        let modules = &self.modules;
        let mut builder = builder
            .with_search_paths(modules.search_paths.iter().map(String::as_str))
            .with_critical_modules(modules.critical_modules.iter().cloned())
            .with_version_compatibility(modules.version_compatibility)
            .with_context_name(&modules.context_name);

        if let Some(version) = &modules.expected_contract_version {
            builder = builder.with_expected_contract_version(version);
        }
        if let Some(root) = &modules.config_root {
            builder = builder.with_config_root(root);
        }
        for (module_name, settings) in &modules.overrides {
            for (key, value) in settings {
                builder = builder.override_setting(module_name, key, value);
            }
        }
        builder
    }
}
