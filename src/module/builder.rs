//! Module host options and their fluent builder
//!
//! Pure configuration accumulation: nothing here touches the filesystem.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::module::config::ConfigOverrides;
use crate::module::loader::{UnitLoader, UnitReader};
use crate::module::registry::{ModuleCatalog, RegistrySnapshot};
use crate::module::traits::ModuleInfo;
use crate::module::version::{VersionCompatibilityStrategy, VersionPolicy};

/// Invoked once with the loader before any unit is loaded
pub type PreLoadAction = Arc<dyn Fn(&mut UnitLoader) + Send + Sync>;

/// Invoked once per registered module with the registry as it stands then
pub type ModuleLoadedAction = Arc<dyn Fn(&ModuleInfo, &RegistrySnapshot) + Send + Sync>;

/// Default loader context name
pub const DEFAULT_CONTEXT_NAME: &str = "modhost";

/// Options for one composition run
#[derive(Clone)]
pub struct ModuleHostOptions {
    /// Unit files or directories, searched in order
    pub search_paths: Vec<PathBuf>,
    /// Modules whose failure aborts the run (matched case-insensitively)
    pub critical_modules: Vec<String>,
    pub pre_load_action: Option<PreLoadAction>,
    pub on_module_loaded: Option<ModuleLoadedAction>,
    pub overrides: ConfigOverrides,
    pub version_compatibility: VersionCompatibilityStrategy,
    /// Replaces `version_compatibility` when set
    pub version_policy: Option<Arc<dyn VersionPolicy>>,
    /// Baseline contract version; no version check when unset
    pub expected_contract_version: Option<String>,
    /// Parent section of all module sections (`{root}:{module}`)
    pub config_root: Option<String>,
    /// Component catalog; the `inventory` catalog when unset
    pub catalog: Option<Arc<ModuleCatalog>>,
    /// Unit reader; TOML manifests when unset
    pub unit_reader: Option<Arc<dyn UnitReader>>,
    pub context_name: String,
}

impl Default for ModuleHostOptions {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            critical_modules: Vec::new(),
            pre_load_action: None,
            on_module_loaded: None,
            overrides: ConfigOverrides::new(),
            version_compatibility: VersionCompatibilityStrategy::default(),
            version_policy: None,
            expected_contract_version: None,
            config_root: None,
            catalog: None,
            unit_reader: None,
            context_name: DEFAULT_CONTEXT_NAME.to_string(),
        }
    }
}

impl ModuleHostOptions {
    /// Record an override for `{module_name}:{key}`; last write wins
    pub fn override_setting(&mut self, module_name: &str, key: &str, value: &str) {
        self.overrides.set(module_name, key, value);
    }

    pub fn is_critical(&self, module_name: &str) -> bool {
        self.critical_modules
            .iter()
            .any(|critical| critical.eq_ignore_ascii_case(module_name))
    }

    /// Policy deciding contract version acceptance
    pub fn version_policy(&self) -> &dyn VersionPolicy {
        match &self.version_policy {
            Some(policy) => policy.as_ref(),
            None => &self.version_compatibility,
        }
    }
}

impl fmt::Debug for ModuleHostOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHostOptions")
            .field("search_paths", &self.search_paths)
            .field("critical_modules", &self.critical_modules)
            .field("pre_load_action", &self.pre_load_action.is_some())
            .field("on_module_loaded", &self.on_module_loaded.is_some())
            .field("overrides", &self.overrides.len())
            .field("version_compatibility", &self.version_compatibility)
            .field("custom_version_policy", &self.version_policy.is_some())
            .field("expected_contract_version", &self.expected_contract_version)
            .field("config_root", &self.config_root)
            .field("context_name", &self.context_name)
            .finish()
    }
}

/// Fluent builder for [`ModuleHostOptions`]
///
/// ```rust
/// use modhost::module::{ModuleHostBuilder, VersionCompatibilityStrategy};
///
/// let options = ModuleHostBuilder::new()
///     .with_search_paths(["./mods"])
///     .with_critical_modules(["Core"])
///     .override_setting("Beta", "timeout", "30")
///     .with_version_compatibility(VersionCompatibilityStrategy::MajorOnly)
///     .build();
///
/// assert!(options.is_critical("core"));
/// assert_eq!(options.overrides.get("Beta", "timeout"), Some("30"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModuleHostBuilder {
    options: ModuleHostOptions,
}

impl ModuleHostBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the search paths
    pub fn with_search_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.options.search_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the critical module set
    pub fn with_critical_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.critical_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pre_load_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut UnitLoader) + Send + Sync + 'static,
    {
        self.options.pre_load_action = Some(Arc::new(action));
        self
    }

    pub fn with_on_module_loaded_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&ModuleInfo, &RegistrySnapshot) + Send + Sync + 'static,
    {
        self.options.on_module_loaded = Some(Arc::new(action));
        self
    }

    pub fn override_setting(mut self, module_name: &str, key: &str, value: &str) -> Self {
        self.options.override_setting(module_name, key, value);
        self
    }

    pub fn with_version_compatibility(mut self, strategy: VersionCompatibilityStrategy) -> Self {
        self.options.version_compatibility = strategy;
        self
    }

    pub fn with_version_policy<P: VersionPolicy + 'static>(mut self, policy: P) -> Self {
        self.options.version_policy = Some(Arc::new(policy));
        self
    }

    pub fn with_expected_contract_version(mut self, version: &str) -> Self {
        self.options.expected_contract_version = Some(version.to_string());
        self
    }

    pub fn with_config_root(mut self, root: &str) -> Self {
        self.options.config_root = Some(root.to_string());
        self
    }

    pub fn with_catalog(mut self, catalog: ModuleCatalog) -> Self {
        self.options.catalog = Some(Arc::new(catalog));
        self
    }

    pub fn with_unit_reader<R: UnitReader + 'static>(mut self, reader: R) -> Self {
        self.options.unit_reader = Some(Arc::new(reader));
        self
    }

    pub fn with_context_name(mut self, name: &str) -> Self {
        self.options.context_name = name.to_string();
        self
    }

    /// Options accumulated so far
    pub fn options(&self) -> &ModuleHostOptions {
        &self.options
    }

    pub fn build(self) -> ModuleHostOptions {
        self.options
    }
}
