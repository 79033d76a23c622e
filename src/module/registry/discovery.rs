//! Module discovery
//!
//! Enumerates the components a loaded unit lists, instantiates its modules
//! through the catalog, and pairs companion settings with their modules.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::module::loader::{LoadedUnit, UnitIdentity};
use crate::module::registry::catalog::{namespace_of, ComponentKind, ModuleCatalog, SettingsBinder};
use crate::module::traits::{Module, ModuleError, ModuleInfo};
use crate::utils::panic_message;

/// A component of a unit that could not be turned into a module
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("Unit {unit}: unknown component '{component}'")]
    UnknownComponent { unit: UnitIdentity, component: String },

    #[error("Unit {unit}: component '{component}' failed to construct: {reason}")]
    ConstructionFailed {
        unit: UnitIdentity,
        component: String,
        reason: String,
    },

    #[error("Unit {unit}: component '{component}' is not a module and has no module to pair with")]
    NotAModule { unit: UnitIdentity, component: String },
}

/// Settings component paired with a module
#[derive(Clone)]
pub struct SettingsComponent {
    pub id: String,
    pub binder: SettingsBinder,
}

impl fmt::Debug for SettingsComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsComponent").field("id", &self.id).finish()
    }
}

/// An instantiated module ready for the registration pipeline
#[derive(Clone)]
pub struct ModuleDescriptor {
    pub info: ModuleInfo,
    pub module: Arc<dyn Module>,
    pub settings: Option<SettingsComponent>,
}

impl ModuleDescriptor {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn contract_version(&self) -> &str {
        &self.info.contract_version
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("info", &self.info)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Result of discovering one unit
///
/// `modules` holds everything that could be instantiated, in manifest order;
/// `errors` lists each component that could not.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub modules: Vec<ModuleDescriptor>,
    pub errors: Vec<DiscoveryError>,
}

impl DiscoveryReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Module discovery over a component catalog
pub struct ModuleDiscovery {
    catalog: Arc<ModuleCatalog>,
}

impl ModuleDiscovery {
    pub fn new(catalog: Arc<ModuleCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// Discover all modules in a loaded unit
    pub fn discover(&self, unit: &LoadedUnit) -> DiscoveryReport {
        let identity = unit.identity();
        let mut report = DiscoveryReport::default();
        let mut settings: BTreeMap<String, SettingsComponent> = BTreeMap::new();

        for component in unit.component_ids() {
            match self.catalog.get(component) {
                None => {
                    warn!("Unit {} lists unknown component {}", identity, component);
                    report.errors.push(DiscoveryError::UnknownComponent {
                        unit: identity.clone(),
                        component: component.to_string(),
                    });
                }
                Some(ComponentKind::Abstract) => {
                    debug!("Skipping abstract component {} in unit {}", component, identity);
                }
                Some(ComponentKind::Settings(binder)) => {
                    settings
                        .entry(namespace_of(component).to_string())
                        .or_insert_with(|| SettingsComponent {
                            id: component.to_string(),
                            binder: Arc::clone(binder),
                        });
                }
                Some(ComponentKind::Module(constructor)) => {
                    let built = panic::catch_unwind(AssertUnwindSafe(|| constructor()))
                        .unwrap_or_else(|payload| {
                            Err(ModuleError::Construction(panic_message(payload.as_ref())))
                        });
                    match built {
                        Ok(module) => {
                            let module: Arc<dyn Module> = Arc::from(module);
                            debug!(
                                "Discovered module {} (v{}) in unit {}",
                                module.name(),
                                module.contract_version(),
                                identity
                            );
                            report.modules.push(ModuleDescriptor {
                                info: ModuleInfo {
                                    component_id: component.to_string(),
                                    name: module.name().to_string(),
                                    contract_version: module.contract_version().to_string(),
                                    unit: identity.clone(),
                                },
                                module,
                                settings: None,
                            });
                        }
                        Err(e) => {
                            error!(
                                "Failed to construct component {} in unit {}: {}",
                                component, identity, e
                            );
                            report.errors.push(DiscoveryError::ConstructionFailed {
                                unit: identity.clone(),
                                component: component.to_string(),
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        for descriptor in &mut report.modules {
            let namespace = namespace_of(&descriptor.info.component_id);
            descriptor.settings = settings.get(namespace).cloned();
        }

        for (namespace, component) in &settings {
            let paired = report
                .modules
                .iter()
                .any(|m| namespace_of(&m.info.component_id) == namespace.as_str());
            if !paired {
                warn!("Settings component {} in unit {} has no module", component.id, identity);
                report.errors.push(DiscoveryError::NotAModule {
                    unit: identity.clone(),
                    component: component.id.clone(),
                });
            }
        }

        info!(
            "Discovered {} modules in unit {} ({} components skipped)",
            report.modules.len(),
            identity,
            report.errors.len()
        );
        report
    }
}
