//! Registration pipeline
//!
//! Runs each discovered module through version check, `configure`, settings
//! binding, conflict resolution and the module-loaded hook, strictly in the
//! order modules are handed in.
//!
//! The pipeline owns the conflict table for the duration of one run. The table
//! maps each service type to the registration currently considered
//! authoritative, seeded with whatever the host registered beforehand.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info, warn};

use crate::module::builder::ModuleHostOptions;
use crate::module::config::{combine_path, ConfigSection, MergedConfig};
use crate::module::registry::{
    ModuleDescriptor, RegistrationId, ServiceKey, ServiceRegistration, ServiceRegistry,
};
use crate::module::traits::{ModuleError, ModuleInfo, ModuleLoadError, ModuleState};
use crate::utils::panic_message;

/// Origin reported for registrations made by the host before the run
pub const HOST_ORIGIN: &str = "<host>";

/// Final state of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOutcome {
    pub info: ModuleInfo,
    pub state: ModuleState,
    /// Every state the module passed through, ending with `state`
    pub states: Vec<ModuleState>,
    /// Why the module was rejected
    pub error: Option<String>,
}

/// A resolved last-registration-wins collision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    pub service_type: ServiceKey,
    /// `None` when the losing registration came from the host
    pub lost_module: Option<String>,
    pub won_module: String,
    pub lost_implementation: String,
    pub won_implementation: String,
}

impl ConflictRecord {
    pub fn lost_module_name(&self) -> &str {
        self.lost_module.as_deref().unwrap_or(HOST_ORIGIN)
    }
}

impl fmt::Display for ConflictRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "service '{}': '{}' ({}) replaced '{}' ({})",
            self.service_type,
            self.won_module,
            self.won_implementation,
            self.lost_module_name(),
            self.lost_implementation
        )
    }
}

/// Per-run module registration state machine
pub struct RegistrationPipeline<'a> {
    options: &'a ModuleHostOptions,
    config: &'a MergedConfig,
    tracked: HashMap<ServiceKey, ServiceRegistration>,
    outcomes: Vec<ModuleOutcome>,
    conflicts: Vec<ConflictRecord>,
}

impl<'a> RegistrationPipeline<'a> {
    /// Create a pipeline, seeding the conflict table from `registry`
    pub fn new(
        options: &'a ModuleHostOptions,
        config: &'a MergedConfig,
        registry: &ServiceRegistry,
    ) -> Self {
        let mut tracked = HashMap::new();
        for registration in registry.iter() {
            tracked
                .entry(registration.service_type.clone())
                .or_insert_with(|| registration.clone());
        }
        debug!("Registration pipeline seeded with {} host service types", tracked.len());

        Self {
            options,
            config,
            tracked,
            outcomes: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn outcomes(&self) -> &[ModuleOutcome] {
        &self.outcomes
    }

    pub fn conflicts(&self) -> &[ConflictRecord] {
        &self.conflicts
    }

    pub fn into_results(self) -> (Vec<ModuleOutcome>, Vec<ConflictRecord>) {
        (self.outcomes, self.conflicts)
    }

    /// Configuration path of a module's section
    pub fn section_path(&self, module_name: &str) -> String {
        match &self.options.config_root {
            Some(root) => combine_path(root, module_name),
            None => module_name.to_string(),
        }
    }

    /// Process modules in order; stops at the first fatal error
    pub fn process_all<'d, I>(
        &mut self,
        registry: &mut ServiceRegistry,
        descriptors: I,
    ) -> Result<(), ModuleLoadError>
    where
        I: IntoIterator<Item = &'d ModuleDescriptor>,
    {
        for descriptor in descriptors {
            self.process(registry, descriptor)?;
        }
        Ok(())
    }

    /// Run one module through the pipeline
    ///
    /// Returns the module's final state (`Registered` or `Rejected`), or a
    /// fatal error if a critical module failed.
    pub fn process(
        &mut self,
        registry: &mut ServiceRegistry,
        descriptor: &ModuleDescriptor,
    ) -> Result<ModuleState, ModuleLoadError> {
        let options = self.options;
        let info = &descriptor.info;
        let name = info.name.as_str();
        let critical = options.is_critical(name);
        let mut states = Vec::new();
        transition(&mut states, name, ModuleState::Discovered);

        info!(
            "Found module '{}' (v{}) in unit {}",
            name, info.contract_version, info.unit
        );

        if let Some(expected) = &options.expected_contract_version {
            debug!(
                "Module '{}' contract version {}, compatibility strategy {}",
                name, info.contract_version, options.version_compatibility
            );
            if !options.version_policy().accepts(&info.contract_version, expected) {
                let err = ModuleError::VersionIncompatible {
                    declared: info.contract_version.clone(),
                    expected: expected.clone(),
                };
                if critical {
                    error!("Critical module '{}' rejected: {}", name, err);
                    self.record(info, states, ModuleState::Rejected, Some(&err));
                    return Err(ModuleLoadError::CriticalModuleRejected {
                        module: name.to_string(),
                        source: err,
                    });
                }
                warn!("Module '{}' rejected: {}", name, err);
                self.record(info, states, ModuleState::Rejected, Some(&err));
                return Ok(ModuleState::Rejected);
            }
        }

        let section_path = self.section_path(name);
        let section = self.config.section(&section_path);
        let before = registry.ids();

        transition(&mut states, name, ModuleState::Configuring);
        let previous_origin = registry.set_origin(Some(name.to_string()));
        let configured = configure(registry, descriptor, &section);
        registry.set_origin(previous_origin);

        if let Err(err) = configured {
            transition(&mut states, name, ModuleState::ConfigFailed);
            let added: Vec<_> = registry.ids().difference(&before).copied().collect();
            for id in added {
                registry.remove(id);
            }

            if critical {
                error!("Critical module '{}' failed during service configuration: {}", name, err);
                self.record(info, states, ModuleState::ConfigFailed, Some(&err));
                return Err(ModuleLoadError::CriticalModuleFailed {
                    module: name.to_string(),
                    source: err,
                });
            }
            error!("Module '{}' failed during service configuration: {}", name, err);
            self.record(info, states, ModuleState::Rejected, Some(&err));
            return Ok(ModuleState::Rejected);
        }
        transition(&mut states, name, ModuleState::ConfigOk);

        self.resolve_conflicts(registry, name, &before);
        transition(&mut states, name, ModuleState::ConflictChecked);

        if let Some(hook) = &options.on_module_loaded {
            let snapshot = registry.snapshot();
            hook(info, &snapshot);
        }

        self.record(info, states, ModuleState::Registered, None);
        info!("Module '{}' registered", name);
        Ok(ModuleState::Registered)
    }

    /// Diff the registrations added by `module_name` against the conflict table
    fn resolve_conflicts(
        &mut self,
        registry: &mut ServiceRegistry,
        module_name: &str,
        before: &HashSet<RegistrationId>,
    ) {
        let added: Vec<ServiceRegistration> = registry
            .iter()
            .filter(|r| !before.contains(&r.id))
            .cloned()
            .collect();

        // Decided against the table as it stood before this module ran
        let mut winners: BTreeMap<ServiceKey, ServiceRegistration> = BTreeMap::new();
        let mut fresh: BTreeMap<ServiceKey, ServiceRegistration> = BTreeMap::new();

        for registration in added {
            match self.tracked.get(&registration.service_type) {
                Some(previous) if registry.get_by_id(previous.id).is_none() => {
                    fresh.entry(registration.service_type.clone()).or_insert(registration);
                }
                Some(previous) if collides(previous, &registration) => {
                    winners.insert(registration.service_type.clone(), registration);
                }
                Some(_) => {}
                None => {
                    fresh.entry(registration.service_type.clone()).or_insert(registration);
                }
            }
        }

        for (service_type, winner) in winners {
            let Some(previous) = self.tracked.get(&service_type) else {
                continue;
            };
            let record = ConflictRecord {
                service_type: service_type.clone(),
                lost_module: previous.origin.clone(),
                won_module: module_name.to_string(),
                lost_implementation: implementation_name(previous),
                won_implementation: implementation_name(&winner),
            };
            warn!(
                "Dependency conflict detected for service type '{}'. Registration from '{}' replaced by last registration from module '{}'.",
                service_type,
                record.lost_module_name(),
                module_name
            );
            registry.remove(previous.id);
            self.conflicts.push(record);
            self.tracked.insert(service_type, winner);
        }

        for (service_type, registration) in fresh {
            self.tracked.insert(service_type, registration);
        }
    }

    fn record(
        &mut self,
        info: &ModuleInfo,
        mut states: Vec<ModuleState>,
        state: ModuleState,
        error: Option<&ModuleError>,
    ) {
        if states.last() != Some(&state) {
            transition(&mut states, &info.name, state);
        }
        self.outcomes.push(ModuleOutcome {
            info: info.clone(),
            state,
            states,
            error: error.map(|e| e.to_string()),
        });
    }
}

/// Invoke `configure` and the companion settings binder
fn configure(
    registry: &mut ServiceRegistry,
    descriptor: &ModuleDescriptor,
    section: &ConfigSection<'_>,
) -> Result<(), ModuleError> {
    let configured = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), ModuleError> {
        descriptor.module.configure(registry, section)?;
        if let Some(settings) = &descriptor.settings {
            (settings.binder)(registry, section)?;
            debug!(
                "Bound configuration section '{}' to '{}'",
                section.path(),
                settings.id
            );
        } else {
            debug!("No settings component for module '{}'", descriptor.info.name);
        }
        Ok(())
    }));
    configured.unwrap_or_else(|payload| {
        Err(ModuleError::Configuration(format!(
            "panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

/// Same lifetime, different concrete implementation, no factories
fn collides(previous: &ServiceRegistration, current: &ServiceRegistration) -> bool {
    if previous.lifetime != current.lifetime {
        return false;
    }
    match (
        previous.implementation.concrete_type(),
        current.implementation.concrete_type(),
    ) {
        (Some(old), Some(new)) => old != new,
        _ => false,
    }
}

fn implementation_name(registration: &ServiceRegistration) -> String {
    registration
        .implementation
        .concrete_type()
        .unwrap_or("<factory>")
        .to_string()
}

fn transition(states: &mut Vec<ModuleState>, module_name: &str, state: ModuleState) {
    debug!("Module '{}' -> {}", module_name, state);
    states.push(state);
}
