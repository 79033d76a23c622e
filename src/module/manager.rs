//! Module manager for orchestrating a composition run
//!
//! Builds the merged configuration, loads units from the search paths,
//! discovers their modules and feeds them through the registration pipeline.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::module::builder::{ModuleHostBuilder, ModuleHostOptions};
use crate::module::config::{ConfigTree, ConfigurationOverlay, MergedConfig};
use crate::module::loader::{
    LoadedUnit, ManifestUnitReader, ReleasedUnits, UnitError, UnitLoader, UnitReader,
};
use crate::module::pipeline::{ConflictRecord, ModuleOutcome, RegistrationPipeline};
use crate::module::registry::{DiscoveryError, ModuleCatalog, ModuleDiscovery, ServiceRegistry};
use crate::module::traits::{ModuleLoadError, ModuleState};
use crate::utils::log_error;

/// Everything a composition run produced
#[derive(Debug)]
pub struct Composition {
    /// Base configuration overlaid with the overrides
    pub config: MergedConfig,
    /// One outcome per processed module, in processing order
    pub outcomes: Vec<ModuleOutcome>,
    pub conflicts: Vec<ConflictRecord>,
    pub discovery_errors: Vec<DiscoveryError>,
    /// Unit files under the search paths that could not be loaded
    pub unit_failures: Vec<UnitError>,
    /// Units processed, in search-path order
    pub units: Vec<Arc<LoadedUnit>>,
}

impl Composition {
    pub fn outcome(&self, module_name: &str) -> Option<&ModuleOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|o| o.info.name.eq_ignore_ascii_case(module_name))
    }

    /// Names of modules that ended up registered
    pub fn registered_modules(&self) -> Vec<&str> {
        self.modules_in(ModuleState::Registered)
    }

    pub fn rejected_modules(&self) -> Vec<&str> {
        self.modules_in(ModuleState::Rejected)
    }

    fn modules_in(&self, state: ModuleState) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.state == state)
            .map(|o| o.info.name.as_str())
            .collect()
    }
}

/// Module manager coordinates one or more composition runs
pub struct ModuleManager {
    options: ModuleHostOptions,
    catalog: Arc<ModuleCatalog>,
    /// Loader of the latest run
    loader: Option<UnitLoader>,
    /// Outcomes of the latest run
    outcomes: Vec<ModuleOutcome>,
}

impl ModuleManager {
    /// Create a module manager; uses the `inventory` catalog unless the
    /// options carry one
    pub fn new(options: ModuleHostOptions) -> Self {
        let catalog = options
            .catalog
            .clone()
            .unwrap_or_else(|| Arc::new(ModuleCatalog::from_inventory()));
        Self {
            options,
            catalog,
            loader: None,
            outcomes: Vec::new(),
        }
    }

    /// Configure a builder, then compose in one step
    pub fn compose_with<F>(
        registry: &mut ServiceRegistry,
        base: &ConfigTree,
        configure: F,
    ) -> Result<Composition, ModuleLoadError>
    where
        F: FnOnce(ModuleHostBuilder) -> ModuleHostBuilder,
    {
        let options = configure(ModuleHostBuilder::new()).build();
        ModuleManager::new(options).compose(registry, base)
    }

    pub fn options(&self) -> &ModuleHostOptions {
        &self.options
    }

    /// Loader of the latest run
    pub fn loader(&self) -> Option<&UnitLoader> {
        self.loader.as_ref()
    }

    /// Run the whole composition against `registry`
    ///
    /// Only a critical module failure, or configuration that cannot be
    /// overlaid, returns an error; everything else is logged and reported in
    /// the [`Composition`].
    pub fn compose(
        &mut self,
        registry: &mut ServiceRegistry,
        base: &ConfigTree,
    ) -> Result<Composition, ModuleLoadError> {
        if let Some(released) = self.release() {
            debug!("Released {} units from the previous run", released.len());
        }

        let options = self.options.clone();
        info!(
            "Composing modules from {} search paths ({} overrides)",
            options.search_paths.len(),
            options.overrides.len()
        );

        let config = ConfigurationOverlay::build_rooted(
            base,
            &options.overrides,
            options.config_root.as_deref(),
        )?;

        let reader: Arc<dyn UnitReader> = options
            .unit_reader
            .clone()
            .unwrap_or_else(|| Arc::new(ManifestUnitReader::new()));
        let mut loader =
            UnitLoader::with_reader(&options.context_name, options.search_paths.clone(), reader);
        if let Some(pre_load) = &options.pre_load_action {
            pre_load(&mut loader);
        }

        let discovery = ModuleDiscovery::new(Arc::clone(&self.catalog));
        let mut run = Run {
            pipeline: RegistrationPipeline::new(&options, &config, registry),
            discovery: &discovery,
            processed: HashSet::new(),
            discovery_errors: Vec::new(),
            unit_failures: Vec::new(),
            units: Vec::new(),
        };

        let mut result = Ok(());
        for search_path in &options.search_paths {
            result = run.search_path(&mut loader, registry, search_path);
            if result.is_err() {
                break;
            }
        }

        let Run {
            pipeline,
            discovery_errors,
            unit_failures,
            units,
            ..
        } = run;
        let (outcomes, conflicts) = pipeline.into_results();
        self.outcomes = outcomes.clone();
        self.loader = Some(loader);

        if let Err(e) = result {
            error!("Module composition aborted: {}", e);
            return Err(e);
        }

        info!(
            "Module composition finished: {} modules processed, {} conflicts resolved, {} discovery errors, {} unit failures",
            outcomes.len(),
            conflicts.len(),
            discovery_errors.len(),
            unit_failures.len()
        );

        Ok(Composition {
            config,
            outcomes,
            conflicts,
            discovery_errors,
            unit_failures,
            units,
        })
    }

    /// State of a module after the latest run
    pub fn module_state(&self, module_name: &str) -> Option<ModuleState> {
        self.outcomes
            .iter()
            .rev()
            .find(|o| o.info.name.eq_ignore_ascii_case(module_name))
            .map(|o| o.state)
    }

    /// Names of every module processed in the latest run
    pub fn list_modules(&self) -> Vec<String> {
        self.outcomes.iter().map(|o| o.info.name.clone()).collect()
    }

    /// Release the latest run's loader
    pub fn release(&mut self) -> Option<ReleasedUnits> {
        self.loader.take().map(|mut loader| loader.release())
    }
}

/// State of one composition run
struct Run<'a> {
    pipeline: RegistrationPipeline<'a>,
    discovery: &'a ModuleDiscovery,
    /// Cache keys of units already processed
    processed: HashSet<String>,
    discovery_errors: Vec<DiscoveryError>,
    unit_failures: Vec<UnitError>,
    units: Vec<Arc<LoadedUnit>>,
}

impl Run<'_> {
    fn search_path(
        &mut self,
        loader: &mut UnitLoader,
        registry: &mut ServiceRegistry,
        search_path: &Path,
    ) -> Result<(), ModuleLoadError> {
        if search_path.is_file() {
            return self.unit_file(loader, registry, search_path);
        }

        if search_path.is_dir() {
            let Some(entries) = log_error(
                || std::fs::read_dir(search_path),
                &format!("Failed to scan unit directory {:?}", search_path),
            ) else {
                return Ok(());
            };
            let mut files: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && loader.is_unit_file(path))
                .collect();
            files.sort();
            debug!("Found {} unit files in {:?}", files.len(), search_path);

            for file in files {
                self.unit_file(loader, registry, &file)?;
            }
            return Ok(());
        }

        debug!("Search path {:?} does not exist, skipping", search_path);
        Ok(())
    }

    fn unit_file(
        &mut self,
        loader: &mut UnitLoader,
        registry: &mut ServiceRegistry,
        path: &Path,
    ) -> Result<(), ModuleLoadError> {
        let unit = match loader.load_from_path(path) {
            Ok(unit) => unit,
            Err(e) => {
                match &e {
                    UnitError::Internal { .. } => error!("Error loading unit: {}", e),
                    _ => warn!("Error loading unit: {}", e),
                }
                self.unit_failures.push(e);
                return Ok(());
            }
        };

        if !self.processed.insert(unit.identity().cache_key()) {
            debug!("Unit {} already processed, skipping {:?}", unit.identity(), path);
            return Ok(());
        }

        let report = self.discovery.discover(&unit);
        self.discovery_errors.extend(report.errors);
        self.units.push(unit);
        self.pipeline.process_all(registry, &report.modules)
    }
}
