//! Test utilities for module system testing
//!
//! Provides unit-file fixtures on a temporary directory and small modules
//! that register services or fail on demand.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use modhost::module::registry::UnitManifest;
use modhost::module::{
    ConfigSection, Implementation, Lifetime, Module, ModuleCatalog, ModuleError,
    ModuleHostBuilder, ServiceRegistry,
};

/// Test fixture for module system tests
pub struct ModuleTestFixture {
    /// Temporary directory for test data
    pub temp_dir: TempDir,
    /// Default search directory for units
    pub modules_dir: PathBuf,
}

impl ModuleTestFixture {
    /// Create a new test fixture with an empty modules directory
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let modules_dir = temp_dir.path().join("modules");
        std::fs::create_dir_all(&modules_dir)?;
        Ok(Self {
            temp_dir,
            modules_dir,
        })
    }

    /// Create (if needed) and return a directory under the fixture root
    pub fn dir(&self, name: &str) -> PathBuf {
        let dir = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&dir).expect("create fixture directory");
        dir
    }

    /// Write a unit manifest into the modules directory
    pub fn write_unit(&self, file: &str, name: &str, components: &[&str]) -> PathBuf {
        write_unit(&self.modules_dir, file, name, "1.0.0", components)
    }

    /// Write arbitrary bytes as a unit file into the modules directory
    pub fn write_raw(&self, file: &str, contents: &[u8]) -> PathBuf {
        let path = self.modules_dir.join(file);
        std::fs::write(&path, contents).expect("write raw unit");
        path
    }

    /// Builder searching the modules directory
    pub fn builder(&self, catalog: ModuleCatalog) -> ModuleHostBuilder {
        ModuleHostBuilder::new()
            .with_search_paths([self.modules_dir.clone()])
            .with_catalog(catalog)
    }
}

/// Write a unit manifest at `dir/file`
pub fn write_unit(dir: &Path, file: &str, name: &str, version: &str, components: &[&str]) -> PathBuf {
    let path = dir.join(file);
    let manifest = UnitManifest::new(name, version, components.iter().copied());
    std::fs::write(&path, manifest.to_toml_string().expect("render manifest"))
        .expect("write unit");
    path
}

/// Box a module as a catalog constructor result
pub fn boxed<M: Module + 'static>(module: M) -> Result<Box<dyn Module>, ModuleError> {
    Ok(Box::new(module))
}

/// Module registering one service with a named implementation
pub struct ServiceModule {
    pub name: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    pub implementation: &'static str,
    pub lifetime: Lifetime,
}

impl ServiceModule {
    pub fn singleton(name: &'static str, service: &'static str, implementation: &'static str) -> Self {
        Self {
            name,
            version: "1.0.0",
            service,
            implementation,
            lifetime: Lifetime::Singleton,
        }
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }
}

impl Module for ServiceModule {
    fn name(&self) -> &str {
        self.name
    }

    fn contract_version(&self) -> &str {
        self.version
    }

    fn configure(
        &self,
        registry: &mut ServiceRegistry,
        _config: &ConfigSection<'_>,
    ) -> Result<(), ModuleError> {
        registry.add(self.service, Implementation::named(self.implementation), self.lifetime);
        Ok(())
    }
}

/// Module whose `configure` always fails
pub struct FailingModule {
    pub name: &'static str,
}

impl Module for FailingModule {
    fn name(&self) -> &str {
        self.name
    }

    fn contract_version(&self) -> &str {
        "1.0.0"
    }

    fn configure(
        &self,
        _registry: &mut ServiceRegistry,
        _config: &ConfigSection<'_>,
    ) -> Result<(), ModuleError> {
        Err(ModuleError::Configuration(format!("{} cannot start", self.name)))
    }
}

/// Module recording the section values it was configured with
pub struct RecordingModule {
    pub name: &'static str,
    pub seen: Arc<Mutex<Vec<(String, Option<String>)>>>,
    pub key: &'static str,
}

impl Module for RecordingModule {
    fn name(&self) -> &str {
        self.name
    }

    fn contract_version(&self) -> &str {
        "1.0.0"
    }

    fn configure(
        &self,
        _registry: &mut ServiceRegistry,
        config: &ConfigSection<'_>,
    ) -> Result<(), ModuleError> {
        self.seen
            .lock()
            .map_err(|_| ModuleError::Configuration("poisoned".to_string()))?
            .push((config.path().to_string(), config.get(self.key).map(str::to_string)));
        Ok(())
    }
}
