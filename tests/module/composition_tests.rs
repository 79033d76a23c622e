//! End-to-end composition tests
//!
//! Units on disk, modules from a catalog, one composition run per test.

use std::sync::{Arc, Mutex};

use serde::Deserialize;

use modhost::module::registry::DiscoveryError;
use modhost::module::{
    construct_default, ComponentRegistration, ConfigSection, ConfigTree, Implementation, Lifetime,
    Module, ModuleCatalog, ModuleError, ModuleLoadError, ModuleManager, ModuleState, ServiceKey,
    ServiceRegistry, Settings, VersionCompatibilityStrategy,
};
use modhost::HostConfig;

use super::test_utils::*;

fn alpha_beta_catalog() -> ModuleCatalog {
    let mut catalog = ModuleCatalog::new();
    catalog
        .register_module("alpha::AlphaModule", || {
            boxed(ServiceModule::singleton("Alpha", "serviceX", "implA"))
        })
        .register_module("beta::BetaModule", || {
            boxed(ServiceModule::singleton("Beta", "serviceX", "implB"))
        });
    catalog
}

fn implementation_of(registry: &ServiceRegistry, service: &str) -> Option<String> {
    registry
        .get(&ServiceKey::new(service))
        .and_then(|r| r.implementation.concrete_type().map(str::to_string))
}

#[test]
fn test_last_module_wins_and_conflict_is_reported() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("A.bin", "Alpha", &["alpha::AlphaModule"]);
    fixture.write_unit("B.bin", "Beta", &["beta::BetaModule"]);

    let options = fixture.builder(alpha_beta_catalog()).build();
    let mut registry = ServiceRegistry::new();
    let composition = ModuleManager::new(options)
        .compose(&mut registry, &ConfigTree::new())
        .unwrap();

    assert_eq!(composition.registered_modules(), vec!["Alpha", "Beta"]);
    assert_eq!(implementation_of(&registry, "serviceX").as_deref(), Some("implB"));
    assert_eq!(registry.get_all(&ServiceKey::new("serviceX")).len(), 1);

    assert_eq!(composition.conflicts.len(), 1);
    let conflict = &composition.conflicts[0];
    assert_eq!(conflict.service_type, ServiceKey::new("serviceX"));
    assert_eq!(conflict.lost_module.as_deref(), Some("Alpha"));
    assert_eq!(conflict.won_module, "Beta");
    assert_eq!(conflict.lost_implementation, "implA");
    assert_eq!(conflict.won_implementation, "implB");
}

#[test]
fn test_host_registration_loses_to_module() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("A.bin", "Alpha", &["alpha::AlphaModule"]);

    let mut registry = ServiceRegistry::new();
    registry.add("serviceX", Implementation::named("hostImpl"), Lifetime::Singleton);

    let options = fixture.builder(alpha_beta_catalog()).build();
    let composition = ModuleManager::new(options)
        .compose(&mut registry, &ConfigTree::new())
        .unwrap();

    assert_eq!(implementation_of(&registry, "serviceX").as_deref(), Some("implA"));
    assert_eq!(composition.conflicts.len(), 1);
    assert_eq!(composition.conflicts[0].lost_module, None);
    assert_eq!(composition.conflicts[0].lost_module_name(), "<host>");
}

fn core_catalog() -> ModuleCatalog {
    let mut catalog = ModuleCatalog::new();
    catalog
        .register_module("alpha::AlphaModule", || {
            boxed(ServiceModule::singleton("Alpha", "serviceA", "implA"))
        })
        .register_module("core::CoreModule", || boxed(FailingModule { name: "Core" }))
        .register_module("delta::DeltaModule", || {
            boxed(ServiceModule::singleton("Delta", "serviceD", "implD"))
        });
    catalog
}

fn write_core_units(fixture: &ModuleTestFixture) {
    fixture.write_unit("A.bin", "Alpha", &["alpha::AlphaModule"]);
    fixture.write_unit("C.bin", "Core", &["core::CoreModule"]);
    fixture.write_unit("D.bin", "Delta", &["delta::DeltaModule"]);
}

#[test]
fn test_critical_failure_aborts_the_run() {
    let fixture = ModuleTestFixture::new().unwrap();
    write_core_units(&fixture);

    let options = fixture
        .builder(core_catalog())
        .with_critical_modules(["Core"])
        .build();
    let mut manager = ModuleManager::new(options);
    let mut registry = ServiceRegistry::new();

    let err = manager
        .compose(&mut registry, &ConfigTree::new())
        .unwrap_err();

    assert!(matches!(err, ModuleLoadError::CriticalModuleFailed { .. }));
    assert_eq!(err.module(), Some("Core"));
    assert_eq!(err.to_string(), "Critical module 'Core' failed to configure services.");

    assert_eq!(manager.module_state("Alpha"), Some(ModuleState::Registered));
    assert_eq!(manager.module_state("Core"), Some(ModuleState::ConfigFailed));
    assert_eq!(manager.module_state("Delta"), None);
    assert!(registry.contains(&ServiceKey::new("serviceA")));
    assert!(!registry.contains(&ServiceKey::new("serviceD")));
}

#[test]
fn test_non_critical_failure_is_skipped() {
    let fixture = ModuleTestFixture::new().unwrap();
    write_core_units(&fixture);

    let options = fixture.builder(core_catalog()).build();
    let mut registry = ServiceRegistry::new();
    let composition = ModuleManager::new(options)
        .compose(&mut registry, &ConfigTree::new())
        .unwrap();

    assert_eq!(composition.registered_modules(), vec!["Alpha", "Delta"]);
    assert_eq!(composition.rejected_modules(), vec!["Core"]);
    let core = composition.outcome("core").unwrap();
    assert!(core.error.as_deref().unwrap().contains("Core cannot start"));
    assert!(registry.contains(&ServiceKey::new("serviceD")));
}

#[test]
fn test_unknown_component_is_reported_and_rest_processed() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("A.bin", "Alpha", &["ghost::Ghost", "alpha::AlphaModule"]);

    let options = fixture.builder(alpha_beta_catalog()).build();
    let composition = ModuleManager::new(options)
        .compose(&mut ServiceRegistry::new(), &ConfigTree::new())
        .unwrap();

    assert_eq!(composition.registered_modules(), vec!["Alpha"]);
    assert_eq!(composition.discovery_errors.len(), 1);
    assert!(matches!(
        &composition.discovery_errors[0],
        DiscoveryError::UnknownComponent { component, .. } if component == "ghost::Ghost"
    ));
}

#[test]
fn test_broken_unit_files_are_reported() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("A.bin", "Alpha", &["alpha::AlphaModule"]);
    fixture.write_raw("Broken.bin", b"[unit\nname = ");
    fixture.write_raw("readme.md", b"not a unit");

    let options = fixture.builder(alpha_beta_catalog()).build();
    let composition = ModuleManager::new(options)
        .compose(&mut ServiceRegistry::new(), &ConfigTree::new())
        .unwrap();

    assert_eq!(composition.registered_modules(), vec!["Alpha"]);
    assert_eq!(composition.unit_failures.len(), 1);
    assert!(composition.unit_failures[0].path().ends_with("Broken.bin"));
}

#[derive(Debug, Deserialize)]
struct BetaSettings {
    timeout: u32,
    #[serde(default)]
    retries: u32,
}

#[test]
fn test_settings_are_bound_from_overlaid_config() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("B.bin", "Beta", &["beta::BetaModule", "beta::BetaSettings"]);

    let mut catalog = alpha_beta_catalog();
    catalog.register_settings::<BetaSettings>("beta::BetaSettings");

    // Base keys are PascalCase, the override and the settings fields are not
    let base = ConfigTree::from_pairs([("Beta:Timeout", "5"), ("Beta:Retries", "2")]);
    let options = fixture
        .builder(catalog)
        .override_setting("Beta", "timeout", "30")
        .build();
    let mut registry = ServiceRegistry::new();
    let composition = ModuleManager::new(options).compose(&mut registry, &base).unwrap();

    assert_eq!(composition.config.get("Beta:timeout"), Some("30"));
    assert_eq!(composition.config.get("beta:TIMEOUT"), Some("30"));

    let settings = registry.instance::<Settings<BetaSettings>>().unwrap();
    assert_eq!(settings.timeout, 30);
    assert_eq!(settings.retries, 2);
}

#[test]
fn test_invalid_settings_reject_the_module() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("B.bin", "Beta", &["beta::BetaModule", "beta::BetaSettings"]);

    let mut catalog = alpha_beta_catalog();
    catalog.register_settings::<BetaSettings>("beta::BetaSettings");

    let options = fixture
        .builder(catalog)
        .override_setting("Beta", "timeout", "soon")
        .build();
    let mut registry = ServiceRegistry::new();
    let composition = ModuleManager::new(options)
        .compose(&mut registry, &ConfigTree::new())
        .unwrap();

    assert_eq!(composition.rejected_modules(), vec!["Beta"]);
    // Registrations made before the binder failed are rolled back
    assert!(!registry.contains(&ServiceKey::new("serviceX")));
}

#[test]
fn test_major_only_version_policy() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("A.bin", "Alpha", &["alpha::AlphaModule"]);
    fixture.write_unit("B.bin", "Beta", &["beta::BetaModule"]);

    let mut catalog = ModuleCatalog::new();
    catalog
        .register_module("alpha::AlphaModule", || {
            boxed(ServiceModule::singleton("Alpha", "serviceA", "implA").with_version("1.4.2"))
        })
        .register_module("beta::BetaModule", || {
            boxed(ServiceModule::singleton("Beta", "serviceB", "implB").with_version("2.0.0"))
        });

    let options = fixture
        .builder(catalog.clone())
        .with_expected_contract_version("1.0")
        .with_version_compatibility(VersionCompatibilityStrategy::MajorOnly)
        .build();
    let composition = ModuleManager::new(options)
        .compose(&mut ServiceRegistry::new(), &ConfigTree::new())
        .unwrap();
    assert_eq!(composition.registered_modules(), vec!["Alpha"]);
    assert_eq!(composition.rejected_modules(), vec!["Beta"]);

    let exact = fixture
        .builder(catalog)
        .with_expected_contract_version("1.0")
        .build();
    let composition = ModuleManager::new(exact)
        .compose(&mut ServiceRegistry::new(), &ConfigTree::new())
        .unwrap();
    assert!(composition.registered_modules().is_empty());
}

#[test]
fn test_critical_version_rejection_is_fatal() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("A.bin", "Alpha", &["alpha::AlphaModule"]);

    let options = fixture
        .builder(alpha_beta_catalog())
        .with_critical_modules(["alpha"])
        .with_expected_contract_version("2.0.0")
        .build();
    let err = ModuleManager::new(options)
        .compose(&mut ServiceRegistry::new(), &ConfigTree::new())
        .unwrap_err();

    assert!(matches!(err, ModuleLoadError::CriticalModuleRejected { .. }));
}

#[test]
fn test_hook_sees_registry_after_each_module() {
    let fixture = ModuleTestFixture::new().unwrap();
    write_core_units(&fixture);

    let seen: Arc<Mutex<Vec<(String, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_in_hook = Arc::clone(&seen);
    let options = fixture
        .builder(core_catalog())
        .with_on_module_loaded_action(move |info, snapshot| {
            seen_in_hook
                .lock()
                .unwrap()
                .push((info.name.clone(), snapshot.len()));
        })
        .build();
    ModuleManager::new(options)
        .compose(&mut ServiceRegistry::new(), &ConfigTree::new())
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("Alpha".to_string(), 1), ("Delta".to_string(), 2)]
    );
}

#[test]
fn test_modules_read_their_own_section() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("B.bin", "Beta", &["beta::Recorder"]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_ctor = Arc::clone(&seen);
    let mut catalog = ModuleCatalog::new();
    catalog.register_module("beta::Recorder", move || {
        boxed(RecordingModule {
            name: "Beta",
            seen: Arc::clone(&seen_in_ctor),
            key: "timeout",
        })
    });

    let options = fixture
        .builder(catalog)
        .with_config_root("Modules")
        .override_setting("Beta", "timeout", "30")
        .build();
    ModuleManager::new(options)
        .compose(&mut ServiceRegistry::new(), &ConfigTree::new())
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("Modules:Beta".to_string(), Some("30".to_string()))]
    );
}

#[derive(Default)]
struct Gamma;

impl Module for Gamma {
    fn name(&self) -> &str {
        "Gamma"
    }

    fn contract_version(&self) -> &str {
        "1.0.0"
    }

    fn configure(
        &self,
        registry: &mut ServiceRegistry,
        _config: &ConfigSection<'_>,
    ) -> Result<(), ModuleError> {
        registry.add_singleton::<dyn std::fmt::Debug, Gamma>();
        Ok(())
    }
}

modhost::inventory::submit! {
    ComponentRegistration::module("composition_tests::Gamma", construct_default::<Gamma>)
}

#[test]
fn test_inventory_components_are_discovered() {
    let fixture = ModuleTestFixture::new().unwrap();
    fixture.write_unit("G.unit", "GammaUnit", &["composition_tests::Gamma"]);

    let mut registry = ServiceRegistry::new();
    let composition = ModuleManager::compose_with(&mut registry, &ConfigTree::new(), |builder| {
        builder.with_search_paths([fixture.modules_dir.clone()])
    })
    .unwrap();

    assert_eq!(composition.registered_modules(), vec!["Gamma"]);
    assert!(registry.contains(&ServiceKey::of::<dyn std::fmt::Debug>()));
}

#[test]
fn test_host_config_drives_a_run() {
    let fixture = ModuleTestFixture::new().unwrap();
    write_core_units(&fixture);

    let config_path = fixture.temp_dir.path().join("host.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
            [modules]
            search_paths = [{:?}]
            critical_modules = ["Delta"]

            [modules.overrides.Delta]
            mode = "fast"
            "#,
            fixture.modules_dir.display().to_string()
        ),
    )
    .unwrap();

    let config = HostConfig::from_toml_file(&config_path).unwrap();
    let options = config
        .apply(modhost::module::ModuleHostBuilder::new())
        .with_catalog(core_catalog())
        .build();
    let mut manager = ModuleManager::new(options);
    let composition = manager
        .compose(&mut ServiceRegistry::new(), &ConfigTree::new())
        .unwrap();

    assert_eq!(composition.config.get("Delta:mode"), Some("fast"));
    assert_eq!(composition.rejected_modules(), vec!["Core"]);
    assert_eq!(
        manager.list_modules(),
        vec!["Alpha".to_string(), "Core".to_string(), "Delta".to_string()]
    );
}
