//! Catalog and discovery tests

use std::sync::Arc;

use modhost::module::registry::{DiscoveryError, ModuleDiscovery};
use modhost::module::{ModuleCatalog, ModuleError, UnitIdentity, UnitLoader};

use super::test_utils::*;

fn catalog() -> ModuleCatalog {
    let mut catalog = ModuleCatalog::new();
    catalog
        .register_module("alpha::AlphaModule", || {
            boxed(ServiceModule::singleton("Alpha", "serviceX", "implA"))
        })
        .register_settings_with("alpha::AlphaSettings", |_registry, _section| Ok(()))
        .register_settings_with("orphan::OrphanSettings", |_registry, _section| Ok(()))
        .register_abstract("alpha::Contract")
        .register_module("broken::Refuses", || {
            Err(ModuleError::Construction("missing native library".to_string()))
        })
        .register_module("broken::Panics", || panic!("constructor exploded"));
    catalog
}

fn discover(components: &[&str]) -> modhost::module::registry::DiscoveryReport {
    let fixture = ModuleTestFixture::new().unwrap();
    let path = fixture.write_unit("Alpha.bin", "Alpha", components);
    let mut loader = UnitLoader::new("test", Vec::<std::path::PathBuf>::new());
    let unit = loader.load_from_path(&path).unwrap();
    ModuleDiscovery::new(Arc::new(catalog())).discover(&unit)
}

#[test]
fn test_module_pairs_with_settings_in_its_namespace() {
    let report = discover(&["alpha::AlphaSettings", "alpha::Contract", "alpha::AlphaModule"]);

    assert!(report.is_complete());
    assert_eq!(report.modules.len(), 1);
    let alpha = &report.modules[0];
    assert_eq!(alpha.name(), "Alpha");
    assert_eq!(alpha.contract_version(), "1.0.0");
    assert_eq!(alpha.info.component_id, "alpha::AlphaModule");
    assert_eq!(alpha.info.unit, UnitIdentity::new("Alpha", "1.0.0"));
    assert_eq!(
        alpha.settings.as_ref().map(|s| s.id.as_str()),
        Some("alpha::AlphaSettings")
    );
}

#[test]
fn test_settings_without_module_are_reported() {
    let report = discover(&["alpha::AlphaModule", "orphan::OrphanSettings"]);

    assert_eq!(report.modules.len(), 1);
    assert!(report.modules[0].settings.is_none());
    assert!(matches!(
        &report.errors[..],
        [DiscoveryError::NotAModule { component, .. }] if component == "orphan::OrphanSettings"
    ));
}

#[test]
fn test_constructor_failures_do_not_stop_discovery() {
    let report = discover(&["broken::Refuses", "broken::Panics", "alpha::AlphaModule"]);

    assert_eq!(report.modules.len(), 1);
    assert_eq!(report.errors.len(), 2);
    for error in &report.errors {
        match error {
            DiscoveryError::ConstructionFailed { component, reason, .. } => {
                if component == "broken::Panics" {
                    assert!(reason.contains("constructor exploded"));
                } else {
                    assert!(reason.contains("missing native library"));
                }
            }
            other => panic!("unexpected discovery error: {}", other),
        }
    }
}

#[test]
fn test_catalog_listing() {
    let catalog = catalog();
    assert_eq!(catalog.len(), 6);
    assert!(catalog.contains("alpha::Contract"));
    assert!(!catalog.contains("alpha::Missing"));
    assert_eq!(catalog.ids().next(), Some("alpha::AlphaModule"));
}
