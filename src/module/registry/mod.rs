//! Module registry and discovery
//!
//! Unit manifests, the component catalog that resolves manifest entries,
//! module discovery, and the shared service registry modules write into.

pub mod catalog;
pub mod discovery;
pub mod manifest;
pub mod service;

pub use catalog::{
    bind_settings, construct_default, namespace_of, ComponentKind, ComponentRegistration,
    ModuleCatalog, ModuleConstructor, Settings, SettingsBinder, StaticComponent,
};
pub use discovery::{
    DiscoveryError, DiscoveryReport, ModuleDescriptor, ModuleDiscovery, SettingsComponent,
};
pub use manifest::{ComponentEntry, UnitManifest, UnitSection};
pub use service::{
    Implementation, Lifetime, RegistrationId, RegistrySnapshot, ServiceFactory, ServiceInstance,
    ServiceKey, ServiceRegistration, ServiceRegistry,
};
