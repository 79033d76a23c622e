//! Module system
//!
//! Loads units from configured search paths, discovers the modules they carry,
//! and composes the modules' service registrations into one shared registry.
//!
//! ## Architecture
//!
//! - **Unit loading**: [`UnitLoader`] resolves units by name with a per-context
//!   identity cache; all units of a context are released together
//! - **Discovery**: unit manifests list component ids, resolved through the
//!   [`ModuleCatalog`] (self-registered with `inventory`)
//! - **Configuration**: a base [`ConfigTree`] overlaid with per-module overrides
//! - **Registration**: the [`RegistrationPipeline`] configures modules one at a
//!   time, resolves last-registration-wins conflicts and invokes lifecycle hooks
//! - **Failure policy**: critical modules abort the run, others are rejected

pub mod builder;
pub mod config;
pub mod loader;
pub mod manager;
pub mod pipeline;
pub mod registry;
pub mod traits;
pub mod validation;
pub mod version;

pub use builder::{ModuleHostBuilder, ModuleHostOptions};
pub use self::config::{ConfigSection, ConfigTree, ConfigurationOverlay, MergedConfig};
pub use loader::{LoadedUnit, ReleasedUnits, UnitError, UnitIdentity, UnitLoader};
pub use manager::{Composition, ModuleManager};
pub use pipeline::{ConflictRecord, ModuleOutcome, RegistrationPipeline};
pub use registry::{
    bind_settings, construct_default, ComponentRegistration, Implementation, Lifetime,
    ModuleCatalog, ModuleDescriptor, ModuleDiscovery, RegistrySnapshot, ServiceKey,
    ServiceRegistration, ServiceRegistry, Settings,
};
pub use traits::{Module, ModuleError, ModuleInfo, ModuleLoadError, ModuleState};
pub use version::{
    ContractVersion, VersionCompatibilityStrategy, VersionParseError, VersionPolicy,
};
