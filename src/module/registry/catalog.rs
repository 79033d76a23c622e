//! Component catalog
//!
//! Unit manifests list component ids; the catalog maps each id to something
//! the host can act on: a module constructor, a settings binder, or an
//! abstract marker. Components register themselves at link time with
//! [`inventory::submit!`] or are added to a catalog explicitly.
//!
//! ```ignore
//! modhost::inventory::submit! {
//!     ComponentRegistration::module("alpha::AlphaModule", construct_default::<AlphaModule>)
//! }
//! modhost::inventory::submit! {
//!     ComponentRegistration::settings("alpha::AlphaSettings", bind_settings::<AlphaSettings>)
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::module::config::ConfigSection;
use crate::module::registry::service::ServiceRegistry;
use crate::module::traits::{Module, ModuleError};

/// No-argument module constructor
pub type ModuleConstructor = Arc<dyn Fn() -> Result<Box<dyn Module>, ModuleError> + Send + Sync>;

/// Binds a module's configuration section into the registry
pub type SettingsBinder =
    Arc<dyn Fn(&mut ServiceRegistry, &ConfigSection<'_>) -> Result<(), ModuleError> + Send + Sync>;

/// Catalog entry
#[derive(Clone)]
pub enum ComponentKind {
    Module(ModuleConstructor),
    Settings(SettingsBinder),
    /// Listed but not instantiable
    Abstract,
}

impl fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Module(_) => f.write_str("Module"),
            ComponentKind::Settings(_) => f.write_str("Settings"),
            ComponentKind::Abstract => f.write_str("Abstract"),
        }
    }
}

/// Link-time component registration collected with `inventory`
pub struct ComponentRegistration {
    pub id: &'static str,
    pub component: StaticComponent,
}

/// Function-pointer form of [`ComponentKind`] usable in statics
#[derive(Clone, Copy)]
pub enum StaticComponent {
    Module(fn() -> Result<Box<dyn Module>, ModuleError>),
    Settings(fn(&mut ServiceRegistry, &ConfigSection<'_>) -> Result<(), ModuleError>),
    Abstract,
}

impl ComponentRegistration {
    pub const fn module(
        id: &'static str,
        constructor: fn() -> Result<Box<dyn Module>, ModuleError>,
    ) -> Self {
        Self {
            id,
            component: StaticComponent::Module(constructor),
        }
    }

    pub const fn settings(
        id: &'static str,
        binder: fn(&mut ServiceRegistry, &ConfigSection<'_>) -> Result<(), ModuleError>,
    ) -> Self {
        Self {
            id,
            component: StaticComponent::Settings(binder),
        }
    }

    pub const fn abstract_component(id: &'static str) -> Self {
        Self {
            id,
            component: StaticComponent::Abstract,
        }
    }
}

inventory::collect!(ComponentRegistration);

/// Constructor for modules with a `Default` implementation
pub fn construct_default<M: Module + Default + 'static>() -> Result<Box<dyn Module>, ModuleError> {
    Ok(Box::new(M::default()))
}

/// Typed settings registered by [`bind_settings`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings<T>(pub T);

impl<T> Settings<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Settings<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Deserialize `section` into `T` and register it as a `Settings<T>` singleton
pub fn bind_settings<T>(registry: &mut ServiceRegistry, section: &ConfigSection<'_>) -> Result<(), ModuleError>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let settings: T = section.bind()?;
    registry.add_instance(Settings(settings));
    Ok(())
}

/// Namespace of a component id: everything before the last `::`
pub fn namespace_of(id: &str) -> &str {
    id.rsplit_once("::").map_or(id, |(namespace, _)| namespace)
}

/// Maps component ids to constructors and binders
#[derive(Clone, Default)]
pub struct ModuleCatalog {
    components: BTreeMap<String, ComponentKind>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of every component registered with `inventory::submit!`
    pub fn from_inventory() -> Self {
        let mut catalog = Self::new();
        catalog.extend_inventory();
        catalog
    }

    /// Add every `inventory` registration not already present
    pub fn extend_inventory(&mut self) -> &mut Self {
        for registration in inventory::iter::<ComponentRegistration> {
            let kind = match registration.component {
                StaticComponent::Module(ctor) => ComponentKind::Module(Arc::new(ctor)),
                StaticComponent::Settings(binder) => ComponentKind::Settings(Arc::new(binder)),
                StaticComponent::Abstract => ComponentKind::Abstract,
            };
            self.insert(registration.id, kind);
        }
        debug!("Component catalog holds {} entries", self.components.len());
        self
    }

    pub fn register_module<F>(&mut self, id: &str, constructor: F) -> &mut Self
    where
        F: Fn() -> Result<Box<dyn Module>, ModuleError> + Send + Sync + 'static,
    {
        self.insert(id, ComponentKind::Module(Arc::new(constructor)));
        self
    }

    /// Register a module built with `M::default()`
    pub fn register_default<M: Module + Default + 'static>(&mut self, id: &str) -> &mut Self {
        self.register_module(id, construct_default::<M>)
    }

    pub fn register_settings<T>(&mut self, id: &str) -> &mut Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.register_settings_with(id, bind_settings::<T>)
    }

    pub fn register_settings_with<F>(&mut self, id: &str, binder: F) -> &mut Self
    where
        F: Fn(&mut ServiceRegistry, &ConfigSection<'_>) -> Result<(), ModuleError>
            + Send
            + Sync
            + 'static,
    {
        self.insert(id, ComponentKind::Settings(Arc::new(binder)));
        self
    }

    pub fn register_abstract(&mut self, id: &str) -> &mut Self {
        self.insert(id, ComponentKind::Abstract);
        self
    }

    pub fn get(&self, id: &str) -> Option<&ComponentKind> {
        self.components.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.components.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    fn insert(&mut self, id: &str, kind: ComponentKind) {
        if self.components.contains_key(id) {
            warn!("Component {} registered more than once, keeping the first", id);
            return;
        }
        self.components.insert(id.to_string(), kind);
    }
}

impl fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.components.iter()).finish()
    }
}
