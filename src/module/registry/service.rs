//! Shared service registry
//!
//! Modules add [`ServiceRegistration`]s while configuring. The registry only
//! records what was registered and by whom; it does not construct consumers.

use std::any::{type_name, Any};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Service lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifetime {
    Singleton,
    Scoped,
    Transient,
}

/// Identifier of a service contract
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceKey(String);

impl ServiceKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Key for a Rust type (including `dyn Trait`)
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(type_name::<T>().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Shared service value
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Factory invoked by consumers to build a service value
pub type ServiceFactory = Arc<dyn Fn(&ServiceRegistry) -> ServiceInstance + Send + Sync>;

/// How a service is provided
#[derive(Clone)]
pub enum Implementation {
    /// A concrete implementation type, identified by name
    Type(String),
    /// A pre-built value of a concrete type
    Instance {
        type_name: String,
        value: ServiceInstance,
    },
    /// A dynamic factory; its concrete type is unknown until invoked
    Factory(ServiceFactory),
}

impl Implementation {
    pub fn of<T: 'static>() -> Self {
        Implementation::Type(type_name::<T>().to_string())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Implementation::Type(name.into())
    }

    pub fn instance<T: Any + Send + Sync>(value: T) -> Self {
        Implementation::Instance {
            type_name: type_name::<T>().to_string(),
            value: Arc::new(value),
        }
    }

    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&ServiceRegistry) -> ServiceInstance + Send + Sync + 'static,
    {
        Implementation::Factory(Arc::new(factory))
    }

    pub fn is_factory(&self) -> bool {
        matches!(self, Implementation::Factory(_))
    }

    /// Concrete implementation type, `None` for factories
    pub fn concrete_type(&self) -> Option<&str> {
        match self {
            Implementation::Type(name) => Some(name),
            Implementation::Instance { type_name, .. } => Some(type_name),
            Implementation::Factory(_) => None,
        }
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Implementation::Type(name) => f.debug_tuple("Type").field(name).finish(),
            Implementation::Instance { type_name, .. } => {
                f.debug_struct("Instance").field("type_name", type_name).finish()
            }
            Implementation::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Registration id, unique within one registry
pub type RegistrationId = u64;

/// A single service registration
#[derive(Debug, Clone)]
pub struct ServiceRegistration {
    pub id: RegistrationId,
    pub service_type: ServiceKey,
    pub implementation: Implementation,
    pub lifetime: Lifetime,
    /// Module that added the registration; `None` for host registrations
    pub origin: Option<String>,
}

/// Mutable collection of service registrations, in registration order
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    registrations: Vec<ServiceRegistration>,
    next_id: RegistrationId,
    current_origin: Option<String>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceRegistration> {
        self.registrations.iter()
    }

    /// Add a registration attributed to the module currently configuring
    pub fn add(
        &mut self,
        service_type: impl Into<ServiceKey>,
        implementation: Implementation,
        lifetime: Lifetime,
    ) -> RegistrationId {
        let id = self.next_id;
        self.next_id += 1;
        self.registrations.push(ServiceRegistration {
            id,
            service_type: service_type.into(),
            implementation,
            lifetime,
            origin: self.current_origin.clone(),
        });
        id
    }

    /// Add only if nothing is registered for `service_type` yet
    pub fn try_add(
        &mut self,
        service_type: impl Into<ServiceKey>,
        implementation: Implementation,
        lifetime: Lifetime,
    ) -> Option<RegistrationId> {
        let service_type = service_type.into();
        if self.contains(&service_type) {
            return None;
        }
        Some(self.add(service_type, implementation, lifetime))
    }

    pub fn add_singleton<S: ?Sized + 'static, I: 'static>(&mut self) -> RegistrationId {
        self.add(ServiceKey::of::<S>(), Implementation::of::<I>(), Lifetime::Singleton)
    }

    pub fn add_scoped<S: ?Sized + 'static, I: 'static>(&mut self) -> RegistrationId {
        self.add(ServiceKey::of::<S>(), Implementation::of::<I>(), Lifetime::Scoped)
    }

    pub fn add_transient<S: ?Sized + 'static, I: 'static>(&mut self) -> RegistrationId {
        self.add(ServiceKey::of::<S>(), Implementation::of::<I>(), Lifetime::Transient)
    }

    /// Register a pre-built singleton value under its own type
    pub fn add_instance<T: Any + Send + Sync>(&mut self, value: T) -> RegistrationId {
        self.add(
            ServiceKey::of::<T>(),
            Implementation::instance(value),
            Lifetime::Singleton,
        )
    }

    pub fn add_factory<F>(
        &mut self,
        service_type: impl Into<ServiceKey>,
        lifetime: Lifetime,
        factory: F,
    ) -> RegistrationId
    where
        F: Fn(&ServiceRegistry) -> ServiceInstance + Send + Sync + 'static,
    {
        self.add(service_type, Implementation::factory(factory), lifetime)
    }

    pub fn remove(&mut self, id: RegistrationId) -> Option<ServiceRegistration> {
        let pos = self.registrations.iter().position(|r| r.id == id)?;
        Some(self.registrations.remove(pos))
    }

    pub fn remove_all(&mut self, service_type: &ServiceKey) -> Vec<ServiceRegistration> {
        let (removed, kept) = std::mem::take(&mut self.registrations)
            .into_iter()
            .partition(|r| &r.service_type == service_type);
        self.registrations = kept;
        removed
    }

    pub fn contains(&self, service_type: &ServiceKey) -> bool {
        self.registrations
            .iter()
            .any(|r| &r.service_type == service_type)
    }

    /// Most recent registration for `service_type`
    pub fn get(&self, service_type: &ServiceKey) -> Option<&ServiceRegistration> {
        self.registrations
            .iter()
            .rev()
            .find(|r| &r.service_type == service_type)
    }

    pub fn get_all(&self, service_type: &ServiceKey) -> Vec<&ServiceRegistration> {
        self.registrations
            .iter()
            .filter(|r| &r.service_type == service_type)
            .collect()
    }

    pub fn get_by_id(&self, id: RegistrationId) -> Option<&ServiceRegistration> {
        self.registrations.iter().find(|r| r.id == id)
    }

    /// Value of the most recent instance or factory registration for `T`
    pub fn instance<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let registration = self.get(&ServiceKey::of::<T>())?;
        let value = match &registration.implementation {
            Implementation::Instance { value, .. } => Arc::clone(value),
            Implementation::Factory(factory) => factory(self),
            Implementation::Type(_) => return None,
        };
        value.downcast::<T>().ok()
    }

    /// Ids of every current registration
    pub fn ids(&self) -> HashSet<RegistrationId> {
        self.registrations.iter().map(|r| r.id).collect()
    }

    /// Point-in-time copy of the registrations
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            registrations: self.registrations.clone().into(),
        }
    }

    /// Attribute subsequent registrations to `origin`; returns the previous origin
    pub(crate) fn set_origin(&mut self, origin: Option<String>) -> Option<String> {
        std::mem::replace(&mut self.current_origin, origin)
    }
}

/// Immutable view of the registry at one point of a composition run
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    registrations: Arc<[ServiceRegistration]>,
}

impl RegistrySnapshot {
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceRegistration> {
        self.registrations.iter()
    }

    pub fn contains(&self, service_type: &ServiceKey) -> bool {
        self.registrations
            .iter()
            .any(|r| &r.service_type == service_type)
    }

    pub fn get(&self, service_type: &ServiceKey) -> Option<&ServiceRegistration> {
        self.registrations
            .iter()
            .rev()
            .find(|r| &r.service_type == service_type)
    }
}
