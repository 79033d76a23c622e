//! modhost - dynamic module loading and service composition
//!
//! A host points the crate at a set of search paths. Units found there are
//! loaded into a releasable loader context, the modules they carry are
//! discovered and configured against a layered configuration tree, and their
//! service registrations are merged into one registry.
//!
//! ## Design Principles
//!
//! 1. **Single-threaded composition**: modules configure one at a time, in
//!    search-path order and then manifest order
//! 2. **Two-tier failure policy**: critical modules abort the run, every other
//!    failure is logged and reported
//! 3. **Last registration wins**: same-lifetime collisions between modules are
//!    resolved in favour of the later module and reported
//!
//! ```no_run
//! use modhost::module::{ConfigTree, ModuleManager, ServiceRegistry};
//!
//! let mut registry = ServiceRegistry::new();
//! let base = ConfigTree::from_toml_file("config/modules.toml").unwrap_or_default();
//! let composition = ModuleManager::compose_with(&mut registry, &base, |builder| {
//!     builder
//!         .with_search_paths(["./mods"])
//!         .with_critical_modules(["Core"])
//!         .override_setting("Beta", "timeout", "30")
//! })
//! .expect("composition aborted");
//! println!("registered: {:?}", composition.registered_modules());
//! ```

pub mod config;
pub mod module;
pub mod utils;

pub use self::config::{HostConfig, LoggingConfig, ModulesConfig};

// Components register themselves with `modhost::inventory::submit!`
pub use inventory;
