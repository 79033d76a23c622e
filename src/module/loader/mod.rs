//! Unit loading
//!
//! Locates unit files on the configured search paths, reads them through a
//! pluggable [`UnitReader`], and caches them per loader context.

pub mod loader;
pub mod reader;
pub mod unit;

pub use loader::{ReleasedUnits, UnitLoader};
pub use reader::{ManifestUnitReader, UnitError, UnitImage, UnitReader, UNIT_EXTENSIONS};
pub use unit::{LoadedUnit, UnitIdentity, UnitRequest};
