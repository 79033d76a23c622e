//! Unit manifest parsing
//!
//! A unit file is a TOML manifest naming the unit and listing the catalog
//! components it carries, in discovery order.

use serde::{Deserialize, Serialize};

use crate::module::loader::UnitIdentity;

/// Unit manifest (unit file structure)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitManifest {
    /// Self-reported unit identity
    pub unit: UnitSection,
    /// Components carried by the unit, in discovery order
    #[serde(default)]
    pub components: Vec<ComponentEntry>,
}

/// `[unit]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSection {
    /// Unit name (matched case-insensitively on resolution)
    pub name: String,
    /// Unit version
    pub version: String,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

/// `[[components]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEntry {
    /// Catalog id, e.g. `alpha::AlphaModule`
    pub id: String,
}

impl UnitManifest {
    /// Parse a manifest without validating it
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Render the manifest as TOML
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn identity(&self) -> UnitIdentity {
        UnitIdentity::new(&self.unit.name, &self.unit.version)
    }

    /// Convenience constructor used by hosts and tests generating unit files
    pub fn new<I, S>(name: &str, version: &str, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unit: UnitSection {
                name: name.to_string(),
                version: version.to_string(),
                description: None,
            },
            components: components
                .into_iter()
                .map(|id| ComponentEntry { id: id.into() })
                .collect(),
        }
    }
}
