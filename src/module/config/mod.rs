//! Layered configuration for modules
//!
//! A base [`ConfigTree`] is overlaid with per-module runtime overrides into a
//! [`MergedConfig`]; modules read it through a [`ConfigSection`] rooted at
//! their name. Parsing, layering and typed binding sit on the `config` crate.
//!
//! Paths use `:` as the segment delimiter (`Beta:timeout`) and are matched
//! case-insensitively. A key keeps the casing it was first written with.

pub mod overlay;
pub mod section;
pub mod tree;

use std::path::PathBuf;
use thiserror::Error;

pub use overlay::{ConfigOverrides, ConfigurationOverlay, ConfigurationOverride, MergedConfig};
pub use section::ConfigSection;
pub use tree::ConfigTree;

/// Configuration path segment delimiter
pub const KEY_DELIMITER: char = ':';

/// Join two configuration paths, skipping empty parts
pub fn combine_path(prefix: &str, key: &str) -> String {
    match (prefix.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}{}{}", prefix, KEY_DELIMITER, key),
    }
}

/// Canonical lookup form of a path
pub(crate) fn normalize_path(path: &str) -> String {
    path.split(KEY_DELIMITER)
        .map(|segment| segment.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join(":")
}

/// Case-insensitive comparison of two path segments
pub(crate) fn same_segment(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Errors building configuration trees
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration file {path:?}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: ::config::ConfigError,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[source] ::config::ConfigError),

    #[error("Failed to merge configuration layers: {0}")]
    Merge(#[source] ::config::ConfigError),
}
