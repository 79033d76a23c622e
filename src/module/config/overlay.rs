//! Base configuration overlaid with runtime overrides

use std::collections::BTreeMap;

use ::config::{Config, Map, Value, ValueKind};
use tracing::debug;

use super::section::ConfigSection;
use super::tree::ConfigTree;
use super::{combine_path, normalize_path, same_segment, ConfigError, KEY_DELIMITER};

/// A single `(module, key) -> value` override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationOverride {
    pub module_name: String,
    pub key: String,
    pub value: String,
}

/// Accumulated overrides, unique per `(module, key)`; last write wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    entries: BTreeMap<(String, String), ConfigurationOverride>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        module_name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        let module_name = module_name.into();
        let key = key.into();
        self.entries.insert(
            (normalize_path(&module_name), normalize_path(&key)),
            ConfigurationOverride {
                module_name,
                key,
                value: value.into(),
            },
        );
    }

    pub fn get(&self, module_name: &str, key: &str) -> Option<&str> {
        self.entries
            .get(&(normalize_path(module_name), normalize_path(key)))
            .map(|o| o.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigurationOverride> {
        self.entries.values()
    }

    /// Render the overrides as a tree addressed at `[root:]module:key`
    pub fn to_tree(&self, root: Option<&str>) -> ConfigTree {
        let root = root.unwrap_or_default();
        ConfigTree::from_pairs(self.iter().map(|o| {
            (
                combine_path(root, &combine_path(&o.module_name, &o.key)),
                o.value.clone(),
            )
        }))
    }
}

/// Builds merged configuration views
pub struct ConfigurationOverlay;

impl ConfigurationOverlay {
    /// Overlay `overrides` on `base`; overrides are addressable at `module:key`
    pub fn build(
        base: &ConfigTree,
        overrides: &ConfigOverrides,
    ) -> Result<MergedConfig, ConfigError> {
        Self::build_rooted(base, overrides, None)
    }

    /// Same as [`build`](Self::build) with overrides placed under `root`
    pub fn build_rooted(
        base: &ConfigTree,
        overrides: &ConfigOverrides,
        root: Option<&str>,
    ) -> Result<MergedConfig, ConfigError> {
        MergedConfig::from_layers(vec![base.clone(), overrides.to_tree(root)])
    }
}

/// Read-only layered view; later layers take precedence
///
/// Layers are merged once, through a `config::ConfigBuilder`, when the view is
/// built. Before a layer is added its keys are renamed to the casing already
/// present in the layers below it, so an override never forks a section into
/// two differently-cased keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedConfig {
    layers: Vec<ConfigTree>,
    merged: ConfigTree,
}

impl MergedConfig {
    pub fn from_layers(layers: Vec<ConfigTree>) -> Result<Self, ConfigError> {
        let mut merged = ConfigTree::new();
        for layer in &layers {
            let aligned = ConfigTree::from_root(align_table(layer.root().clone(), merged.root()));
            let root = Config::builder()
                .add_source(merged)
                .add_source(aligned)
                .build()
                .and_then(|config| config.try_deserialize::<Map<String, Value>>())
                .map_err(ConfigError::Merge)?;
            merged = ConfigTree::from_root(root);
        }
        debug!("Merged {} configuration layers into {} values", layers.len(), merged.len());
        Ok(Self { layers, merged })
    }

    pub fn layers(&self) -> &[ConfigTree] {
        &self.layers
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.merged.get(path)
    }

    /// Section rooted at `path`
    pub fn section(&self, path: &str) -> ConfigSection<'_> {
        ConfigSection::new(self, path)
    }

    /// The merged tree
    pub fn flatten(&self) -> ConfigTree {
        self.merged.clone()
    }

    pub(crate) fn tree(&self) -> &ConfigTree {
        &self.merged
    }

    /// `(path, value)` for every entry at or below `prefix`, keyed by normalized path
    pub(crate) fn entries_under(&self, prefix: &str) -> BTreeMap<&str, (&str, &str)> {
        let prefix = normalize_path(prefix);
        self.merged
            .entries()
            .iter()
            .filter(|(key, _)| is_at_or_below(key, &prefix))
            .map(|(key, entry)| (key.as_str(), (entry.path.as_str(), entry.value.as_str())))
            .collect()
    }
}

fn is_at_or_below(key: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match key.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with(KEY_DELIMITER),
        None => false,
    }
}

/// Rename `layer` keys to the casing used in `base`
fn align_table(layer: Map<String, Value>, base: &Map<String, Value>) -> Map<String, Value> {
    layer
        .into_iter()
        .map(|(key, value)| match base.iter().find(|(k, _)| same_segment(k, &key)) {
            Some((base_key, base_value)) => (base_key.clone(), align_value(value, base_value)),
            None => (key, value),
        })
        .collect()
}

fn align_value(value: Value, base: &Value) -> Value {
    match (value.kind, &base.kind) {
        (ValueKind::Table(table), ValueKind::Table(base_table)) => {
            Value::new(None, ValueKind::Table(align_table(table, base_table)))
        }
        (ValueKind::Table(table), ValueKind::Array(items)) if is_indexed(&table) => {
            Value::new(None, overlay_items(table, items))
        }
        (kind, _) => Value::new(None, kind),
    }
}

fn is_indexed(table: &Map<String, Value>) -> bool {
    table.keys().all(|key| key.trim().parse::<usize>().is_ok())
}

/// Apply `list:N` overrides to a copy of `items`
///
/// `config` replaces arrays wholesale, so indexed overrides are folded into
/// the base array before the layer is handed over. An index past the end
/// turns the array into an index-keyed table, as [`ConfigTree::set`] does.
fn overlay_items(table: Map<String, Value>, items: &[Value]) -> ValueKind {
    let mut indexed: Vec<(usize, Value)> = table
        .into_iter()
        .filter_map(|(key, value)| key.trim().parse().ok().map(|i| (i, value)))
        .collect();
    indexed.sort_by_key(|(i, _)| *i);

    let mut merged = items.to_vec();
    let mut spilled = Vec::new();
    for (i, value) in indexed {
        match merged.get(i) {
            Some(existing) => {
                let value = merge_value(existing, value);
                merged[i] = value;
            }
            None if i == merged.len() => merged.push(value),
            None => spilled.push((i, value)),
        }
    }
    if spilled.is_empty() {
        return ValueKind::Array(merged);
    }

    let mut table: Map<String, Value> = merged
        .into_iter()
        .enumerate()
        .map(|(i, item)| (i.to_string(), item))
        .collect();
    for (i, value) in spilled {
        table.insert(i.to_string(), value);
    }
    ValueKind::Table(table)
}

fn merge_value(base: &Value, layer: Value) -> Value {
    match (&base.kind, layer.kind) {
        (ValueKind::Table(base_table), ValueKind::Table(table)) => {
            let mut merged = base_table.clone();
            for (key, value) in align_table(table, base_table) {
                let value = match merged.get(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => value,
                };
                merged.insert(key, value);
            }
            Value::new(None, ValueKind::Table(merged))
        }
        (_, kind) => align_value(Value::new(None, kind), base),
    }
}
