//! Hierarchical key-value configuration tree

use std::collections::BTreeMap;
use std::path::Path;

use ::config::{File, FileFormat, Map, Source, Value, ValueKind};
use tracing::debug;

use super::{combine_path, normalize_path, same_segment, ConfigError, KEY_DELIMITER};

/// A single configuration layer
///
/// The tree keeps the nested table shape produced by the `config` crate and a
/// flat index of its scalar leaves under `a:b:c` paths. Array elements are
/// indexed children (`list:0`, `list:1`).
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    root: Map<String, Value>,
    index: BTreeMap<String, ConfigEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConfigEntry {
    /// Path with the casing its segments were first written with
    pub(crate) path: String,
    pub(crate) value: String,
}

impl PartialEq for ConfigTree {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for ConfigTree {}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_root(root: Map<String, Value>) -> Self {
        let mut tree = Self {
            root,
            index: BTreeMap::new(),
        };
        tree.reindex();
        tree
    }

    /// Build a tree from `(path, value)` pairs; later pairs win
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut tree = Self::new();
        for (k, v) in pairs {
            tree.set(k, v);
        }
        tree
    }

    /// Set a value, replacing any value at the same (case-insensitive) path
    ///
    /// Segments that already exist keep their original casing. A numeric
    /// segment addresses an existing array element, or appends when it equals
    /// the array length.
    pub fn set(&mut self, path: impl Into<String>, value: impl Into<String>) {
        let path = path.into();
        let segments: Vec<&str> = path.split(KEY_DELIMITER).map(str::trim).collect();
        let leaf = Value::new(None, ValueKind::String(value.into()));
        insert_into_table(&mut self.root, &segments, leaf);
        self.reindex();
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.index
            .get(&normalize_path(path))
            .map(|e| e.value.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(&normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Iterate `(path, value)` in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.index
            .values()
            .map(|e| (e.path.as_str(), e.value.as_str()))
    }

    pub(crate) fn entries(&self) -> &BTreeMap<String, ConfigEntry> {
        &self.index
    }

    pub(crate) fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Node at `path`, tables matched case-insensitively
    pub(crate) fn node(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split(KEY_DELIMITER);
        let mut node = find_key(&self.root, segments.next()?)?;
        for segment in segments {
            node = match &node.kind {
                ValueKind::Table(table) => find_key(table, segment)?,
                ValueKind::Array(items) => items.get(segment.trim().parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::collect_from(&File::from_str(contents, FileFormat::Toml)).map_err(ConfigError::Parse)
    }

    /// Parse a JSON document
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        Self::collect_from(&File::from_str(contents, FileFormat::Json)).map_err(ConfigError::Parse)
    }

    /// Load a TOML file; a missing file yields an empty tree
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_file(path.as_ref(), FileFormat::Toml)
    }

    /// Load a JSON file; a missing file yields an empty tree
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_file(path.as_ref(), FileFormat::Json)
    }

    fn load_file(path: &Path, format: FileFormat) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No configuration file at {:?}, using empty tree", path);
            return Ok(Self::new());
        }
        let source = File::from(path).format(format).required(true);
        Self::collect_from(&source).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })
    }

    fn collect_from(source: &impl Source) -> Result<Self, ::config::ConfigError> {
        Ok(Self::from_root(source.collect()?))
    }

    fn reindex(&mut self) {
        let mut index = BTreeMap::new();
        for (key, value) in &self.root {
            index_value(&mut index, key.clone(), value);
        }
        self.index = index;
    }
}

/// Trees feed straight into a `config::ConfigBuilder` as a layer
impl Source for ConfigTree {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ::config::ConfigError> {
        Ok(self.root.clone())
    }
}

pub(crate) fn find_key<'v>(table: &'v Map<String, Value>, segment: &str) -> Option<&'v Value> {
    table
        .iter()
        .find(|(key, _)| same_segment(key, segment))
        .map(|(_, value)| value)
}

pub(crate) fn empty_table() -> Value {
    Value::new(None, ValueKind::Table(Map::new()))
}

fn insert_into_table(table: &mut Map<String, Value>, segments: &[&str], leaf: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    let key = table
        .keys()
        .find(|key| same_segment(key, first))
        .cloned()
        .unwrap_or_else(|| first.to_string());
    if rest.is_empty() {
        table.insert(key, leaf);
        return;
    }
    let node = table.entry(key).or_insert_with(empty_table);
    insert_into_node(node, rest, leaf);
}

fn insert_into_node(node: &mut Value, segments: &[&str], leaf: Value) {
    if let ValueKind::Array(items) = &mut node.kind {
        match segments.first().and_then(|s| s.parse::<usize>().ok()) {
            Some(index) if index <= items.len() => {
                if index == items.len() {
                    items.push(Value::new(None, ValueKind::Nil));
                }
                match &segments[1..] {
                    [] => items[index] = leaf,
                    rest => insert_into_node(&mut items[index], rest, leaf),
                }
                return;
            }
            _ => {
                let table: Map<String, Value> = std::mem::take(items)
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| (i.to_string(), item))
                    .collect();
                node.kind = ValueKind::Table(table);
            }
        }
    }
    if !matches!(node.kind, ValueKind::Table(_)) {
        node.kind = ValueKind::Table(Map::new());
    }
    if let ValueKind::Table(table) = &mut node.kind {
        insert_into_table(table, segments, leaf);
    }
}

fn index_value(index: &mut BTreeMap<String, ConfigEntry>, path: String, value: &Value) {
    match &value.kind {
        ValueKind::Table(table) => {
            for (key, child) in table {
                index_value(index, combine_path(&path, key), child);
            }
        }
        ValueKind::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                index_value(index, combine_path(&path, &i.to_string()), child);
            }
        }
        kind => {
            index.insert(
                normalize_path(&path),
                ConfigEntry {
                    value: scalar_text(kind),
                    path,
                },
            );
        }
    }
}

fn scalar_text(kind: &ValueKind) -> String {
    match kind {
        ValueKind::Nil => String::new(),
        ValueKind::String(s) => s.clone(),
        other => other.to_string(),
    }
}
