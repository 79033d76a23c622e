//! View of a configuration subtree

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ::config::{ConfigError, Value, ValueKind};
use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, DeserializeOwned, Deserializer, IntoDeserializer, Visitor};

use super::overlay::MergedConfig;
use super::tree::empty_table;
use super::{combine_path, normalize_path, KEY_DELIMITER};
use crate::module::traits::ModuleError;

/// A configuration subtree rooted at `path`
///
/// Sections are cheap; they borrow the merged configuration and only carry
/// their path.
#[derive(Clone)]
pub struct ConfigSection<'a> {
    config: &'a MergedConfig,
    path: String,
}

impl fmt::Debug for ConfigSection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSection")
            .field("path", &self.path)
            .field("entries", &self.to_map())
            .finish()
    }
}

impl<'a> ConfigSection<'a> {
    pub(crate) fn new(config: &'a MergedConfig, path: &str) -> Self {
        Self {
            config,
            path: path.to_string(),
        }
    }

    /// Full path of the section
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment
    pub fn key(&self) -> &str {
        self.path
            .rsplit(KEY_DELIMITER)
            .next()
            .unwrap_or_default()
    }

    /// Value stored at the section path itself
    pub fn value(&self) -> Option<&'a str> {
        self.config.get(&self.path)
    }

    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.config.get(&combine_path(&self.path, key))
    }

    /// Get and parse a value; `Ok(None)` when absent
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, ModuleError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| ModuleError::InvalidSetting {
                    key: combine_path(&self.path, key),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Get a value that must be present
    pub fn require(&self, key: &str) -> Result<&'a str, ModuleError> {
        self.get(key)
            .ok_or_else(|| ModuleError::MissingSetting(combine_path(&self.path, key)))
    }

    pub fn section(&self, key: &str) -> ConfigSection<'a> {
        ConfigSection::new(self.config, &combine_path(&self.path, key))
    }

    /// True if any value exists at or below this section
    pub fn exists(&self) -> bool {
        !self.config.entries_under(&self.path).is_empty()
    }

    /// Immediate child sections, in key order
    pub fn children(&self) -> Vec<ConfigSection<'a>> {
        let depth = self.depth();
        let mut seen = BTreeMap::new();
        for (key, (path, _)) in self.config.entries_under(&self.path) {
            let Some(segment) = key.split(KEY_DELIMITER).nth(depth) else {
                continue;
            };
            let original = path.split(KEY_DELIMITER).nth(depth).unwrap_or(segment);
            seen.entry(segment.to_string())
                .or_insert_with(|| original.to_string());
        }
        seen.into_values()
            .map(|child| self.section(&child))
            .collect()
    }

    /// All values below this section as relative paths
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let depth = self.depth();
        self.config
            .entries_under(&self.path)
            .into_values()
            .filter_map(|(path, value)| {
                let relative = path
                    .split(KEY_DELIMITER)
                    .skip(depth)
                    .collect::<Vec<_>>()
                    .join(":");
                (!relative.is_empty()).then(|| (relative, value.to_string()))
            })
            .collect()
    }

    /// Deserialize the section into a typed settings value
    ///
    /// Struct fields match keys case-insensitively, and string leaves are
    /// parsed into the field's type. An absent section binds as an empty table.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, ModuleError> {
        let value = if self.path.is_empty() {
            Value::new(None, ValueKind::Table(self.config.tree().root().clone()))
        } else {
            self.config
                .tree()
                .node(&self.path)
                .cloned()
                .unwrap_or_else(empty_table)
        };
        <T as serde::Deserialize>::deserialize(Folded(value)).map_err(|e| ModuleError::SettingsBinding {
            section: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn depth(&self) -> usize {
        if self.path.is_empty() {
            0
        } else {
            normalize_path(&self.path).split(KEY_DELIMITER).count()
        }
    }
}

/// A `config::Value` that folds keys onto struct fields case-insensitively
///
/// Tables and arrays are walked here so nested structs fold too; scalars go
/// straight to `config::Value`, which parses strings into numbers and bools.
struct Folded(Value);

impl<'de> IntoDeserializer<'de, ConfigError> for Folded {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

macro_rules! forward_to_value {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
                self.0.$method(visitor)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for Folded {
    type Error = ConfigError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        match self.0.kind {
            ValueKind::Table(table) => {
                let entries = table.into_iter().map(|(k, v)| (k, Folded(v)));
                let mut map = MapDeserializer::<_, ConfigError>::new(entries);
                let value = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(value)
            }
            ValueKind::Array(items) => visit_items(items, visitor),
            kind => Value::new(None, kind).deserialize_any(visitor),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        let table = match self.0.kind {
            ValueKind::Table(table) => table,
            kind => return Folded(Value::new(None, kind)).deserialize_any(visitor),
        };
        let entries = table.into_iter().map(|(key, value)| {
            let field = fields
                .iter()
                .find(|f| **f == key)
                .or_else(|| fields.iter().find(|f| f.eq_ignore_ascii_case(&key)));
            (field.map_or(key, |f| f.to_string()), Folded(value))
        });
        let mut map = MapDeserializer::<_, ConfigError>::new(entries);
        let value = visitor.visit_map(&mut map)?;
        map.end()?;
        Ok(value)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        match self.0.kind {
            // `list:N` keys written without a base array
            ValueKind::Table(table) => {
                let mut indexed = Vec::with_capacity(table.len());
                for (key, value) in table {
                    let index = key.trim().parse::<usize>().map_err(|_| {
                        <ConfigError as de::Error>::custom(format!(
                            "expected a sequence, found key `{}`",
                            key
                        ))
                    })?;
                    indexed.push((index, value));
                }
                indexed.sort_by_key(|(i, _)| *i);
                visit_items(indexed.into_iter().map(|(_, v)| v).collect(), visitor)
            }
            kind => Folded(Value::new(None, kind)).deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        match self.0.kind {
            ValueKind::Nil => visitor.visit_none(),
            kind => visitor.visit_some(Folded(Value::new(None, kind))),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        self.deserialize_any(visitor)
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        self.0.deserialize_unit_struct(name, visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        self.0.deserialize_enum(name, variants, visitor)
    }

    forward_to_value! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_f32 deserialize_f64 deserialize_char deserialize_str deserialize_string
        deserialize_bytes deserialize_byte_buf deserialize_unit deserialize_identifier
        deserialize_ignored_any
    }
}

fn visit_items<'de, V: Visitor<'de>>(items: Vec<Value>, visitor: V) -> Result<V::Value, ConfigError> {
    let mut seq = SeqDeserializer::<_, ConfigError>::new(items.into_iter().map(Folded));
    let value = visitor.visit_seq(&mut seq)?;
    seq.end()?;
    Ok(value)
}
