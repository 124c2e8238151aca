//! Validated, named, two-level parameter sets.
//!
//! A [`Configuration`] maps group names to groups of parameters, each group
//! mapping parameter names to [`ParamValue`]s. Shape is checked once at
//! construction and never changes afterwards.
//!
//! Split into focused submodules:
//! - `value`: the leaf parameter type and its recursive validity rule
//! - `validation`: construction from raw YAML/JSON and shape checks
//! - `loading`: YAML file format (`name: {group: {param: value}}`)
//! - `set`: name-unique ordered collection of configurations

mod loading;
mod set;
mod validation;
mod value;

use std::fmt;

use indexmap::IndexMap;

pub use loading::{dump_configurations, load_configurations, parse_configurations, to_yaml_string};
pub use set::ConfigurationSet;
pub use value::ParamValue;

/// Parameters of one group, in declaration order.
pub type Group = IndexMap<String, ParamValue>;

/// Groups of a configuration, in declaration order.
pub type Settings = IndexMap<String, Group>;

/// A named parameter set driving one job.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    name: String,
    settings: Settings,
    /// Presentation-only flag; editors refuse changes when set.
    locked: bool,
}

impl Configuration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Look up one group by name.
    pub fn group(&self, group: &str) -> Option<&Group> {
        self.settings.get(group)
    }

    /// Look up a parameter inside a specific group.
    pub fn get(&self, group: &str, param: &str) -> Option<&ParamValue> {
        self.settings.get(group).and_then(|g| g.get(param))
    }

    /// Find the first parameter with the given name, searching groups in order.
    pub fn lookup(&self, param: &str) -> Option<&ParamValue> {
        self.settings.values().find_map(|g| g.get(param))
    }

    /// Iterate `(group, param, value)` triples in declaration order.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str, &ParamValue)> {
        self.settings.iter().flat_map(|(group, params)| {
            params
                .iter()
                .map(move |(param, value)| (group.as_str(), param.as_str(), value))
        })
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// JSON form `{name: {group: {param: value}}}`, the same shape as the file format.
    pub fn to_json(&self) -> serde_json::Value {
        let settings: serde_json::Map<String, serde_json::Value> = self
            .settings
            .iter()
            .map(|(group, params)| {
                let params: serde_json::Map<String, serde_json::Value> = params
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                (group.clone(), serde_json::Value::Object(params))
            })
            .collect();

        let mut root = serde_json::Map::new();
        root.insert(self.name.clone(), serde_json::Value::Object(settings));
        serde_json::Value::Object(root)
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name: {}", self.name)?;
        write!(f, "Configuration:")?;
        for (group, params) in &self.settings {
            write!(f, "\n\t{group}:")?;
            for (param, value) in params {
                write!(f, "\n\t\t{param}: {value}")?;
            }
        }
        Ok(())
    }
}
