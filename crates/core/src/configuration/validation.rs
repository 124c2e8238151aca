use serde_yaml::Value;

use crate::error::CoreError;

use super::{Configuration, Group, ParamValue, Settings};

impl Configuration {
    /// Build a configuration from already-typed settings.
    ///
    /// Typed values are valid leaves by construction, so only the
    /// non-empty rule is checked here.
    pub fn new(name: impl Into<String>, settings: Settings) -> Result<Self, CoreError> {
        let name = name.into();
        if settings.is_empty() {
            return Err(CoreError::EmptySettings { name });
        }
        Ok(Self {
            name,
            settings,
            locked: false,
        })
    }

    /// Validate a raw single-entry mapping `{name: {group: {param: value}}}`.
    ///
    /// Rejects empty input, more than one configuration, groups that are not
    /// mappings, and any leaf that is not a string, number, or list thereof.
    pub fn validate(raw: &Value) -> Result<Self, CoreError> {
        let mapping = match raw {
            Value::Mapping(m) => m,
            Value::Null => return Err(CoreError::Empty),
            other => return Err(CoreError::NotAMapping(describe(other))),
        };

        match mapping.len() {
            0 => Err(CoreError::Empty),
            1 => {
                let (name, settings) = mapping
                    .iter()
                    .next()
                    .ok_or(CoreError::Empty)?;
                Self::from_settings_value(key_to_string(name)?, settings)
            }
            n => Err(CoreError::MultipleConfigurations(n)),
        }
    }

    /// Validate the raw two-level settings mapping for a configuration named `name`.
    pub fn from_settings_value(name: impl Into<String>, raw: &Value) -> Result<Self, CoreError> {
        let name = name.into();
        let groups = match raw {
            Value::Mapping(m) => m,
            Value::Null => return Err(CoreError::EmptySettings { name }),
            other => {
                return Err(CoreError::NotAMapping(format!(
                    "settings of '{name}': {}",
                    describe(other)
                )))
            }
        };

        let mut settings = Settings::with_capacity(groups.len());
        for (group_key, group_value) in groups {
            let group_name = key_to_string(group_key)?;
            let params = match group_value {
                Value::Mapping(m) => m,
                _ => {
                    return Err(CoreError::InvalidShape {
                        name,
                        group: group_name,
                    })
                }
            };

            let mut group = Group::with_capacity(params.len());
            for (param_key, param_value) in params {
                let param_name = key_to_string(param_key)?;
                let value = ParamValue::from_yaml(param_value).ok_or_else(|| {
                    CoreError::InvalidSetting {
                        name: name.clone(),
                        key: param_name.clone(),
                        value: describe(param_value),
                    }
                })?;
                group.insert(param_name, value);
            }
            settings.insert(group_name, group);
        }

        Self::new(name, settings)
    }

    /// Validate the JSON form produced by [`Configuration::to_json`].
    pub fn from_json(raw: &serde_json::Value) -> Result<Self, CoreError> {
        let yaml = serde_yaml::to_value(raw)?;
        Self::validate(&yaml)
    }
}

fn key_to_string(key: &Value) -> Result<String, CoreError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(CoreError::InvalidKey(describe(other))),
    }
}

/// Compact single-line rendering of a raw value for error messages.
fn describe(value: &Value) -> String {
    match serde_json::to_string(value) {
        Ok(s) => s,
        Err(_) => format!("{value:?}"),
    }
}
