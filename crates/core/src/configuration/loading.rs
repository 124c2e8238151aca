use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::CoreError;

use super::{Configuration, ParamValue};

/// Parse a YAML document holding any number of configurations.
///
/// The document is a mapping of configuration name to settings; each entry
/// is validated independently and declaration order is preserved.
pub fn parse_configurations(yaml: &str) -> Result<Vec<Configuration>, CoreError> {
    let root: Value = serde_yaml::from_str(yaml)?;
    let mapping = match root {
        Value::Mapping(m) => m,
        Value::Null => return Err(CoreError::Empty),
        other => {
            return Err(CoreError::NotAMapping(
                serde_json::to_string(&other).unwrap_or_else(|_| format!("{other:?}")),
            ))
        }
    };

    if mapping.is_empty() {
        return Err(CoreError::Empty);
    }

    mapping
        .iter()
        .map(|(name, settings)| {
            let mut single = Mapping::with_capacity(1);
            single.insert(name.clone(), settings.clone());
            Configuration::validate(&Value::Mapping(single))
        })
        .collect()
}

/// Load and validate every configuration in a YAML file.
pub fn load_configurations(path: impl AsRef<Path>) -> Result<Vec<Configuration>, CoreError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let configs = parse_configurations(&content)?;
    tracing::debug!(
        path = %path.as_ref().display(),
        count = configs.len(),
        "loaded configurations"
    );
    Ok(configs)
}

/// Render configurations in the file format, preserving their order.
pub fn to_yaml_string(configs: &[Configuration]) -> Result<String, CoreError> {
    let mut root = Mapping::with_capacity(configs.len());
    for config in configs {
        root.insert(Value::String(config.name().to_string()), settings_to_yaml(config)?);
    }
    Ok(serde_yaml::to_string(&Value::Mapping(root))?)
}

/// Write configurations to a YAML file, replacing its contents.
pub fn dump_configurations(
    path: impl AsRef<Path>,
    configs: &[Configuration],
) -> Result<(), CoreError> {
    let yaml = to_yaml_string(configs)?;
    std::fs::write(path.as_ref(), yaml)?;
    tracing::debug!(
        path = %path.as_ref().display(),
        count = configs.len(),
        "dumped configurations"
    );
    Ok(())
}

fn settings_to_yaml(config: &Configuration) -> Result<Value, CoreError> {
    let mut groups = Mapping::with_capacity(config.settings().len());
    for (group, params) in config.settings() {
        let mut entries = Mapping::with_capacity(params.len());
        for (param, value) in params {
            entries.insert(Value::String(param.clone()), param_to_yaml(value)?);
        }
        groups.insert(Value::String(group.clone()), Value::Mapping(entries));
    }
    Ok(Value::Mapping(groups))
}

fn param_to_yaml(value: &ParamValue) -> Result<Value, CoreError> {
    Ok(serde_yaml::to_value(value)?)
}
