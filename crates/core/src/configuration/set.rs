use indexmap::IndexMap;

use crate::error::CoreError;

use super::Configuration;

/// Ordered working set of configurations with unique names.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationSet {
    configs: IndexMap<String, Configuration>,
}

impl ConfigurationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration. Returns error if the name is already taken.
    pub fn insert(&mut self, config: Configuration) -> Result<(), CoreError> {
        if self.configs.contains_key(config.name()) {
            return Err(CoreError::DuplicateName(config.name().to_string()));
        }
        self.configs.insert(config.name().to_string(), config);
        Ok(())
    }

    /// Add several configurations, stopping at the first duplicate name.
    pub fn extend(
        &mut self,
        configs: impl IntoIterator<Item = Configuration>,
    ) -> Result<(), CoreError> {
        for config in configs {
            self.insert(config)?;
        }
        Ok(())
    }

    /// Remove a configuration by name, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Configuration> {
        self.configs.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Configuration> {
        self.configs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Configuration> {
        self.configs.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Configuration> {
        self.configs.values().cloned().collect()
    }
}

impl TryFrom<Vec<Configuration>> for ConfigurationSet {
    type Error = CoreError;

    fn try_from(configs: Vec<Configuration>) -> Result<Self, Self::Error> {
        let mut set = Self::new();
        set.extend(configs)?;
        Ok(set)
    }
}
