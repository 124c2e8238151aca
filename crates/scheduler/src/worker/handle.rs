use std::sync::Arc;

use indexmap::IndexMap;

use jobvisor_core::Configuration;

use crate::error::{HandleError, SchedulerError};

use super::{ProgressSink, ResultStore};

/// A unit of work run inside a worker process against one configuration.
///
/// Progress goes out through the sink; anything written to the store
/// becomes the job's final result.
pub trait Handle: Send + Sync {
    /// Registry name, matched against `JOBVISOR_HANDLE`.
    fn name(&self) -> &str;

    /// One-line summary shown by `jobvisor handles`.
    fn description(&self) -> &str {
        ""
    }

    fn run(
        &self,
        config: &Configuration,
        progress: &mut ProgressSink,
        store: &mut ResultStore,
    ) -> Result<(), HandleError>;
}

/// Adapts a closure into a [`Handle`].
pub struct FnHandle<F> {
    name: String,
    description: String,
    run: F,
}

impl<F> FnHandle<F>
where
    F: Fn(&Configuration, &mut ProgressSink, &mut ResultStore) -> Result<(), HandleError>
        + Send
        + Sync,
{
    pub fn new(name: impl Into<String>, run: F) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            run,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl<F> Handle for FnHandle<F>
where
    F: Fn(&Configuration, &mut ProgressSink, &mut ResultStore) -> Result<(), HandleError>
        + Send
        + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(
        &self,
        config: &Configuration,
        progress: &mut ProgressSink,
        store: &mut ResultStore,
    ) -> Result<(), HandleError> {
        (self.run)(config, progress, store)
    }
}

/// Handles available to a worker binary, keyed by name.
pub struct HandleRegistry {
    handles: IndexMap<String, Arc<dyn Handle>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            handles: IndexMap::new(),
        }
    }

    /// Register a handle. Returns error if the name is already registered.
    pub fn register(&mut self, handle: impl Handle + 'static) -> Result<(), SchedulerError> {
        let name = handle.name().to_string();
        if self.handles.contains_key(&name) {
            return Err(SchedulerError::DuplicateHandle(name));
        }
        self.handles.insert(name, Arc::new(handle));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handle>> {
        self.handles.get(name).cloned()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Handle>> {
        self.handles.values()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
