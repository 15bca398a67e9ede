//! Task-type registry.
//!
//! This module provides [`TaskRegistry`], the name → constructor table the
//! engine uses to rehydrate persisted flows and task records into live
//! [`Task`] objects. Any task type usable as a flow root must be
//! registered before flows referencing it can be loaded.

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{Result, SignoffError, Task};

/// A constructor building a task from its persisted parameters.
pub type TaskConstructor = Arc<dyn Fn(JsonValue) -> Result<Box<dyn Task>> + Send + Sync>;

/// A table mapping task-type names to constructors.
///
/// Persisted flow and task records store only a type name and parameters;
/// the registry turns those back into trait objects. Constructors are
/// closures, so they may capture shared resources (clients, channels) that
/// the reconstructed tasks need.
///
/// # Examples
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use signoff::{Task, TaskRegistry};
/// # use async_trait::async_trait;
/// # #[derive(Debug, Clone, Serialize, Deserialize)]
/// # struct Purchase { item: String }
/// # #[async_trait]
/// # impl Task for Purchase {
/// #     fn kind(&self) -> &str { "purchase" }
/// #     fn tag(&self) -> String { format!("purchase:{}", self.item) }
/// # }
///
/// let mut registry = TaskRegistry::new();
/// registry.register_type::<Purchase>("purchase");
/// assert!(registry.contains("purchase"));
/// ```
#[derive(Clone, Default)]
pub struct TaskRegistry {
    constructors: HashMap<String, TaskConstructor>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor under a task-type name.
    ///
    /// Re-registering a name replaces the previous constructor.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(JsonValue) -> Result<Box<dyn Task>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(kind.into(), Arc::new(constructor));
    }

    /// Registers a task type that deserializes directly from its
    /// parameters.
    ///
    /// Shorthand for the common case where the task struct derives
    /// `Deserialize` and needs nothing beyond its persisted parameters.
    pub fn register_type<T>(&mut self, kind: impl Into<String>)
    where
        T: Task + serde::de::DeserializeOwned + 'static,
    {
        self.register(kind, |params| {
            let task: T = serde_json::from_value(params)?;
            Ok(Box::new(task) as Box<dyn Task>)
        });
    }

    /// Constructs a task of the named kind from parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SignoffError::UnknownTaskKind`] if no constructor is
    /// registered under `kind`, or whatever the constructor itself fails
    /// with (typically a deserialization error).
    pub fn construct(&self, kind: &str, params: JsonValue) -> Result<Box<dyn Task>> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| SignoffError::UnknownTaskKind(kind.to_string()))?;
        constructor(params)
    }

    /// Returns true if a constructor is registered under `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Returns the registered type names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Returns the number of registered task types.
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
