/// Typed variable store shared by start conditions, markup tags, and game code.

use rustc_hash::FxHashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::schema::value::{Value, ValueError, VariableKind};

#[derive(Debug, Error, PartialEq)]
pub enum VariableError {
    #[error("cannot register variable '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: ValueError,
    },
    #[error("variable '{0}' is not registered")]
    NotFound(String),
}

/// Change notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableEvent {
    Registered(String),
    Updated(String),
    Removed(String),
}

impl VariableEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::Registered(n) | Self::Updated(n) | Self::Removed(n) => n,
        }
    }
}

/// Rust types that can be read back out of the store.
pub trait FromValue: Sized + Default {
    const KIND: VariableKind;

    /// Exact kind match, plus lossless integer widening.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for i16 {
    const KIND: VariableKind = VariableKind::Short;
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Short(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    const KIND: VariableKind = VariableKind::Int;
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Short(v) => Some(i32::from(*v)),
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    const KIND: VariableKind = VariableKind::Long;
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for f32 {
    const KIND: VariableKind = VariableKind::Float;
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for bool {
    const KIND: VariableKind = VariableKind::Bool;
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for String {
    const KIND: VariableKind = VariableKind::String;
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(v) => Some(v.clone()),
            _ => None,
        }
    }
}

type Listener = Box<dyn FnMut(&VariableEvent)>;

/// Name-to-value map with change notification.
///
/// Reads never fail: a missing or mistyped variable logs a warning and
/// yields the zero value of the requested type.
#[derive(Default)]
pub struct VariableStore {
    variables: FxHashMap<String, Value>,
    listeners: Vec<Listener>,
}

impl fmt::Debug for VariableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableStore")
            .field("variables", &self.variables)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `listener` after every register, update, and remove.
    pub fn subscribe<F: FnMut(&VariableEvent) + 'static>(&mut self, listener: F) {
        self.listeners.push(Box::new(listener));
    }

    /// Bind `name` to a typed value, replacing any previous binding.
    pub fn register(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        debug!(variable = name, value = %value, "registering variable");
        let event = match self.variables.insert(name.to_string(), value) {
            Some(_) => VariableEvent::Updated(name.to_string()),
            None => VariableEvent::Registered(name.to_string()),
        };
        self.notify(&event);
    }

    /// Bind `name` to `raw` parsed as `kind`. The store is untouched on failure.
    pub fn register_parsed(
        &mut self,
        name: &str,
        raw: &str,
        kind: VariableKind,
    ) -> Result<(), VariableError> {
        match kind.parse(raw) {
            Ok(value) => {
                self.register(name, value);
                Ok(())
            }
            Err(source) => {
                let err = VariableError::Parse {
                    name: name.to_string(),
                    source,
                };
                warn!("{}", err);
                Err(err)
            }
        }
    }

    /// Read `name` as `T`, or `T::default()` with a warning on a miss or kind mismatch.
    pub fn retrieve<T: FromValue>(&self, name: &str) -> T {
        let Some(value) = self.variables.get(name) else {
            warn!(variable = name, "variable is not registered, using zero value");
            return T::default();
        };
        match T::from_value(value) {
            Some(v) => v,
            None => {
                warn!(
                    variable = name,
                    "variable holds a {} but a {} was requested, using zero value",
                    value.kind(),
                    T::KIND
                );
                T::default()
            }
        }
    }

    /// Read `name` as `kind`, boxed back into a [`Value`].
    pub fn retrieve_as(&self, name: &str, kind: VariableKind) -> Value {
        match kind {
            VariableKind::Short => Value::Short(self.retrieve(name)),
            VariableKind::Int => Value::Int(self.retrieve(name)),
            VariableKind::Long => Value::Long(self.retrieve(name)),
            VariableKind::Float => Value::Float(self.retrieve(name)),
            VariableKind::Bool => Value::Bool(self.retrieve(name)),
            VariableKind::String => Value::String(self.retrieve(name)),
        }
    }

    /// Raw lookup. Logs a warning on a miss.
    pub fn retrieve_value(&self, name: &str) -> Option<&Value> {
        let value = self.variables.get(name);
        if value.is_none() {
            warn!(variable = name, "variable is not registered");
        }
        value
    }

    pub fn remove(&mut self, name: &str) -> Result<Value, VariableError> {
        match self.variables.remove(name) {
            Some(value) => {
                debug!(variable = name, "removed variable");
                self.notify(&VariableEvent::Removed(name.to_string()));
                Ok(value)
            }
            None => {
                let err = VariableError::NotFound(name.to_string());
                error!("cannot remove: {}", err);
                Err(err)
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// All bindings sorted by name.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        let mut entries: Vec<_> = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn notify(&mut self, event: &VariableEvent) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }
}
