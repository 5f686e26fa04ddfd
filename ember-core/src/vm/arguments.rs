use std::fmt;

use indexmap::IndexMap;

use crate::error::RenderError;
use crate::reactive::Reference;
use crate::value::Value;

/// Evaluated arguments handed to helpers, modifiers and component managers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    positional: Vec<Value>,
    named: IndexMap<String, Value>,
}

impl Arguments {
    pub fn new(positional: Vec<Value>, named: IndexMap<String, Value>) -> Self {
        Self { positional, named }
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    /// Positional argument `index`, or null when absent.
    pub fn at(&self, index: usize) -> Value {
        self.positional.get(index).cloned().unwrap_or(Value::Null)
    }

    /// Named argument `key`, or null when absent.
    pub fn named(&self, key: &str) -> Value {
        self.named.get(key).cloned().unwrap_or(Value::Null)
    }

    pub fn named_args(&self) -> &IndexMap<String, Value> {
        &self.named
    }

    pub fn has_named(&self, key: &str) -> bool {
        self.named.contains_key(key)
    }

    /// Number of positional arguments.
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// Argument references captured at an invocation site. Reifying reads
/// every reference, so doing it inside a tracking frame records all of
/// their tags.
#[derive(Clone, Default)]
pub(crate) struct CapturedArgs {
    pub positional: Vec<Reference>,
    pub named: IndexMap<String, Reference>,
}

impl CapturedArgs {
    pub fn reify(&self) -> Result<Arguments, RenderError> {
        let positional = self
            .positional
            .iter()
            .map(Reference::value)
            .collect::<Result<Vec<_>, _>>()?;
        let mut named = IndexMap::with_capacity(self.named.len());
        for (key, reference) in &self.named {
            named.insert(key.clone(), reference.value()?);
        }
        Ok(Arguments { positional, named })
    }
}

impl fmt::Debug for CapturedArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedArgs")
            .field("positional", &self.positional.len())
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .finish()
    }
}
