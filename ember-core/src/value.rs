//! Template Values
//!
//! [`Value`] is what references produce and what the VM writes into the
//! DOM. Objects are [`TrackedObject`]s: every property read consumes that
//! property's tag, so templates re-render exactly the parts whose inputs
//! changed.
//!
//! Truthiness follows the template language: `null`, `false`, `""`, `0`,
//! `NaN` and the empty list are falsy; everything else is truthy.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::ValidatorError;
use crate::reactive::{Runtime, TagMeta};

/// A dynamically typed template value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    /// Markup that is inserted without escaping.
    Html(Rc<str>),
    List(Rc<[Value]>),
    Object(TrackedObject),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn html(s: impl Into<Rc<str>>) -> Self {
        Value::Html(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) | Value::Html(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Html(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&TrackedObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Text as it appears when appended to the DOM. `null` renders as the
    /// empty string; integral numbers drop their fraction.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) | Value::Html(s) => s.to_string(),
            Value::List(items) => items
                .iter()
                .map(Value::to_display_string)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
        }
    }

    /// Read `key`, consuming its tag when this is an object.
    ///
    /// Lists answer `length` and numeric indices. Anything else yields
    /// `null`.
    pub fn get_property(&self, runtime: &Runtime, key: &str) -> Value {
        match self {
            Value::Object(obj) => obj.get(runtime, key),
            Value::List(items) => {
                if key == "length" {
                    Value::Number(items.len() as f64)
                } else {
                    key.parse::<usize>()
                        .ok()
                        .and_then(|index| items.get(index).cloned())
                        .unwrap_or_default()
                }
            }
            Value::String(s) if key == "length" => Value::Number(s.chars().count() as f64),
            _ => Value::Null,
        }
    }

    /// Items for iteration. Non-lists iterate as empty.
    pub fn items(&self) -> &[Value] {
        match self {
            Value::List(items) => &items[..],
            _ => &[],
        }
    }

    /// Key used by `{{#each}}` when keying a primitive by identity. Lists
    /// and objects have none; they key by [`Value::allocation`].
    pub fn identity_key(&self) -> Option<String> {
        match self {
            Value::Null => Some("null".to_string()),
            Value::Bool(b) => Some(format!("b:{b}")),
            Value::Number(n) => Some(format!("n:{}", format_number(*n))),
            Value::String(s) => Some(format!("s:{s}")),
            Value::Html(s) => Some(format!("h:{s}")),
            Value::List(_) | Value::Object(_) => None,
        }
    }

    /// Address of the shared allocation behind a list or object. Two
    /// values compare equal here only while both are alive, so callers
    /// keying on it must hold the value too.
    pub(crate) fn allocation(&self) -> Option<*const ()> {
        match self {
            Value::List(items) => Some(Rc::as_ptr(items) as *const ()),
            Value::Object(obj) => Some(Rc::as_ptr(&obj.inner) as *const ()),
            _ => None,
        }
    }

    /// Build a value from JSON. Objects become fresh tracked objects.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::string(s.as_str()),
            serde_json::Value::Array(items) => Value::list(items.iter().map(Value::from_json)),
            serde_json::Value::Object(map) => Value::Object(TrackedObject::from_iter(
                map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))),
            )),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        // Covers negative zero.
        "0".to_string()
    } else {
        n.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Html(a), Value::Html(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || a[..] == b[..],
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Html(s) => write!(f, "html({s:?})"),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(obj) => obj.fmt(f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items.into())
    }
}

impl From<TrackedObject> for Value {
    fn from(obj: TrackedObject) -> Self {
        Value::Object(obj)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

// ----------------------------------------------------------------------------
// Tracked objects
// ----------------------------------------------------------------------------

struct ObjectInner {
    props: RefCell<IndexMap<String, Value>>,
    meta: TagMeta,
}

/// A property bag with one tag per key. Clones share identity.
#[derive(Clone)]
pub struct TrackedObject {
    inner: Rc<ObjectInner>,
}

impl TrackedObject {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                props: RefCell::new(IndexMap::new()),
                meta: TagMeta::new(),
            }),
        }
    }

    /// Read `key`, consuming its tag. Missing keys read as `null` and are
    /// still tracked, so setting them later invalidates the reader.
    pub fn get(&self, runtime: &Runtime, key: &str) -> Value {
        self.inner.meta.consume(runtime, key);
        self.get_untracked(key)
    }

    pub fn get_untracked(&self, key: &str) -> Value {
        self.inner.props.borrow().get(key).cloned().unwrap_or_default()
    }

    /// Write `key` and dirty its tag.
    pub fn set(&self, runtime: &Runtime, key: &str, value: impl Into<Value>) -> Result<(), ValidatorError> {
        self.inner.meta.dirty(runtime, key)?;
        self.inner.props.borrow_mut().insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.props.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.props.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.props.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &TrackedObject) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for TrackedObject {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for TrackedObject {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let obj = TrackedObject::new();
        obj.inner
            .props
            .borrow_mut()
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v)));
        obj
    }
}

impl fmt::Debug for TrackedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.inner.props.borrow().iter()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
