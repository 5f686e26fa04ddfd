//! References
//!
//! A reference is a lazily evaluated, cached, tracked value: the thing a
//! template expression compiles to. The VM builds one reference per
//! expression when a block first renders and re-reads it on every
//! revalidation; the reference decides whether that means recomputing.
//!
//! # Kinds
//!
//! - **Const** wraps a fixed value and has no tag.
//! - **Compute** runs a closure in a tracking frame.
//! - **Property** reads one key off a parent reference's value.
//! - **Cell** holds a value that the owner replaces explicitly (iteration
//!   items use these).
//!
//! A compute or property reference whose evaluation consumed no tags has
//! [`Tag::Constant`] as its tag and is permanently const from then on.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use super::tag::{Revision, Tag, CONSTANT};
use crate::error::{RenderError, ValidatorError};
use crate::value::Value;

type ComputeFn = Box<dyn Fn() -> Result<Value, RenderError>>;

enum RefKind {
    Const(Value),
    Compute(ComputeFn),
    Property { parent: Reference, key: String },
    Cell { tag: Tag, value: RefCell<Value> },
}

#[derive(Default)]
struct RefState {
    value: Option<Value>,
    tag: Option<Tag>,
    snapshot: Revision,
}

struct RefInner {
    runtime: Option<Runtime>,
    kind: RefKind,
    state: RefCell<RefState>,
}

/// A tracked, cached value handle. Clones share the cache.
#[derive(Clone)]
pub struct Reference {
    inner: Rc<RefInner>,
}

impl Reference {
    fn from_parts(runtime: Option<Runtime>, kind: RefKind) -> Self {
        Self {
            inner: Rc::new(RefInner {
                runtime,
                kind,
                state: RefCell::new(RefState::default()),
            }),
        }
    }

    /// A reference that always yields `value`.
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::from_parts(None, RefKind::Const(value.into()))
    }

    /// A reference computed by `f`, tracked and cached.
    pub fn compute<F>(runtime: &Runtime, f: F) -> Self
    where
        F: Fn() -> Result<Value, RenderError> + 'static,
    {
        Self::from_parts(Some(runtime.clone()), RefKind::Compute(Box::new(f)))
    }

    /// A reference to a value the owner replaces with [`Reference::update`].
    pub fn cell(runtime: &Runtime, value: impl Into<Value>) -> Self {
        Self::from_parts(
            Some(runtime.clone()),
            RefKind::Cell {
                tag: runtime.create_tag(),
                value: RefCell::new(value.into()),
            },
        )
    }

    /// A reference to property `key` of this reference's value.
    pub fn child(&self, runtime: &Runtime, key: &str) -> Self {
        Self::from_parts(
            Some(runtime.clone()),
            RefKind::Property {
                parent: self.clone(),
                key: key.to_string(),
            },
        )
    }

    /// Follow a dotted path of property keys.
    pub fn path<S: AsRef<str>>(&self, runtime: &Runtime, tail: &[S]) -> Self {
        tail.iter()
            .fold(self.clone(), |parent, key| parent.child(runtime, key.as_ref()))
    }

    /// Current value.
    ///
    /// Consumes this reference's tag into the active frame. Errors from a
    /// compute closure are returned and nothing is cached.
    pub fn value(&self) -> Result<Value, RenderError> {
        let runtime = match (&self.inner.kind, &self.inner.runtime) {
            (RefKind::Const(value), _) => return Ok(value.clone()),
            (_, Some(runtime)) => runtime,
            (_, None) => return Err(RenderError::MalformedProgram("reference without a runtime".into())),
        };

        if let RefKind::Cell { tag, value } = &self.inner.kind {
            runtime.consume_tag(tag);
            let value = value.borrow().clone();
            let mut state = self.inner.state.borrow_mut();
            state.snapshot = runtime.value_for_tag(tag);
            state.tag = Some(tag.clone());
            state.value = Some(value.clone());
            return Ok(value);
        }

        {
            let state = self.inner.state.borrow();
            if let (Some(value), Some(tag)) = (&state.value, &state.tag) {
                if tag.is_constant() {
                    return Ok(value.clone());
                }
                if runtime.validate_tag(tag, state.snapshot) {
                    runtime.consume_tag(tag);
                    return Ok(value.clone());
                }
            }
        }

        let (result, tag) = runtime.track(|| self.evaluate(runtime));
        let value = result?;
        let snapshot = runtime.value_for_tag(&tag);
        runtime.consume_tag(&tag);

        let mut state = self.inner.state.borrow_mut();
        state.value = Some(value.clone());
        state.tag = Some(tag);
        state.snapshot = snapshot;
        Ok(value)
    }

    fn evaluate(&self, runtime: &Runtime) -> Result<Value, RenderError> {
        match &self.inner.kind {
            RefKind::Compute(f) => f(),
            RefKind::Property { parent, key } => Ok(parent.value()?.get_property(runtime, key)),
            RefKind::Const(value) => Ok(value.clone()),
            RefKind::Cell { value, .. } => Ok(value.borrow().clone()),
        }
    }

    /// True when the value can never change.
    pub fn is_const(&self) -> bool {
        match &self.inner.kind {
            RefKind::Const(_) => true,
            RefKind::Cell { .. } => false,
            _ => matches!(&self.inner.state.borrow().tag, Some(tag) if tag.is_constant()),
        }
    }

    /// Whether the next [`Reference::value`] would produce something new.
    /// Never-read references are dirty.
    pub fn is_dirty(&self) -> bool {
        if let RefKind::Const(_) = self.inner.kind {
            return false;
        }
        let state = self.inner.state.borrow();
        match (&state.tag, &self.inner.runtime) {
            (Some(tag), Some(runtime)) => !runtime.validate_tag(tag, state.snapshot),
            _ => true,
        }
    }

    /// The tag covering the last read. Unread references report
    /// [`Tag::Volatile`].
    pub fn tag(&self) -> Tag {
        match &self.inner.kind {
            RefKind::Const(_) => Tag::Constant,
            RefKind::Cell { tag, .. } => tag.clone(),
            _ => self.inner.state.borrow().tag.clone().unwrap_or(Tag::Volatile),
        }
    }

    /// Revision recorded at the last read, or [`CONSTANT`] if never read.
    pub fn snapshot(&self) -> Revision {
        match self.inner.state.borrow().tag {
            Some(_) => self.inner.state.borrow().snapshot,
            None => CONSTANT,
        }
    }

    /// Write through the reference.
    ///
    /// Cells store the value (dirtying only if it differs); property
    /// references write to the parent object. Const and compute references
    /// are read-only.
    pub fn update(&self, value: impl Into<Value>) -> Result<(), RenderError> {
        let value = value.into();
        match (&self.inner.kind, &self.inner.runtime) {
            (RefKind::Cell { tag, value: slot }, Some(runtime)) => {
                if *slot.borrow() == value {
                    return Ok(());
                }
                runtime.dirty_tag(tag)?;
                *slot.borrow_mut() = value;
                Ok(())
            }
            (RefKind::Property { parent, key }, Some(runtime)) => {
                let target = runtime.untrack(|| parent.value())?;
                match target.as_object() {
                    Some(obj) => Ok(obj.set(runtime, key, value)?),
                    None => Err(ValidatorError::InvalidOperation(format!(
                        "cannot set `{key}` on a non-object"
                    ))
                    .into()),
                }
            }
            _ => Err(ValidatorError::InvalidOperation("reference is read-only".to_string()).into()),
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner.kind {
            RefKind::Const(_) => "const",
            RefKind::Compute(_) => "compute",
            RefKind::Property { .. } => "property",
            RefKind::Cell { .. } => "cell",
        };
        f.debug_struct("Reference")
            .field("kind", &kind)
            .field("value", &self.inner.state.borrow().value)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TrackedObject;
    use std::cell::Cell;

    #[test]
    fn const_reference() {
        let r = Reference::constant("x");
        assert_eq!(r.value().unwrap(), Value::from("x"));
        assert!(r.is_const());
        assert!(!r.is_dirty());
        assert_eq!(r.tag(), Tag::Constant);
    }

    #[test]
    fn compute_reference_caches_until_input_changes() {
        let rt = Runtime::new();
        let obj = TrackedObject::new();
        obj.set(&rt, "n", 1).unwrap();
        let calls = Rc::new(Cell::new(0));

        let r = {
            let (rt2, obj, calls) = (rt.clone(), obj.clone(), calls.clone());
            Reference::compute(&rt, move || {
                calls.set(calls.get() + 1);
                Ok(obj.get(&rt2, "n"))
            })
        };

        assert!(r.is_dirty());
        assert_eq!(r.value().unwrap(), Value::from(1));
        assert_eq!(r.value().unwrap(), Value::from(1));
        assert_eq!(calls.get(), 1);
        assert!(!r.is_dirty());

        obj.set(&rt, "n", 2).unwrap();
        assert!(r.is_dirty());
        assert_eq!(r.value().unwrap(), Value::from(2));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn compute_with_no_reads_becomes_const() {
        let rt = Runtime::new();
        let r = Reference::compute(&rt, || Ok(Value::from(7)));
        assert!(!r.is_const());
        r.value().unwrap();
        assert!(r.is_const());
    }

    #[test]
    fn compute_errors_are_not_cached() {
        let rt = Runtime::new();
        let fail = Rc::new(Cell::new(true));
        let r = {
            let fail = fail.clone();
            Reference::compute(&rt, move || {
                if fail.get() {
                    Err(RenderError::UnknownHelper("boom".into()))
                } else {
                    Ok(Value::from("ok"))
                }
            })
        };

        assert!(r.value().is_err());
        fail.set(false);
        assert_eq!(r.value().unwrap(), Value::from("ok"));
    }

    #[test]
    fn child_path_tracks_each_segment() {
        let rt = Runtime::new();
        let inner = TrackedObject::new();
        inner.set(&rt, "name", "a").unwrap();
        let root = TrackedObject::new();
        root.set(&rt, "user", inner.clone()).unwrap();

        let r = Reference::constant(root.clone()).path(&rt, &["user", "name"]);
        assert_eq!(r.value().unwrap(), Value::from("a"));

        inner.set(&rt, "name", "b").unwrap();
        assert_eq!(r.value().unwrap(), Value::from("b"));

        let replacement = TrackedObject::new();
        replacement.set(&rt, "name", "c").unwrap();
        root.set(&rt, "user", replacement).unwrap();
        assert_eq!(r.value().unwrap(), Value::from("c"));
    }

    #[test]
    fn property_of_constant_scalar_is_const() {
        let rt = Runtime::new();
        let r = Reference::constant("hello").child(&rt, "length");
        assert_eq!(r.value().unwrap(), Value::from(5));
        assert!(r.is_const());
    }

    #[test]
    fn cell_update_dirties_only_on_change() {
        let rt = Runtime::new();
        let r = Reference::cell(&rt, 1);
        let (_, tag) = rt.track(|| r.value());
        let snapshot = rt.value_for_tag(&tag);

        r.update(1).unwrap();
        assert!(rt.validate_tag(&tag, snapshot));

        r.update(2).unwrap();
        assert!(!rt.validate_tag(&tag, snapshot));
        assert_eq!(r.value().unwrap(), Value::from(2));
    }

    #[test]
    fn property_update_writes_parent_object() {
        let rt = Runtime::new();
        let obj = TrackedObject::new();
        let r = Reference::constant(obj.clone()).child(&rt, "title");

        r.update("set").unwrap();
        assert_eq!(obj.get_untracked("title"), Value::from("set"));
        assert!(Reference::constant(1).update(2).is_err());
    }
}
