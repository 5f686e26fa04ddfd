//! Tracked State
//!
//! [`TrackedCell`] is the basic unit of tracked state: a value guarded by
//! one dirtyable tag. [`TagMeta`] is the per-object variant, lazily
//! creating one tag per property key.
//!
//! # How Tracked State Works
//!
//! 1. Reading consumes the guarding tag into the active tracking frame.
//!
//! 2. Writing stores the value and dirties the tag, which advances the
//!    clock and invalidates every snapshot that covered the tag.
//!
//! Nothing is pushed to readers; they find out the next time they validate.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::runtime::Runtime;
use super::tag::Tag;
use crate::error::ValidatorError;

/// Per-key tag table for an object whose properties are tracked.
#[derive(Default)]
pub struct TagMeta {
    tags: RefCell<IndexMap<String, Tag>>,
}

impl TagMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tag guarding `key`, created on first use.
    pub fn tag_for(&self, runtime: &Runtime, key: &str) -> Tag {
        if let Some(tag) = self.tags.borrow().get(key) {
            return tag.clone();
        }
        let tag = runtime.create_tag();
        self.tags.borrow_mut().insert(key.to_string(), tag.clone());
        tag
    }

    /// Consume the tag for `key`.
    pub fn consume(&self, runtime: &Runtime, key: &str) {
        runtime.consume_tag(&self.tag_for(runtime, key));
    }

    /// Dirty the tag for `key`, if anyone ever asked for it.
    pub fn dirty(&self, runtime: &Runtime, key: &str) -> Result<(), ValidatorError> {
        let tag = self.tags.borrow().get(key).cloned();
        match tag {
            Some(tag) => runtime.dirty_tag(&tag),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.tags.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.borrow().is_empty()
    }
}

impl fmt::Debug for TagMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.tags.borrow().keys()).finish()
    }
}

struct CellInner<T> {
    runtime: Runtime,
    tag: Tag,
    value: RefCell<T>,
}

/// A single tracked value.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::new();
/// let count = TrackedCell::new(&runtime, 0);
///
/// let (value, tag) = runtime.track(|| count.get());
/// let snapshot = runtime.value_for_tag(&tag);
///
/// count.set(5)?;
/// assert!(!runtime.validate_tag(&tag, snapshot));
/// ```
pub struct TrackedCell<T> {
    inner: Rc<CellInner<T>>,
}

impl<T> TrackedCell<T> {
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self {
            inner: Rc::new(CellInner {
                runtime: runtime.clone(),
                tag: runtime.create_tag(),
                value: RefCell::new(value),
            }),
        }
    }

    /// Read through a closure, consuming the tag.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.runtime.consume_tag(&self.inner.tag);
        f(&self.inner.value.borrow())
    }

    /// Store a new value and dirty the tag.
    pub fn set(&self, value: T) -> Result<(), ValidatorError> {
        self.inner.runtime.dirty_tag(&self.inner.tag)?;
        *self.inner.value.borrow_mut() = value;
        Ok(())
    }

    /// Replace the value with `f(&current)`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<(), ValidatorError> {
        let next = f(&self.inner.value.borrow());
        self.set(next)
    }

    pub fn tag(&self) -> Tag {
        self.inner.tag.clone()
    }
}

impl<T: Clone> TrackedCell<T> {
    /// Read the value, consuming the tag.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Read without consuming the tag.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T> Clone for TrackedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for TrackedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedCell")
            .field("value", &self.inner.value.borrow())
            .field("tag", &self.inner.tag)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_read_is_tracked() {
        let rt = Runtime::new();
        let cell = TrackedCell::new(&rt, 1);

        let (value, tag) = rt.track(|| cell.get());
        assert_eq!(value, 1);
        assert_eq!(tag, cell.tag());
    }

    #[test]
    fn cell_write_invalidates() {
        let rt = Runtime::new();
        let cell = TrackedCell::new(&rt, "a".to_string());

        let (_, tag) = rt.track(|| cell.get());
        let snapshot = rt.value_for_tag(&tag);

        cell.set("b".to_string()).unwrap();
        assert!(!rt.validate_tag(&tag, snapshot));
        assert_eq!(cell.get_untracked(), "b");
    }

    #[test]
    fn cell_update_uses_current_value() {
        let rt = Runtime::new();
        let cell = TrackedCell::new(&rt, 10);
        cell.update(|n| n + 5).unwrap();
        assert_eq!(cell.get(), 15);
    }

    #[test]
    fn clones_share_state() {
        let rt = Runtime::new();
        let a = TrackedCell::new(&rt, 1);
        let b = a.clone();
        a.set(2).unwrap();
        assert_eq!(b.get(), 2);
        assert_eq!(a.tag(), b.tag());
    }

    #[test]
    fn meta_creates_one_tag_per_key() {
        let rt = Runtime::new();
        let meta = TagMeta::new();

        let first = meta.tag_for(&rt, "name");
        let again = meta.tag_for(&rt, "name");
        let other = meta.tag_for(&rt, "age");

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(meta.len(), 2);
    }

    #[test]
    fn meta_dirty_only_touches_that_key() {
        let rt = Runtime::new();
        let meta = TagMeta::new();

        let ((), name_tag) = rt.track(|| meta.consume(&rt, "name"));
        let ((), age_tag) = rt.track(|| meta.consume(&rt, "age"));
        let name_snapshot = rt.value_for_tag(&name_tag);
        let age_snapshot = rt.value_for_tag(&age_tag);

        meta.dirty(&rt, "name").unwrap();
        assert!(!rt.validate_tag(&name_tag, name_snapshot));
        assert!(rt.validate_tag(&age_tag, age_snapshot));
    }

    #[test]
    fn meta_dirty_of_unknown_key_is_noop() {
        let rt = Runtime::new();
        let meta = TagMeta::new();
        let before = rt.current_revision();
        meta.dirty(&rt, "missing").unwrap();
        assert_eq!(rt.current_revision(), before);
    }
}
