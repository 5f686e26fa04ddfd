//! Cache
//!
//! A cache is a derived value that recomputes only when something it read
//! has changed.
//!
//! # How Caches Work
//!
//! 1. On first access the computation runs inside a tracking frame. The
//!    combined tag and its revision are stored with the value.
//!
//! 2. On later accesses the stored snapshot is validated. If it still holds
//!    the cached value is returned without running anything.
//!
//! 3. Either way the cache's tag is consumed into the caller's frame, so a
//!    cache read inside another cache makes the outer one depend on
//!    everything the inner one read.
//!
//! A cache whose computation consumed nothing is constant and never
//! recomputes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use super::tag::{Revision, Tag};

/// State of a cache's stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Never computed.
    Empty,
    /// The stored value is up to date.
    Valid,
    /// Something read by the last computation has changed.
    Stale,
}

struct Cached<T> {
    value: T,
    tag: Tag,
    snapshot: Revision,
}

struct CacheInner<T> {
    runtime: Runtime,
    compute: Box<dyn Fn() -> T>,
    cached: RefCell<Option<Cached<T>>>,
}

/// A memoized tracked computation.
pub struct Cache<T> {
    inner: Rc<CacheInner<T>>,
}

impl<T: Clone + 'static> Cache<T> {
    /// Wrap a computation. Nothing runs until the first [`Cache::get`].
    pub fn new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self {
            inner: Rc::new(CacheInner {
                runtime: runtime.clone(),
                compute: Box::new(compute),
                cached: RefCell::new(None),
            }),
        }
    }

    /// Current value, recomputing if stale.
    pub fn get(&self) -> T {
        let runtime = &self.inner.runtime;

        if let Some(cached) = self.inner.cached.borrow().as_ref() {
            if runtime.validate_tag(&cached.tag, cached.snapshot) {
                runtime.consume_tag(&cached.tag);
                return cached.value.clone();
            }
        }

        // The borrow above is released before user code runs.
        let (value, tag) = runtime.track(|| (self.inner.compute)());
        let snapshot = runtime.value_for_tag(&tag);
        runtime.consume_tag(&tag);

        *self.inner.cached.borrow_mut() = Some(Cached {
            value: value.clone(),
            tag,
            snapshot,
        });
        value
    }
}

impl<T> Cache<T> {
    pub fn state(&self) -> CacheState {
        match self.inner.cached.borrow().as_ref() {
            None => CacheState::Empty,
            Some(cached) if self.inner.runtime.validate_tag(&cached.tag, cached.snapshot) => {
                CacheState::Valid
            }
            Some(_) => CacheState::Stale,
        }
    }

    /// True once computed with no tracked reads.
    pub fn is_const(&self) -> bool {
        matches!(self.inner.cached.borrow().as_ref(), Some(cached) if cached.tag.is_constant())
    }

    /// The tag from the last computation, if any.
    pub fn tag(&self) -> Option<Tag> {
        self.inner.cached.borrow().as_ref().map(|cached| cached.tag.clone())
    }
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Cache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("state", &self.state())
            .field("is_const", &self.is_const())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
