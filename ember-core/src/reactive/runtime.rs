//! Reactive Runtime
//!
//! The runtime owns the revision clock and the tracking-frame stack. Every
//! tag operation goes through it.
//!
//! # How It Works
//!
//! 1. `create_tag` hands out a dirtyable tag whose revision is the current
//!    clock value.
//!
//! 2. `dirty_tag` advances the clock and stamps the tag with the new value,
//!    then asks the host (if any) to schedule a revalidation. Requests are
//!    coalesced until the host calls [`Runtime::begin_revalidation`].
//!
//! 3. `track` runs a closure inside a fresh frame and returns the combined
//!    tag of everything consumed. Consumers store that tag together with
//!    `value_for_tag(tag)` and later call `validate_tag` to learn whether
//!    anything they read has changed.
//!
//! # Single-Threaded
//!
//! A runtime is an `Rc` handle: cloning it shares the clock. Tags, cells and
//! references built on it are `!Send`. Hosts that render on several threads
//! create one runtime per thread.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::context::TrackFrame;
use super::tag::{CyclePolicy, Revision, Tag, TagKind, INITIAL, VOLATILE};
use super::tracker::Tracker;
use crate::error::ValidatorError;

/// Knobs for a [`Runtime`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Reject `dirty_tag` on a tag that an active tracking frame has already
    /// consumed (a write after a read in the same computation).
    pub assert_tag_not_consumed: bool,
}

/// Receives "something changed" notifications.
///
/// Called at most once between two [`Runtime::begin_revalidation`] calls,
/// however many tags are dirtied in between.
pub trait RevalidationHost {
    fn schedule_revalidate(&self);
}

struct RuntimeInner {
    clock: Cell<Revision>,
    config: RuntimeConfig,
    // `None` entries are untracked frames.
    frames: RefCell<Vec<Option<Tracker>>>,
    host: RefCell<Option<Rc<dyn RevalidationHost>>>,
    scheduled: Cell<bool>,
}

/// Shared handle to a revision clock and its tracking frames.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                clock: Cell::new(INITIAL),
                config,
                frames: RefCell::new(Vec::new()),
                host: RefCell::new(None),
                scheduled: Cell::new(false),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Install the host notified when tags are dirtied.
    pub fn set_host(&self, host: Rc<dyn RevalidationHost>) {
        *self.inner.host.borrow_mut() = Some(host);
    }

    /// Whether two handles share one clock.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The current clock value.
    pub fn current_revision(&self) -> Revision {
        self.inner.clock.get()
    }

    fn bump(&self) -> Revision {
        let next = self.inner.clock.get() + 1;
        self.inner.clock.set(next);
        next
    }

    // ------------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------------

    /// A fresh dirtyable tag stamped with the current revision.
    pub fn create_tag(&self) -> Tag {
        Tag::dirtyable(self.current_revision())
    }

    /// A fresh updatable tag that rejects cycles.
    pub fn create_updatable_tag(&self) -> Tag {
        self.create_updatable_tag_with(CyclePolicy::Forbid)
    }

    pub fn create_updatable_tag_with(&self, cycles: CyclePolicy) -> Tag {
        Tag::updatable(self.current_revision(), cycles)
    }

    /// Mark a tag as changed.
    ///
    /// Fails for tags that are not dirtyable or updatable, and (when
    /// [`RuntimeConfig::assert_tag_not_consumed`] is set) for tags already
    /// consumed by an active tracking frame.
    pub fn dirty_tag(&self, tag: &Tag) -> Result<(), ValidatorError> {
        let inner = match tag.inner() {
            Some(inner) if matches!(inner.kind(), TagKind::Dirtyable | TagKind::Updatable) => inner,
            _ => {
                return Err(ValidatorError::InvalidOperation(format!(
                    "cannot dirty a {:?} tag",
                    tag.kind()
                )))
            }
        };

        if self.inner.config.assert_tag_not_consumed && self.is_consumed(tag) {
            return Err(ValidatorError::InvalidOperation(
                "tag was dirtied after being consumed in the same computation".to_string(),
            ));
        }

        let revision = self.bump();
        inner.set_revision(revision);
        trace!(revision, "dirtied tag");
        self.schedule_revalidate();
        Ok(())
    }

    /// Point an updatable tag at `subtag`.
    ///
    /// Updating to [`Tag::Constant`] clears the subtag. The subtag's revision
    /// at the moment of the update is buffered: the parent only reports
    /// the subtag's revision once the subtag moves past that value.
    pub fn update_tag(&self, tag: &Tag, subtag: &Tag) -> Result<(), ValidatorError> {
        let inner = match tag.inner() {
            Some(inner) if inner.kind() == TagKind::Updatable => inner,
            _ => {
                return Err(ValidatorError::InvalidOperation(format!(
                    "cannot update a {:?} tag",
                    tag.kind()
                )))
            }
        };

        if subtag.is_constant() {
            inner.set_subtag(None, None);
            return Ok(());
        }

        if inner.cycles() == CyclePolicy::Forbid && subtag.reaches(inner) {
            return Err(ValidatorError::CycleDetected);
        }

        let buffered = subtag.compute(&self.inner.clock);
        inner.set_subtag(Some(subtag.clone()), Some(buffered));
        Ok(())
    }

    /// The tag's current revision.
    pub fn value_for_tag(&self, tag: &Tag) -> Revision {
        tag.compute(&self.inner.clock)
    }

    /// Whether nothing behind `tag` has changed since `snapshot` was taken.
    /// Always false for tags that resolve to [`VOLATILE`].
    pub fn validate_tag(&self, tag: &Tag, snapshot: Revision) -> bool {
        let value = self.value_for_tag(tag);
        value != VOLATILE && snapshot >= value
    }

    // ------------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------------

    /// Record that the running computation read state guarded by `tag`.
    /// A no-op outside a tracking frame.
    pub fn consume_tag(&self, tag: &Tag) {
        if let Some(Some(tracker)) = self.inner.frames.borrow_mut().last_mut() {
            tracker.add(tag.clone());
        }
    }

    /// Whether a tracked frame is active (untracked frames do not count).
    pub fn is_tracking(&self) -> bool {
        matches!(self.inner.frames.borrow().last(), Some(Some(_)))
    }

    /// Run `f` in a fresh frame; returns its result and the combined tag of
    /// everything it consumed.
    pub fn track<T>(&self, f: impl FnOnce() -> T) -> (T, Tag) {
        let frame = TrackFrame::enter(self, true);
        let value = f();
        (value, frame.finish())
    }

    /// Run `f` without recording any consumption.
    pub fn untrack<T>(&self, f: impl FnOnce() -> T) -> T {
        let _frame = TrackFrame::enter(self, false);
        f()
    }

    /// Enter a tracked frame manually. Finish the returned guard to get the
    /// combined tag.
    pub fn begin_track_frame(&self) -> TrackFrame {
        TrackFrame::enter(self, true)
    }

    pub(crate) fn push_frame(&self, tracking: bool) -> usize {
        let mut frames = self.inner.frames.borrow_mut();
        frames.push(tracking.then(Tracker::new));
        frames.len()
    }

    pub(crate) fn pop_frame(&self, depth: usize) -> Option<Tracker> {
        let mut frames = self.inner.frames.borrow_mut();
        debug_assert_eq!(
            frames.len(),
            depth,
            "tracking frame mismatch: expected depth {}, got {}",
            depth,
            frames.len()
        );
        frames.pop().flatten()
    }

    fn is_consumed(&self, tag: &Tag) -> bool {
        self.inner
            .frames
            .borrow()
            .iter()
            .flatten()
            .any(|tracker| tracker.contains(tag))
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    fn schedule_revalidate(&self) {
        if self.inner.scheduled.replace(true) {
            return;
        }
        let host = self.inner.host.borrow().clone();
        if let Some(host) = host {
            host.schedule_revalidate();
        }
    }

    /// Whether a dirty has happened since the last revalidation began.
    pub fn is_revalidation_scheduled(&self) -> bool {
        self.inner.scheduled.get()
    }

    /// Re-arm scheduling. Returns whether a revalidation was pending.
    pub fn begin_revalidation(&self) -> bool {
        self.inner.scheduled.replace(false)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("revision", &self.current_revision())
            .field("frames", &self.inner.frames.borrow().len())
            .field("scheduled", &self.inner.scheduled.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::tag::{combine, CONSTANT};

    #[derive(Default)]
    struct CountingHost {
        calls: Cell<usize>,
    }

    impl RevalidationHost for CountingHost {
        fn schedule_revalidate(&self) {
            self.calls.set(self.calls.get() + 1);
        }
    }

    #[test]
    fn new_tag_validates_against_its_own_snapshot() {
        let rt = Runtime::new();
        let tag = rt.create_tag();
        let snapshot = rt.value_for_tag(&tag);

        assert!(rt.validate_tag(&tag, snapshot));
    }

    #[test]
    fn dirty_invalidates_snapshot() {
        let rt = Runtime::new();
        let tag = rt.create_tag();
        let snapshot = rt.value_for_tag(&tag);

        rt.dirty_tag(&tag).unwrap();

        assert!(!rt.validate_tag(&tag, snapshot));
        assert!(rt.value_for_tag(&tag) > snapshot);
    }

    #[test]
    fn constant_and_volatile_tags() {
        let rt = Runtime::new();
        assert_eq!(rt.value_for_tag(&Tag::Constant), CONSTANT);
        assert!(rt.validate_tag(&Tag::Constant, CONSTANT));

        let snapshot = rt.value_for_tag(&Tag::Volatile);
        assert!(!rt.validate_tag(&Tag::Volatile, snapshot));
    }

    #[test]
    fn current_tag_tracks_the_clock() {
        let rt = Runtime::new();
        let snapshot = rt.value_for_tag(&Tag::Current);
        assert!(rt.validate_tag(&Tag::Current, snapshot));

        rt.dirty_tag(&rt.create_tag()).unwrap();
        assert!(!rt.validate_tag(&Tag::Current, snapshot));
    }

    #[test]
    fn dirtying_a_combinator_is_rejected() {
        let rt = Runtime::new();
        let combined = combine([rt.create_tag(), rt.create_tag()]);

        let err = rt.dirty_tag(&combined).unwrap_err();
        assert!(matches!(err, ValidatorError::InvalidOperation(_)));
        assert!(rt.dirty_tag(&Tag::Constant).is_err());
    }

    #[test]
    fn updating_a_dirtyable_tag_is_rejected() {
        let rt = Runtime::new();
        let tag = rt.create_tag();
        let err = rt.update_tag(&tag, &rt.create_tag()).unwrap_err();
        assert!(matches!(err, ValidatorError::InvalidOperation(_)));
    }

    #[test]
    fn updatable_tag_follows_subtag_after_buffer() {
        let rt = Runtime::new();
        let parent = rt.create_updatable_tag();
        let child = rt.create_tag();

        rt.update_tag(&parent, &child).unwrap();
        let snapshot = rt.value_for_tag(&parent);

        rt.dirty_tag(&child).unwrap();
        assert!(!rt.validate_tag(&parent, snapshot));
    }

    #[test]
    fn older_subtag_does_not_lower_or_invalidate_parent() {
        let rt = Runtime::new();
        let sub = rt.create_tag();
        let parent = rt.create_updatable_tag();
        let unrelated = rt.create_tag();

        rt.dirty_tag(&parent).unwrap();
        let snapshot = rt.value_for_tag(&parent);

        rt.update_tag(&parent, &sub).unwrap();
        assert!(rt.validate_tag(&parent, snapshot));
        assert_eq!(rt.value_for_tag(&parent), snapshot);

        rt.dirty_tag(&unrelated).unwrap();
        assert!(rt.validate_tag(&parent, snapshot));

        rt.dirty_tag(&sub).unwrap();
        assert!(!rt.validate_tag(&parent, snapshot));
    }

    #[test]
    fn update_to_constant_clears_subtag() {
        let rt = Runtime::new();
        let parent = rt.create_updatable_tag();
        let child = rt.create_tag();
        rt.update_tag(&parent, &child).unwrap();
        rt.update_tag(&parent, &Tag::Constant).unwrap();

        let snapshot = rt.value_for_tag(&parent);
        rt.dirty_tag(&child).unwrap();
        assert!(rt.validate_tag(&parent, snapshot));
    }

    #[test]
    fn forbidden_cycle_is_detected() {
        let rt = Runtime::new();
        let a = rt.create_updatable_tag();
        let b = rt.create_updatable_tag();

        rt.update_tag(&a, &b).unwrap();
        assert_eq!(rt.update_tag(&b, &a), Err(ValidatorError::CycleDetected));
        assert_eq!(rt.update_tag(&a, &a), Err(ValidatorError::CycleDetected));
    }

    #[test]
    fn allowed_cycle_bumps_the_clock() {
        let rt = Runtime::new();
        let a = rt.create_updatable_tag_with(CyclePolicy::Allow);
        let b = rt.create_updatable_tag_with(CyclePolicy::Allow);

        rt.update_tag(&a, &b).unwrap();
        rt.update_tag(&b, &a).unwrap();

        rt.dirty_tag(&a).unwrap();
        let before = rt.current_revision();
        rt.value_for_tag(&a);
        assert!(rt.current_revision() > before);
    }

    #[test]
    fn track_combines_consumed_tags() {
        let rt = Runtime::new();
        let a = rt.create_tag();
        let b = rt.create_tag();

        let (value, tag) = rt.track(|| {
            rt.consume_tag(&a);
            rt.consume_tag(&b);
            42
        });
        assert_eq!(value, 42);

        let snapshot = rt.value_for_tag(&tag);
        rt.dirty_tag(&b).unwrap();
        assert!(!rt.validate_tag(&tag, snapshot));
    }

    #[test]
    fn nothing_consumed_tracks_as_constant() {
        let rt = Runtime::new();
        let ((), tag) = rt.track(|| ());
        assert_eq!(tag, Tag::Constant);
    }

    #[test]
    fn untrack_hides_reads() {
        let rt = Runtime::new();
        let a = rt.create_tag();
        let ((), tag) = rt.track(|| rt.untrack(|| rt.consume_tag(&a)));
        assert_eq!(tag, Tag::Constant);
    }

    #[test]
    fn host_is_scheduled_once_until_rearmed() {
        let rt = Runtime::new();
        let host = Rc::new(CountingHost::default());
        rt.set_host(host.clone());
        let tag = rt.create_tag();

        rt.dirty_tag(&tag).unwrap();
        rt.dirty_tag(&tag).unwrap();
        assert_eq!(host.calls.get(), 1);
        assert!(rt.is_revalidation_scheduled());

        assert!(rt.begin_revalidation());
        rt.dirty_tag(&tag).unwrap();
        assert_eq!(host.calls.get(), 2);
    }

    #[test]
    fn dirty_after_consume_is_rejected_when_asserting() {
        let rt = Runtime::with_config(RuntimeConfig {
            assert_tag_not_consumed: true,
        });
        let tag = rt.create_tag();

        let (result, _) = rt.track(|| {
            rt.consume_tag(&tag);
            rt.dirty_tag(&tag)
        });
        assert!(matches!(result, Err(ValidatorError::InvalidOperation(_))));

        // Outside the frame the write is fine.
        assert!(rt.dirty_tag(&tag).is_ok());
    }
}
