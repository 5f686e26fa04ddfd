//! Tags
//!
//! A tag is a handle whose *revision* grows monotonically as the state it
//! stands for changes. Consumers remember a snapshot of a tag's revision and
//! later ask whether the tag still has that revision.
//!
//! # How Tags Work
//!
//! 1. A dirtyable tag stores its own revision. Dirtying it sets the revision
//!    to a fresh value of the runtime clock.
//!
//! 2. A combinator tag has no state of its own. Its revision is the maximum
//!    revision of its children.
//!
//! 3. An updatable tag is a dirtyable tag that may additionally point at a
//!    single subtag. Its revision is the maximum of its own revision and the
//!    subtag's.
//!
//! 4. Computed revisions are memoized per clock value: a tag asked twice at
//!    the same clock answers from cache.
//!
//! The three singleton tags ([`Tag::Constant`], [`Tag::Volatile`] and
//! [`Tag::Current`]) carry no state at all.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::warn;

/// A point on the runtime clock.
pub type Revision = u64;

/// Revision of state that never changes.
pub const CONSTANT: Revision = 0;

/// First revision handed out by a fresh runtime.
pub const INITIAL: Revision = 1;

/// Revision of state that must always be treated as changed.
pub const VOLATILE: Revision = Revision::MAX;

/// What kind of tag this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Dirtyable,
    Updatable,
    Combinator,
    Constant,
    Volatile,
    Current,
}

/// Whether an updatable tag may take part in a dependency cycle.
///
/// Chosen when the tag is created. With [`CyclePolicy::Forbid`] an update
/// that would make the tag reachable from itself fails with
/// [`crate::ValidatorError::CycleDetected`]. With [`CyclePolicy::Allow`] the
/// update goes through and a re-entrant computation advances the clock,
/// which leaves everything downstream permanently invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePolicy {
    #[default]
    Forbid,
    Allow,
}

/// A revision-bearing handle. Cloning shares identity.
///
/// Equality and hashing are by identity, so two tags that happen to have
/// the same revision are still distinct.
#[derive(Clone)]
pub enum Tag {
    /// Revision is always [`CONSTANT`].
    Constant,
    /// Revision is always [`VOLATILE`]; never validates.
    Volatile,
    /// Revision is whatever the clock currently reads.
    Current,
    Cell(Rc<MonomorphicTag>),
}

/// Shared state behind dirtyable, updatable and combinator tags.
pub struct MonomorphicTag {
    kind: TagKind,
    cycles: CyclePolicy,
    revision: Cell<Revision>,
    last_checked: Cell<Revision>,
    last_value: Cell<Revision>,
    is_updating: Cell<bool>,
    subtag: RefCell<Option<Tag>>,
    subtag_buffer_cache: Cell<Option<Revision>>,
    children: SmallVec<[Tag; 4]>,
}

impl MonomorphicTag {
    fn new(kind: TagKind, revision: Revision, cycles: CyclePolicy, children: SmallVec<[Tag; 4]>) -> Self {
        Self {
            kind,
            cycles,
            revision: Cell::new(revision),
            // CONSTANT never equals the clock, so the first read computes.
            last_checked: Cell::new(CONSTANT),
            last_value: Cell::new(revision),
            is_updating: Cell::new(false),
            subtag: RefCell::new(None),
            subtag_buffer_cache: Cell::new(None),
            children,
        }
    }

    fn compute(&self, clock: &Cell<Revision>) -> Revision {
        if self.is_updating.get() {
            // Only reachable through a cycle the tag explicitly allowed.
            let next = clock.get().saturating_add(1);
            clock.set(next);
            self.last_checked.set(next);
            warn!(revision = next, "re-entered tag computation through an allowed cycle");
        } else if self.last_checked.get() != clock.get() {
            self.is_updating.set(true);
            self.last_checked.set(clock.get());

            let mut revision = self.revision.get();
            for child in &self.children {
                revision = revision.max(child.compute(clock));
            }

            let subtag = self.subtag.borrow().clone();
            if let Some(subtag) = subtag {
                let value = subtag.compute(clock);
                if self.subtag_buffer_cache.get() == Some(value) {
                    revision = revision.max(self.last_value.get());
                } else {
                    self.subtag_buffer_cache.set(None);
                    revision = revision.max(value);
                }
            }

            self.last_value.set(revision);
            self.is_updating.set(false);
        }

        self.last_value.get()
    }
}

impl Tag {
    pub(crate) fn dirtyable(revision: Revision) -> Self {
        Tag::Cell(Rc::new(MonomorphicTag::new(
            TagKind::Dirtyable,
            revision,
            CyclePolicy::Forbid,
            SmallVec::new(),
        )))
    }

    pub(crate) fn updatable(revision: Revision, cycles: CyclePolicy) -> Self {
        Tag::Cell(Rc::new(MonomorphicTag::new(
            TagKind::Updatable,
            revision,
            cycles,
            SmallVec::new(),
        )))
    }

    /// The kind of this tag.
    pub fn kind(&self) -> TagKind {
        match self {
            Tag::Constant => TagKind::Constant,
            Tag::Volatile => TagKind::Volatile,
            Tag::Current => TagKind::Current,
            Tag::Cell(inner) => inner.kind,
        }
    }

    /// True for the constant singleton.
    pub fn is_constant(&self) -> bool {
        matches!(self, Tag::Constant)
    }

    fn identity(&self) -> usize {
        match self {
            Tag::Constant => 0,
            Tag::Volatile => 1,
            Tag::Current => 2,
            Tag::Cell(inner) => Rc::as_ptr(inner) as usize,
        }
    }

    pub(crate) fn compute(&self, clock: &Cell<Revision>) -> Revision {
        match self {
            Tag::Constant => CONSTANT,
            Tag::Volatile => VOLATILE,
            Tag::Current => clock.get(),
            Tag::Cell(inner) => inner.compute(clock),
        }
    }

    pub(crate) fn inner(&self) -> Option<&Rc<MonomorphicTag>> {
        match self {
            Tag::Cell(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether `target` can be reached from this tag through children or
    /// subtags (including this tag itself).
    pub(crate) fn reaches(&self, target: &MonomorphicTag) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![self.clone()];

        while let Some(tag) = stack.pop() {
            let Tag::Cell(inner) = tag else { continue };
            if std::ptr::eq(Rc::as_ptr(&inner), target) {
                return true;
            }
            if !seen.insert(Rc::as_ptr(&inner) as usize) {
                continue;
            }
            stack.extend(inner.children.iter().cloned());
            if let Some(subtag) = inner.subtag.borrow().as_ref() {
                stack.push(subtag.clone());
            };
        }

        false
    }
}

impl MonomorphicTag {
    pub(crate) fn kind(&self) -> TagKind {
        self.kind
    }

    pub(crate) fn cycles(&self) -> CyclePolicy {
        self.cycles
    }

    pub(crate) fn set_revision(&self, revision: Revision) {
        self.revision.set(revision);
    }

    pub(crate) fn set_subtag(&self, subtag: Option<Tag>, buffer: Option<Revision>) {
        *self.subtag.borrow_mut() = subtag;
        self.subtag_buffer_cache.set(buffer);
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Constant => f.write_str("Tag::Constant"),
            Tag::Volatile => f.write_str("Tag::Volatile"),
            Tag::Current => f.write_str("Tag::Current"),
            Tag::Cell(inner) => f
                .debug_struct("Tag")
                .field("kind", &inner.kind)
                .field("revision", &inner.revision.get())
                .field("children", &inner.children.len())
                .finish(),
        }
    }
}

/// Combine tags into one whose revision is the maximum of theirs.
///
/// An empty input yields [`Tag::Constant`]; a single tag is returned as is.
pub fn combine<I>(tags: I) -> Tag
where
    I: IntoIterator<Item = Tag>,
{
    let mut children: SmallVec<[Tag; 4]> = tags.into_iter().collect();
    match children.len() {
        0 => Tag::Constant,
        1 => children.pop().unwrap_or(Tag::Constant),
        _ => Tag::Cell(Rc::new(MonomorphicTag::new(
            TagKind::Combinator,
            CONSTANT,
            CyclePolicy::Forbid,
            children,
        ))),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_tags_have_fixed_revisions() {
        let clock = Cell::new(7);
        assert_eq!(Tag::Constant.compute(&clock), CONSTANT);
        assert_eq!(Tag::Volatile.compute(&clock), VOLATILE);
        assert_eq!(Tag::Current.compute(&clock), 7);
    }

    #[test]
    fn combinator_takes_max_of_children() {
        let clock = Cell::new(10);
        let a = Tag::dirtyable(3);
        let b = Tag::dirtyable(8);
        let combined = combine([a, b]);

        assert_eq!(combined.kind(), TagKind::Combinator);
        assert_eq!(combined.compute(&clock), 8);
    }

    #[test]
    fn combinator_memoizes_per_clock_value() {
        let clock = Cell::new(10);
        let a = Tag::dirtyable(3);
        let combined = combine([a.clone(), Tag::dirtyable(1)]);
        assert_eq!(combined.compute(&clock), 3);

        // Same clock: cached answer even though the child moved.
        a.inner().unwrap().set_revision(11);
        assert_eq!(combined.compute(&clock), 3);

        clock.set(11);
        assert_eq!(combined.compute(&clock), 11);
    }

    #[test]
    fn combine_of_one_returns_the_tag() {
        let a = Tag::dirtyable(1);
        assert_eq!(combine([a.clone()]), a);
        assert_eq!(combine(Vec::new()), Tag::Constant);
    }

    #[test]
    fn tags_compare_by_identity() {
        let a = Tag::dirtyable(1);
        let b = Tag::dirtyable(1);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(Tag::Constant, Tag::Constant);
    }

    #[test]
    fn reaches_follows_children_and_subtags() {
        let target = Tag::updatable(1, CyclePolicy::Forbid);
        let middle = Tag::updatable(1, CyclePolicy::Forbid);
        middle
            .inner()
            .unwrap()
            .set_subtag(Some(combine([target.clone(), Tag::dirtyable(1)])), None);

        assert!(middle.reaches(target.inner().unwrap()));
        assert!(!target.reaches(middle.inner().unwrap()));
    }
}
