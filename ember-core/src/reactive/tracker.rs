//! Tracker
//!
//! A tracker collects the tags consumed during one tracked computation and
//! folds them into a single tag when the computation finishes.

use indexmap::IndexSet;

use super::tag::{combine, Tag};

/// Insertion-ordered set of consumed tags.
#[derive(Debug, Default)]
pub struct Tracker {
    tags: IndexSet<Tag>,
    last: Option<Tag>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a consumed tag. Constant tags carry no information and are
    /// dropped.
    pub fn add(&mut self, tag: Tag) {
        if tag.is_constant() {
            return;
        }
        self.tags.insert(tag.clone());
        self.last = Some(tag);
    }

    /// Whether `tag` has been consumed into this tracker.
    pub fn contains(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Fold everything consumed into one tag.
    ///
    /// Nothing consumed gives [`Tag::Constant`]; exactly one tag is returned
    /// unchanged; anything more becomes a combinator.
    pub fn combine(self) -> Tag {
        match self.tags.len() {
            0 => Tag::Constant,
            1 => self.last.unwrap_or(Tag::Constant),
            _ => combine(self.tags),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
