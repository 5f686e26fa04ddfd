//! Property Tests for the Validator
//!
//! Random sequences of writes against a handful of tags, checking the
//! laws every consumer relies on: the clock only moves forward, a combined
//! tag reports the newest of its members, and a snapshot is valid exactly
//! when nothing behind it was written since.

use proptest::prelude::*;

use ember_core::reactive::{combine, Cache, Revision, Runtime, Tag, TrackedCell};

const TAGS: usize = 5;

fn writes() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..TAGS, 0..40)
}

proptest! {
    /// Test that dirtying always moves a tag, and the clock, forward.
    #[test]
    fn revisions_are_monotonic(writes in writes()) {
        let rt = Runtime::new();
        let tags: Vec<Tag> = (0..TAGS).map(|_| rt.create_tag()).collect();
        let mut clock = rt.current_revision();

        for index in writes {
            let before = rt.value_for_tag(&tags[index]);
            rt.dirty_tag(&tags[index]).unwrap();
            let after = rt.value_for_tag(&tags[index]);
            prop_assert!(after > before);
            prop_assert!(rt.current_revision() > clock);
            prop_assert_eq!(after, rt.current_revision());
            clock = rt.current_revision();
        }
    }

    /// Test that a combined tag is the maximum of its members.
    #[test]
    fn combinator_is_max_of_members(writes in writes(), members in prop::collection::vec(0..TAGS, 1..TAGS)) {
        let rt = Runtime::new();
        let tags: Vec<Tag> = (0..TAGS).map(|_| rt.create_tag()).collect();
        let combined = combine(members.iter().map(|&i| tags[i].clone()));

        for index in writes {
            rt.dirty_tag(&tags[index]).unwrap();
            let expected: Revision = members.iter().map(|&i| rt.value_for_tag(&tags[i])).max().unwrap();
            prop_assert_eq!(rt.value_for_tag(&combined), expected);
        }
    }

    /// Test that a snapshot of a tracked computation stays valid until one
    /// of the tags it read is written.
    #[test]
    fn snapshots_invalidate_only_on_dependency_writes(
        read in prop::collection::vec(0..TAGS, 1..TAGS),
        writes in writes(),
    ) {
        let rt = Runtime::new();
        let tags: Vec<Tag> = (0..TAGS).map(|_| rt.create_tag()).collect();
        let ((), tracked) = rt.track(|| {
            for &i in &read {
                rt.consume_tag(&tags[i]);
            }
        });
        let snapshot = rt.value_for_tag(&tracked);

        let mut touched = false;
        for index in writes {
            rt.dirty_tag(&tags[index]).unwrap();
            touched |= read.contains(&index);
            prop_assert_eq!(rt.validate_tag(&tracked, snapshot), !touched);
        }
    }

    /// Test that pointing an updatable tag at an older subtag keeps earlier
    /// snapshots valid until the subtag itself is written.
    #[test]
    fn update_buffers_older_subtags(bumps in 0usize..10) {
        let rt = Runtime::new();
        let sub = rt.create_tag();
        let parent = rt.create_updatable_tag();
        let unrelated = rt.create_tag();

        rt.dirty_tag(&parent).unwrap();
        let snapshot = rt.value_for_tag(&parent);
        rt.update_tag(&parent, &sub).unwrap();

        for _ in 0..bumps {
            rt.dirty_tag(&unrelated).unwrap();
            prop_assert!(rt.validate_tag(&parent, snapshot));
            prop_assert_eq!(rt.value_for_tag(&parent), snapshot);
        }

        rt.dirty_tag(&sub).unwrap();
        prop_assert!(!rt.validate_tag(&parent, snapshot));
        prop_assert_eq!(rt.value_for_tag(&parent), rt.current_revision());
    }

    /// Test that a cache recomputes exactly when an input it read changed.
    #[test]
    fn cache_recomputes_on_change_only(writes in prop::collection::vec(prop::option::of(0i64..3), 0..30)) {
        let rt = Runtime::new();
        let input = TrackedCell::new(&rt, 0i64);
        let source = input.clone();
        let runs = std::rc::Rc::new(std::cell::Cell::new(0));
        let counter = runs.clone();
        let cache = Cache::new(&rt, move || {
            counter.set(counter.get() + 1);
            source.get() * 2
        });

        prop_assert_eq!(cache.get(), 0);
        let mut expected_runs = 1;
        for write in writes {
            if let Some(value) = write {
                input.set(value).unwrap();
                expected_runs += 1;
            }
            prop_assert_eq!(cache.get(), input.get_untracked() * 2);
            prop_assert_eq!(runs.get(), expected_runs);
        }
    }
}

/// Test that constant tags never invalidate and volatile tags always do.
#[test]
fn constant_and_volatile_tags() {
    let rt = Runtime::new();
    let snapshot = rt.current_revision();
    let other = rt.create_tag();
    rt.dirty_tag(&other).unwrap();

    assert!(rt.validate_tag(&Tag::Constant, snapshot));
    assert!(!rt.validate_tag(&Tag::Volatile, rt.current_revision()));
    assert!(rt.dirty_tag(&Tag::Constant).is_err());
}
