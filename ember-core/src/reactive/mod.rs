//! Reactive Primitives
//!
//! This module implements the pull-based invalidation core: tags, the
//! revision clock, tracking frames, and the cached values built on them.
//!
//! # Concepts
//!
//! ## Tags and Revisions
//!
//! Every piece of mutable state is guarded by a [`Tag`]. The [`Runtime`]
//! keeps a monotonically increasing clock; writing state dirties its tag,
//! stamping it with a fresh revision. Consumers snapshot revisions and
//! validate them later. Nothing is pushed: invalidation is discovered by
//! asking.
//!
//! ## Tracking
//!
//! [`Runtime::track`] runs a computation and collects every tag it
//! consumed into one combined tag. That is how a cache or a template
//! opcode learns what it depends on without declaring it.
//!
//! ## Derived Values
//!
//! [`Cache`] memoizes a tracked computation over arbitrary Rust values.
//! [`Reference`] is the template-facing variant over [`crate::Value`], with
//! property paths, write-through and const detection.

mod cache;
mod context;
mod reference;
mod runtime;
mod tag;
mod tracked;
mod tracker;

pub use cache::{Cache, CacheState};
pub use context::TrackFrame;
pub use reference::Reference;
pub use runtime::{RevalidationHost, Runtime, RuntimeConfig};
pub use tag::{combine, CyclePolicy, MonomorphicTag, Revision, Tag, TagKind, CONSTANT, INITIAL, VOLATILE};
pub use tracked::{TagMeta, TrackedCell};
pub use tracker::Tracker;
