//! Tracking Context
//!
//! A tracking frame records which tags a computation consumes. Frames nest:
//! a cache computed inside another tracked computation gets its own frame,
//! and the cache's combined tag is then consumed into the outer frame.
//!
//! # Implementation
//!
//! The frame stack lives on the [`Runtime`], not in a thread-local, so two
//! runtimes on the same thread never see each other's frames. Entering a
//! frame returns a guard; the frame is popped when the guard is finished or
//! dropped, which keeps the stack balanced even when the computation returns
//! early with an error.

use super::runtime::Runtime;
use super::tag::Tag;

/// Guard for an active tracking frame.
pub struct TrackFrame {
    runtime: Runtime,
    depth: usize,
    finished: bool,
}

impl TrackFrame {
    /// Push a frame. With `tracking == false` the frame swallows every
    /// consumption instead of recording it (used by [`Runtime::untrack`]).
    pub(crate) fn enter(runtime: &Runtime, tracking: bool) -> Self {
        let depth = runtime.push_frame(tracking);
        Self {
            runtime: runtime.clone(),
            depth,
            finished: false,
        }
    }

    /// Pop the frame and combine everything it consumed.
    pub fn finish(mut self) -> Tag {
        self.finished = true;
        self.runtime
            .pop_frame(self.depth)
            .map(|tracker| tracker.combine())
            .unwrap_or(Tag::Constant)
    }
}

impl Drop for TrackFrame {
    fn drop(&mut self) {
        if !self.finished {
            self.runtime.pop_frame(self.depth);
        }
    }
}
