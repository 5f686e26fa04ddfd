//! Rendering VM
//!
//! Executes compiled templates against a [`TreeBuilder`](crate::dom::TreeBuilder)
//! and keeps the output current.
//!
//! # Rendering
//!
//! [`Template::render`] runs the wire program once in append mode: text,
//! elements and attributes are written through the tree builder, every
//! expression becomes a [`Reference`](crate::reactive::Reference), and each
//! piece of output that could change leaves an updating opcode behind.
//!
//! # Revalidation
//!
//! [`RenderResult::revalidate`] walks those opcodes. Each compares the
//! revision of its tag with the one it last saw; unchanged opcodes skip
//! straight to their children, changed ones re-read their reference and
//! write only what differs. Conditionals re-render the other branch in
//! place, `{{#each}}` diffs by key, components and modifiers get their
//! update hooks.
//!
//! # Extension
//!
//! Helpers, modifiers and components are registered on an
//! [`Environment`] and driven through managers (see [`manager`]).

mod arguments;
mod bounds;
mod builder;
mod builtins;
mod definitions;
mod environment;
mod interpreter;
mod list;
pub mod manager;
mod opcodes;
mod render;
mod scope;

pub use arguments::Arguments;
pub use definitions::{
    FnComponent, FnComponentManager, FnHelper, FnHelperManager, FnModifier, FnModifierManager, TemplateOnly,
    TemplateOnlyManager,
};
pub use environment::{Environment, EnvironmentBuilder};
pub use manager::{Capabilities, ComponentManager, HelperManager, Manager, ModifierManager, Owner};
pub use render::{RenderResult, Template};

/// Lifecycle of a [`RenderResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Unrendered,
    Rendering,
    Rendered,
    Updating,
    Destroyed,
}
