//! Ember Core
//!
//! This crate provides the rendering core of the Ember template engine.
//! It implements:
//!
//! - Reactive primitives (tags, the revision clock, tracking, caches)
//! - A template parser producing a Handlebars-flavoured HTML AST
//! - A compiler from that AST to a compact, serializable wire format
//! - A VM that renders wire templates and revalidates them incrementally
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Tags, the [`Runtime`] clock, trackers, references
//! - `syntax`: Template source to AST
//! - `compiler`: AST to [`WireTemplate`], precompiled JSON with content ids
//! - `vm`: Rendering, updating opcodes, helper/modifier/component managers
//! - `dom`: The [`TreeBuilder`] interface and the in-memory [`SimpleDom`]
//!
//! # Example
//!
//! ```rust
//! use ember_core::{CompileOptions, Environment, SimpleDom, Template, TrackedObject, Value};
//!
//! let env = Environment::new();
//! let template = Template::compile("<div>{{title}}</div>", &CompileOptions::default()).unwrap();
//!
//! let context: TrackedObject = [("title", Value::from("Hello"))].into_iter().collect();
//! let mut dom = SimpleDom::new();
//! let root = dom.root();
//! let mut result = template.render(&env, &mut dom, root, context.clone()).unwrap();
//! assert_eq!(dom.to_html(), "<div>Hello</div>");
//!
//! context.set(env.runtime(), "title", "World").unwrap();
//! result.revalidate(&mut dom).unwrap();
//! assert_eq!(dom.to_html(), "<div>World</div>");
//! ```

pub mod compiler;
pub mod dom;
pub mod error;
pub mod reactive;
pub mod syntax;
pub mod value;
pub mod vm;

pub use compiler::{compile, precompile, CompileOptions, TemplateMeta, WireTemplate};
pub use dom::{Namespace, NodeId, SimpleDom, TreeBuilder};
pub use error::{CompileError, Error, ManagerError, RenderError, Result, SyntaxError, ValidatorError};
pub use reactive::{Cache, Reference, Runtime, RuntimeConfig, Tag, TrackedCell};
pub use syntax::{parse, ParseOptions};
pub use value::{TrackedObject, Value};
pub use vm::{Environment, RenderResult, RenderState, Template};
