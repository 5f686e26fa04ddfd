//! Updating Opcodes
//!
//! The initial render leaves behind a tree of updating opcodes, one per
//! dynamic piece of output. Each remembers the tag and revision it last
//! observed. A revalidation pass walks the tree: an opcode whose snapshot
//! is still valid does nothing, one whose tag moved re-reads its reference
//! and writes to the tree only when the observed output changed.

use std::cell::Cell;
use std::rc::Rc;

use tracing::trace;

use super::arguments::CapturedArgs;
use super::bounds::BlockBounds;
use super::builder::ElementBuilder;
use super::environment::Environment;
use super::interpreter::Interpreter;
use super::list::ListOpcode;
use super::manager::{ResolvedComponent, ResolvedModifier};
use super::scope::Scope;
use crate::compiler::Slot;
use crate::dom::{Namespace, NodeId, TreeBuilder};
use crate::error::RenderError;
use crate::reactive::{Reference, Revision, Runtime, Tag};
use crate::value::Value;

/// A tag and the revision it had when last observed.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    tag: Tag,
    revision: Revision,
}

impl Snapshot {
    pub fn capture(runtime: &Runtime, tag: Tag) -> Self {
        let revision = runtime.value_for_tag(&tag);
        Self { tag, revision }
    }

    pub fn is_valid(&self, runtime: &Runtime) -> bool {
        runtime.validate_tag(&self.tag, self.revision)
    }
}

/// Read a reference in its own tracking frame.
pub(crate) fn read(runtime: &Runtime, reference: &Reference) -> Result<(Value, Snapshot), RenderError> {
    let (value, tag) = runtime.track(|| reference.value());
    Ok((value?, Snapshot::capture(runtime, tag)))
}

/// A block to render later: a program slot and the scope it closes over.
#[derive(Debug, Clone)]
pub(crate) struct Branch {
    pub block: Slot,
    pub scope: Scope,
}

impl Branch {
    /// Close over `scope`, binding the block's parameters to `params`
    /// (null where missing).
    pub fn new(scope: &Scope, block: Slot, params: Vec<Reference>) -> Result<Self, RenderError> {
        let mut scope = scope.clone();
        let parameters = scope.block(block)?.parameters.clone();
        scope.bind(&parameters, params);
        Ok(Self { block, scope })
    }
}

// ----------------------------------------------------------------------------
// Opcode tree
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum UpdatingOpcode {
    Content(ContentOpcode),
    Attribute(AttributeOpcode),
    Conditional(ConditionalOpcode),
    List(ListOpcode),
    Component(ComponentOpcode),
    Modifier(ModifierOpcode),
}

impl UpdatingOpcode {
    pub fn evaluate(&mut self, env: &Environment, dom: &mut dyn TreeBuilder) -> Result<(), RenderError> {
        match self {
            UpdatingOpcode::Content(op) => op.evaluate(env.runtime(), dom),
            UpdatingOpcode::Attribute(op) => op.evaluate(env.runtime(), dom),
            UpdatingOpcode::Conditional(op) => op.evaluate(env, dom),
            UpdatingOpcode::List(op) => op.evaluate(env, dom),
            UpdatingOpcode::Component(op) => op.evaluate(env, dom),
            UpdatingOpcode::Modifier(op) => op.evaluate(env.runtime(), dom),
        }
    }

    /// Run destroy hooks. Never removes nodes.
    pub fn destroy(&mut self, dom: &mut dyn TreeBuilder) {
        match self {
            UpdatingOpcode::Content(_) | UpdatingOpcode::Attribute(_) => {}
            UpdatingOpcode::Conditional(op) => op.child.destroy(dom),
            UpdatingOpcode::List(op) => op.destroy(dom),
            UpdatingOpcode::Component(op) => op.destroy(dom),
            UpdatingOpcode::Modifier(op) => op.destroy(dom),
        }
    }
}

/// A re-renderable region: its bounds and the opcodes rendered into it.
#[derive(Debug)]
pub(crate) struct ChildBlock {
    bounds: Rc<BlockBounds>,
    children: Vec<UpdatingOpcode>,
    destroyed: Rc<Cell<bool>>,
}

impl ChildBlock {
    pub fn new(bounds: Rc<BlockBounds>, children: Vec<UpdatingOpcode>) -> Self {
        Self {
            bounds,
            children,
            destroyed: Rc::new(Cell::new(false)),
        }
    }

    pub fn bounds(&self) -> &Rc<BlockBounds> {
        &self.bounds
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub fn evaluate(&mut self, env: &Environment, dom: &mut dyn TreeBuilder) -> Result<(), RenderError> {
        if self.is_destroyed() {
            return Ok(());
        }
        for child in &mut self.children {
            child.evaluate(env, dom)?;
        }
        Ok(())
    }

    /// Run every destroy hook below this block, once.
    pub fn destroy(&mut self, dom: &mut dyn TreeBuilder) {
        if self.destroyed.replace(true) {
            return;
        }
        for child in &mut self.children {
            child.destroy(dom);
        }
    }

    /// Destroy and remove from the tree. Returns the node that followed
    /// the block.
    pub fn teardown(&mut self, dom: &mut dyn TreeBuilder) -> Option<NodeId> {
        self.destroy(dom);
        self.bounds.clear(dom)
    }

    /// Replace the contents with `branch` rendered in place.
    pub fn rerender(
        &mut self,
        env: &Environment,
        dom: &mut dyn TreeBuilder,
        branch: Option<&Branch>,
        params: Vec<Reference>,
    ) -> Result<(), RenderError> {
        let next = self.teardown(dom);
        let bounds = self.bounds.clone();
        let mut interpreter = Interpreter::at(env, dom, bounds.parent(), next, bounds.namespace());
        *self = interpreter.resume_block(bounds, branch, params)?;
        Ok(())
    }

    /// Move the block's nodes before `reference`.
    pub fn move_before(&self, dom: &mut dyn TreeBuilder, reference: Option<NodeId>) {
        self.bounds.move_before(dom, reference);
    }
}

// ----------------------------------------------------------------------------
// Content
// ----------------------------------------------------------------------------

/// What an append renders: escaped text or trusted markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Content {
    Text(String),
    Html(String),
}

impl Content {
    pub fn of(value: &Value, trusting: bool) -> Self {
        match value {
            Value::Html(html) => Content::Html(html.to_string()),
            value if trusting => Content::Html(value.to_display_string()),
            value => Content::Text(value.to_display_string()),
        }
    }

    /// Insert at the builder's cursor; returns the text node, if any.
    pub fn insert(&self, builder: &mut ElementBuilder, dom: &mut dyn TreeBuilder) -> Option<NodeId> {
        match self {
            Content::Text(text) => {
                let node = dom.create_text(text);
                builder.append(dom, node);
                Some(node)
            }
            Content::Html(html) => {
                builder.append_html(dom, html);
                None
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct ContentOpcode {
    pub reference: Reference,
    pub trusting: bool,
    pub snapshot: Snapshot,
    pub rendered: Content,
    pub bounds: Rc<BlockBounds>,
    pub text: Option<NodeId>,
}

impl ContentOpcode {
    fn evaluate(&mut self, runtime: &Runtime, dom: &mut dyn TreeBuilder) -> Result<(), RenderError> {
        if self.snapshot.is_valid(runtime) {
            return Ok(());
        }
        let (value, snapshot) = read(runtime, &self.reference)?;
        self.snapshot = snapshot;

        let content = Content::of(&value, self.trusting);
        if content == self.rendered {
            return Ok(());
        }
        trace!(?content, "content changed");
        match (self.text, &content) {
            (Some(node), Content::Text(text)) => dom.set_text(node, text),
            _ => {
                let next = self.bounds.clear(dom);
                let mut builder = ElementBuilder::new(self.bounds.parent(), next, self.bounds.namespace());
                builder.resume_block(self.bounds.clone());
                self.text = content.insert(&mut builder, dom);
                builder.pop_block(dom)?;
            }
        }
        self.rendered = content;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Attributes
// ----------------------------------------------------------------------------

/// Attribute text for a value; `None` means the attribute is absent.
pub(crate) fn attribute_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some(String::new()),
        value => Some(value.to_display_string()),
    }
}

#[derive(Debug)]
pub(crate) struct AttributeOpcode {
    pub element: NodeId,
    pub name: String,
    pub namespace: Option<Namespace>,
    pub reference: Reference,
    pub snapshot: Snapshot,
    pub current: Option<String>,
}

impl AttributeOpcode {
    fn evaluate(&mut self, runtime: &Runtime, dom: &mut dyn TreeBuilder) -> Result<(), RenderError> {
        if self.snapshot.is_valid(runtime) {
            return Ok(());
        }
        let (value, snapshot) = read(runtime, &self.reference)?;
        self.snapshot = snapshot;

        let next = attribute_value(&value);
        if next == self.current {
            return Ok(());
        }
        trace!(name = %self.name, value = ?next, "attribute changed");
        match &next {
            Some(text) => dom.set_attribute(self.element, &self.name, text, self.namespace),
            None => dom.remove_attribute(self.element, &self.name, self.namespace),
        }
        self.current = next;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Conditionals: if, unless, with
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct ConditionalOpcode {
    pub condition: Reference,
    pub negate: bool,
    pub snapshot: Snapshot,
    pub truthy: bool,
    pub program: Option<Branch>,
    pub inverse: Option<Branch>,
    pub child: ChildBlock,
}

impl ConditionalOpcode {
    fn evaluate(&mut self, env: &Environment, dom: &mut dyn TreeBuilder) -> Result<(), RenderError> {
        let runtime = env.runtime();
        if !self.snapshot.is_valid(runtime) {
            let (value, snapshot) = read(runtime, &self.condition)?;
            let truthy = value.is_truthy() != self.negate;
            if truthy != self.truthy {
                trace!(truthy, "branch flipped");
                let branch = if truthy { self.program.as_ref() } else { self.inverse.as_ref() };
                self.child.rerender(env, dom, branch, Vec::new())?;
                self.truthy = truthy;
                self.snapshot = snapshot;
                return Ok(());
            }
            self.snapshot = snapshot;
        }
        self.child.evaluate(env, dom)
    }
}

// ----------------------------------------------------------------------------
// Components
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct ComponentOpcode {
    pub name: String,
    pub component: ResolvedComponent,
    pub instance: Value,
    pub args: CapturedArgs,
    pub snapshot: Snapshot,
    pub children: Vec<UpdatingOpcode>,
    pub destroyed: bool,
}

impl ComponentOpcode {
    fn evaluate(&mut self, env: &Environment, dom: &mut dyn TreeBuilder) -> Result<(), RenderError> {
        if self.destroyed {
            return Ok(());
        }
        let runtime = env.runtime();
        if self.component.capabilities.update_hook() && !self.snapshot.is_valid(runtime) {
            let (args, tag) = runtime.track(|| self.args.reify());
            let args = args?;
            self.snapshot = Snapshot::capture(runtime, tag);
            trace!(component = %self.name, "updating component");
            let definition = self.component.definition.as_ref();
            runtime
                .untrack(|| self.component.manager.update(definition, &self.instance, &args))
                .map_err(|message| RenderError::User {
                    name: self.name.clone(),
                    message,
                })?;
        }
        for child in &mut self.children {
            child.evaluate(env, dom)?;
        }
        Ok(())
    }

    fn destroy(&mut self, dom: &mut dyn TreeBuilder) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        for child in &mut self.children {
            child.destroy(dom);
        }
        if self.component.capabilities.destructor() {
            trace!(component = %self.name, "destroying component");
            self.component
                .manager
                .destroy(self.component.definition.as_ref(), &self.instance);
        }
    }
}

// ----------------------------------------------------------------------------
// Modifiers
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct ModifierOpcode {
    pub name: String,
    pub modifier: ResolvedModifier,
    pub element: NodeId,
    pub args: CapturedArgs,
    pub snapshot: Snapshot,
    pub destroyed: bool,
}

impl ModifierOpcode {
    fn evaluate(&mut self, runtime: &Runtime, dom: &mut dyn TreeBuilder) -> Result<(), RenderError> {
        if self.destroyed || !self.modifier.capabilities.update_hook() || self.snapshot.is_valid(runtime) {
            return Ok(());
        }
        let (args, tag) = runtime.track(|| self.args.reify());
        let args = args?;
        self.snapshot = Snapshot::capture(runtime, tag);
        trace!(modifier = %self.name, "updating modifier");
        let definition = self.modifier.definition.as_ref();
        runtime
            .untrack(|| self.modifier.manager.update(definition, dom, self.element, &args))
            .map_err(|message| RenderError::User {
                name: self.name.clone(),
                message,
            })
    }

    fn destroy(&mut self, dom: &mut dyn TreeBuilder) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if self.modifier.capabilities.destructor() {
            self.modifier
                .manager
                .destroy(self.modifier.definition.as_ref(), dom, self.element);
        }
    }
}
