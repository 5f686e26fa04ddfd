//! The element builder: where the next node goes.
//!
//! Keeps a stack of insertion cursors (one per open element), the element
//! currently being constructed (attributes still being set), and a stack of
//! block bounds being recorded.

use std::rc::Rc;

use super::bounds::{BlockBounds, BoundsEnd};
use crate::dom::{Namespace, NodeId, TreeBuilder};
use crate::error::RenderError;

#[derive(Debug, Clone, Copy)]
struct Cursor {
    parent: NodeId,
    next: Option<NodeId>,
    namespace: Namespace,
}

#[derive(Debug, Clone, Copy)]
struct Constructing {
    element: NodeId,
    inner: Namespace,
}

#[derive(Debug)]
pub(crate) struct ElementBuilder {
    cursors: Vec<Cursor>,
    constructing: Option<Constructing>,
    blocks: Vec<Rc<BlockBounds>>,
}

impl ElementBuilder {
    /// Insert into `parent` before `next` (or at the end).
    pub fn new(parent: NodeId, next: Option<NodeId>, namespace: Namespace) -> Self {
        Self {
            cursors: vec![Cursor {
                parent,
                next,
                namespace,
            }],
            constructing: None,
            blocks: Vec::new(),
        }
    }

    fn cursor(&self) -> Cursor {
        // The root cursor is never popped.
        self.cursors[self.cursors.len() - 1]
    }

    pub fn append(&mut self, dom: &mut dyn TreeBuilder, node: NodeId) {
        let cursor = self.cursor();
        dom.insert_before(cursor.parent, node, cursor.next);
        self.did_append(cursor.parent, BoundsEnd::Node(node));
    }

    /// Insert trusted markup and return the produced range.
    pub fn append_html(&mut self, dom: &mut dyn TreeBuilder, html: &str) -> (NodeId, NodeId) {
        let cursor = self.cursor();
        let (first, last) = dom.insert_html(cursor.parent, cursor.next, html);
        self.did_append(cursor.parent, BoundsEnd::Node(first));
        self.did_append(cursor.parent, BoundsEnd::Node(last));
        (first, last)
    }

    fn did_append(&self, parent: NodeId, end: BoundsEnd) {
        if let Some(block) = self.blocks.last() {
            if block.parent() == parent {
                block.did_append(end);
            }
        }
    }

    pub fn open_element(&mut self, dom: &mut dyn TreeBuilder, tag: &str) -> NodeId {
        let namespace = self.cursor().namespace.for_child(tag);
        let element = dom.create_element(tag, namespace);
        self.constructing = Some(Constructing {
            element,
            inner: namespace.inside(tag),
        });
        element
    }

    /// The element whose attributes are still being set.
    pub fn constructing(&self) -> Option<NodeId> {
        self.constructing.map(|c| c.element)
    }

    pub fn flush_element(&mut self, dom: &mut dyn TreeBuilder) -> Result<NodeId, RenderError> {
        let Constructing { element, inner } = self
            .constructing
            .take()
            .ok_or_else(|| RenderError::MalformedProgram("flush without an open element".into()))?;
        self.append(dom, element);
        self.cursors.push(Cursor {
            parent: element,
            next: None,
            namespace: inner,
        });
        Ok(element)
    }

    pub fn close_element(&mut self) -> Result<NodeId, RenderError> {
        if self.cursors.len() <= 1 {
            return Err(RenderError::MalformedProgram("close without an open element".into()));
        }
        match self.cursors.pop() {
            Some(cursor) => Ok(cursor.parent),
            None => Err(RenderError::MalformedProgram("close without an open element".into())),
        }
    }

    pub fn push_block(&mut self) -> Rc<BlockBounds> {
        let cursor = self.cursor();
        let bounds = BlockBounds::new(cursor.parent, cursor.namespace);
        self.blocks.push(bounds.clone());
        bounds
    }

    /// Record into existing bounds, e.g. when a block re-renders in place.
    pub fn resume_block(&mut self, bounds: Rc<BlockBounds>) {
        bounds.reset();
        self.blocks.push(bounds);
    }

    /// Finish the innermost block. An empty block gets a comment
    /// placeholder so it keeps its position.
    pub fn pop_block(&mut self, dom: &mut dyn TreeBuilder) -> Result<Rc<BlockBounds>, RenderError> {
        if self.blocks.last().is_some_and(|block| block.is_empty()) {
            let placeholder = dom.create_comment("");
            self.append(dom, placeholder);
        }
        let bounds = self
            .blocks
            .pop()
            .ok_or_else(|| RenderError::MalformedProgram("block stack underflow".into()))?;
        self.did_append(bounds.parent(), BoundsEnd::Block(bounds.clone()));
        Ok(bounds)
    }
}
