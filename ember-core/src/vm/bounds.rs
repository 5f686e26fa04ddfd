//! Block bounds.
//!
//! A dynamic block remembers its first and last top-level nodes so it can
//! be cleared, moved or re-rendered in place. An end may be another block,
//! resolved lazily, so a nested block that re-renders keeps its parent's
//! bounds correct without the parent being told. A rendered block is never
//! empty: the builder inserts an empty comment when nothing else was
//! appended.

use std::cell::RefCell;
use std::rc::Rc;

use crate::dom::{Namespace, NodeId, TreeBuilder};

#[derive(Debug, Clone)]
pub(crate) enum BoundsEnd {
    Node(NodeId),
    Block(Rc<BlockBounds>),
}

impl BoundsEnd {
    fn first_node(&self) -> Option<NodeId> {
        match self {
            BoundsEnd::Node(node) => Some(*node),
            BoundsEnd::Block(block) => block.first_node(),
        }
    }

    fn last_node(&self) -> Option<NodeId> {
        match self {
            BoundsEnd::Node(node) => Some(*node),
            BoundsEnd::Block(block) => block.last_node(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct BlockBounds {
    parent: NodeId,
    namespace: Namespace,
    first: RefCell<Option<BoundsEnd>>,
    last: RefCell<Option<BoundsEnd>>,
}

impl BlockBounds {
    pub fn new(parent: NodeId, namespace: Namespace) -> Rc<Self> {
        Rc::new(Self {
            parent,
            namespace,
            first: RefCell::new(None),
            last: RefCell::new(None),
        })
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn is_empty(&self) -> bool {
        self.first.borrow().is_none()
    }

    pub fn first_node(&self) -> Option<NodeId> {
        self.first.borrow().as_ref().and_then(BoundsEnd::first_node)
    }

    pub fn last_node(&self) -> Option<NodeId> {
        self.last.borrow().as_ref().and_then(BoundsEnd::last_node)
    }

    /// Record `end` as appended inside this block.
    pub fn did_append(&self, end: BoundsEnd) {
        if self.first.borrow().is_none() {
            *self.first.borrow_mut() = Some(end.clone());
        }
        *self.last.borrow_mut() = Some(end);
    }

    pub fn set(&self, first: BoundsEnd, last: BoundsEnd) {
        *self.first.borrow_mut() = Some(first);
        *self.last.borrow_mut() = Some(last);
    }

    pub fn reset(&self) {
        *self.first.borrow_mut() = None;
        *self.last.borrow_mut() = None;
    }

    /// Top-level nodes in document order.
    pub fn nodes(&self, dom: &dyn TreeBuilder) -> Vec<NodeId> {
        let (Some(first), Some(last)) = (self.first_node(), self.last_node()) else {
            return Vec::new();
        };
        let mut nodes = vec![first];
        let mut current = first;
        while current != last {
            match dom.next_sibling(current) {
                Some(next) => {
                    nodes.push(next);
                    current = next;
                }
                None => break,
            }
        }
        nodes
    }

    /// Remove every node from the tree, returning the node that followed
    /// the block.
    pub fn clear(&self, dom: &mut dyn TreeBuilder) -> Option<NodeId> {
        let next = self.last_node().and_then(|last| dom.next_sibling(last));
        for node in self.nodes(dom) {
            dom.remove(node);
        }
        self.reset();
        next
    }

    /// Move every node before `reference`.
    pub fn move_before(&self, dom: &mut dyn TreeBuilder, reference: Option<NodeId>) {
        for node in self.nodes(dom) {
            dom.insert_before(self.parent, node, reference);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::SimpleDom;

    fn texts(dom: &mut SimpleDom, parts: &[&str]) -> Vec<NodeId> {
        let root = dom.root();
        parts
            .iter()
            .map(|text| {
                let node = dom.create_text(text);
                dom.append_child(root, node);
                node
            })
            .collect()
    }

    #[test]
    fn nested_block_ends_resolve_lazily() {
        let mut dom = SimpleDom::new();
        let nodes = texts(&mut dom, &["a", "b", "c"]);
        let inner = BlockBounds::new(dom.root(), Namespace::Html);
        inner.did_append(BoundsEnd::Node(nodes[1]));
        let outer = BlockBounds::new(dom.root(), Namespace::Html);
        outer.did_append(BoundsEnd::Node(nodes[0]));
        outer.did_append(BoundsEnd::Block(inner.clone()));
        assert_eq!(outer.last_node(), Some(nodes[1]));

        inner.set(BoundsEnd::Node(nodes[2]), BoundsEnd::Node(nodes[2]));
        assert_eq!(outer.last_node(), Some(nodes[2]));
    }

    #[test]
    fn clear_removes_the_range_and_reports_next() {
        let mut dom = SimpleDom::new();
        let nodes = texts(&mut dom, &["a", "b", "c", "d"]);
        let block = BlockBounds::new(dom.root(), Namespace::Html);
        block.set(BoundsEnd::Node(nodes[1]), BoundsEnd::Node(nodes[2]));

        let next = block.clear(&mut dom);
        assert_eq!(next, Some(nodes[3]));
        assert_eq!(dom.to_html(), "ad");
        assert!(block.is_empty());
    }

    #[test]
    fn move_before_keeps_order() {
        let mut dom = SimpleDom::new();
        let nodes = texts(&mut dom, &["a", "b", "c"]);
        let block = BlockBounds::new(dom.root(), Namespace::Html);
        block.set(BoundsEnd::Node(nodes[1]), BoundsEnd::Node(nodes[2]));

        block.move_before(&mut dom, Some(nodes[0]));
        assert_eq!(dom.to_html(), "bca");
    }
}
