//! In-memory document.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Every mutation
//! that would be observable in a browser bumps [`SimpleDom::mutations`], so
//! tests can assert that a no-op revalidation touched nothing.

use std::fmt::Write as _;

use super::{Namespace, NodeId, TreeBuilder};
use crate::syntax::VOID_ELEMENTS;

#[derive(Debug, Clone)]
enum NodeData {
    /// Root container. Serializes as its children only.
    Fragment,
    Element {
        tag: String,
        namespace: Namespace,
        attributes: Vec<Attribute>,
    },
    Text(String),
    Comment(String),
    /// Trusted markup inserted verbatim.
    Raw(String),
}

#[derive(Debug, Clone)]
struct Attribute {
    name: String,
    value: String,
    namespace: Option<Namespace>,
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed [`TreeBuilder`] with an HTML serializer.
#[derive(Debug, Clone)]
pub struct SimpleDom {
    nodes: Vec<Node>,
    root: NodeId,
    mutations: usize,
}

impl SimpleDom {
    pub fn new() -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            root: NodeId::from(0),
            mutations: 0,
        };
        dom.root = dom.alloc(NodeData::Fragment);
        dom
    }

    /// The document root: a fragment that renders as its children.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of tree mutations performed so far.
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    pub fn reset_mutations(&mut self) {
        self.mutations = 0;
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.node(node).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.children(node).first().copied()
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.node(node)?.data {
            NodeData::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn namespace(&self, node: NodeId) -> Option<Namespace> {
        match &self.node(node)?.data {
            NodeData::Element { namespace, .. } => Some(*namespace),
            _ => None,
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.node(node)?.data {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .find(|a| a.name == name)
                .map(|a| a.value.as_str()),
            _ => None,
        }
    }

    /// Data of a text, comment or raw node.
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.node(node)?.data {
            NodeData::Text(s) | NodeData::Comment(s) | NodeData::Raw(s) => Some(s),
            _ => None,
        }
    }

    /// Serialize the whole document.
    pub fn to_html(&self) -> String {
        self.inner_html(self.root)
    }

    /// Serialize `node` itself.
    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.serialize(node, &mut out);
        out
    }

    /// Serialize the children of `node`.
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.serialize(*child, &mut out);
        }
        out
    }

    fn serialize(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        match &node.data {
            NodeData::Fragment => {
                for child in &node.children {
                    self.serialize(*child, out);
                }
            }
            NodeData::Element { tag, attributes, .. } => {
                out.push('<');
                out.push_str(tag);
                for attr in attributes {
                    let _ = write!(out, " {}=\"{}\"", attr.name, escape_attribute(&attr.value));
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for child in &node.children {
                    self.serialize(*child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
            NodeData::Text(text) => out.push_str(&escape_text(text)),
            NodeData::Comment(text) => {
                let _ = write!(out, "<!--{text}-->");
            }
            NodeData::Raw(html) => out.push_str(html),
        }
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId::from(self.nodes.len() as u32);
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.raw() as usize)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.raw() as usize)
    }

    fn detach(&mut self, node: NodeId) -> bool {
        let Some(parent) = self.node(node).and_then(|n| n.parent) else {
            return false;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != node);
        }
        if let Some(n) = self.node_mut(node) {
            n.parent = None;
        }
        true
    }
}

impl Default for SimpleDom {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder for SimpleDom {
    fn create_element(&mut self, tag: &str, namespace: Namespace) -> NodeId {
        self.alloc(NodeData::Element {
            tag: tag.to_string(),
            namespace,
            attributes: Vec::new(),
        })
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    fn create_comment(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Comment(text.to_string()))
    }

    fn set_attribute(&mut self, element: NodeId, name: &str, value: &str, namespace: Option<Namespace>) {
        let Some(Node {
            data: NodeData::Element { attributes, .. },
            ..
        }) = self.node_mut(element)
        else {
            return;
        };
        match attributes.iter_mut().find(|a| a.name == name && a.namespace == namespace) {
            Some(attr) => attr.value = value.to_string(),
            None => attributes.push(Attribute {
                name: name.to_string(),
                value: value.to_string(),
                namespace,
            }),
        }
        self.mutations += 1;
    }

    fn remove_attribute(&mut self, element: NodeId, name: &str, namespace: Option<Namespace>) {
        if let Some(Node {
            data: NodeData::Element { attributes, .. },
            ..
        }) = self.node_mut(element)
        {
            let before = attributes.len();
            attributes.retain(|a| !(a.name == name && a.namespace == namespace));
            if attributes.len() != before {
                self.mutations += 1;
            }
        }
    }

    fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) {
        if self.node(parent).is_none() || self.node(node).is_none() {
            return;
        }
        self.detach(node);
        if let Some(p) = self.node_mut(parent) {
            let index = reference
                .and_then(|r| p.children.iter().position(|c| *c == r))
                .unwrap_or(p.children.len());
            p.children.insert(index, node);
        }
        if let Some(n) = self.node_mut(node) {
            n.parent = Some(parent);
        }
        self.mutations += 1;
    }

    fn remove(&mut self, node: NodeId) {
        if self.detach(node) {
            self.mutations += 1;
        }
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        if let Some(n) = self.node_mut(node) {
            match &mut n.data {
                NodeData::Text(s) | NodeData::Comment(s) => *s = text.to_string(),
                _ => return,
            }
            self.mutations += 1;
        }
    }

    fn insert_html(&mut self, parent: NodeId, reference: Option<NodeId>, html: &str) -> (NodeId, NodeId) {
        let node = self.alloc(NodeData::Raw(html.to_string()));
        self.insert_before(parent, node, reference);
        (node, node)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.parent
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.node(node)?.parent?;
        let siblings = &self.node(parent)?.children;
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index + 1).copied()
    }
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_serializes() {
        let mut dom = SimpleDom::new();
        let root = dom.root();
        let div = dom.create_element("div", Namespace::Html);
        dom.set_attribute(div, "class", "a \"b\"", None);
        let text = dom.create_text("1 < 2 & 3");
        dom.append_child(div, text);
        let br = dom.create_element("br", Namespace::Html);
        dom.append_child(div, br);
        let comment = dom.create_comment("c");
        dom.append_child(div, comment);
        dom.append_child(root, div);

        assert_eq!(
            dom.to_html(),
            "<div class=\"a &quot;b&quot;\">1 &lt; 2 &amp; 3<br><!--c--></div>"
        );
    }

    #[test]
    fn creation_is_not_a_mutation() {
        let mut dom = SimpleDom::new();
        dom.create_element("p", Namespace::Html);
        dom.create_text("x");
        assert_eq!(dom.mutations(), 0);
    }

    #[test]
    fn insert_before_and_move() {
        let mut dom = SimpleDom::new();
        let root = dom.root();
        let a = dom.create_text("a");
        let b = dom.create_text("b");
        let c = dom.create_text("c");
        dom.append_child(root, a);
        dom.append_child(root, c);
        dom.insert_before(root, b, Some(c));
        assert_eq!(dom.to_html(), "abc");

        dom.insert_before(root, a, None);
        assert_eq!(dom.to_html(), "bca");
        assert_eq!(dom.next_sibling(c), Some(a));
        assert_eq!(dom.next_sibling(a), None);
        assert_eq!(dom.parent(a), Some(root));
    }

    #[test]
    fn remove_and_set_text_count_mutations() {
        let mut dom = SimpleDom::new();
        let root = dom.root();
        let t = dom.create_text("x");
        dom.append_child(root, t);
        dom.reset_mutations();

        dom.set_text(t, "y");
        dom.remove(t);
        dom.remove(t);
        assert_eq!(dom.mutations(), 2);
        assert_eq!(dom.to_html(), "");
        assert_eq!(dom.parent(t), None);
    }

    #[test]
    fn raw_html_is_verbatim() {
        let mut dom = SimpleDom::new();
        let root = dom.root();
        let (first, last) = dom.insert_html(root, None, "<b>bold</b>");
        assert_eq!(first, last);
        assert_eq!(dom.to_html(), "<b>bold</b>");
    }

    #[test]
    fn remove_attribute_only_counts_when_present() {
        let mut dom = SimpleDom::new();
        let el = dom.create_element("input", Namespace::Html);
        dom.set_attribute(el, "disabled", "", None);
        dom.remove_attribute(el, "disabled", None);
        dom.remove_attribute(el, "disabled", None);
        assert_eq!(dom.mutations(), 2);
        assert_eq!(dom.attribute(el, "disabled"), None);
    }
}
