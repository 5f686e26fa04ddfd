//! DOM Tree Building
//!
//! The VM never touches a real document. It drives a [`TreeBuilder`], an
//! injected interface covering the handful of operations rendering needs.
//! [`SimpleDom`] is an in-memory implementation with an HTML serializer,
//! used for tests and server-side rendering.

mod simple;

pub use simple::SimpleDom;

/// Handle to a node owned by a [`TreeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Element and attribute namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Html,
    Svg,
    MathMl,
    XLink,
    Xml,
    Xmlns,
}

impl Namespace {
    pub fn uri(self) -> &'static str {
        match self {
            Namespace::Html => "http://www.w3.org/1999/xhtml",
            Namespace::Svg => "http://www.w3.org/2000/svg",
            Namespace::MathMl => "http://www.w3.org/1998/Math/MathML",
            Namespace::XLink => "http://www.w3.org/1999/xlink",
            Namespace::Xml => "http://www.w3.org/XML/1998/namespace",
            Namespace::Xmlns => "http://www.w3.org/2000/xmlns/",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        [
            Namespace::Html,
            Namespace::Svg,
            Namespace::MathMl,
            Namespace::XLink,
            Namespace::Xml,
            Namespace::Xmlns,
        ]
        .into_iter()
        .find(|ns| ns.uri() == uri)
    }

    /// The namespace implied by an attribute's prefix, if any.
    pub fn for_attribute(name: &str) -> Option<Self> {
        if name == "xmlns" || name.starts_with("xmlns:") {
            Some(Namespace::Xmlns)
        } else if name.starts_with("xlink:") {
            Some(Namespace::XLink)
        } else if name.starts_with("xml:") {
            Some(Namespace::Xml)
        } else {
            None
        }
    }

    /// Namespace of an element named `tag` created where `self` applies.
    pub fn for_child(self, tag: &str) -> Self {
        match tag {
            "svg" => Namespace::Svg,
            "math" => Namespace::MathMl,
            _ => self,
        }
    }

    /// Namespace that applies inside an element `tag` in namespace `self`.
    pub fn inside(self, tag: &str) -> Self {
        match (self, tag) {
            (Namespace::Svg, "foreignObject") => Namespace::Html,
            (ns, _) => ns,
        }
    }
}

/// The operations the VM performs on a document.
///
/// Creating nodes is free of observable effect until they are inserted;
/// everything else mutates the tree.
pub trait TreeBuilder {
    fn create_element(&mut self, tag: &str, namespace: Namespace) -> NodeId;
    fn create_text(&mut self, text: &str) -> NodeId;
    fn create_comment(&mut self, text: &str) -> NodeId;

    fn set_attribute(&mut self, element: NodeId, name: &str, value: &str, namespace: Option<Namespace>);
    fn remove_attribute(&mut self, element: NodeId, name: &str, namespace: Option<Namespace>);

    /// Insert `node` into `parent` before `reference`, or last when
    /// `reference` is `None`. A node that already has a parent is moved.
    fn insert_before(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>);

    fn append_child(&mut self, parent: NodeId, node: NodeId) {
        self.insert_before(parent, node, None);
    }

    /// Detach `node` from its parent.
    fn remove(&mut self, node: NodeId);

    /// Replace the data of a text or comment node.
    fn set_text(&mut self, node: NodeId, text: &str);

    /// Insert trusted markup before `reference` and return the first and
    /// last nodes it produced.
    fn insert_html(&mut self, parent: NodeId, reference: Option<NodeId>, html: &str) -> (NodeId, NodeId);

    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_uris_round_trip() {
        for ns in [Namespace::Html, Namespace::Svg, Namespace::XLink, Namespace::Xmlns] {
            assert_eq!(Namespace::from_uri(ns.uri()), Some(ns));
        }
        assert_eq!(Namespace::from_uri("urn:nope"), None);
    }

    #[test]
    fn attribute_prefixes() {
        assert_eq!(Namespace::for_attribute("xlink:href"), Some(Namespace::XLink));
        assert_eq!(Namespace::for_attribute("xmlns"), Some(Namespace::Xmlns));
        assert_eq!(Namespace::for_attribute("xml:lang"), Some(Namespace::Xml));
        assert_eq!(Namespace::for_attribute("class"), None);
    }

    #[test]
    fn svg_children_inherit_namespace() {
        let svg = Namespace::Html.for_child("svg");
        assert_eq!(svg, Namespace::Svg);
        assert_eq!(svg.for_child("circle"), Namespace::Svg);
        assert_eq!(svg.for_child("foreignObject"), Namespace::Svg);
        assert_eq!(svg.inside("foreignObject"), Namespace::Html);
        assert_eq!(Namespace::Html.for_child("div"), Namespace::Html);
    }
}
