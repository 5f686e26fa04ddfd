//! AST traversal.
//!
//! [`traverse`] walks a template in document order, calling
//! [`Visitor::enter`] before a node's children and [`Visitor::exit`] after.
//! Child order per node: mustaches and sub-expressions visit path, params,
//! hash; blocks add program then inverse; elements visit attributes,
//! modifiers, children.

use super::ast::{
    AttrNode, AttrValue, Block, BlockStatement, CommentStatement, ConcatPart, ConcatStatement,
    ElementModifierStatement, ElementNode, Expression, Hash, HashPair, Literal,
    MustacheCommentStatement, MustacheStatement, PathExpression, Statement, SubExpression,
    Template, TextNode,
};

/// A borrowed reference to any AST node.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Template(&'a Template),
    Block(&'a Block),
    Text(&'a TextNode),
    Mustache(&'a MustacheStatement),
    BlockStatement(&'a BlockStatement),
    Element(&'a ElementNode),
    Attr(&'a AttrNode),
    Modifier(&'a ElementModifierStatement),
    Comment(&'a CommentStatement),
    MustacheComment(&'a MustacheCommentStatement),
    Concat(&'a ConcatStatement),
    Path(&'a PathExpression),
    SubExpression(&'a SubExpression),
    Literal(&'a Literal),
    Hash(&'a Hash),
    HashPair(&'a HashPair),
}

impl NodeRef<'_> {
    /// The node's type name, as Glimmer-style tooling spells it.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeRef::Template(_) => "Template",
            NodeRef::Block(_) => "Block",
            NodeRef::Text(_) => "TextNode",
            NodeRef::Mustache(_) => "MustacheStatement",
            NodeRef::BlockStatement(_) => "BlockStatement",
            NodeRef::Element(_) => "ElementNode",
            NodeRef::Attr(_) => "AttrNode",
            NodeRef::Modifier(_) => "ElementModifierStatement",
            NodeRef::Comment(_) => "CommentStatement",
            NodeRef::MustacheComment(_) => "MustacheCommentStatement",
            NodeRef::Concat(_) => "ConcatStatement",
            NodeRef::Path(_) => "PathExpression",
            NodeRef::SubExpression(_) => "SubExpression",
            NodeRef::Literal(_) => "Literal",
            NodeRef::Hash(_) => "Hash",
            NodeRef::HashPair(_) => "HashPair",
        }
    }
}

/// Callbacks for [`traverse`]. Both default to doing nothing.
pub trait Visitor {
    fn enter(&mut self, _node: NodeRef<'_>) {}
    fn exit(&mut self, _node: NodeRef<'_>) {}
}

/// Walk `template` depth-first in document order.
pub fn traverse<V: Visitor + ?Sized>(template: &Template, visitor: &mut V) {
    visit(NodeRef::Template(template), visitor);
}

fn visit<V: Visitor + ?Sized>(node: NodeRef<'_>, visitor: &mut V) {
    visitor.enter(node);

    match node {
        NodeRef::Template(template) => visit_statements(&template.body, visitor),
        NodeRef::Block(block) => visit_statements(&block.body, visitor),
        NodeRef::Mustache(m) => visit_call(&m.path, &m.params, &m.hash, visitor),
        NodeRef::BlockStatement(b) => {
            visit_call(&b.path, &b.params, &b.hash, visitor);
            visit(NodeRef::Block(&b.program), visitor);
            if let Some(inverse) = &b.inverse {
                visit(NodeRef::Block(inverse), visitor);
            }
        }
        NodeRef::Element(element) => {
            for attr in &element.attributes {
                visit(NodeRef::Attr(attr), visitor);
            }
            for modifier in &element.modifiers {
                visit(NodeRef::Modifier(modifier), visitor);
            }
            visit_statements(&element.children, visitor);
        }
        NodeRef::Attr(attr) => match &attr.value {
            AttrValue::Text(text) => visit(NodeRef::Text(text), visitor),
            AttrValue::Mustache(m) => visit(NodeRef::Mustache(m), visitor),
            AttrValue::Concat(concat) => visit(NodeRef::Concat(concat), visitor),
        },
        NodeRef::Modifier(modifier) => {
            visit_call(&modifier.path, &modifier.params, &modifier.hash, visitor)
        }
        NodeRef::Concat(concat) => {
            for part in &concat.parts {
                match part {
                    ConcatPart::Text(text) => visit(NodeRef::Text(text), visitor),
                    ConcatPart::Mustache(m) => visit(NodeRef::Mustache(m), visitor),
                }
            }
        }
        NodeRef::SubExpression(sexpr) => visit_call(&sexpr.path, &sexpr.params, &sexpr.hash, visitor),
        NodeRef::Hash(hash) => {
            for pair in &hash.pairs {
                visit(NodeRef::HashPair(pair), visitor);
            }
        }
        NodeRef::HashPair(pair) => visit_expression(&pair.value, visitor),
        NodeRef::Text(_)
        | NodeRef::Comment(_)
        | NodeRef::MustacheComment(_)
        | NodeRef::Path(_)
        | NodeRef::Literal(_) => {}
    }

    visitor.exit(node);
}

fn visit_statements<V: Visitor + ?Sized>(body: &[Statement], visitor: &mut V) {
    for statement in body {
        let node = match statement {
            Statement::Text(text) => NodeRef::Text(text),
            Statement::Mustache(m) => NodeRef::Mustache(m),
            Statement::Block(b) => NodeRef::BlockStatement(b),
            Statement::Element(e) => NodeRef::Element(e),
            Statement::Comment(c) => NodeRef::Comment(c),
            Statement::MustacheComment(c) => NodeRef::MustacheComment(c),
        };
        visit(node, visitor);
    }
}

fn visit_call<V: Visitor + ?Sized>(path: &Expression, params: &[Expression], hash: &Hash, visitor: &mut V) {
    visit_expression(path, visitor);
    for param in params {
        visit_expression(param, visitor);
    }
    visit(NodeRef::Hash(hash), visitor);
}

fn visit_expression<V: Visitor + ?Sized>(expr: &Expression, visitor: &mut V) {
    let node = match expr {
        Expression::Path(path) => NodeRef::Path(path),
        Expression::SubExpression(sexpr) => NodeRef::SubExpression(sexpr),
        Expression::Literal(lit) => NodeRef::Literal(lit),
    };
    visit(node, visitor);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        depth: usize,
        max_depth: usize,
    }

    impl Visitor for Recorder {
        fn enter(&mut self, node: NodeRef<'_>) {
            self.depth += 1;
            self.max_depth = self.max_depth.max(self.depth);
            self.events.push(format!("enter:{}", node.kind()));
        }

        fn exit(&mut self, node: NodeRef<'_>) {
            self.depth -= 1;
            self.events.push(format!("exit:{}", node.kind()));
        }
    }

    #[test]
    fn enter_and_exit_are_balanced() {
        let template = parse("<div class=\"a {{b}}\" {{on c}}>{{#if x}}{{y (z k=1)}}{{/if}}</div>").unwrap();
        let mut recorder = Recorder::default();
        traverse(&template, &mut recorder);

        assert_eq!(recorder.depth, 0);
        let enters = recorder.events.iter().filter(|e| e.starts_with("enter")).count();
        let exits = recorder.events.iter().filter(|e| e.starts_with("exit")).count();
        assert_eq!(enters, exits);
        assert_eq!(recorder.events.first().map(String::as_str), Some("enter:Template"));
        assert_eq!(recorder.events.last().map(String::as_str), Some("exit:Template"));
    }

    #[test]
    fn document_order() {
        let template = parse("{{a}}<p>{{b}}</p>").unwrap();

        struct Paths(Vec<String>);
        impl Visitor for Paths {
            fn enter(&mut self, node: NodeRef<'_>) {
                if let NodeRef::Path(path) = node {
                    self.0.push(path.original.clone());
                }
            }
        }

        let mut paths = Paths(Vec::new());
        traverse(&template, &mut paths);
        assert_eq!(paths.0, vec!["a", "b"]);
    }

    #[test]
    fn visits_hash_values_and_nested_sub_expressions() {
        let template = parse("{{f (g (h 1)) k=(i j)}}").unwrap();

        #[derive(Default)]
        struct Counter {
            sexprs: usize,
            pairs: usize,
            literals: usize,
        }
        impl Visitor for Counter {
            fn enter(&mut self, node: NodeRef<'_>) {
                match node {
                    NodeRef::SubExpression(_) => self.sexprs += 1,
                    NodeRef::HashPair(_) => self.pairs += 1,
                    NodeRef::Literal(_) => self.literals += 1,
                    _ => {}
                }
            }
        }

        let mut counter = Counter::default();
        traverse(&template, &mut counter);
        assert_eq!(counter.sexprs, 3);
        assert_eq!(counter.pairs, 1);
        assert_eq!(counter.literals, 1);
    }
}
