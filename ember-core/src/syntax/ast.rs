//! Template AST.
//!
//! Every node carries a [`SourceSpan`]. The tree is produced once by
//! [`crate::syntax::parse`] and consumed by the compiler.

use serde::Serialize;

/// A point in the source. Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SourceSpan {
    pub start: Position,
    pub end: Position,
}

impl SourceSpan {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// Root of a parsed template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub body: Vec<Statement>,
    /// The text this tree was parsed from. Template ids are derived from it.
    #[serde(skip)]
    pub source: String,
    pub loc: SourceSpan,
}

/// The body of a block or an element with block params.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub body: Vec<Statement>,
    pub block_params: Vec<String>,
    /// True for the synthetic inverse created by `{{else if ...}}`.
    pub chained: bool,
    pub loc: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Statement {
    Text(TextNode),
    Mustache(MustacheStatement),
    Block(BlockStatement),
    Element(ElementNode),
    Comment(CommentStatement),
    MustacheComment(MustacheCommentStatement),
}

impl Statement {
    pub fn loc(&self) -> SourceSpan {
        match self {
            Statement::Text(node) => node.loc,
            Statement::Mustache(node) => node.loc,
            Statement::Block(node) => node.loc,
            Statement::Element(node) => node.loc,
            Statement::Comment(node) => node.loc,
            Statement::MustacheComment(node) => node.loc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextNode {
    pub chars: String,
    pub loc: SourceSpan,
}

/// `<!-- ... -->`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentStatement {
    pub value: String,
    pub loc: SourceSpan,
}

/// `{{! ... }}` or `{{!-- ... --}}`. Never rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MustacheCommentStatement {
    pub value: String,
    pub strip: StripFlags,
    pub loc: SourceSpan,
}

/// `{{path params hash}}`, or `{{{...}}}` when `trusting`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MustacheStatement {
    pub path: Expression,
    pub params: Vec<Expression>,
    pub hash: Hash,
    pub trusting: bool,
    pub strip: StripFlags,
    pub loc: SourceSpan,
}

/// `{{#path params hash as |x|}}program{{else}}inverse{{/path}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockStatement {
    pub path: Expression,
    pub params: Vec<Expression>,
    pub hash: Hash,
    pub program: Block,
    pub inverse: Option<Block>,
    pub open_strip: StripFlags,
    pub inverse_strip: StripFlags,
    pub close_strip: StripFlags,
    pub loc: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<AttrNode>,
    pub modifiers: Vec<ElementModifierStatement>,
    pub children: Vec<Statement>,
    pub block_params: Vec<String>,
    pub self_closing: bool,
    pub loc: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttrNode {
    pub name: String,
    pub value: AttrValue,
    pub loc: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum AttrValue {
    Text(TextNode),
    Mustache(MustacheStatement),
    Concat(ConcatStatement),
}

/// A quoted attribute value mixing text and mustaches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcatStatement {
    pub parts: Vec<ConcatPart>,
    pub loc: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ConcatPart {
    Text(TextNode),
    Mustache(MustacheStatement),
}

/// `{{modifier params hash}}` inside an element's start tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementModifierStatement {
    pub path: Expression,
    pub params: Vec<Expression>,
    pub hash: Hash,
    pub loc: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Expression {
    Path(PathExpression),
    SubExpression(SubExpression),
    Literal(Literal),
}

impl Expression {
    pub fn loc(&self) -> SourceSpan {
        match self {
            Expression::Path(path) => path.loc,
            Expression::SubExpression(sexpr) => sexpr.loc,
            Expression::Literal(lit) => lit.loc,
        }
    }

    /// The bare name when this is a head-only free-variable path.
    pub fn simple_name(&self) -> Option<&str> {
        match self {
            Expression::Path(PathExpression {
                head: PathHead::Var(name),
                tail,
                ..
            }) if tail.is_empty() => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PathHead {
    This,
    /// A free variable or block param.
    Var(String),
    /// A named argument, without the `@`.
    Arg(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathExpression {
    pub head: PathHead,
    pub tail: Vec<String>,
    pub original: String,
    pub loc: SourceSpan,
}

/// `(helper params hash)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubExpression {
    pub path: Box<Expression>,
    pub params: Vec<Expression>,
    pub hash: Hash,
    pub loc: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Literal {
    pub value: LiteralValue,
    pub loc: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LiteralValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
    Undefined,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Hash {
    pub pairs: Vec<HashPair>,
    pub loc: SourceSpan,
}

impl Hash {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Expression> {
        self.pairs.iter().find(|pair| pair.key == key).map(|pair| &pair.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HashPair {
    pub key: String,
    pub value: Expression,
    pub loc: SourceSpan,
}

/// Whitespace-control markers: `open` is a `~` right after the opening
/// braces, `close` a `~` right before the closing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StripFlags {
    pub open: bool,
    pub close: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripMode {
    None,
    Left,
    Right,
    Both,
}

impl StripFlags {
    pub fn mode(self) -> StripMode {
        match (self.open, self.close) {
            (false, false) => StripMode::None,
            (true, false) => StripMode::Left,
            (false, true) => StripMode::Right,
            (true, true) => StripMode::Both,
        }
    }
}
