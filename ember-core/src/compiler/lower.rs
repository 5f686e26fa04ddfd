//! AST to wire-format lowering.
//!
//! One pass over the tree. Symbols are interned in first-use order so the
//! output depends only on the AST and the options.

use tracing::trace;

use super::wire::{
    Params, SerializedBlock, SerializedTemplateBlock, Slot, WireExpression, WireHash, WireLiteral,
    WireStatement,
};
use super::CompileOptions;
use crate::dom::Namespace;
use crate::error::CompileError;
use crate::syntax::{
    AttrNode, AttrValue, BlockStatement, ConcatPart, ElementModifierStatement, ElementNode,
    Expression, Hash, LiteralValue, MustacheStatement, PathExpression, PathHead, SourceSpan,
    Statement, Template,
};

/// Names that resolve without being in scope, even in strict mode.
const KEYWORDS: &[&str] = &[
    "if", "unless", "each", "let", "with", "yield", "has-block", "concat", "array", "hash", "get",
];

type Result<T> = std::result::Result<T, CompileError>;

pub(crate) struct Lowering<'o> {
    options: &'o CompileOptions,
    locals: Vec<String>,
    named: Vec<String>,
    yields: Vec<String>,
    blocks: Vec<SerializedBlock>,
    /// Block params in scope, innermost last.
    scopes: Vec<Vec<(String, Slot)>>,
}

impl<'o> Lowering<'o> {
    pub fn new(options: &'o CompileOptions) -> Self {
        Self {
            options,
            locals: Vec::new(),
            named: Vec::new(),
            yields: Vec::new(),
            blocks: Vec::new(),
            scopes: Vec::new(),
        }
    }

    pub fn lower(mut self, template: &Template) -> Result<SerializedTemplateBlock> {
        let statements = self.statements(&template.body)?;
        Ok(SerializedTemplateBlock {
            statements,
            locals: self.locals,
            named: self.named,
            yields: self.yields,
            blocks: self.blocks,
            has_eval: false,
        })
    }

    // ------------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------------

    fn local(&self, name: &str) -> Option<Slot> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(local, _)| local == name)
            .map(|(_, slot)| *slot)
    }

    fn intern(table: &mut Vec<String>, symbol: String) -> Slot {
        match table.iter().position(|s| *s == symbol) {
            Some(slot) => slot,
            None => {
                table.push(symbol);
                table.len() - 1
            }
        }
    }

    fn named_slot(&mut self, name: &str) -> Slot {
        Self::intern(&mut self.named, format!("@{name}"))
    }

    fn yield_slot(&mut self, name: &str) -> Slot {
        Self::intern(&mut self.yields, format!("&{name}"))
    }

    fn check_free(&self, name: &str, loc: SourceSpan) -> Result<()> {
        if !self.options.strict
            || KEYWORDS.contains(&name)
            || self.options.lexical_scope.iter().any(|s| s == name)
        {
            return Ok(());
        }
        Err(CompileError::UnresolvedSymbol {
            name: name.to_string(),
            line: loc.start.line,
            column: loc.start.column,
        })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statements(&mut self, body: &[Statement]) -> Result<Vec<WireStatement>> {
        let mut out = Vec::with_capacity(body.len());
        for statement in body {
            self.statement(statement, &mut out)?;
        }
        Ok(out)
    }

    fn statement(&mut self, statement: &Statement, out: &mut Vec<WireStatement>) -> Result<()> {
        match statement {
            Statement::Text(text) => out.push(WireStatement::Text(text.chars.clone())),
            Statement::Comment(comment) => out.push(WireStatement::Comment(comment.value.clone())),
            Statement::MustacheComment(_) => {}
            Statement::Mustache(m) => out.push(self.mustache(m)?),
            Statement::Block(b) => out.push(self.block(b)?),
            Statement::Element(el) if is_component_tag(&el.tag, el.loc)? => out.push(self.component(el)?),
            Statement::Element(el) => self.element(el, out)?,
        }
        Ok(())
    }

    /// Lower a nested program, binding `params` to fresh local slots.
    fn program(&mut self, body: &[Statement], params: &[String]) -> Result<Slot> {
        let mut scope = Vec::with_capacity(params.len());
        let mut parameters = Vec::with_capacity(params.len());
        for name in params {
            self.locals.push(name.clone());
            let slot = self.locals.len() - 1;
            scope.push((name.clone(), slot));
            parameters.push(slot);
        }

        self.scopes.push(scope);
        let statements = self.statements(body);
        self.scopes.pop();

        self.blocks.push(SerializedBlock {
            statements: statements?,
            parameters,
        });
        Ok(self.blocks.len() - 1)
    }

    fn mustache(&mut self, m: &MustacheStatement) -> Result<WireStatement> {
        if m.path.simple_name() == Some("yield") && self.local("yield").is_none() {
            let to = match m.hash.get("to") {
                None => "default".to_string(),
                Some(Expression::Literal(lit)) => match &lit.value {
                    LiteralValue::String(s) => s.clone(),
                    _ => return Err(unsupported("`yield to=` must be a string literal", lit.loc)),
                },
                Some(other) => return Err(unsupported("`yield to=` must be a string literal", other.loc())),
            };
            return Ok(WireStatement::Yield {
                to: self.yield_slot(&to),
                params: self.params(&m.params)?,
            });
        }

        let expr = self.call_or_path(&m.path, &m.params, &m.hash, m.loc)?;
        Ok(if m.trusting {
            WireStatement::TrustingAppend(expr)
        } else {
            WireStatement::Append(expr)
        })
    }

    fn block(&mut self, b: &BlockStatement) -> Result<WireStatement> {
        let name = self.callee(&b.path, "block")?;
        trace!(block = %name, "lowering block");
        let params = self.params(&b.params)?;
        let hash = self.hash(&b.hash)?;
        let program = self.program(&b.program.body, &b.program.block_params)?;
        let inverse = match &b.inverse {
            Some(inverse) => Some(self.program(&inverse.body, &inverse.block_params)?),
            None => None,
        };
        Ok(WireStatement::Block {
            name,
            params,
            hash,
            program: Some(program),
            inverse,
        })
    }

    fn element(&mut self, el: &ElementNode, out: &mut Vec<WireStatement>) -> Result<()> {
        if !el.block_params.is_empty() {
            return Err(unsupported(
                &format!("block params are only valid on components, not `<{}>`", el.tag),
                el.loc,
            ));
        }

        out.push(WireStatement::OpenElement(el.tag.clone()));
        for attr in &el.attributes {
            if attr.name.starts_with('@') {
                return Err(unsupported(
                    &format!("`{}` is a named argument, but `<{}>` is not a component", attr.name, el.tag),
                    attr.loc,
                ));
            }
            out.push(self.attribute(attr)?);
        }
        for modifier in &el.modifiers {
            out.push(self.modifier(modifier)?);
        }
        out.push(WireStatement::FlushElement);
        for child in &el.children {
            self.statement(child, out)?;
        }
        out.push(WireStatement::CloseElement);
        Ok(())
    }

    fn component(&mut self, el: &ElementNode) -> Result<WireStatement> {
        self.check_free(&el.tag, el.loc)?;

        let mut attrs = Vec::new();
        let mut args = WireHash::new();
        for attr in &el.attributes {
            match attr.name.strip_prefix('@') {
                Some(name) => {
                    let value = self.attr_expression(&attr.value)?;
                    args.push(name, value);
                }
                None => attrs.push(self.attribute(attr)?),
            }
        }
        for modifier in &el.modifiers {
            attrs.push(self.modifier(modifier)?);
        }

        let block = if el.children.is_empty() && el.block_params.is_empty() {
            None
        } else {
            Some(self.program(&el.children, &el.block_params)?)
        };

        Ok(WireStatement::Component {
            tag: el.tag.clone(),
            attrs,
            args: (!args.is_empty()).then_some(args),
            block,
        })
    }

    fn attribute(&mut self, attr: &AttrNode) -> Result<WireStatement> {
        if attr.name == "...attributes" {
            return match &attr.value {
                AttrValue::Text(text) if text.chars.is_empty() => Ok(WireStatement::AttrSplat),
                _ => Err(unsupported("`...attributes` does not take a value", attr.loc)),
            };
        }

        let namespace = Namespace::for_attribute(&attr.name).map(|ns| ns.uri().to_string());
        Ok(match &attr.value {
            AttrValue::Text(text) => WireStatement::StaticAttr {
                name: attr.name.clone(),
                value: text.chars.clone(),
                namespace,
            },
            value => WireStatement::DynamicAttr {
                name: attr.name.clone(),
                value: self.attr_expression(value)?,
                namespace,
            },
        })
    }

    fn attr_expression(&mut self, value: &AttrValue) -> Result<WireExpression> {
        match value {
            AttrValue::Text(text) => Ok(WireExpression::Literal(WireLiteral::String(text.chars.clone()))),
            AttrValue::Mustache(m) => self.call_or_path(&m.path, &m.params, &m.hash, m.loc),
            AttrValue::Concat(concat) => {
                let mut parts = Vec::with_capacity(concat.parts.len());
                for part in &concat.parts {
                    parts.push(match part {
                        ConcatPart::Text(text) => WireExpression::Literal(WireLiteral::String(text.chars.clone())),
                        ConcatPart::Mustache(m) => self.call_or_path(&m.path, &m.params, &m.hash, m.loc)?,
                    });
                }
                Ok(WireExpression::Concat(parts))
            }
        }
    }

    fn modifier(&mut self, modifier: &ElementModifierStatement) -> Result<WireStatement> {
        let name = self.callee(&modifier.path, "modifier")?;
        Ok(WireStatement::Modifier {
            name,
            params: self.params(&modifier.params)?,
            hash: self.hash(&modifier.hash)?,
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// The name of a helper, modifier or block keyword in head position.
    fn callee(&self, path: &Expression, what: &str) -> Result<String> {
        match path.simple_name() {
            Some(name) if self.local(name).is_none() => {
                self.check_free(name, path.loc())?;
                Ok(name.to_string())
            }
            Some(name) => Err(unsupported(
                &format!("cannot invoke block param `{name}` as a {what}"),
                path.loc(),
            )),
            None => Err(unsupported(&format!("{what} name must be a simple identifier"), path.loc())),
        }
    }

    fn call_or_path(&mut self, path: &Expression, params: &[Expression], hash: &Hash, loc: SourceSpan) -> Result<WireExpression> {
        if params.is_empty() && hash.is_empty() {
            return self.expression(path);
        }
        if path.simple_name() == Some("has-block") {
            return self.has_block(params, loc);
        }
        let name = self.callee(path, "helper")?;
        Ok(WireExpression::Call {
            name,
            params: self.params(params)?,
            hash: self.hash(hash)?,
        })
    }

    fn has_block(&mut self, params: &[Expression], loc: SourceSpan) -> Result<WireExpression> {
        let name = match params.first() {
            None => "default".to_string(),
            Some(Expression::Literal(lit)) => match &lit.value {
                LiteralValue::String(s) => s.clone(),
                _ => return Err(unsupported("`has-block` takes a block name string", loc)),
            },
            Some(_) => return Err(unsupported("`has-block` takes a block name string", loc)),
        };
        Ok(WireExpression::HasBlock(self.yield_slot(&name)))
    }

    fn expression(&mut self, expr: &Expression) -> Result<WireExpression> {
        match expr {
            Expression::Literal(lit) => Ok(WireExpression::Literal(match &lit.value {
                LiteralValue::String(s) => WireLiteral::String(s.clone()),
                LiteralValue::Number(n) => WireLiteral::Number(*n),
                LiteralValue::Boolean(b) => WireLiteral::Boolean(*b),
                LiteralValue::Null | LiteralValue::Undefined => WireLiteral::Null,
            })),
            Expression::Path(path) => self.path(path),
            Expression::SubExpression(sexpr) => {
                let (params, hash) = (&sexpr.params, &sexpr.hash);
                if sexpr.path.simple_name() == Some("has-block") {
                    return self.has_block(params, sexpr.loc);
                }
                let name = self.callee(&sexpr.path, "helper")?;
                Ok(WireExpression::Call {
                    name,
                    params: self.params(params)?,
                    hash: self.hash(hash)?,
                })
            }
        }
    }

    fn path(&mut self, path: &PathExpression) -> Result<WireExpression> {
        let tail = path.tail.clone();
        match &path.head {
            PathHead::This => Ok(WireExpression::GetThis { tail }),
            PathHead::Arg(name) => Ok(WireExpression::GetNamed {
                slot: self.named_slot(name),
                tail,
            }),
            PathHead::Var(name) => match self.local(name) {
                Some(slot) => Ok(WireExpression::GetLocal { slot, tail }),
                None if name == "has-block" && tail.is_empty() => Ok(WireExpression::HasBlock(self.yield_slot("default"))),
                None => {
                    self.check_free(name, path.loc)?;
                    Ok(WireExpression::GetFree {
                        name: name.clone(),
                        tail,
                    })
                }
            },
        }
    }

    fn params(&mut self, params: &[Expression]) -> Result<Params> {
        if params.is_empty() {
            return Ok(None);
        }
        let mut out = Vec::with_capacity(params.len());
        for param in params {
            out.push(self.expression(param)?);
        }
        Ok(Some(out))
    }

    fn hash(&mut self, hash: &Hash) -> Result<Option<WireHash>> {
        if hash.is_empty() {
            return Ok(None);
        }
        let mut out = WireHash::new();
        for pair in &hash.pairs {
            let value = self.expression(&pair.value)?;
            out.push(pair.key.clone(), value);
        }
        Ok(Some(out))
    }
}

fn unsupported(message: &str, loc: SourceSpan) -> CompileError {
    CompileError::Unsupported {
        message: message.to_string(),
        line: loc.start.line,
        column: loc.start.column,
    }
}

/// Capitalized tags invoke components. Dynamic tags are rejected.
fn is_component_tag(tag: &str, loc: SourceSpan) -> Result<bool> {
    if tag == "this" || tag.starts_with("this.") {
        return Err(unsupported("`this` cannot be used as a component tag", loc));
    }
    if tag.starts_with('@') || tag.starts_with(':') || tag.contains('.') {
        return Err(unsupported(&format!("dynamic component tag `<{tag}>` is not supported"), loc));
    }
    Ok(tag.starts_with(|c: char| c.is_ascii_uppercase()))
}
