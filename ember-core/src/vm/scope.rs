//! Lexical scope of an executing block.
//!
//! Symbols in the wire format are indices into the owning template's
//! tables; a scope resolves them to live references. Named arguments are
//! stored without their `@` and yield targets without their `&`.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::compiler::{SerializedBlock, Slot, WireStatement, WireTemplate};
use crate::error::RenderError;
use crate::reactive::Reference;
use crate::value::Value;

/// A caller's block, rendered by `{{yield}}` in the caller's scope.
#[derive(Debug, Clone)]
pub(crate) struct YieldBlock {
    pub block: Slot,
    pub scope: Scope,
}

/// Caller attributes and modifiers forwarded by `...attributes`.
#[derive(Debug)]
pub(crate) struct Splat {
    pub statements: Vec<WireStatement>,
    pub scope: Scope,
}

#[derive(Debug, Clone)]
pub(crate) struct Scope {
    pub template: Rc<WireTemplate>,
    pub self_ref: Reference,
    locals: Vec<Option<Reference>>,
    named: Rc<IndexMap<String, Reference>>,
    blocks: Rc<IndexMap<String, YieldBlock>>,
    attrs: Option<Rc<Splat>>,
}

impl Scope {
    pub fn root(template: Rc<WireTemplate>, self_ref: Reference) -> Self {
        let locals = vec![None; template.block.locals.len()];
        Self {
            template,
            self_ref,
            locals,
            named: Rc::default(),
            blocks: Rc::default(),
            attrs: None,
        }
    }

    pub fn with_named(mut self, named: IndexMap<String, Reference>) -> Self {
        self.named = Rc::new(named);
        self
    }

    pub fn with_blocks(mut self, blocks: IndexMap<String, YieldBlock>) -> Self {
        self.blocks = Rc::new(blocks);
        self
    }

    pub fn with_attrs(mut self, attrs: Option<Rc<Splat>>) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn block(&self, slot: Slot) -> Result<&SerializedBlock, RenderError> {
        self.template
            .block
            .blocks
            .get(slot)
            .ok_or_else(|| RenderError::MalformedProgram(format!("no block {slot}")))
    }

    /// Bind `values` to the parameter slots of a block. Parameters without
    /// a value are bound to null.
    pub fn bind(&mut self, parameters: &[Slot], values: Vec<Reference>) {
        let mut values = values.into_iter();
        for &slot in parameters {
            if slot >= self.locals.len() {
                self.locals.resize(slot + 1, None);
            }
            self.locals[slot] = Some(values.next().unwrap_or_else(|| Reference::constant(Value::Null)));
        }
    }

    pub fn local(&self, slot: Slot) -> Result<Reference, RenderError> {
        match self.locals.get(slot) {
            Some(Some(reference)) => Ok(reference.clone()),
            _ => Err(RenderError::MalformedProgram(format!("local {slot} is not bound"))),
        }
    }

    /// The argument for the named symbol at `slot`. Missing arguments are
    /// null.
    pub fn named(&self, slot: Slot) -> Result<Reference, RenderError> {
        let symbol = self.symbol(&self.template.block.named, slot, "named")?;
        let name = symbol.strip_prefix('@').unwrap_or(symbol);
        Ok(self
            .named
            .get(name)
            .cloned()
            .unwrap_or_else(|| Reference::constant(Value::Null)))
    }

    pub fn yield_block(&self, slot: Slot) -> Result<Option<&YieldBlock>, RenderError> {
        let symbol = self.symbol(&self.template.block.yields, slot, "yield")?;
        let name = symbol.strip_prefix('&').unwrap_or(symbol);
        Ok(self.blocks.get(name))
    }

    pub fn attrs(&self) -> Option<&Rc<Splat>> {
        self.attrs.as_ref()
    }

    fn symbol<'t>(&self, table: &'t [String], slot: Slot, what: &str) -> Result<&'t str, RenderError> {
        table
            .get(slot)
            .map(String::as_str)
            .ok_or_else(|| RenderError::MalformedProgram(format!("no {what} symbol {slot}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile_template, CompileOptions};

    fn scope(source: &str) -> Scope {
        let wire = compile_template(source, &CompileOptions::default()).unwrap();
        Scope::root(Rc::new(wire), Reference::constant(Value::Null))
    }

    #[test]
    fn named_symbols_resolve_without_sigil() {
        let mut named = IndexMap::new();
        named.insert("title".to_string(), Reference::constant("hi"));
        let scope = scope("{{@title}}{{@missing}}").with_named(named);

        assert_eq!(scope.named(0).unwrap().value().unwrap(), Value::from("hi"));
        assert_eq!(scope.named(1).unwrap().value().unwrap(), Value::Null);
        assert!(scope.named(9).is_err());
    }

    #[test]
    fn bind_fills_missing_parameters_with_null() {
        let mut scope = scope("{{#let 1 as |a b|}}{{a}}{{b}}{{/let}}");
        let parameters = scope.block(0).unwrap().parameters.clone();
        scope.bind(&parameters, vec![Reference::constant(1)]);

        assert_eq!(scope.local(parameters[0]).unwrap().value().unwrap(), Value::from(1));
        assert_eq!(scope.local(parameters[1]).unwrap().value().unwrap(), Value::Null);
    }

    #[test]
    fn unbound_locals_are_malformed() {
        let scope = scope("{{#let 1 as |a|}}{{a}}{{/let}}");
        assert!(matches!(scope.local(0), Err(RenderError::MalformedProgram(_))));
    }

    #[test]
    fn yields_resolve_by_name() {
        let caller = scope("x");
        let mut blocks = IndexMap::new();
        blocks.insert(
            "default".to_string(),
            YieldBlock {
                block: 0,
                scope: caller,
            },
        );
        let scope = scope("{{yield}}{{yield to=\"inverse\"}}").with_blocks(blocks);
        assert!(scope.yield_block(0).unwrap().is_some());
        assert!(scope.yield_block(1).unwrap().is_none());
    }
}
