//! The append-mode interpreter.
//!
//! Executes wire statements against the element builder, turning
//! expressions into references and leaving an updating opcode behind for
//! every piece of output that can change.

use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{trace, warn};

use super::arguments::CapturedArgs;
use super::bounds::BlockBounds;
use super::builder::ElementBuilder;
use super::environment::Environment;
use super::list::{ListKey, ListOpcode};
use super::manager::{ResolvedComponent, ResolvedHelper, ResolvedModifier};
use super::opcodes::{
    attribute_value, read, AttributeOpcode, Branch, ChildBlock, ComponentOpcode, ConditionalOpcode, Content,
    ContentOpcode, ModifierOpcode, Snapshot, UpdatingOpcode,
};
use super::scope::{Scope, Splat, YieldBlock};
use crate::compiler::{Params, Slot, WireExpression, WireHash, WireLiteral, WireStatement};
use crate::dom::{Namespace, NodeId, TreeBuilder};
use crate::error::RenderError;
use crate::reactive::{Reference, Runtime};
use crate::value::Value;

type Opcodes = Vec<UpdatingOpcode>;

#[derive(Debug)]
struct PendingModifier {
    name: String,
    modifier: ResolvedModifier,
    args: CapturedArgs,
}

pub(crate) struct Interpreter<'a> {
    env: &'a Environment,
    dom: &'a mut dyn TreeBuilder,
    builder: ElementBuilder,
    /// Modifiers waiting for their element to close, one list per open
    /// element.
    modifiers: Vec<Vec<PendingModifier>>,
}

impl<'a> Interpreter<'a> {
    /// Render into `parent`, before `next` or at the end.
    pub fn at(
        env: &'a Environment,
        dom: &'a mut dyn TreeBuilder,
        parent: NodeId,
        next: Option<NodeId>,
        namespace: Namespace,
    ) -> Self {
        Self {
            env,
            dom,
            builder: ElementBuilder::new(parent, next, namespace),
            modifiers: Vec::new(),
        }
    }

    pub fn env(&self) -> &'a Environment {
        self.env
    }

    fn runtime(&self) -> &'a Runtime {
        self.env.runtime()
    }

    // ------------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------------

    pub fn push_block(&mut self) -> Rc<BlockBounds> {
        self.builder.push_block()
    }

    pub fn pop_block(&mut self) -> Result<Rc<BlockBounds>, RenderError> {
        self.builder.pop_block(self.dom)
    }

    /// Render the template's top-level program into a new block.
    pub fn root_block(&mut self, scope: &Scope) -> Result<ChildBlock, RenderError> {
        let bounds = self.builder.push_block();
        let template = scope.template.clone();
        self.fill(bounds, |this, out| this.execute(&template.block.statements, scope, out))
    }

    /// Render `branch` (or nothing) into a new block at the cursor.
    pub fn child_block(&mut self, branch: Option<&Branch>, params: Vec<Reference>) -> Result<ChildBlock, RenderError> {
        let bounds = self.builder.push_block();
        self.fill(bounds, |this, out| match branch {
            Some(branch) => this.branch(branch, params, out),
            None => Ok(()),
        })
    }

    /// Render `branch` (or nothing) into existing, already cleared bounds.
    pub fn resume_block(
        &mut self,
        bounds: Rc<BlockBounds>,
        branch: Option<&Branch>,
        params: Vec<Reference>,
    ) -> Result<ChildBlock, RenderError> {
        self.builder.resume_block(bounds.clone());
        self.fill(bounds, |this, out| match branch {
            Some(branch) => this.branch(branch, params, out),
            None => Ok(()),
        })
    }

    fn fill<F>(&mut self, bounds: Rc<BlockBounds>, f: F) -> Result<ChildBlock, RenderError>
    where
        F: FnOnce(&mut Self, &mut Opcodes) -> Result<(), RenderError>,
    {
        let mut children = Vec::new();
        f(self, &mut children)?;
        self.builder.pop_block(self.dom)?;
        Ok(ChildBlock::new(bounds, children))
    }

    /// Execute a branch inline, binding `params` over its parameters.
    fn branch(&mut self, branch: &Branch, params: Vec<Reference>, out: &mut Opcodes) -> Result<(), RenderError> {
        let block = branch.scope.block(branch.block)?;
        if params.is_empty() {
            return self.execute(&block.statements, &branch.scope, out);
        }
        let mut scope = branch.scope.clone();
        scope.bind(&block.parameters, params);
        self.execute(&block.statements, &scope, out)
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    pub fn execute(&mut self, statements: &[WireStatement], scope: &Scope, out: &mut Opcodes) -> Result<(), RenderError> {
        for statement in statements {
            self.statement(statement, scope, out)?;
        }
        Ok(())
    }

    fn statement(&mut self, statement: &WireStatement, scope: &Scope, out: &mut Opcodes) -> Result<(), RenderError> {
        match statement {
            WireStatement::Text(text) => {
                let node = self.dom.create_text(text);
                self.builder.append(self.dom, node);
            }
            WireStatement::Comment(text) => {
                let node = self.dom.create_comment(text);
                self.builder.append(self.dom, node);
            }
            WireStatement::Append(expr) => match self.curly_component(expr, scope)? {
                Some((name, component, args)) => {
                    self.component(&name, component, args, None, IndexMap::new(), out)?;
                }
                None => {
                    let reference = self.expression(expr, scope)?;
                    self.content(reference, false, out)?;
                }
            },
            WireStatement::TrustingAppend(expr) => {
                let reference = self.expression(expr, scope)?;
                self.content(reference, true, out)?;
            }
            WireStatement::OpenElement(tag) => {
                self.builder.open_element(self.dom, tag);
                self.modifiers.push(Vec::new());
            }
            WireStatement::StaticAttr { name, value, namespace } => {
                let element = self.constructing()?;
                let namespace = namespace.as_deref().and_then(Namespace::from_uri);
                self.dom.set_attribute(element, name, value, namespace);
            }
            WireStatement::DynamicAttr { name, value, namespace } => {
                self.attribute(name, value, namespace.as_deref(), scope, out)?;
            }
            WireStatement::Modifier { name, params, hash } => {
                let modifier = self
                    .env
                    .modifier(name)
                    .cloned()
                    .ok_or_else(|| RenderError::UnknownModifier(name.clone()))?;
                let args = self.capture(params, hash.as_ref(), scope)?;
                self.modifiers
                    .last_mut()
                    .ok_or_else(|| RenderError::MalformedProgram(format!("modifier `{name}` outside an element")))?
                    .push(PendingModifier {
                        name: name.clone(),
                        modifier,
                        args,
                    });
            }
            WireStatement::FlushElement => {
                self.builder.flush_element(self.dom)?;
            }
            WireStatement::CloseElement => self.close_element(out)?,
            WireStatement::Block {
                name,
                params,
                hash,
                program,
                inverse,
            } => self.block(name, params, hash.as_ref(), *program, *inverse, scope, out)?,
            WireStatement::Component { tag, attrs, args, block } => {
                let component = self
                    .env
                    .component(tag)
                    .cloned()
                    .ok_or_else(|| RenderError::UnknownComponent(tag.clone()))?;
                let mut captured = CapturedArgs::default();
                for (key, value) in args.iter().flat_map(WireHash::iter) {
                    captured.named.insert(key.to_string(), self.expression(value, scope)?);
                }
                let mut blocks = IndexMap::new();
                if let Some(block) = block {
                    blocks.insert(
                        "default".to_string(),
                        YieldBlock {
                            block: *block,
                            scope: scope.clone(),
                        },
                    );
                }
                let splat = (!attrs.is_empty()).then(|| {
                    Rc::new(Splat {
                        statements: attrs.clone(),
                        scope: scope.clone(),
                    })
                });
                self.component(tag, component, captured, splat, blocks, out)?;
            }
            WireStatement::Yield { to, params } => {
                let Some(target) = scope.yield_block(*to)? else {
                    return Ok(());
                };
                let mut refs = Vec::new();
                for param in params.iter().flatten() {
                    refs.push(self.expression(param, scope)?);
                }
                let branch = Branch::new(&target.scope, target.block, refs)?;
                self.branch(&branch, Vec::new(), out)?;
            }
            WireStatement::AttrSplat => {
                if let Some(splat) = scope.attrs().cloned() {
                    self.execute(&splat.statements, &splat.scope, out)?;
                }
            }
        }
        Ok(())
    }

    fn constructing(&self) -> Result<NodeId, RenderError> {
        self.builder
            .constructing()
            .ok_or_else(|| RenderError::MalformedProgram("attribute outside an element".into()))
    }

    fn content(&mut self, reference: Reference, trusting: bool, out: &mut Opcodes) -> Result<(), RenderError> {
        let (value, snapshot) = read(self.runtime(), &reference)?;
        let rendered = Content::of(&value, trusting);
        if reference.is_const() {
            rendered.insert(&mut self.builder, self.dom);
            return Ok(());
        }

        let bounds = self.builder.push_block();
        let text = rendered.insert(&mut self.builder, self.dom);
        self.builder.pop_block(self.dom)?;
        out.push(UpdatingOpcode::Content(ContentOpcode {
            reference,
            trusting,
            snapshot,
            rendered,
            bounds,
            text,
        }));
        Ok(())
    }

    fn attribute(
        &mut self,
        name: &str,
        value: &WireExpression,
        namespace: Option<&str>,
        scope: &Scope,
        out: &mut Opcodes,
    ) -> Result<(), RenderError> {
        let element = self.constructing()?;
        let namespace = namespace.and_then(Namespace::from_uri);
        let reference = self.expression(value, scope)?;
        let (value, snapshot) = read(self.runtime(), &reference)?;
        let current = attribute_value(&value);
        if let Some(text) = &current {
            self.dom.set_attribute(element, name, text, namespace);
        }
        if !reference.is_const() {
            out.push(UpdatingOpcode::Attribute(AttributeOpcode {
                element,
                name: name.to_string(),
                namespace,
                reference,
                snapshot,
                current,
            }));
        }
        Ok(())
    }

    /// Close the element and install its modifiers, now that its children
    /// are in place.
    fn close_element(&mut self, out: &mut Opcodes) -> Result<(), RenderError> {
        let element = self.builder.close_element()?;
        let runtime = self.runtime();
        for pending in self.modifiers.pop().unwrap_or_default() {
            let PendingModifier { name, modifier, args } = pending;
            let (reified, tag) = runtime.track(|| args.reify());
            let reified = reified?;
            let definition = modifier.definition.as_ref();
            let dom = &mut *self.dom;
            runtime
                .untrack(|| modifier.manager.install(definition, dom, element, &reified))
                .map_err(|message| RenderError::User {
                    name: name.clone(),
                    message,
                })?;
            trace!(modifier = %name, "installed modifier");
            out.push(UpdatingOpcode::Modifier(ModifierOpcode {
                name,
                modifier,
                element,
                args,
                snapshot: Snapshot::capture(runtime, tag),
                destroyed: false,
            }));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Block statements
    // ------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn block(
        &mut self,
        name: &str,
        params: &Params,
        hash: Option<&WireHash>,
        program: Option<Slot>,
        inverse: Option<Slot>,
        scope: &Scope,
        out: &mut Opcodes,
    ) -> Result<(), RenderError> {
        trace!(block = name, "executing block");
        let branch = |slot: Option<Slot>, params: Vec<Reference>| -> Result<Option<Branch>, RenderError> {
            slot.map(|slot| Branch::new(scope, slot, params)).transpose()
        };

        match name {
            "if" | "unless" => {
                let condition = self.expression(first_param(name, params)?, scope)?;
                let (program, inverse) = (branch(program, Vec::new())?, branch(inverse, Vec::new())?);
                self.conditional(condition, name == "unless", program, inverse, out)
            }
            "with" => {
                let value = self.expression(first_param(name, params)?, scope)?;
                let program = branch(program, vec![value.clone()])?;
                let inverse = branch(inverse, Vec::new())?;
                self.conditional(value, false, program, inverse, out)
            }
            "let" => {
                let mut values = Vec::new();
                for param in params.iter().flatten() {
                    values.push(self.expression(param, scope)?);
                }
                match branch(program, values)? {
                    Some(program) => self.branch(&program, Vec::new(), out),
                    None => Ok(()),
                }
            }
            "each" => {
                let list = self.expression(first_param(name, params)?, scope)?;
                let key = match hash.and_then(|hash| hash.get("key")) {
                    None => ListKey::parse(None),
                    Some(WireExpression::Literal(WireLiteral::String(key))) => ListKey::parse(Some(key)),
                    Some(_) => return Err(RenderError::invalid_args(name, "`key` must be a string literal")),
                };
                let program = branch(program, Vec::new())?
                    .ok_or_else(|| RenderError::MalformedProgram("`each` without a program".into()))?;
                let inverse = branch(inverse, Vec::new())?;
                let list = ListOpcode::render(self, list, key, program, inverse)?;
                out.push(UpdatingOpcode::List(list));
                Ok(())
            }
            _ => {
                let component = self
                    .env
                    .component(name)
                    .cloned()
                    .ok_or_else(|| RenderError::UnknownComponent(name.to_string()))?;
                let args = self.capture(params, hash, scope)?;
                let mut blocks = IndexMap::new();
                for (target, slot) in [("default", program), ("inverse", inverse)] {
                    if let Some(block) = slot {
                        blocks.insert(
                            target.to_string(),
                            YieldBlock {
                                block,
                                scope: scope.clone(),
                            },
                        );
                    }
                }
                self.component(name, component, args, None, blocks, out)
            }
        }
    }

    fn conditional(
        &mut self,
        condition: Reference,
        negate: bool,
        program: Option<Branch>,
        inverse: Option<Branch>,
        out: &mut Opcodes,
    ) -> Result<(), RenderError> {
        let (value, snapshot) = read(self.runtime(), &condition)?;
        let truthy = value.is_truthy() != negate;
        let branch = if truthy { program.as_ref() } else { inverse.as_ref() };

        if condition.is_const() {
            return match branch {
                Some(branch) => self.branch(branch, Vec::new(), out),
                None => Ok(()),
            };
        }

        let child = self.child_block(branch, Vec::new())?;
        out.push(UpdatingOpcode::Conditional(ConditionalOpcode {
            condition,
            negate,
            snapshot,
            truthy,
            program,
            inverse,
            child,
        }));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------------

    /// `{{foo-bar}}` and `{{foo-bar a=1}}` invoke a component when no
    /// helper of that name exists.
    fn curly_component(
        &self,
        expr: &WireExpression,
        scope: &Scope,
    ) -> Result<Option<(String, ResolvedComponent, CapturedArgs)>, RenderError> {
        let name = match expr {
            WireExpression::GetFree { name, tail } if tail.is_empty() => name,
            WireExpression::Call { name, .. } => name,
            _ => return Ok(None),
        };
        if self.env.has_helper(name) {
            return Ok(None);
        }
        let Some(component) = self.env.component(name).cloned() else {
            return Ok(None);
        };
        let args = match expr {
            WireExpression::Call { params, hash, .. } => self.capture(params, hash.as_ref(), scope)?,
            _ => CapturedArgs::default(),
        };
        Ok(Some((name.clone(), component, args)))
    }

    fn component(
        &mut self,
        name: &str,
        component: ResolvedComponent,
        args: CapturedArgs,
        attrs: Option<Rc<Splat>>,
        blocks: IndexMap<String, YieldBlock>,
        out: &mut Opcodes,
    ) -> Result<(), RenderError> {
        let runtime = self.runtime();
        let (reified, tag) = runtime.track(|| args.reify());
        let reified = reified?;
        let snapshot = Snapshot::capture(runtime, tag);

        let definition = component.definition.as_ref();
        let instance = runtime
            .untrack(|| component.manager.create(definition, runtime, &reified))
            .map_err(|message| RenderError::User {
                name: name.to_string(),
                message,
            })?;
        trace!(component = name, "created component");

        let layout = component.manager.layout(definition);
        if attrs.is_some() && !layout.as_ref().is_some_and(|layout| layout.wire().splats_attributes()) {
            warn!(component = name, "component has no `...attributes`, dropping its attributes and modifiers");
        }

        let mut children = Vec::new();
        match layout {
            Some(layout) => {
                let scope = Scope::root(layout.shared(), Reference::constant(instance.clone()))
                    .with_named(args.named.clone())
                    .with_blocks(blocks)
                    .with_attrs(attrs);
                self.execute(&scope.template.block.statements, &scope, &mut children)?;
            }
            None => {
                if let Some(default) = blocks.get("default") {
                    let branch = Branch::new(&default.scope, default.block, Vec::new())?;
                    self.branch(&branch, Vec::new(), &mut children)?;
                }
            }
        }

        out.push(UpdatingOpcode::Component(ComponentOpcode {
            name: name.to_string(),
            component,
            instance,
            args,
            snapshot,
            children,
            destroyed: false,
        }));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn expression(&self, expr: &WireExpression, scope: &Scope) -> Result<Reference, RenderError> {
        let runtime = self.runtime();
        Ok(match expr {
            WireExpression::Literal(literal) => Reference::constant(literal_value(literal)),
            WireExpression::GetFree { name, tail } => match self.env.helper(name) {
                Some(helper) if tail.is_empty() => self.helper(name, helper.clone(), CapturedArgs::default()),
                _ => scope.self_ref.child(runtime, name).path(runtime, tail),
            },
            WireExpression::GetLocal { slot, tail } => scope.local(*slot)?.path(runtime, tail),
            WireExpression::GetNamed { slot, tail } => scope.named(*slot)?.path(runtime, tail),
            WireExpression::GetThis { tail } => scope.self_ref.path(runtime, tail),
            WireExpression::Call { name, params, hash } => {
                let helper = self
                    .env
                    .helper(name)
                    .cloned()
                    .ok_or_else(|| RenderError::UnknownHelper(name.clone()))?;
                let args = self.capture(params, hash.as_ref(), scope)?;
                self.helper(name, helper, args)
            }
            WireExpression::Concat(parts) => {
                let parts = parts
                    .iter()
                    .map(|part| self.expression(part, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Reference::compute(runtime, move || {
                    let mut joined = String::new();
                    for part in &parts {
                        joined.push_str(&part.value()?.to_display_string());
                    }
                    Ok(Value::from(joined))
                })
            }
            WireExpression::HasBlock(slot) => Reference::constant(scope.yield_block(*slot)?.is_some()),
        })
    }

    fn capture(&self, params: &Params, hash: Option<&WireHash>, scope: &Scope) -> Result<CapturedArgs, RenderError> {
        let mut args = CapturedArgs::default();
        for param in params.iter().flatten() {
            args.positional.push(self.expression(param, scope)?);
        }
        for (key, value) in hash.into_iter().flat_map(WireHash::iter) {
            args.named.insert(key.to_string(), self.expression(value, scope)?);
        }
        Ok(args)
    }

    fn helper(&self, name: &str, helper: ResolvedHelper, args: CapturedArgs) -> Reference {
        let runtime = self.runtime().clone();
        let name = name.to_string();
        Reference::compute(self.runtime(), move || {
            let args = args.reify()?;
            helper
                .manager
                .invoke(helper.definition.as_ref(), &runtime, &args)
                .map_err(|message| RenderError::Helper {
                    name: name.clone(),
                    message,
                })
        })
    }
}

fn first_param<'p>(name: &str, params: &'p Params) -> Result<&'p WireExpression, RenderError> {
    params
        .as_ref()
        .and_then(|params| params.first())
        .ok_or_else(|| RenderError::invalid_args(name, "expects a positional argument"))
}

fn literal_value(literal: &WireLiteral) -> Value {
    match literal {
        WireLiteral::String(s) => Value::from(s.as_str()),
        WireLiteral::Number(n) => Value::Number(*n),
        WireLiteral::Boolean(b) => Value::Bool(*b),
        WireLiteral::Null => Value::Null,
    }
}
