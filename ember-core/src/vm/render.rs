//! Templates and render results.

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::environment::Environment;
use super::interpreter::Interpreter;
use super::opcodes::ChildBlock;
use super::scope::Scope;
use super::RenderState;
use crate::compiler::{compile_template, CompileOptions, WireTemplate};
use crate::dom::{Namespace, NodeId, TreeBuilder};
use crate::error::{Error, RenderError};
use crate::reactive::Reference;
use crate::value::Value;

/// A compiled template, cheap to clone.
#[derive(Clone)]
pub struct Template {
    wire: Rc<WireTemplate>,
}

impl Template {
    /// Parse and compile `source`.
    pub fn compile(source: &str, options: &CompileOptions) -> Result<Self, Error> {
        Ok(Self::from_wire(compile_template(source, options)?))
    }

    pub fn from_wire(wire: WireTemplate) -> Self {
        Self { wire: Rc::new(wire) }
    }

    /// Load a precompiled JSON document.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(Self::from_wire(WireTemplate::from_json(json)?))
    }

    pub fn id(&self) -> &str {
        &self.wire.id
    }

    pub fn wire(&self) -> &WireTemplate {
        &self.wire
    }

    pub(crate) fn shared(&self) -> Rc<WireTemplate> {
        self.wire.clone()
    }

    /// A render result ready to render into `parent`, with `context` as
    /// `this`.
    pub fn instantiate(&self, env: &Environment, parent: NodeId, context: impl Into<Value>) -> RenderResult {
        RenderResult {
            env: env.clone(),
            template: self.clone(),
            parent,
            context: context.into(),
            state: RenderState::Unrendered,
            root: None,
        }
    }

    /// Instantiate and render in one step.
    pub fn render(
        &self,
        env: &Environment,
        dom: &mut dyn TreeBuilder,
        parent: NodeId,
        context: impl Into<Value>,
    ) -> Result<RenderResult, RenderError> {
        let mut result = self.instantiate(env, parent, context);
        result.render(dom)?;
        Ok(result)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template").field("id", &self.wire.id).finish()
    }
}

/// A rendered template and the updating opcodes that keep it current.
///
/// ```text
/// Unrendered -> Rendering -> Rendered <-> Updating
///                               |
///                               v
///                           Destroyed
/// ```
///
/// A failed render returns to `Unrendered` and a failed revalidation to
/// `Rendered`. DOM writes made before the failure are kept.
pub struct RenderResult {
    env: Environment,
    template: Template,
    parent: NodeId,
    context: Value,
    state: RenderState,
    root: Option<ChildBlock>,
}

impl RenderResult {
    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// First and last top-level nodes, once rendered.
    pub fn bounds(&self) -> Option<(NodeId, NodeId)> {
        let bounds = self.root.as_ref()?.bounds();
        Some((bounds.first_node()?, bounds.last_node()?))
    }

    fn check(&self, operation: &'static str, expected: RenderState) -> Result<(), RenderError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RenderError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    pub fn render(&mut self, dom: &mut dyn TreeBuilder) -> Result<(), RenderError> {
        self.check("render", RenderState::Unrendered)?;
        self.state = RenderState::Rendering;
        debug!(template = %self.template.id(), "render");

        let scope = Scope::root(self.template.shared(), Reference::constant(self.context.clone()));
        let mut interpreter = Interpreter::at(&self.env, dom, self.parent, None, Namespace::Html);
        match interpreter.root_block(&scope) {
            Ok(root) => {
                self.root = Some(root);
                self.state = RenderState::Rendered;
                Ok(())
            }
            Err(err) => {
                debug!(template = %self.template.id(), %err, "render failed");
                self.state = RenderState::Unrendered;
                Err(err)
            }
        }
    }

    /// Bring the output up to date with every tag dirtied since the last
    /// pass.
    pub fn revalidate(&mut self, dom: &mut dyn TreeBuilder) -> Result<(), RenderError> {
        self.check("revalidate", RenderState::Rendered)?;
        let runtime = self.env.runtime();
        runtime.begin_revalidation();
        self.state = RenderState::Updating;
        debug!(template = %self.template.id(), revision = runtime.current_revision(), "revalidate");

        let result = match &mut self.root {
            Some(root) => root.evaluate(&self.env, dom),
            None => Ok(()),
        };
        if let Err(err) = &result {
            debug!(template = %self.template.id(), %err, "revalidation failed");
        }
        self.state = RenderState::Rendered;
        result
    }

    /// Run destroy hooks and remove the output.
    pub fn destroy(&mut self, dom: &mut dyn TreeBuilder) -> Result<(), RenderError> {
        if self.state == RenderState::Destroyed {
            return Err(RenderError::InvalidState {
                operation: "destroy",
                state: self.state,
            });
        }
        if let Some(mut root) = self.root.take() {
            root.teardown(dom);
        }
        self.state = RenderState::Destroyed;
        debug!(template = %self.template.id(), "destroyed");
        Ok(())
    }
}

impl fmt::Debug for RenderResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderResult")
            .field("template", &self.template.id())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::SimpleDom;
    use crate::value::TrackedObject;

    fn template(source: &str) -> Template {
        Template::compile(source, &CompileOptions::default()).unwrap()
    }

    #[test]
    fn renders_static_markup() {
        let env = Environment::new();
        let mut dom = SimpleDom::new();
        let root = dom.root();
        template("<p class=\"x\">hi <b>there</b></p>")
            .render(&env, &mut dom, root, Value::Null)
            .unwrap();
        assert_eq!(dom.to_html(), "<p class=\"x\">hi <b>there</b></p>");
    }

    #[test]
    fn state_machine() {
        let env = Environment::new();
        let mut dom = SimpleDom::new();
        let root = dom.root();
        let mut result = template("x").instantiate(&env, root, Value::Null);
        assert_eq!(result.state(), RenderState::Unrendered);
        assert!(matches!(
            result.revalidate(&mut dom),
            Err(RenderError::InvalidState {
                operation: "revalidate",
                ..
            })
        ));

        result.render(&mut dom).unwrap();
        assert_eq!(result.state(), RenderState::Rendered);
        assert!(result.render(&mut dom).is_err());
        result.revalidate(&mut dom).unwrap();
        assert_eq!(result.state(), RenderState::Rendered);

        result.destroy(&mut dom).unwrap();
        assert_eq!(result.state(), RenderState::Destroyed);
        assert_eq!(dom.to_html(), "");
        assert!(result.destroy(&mut dom).is_err());
    }

    #[test]
    fn failed_render_returns_to_unrendered() {
        let env = Environment::new();
        let mut dom = SimpleDom::new();
        let root = dom.root();
        let mut result = template("{{nope 1}}").instantiate(&env, root, Value::Null);
        let err = result.render(&mut dom).unwrap_err();
        assert_eq!(err, RenderError::UnknownHelper("nope".into()));
        assert_eq!(result.state(), RenderState::Unrendered);
    }

    #[test]
    fn failed_revalidation_returns_to_rendered() {
        let env = Environment::builder()
            .helper(
                "strict",
                crate::vm::FnHelper::new(|_, args| match args.at(0) {
                    Value::Null => Err("missing".to_string()),
                    value => Ok(value),
                }),
            )
            .build()
            .unwrap();
        let mut dom = SimpleDom::new();
        let root = dom.root();
        let context: TrackedObject = [("v", Value::from(1))].into_iter().collect();
        let mut result = template("{{strict this.v}}")
            .render(&env, &mut dom, root, context.clone())
            .unwrap();

        context.set(env.runtime(), "v", Value::Null).unwrap();
        let err = result.revalidate(&mut dom).unwrap_err();
        assert!(matches!(err, RenderError::Helper { ref name, .. } if name == "strict"));
        assert_eq!(result.state(), RenderState::Rendered);

        context.set(env.runtime(), "v", 2).unwrap();
        result.revalidate(&mut dom).unwrap();
        assert_eq!(dom.to_html(), "2");
    }

    #[test]
    fn loads_precompiled_json() {
        let wire = compile_template("<i>{{this.x}}</i>", &CompileOptions::default()).unwrap();
        let loaded = Template::from_json(&wire.to_json().unwrap()).unwrap();
        assert_eq!(loaded.id(), wire.id);

        let env = Environment::new();
        let mut dom = SimpleDom::new();
        let root = dom.root();
        let context: TrackedObject = [("x", Value::from("y"))].into_iter().collect();
        loaded.render(&env, &mut dom, root, context).unwrap();
        assert_eq!(dom.to_html(), "<i>y</i>");
    }
}
