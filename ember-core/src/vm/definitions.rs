//! Closure-backed definitions and their managers.
//!
//! These cover what most applications need without writing a manager:
//! [`FnHelper`], [`FnModifier`], [`FnComponent`] and [`TemplateOnly`].

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use super::arguments::Arguments;
use super::manager::{Capabilities, ComponentManager, HelperManager, ModifierManager};
use super::render::Template;
use crate::dom::{NodeId, TreeBuilder};
use crate::reactive::Runtime;
use crate::value::Value;

type HelperFn = dyn Fn(&Runtime, &Arguments) -> Result<Value, String>;
type ModifierFn = dyn Fn(&mut dyn TreeBuilder, NodeId, &Arguments) -> Result<(), String>;
type TeardownFn = dyn Fn(&mut dyn TreeBuilder, NodeId);
type CreateFn = dyn Fn(&Runtime, &Arguments) -> Result<Value, String>;
type UpdateFn = dyn Fn(&Value, &Arguments) -> Result<(), String>;
type DestroyFn = dyn Fn(&Value);

fn wrong_definition(expected: &str) -> String {
    format!("definition is not a {expected}")
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// A helper implemented by a closure.
#[derive(Clone)]
pub struct FnHelper(Rc<HelperFn>);

impl FnHelper {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Runtime, &Arguments) -> Result<Value, String> + 'static,
    {
        Self(Rc::new(f))
    }
}

impl fmt::Debug for FnHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHelper")
    }
}

#[derive(Debug)]
pub struct FnHelperManager;

impl HelperManager for FnHelperManager {
    fn capabilities(&self) -> Option<Capabilities> {
        Some(Capabilities::new("3.13"))
    }

    fn invoke(&self, definition: &dyn Any, runtime: &Runtime, args: &Arguments) -> Result<Value, String> {
        let helper = definition
            .downcast_ref::<FnHelper>()
            .ok_or_else(|| wrong_definition("FnHelper"))?;
        (helper.0)(runtime, args)
    }
}

// ----------------------------------------------------------------------------
// Modifiers
// ----------------------------------------------------------------------------

/// A modifier implemented by closures. Without an update closure the
/// install closure re-runs when arguments change.
#[derive(Clone)]
pub struct FnModifier {
    install: Rc<ModifierFn>,
    update: Option<Rc<ModifierFn>>,
    destroy: Option<Rc<TeardownFn>>,
}

impl FnModifier {
    pub fn new<F>(install: F) -> Self
    where
        F: Fn(&mut dyn TreeBuilder, NodeId, &Arguments) -> Result<(), String> + 'static,
    {
        Self {
            install: Rc::new(install),
            update: None,
            destroy: None,
        }
    }

    pub fn on_update<F>(mut self, update: F) -> Self
    where
        F: Fn(&mut dyn TreeBuilder, NodeId, &Arguments) -> Result<(), String> + 'static,
    {
        self.update = Some(Rc::new(update));
        self
    }

    pub fn on_destroy<F>(mut self, destroy: F) -> Self
    where
        F: Fn(&mut dyn TreeBuilder, NodeId) + 'static,
    {
        self.destroy = Some(Rc::new(destroy));
        self
    }
}

impl fmt::Debug for FnModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModifier")
            .field("update", &self.update.is_some())
            .field("destroy", &self.destroy.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct FnModifierManager;

impl FnModifierManager {
    fn definition(definition: &dyn Any) -> Result<&FnModifier, String> {
        definition
            .downcast_ref::<FnModifier>()
            .ok_or_else(|| wrong_definition("FnModifier"))
    }
}

impl ModifierManager for FnModifierManager {
    fn capabilities(&self) -> Option<Capabilities> {
        Some(Capabilities::new("3.22").with_update_hook().with_destructor())
    }

    fn install(
        &self,
        definition: &dyn Any,
        dom: &mut dyn TreeBuilder,
        element: NodeId,
        args: &Arguments,
    ) -> Result<(), String> {
        (Self::definition(definition)?.install)(dom, element, args)
    }

    fn update(
        &self,
        definition: &dyn Any,
        dom: &mut dyn TreeBuilder,
        element: NodeId,
        args: &Arguments,
    ) -> Result<(), String> {
        let modifier = Self::definition(definition)?;
        match &modifier.update {
            Some(update) => update(dom, element, args),
            None => (modifier.install)(dom, element, args),
        }
    }

    fn destroy(&self, definition: &dyn Any, dom: &mut dyn TreeBuilder, element: NodeId) {
        if let Ok(FnModifier {
            destroy: Some(destroy), ..
        }) = Self::definition(definition)
        {
            destroy(dom, element);
        }
    }
}

// ----------------------------------------------------------------------------
// Components
// ----------------------------------------------------------------------------

/// A component with a layout and no instance: `this` is null inside it.
#[derive(Clone)]
pub struct TemplateOnly {
    layout: Template,
}

impl TemplateOnly {
    pub fn new(layout: Template) -> Self {
        Self { layout }
    }
}

impl fmt::Debug for TemplateOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateOnly").field("layout", &self.layout.id()).finish()
    }
}

#[derive(Debug)]
pub struct TemplateOnlyManager;

impl ComponentManager for TemplateOnlyManager {
    fn capabilities(&self) -> Option<Capabilities> {
        Some(Capabilities::new("3.13"))
    }

    fn create(&self, _definition: &dyn Any, _runtime: &Runtime, _args: &Arguments) -> Result<Value, String> {
        Ok(Value::Null)
    }

    fn layout(&self, definition: &dyn Any) -> Option<Template> {
        definition
            .downcast_ref::<TemplateOnly>()
            .map(|component| component.layout.clone())
    }
}

/// A component whose instance is built by a closure.
#[derive(Clone)]
pub struct FnComponent {
    layout: Option<Template>,
    create: Rc<CreateFn>,
    update: Option<Rc<UpdateFn>>,
    destroy: Option<Rc<DestroyFn>>,
}

impl FnComponent {
    pub fn new<F>(layout: impl Into<Option<Template>>, create: F) -> Self
    where
        F: Fn(&Runtime, &Arguments) -> Result<Value, String> + 'static,
    {
        Self {
            layout: layout.into(),
            create: Rc::new(create),
            update: None,
            destroy: None,
        }
    }

    pub fn on_update<F>(mut self, update: F) -> Self
    where
        F: Fn(&Value, &Arguments) -> Result<(), String> + 'static,
    {
        self.update = Some(Rc::new(update));
        self
    }

    pub fn on_destroy<F>(mut self, destroy: F) -> Self
    where
        F: Fn(&Value) + 'static,
    {
        self.destroy = Some(Rc::new(destroy));
        self
    }
}

impl fmt::Debug for FnComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnComponent")
            .field("layout", &self.layout.as_ref().map(Template::id))
            .finish()
    }
}

#[derive(Debug)]
pub struct FnComponentManager;

impl FnComponentManager {
    fn definition(definition: &dyn Any) -> Result<&FnComponent, String> {
        definition
            .downcast_ref::<FnComponent>()
            .ok_or_else(|| wrong_definition("FnComponent"))
    }
}

impl ComponentManager for FnComponentManager {
    fn capabilities(&self) -> Option<Capabilities> {
        Some(Capabilities::new("3.13").with_update_hook().with_destructor())
    }

    fn create(&self, definition: &dyn Any, runtime: &Runtime, args: &Arguments) -> Result<Value, String> {
        (Self::definition(definition)?.create)(runtime, args)
    }

    fn update(&self, definition: &dyn Any, instance: &Value, args: &Arguments) -> Result<(), String> {
        match &Self::definition(definition)?.update {
            Some(update) => update(instance, args),
            None => Ok(()),
        }
    }

    fn destroy(&self, definition: &dyn Any, instance: &Value) {
        if let Ok(FnComponent {
            destroy: Some(destroy), ..
        }) = Self::definition(definition)
        {
            destroy(instance);
        }
    }

    fn layout(&self, definition: &dyn Any) -> Option<Template> {
        Self::definition(definition).ok().and_then(|c| c.layout.clone())
    }
}
