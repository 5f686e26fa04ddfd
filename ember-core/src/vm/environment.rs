//! Rendering environment: the runtime plus every helper, modifier and
//! component a template can name.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use super::builtins;
use super::definitions::{
    FnComponent, FnComponentManager, FnHelper, FnHelperManager, FnModifier, FnModifierManager, TemplateOnly,
    TemplateOnlyManager,
};
use super::manager::{
    Capabilities, ComponentManager, HelperManager, Manager, ManagerRegistry, ModifierManager, Owner, Resolved,
    ResolvedComponent, ResolvedHelper, ResolvedModifier,
};
use crate::error::ManagerError;
use crate::reactive::Runtime;

struct EnvInner {
    runtime: Runtime,
    helpers: IndexMap<String, ResolvedHelper>,
    modifiers: IndexMap<String, ResolvedModifier>,
    components: IndexMap<String, ResolvedComponent>,
}

/// Shared handle to a configured environment.
#[derive(Clone)]
pub struct Environment {
    inner: Rc<EnvInner>,
}

impl Environment {
    /// An environment with only the built-in helpers and a fresh runtime.
    pub fn new() -> Self {
        Self::builder().build_infallible()
    }

    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::new()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub(crate) fn helper(&self, name: &str) -> Option<&ResolvedHelper> {
        self.inner.helpers.get(name)
    }

    pub(crate) fn modifier(&self, name: &str) -> Option<&ResolvedModifier> {
        self.inner.modifiers.get(name)
    }

    pub(crate) fn component(&self, name: &str) -> Option<&ResolvedComponent> {
        self.inner.components.get(name)
    }

    pub fn has_helper(&self, name: &str) -> bool {
        self.inner.helpers.contains_key(name)
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.inner.components.contains_key(name)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("helpers", &self.inner.helpers.keys().collect::<Vec<_>>())
            .field("modifiers", &self.inner.modifiers.keys().collect::<Vec<_>>())
            .field("components", &self.inner.components.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builds an [`Environment`].
///
/// Definitions are resolved to their managers as they are registered, so
/// register custom managers and the owner before the definitions that
/// need them. The first resolution failure is reported by
/// [`EnvironmentBuilder::build`].
pub struct EnvironmentBuilder {
    runtime: Option<Runtime>,
    owner: Option<Rc<dyn Owner>>,
    registry: ManagerRegistry,
    helpers: IndexMap<String, ResolvedHelper>,
    modifiers: IndexMap<String, ResolvedModifier>,
    components: IndexMap<String, ResolvedComponent>,
    error: Option<ManagerError>,
}

impl EnvironmentBuilder {
    fn new() -> Self {
        let mut registry = ManagerRegistry::default();
        registry.register::<FnHelper>(Manager::Helper(Rc::new(FnHelperManager)));
        registry.register::<FnModifier>(Manager::Modifier(Rc::new(FnModifierManager)));
        registry.register::<TemplateOnly>(Manager::Component(Rc::new(TemplateOnlyManager)));
        registry.register::<FnComponent>(Manager::Component(Rc::new(FnComponentManager)));

        let mut builder = Self {
            runtime: None,
            owner: None,
            registry,
            helpers: IndexMap::new(),
            modifiers: IndexMap::new(),
            components: IndexMap::new(),
            error: None,
        };
        for (name, helper) in builtins::helpers() {
            builder = builder.helper(name, helper);
        }
        builder
    }

    /// Render against an existing runtime instead of a fresh one.
    pub fn runtime(mut self, runtime: Runtime) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn owner(mut self, owner: Rc<dyn Owner>) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn helper_manager<D: 'static>(mut self, manager: Rc<dyn HelperManager>) -> Self {
        self.registry.register::<D>(Manager::Helper(manager));
        self
    }

    pub fn modifier_manager<D: 'static>(mut self, manager: Rc<dyn ModifierManager>) -> Self {
        self.registry.register::<D>(Manager::Modifier(manager));
        self
    }

    pub fn component_manager<D: 'static>(mut self, manager: Rc<dyn ComponentManager>) -> Self {
        self.registry.register::<D>(Manager::Component(manager));
        self
    }

    pub fn helper<D: 'static>(mut self, name: impl Into<String>, definition: D) -> Self {
        match self.resolve("helper", definition) {
            Ok((definition, Manager::Helper(manager), capabilities)) => {
                self.helpers.insert(
                    name.into(),
                    Resolved {
                        definition,
                        manager,
                        capabilities,
                    },
                );
            }
            Ok(_) => {}
            Err(err) => self.fail(err),
        }
        self
    }

    pub fn modifier<D: 'static>(mut self, name: impl Into<String>, definition: D) -> Self {
        match self.resolve("modifier", definition) {
            Ok((definition, Manager::Modifier(manager), capabilities)) => {
                self.modifiers.insert(
                    name.into(),
                    Resolved {
                        definition,
                        manager,
                        capabilities,
                    },
                );
            }
            Ok(_) => {}
            Err(err) => self.fail(err),
        }
        self
    }

    pub fn component<D: 'static>(mut self, name: impl Into<String>, definition: D) -> Self {
        match self.resolve("component", definition) {
            Ok((definition, Manager::Component(manager), capabilities)) => {
                self.components.insert(
                    name.into(),
                    Resolved {
                        definition,
                        manager,
                        capabilities,
                    },
                );
            }
            Ok(_) => {}
            Err(err) => self.fail(err),
        }
        self
    }

    pub fn build(mut self) -> Result<Environment, ManagerError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        Ok(self.build_infallible())
    }

    fn build_infallible(self) -> Environment {
        debug!(
            helpers = self.helpers.len(),
            modifiers = self.modifiers.len(),
            components = self.components.len(),
            "built environment"
        );
        Environment {
            inner: Rc::new(EnvInner {
                runtime: self.runtime.unwrap_or_default(),
                helpers: self.helpers,
                modifiers: self.modifiers,
                components: self.components,
            }),
        }
    }

    fn resolve<D: 'static>(
        &self,
        kind: &'static str,
        definition: D,
    ) -> Result<(Rc<dyn Any>, Manager, Capabilities), ManagerError> {
        self.registry.resolve(self.owner.as_deref(), kind, definition)
    }

    fn fail(&mut self, err: ManagerError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

impl fmt::Debug for EnvironmentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentBuilder")
            .field("registry", &self.registry)
            .field("error", &self.error)
            .finish()
    }
}
