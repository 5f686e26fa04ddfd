//! Managers
//!
//! A definition (a helper, modifier or component value) says *what* to
//! run; its manager says *how*. Managers are looked up by the definition's
//! Rust type once, when the definition is registered with an
//! [`Environment`](super::Environment). An [`Owner`] may supply managers
//! first; the built-in registry is consulted after it.
//!
//! Every manager declares a [`Capabilities`] marker naming the manager API
//! version it was written against. A manager without one, or with an
//! unknown version, is rejected at registration.

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::arguments::Arguments;
use super::render::Template;
use crate::dom::{NodeId, TreeBuilder};
use crate::error::ManagerError;
use crate::reactive::Runtime;
use crate::value::Value;

/// Manager API versions this VM understands.
pub const SUPPORTED_API_VERSIONS: &[&str] = &["3.13", "3.22"];

/// What a manager supports, tagged with the API version it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    api_version: String,
    update_hook: bool,
    destructor: bool,
}

impl Capabilities {
    pub fn new(api_version: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            update_hook: false,
            destructor: false,
        }
    }

    /// Call the manager's `update` when arguments change.
    pub fn with_update_hook(mut self) -> Self {
        self.update_hook = true;
        self
    }

    /// Call the manager's `destroy` on teardown.
    pub fn with_destructor(mut self) -> Self {
        self.destructor = true;
        self
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn update_hook(&self) -> bool {
        self.update_hook
    }

    pub fn destructor(&self) -> bool {
        self.destructor
    }
}

pub trait HelperManager: fmt::Debug {
    fn capabilities(&self) -> Option<Capabilities>;

    fn invoke(&self, definition: &dyn Any, runtime: &Runtime, args: &Arguments) -> Result<Value, String>;
}

pub trait ModifierManager: fmt::Debug {
    fn capabilities(&self) -> Option<Capabilities>;

    /// Called once the element and its children are in the tree.
    fn install(
        &self,
        definition: &dyn Any,
        dom: &mut dyn TreeBuilder,
        element: NodeId,
        args: &Arguments,
    ) -> Result<(), String>;

    /// Called when any argument changed.
    fn update(
        &self,
        definition: &dyn Any,
        dom: &mut dyn TreeBuilder,
        element: NodeId,
        args: &Arguments,
    ) -> Result<(), String>;

    fn destroy(&self, _definition: &dyn Any, _dom: &mut dyn TreeBuilder, _element: NodeId) {}
}

pub trait ComponentManager: fmt::Debug {
    fn capabilities(&self) -> Option<Capabilities>;

    /// Create the instance. It becomes `this` inside the layout.
    fn create(&self, definition: &dyn Any, runtime: &Runtime, args: &Arguments) -> Result<Value, String>;

    /// Only called when the capabilities include the update hook.
    fn update(&self, _definition: &dyn Any, _instance: &Value, _args: &Arguments) -> Result<(), String> {
        Ok(())
    }

    /// Only called when the capabilities include the destructor.
    fn destroy(&self, _definition: &dyn Any, _instance: &Value) {}

    /// The template to render. Without one the component yields its block.
    fn layout(&self, definition: &dyn Any) -> Option<Template>;
}

/// A manager of any kind.
#[derive(Debug, Clone)]
pub enum Manager {
    Helper(Rc<dyn HelperManager>),
    Modifier(Rc<dyn ModifierManager>),
    Component(Rc<dyn ComponentManager>),
}

impl Manager {
    fn kind(&self) -> &'static str {
        match self {
            Manager::Helper(_) => "helper",
            Manager::Modifier(_) => "modifier",
            Manager::Component(_) => "component",
        }
    }

    fn capabilities(&self) -> Option<Capabilities> {
        match self {
            Manager::Helper(m) => m.capabilities(),
            Manager::Modifier(m) => m.capabilities(),
            Manager::Component(m) => m.capabilities(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Manager::Helper(m) => format!("{m:?}"),
            Manager::Modifier(m) => format!("{m:?}"),
            Manager::Component(m) => format!("{m:?}"),
        }
    }
}

/// External source of managers, consulted before the built-in registry.
pub trait Owner {
    fn lookup_manager(&self, definition: &dyn Any) -> Option<Manager>;
}

/// A definition bound to its validated manager.
pub(crate) struct Resolved<M: ?Sized> {
    pub definition: Rc<dyn Any>,
    pub manager: Rc<M>,
    pub capabilities: Capabilities,
}

impl<M: ?Sized> Clone for Resolved<M> {
    fn clone(&self) -> Self {
        Self {
            definition: self.definition.clone(),
            manager: self.manager.clone(),
            capabilities: self.capabilities.clone(),
        }
    }
}

impl<M: ?Sized + fmt::Debug> fmt::Debug for Resolved<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("manager", &self.manager)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

pub(crate) type ResolvedHelper = Resolved<dyn HelperManager>;
pub(crate) type ResolvedModifier = Resolved<dyn ModifierManager>;
pub(crate) type ResolvedComponent = Resolved<dyn ComponentManager>;

/// Managers keyed by definition type.
#[derive(Default)]
pub(crate) struct ManagerRegistry {
    managers: IndexMap<TypeId, Manager>,
}

impl ManagerRegistry {
    pub fn register<D: 'static>(&mut self, manager: Manager) {
        self.managers.insert(TypeId::of::<D>(), manager);
    }

    fn lookup<D: 'static>(&self, owner: Option<&dyn Owner>, definition: &D) -> Option<Manager> {
        owner
            .and_then(|owner| owner.lookup_manager(definition))
            .or_else(|| self.managers.get(&TypeId::of::<D>()).cloned())
    }

    pub fn resolve<D: 'static>(
        &self,
        owner: Option<&dyn Owner>,
        kind: &'static str,
        definition: D,
    ) -> Result<(Rc<dyn Any>, Manager, Capabilities), ManagerError> {
        let manager = self
            .lookup(owner, &definition)
            .ok_or(ManagerError::MissingManager {
                kind,
                definition: std::any::type_name::<D>(),
            })?;

        if manager.kind() != kind {
            return Err(ManagerError::InvalidManager {
                kind,
                manager: manager.describe(),
                reason: format!("it is a {} manager", manager.kind()),
            });
        }

        let capabilities = validate(&manager)?;
        Ok((Rc::new(definition), manager, capabilities))
    }
}

impl fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("managers", &self.managers.len())
            .finish()
    }
}

fn validate(manager: &Manager) -> Result<Capabilities, ManagerError> {
    let invalid = |reason: String| ManagerError::InvalidManager {
        kind: manager.kind(),
        manager: manager.describe(),
        reason,
    };
    let capabilities = manager
        .capabilities()
        .ok_or_else(|| invalid("capabilities() returned no capabilities marker".to_string()))?;
    if !SUPPORTED_API_VERSIONS.contains(&capabilities.api_version()) {
        return Err(invalid(format!(
            "unsupported manager API version `{}`",
            capabilities.api_version()
        )));
    }
    Ok(capabilities)
}
