//! Element Implementations
//!
//! The hooks a custom element definition supplies, and the context they run in.

use crate::adapter::DeferredMutations;
use crate::error::CallbackError;
use crate::state::Attribute;
use crate::{DocumentId, ElementId};

/// Lifecycle callbacks of a constructed custom element.
///
/// Every callback defaults to doing nothing.
pub trait CustomElement {
    fn connected_callback(&mut self, _ctx: &mut ReactionContext<'_>) -> Result<(), CallbackError> {
        Ok(())
    }

    fn disconnected_callback(&mut self, _ctx: &mut ReactionContext<'_>) -> Result<(), CallbackError> {
        Ok(())
    }

    fn attribute_changed_callback(
        &mut self,
        _ctx: &mut ReactionContext<'_>,
        _name: &str,
        _old_value: Option<&str>,
        _new_value: Option<&str>,
        _namespace: Option<&str>,
    ) -> Result<(), CallbackError> {
        Ok(())
    }

    fn adopted_callback(
        &mut self,
        _ctx: &mut ReactionContext<'_>,
        _old_document: DocumentId,
        _new_document: DocumentId,
    ) -> Result<(), CallbackError> {
        Ok(())
    }
}

/// Construction step of a definition
pub trait ElementConstructor {
    fn construct(&self, ctx: &mut ReactionContext<'_>) -> Result<Box<dyn CustomElement>, CallbackError>;
}

/// Constructor backed by a closure, see [`from_fn`]
pub struct FnConstructor<F>(F);

impl<F> ElementConstructor for FnConstructor<F>
where
    F: Fn(&mut ReactionContext<'_>) -> Result<Box<dyn CustomElement>, CallbackError>,
{
    fn construct(&self, ctx: &mut ReactionContext<'_>) -> Result<Box<dyn CustomElement>, CallbackError> {
        (self.0)(ctx)
    }
}

/// Wrap a closure as an [`ElementConstructor`]
pub fn from_fn<F>(f: F) -> FnConstructor<F>
where
    F: Fn(&mut ReactionContext<'_>) -> Result<Box<dyn CustomElement>, CallbackError>,
{
    FnConstructor(f)
}

/// What a callback can see and do while it runs
pub struct ReactionContext<'a> {
    element: ElementId,
    tag_name: &'a str,
    connected: bool,
    document: DocumentId,
    attributes: &'a [Attribute],
    mutations: &'a mut DeferredMutations,
}

impl<'a> ReactionContext<'a> {
    pub(crate) fn new(
        element: ElementId,
        tag_name: &'a str,
        connected: bool,
        document: DocumentId,
        attributes: &'a [Attribute],
        mutations: &'a mut DeferredMutations,
    ) -> Self {
        Self { element, tag_name, connected, document, attributes, mutations }
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn tag_name(&self) -> &str {
        self.tag_name
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn owner_document(&self) -> DocumentId {
        self.document
    }

    /// Last known value of a non-namespaced attribute
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn attributes(&self) -> &[Attribute] {
        self.attributes
    }

    /// Mutations reported here take effect after the callback returns;
    /// their reactions run at the next checkpoint.
    pub fn mutations(&mut self) -> &mut DeferredMutations {
        self.mutations
    }
}
