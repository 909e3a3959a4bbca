//! Mutation Adapter
//!
//! The notification interface a tree-mutation source drives.

use serde::{Deserialize, Serialize};

use crate::engine::CustomElementEngine;
use crate::registry::CustomElementRegistry;
use crate::state::ElementStateTracker;
use crate::{DocumentId, ElementId};

/// One reported tree mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Element created, not yet in a connected tree
    Create {
        element: ElementId,
        tag_name: String,
        #[serde(default)]
        document: DocumentId,
    },
    /// Element inserted into a connected tree
    Insert { element: ElementId, tag_name: String },
    /// Element removed from a connected tree
    Remove { element: ElementId },
    /// Attribute set; `new_value == None` means removed
    AttributeSet {
        element: ElementId,
        name: String,
        old_value: Option<String>,
        new_value: Option<String>,
        #[serde(default)]
        namespace: Option<String>,
    },
    /// Element moved to another document
    Adopt {
        element: ElementId,
        old_document: DocumentId,
        new_document: DocumentId,
    },
    /// Element object released by the source
    Release { element: ElementId },
}

impl Mutation {
    pub fn element(&self) -> ElementId {
        match self {
            Self::Create { element, .. }
            | Self::Insert { element, .. }
            | Self::Remove { element }
            | Self::AttributeSet { element, .. }
            | Self::Adopt { element, .. }
            | Self::Release { element } => *element,
        }
    }
}

/// Receiver of tree mutations
pub trait MutationSink {
    fn apply(&mut self, mutation: Mutation);

    fn on_create(&mut self, element: ElementId, tag_name: &str, document: DocumentId) {
        self.apply(Mutation::Create { element, tag_name: tag_name.to_string(), document });
    }

    fn on_insert(&mut self, element: ElementId, tag_name: &str) {
        self.apply(Mutation::Insert { element, tag_name: tag_name.to_string() });
    }

    fn on_remove(&mut self, element: ElementId) {
        self.apply(Mutation::Remove { element });
    }

    fn on_attribute_set(
        &mut self,
        element: ElementId,
        name: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
        namespace: Option<&str>,
    ) {
        self.apply(Mutation::AttributeSet {
            element,
            name: name.to_string(),
            old_value: old_value.map(str::to_string),
            new_value: new_value.map(str::to_string),
            namespace: namespace.map(str::to_string),
        });
    }

    fn on_adopt(&mut self, element: ElementId, old_document: DocumentId, new_document: DocumentId) {
        self.apply(Mutation::Adopt { element, old_document, new_document });
    }

    fn on_release(&mut self, element: ElementId) {
        self.apply(Mutation::Release { element });
    }
}

/// Mutations recorded by a callback.
///
/// Applied as soon as the callback returns, except releases, which wait for
/// the end of the checkpoint.
#[derive(Debug, Default)]
pub struct DeferredMutations {
    mutations: Vec<Mutation>,
}

impl DeferredMutations {
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter()
    }

    pub(crate) fn take(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.mutations)
    }
}

impl MutationSink for DeferredMutations {
    fn apply(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }
}

/// A synchronous burst of mutations.
///
/// Mutations collapse into one checkpoint that runs when the batch is
/// dropped (unless the engine is in explicit checkpoint mode).
pub struct MutationBatch<'e> {
    engine: &'e mut CustomElementEngine,
}

impl<'e> MutationBatch<'e> {
    pub(crate) fn new(engine: &'e mut CustomElementEngine) -> Self {
        Self { engine }
    }

    /// Escape hatch for registry access mid-batch
    pub fn engine(&mut self) -> &mut CustomElementEngine {
        self.engine
    }
}

impl MutationSink for MutationBatch<'_> {
    fn apply(&mut self, mutation: Mutation) {
        self.engine.apply(mutation);
    }
}

impl Drop for MutationBatch<'_> {
    fn drop(&mut self) {
        self.engine.end_of_batch();
    }
}

/// Route one mutation to the tracker. Returns true if a reaction was queued.
pub(crate) fn dispatch(tracker: &mut ElementStateTracker, registry: &CustomElementRegistry, mutation: Mutation) -> bool {
    match mutation {
        Mutation::Create { element, tag_name, document } => {
            if tracker.contains(element) {
                tracing::debug!("{:?} created twice, ignoring", element);
                return false;
            }
            tracker.track(element, &tag_name, document);
            tracker.try_upgrade(registry, element)
        }
        Mutation::Insert { element, tag_name } => {
            let instance = tracker.track(element, &tag_name, DocumentId::MAIN);
            if instance.tag_name() != tag_name {
                tracing::debug!(
                    "{:?} inserted as <{}> but tracked as <{}>",
                    element,
                    tag_name,
                    instance.tag_name()
                );
            }
            let upgraded = tracker.try_upgrade(registry, element);
            let connected = tracker.mark_connected(element);
            upgraded || connected
        }
        Mutation::Remove { element } => tracker.mark_disconnected(element),
        Mutation::AttributeSet { element, name, old_value, new_value, namespace } => tracker.record_attribute_change(
            element,
            &name,
            old_value.as_deref(),
            new_value.as_deref(),
            namespace.as_deref(),
        ),
        Mutation::Adopt { element, old_document, new_document } => {
            tracker.record_adoption(element, old_document, new_document)
        }
        Mutation::Release { element } => {
            tracker.release(element);
            false
        }
    }
}
