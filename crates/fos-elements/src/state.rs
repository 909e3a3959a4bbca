//! Element State Tracker
//!
//! Per-element lifecycle bookkeeping and the upgrade algorithm.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::element::CustomElement;
use crate::reaction::{Reaction, ReactionQueue};
use crate::registry::{CustomElementDefinition, CustomElementRegistry};
use crate::{DocumentId, ElementId};

/// Custom element state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomElementState {
    /// Not (yet) bound to a successfully constructed definition
    Uncustomized,
    /// Construction failed; terminal
    Failed,
    /// Constructed; terminal
    Custom,
}

/// Last known attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub namespace: Option<String>,
    pub value: String,
}

/// Per-element state
pub struct InstanceState {
    pub(crate) element: ElementId,
    pub(crate) tag_name: String,
    /// Creation order, drives checkpoint ordering
    pub(crate) sequence: u64,
    pub(crate) state: CustomElementState,
    pub(crate) connected: bool,
    pub(crate) document: DocumentId,
    pub(crate) attributes: Vec<Attribute>,
    pub(crate) definition: Option<Rc<CustomElementDefinition>>,
    pub(crate) object: Option<Box<dyn CustomElement>>,
    pub(crate) queue: ReactionQueue,
    /// Released by the source; kept only until its queue is delivered
    pub(crate) released: bool,
}

impl InstanceState {
    fn new(element: ElementId, tag_name: &str, sequence: u64, document: DocumentId) -> Self {
        Self {
            element,
            tag_name: tag_name.to_string(),
            sequence,
            state: CustomElementState::Uncustomized,
            connected: false,
            document,
            attributes: Vec::new(),
            definition: None,
            object: None,
            queue: ReactionQueue::new(),
            released: false,
        }
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn state(&self) -> CustomElementState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn owner_document(&self) -> DocumentId {
        self.document
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn definition(&self) -> Option<&Rc<CustomElementDefinition>> {
        self.definition.as_ref()
    }

    /// Bound to a definition whose constructor has not run yet
    pub fn is_upgrade_pending(&self) -> bool {
        self.state == CustomElementState::Uncustomized && self.definition.is_some()
    }

    pub fn pending_reactions(&self) -> usize {
        self.queue.len()
    }

    /// Released by the source while reactions were still queued
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Only custom elements, or ones about to be, receive reactions
    fn accepts_reactions(&self) -> bool {
        self.state == CustomElementState::Custom || self.is_upgrade_pending()
    }

    fn set_attribute(&mut self, name: &str, namespace: Option<&str>, value: Option<&str>) {
        let position = self
            .attributes
            .iter()
            .position(|a| a.name == name && a.namespace.as_deref() == namespace);
        match (position, value) {
            (Some(i), Some(value)) => self.attributes[i].value = value.to_string(),
            (Some(i), None) => {
                self.attributes.remove(i);
            }
            (None, Some(value)) => self.attributes.push(Attribute {
                name: name.to_string(),
                namespace: namespace.map(str::to_string),
                value: value.to_string(),
            }),
            (None, None) => {}
        }
    }
}

impl fmt::Debug for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceState")
            .field("element", &self.element)
            .field("tag_name", &self.tag_name)
            .field("sequence", &self.sequence)
            .field("state", &self.state)
            .field("connected", &self.connected)
            .field("document", &self.document)
            .field("attributes", &self.attributes)
            .field("queue", &self.queue)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

/// Owns the state of every tracked element
#[derive(Debug, Default)]
pub struct ElementStateTracker {
    instances: HashMap<ElementId, InstanceState>,
    /// Creation sequence -> element
    order: BTreeMap<u64, ElementId>,
    next_sequence: u64,
}

impl ElementStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve or create the state of `element`
    pub fn track(&mut self, element: ElementId, tag_name: &str, document: DocumentId) -> &mut InstanceState {
        let sequence = &mut self.next_sequence;
        let order = &mut self.order;
        self.instances.entry(element).or_insert_with(|| {
            let instance = InstanceState::new(element, tag_name, *sequence, document);
            order.insert(*sequence, element);
            *sequence += 1;
            tracing::debug!("Tracking <{}> {:?}", tag_name, element);
            instance
        })
    }

    pub fn get(&self, element: ElementId) -> Option<&InstanceState> {
        self.instances.get(&element)
    }

    pub(crate) fn get_mut(&mut self, element: ElementId) -> Option<&mut InstanceState> {
        self.instances.get_mut(&element)
    }

    pub fn contains(&self, element: ElementId) -> bool {
        self.instances.contains_key(&element)
    }

    /// State that still receives events; released elements do not
    fn live_mut(&mut self, element: ElementId) -> Option<&mut InstanceState> {
        self.instances.get_mut(&element).filter(|i| !i.released)
    }

    /// Bind `element` to its registered definition and queue construction.
    ///
    /// Returns false when the element is unknown, already bound or failed,
    /// or its tag is not defined.
    pub fn try_upgrade(&mut self, registry: &CustomElementRegistry, element: ElementId) -> bool {
        let Some(instance) = self.live_mut(element) else {
            return false;
        };
        if instance.state != CustomElementState::Uncustomized || instance.definition.is_some() {
            return false;
        }
        let Some(definition) = registry.lookup(&instance.tag_name) else {
            return false;
        };

        instance.queue.enqueue(Reaction::Upgrade);
        for attribute in &instance.attributes {
            if definition.observes(&attribute.name) {
                instance.queue.enqueue(Reaction::AttributeChanged {
                    name: attribute.name.clone(),
                    old_value: None,
                    new_value: Some(attribute.value.clone()),
                    namespace: attribute.namespace.clone(),
                });
            }
        }
        if instance.connected {
            instance.queue.enqueue(Reaction::Connected);
        }
        instance.definition = Some(definition);

        tracing::debug!("Upgrade queued for <{}> {:?}", instance.tag_name, element);
        true
    }

    /// Returns true if a `Connected` reaction was queued
    pub fn mark_connected(&mut self, element: ElementId) -> bool {
        let Some(instance) = self.live_mut(element) else {
            tracing::debug!("Connect for untracked {:?} ignored", element);
            return false;
        };
        if instance.connected {
            tracing::debug!("{:?} already connected", element);
            return false;
        }
        instance.connected = true;
        Self::enqueue_if_accepted(instance, Reaction::Connected)
    }

    /// Returns true if a `Disconnected` reaction was queued
    pub fn mark_disconnected(&mut self, element: ElementId) -> bool {
        let Some(instance) = self.live_mut(element) else {
            tracing::debug!("Disconnect for untracked {:?} ignored", element);
            return false;
        };
        if !instance.connected {
            return false;
        }
        instance.connected = false;
        Self::enqueue_if_accepted(instance, Reaction::Disconnected)
    }

    /// Record an attribute change; `new_value == None` means removal.
    ///
    /// Returns true if an `AttributeChanged` reaction was queued.
    pub fn record_attribute_change(
        &mut self,
        element: ElementId,
        name: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
        namespace: Option<&str>,
    ) -> bool {
        let Some(instance) = self.live_mut(element) else {
            tracing::debug!("Attribute change for untracked {:?} ignored", element);
            return false;
        };
        instance.set_attribute(name, namespace, new_value);

        let observed = instance.definition.as_ref().is_some_and(|d| d.observes(name));
        if !observed {
            return false;
        }
        Self::enqueue_if_accepted(
            instance,
            Reaction::AttributeChanged {
                name: name.to_string(),
                old_value: old_value.map(str::to_string),
                new_value: new_value.map(str::to_string),
                namespace: namespace.map(str::to_string),
            },
        )
    }

    /// Returns true if an `Adopted` reaction was queued
    pub fn record_adoption(&mut self, element: ElementId, old_document: DocumentId, new_document: DocumentId) -> bool {
        let Some(instance) = self.live_mut(element) else {
            tracing::debug!("Adoption of untracked {:?} ignored", element);
            return false;
        };
        instance.document = new_document;
        Self::enqueue_if_accepted(instance, Reaction::Adopted { old_document, new_document })
    }

    /// Undefined elements with `tag_name`, in creation order
    pub fn upgrade_candidates(&self, tag_name: &str) -> Vec<ElementId> {
        self.order
            .values()
            .filter(|id| {
                self.instances.get(*id).is_some_and(|i| {
                    i.tag_name == tag_name
                        && i.state == CustomElementState::Uncustomized
                        && i.definition.is_none()
                        && !i.released
                })
            })
            .copied()
            .collect()
    }

    /// Forget an element the source has released.
    ///
    /// State with queued reactions stays, flagged as released, until a
    /// checkpoint has delivered them. Returns false for untracked or already
    /// released elements.
    pub fn release(&mut self, element: ElementId) -> bool {
        let Some(instance) = self.live_mut(element) else {
            tracing::debug!("Release of untracked {:?} ignored", element);
            return false;
        };
        if instance.queue.is_empty() {
            self.forget(element);
        } else {
            instance.released = true;
            tracing::debug!(
                "{:?} released with {} pending reactions, kept until delivered",
                element,
                instance.queue.len()
            );
        }
        true
    }

    /// Drop released elements whose queues have been drained
    pub(crate) fn sweep_released(&mut self) -> usize {
        let done: Vec<ElementId> = self
            .instances
            .values()
            .filter(|i| i.released && i.queue.is_empty())
            .map(|i| i.element)
            .collect();
        for element in &done {
            self.forget(*element);
        }
        done.len()
    }

    fn forget(&mut self, element: ElementId) {
        if let Some(instance) = self.instances.remove(&element) {
            self.order.remove(&instance.sequence);
            tracing::debug!("Released <{}> {:?}", instance.tag_name, element);
        }
    }

    /// Drain every non-empty queue, oldest instance first
    pub(crate) fn drain_queues(&mut self) -> Vec<(ElementId, Vec<Reaction>)> {
        let instances = &mut self.instances;
        self.order
            .values()
            .filter_map(|element| {
                let instance = instances.get_mut(element)?;
                (!instance.queue.is_empty()).then(|| (*element, instance.queue.drain_all()))
            })
            .collect()
    }

    /// Tracked elements in creation order
    pub fn creation_order(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.order.values().copied()
    }

    pub fn has_pending_reactions(&self) -> bool {
        self.instances.values().any(|i| !i.queue.is_empty())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn enqueue_if_accepted(instance: &mut InstanceState, reaction: Reaction) -> bool {
        if !instance.accepts_reactions() {
            return false;
        }
        instance.queue.enqueue(reaction);
        true
    }
}
