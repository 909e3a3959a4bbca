//! Custom Element Reactions
//!
//! Pending lifecycle callback invocations and the per-element FIFO holding them.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DocumentId;

/// One pending lifecycle callback invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reaction {
    /// Run the definition's constructor
    Upgrade,
    Connected,
    Disconnected,
    AttributeChanged {
        name: String,
        old_value: Option<String>,
        new_value: Option<String>,
        namespace: Option<String>,
    },
    Adopted {
        old_document: DocumentId,
        new_document: DocumentId,
    },
}

impl Reaction {
    /// Callback this reaction invokes
    pub fn callback(&self) -> LifecycleCallback {
        match self {
            Self::Upgrade => LifecycleCallback::Constructor,
            Self::Connected => LifecycleCallback::Connected,
            Self::Disconnected => LifecycleCallback::Disconnected,
            Self::AttributeChanged { .. } => LifecycleCallback::AttributeChanged,
            Self::Adopted { .. } => LifecycleCallback::Adopted,
        }
    }
}

/// Custom element lifecycle callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleCallback {
    Constructor,
    Connected,
    Disconnected,
    AttributeChanged,
    Adopted,
}

impl LifecycleCallback {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Constructor => "constructor",
            Self::Connected => "connectedCallback",
            Self::Disconnected => "disconnectedCallback",
            Self::AttributeChanged => "attributeChangedCallback",
            Self::Adopted => "adoptedCallback",
        }
    }
}

impl fmt::Display for LifecycleCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Custom element reaction queue
#[derive(Debug, Default)]
pub struct ReactionQueue {
    reactions: VecDeque<Reaction>,
}

impl ReactionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, reaction: Reaction) {
        self.reactions.push_back(reaction);
    }

    /// Take every queued reaction, oldest first, leaving the queue empty.
    /// Anything enqueued afterwards belongs to the next drain.
    pub fn drain_all(&mut self) -> Vec<Reaction> {
        self.reactions.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reaction> {
        self.reactions.iter()
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }
}
