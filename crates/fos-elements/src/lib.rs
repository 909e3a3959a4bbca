//! fOS Custom Elements
//!
//! Custom element registry and lifecycle reaction engine.
//!
//! Features:
//! - Registry with one-time definitions and `whenDefined` futures
//! - Per-element lifecycle state (uncustomized, custom, failed)
//! - Per-element reaction queues drained at checkpoints
//! - Mutation adapter for an external tree-mutation source
//!
//! # Example
//! ```rust,ignore
//! use fos_elements::{CustomElementEngine, ElementDefinitionOptions, ElementId, MutationSink};
//!
//! let mut engine = CustomElementEngine::new();
//! engine.define("x-badge", BadgeConstructor, ElementDefinitionOptions::observing(["label"]))?;
//!
//! let mut batch = engine.batch();
//! batch.on_insert(ElementId(1), "x-badge");
//! batch.on_attribute_set(ElementId(1), "label", None, Some("new"), None);
//! drop(batch); // checkpoint: construct, connectedCallback, attributeChangedCallback
//! ```

mod adapter;
mod config;
mod drainer;
mod element;
mod engine;
mod error;
mod reaction;
mod registry;
mod state;

pub use adapter::{DeferredMutations, Mutation, MutationBatch, MutationSink};
pub use config::{CheckpointMode, EngineConfig};
pub use drainer::{CheckpointDrainer, CheckpointReport};
pub use element::{CustomElement, ElementConstructor, FnConstructor, ReactionContext, from_fn};
pub use engine::CustomElementEngine;
pub use error::{CallbackError, ConfigError, DefinitionError, ErrorChannel, ReactionError};
pub use reaction::{LifecycleCallback, Reaction, ReactionQueue};
pub use registry::{
    CustomElementDefinition, CustomElementRegistry, ElementDefinitionOptions, WhenDefined,
    is_valid_custom_element_name,
};
pub use state::{Attribute, CustomElementState, ElementStateTracker, InstanceState};

use serde::{Deserialize, Serialize};

/// Element identifier (opaque handle owned by the tree-mutation source)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u32);

/// Document identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u32);

impl DocumentId {
    /// The document elements belong to unless told otherwise
    pub const MAIN: DocumentId = DocumentId(0);
}
