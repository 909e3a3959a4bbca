//! Errors
//!
//! Definition errors are returned to the caller of `define`. Reaction errors
//! are reported through the [`ErrorChannel`] while a checkpoint drains.

use std::any::Any;

use crate::ElementId;
use crate::reaction::LifecycleCallback;

/// Custom element definition errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("Invalid custom element name: {0}")]
    InvalidName(String),

    #[error("Element already defined: {0}")]
    AlreadyDefined(String),

    #[error("Cannot extend element: {0}")]
    InvalidExtends(String),
}

/// Error raised by an element constructor or lifecycle callback
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CallbackError {
    message: String,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// Build from a caught panic payload
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("panicked: {}", s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("panicked: {}", s)
        } else {
            "panicked".to_string()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Failure reported while delivering reactions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReactionError {
    /// Constructor failed; the element is permanently `Failed`
    #[error("Construction of <{tag_name}> {element:?} failed: {source} ({dropped} pending reactions dropped)")]
    ConstructionFailure {
        element: ElementId,
        tag_name: String,
        dropped: usize,
        #[source]
        source: CallbackError,
    },

    /// Lifecycle callback failed; delivery continues
    #[error("{callback} of <{tag_name}> {element:?} failed: {source}")]
    CallbackFailure {
        element: ElementId,
        tag_name: String,
        callback: LifecycleCallback,
        #[source]
        source: CallbackError,
    },
}

impl ReactionError {
    pub fn element(&self) -> ElementId {
        match self {
            Self::ConstructionFailure { element, .. } | Self::CallbackFailure { element, .. } => *element,
        }
    }

    pub fn is_construction_failure(&self) -> bool {
        matches!(self, Self::ConstructionFailure { .. })
    }
}

/// Engine configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid engine config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("max_checkpoints_per_flush must be at least 1")]
    ZeroCheckpointBudget,
}

/// Collects reaction errors until the embedder takes them
#[derive(Debug, Default)]
pub struct ErrorChannel {
    errors: Vec<ReactionError>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an error
    pub fn report(&mut self, error: ReactionError) {
        tracing::warn!(element = error.element().0, "{}", error);
        self.errors.push(error);
    }

    /// Take all reported errors
    pub fn take(&mut self) -> Vec<ReactionError> {
        std::mem::take(&mut self.errors)
    }

    pub fn errors(&self) -> &[ReactionError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payload_message() {
        let err = CallbackError::from_panic(Box::new("boom"));
        assert_eq!(err.message(), "panicked: boom");

        let err = CallbackError::from_panic(Box::new(String::from("bad state")));
        assert_eq!(err.message(), "panicked: bad state");

        let err = CallbackError::from_panic(Box::new(42u8));
        assert_eq!(err.message(), "panicked");
    }

    #[test]
    fn test_error_channel_take() {
        let mut channel = ErrorChannel::new();
        channel.report(ReactionError::CallbackFailure {
            element: ElementId(3),
            tag_name: "x-item".to_string(),
            callback: LifecycleCallback::Connected,
            source: CallbackError::new("nope"),
        });

        assert_eq!(channel.len(), 1);
        let errors = channel.take();
        assert_eq!(errors[0].element(), ElementId(3));
        assert!(!errors[0].is_construction_failure());
        assert!(channel.is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = ReactionError::ConstructionFailure {
            element: ElementId(1),
            tag_name: "x-card".to_string(),
            dropped: 2,
            source: CallbackError::new("missing slot"),
        };
        assert_eq!(
            err.to_string(),
            "Construction of <x-card> ElementId(1) failed: missing slot (2 pending reactions dropped)"
        );
    }
}
