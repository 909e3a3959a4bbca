//! Custom Element Engine
//!
//! Owns the registry, element state, drainer and error channel, and is the
//! mutation sink a tree-mutation source reports to.

use std::rc::Rc;

use crate::adapter::{self, Mutation, MutationBatch, MutationSink};
use crate::config::{CheckpointMode, EngineConfig};
use crate::drainer::{CheckpointDrainer, CheckpointReport};
use crate::element::ElementConstructor;
use crate::error::{DefinitionError, ErrorChannel, ReactionError};
use crate::registry::{CustomElementDefinition, CustomElementRegistry, ElementDefinitionOptions, WhenDefined};
use crate::state::{ElementStateTracker, InstanceState};
use crate::ElementId;

/// Custom element lifecycle engine
#[derive(Debug)]
pub struct CustomElementEngine {
    config: EngineConfig,
    registry: CustomElementRegistry,
    tracker: ElementStateTracker,
    drainer: CheckpointDrainer,
    errors: ErrorChannel,
    checkpoint_pending: bool,
}

impl Default for CustomElementEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomElementEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        tracing::debug!("Custom element engine created ({:?} checkpoints)", config.checkpoint_mode);
        Self {
            registry: CustomElementRegistry::with_reserved_names(config.reserved_names.clone()),
            tracker: ElementStateTracker::new(),
            drainer: CheckpointDrainer::new(config.catch_panics),
            errors: ErrorChannel::new(),
            checkpoint_pending: false,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &CustomElementRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &ElementStateTracker {
        &self.tracker
    }

    pub fn instance(&self, element: ElementId) -> Option<&InstanceState> {
        self.tracker.get(element)
    }

    /// Define a custom element and queue upgrades for existing elements
    /// with that tag.
    pub fn define(
        &mut self,
        name: &str,
        constructor: impl ElementConstructor + 'static,
        options: ElementDefinitionOptions,
    ) -> Result<(), DefinitionError> {
        self.registry.define(name, constructor, options)?;

        let candidates = self.tracker.upgrade_candidates(name);
        let mut upgraded = 0;
        for element in candidates {
            if self.tracker.try_upgrade(&self.registry, element) {
                upgraded += 1;
            }
        }
        if upgraded > 0 {
            tracing::debug!("{} existing <{}> elements queued for upgrade", upgraded, name);
            self.checkpoint_pending = true;
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<CustomElementDefinition>> {
        self.registry.lookup(name)
    }

    pub fn when_defined(&mut self, name: &str) -> WhenDefined {
        self.registry.when_defined(name)
    }

    /// Start a burst of mutations that ends in one checkpoint
    pub fn batch(&mut self) -> MutationBatch<'_> {
        MutationBatch::new(self)
    }

    pub fn is_checkpoint_pending(&self) -> bool {
        self.checkpoint_pending
    }

    /// Drain every queued reaction once.
    ///
    /// Mutations reported by callbacks update element state as soon as the
    /// callback returns, but their reactions wait for the next checkpoint.
    /// Releases are applied after the checkpoint.
    pub fn perform_checkpoint(&mut self) -> CheckpointReport {
        self.checkpoint_pending = false;
        let (report, releases) = self.drainer.checkpoint(&mut self.tracker, &self.registry, &mut self.errors);
        if report.deferred > 0 {
            self.checkpoint_pending = true;
        }
        for mutation in releases {
            self.apply(mutation);
        }
        report
    }

    /// Run checkpoints until no reactions are queued, at most
    /// `max_checkpoints_per_flush` of them.
    pub fn run_until_idle(&mut self) -> Vec<CheckpointReport> {
        let mut reports = Vec::new();
        while self.tracker.has_pending_reactions() {
            if reports.len() >= self.config.max_checkpoints_per_flush {
                tracing::warn!(
                    "Reactions still pending after {} checkpoints; leaving them for the next flush",
                    reports.len()
                );
                break;
            }
            reports.push(self.perform_checkpoint());
        }
        if !self.tracker.has_pending_reactions() {
            self.checkpoint_pending = false;
        }
        reports
    }

    pub(crate) fn end_of_batch(&mut self) {
        if self.config.checkpoint_mode == CheckpointMode::EndOfBatch && self.checkpoint_pending {
            self.run_until_idle();
        }
    }

    /// Errors reported so far
    pub fn errors(&self) -> &[ReactionError] {
        self.errors.errors()
    }

    pub fn take_errors(&mut self) -> Vec<ReactionError> {
        self.errors.take()
    }

    /// Checkpoints run so far
    pub fn checkpoints(&self) -> u64 {
        self.drainer.checkpoints()
    }
}

impl MutationSink for CustomElementEngine {
    fn apply(&mut self, mutation: Mutation) {
        tracing::debug!("{:?}", mutation);
        adapter::dispatch(&mut self.tracker, &self.registry, mutation);
        self.checkpoint_pending = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{CustomElement, ReactionContext};
    use crate::error::CallbackError;

    struct Empty;

    impl CustomElement for Empty {}

    struct EmptyConstructor;

    impl ElementConstructor for EmptyConstructor {
        fn construct(&self, _ctx: &mut ReactionContext<'_>) -> Result<Box<dyn CustomElement>, CallbackError> {
            Ok(Box::new(Empty))
        }
    }

    #[test]
    fn test_mutations_mark_checkpoint_pending() {
        let mut engine = CustomElementEngine::new();
        assert!(!engine.is_checkpoint_pending());

        engine.on_insert(ElementId(1), "x-none");
        assert!(engine.is_checkpoint_pending());

        engine.perform_checkpoint();
        assert!(!engine.is_checkpoint_pending());
    }

    #[test]
    fn test_define_upgrades_existing_elements() {
        let mut engine = CustomElementEngine::new();
        engine.on_insert(ElementId(1), "x-late");
        engine.perform_checkpoint();

        engine.define("x-late", EmptyConstructor, ElementDefinitionOptions::default()).unwrap();
        assert!(engine.is_checkpoint_pending());
        assert_eq!(engine.instance(ElementId(1)).unwrap().pending_reactions(), 2);

        let report = engine.perform_checkpoint();
        assert_eq!(report.delivered, 2);
    }

    #[test]
    fn test_configured_reserved_name() {
        let config = EngineConfig { reserved_names: vec!["x-host".to_string()], ..EngineConfig::default() };
        let mut engine = CustomElementEngine::with_config(config);

        assert!(matches!(
            engine.define("x-host", EmptyConstructor, ElementDefinitionOptions::default()),
            Err(DefinitionError::InvalidName(_))
        ));
    }

    #[test]
    fn test_explicit_mode_batch_does_not_drain() {
        let config = EngineConfig { checkpoint_mode: CheckpointMode::Explicit, ..EngineConfig::default() };
        let mut engine = CustomElementEngine::with_config(config);
        engine.define("x-a", EmptyConstructor, ElementDefinitionOptions::default()).unwrap();

        {
            let mut batch = engine.batch();
            batch.on_insert(ElementId(1), "x-a");
        }
        assert_eq!(engine.checkpoints(), 0);
        assert_eq!(engine.instance(ElementId(1)).unwrap().pending_reactions(), 2);

        assert_eq!(engine.run_until_idle().len(), 1);
        assert_eq!(engine.checkpoints(), 1);
    }
}
