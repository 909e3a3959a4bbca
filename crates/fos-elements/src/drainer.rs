//! Checkpoint Drainer
//!
//! Drains every element's reaction queue at a checkpoint and invokes the
//! definition callbacks. A failing callback is reported and delivery moves on.

use std::panic::{self, AssertUnwindSafe};

use crate::adapter::{self, DeferredMutations, Mutation};
use crate::element::ReactionContext;
use crate::error::{CallbackError, ErrorChannel, ReactionError};
use crate::reaction::{LifecycleCallback, Reaction};
use crate::registry::CustomElementRegistry;
use crate::state::{CustomElementState, ElementStateTracker, InstanceState};

/// Outcome of one checkpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointReport {
    /// Checkpoint number, starting at 1
    pub sequence: u64,
    /// Elements with at least one drained reaction
    pub instances: usize,
    /// Reactions whose callback ran successfully
    pub delivered: usize,
    /// Callbacks and constructors that failed
    pub failures: usize,
    /// Reactions skipped because their element failed to construct
    pub dropped: usize,
    /// Mutations reported by callbacks during this checkpoint, including
    /// the releases handed back to the caller
    pub deferred: usize,
}

enum DeliveryFailure {
    Construction(CallbackError),
    Callback(LifecycleCallback, CallbackError),
}

/// Drains reaction queues in element creation order
#[derive(Debug, Default)]
pub struct CheckpointDrainer {
    checkpoints: u64,
    catch_panics: bool,
}

impl CheckpointDrainer {
    pub fn new(catch_panics: bool) -> Self {
        Self { checkpoints: 0, catch_panics }
    }

    /// Checkpoints run so far
    pub fn checkpoints(&self) -> u64 {
        self.checkpoints
    }

    /// Run one checkpoint.
    ///
    /// Every queue is drained up front. Mutations a callback reports are
    /// applied to the tracker as soon as it returns, so their reactions wait
    /// for the next checkpoint. Releases are held back and returned for the
    /// caller to apply once this checkpoint is over.
    pub fn checkpoint(
        &mut self,
        tracker: &mut ElementStateTracker,
        registry: &CustomElementRegistry,
        errors: &mut ErrorChannel,
    ) -> (CheckpointReport, Vec<Mutation>) {
        self.checkpoints += 1;
        let span = tracing::debug_span!("checkpoint", sequence = self.checkpoints);
        let _enter = span.enter();

        let mut report = CheckpointReport { sequence: self.checkpoints, ..CheckpointReport::default() };
        let mut deferred = DeferredMutations::default();
        let mut releases = Vec::new();

        for (element, reactions) in tracker.drain_queues() {
            report.instances += 1;
            let mut pending = reactions.into_iter();

            while let Some(reaction) = pending.next() {
                let Some(instance) = tracker.get_mut(element) else {
                    break;
                };
                if instance.state == CustomElementState::Failed {
                    report.dropped += 1 + pending.len();
                    break;
                }

                let stop = match self.deliver(instance, reaction, &mut deferred) {
                    Ok(()) => {
                        report.delivered += 1;
                        false
                    }
                    Err(DeliveryFailure::Construction(source)) => {
                        let dropped = pending.len();
                        report.failures += 1;
                        report.dropped += dropped;
                        errors.report(ReactionError::ConstructionFailure {
                            element,
                            tag_name: instance.tag_name.clone(),
                            dropped,
                            source,
                        });
                        true
                    }
                    Err(DeliveryFailure::Callback(callback, source)) => {
                        report.failures += 1;
                        errors.report(ReactionError::CallbackFailure {
                            element,
                            tag_name: instance.tag_name.clone(),
                            callback,
                            source,
                        });
                        false
                    }
                };

                report.deferred += apply_reported(tracker, registry, &mut deferred, &mut releases);
                if stop {
                    break;
                }
            }
        }

        let swept = tracker.sweep_released();
        tracing::debug!(
            "Checkpoint {}: {} delivered, {} failed, {} dropped across {} elements ({} released)",
            report.sequence,
            report.delivered,
            report.failures,
            report.dropped,
            report.instances,
            swept
        );
        (report, releases)
    }

    fn deliver(
        &self,
        instance: &mut InstanceState,
        reaction: Reaction,
        deferred: &mut DeferredMutations,
    ) -> Result<(), DeliveryFailure> {
        let Some(definition) = instance.definition.clone() else {
            return Ok(());
        };
        let InstanceState { element, tag_name, connected, document, attributes, object, state, .. } = instance;
        let mut ctx =
            ReactionContext::new(*element, tag_name.as_str(), *connected, *document, attributes.as_slice(), deferred);

        if reaction == Reaction::Upgrade {
            // Construction runs at most once per element
            if *state != CustomElementState::Uncustomized || object.is_some() {
                return Ok(());
            }
            tracing::debug!("Constructing <{}> {:?}", definition.name(), element);
            return match self.guarded(|| definition.constructor().construct(&mut ctx)) {
                Ok(constructed) => {
                    *object = Some(constructed);
                    *state = CustomElementState::Custom;
                    Ok(())
                }
                Err(err) => {
                    *state = CustomElementState::Failed;
                    Err(DeliveryFailure::Construction(err))
                }
            };
        }

        let Some(object) = object.as_mut() else {
            return Ok(());
        };
        let callback = reaction.callback();
        tracing::debug!("{} for {:?}", callback, element);

        self.guarded(|| match reaction {
            Reaction::Upgrade => Ok(()),
            Reaction::Connected => object.connected_callback(&mut ctx),
            Reaction::Disconnected => object.disconnected_callback(&mut ctx),
            Reaction::AttributeChanged { name, old_value, new_value, namespace } => object
                .attribute_changed_callback(
                    &mut ctx,
                    &name,
                    old_value.as_deref(),
                    new_value.as_deref(),
                    namespace.as_deref(),
                ),
            Reaction::Adopted { old_document, new_document } => {
                object.adopted_callback(&mut ctx, old_document, new_document)
            }
        })
        .map_err(|err| DeliveryFailure::Callback(callback, err))
    }

    fn guarded<T>(&self, f: impl FnOnce() -> Result<T, CallbackError>) -> Result<T, CallbackError> {
        if !self.catch_panics {
            return f();
        }
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(payload) => Err(CallbackError::from_panic(payload)),
        }
    }
}

/// Apply what a callback reported, holding releases back.
///
/// Returns the number of reported mutations.
fn apply_reported(
    tracker: &mut ElementStateTracker,
    registry: &CustomElementRegistry,
    deferred: &mut DeferredMutations,
    releases: &mut Vec<Mutation>,
) -> usize {
    let reported = deferred.take();
    let count = reported.len();
    for mutation in reported {
        if matches!(mutation, Mutation::Release { .. }) {
            releases.push(mutation);
        } else {
            adapter::dispatch(tracker, registry, mutation);
        }
    }
    count
}
