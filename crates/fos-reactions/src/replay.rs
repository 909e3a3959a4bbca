//! Script replay
//!
//! Feeds a [`Script`] through a [`CustomElementEngine`] and collects the trace.

use anyhow::{Result, bail};
use fos_elements::{CheckpointReport, CustomElementEngine, ElementId, EngineConfig, MutationSink, Reaction};
use serde::Serialize;
use smol::LocalExecutor;

use crate::element::{ScriptedConstructor, Trace};
use crate::script::{Control, Script, Step};

/// One line of replay output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    Callback {
        element: ElementId,
        tag_name: String,
        reaction: Reaction,
    },
    Checkpoint {
        sequence: u64,
        delivered: usize,
        failures: usize,
        dropped: usize,
    },
    Defined {
        name: String,
    },
    Error {
        message: String,
    },
}

impl From<&CheckpointReport> for TraceEvent {
    fn from(report: &CheckpointReport) -> Self {
        Self::Checkpoint {
            sequence: report.sequence,
            delivered: report.delivered,
            failures: report.failures,
            dropped: report.dropped,
        }
    }
}

/// Replay `script` and return everything that happened, in order
pub fn run(script: &Script, config: EngineConfig) -> Result<Vec<TraceEvent>> {
    let trace: Trace = Trace::default();
    let executor = LocalExecutor::new();
    let mut engine = CustomElementEngine::with_config(config);

    for (index, step) in script.steps.iter().enumerate() {
        tracing::debug!("Step {}: {:?}", index, step);
        match step {
            Step::Mutation(mutation) => engine.apply(mutation.clone()),
            Step::Control(Control::Define { name }) => {
                let Some(definition) = script.definition(name) else {
                    bail!("step {}: no definition named {:?} in script", index, name);
                };
                let constructor = ScriptedConstructor::new(
                    trace.clone(),
                    definition.fail_on.clone(),
                    definition.on_connected.clone(),
                );
                if let Err(err) = engine.define(name, constructor, definition.options()) {
                    tracing::warn!("step {}: {}", index, err);
                    trace.borrow_mut().push(TraceEvent::Error { message: err.to_string() });
                }
            }
            Step::Control(Control::WhenDefined { name }) => {
                let pending = engine.when_defined(name);
                let trace = trace.clone();
                executor
                    .spawn(async move {
                        let definition = pending.await;
                        trace.borrow_mut().push(TraceEvent::Defined { name: definition.name().to_string() });
                    })
                    .detach();
            }
            Step::Control(Control::Checkpoint) => {
                let report = engine.perform_checkpoint();
                trace.borrow_mut().push(TraceEvent::from(&report));
            }
            Step::Control(Control::Flush) => {
                for report in engine.run_until_idle() {
                    trace.borrow_mut().push(TraceEvent::from(&report));
                }
            }
        }

        drain_errors(&mut engine, &trace);
        while executor.try_tick() {}
    }

    // Whatever is still queued drains at the end of the script
    for report in engine.run_until_idle() {
        trace.borrow_mut().push(TraceEvent::from(&report));
    }
    drain_errors(&mut engine, &trace);

    let events = trace.borrow().clone();
    Ok(events)
}

fn drain_errors(engine: &mut CustomElementEngine, trace: &Trace) {
    for err in engine.take_errors() {
        trace.borrow_mut().push(TraceEvent::Error { message: err.to_string() });
    }
}

/// Number of callback events in a trace
pub fn callback_count(events: &[TraceEvent]) -> usize {
    events.iter().filter(|e| matches!(e, TraceEvent::Callback { .. })).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_elements::CheckpointMode;

    fn explicit() -> EngineConfig {
        EngineConfig { checkpoint_mode: CheckpointMode::Explicit, ..EngineConfig::default() }
    }

    fn callbacks(events: &[TraceEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Callback { element, reaction, .. } => {
                    Some(format!("{}:{}", element.0, reaction.callback()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_badge_script() {
        let script = Script::parse(
            r#"{
                "definitions": [ { "name": "x-badge", "observed_attributes": ["label"] } ],
                "steps": [
                    { "op": "define", "name": "x-badge" },
                    { "op": "create", "element": 1, "tag_name": "x-badge" },
                    { "op": "insert", "element": 1, "tag_name": "x-badge" },
                    { "op": "attribute_set", "element": 1, "name": "label", "old_value": "old", "new_value": "new" },
                    { "op": "attribute_set", "element": 1, "name": "color", "old_value": "a", "new_value": "b" },
                    { "op": "remove", "element": 1 },
                    { "op": "checkpoint" }
                ]
            }"#,
        )
        .unwrap();

        let events = run(&script, explicit()).unwrap();
        assert_eq!(
            callbacks(&events),
            ["1:constructor", "1:connectedCallback", "1:attributeChangedCallback", "1:disconnectedCallback"]
        );
        assert_eq!(callback_count(&events), 4);
        assert!(matches!(events.last(), Some(TraceEvent::Checkpoint { sequence: 1, delivered: 4, .. })));
    }

    #[test]
    fn test_when_defined_reported_on_define() {
        let script = Script::parse(
            r#"{
                "definitions": [ { "name": "x-late" } ],
                "steps": [
                    { "op": "when_defined", "name": "x-late" },
                    { "op": "insert", "element": 1, "tag_name": "x-late" },
                    { "op": "define", "name": "x-late" }
                ]
            }"#,
        )
        .unwrap();

        let events = run(&script, explicit()).unwrap();
        let defined = events.iter().position(|e| *e == TraceEvent::Defined { name: "x-late".to_string() });
        let constructed = events
            .iter()
            .position(|e| matches!(e, TraceEvent::Callback { reaction: Reaction::Upgrade, .. }));
        assert!(defined.is_some());
        assert!(defined < constructed);
    }

    #[test]
    fn test_failures_become_error_events() {
        let script = Script::parse(
            r#"{
                "definitions": [ { "name": "x-bad", "fail_on": ["constructor"] } ],
                "steps": [
                    { "op": "define", "name": "x-bad" },
                    { "op": "define", "name": "x-bad" },
                    { "op": "insert", "element": 1, "tag_name": "x-bad" },
                    { "op": "checkpoint" }
                ]
            }"#,
        )
        .unwrap();

        let events = run(&script, explicit()).unwrap();
        let errors: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Error { message } => Some(message.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], "Element already defined: x-bad");
        assert!(errors[1].starts_with("Construction of <x-bad>"));
    }

    #[test]
    fn test_reentrant_mutations_from_script() {
        let script = Script::parse(
            r#"{
                "definitions": [
                    { "name": "x-parent", "on_connected": [ { "op": "insert", "element": 2, "tag_name": "x-child" } ] },
                    { "name": "x-child" }
                ],
                "steps": [
                    { "op": "define", "name": "x-parent" },
                    { "op": "define", "name": "x-child" },
                    { "op": "insert", "element": 1, "tag_name": "x-parent" },
                    { "op": "flush" }
                ]
            }"#,
        )
        .unwrap();

        let events = run(&script, explicit()).unwrap();
        assert_eq!(
            callbacks(&events),
            ["1:constructor", "1:connectedCallback", "2:constructor", "2:connectedCallback"]
        );
        let checkpoints = events.iter().filter(|e| matches!(e, TraceEvent::Checkpoint { .. })).count();
        assert_eq!(checkpoints, 2);
    }

    #[test]
    fn test_unknown_definition_is_an_error() {
        let script = Script::parse(r#"{ "steps": [ { "op": "define", "name": "x-missing" } ] }"#).unwrap();
        assert!(run(&script, EngineConfig::default()).is_err());
    }
}
