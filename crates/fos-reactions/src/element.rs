//! Scripted elements
//!
//! Custom element implementation whose callbacks append to a shared trace.

use std::cell::RefCell;
use std::rc::Rc;

use fos_elements::{
    CallbackError, CustomElement, DocumentId, ElementConstructor, LifecycleCallback, Mutation, MutationSink,
    Reaction, ReactionContext,
};

use crate::replay::TraceEvent;

pub type Trace = Rc<RefCell<Vec<TraceEvent>>>;

/// Builds [`ScriptedElement`]s for one definition
pub struct ScriptedConstructor {
    trace: Trace,
    fail_on: Vec<LifecycleCallback>,
    on_connected: Vec<Mutation>,
}

impl ScriptedConstructor {
    pub fn new(trace: Trace, fail_on: Vec<LifecycleCallback>, on_connected: Vec<Mutation>) -> Self {
        Self { trace, fail_on, on_connected }
    }
}

impl ElementConstructor for ScriptedConstructor {
    fn construct(&self, ctx: &mut ReactionContext<'_>) -> Result<Box<dyn CustomElement>, CallbackError> {
        record(&self.trace, ctx, Reaction::Upgrade);
        if self.fail_on.contains(&LifecycleCallback::Constructor) {
            return Err(CallbackError::new("scripted constructor failure"));
        }
        Ok(Box::new(ScriptedElement {
            trace: self.trace.clone(),
            fail_on: self.fail_on.clone(),
            on_connected: self.on_connected.clone(),
        }))
    }
}

pub struct ScriptedElement {
    trace: Trace,
    fail_on: Vec<LifecycleCallback>,
    on_connected: Vec<Mutation>,
}

impl ScriptedElement {
    fn outcome(&self, callback: LifecycleCallback) -> Result<(), CallbackError> {
        if self.fail_on.contains(&callback) {
            return Err(CallbackError::new(format!("scripted {} failure", callback)));
        }
        Ok(())
    }
}

impl CustomElement for ScriptedElement {
    fn connected_callback(&mut self, ctx: &mut ReactionContext<'_>) -> Result<(), CallbackError> {
        record(&self.trace, ctx, Reaction::Connected);
        for mutation in &self.on_connected {
            ctx.mutations().apply(mutation.clone());
        }
        self.outcome(LifecycleCallback::Connected)
    }

    fn disconnected_callback(&mut self, ctx: &mut ReactionContext<'_>) -> Result<(), CallbackError> {
        record(&self.trace, ctx, Reaction::Disconnected);
        self.outcome(LifecycleCallback::Disconnected)
    }

    fn attribute_changed_callback(
        &mut self,
        ctx: &mut ReactionContext<'_>,
        name: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
        namespace: Option<&str>,
    ) -> Result<(), CallbackError> {
        let reaction = Reaction::AttributeChanged {
            name: name.to_string(),
            old_value: old_value.map(str::to_string),
            new_value: new_value.map(str::to_string),
            namespace: namespace.map(str::to_string),
        };
        record(&self.trace, ctx, reaction);
        self.outcome(LifecycleCallback::AttributeChanged)
    }

    fn adopted_callback(
        &mut self,
        ctx: &mut ReactionContext<'_>,
        old_document: DocumentId,
        new_document: DocumentId,
    ) -> Result<(), CallbackError> {
        record(&self.trace, ctx, Reaction::Adopted { old_document, new_document });
        self.outcome(LifecycleCallback::Adopted)
    }
}

fn record(trace: &Trace, ctx: &ReactionContext<'_>, reaction: Reaction) {
    trace.borrow_mut().push(TraceEvent::Callback {
        element: ctx.element(),
        tag_name: ctx.tag_name().to_string(),
        reaction,
    });
}
