//! The event instance handed to handlers during one emission.

use alloc::{string::String, vec::Vec};

use backbone_core::{NodeRef, Payload};

use crate::namespace::{EventName, Token};

/// How an emission is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EmitOptions {
    /// Deliver to every matching listener in the tree instead of bubbling.
    pub global: bool,
    /// Do not wait for deferred handler results before moving on.
    pub eager: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            global: false,
            eager: true,
        }
    }
}

impl EmitOptions {
    /// Bubbling, eager delivery.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to global delivery.
    #[must_use]
    pub const fn global(mut self) -> Self {
        self.global = true;
        self
    }

    /// Waits for each level's deferred results before bubbling further.
    #[must_use]
    pub const fn lazy(mut self) -> Self {
        self.eager = false;
        self
    }
}

/// Propagation decision taken by the running handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// No decision; the registration's setting applies.
    #[default]
    Unset,
    /// Stop after the current node.
    Stop,
    /// Keep bubbling even if the registration says otherwise.
    Continue,
}

/// One emission as seen by a handler.
#[derive(Debug)]
pub struct Event {
    origin: NodeRef,
    caller: NodeRef,
    name: EventName,
    tokens: Vec<Token>,
    trigger: String,
    payload: Payload,
    options: EmitOptions,
    propagation: Propagation,
    once: bool,
    relabeled: bool,
}

impl Event {
    pub(crate) fn new(
        origin: NodeRef,
        name: EventName,
        tokens: Vec<Token>,
        payload: Payload,
        options: EmitOptions,
    ) -> Self {
        Self {
            caller: origin.clone(),
            origin,
            trigger: name.as_str().into(),
            name,
            tokens,
            payload,
            options,
            propagation: Propagation::Unset,
            once: false,
            relabeled: false,
        }
    }

    /// The node that emitted the event.
    #[must_use]
    pub const fn origin(&self) -> &NodeRef {
        &self.origin
    }

    /// The node whose handler is running.
    #[must_use]
    pub const fn caller(&self) -> &NodeRef {
        &self.caller
    }

    /// Current name, reflecting any relabel.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Full name of the token that matched the running handler, `*` for the wildcard.
    #[must_use]
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    /// Tokens the emission is matching, most specific first.
    ///
    /// After [`Event::transform_event`] this is refreshed once the handler returns.
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// The payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Mutable access to the payload; changes are seen by later handlers.
    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Returns `true` for a global emission.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        self.options.global
    }

    /// Returns `true` when deferred results are not awaited.
    #[must_use]
    pub const fn is_eager(&self) -> bool {
        self.options.eager
    }

    /// Propagation decision of the running handler.
    #[must_use]
    pub const fn propagation(&self) -> Propagation {
        self.propagation
    }

    /// Returns `true` when the running handler asked to stop bubbling.
    #[must_use]
    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation == Propagation::Stop
    }

    /// Stops bubbling after the current node. No-op for global emissions.
    pub fn stop_propagation(&mut self) {
        if self.options.global {
            tracing::warn!(event = %self.name, "global emissions cannot be stopped");
            return;
        }
        self.propagation = Propagation::Stop;
    }

    /// Keeps bubbling, overriding a registration level stop for this call.
    pub fn resume_propagation(&mut self) {
        self.propagation = Propagation::Continue;
    }

    /// Removes the running handler's registration once it returns.
    pub fn once(&mut self) {
        self.once = true;
    }

    /// Renames the in-flight event and optionally replaces its payload.
    ///
    /// Later handlers and bubbling steps of this emission match the new name.
    /// Rejected for global emissions and invalid names; returns whether the
    /// relabel took effect.
    pub fn transform_event(&mut self, name: &str, payload: Option<Payload>) -> bool {
        if self.options.global {
            tracing::warn!(event = %self.name, to = name, "cannot relabel a global emission");
            return false;
        }
        let name = match EventName::parse(name) {
            Ok(name) => name,
            Err(err) => {
                tracing::warn!(event = %self.name, %err, "relabel rejected");
                return false;
            }
        };
        tracing::debug!(from = %self.name, to = %name, "event relabeled");
        self.name = name;
        if let Some(payload) = payload {
            self.payload = payload;
        }
        self.relabeled = true;
        true
    }

    pub(crate) fn begin_call(&mut self, caller: NodeRef, trigger: String) {
        self.caller = caller;
        self.trigger = trigger;
        self.propagation = Propagation::Unset;
        self.once = false;
    }

    pub(crate) const fn once_requested(&self) -> bool {
        self.once
    }

    pub(crate) fn event_name(&self) -> &EventName {
        &self.name
    }

    pub(crate) fn take_relabel(&mut self) -> bool {
        let relabeled = self.relabeled;
        self.relabeled = false;
        relabeled
    }

    pub(crate) fn set_tokens(&mut self, tokens: Vec<Token>) {
        self.tokens = tokens;
    }

    /// Moves the caller to its parent, `false` at the root.
    pub(crate) fn climb(&mut self) -> bool {
        match self.caller.parent() {
            Some(parent) => {
                self.caller = parent;
                true
            }
            None => false,
        }
    }
}
