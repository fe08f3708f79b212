//! Handles to the live incarnation of a group.

use alloc::{
    boxed::Box,
    format,
    rc::Weak,
    string::{String, ToString},
    vec::Vec,
};

use backbone_core::{
    Error, NodeId, Payload,
    handler::{invoke, settle},
};
use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{LocalBoxFuture, join_all, ready};
use tracing::{error, warn};

use crate::{
    axon::Axon,
    brain::{BrainInner, BrainState, NeuronId, NeuronState, Request, Wakeups, wake},
    signal::{Delivery, Reply, SignalCallback},
};

/// All currently live members of one group.
///
/// The handle refers to one incarnation: once the group's last member
/// leaves, the handle is dead even if the group is joined again later.
#[derive(Clone)]
pub struct Neuron {
    brain: Weak<BrainInner>,
    key: String,
    id: NeuronId,
}

impl core::fmt::Debug for Neuron {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Neuron")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Neuron {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Neuron {}

impl Neuron {
    pub(crate) fn new(brain: Weak<BrainInner>, key: &str, id: NeuronId) -> Self {
        Self {
            brain,
            key: key.to_string(),
            id,
        }
    }

    /// Runs `f` on this incarnation's state, `None` once it is gone.
    fn inspect<R>(&self, f: impl FnOnce(&NeuronState, &BrainState) -> R) -> Option<R> {
        let inner = self.brain.upgrade()?;
        let state = inner.state.borrow();
        let neuron = state.neuron(&self.key, self.id)?;
        Some(f(neuron, &*state))
    }

    /// The group key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Identity of this incarnation.
    #[must_use]
    pub const fn id(&self) -> NeuronId {
        self.id
    }

    /// Returns `true` while this incarnation has members.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inspect(|_, _| ()).is_some()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inspect(|neuron, _| neuron.dendrites.len()).unwrap_or(0)
    }

    /// Returns `true` when no member is left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nodes of the members, in join order.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        self.inspect(|neuron, _| {
            neuron.dendrites.values().map(|dendrite| dendrite.node).collect()
        })
        .unwrap_or_default()
    }

    /// The outbound axon registered under `channel`.
    #[must_use]
    pub fn axon(&self, channel: &str) -> Option<Axon> {
        let brain = self.brain.clone();
        self.inspect(|neuron, _| {
            neuron.outbound.get(channel).map(|link| {
                let request = Request::new(&self.key, &link.target, channel);
                Axon::new(brain, link.id, &request)
            })
        })
        .flatten()
    }

    /// Channel keys of the outbound axons.
    #[must_use]
    pub fn outbound_channels(&self) -> Vec<String> {
        self.inspect(|neuron, _| neuron.outbound.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// (source group, channel key) of every inbound axon.
    #[must_use]
    pub fn inbound_channels(&self) -> Vec<(String, String)> {
        self.inspect(|neuron, _| neuron.inbound.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Channel keys this group is still waiting to link.
    #[must_use]
    pub fn pending_channels(&self) -> Vec<String> {
        self.inspect(|_, state| {
            state
                .pending
                .keys()
                .filter(|request| request.from == self.key)
                .map(|request| request.channel.clone())
                .collect()
        })
        .unwrap_or_default()
    }

    /// Asks for a channel to `target` registered under `channel`.
    ///
    /// Resolves at once when `target` is live. Otherwise the request is
    /// parked until the target group is joined, or resolves to `None` when
    /// it is cancelled by this group's teardown, [`Neuron::delete_axon`],
    /// or a newer request for the same channel and target.
    pub fn request_axon(
        &self,
        channel: &str,
        target: &str,
    ) -> LocalBoxFuture<'static, Option<Axon>> {
        let Some(inner) = self.brain.upgrade().filter(|_| self.is_alive()) else {
            let err = Error::RequestFailure {
                from: self.key.clone(),
                to: target.to_string(),
                reason: "requesting group is no longer live".to_string(),
            };
            error!(%err, "axon request dropped");
            return Box::pin(ready(None));
        };

        let (waiter, answer) = oneshot::channel();
        let mut wakeups = Wakeups::new();
        let linked = inner.state.borrow_mut().request(
            &self.brain,
            Request::new(&self.key, target, channel),
            Some(waiter),
            &mut wakeups,
        );
        wake(wakeups);
        if let Some(axon) = linked {
            return Box::pin(ready(Some(axon)));
        }

        let (from, to) = (self.key.clone(), target.to_string());
        Box::pin(async move {
            let axon = answer.await.ok().flatten();
            if axon.is_none() {
                warn!(%from, %to, "axon request stopped");
            }
            axon
        })
    }

    /// Sends `signal` over the outbound axon registered under `channel`.
    ///
    /// # Errors
    ///
    /// Settles to [`Error::ChannelUnavailable`] when no such axon exists.
    pub fn send_signal(
        &self,
        channel: &str,
        signal: &str,
        data: Payload,
    ) -> LocalBoxFuture<'static, Result<Delivery, Error>> {
        if let Some(axon) = self.axon(channel) {
            return axon.transmit(signal, data).map(Ok).boxed_local();
        }
        let err = Error::ChannelUnavailable {
            group: self.key.clone(),
            channel: channel.to_string(),
        };
        warn!(%err, signal, "signal not sent");
        Box::pin(ready(Err(err)))
    }

    /// Runs the callback for `signal` on every member and settles them all.
    ///
    /// Callbacks are invoked right away, in join order; a failing one is
    /// logged and reported in its slot without affecting the others.
    pub fn deliver_signal(&self, signal: &str, data: Payload) -> LocalBoxFuture<'static, Delivery> {
        let callbacks: Vec<Option<SignalCallback>> = self
            .inspect(|neuron, _| {
                neuron
                    .dendrites
                    .values()
                    .map(|dendrite| dendrite.callbacks.get(signal).cloned())
                    .collect()
            })
            .unwrap_or_default();

        let context = format!("signal `{signal}` on `{}`", self.key);
        let outcomes: Vec<LocalBoxFuture<'static, Result<Payload, Error>>> = callbacks
            .into_iter()
            .map(|callback| {
                let Some(callback) = callback else {
                    return ready(Ok(Payload::Null)).boxed_local();
                };
                match invoke(&context, || callback.call(data.clone())) {
                    Ok(Reply::Ready(value)) => ready(Ok(value)).boxed_local(),
                    Ok(Reply::Deferred(deferred)) => {
                        let context = context.clone();
                        async move {
                            settle(&context, deferred)
                                .await
                                .inspect_err(|err| error!(%err, "deferred signal callback failed"))
                        }
                        .boxed_local()
                    }
                    Err(err) => {
                        error!(%err, "signal callback failed");
                        ready(Err(err)).boxed_local()
                    }
                }
            })
            .collect();
        join_all(outcomes).boxed_local()
    }

    /// Removes the outbound axon under `channel` without relinking it, or
    /// cancels the request still parked under that key.
    ///
    /// Returns `false`, with a warning, when neither exists.
    pub fn delete_axon(&self, channel: &str) -> bool {
        let Some(inner) = self.brain.upgrade().filter(|_| self.is_alive()) else {
            return false;
        };
        let mut wakeups = Wakeups::new();
        let found = {
            let mut state = inner.state.borrow_mut();
            state.cut(&self.key, channel, None).is_some()
                || state.cancel_requests(&self.key, Some(channel), &mut wakeups) > 0
        };
        wake(wakeups);
        if !found {
            warn!(group = %self.key, channel, "no axon or pending request to delete");
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Brain, Callbacks};
    use alloc::rc::Rc;
    use backbone_core::Component;
    use futures::executor::{LocalPool, block_on};
    use serde_json::json;

    #[test]
    fn request_to_live_group_resolves_at_once() {
        let brain = Brain::new();
        let (a, b) = (Component::root(), Component::root());
        brain.join("a", &a.as_node(), Callbacks::new());
        brain.join("b", &b.as_node(), Callbacks::new());
        let neuron = brain.neuron("a").unwrap();

        let axon = neuron.request_axon("to-b", "b").now_or_never().flatten().unwrap();
        assert_eq!(axon.target_group(), "b");
        assert_eq!(neuron.outbound_channels(), ["to-b"]);
        assert_eq!(
            brain.neuron("b").unwrap().inbound_channels(),
            [(String::from("a"), String::from("to-b"))]
        );
    }

    #[test]
    fn parked_request_resolves_when_target_joins() {
        let brain = Brain::new();
        let (a, b) = (Component::root(), Component::root());
        brain.join("a", &a.as_node(), Callbacks::new());
        let neuron = brain.neuron("a").unwrap();

        let request = neuron.request_axon("to-b", "b");
        assert_eq!(neuron.pending_channels(), ["to-b"]);

        brain.join("b", &b.as_node(), Callbacks::new());
        assert!(neuron.pending_channels().is_empty());
        let axon = block_on(request).unwrap();
        assert!(axon.is_alive());
    }

    #[test]
    fn requests_for_different_channels_are_independent() {
        let brain = Brain::new();
        let (a, b) = (Component::root(), Component::root());
        brain.join("a", &a.as_node(), Callbacks::new());
        let neuron = brain.neuron("a").unwrap();

        let first = neuron.request_axon("one", "b");
        let second = neuron.request_axon("two", "b");
        assert_eq!(brain.pending_requests().len(), 2);

        assert!(neuron.delete_axon("one"));
        assert_eq!(block_on(first), None);

        brain.join("b", &b.as_node(), Callbacks::new());
        assert_eq!(block_on(second).unwrap().channel_key(), "two");
    }

    #[test]
    fn newer_request_supersedes_parked_one() {
        let brain = Brain::new();
        let a = Component::root();
        brain.join("a", &a.as_node(), Callbacks::new());
        let neuron = brain.neuron("a").unwrap();

        let stale = neuron.request_axon("ch", "b");
        let _fresh = neuron.request_axon("ch", "b");
        assert_eq!(block_on(stale), None);
        assert_eq!(brain.pending_requests().len(), 1);
    }

    #[test]
    fn delete_axon_reports_missing_channel() {
        let brain = Brain::new();
        let a = Component::root();
        brain.join("a", &a.as_node(), Callbacks::new());
        assert!(!brain.neuron("a").unwrap().delete_axon("nothing"));
    }

    #[test]
    fn signal_reaches_every_member() {
        let brain = Brain::new();
        let sender = Component::root();
        brain.join("sender", &sender.as_node(), Callbacks::new());

        let members = [Component::root(), Component::root(), Component::root()];
        brain.join(
            "receiver",
            &members[0].as_node(),
            Callbacks::new().with("ping", SignalCallback::new(|data| json!({ "echo": data }))),
        );
        brain.join("receiver", &members[1].as_node(), Callbacks::new());
        brain.join(
            "receiver",
            &members[2].as_node(),
            Callbacks::new().with(
                "ping",
                SignalCallback::new(|_| -> anyhow::Result<Payload> { anyhow::bail!("busy") }),
            ),
        );

        let neuron = brain.neuron("sender").unwrap();
        block_on(neuron.request_axon("out", "receiver")).unwrap();
        let delivery = block_on(neuron.send_signal("out", "ping", json!(1))).unwrap();

        assert_eq!(delivery.len(), 3);
        assert_eq!(delivery[0].as_ref().unwrap(), &json!({ "echo": 1 }));
        assert_eq!(delivery[1].as_ref().unwrap(), &Payload::Null);
        assert!(matches!(delivery[2], Err(Error::HandlerException { .. })));
    }

    #[test]
    fn deferred_replies_are_settled_together() {
        let brain = Brain::new();
        let node = Component::root();
        let (release, gate) = oneshot::channel::<()>();
        let gate = Rc::new(core::cell::RefCell::new(Some(gate)));
        let callback = SignalCallback::new(move |_| {
            let gate = gate.borrow_mut().take();
            Reply::deferred(async move {
                if let Some(gate) = gate {
                    gate.await?;
                }
                Ok::<_, anyhow::Error>(json!("late"))
            })
        });
        brain.join("slow", &node.as_node(), Callbacks::new().with("work", callback));

        let mut pool = LocalPool::new();
        let delivery = brain.neuron("slow").unwrap().deliver_signal("work", Payload::Null);
        release.send(()).unwrap();
        let delivery = pool.run_until(delivery);
        assert_eq!(delivery[0].as_ref().unwrap(), &json!("late"));
    }

    #[test]
    fn send_without_axon_is_channel_unavailable() {
        let brain = Brain::new();
        let node = Component::root();
        brain.join("lonely", &node.as_node(), Callbacks::new());
        let neuron = brain.neuron("lonely").unwrap();
        let err = block_on(neuron.send_signal("nowhere", "ping", Payload::Null)).unwrap_err();
        assert!(matches!(err, Error::ChannelUnavailable { .. }));
    }

    #[test]
    fn request_from_dead_neuron_resolves_to_none() {
        let brain = Brain::new();
        let node = Component::root();
        brain.join("gone", &node.as_node(), Callbacks::new());
        let neuron = brain.neuron("gone").unwrap();
        node.destroy();
        assert!(!neuron.is_alive());
        assert_eq!(block_on(neuron.request_axon("ch", "gone")), None);
    }
}
