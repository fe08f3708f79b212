//! One node's membership in a group.

use alloc::{
    boxed::Box,
    rc::Weak,
    string::{String, ToString},
    vec::Vec,
};

use backbone_core::{Error, NodeId, Payload};
use futures::future::{LocalBoxFuture, ready};
use tracing::{trace, warn};

use crate::{
    axon::Axon,
    brain::{BrainInner, DendriteId, NeuronId, Wakeups, wake},
    neuron::Neuron,
    signal::{Callbacks, Delivery},
};

/// Membership of one node in a group, holding that node's signal callbacks.
///
/// Dropping the handle does not leave the group; the membership ends when
/// the node is destroyed or [`Dendrite::destroy`] is called.
#[derive(Clone)]
pub struct Dendrite {
    brain: Weak<BrainInner>,
    group: String,
    neuron: NeuronId,
    id: DendriteId,
    node: NodeId,
}

impl core::fmt::Debug for Dendrite {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dendrite")
            .field("group", &self.group)
            .field("id", &self.id)
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Dendrite {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Dendrite {}

impl Dendrite {
    pub(crate) fn new(
        brain: Weak<BrainInner>,
        group: &str,
        neuron: NeuronId,
        id: DendriteId,
        node: NodeId,
    ) -> Self {
        Self {
            brain,
            group: group.to_string(),
            neuron,
            id,
            node,
        }
    }

    /// Identity of this membership.
    #[must_use]
    pub const fn id(&self) -> DendriteId {
        self.id
    }

    /// The group key.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The member node.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// The group's neuron, for as long as this membership lasts.
    #[must_use]
    pub fn neuron(&self) -> Option<Neuron> {
        self.is_alive()
            .then(|| Neuron::new(self.brain.clone(), &self.group, self.neuron))
    }

    /// Returns `true` until the membership ends.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.brain.upgrade().is_some_and(|inner| {
            inner
                .state
                .borrow()
                .neuron(&self.group, self.neuron)
                .is_some_and(|neuron| neuron.dendrites.contains_key(&self.id))
        })
    }

    /// Adds or replaces signal callbacks. No-op once the membership ended.
    pub fn set_callbacks(&self, callbacks: &Callbacks) {
        let Some(inner) = self.brain.upgrade() else {
            return;
        };
        let mut state = inner.state.borrow_mut();
        let Some(dendrite) = state
            .neuron_mut(&self.group, self.neuron)
            .and_then(|neuron| neuron.dendrites.get_mut(&self.id))
        else {
            return;
        };
        for (signal, callback) in callbacks.iter() {
            dendrite.callbacks.insert(signal.to_string(), callback.clone());
        }
    }

    /// Drops the callbacks of the given signals.
    pub fn remove_callbacks<I, S>(&self, signals: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(inner) = self.brain.upgrade() else {
            return;
        };
        let removed: Vec<_> = {
            let mut state = inner.state.borrow_mut();
            let Some(dendrite) = state
                .neuron_mut(&self.group, self.neuron)
                .and_then(|neuron| neuron.dendrites.get_mut(&self.id))
            else {
                return;
            };
            signals
                .into_iter()
                .filter_map(|signal| dendrite.callbacks.remove(signal.as_ref()))
                .collect()
        };
        drop(removed);
    }

    /// Sends `signal` over the group's channel `channel`.
    ///
    /// # Errors
    ///
    /// Settles to [`Error::ChannelUnavailable`] when the group has no such
    /// channel or this membership ended.
    pub fn send_signal(
        &self,
        channel: &str,
        signal: &str,
        data: Payload,
    ) -> LocalBoxFuture<'static, Result<Delivery, Error>> {
        if let Some(neuron) = self.neuron() {
            return neuron.send_signal(channel, signal, data);
        }
        let err = Error::ChannelUnavailable {
            group: self.group.clone(),
            channel: channel.to_string(),
        };
        warn!(%err, signal, "signal sent from a departed member");
        Box::pin(ready(Err(err)))
    }

    /// Asks for a channel from this group to `target`. See [`Neuron::request_axon`].
    pub fn request_channel(
        &self,
        channel: &str,
        target: &str,
    ) -> LocalBoxFuture<'static, Option<Axon>> {
        match self.neuron() {
            Some(neuron) => neuron.request_axon(channel, target),
            None => {
                warn!(group = %self.group, channel, target, "channel requested after leaving");
                Box::pin(ready(None))
            }
        }
    }

    /// Removes the group's channel `channel`. See [`Neuron::delete_axon`].
    pub fn delete_channel(&self, channel: &str) -> bool {
        self.neuron().is_some_and(|neuron| neuron.delete_axon(channel))
    }

    /// Ends the membership. The last member leaving tears the neuron down.
    ///
    /// Calling it again does nothing.
    pub fn destroy(&self) {
        let Some(inner) = self.brain.upgrade() else {
            return;
        };
        let mut wakeups = Wakeups::new();
        let removed = {
            let mut state = inner.state.borrow_mut();
            let Some(neuron) = state.neuron_mut(&self.group, self.neuron) else {
                return;
            };
            let removed = neuron.dendrites.remove(&self.id);
            if removed.is_some() {
                trace!(group = %self.group, dendrite = %self.id, "dendrite left");
                if neuron.dendrites.is_empty() {
                    state.retire(&self.brain, &self.group, &mut wakeups);
                }
            }
            removed
        };
        wake(wakeups);
        drop(removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Brain, SignalCallback};
    use backbone_core::{Component, Node};
    use futures::executor::block_on;
    use serde_json::json;

    #[test]
    fn node_destruction_ends_membership() {
        let brain = Brain::new();
        let (first, second) = (Component::root(), Component::root());
        let a = brain.join("group", &first.as_node(), Callbacks::new());
        let b = brain.join("group", &second.as_node(), Callbacks::new());
        let neuron = brain.neuron("group").unwrap();
        assert_eq!(neuron.nodes(), [first.uid(), second.uid()]);

        first.destroy();
        assert!(!a.is_alive());
        assert!(b.is_alive());
        assert_eq!(neuron.len(), 1);

        b.destroy();
        b.destroy();
        assert!(!neuron.is_alive());
        assert!(brain.is_empty());
    }

    #[test]
    fn callbacks_can_be_swapped_and_removed() {
        let brain = Brain::new();
        let (sender, receiver) = (Component::root(), Component::root());
        let from = brain.join("from", &sender.as_node(), Callbacks::new());
        let to = brain.join(
            "to",
            &receiver.as_node(),
            Callbacks::new().with("who", SignalCallback::new(|_| json!("first"))),
        );
        block_on(from.request_channel("ch", "to")).unwrap();

        to.set_callbacks(&Callbacks::new().with("who", SignalCallback::new(|_| json!("second"))));
        let delivery = block_on(from.send_signal("ch", "who", Payload::Null)).unwrap();
        assert_eq!(delivery[0].as_ref().unwrap(), &json!("second"));

        to.remove_callbacks(["who"]);
        let delivery = block_on(from.send_signal("ch", "who", Payload::Null)).unwrap();
        assert_eq!(delivery[0].as_ref().unwrap(), &Payload::Null);
    }

    #[test]
    fn departed_member_cannot_use_the_group() {
        let brain = Brain::new();
        let (keep, leave) = (Component::root(), Component::root());
        brain.join("group", &keep.as_node(), Callbacks::new());
        let departed = brain.join("group", &leave.as_node(), Callbacks::new());
        departed.destroy();

        assert!(departed.neuron().is_none());
        assert_eq!(block_on(departed.request_channel("ch", "group")), None);
        assert!(block_on(departed.send_signal("ch", "x", Payload::Null)).is_err());
        assert!(!departed.delete_channel("ch"));
    }
}
