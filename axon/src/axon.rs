//! Directed channels between neurons.

use alloc::{boxed::Box, rc::Weak, string::String, vec::Vec};

use futures::future::{LocalBoxFuture, ready};
use tracing::debug;

use backbone_core::Payload;

use crate::{
    brain::{AxonId, Brain, BrainInner, Request, Wakeups, wake},
    neuron::Neuron,
    signal::Delivery,
};

/// A directed channel from one group to another, registered under a
/// channel key on its source.
///
/// The handle does not keep the channel alive; it reports whether the
/// channel it was created as still exists.
#[derive(Clone)]
pub struct Axon {
    brain: Weak<BrainInner>,
    id: AxonId,
    channel: String,
    source: String,
    target: String,
}

impl core::fmt::Debug for Axon {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Axon")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Axon {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Axon {}

impl Axon {
    pub(crate) fn new(brain: Weak<BrainInner>, id: AxonId, request: &Request) -> Self {
        Self {
            brain,
            id,
            channel: request.channel.clone(),
            source: request.from.clone(),
            target: request.to.clone(),
        }
    }

    fn brain(&self) -> Option<Brain> {
        self.brain.upgrade().map(|inner| Brain { inner })
    }

    /// Identity of this channel.
    #[must_use]
    pub const fn id(&self) -> AxonId {
        self.id
    }

    /// Key the channel is registered under on its source.
    #[must_use]
    pub fn channel_key(&self) -> &str {
        &self.channel
    }

    /// Sending group.
    #[must_use]
    pub fn source_group(&self) -> &str {
        &self.source
    }

    /// Receiving group.
    #[must_use]
    pub fn target_group(&self) -> &str {
        &self.target
    }

    /// Returns `true` while the channel exists.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.brain.upgrade().is_some_and(|inner| {
            inner
                .state
                .borrow()
                .neurons
                .get(&self.source)
                .and_then(|neuron| neuron.outbound.get(&self.channel))
                .is_some_and(|link| link.id == self.id)
        })
    }

    /// The sending neuron, while the channel exists.
    #[must_use]
    pub fn source(&self) -> Option<Neuron> {
        if !self.is_alive() {
            return None;
        }
        self.brain()?.neuron(&self.source)
    }

    /// The receiving neuron, while the channel exists.
    #[must_use]
    pub fn target(&self) -> Option<Neuron> {
        if !self.is_alive() {
            return None;
        }
        self.brain()?.neuron(&self.target)
    }

    /// Delivers `signal` to every member of the receiving group.
    ///
    /// A dead channel delivers nothing and settles to an empty list.
    pub fn transmit(&self, signal: &str, data: Payload) -> LocalBoxFuture<'static, Delivery> {
        match self.target() {
            Some(target) => target.deliver_signal(signal, data),
            None => {
                debug!(axon = %self.id, signal, "signal dropped on a dead axon");
                Box::pin(ready(Vec::new()))
            }
        }
    }

    /// Severs the channel.
    ///
    /// The receiver always forgets it. With `notify_sender` the source is
    /// told the receiver cut it and, unless `suppress_auto_recreate`, asks
    /// for the same channel again; the request links at once when the
    /// target is live and is parked otherwise.
    pub fn destroy(&self, notify_sender: bool, suppress_auto_recreate: bool) {
        let Some(inner) = self.brain.upgrade() else {
            return;
        };
        let mut wakeups = Wakeups::new();
        {
            let mut state = inner.state.borrow_mut();
            let cut = state.cut(&self.source, &self.channel, Some(self.id));
            if cut.is_some() && notify_sender && !suppress_auto_recreate {
                let request = Request::new(&self.source, &self.target, &self.channel);
                state.request(&self.brain, request, None, &mut wakeups);
            }
        }
        wake(wakeups);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Callbacks;
    use backbone_core::Component;

    fn linked(brain: &Brain) -> (Axon, [alloc::rc::Rc<Component>; 2]) {
        let sender = Component::root();
        let receiver = Component::root();
        let from = brain.join("sender", &sender.as_node(), Callbacks::new());
        brain.join("receiver", &receiver.as_node(), Callbacks::new());
        let axon = futures::executor::block_on(from.request_channel("out", "receiver")).unwrap();
        (axon, [sender, receiver])
    }

    #[test]
    fn handle_reports_both_ends() {
        let brain = Brain::new();
        let (axon, _nodes) = linked(&brain);
        assert!(axon.is_alive());
        assert_eq!(axon.channel_key(), "out");
        assert_eq!(axon.source().unwrap().key(), "sender");
        assert_eq!(axon.target().unwrap().key(), "receiver");
    }

    #[test]
    fn destroy_without_notice_does_not_relink() {
        let brain = Brain::new();
        let (axon, _nodes) = linked(&brain);
        axon.destroy(false, false);
        assert!(!axon.is_alive());
        assert!(axon.target().is_none());
        assert!(brain.neuron("sender").unwrap().axon("out").is_none());
        assert!(brain.neuron("receiver").unwrap().inbound_channels().is_empty());
    }

    #[test]
    fn destroy_with_notice_relinks_to_live_target() {
        let brain = Brain::new();
        let (axon, _nodes) = linked(&brain);
        axon.destroy(true, false);
        assert!(!axon.is_alive());

        let fresh = brain.neuron("sender").unwrap().axon("out").unwrap();
        assert_ne!(fresh, axon);
        assert_eq!(fresh.target_group(), "receiver");
    }

    #[test]
    fn suppressed_recreate_leaves_channel_gone() {
        let brain = Brain::new();
        let (axon, _nodes) = linked(&brain);
        axon.destroy(true, true);
        assert!(brain.neuron("sender").unwrap().axon("out").is_none());
        assert!(brain.pending_requests().is_empty());
    }

    #[test]
    fn stale_handle_cannot_cut_its_replacement() {
        let brain = Brain::new();
        let (axon, _nodes) = linked(&brain);
        axon.destroy(true, false);
        axon.destroy(false, false);
        assert!(brain.neuron("sender").unwrap().axon("out").is_some());
    }
}
