//! The directory of live neurons and the requests waiting for them.
//!
//! All graph state lives here, in one state struct behind a `RefCell`.
//! [`Neuron`], [`Dendrite`] and [`Axon`] are handles holding a `Weak`
//! reference to it plus the keys they stand for, so no ownership cycle
//! exists between the directory and the handles it gives out.
//!
//! A request for a channel to a group that is not live yet is parked in the
//! brain, keyed by (requester, target, channel). Creating
//! the target neuron links every request parked for it on the spot.

use alloc::{
    borrow::ToOwned,
    boxed::Box,
    rc::{Rc, Weak},
    string::String,
    vec::Vec,
};
use core::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use backbone_core::{NodeId, NodeRef};
use futures::channel::oneshot;
use tracing::{debug, trace};

use crate::{
    axon::Axon,
    dendrite::Dendrite,
    neuron::Neuron,
    signal::{Callbacks, SignalCallback},
};

backbone_core::counter_id!(
    /// Identity of one incarnation of a neuron.
    ///
    /// A group that dies and is joined again gets a fresh id, so handles to
    /// the old incarnation stay dead.
    NeuronId
);

backbone_core::counter_id!(
    /// Identity of one dendrite.
    DendriteId
);

backbone_core::counter_id!(
    /// Identity of one axon.
    AxonId
);

/// Wakes whoever awaits a parked request.
pub(crate) type Waiter = oneshot::Sender<Option<Axon>>;

/// A parked channel request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Request {
    /// Requesting group.
    pub from: String,
    /// Target group.
    pub to: String,
    /// Channel key the axon will be registered under.
    pub channel: String,
}

impl Request {
    pub(crate) fn new(from: &str, to: &str, channel: &str) -> Self {
        Self {
            from: from.to_owned(),
            to: to.to_owned(),
            channel: channel.to_owned(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct DendriteState {
    pub(crate) node: NodeId,
    pub(crate) callbacks: HashMap<String, SignalCallback>,
}

/// An outbound axon as recorded on its source neuron.
#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub(crate) id: AxonId,
    pub(crate) target: String,
}

#[derive(Debug)]
pub(crate) struct NeuronState {
    pub(crate) id: NeuronId,
    pub(crate) dendrites: BTreeMap<DendriteId, DendriteState>,
    /// Channel key to link.
    pub(crate) outbound: BTreeMap<String, Link>,
    /// (source group, channel key) to axon.
    pub(crate) inbound: BTreeMap<(String, String), AxonId>,
}

impl NeuronState {
    fn new() -> Self {
        Self {
            id: NeuronId::next(),
            dendrites: BTreeMap::new(),
            outbound: BTreeMap::new(),
            inbound: BTreeMap::new(),
        }
    }
}

/// Parked waiters to answer once the state borrow is released.
pub(crate) type Wakeups = Vec<(Waiter, Option<Axon>)>;

#[derive(Debug, Default)]
pub(crate) struct BrainState {
    pub(crate) neurons: HashMap<String, NeuronState>,
    pub(crate) pending: BTreeMap<Request, Option<Waiter>>,
}

impl BrainState {
    /// Looks up a neuron, only if it is still the incarnation `id`.
    pub(crate) fn neuron(&self, group: &str, id: NeuronId) -> Option<&NeuronState> {
        self.neurons.get(group).filter(|neuron| neuron.id == id)
    }

    pub(crate) fn neuron_mut(&mut self, group: &str, id: NeuronId) -> Option<&mut NeuronState> {
        self.neurons.get_mut(group).filter(|neuron| neuron.id == id)
    }

    /// Creates the axon for `request` when both ends are live.
    ///
    /// An axon already registered under the same channel on the source is
    /// replaced; its receiver forgets it.
    fn link(&mut self, brain: &Weak<BrainInner>, request: &Request) -> Option<Axon> {
        if !self.neurons.contains_key(&request.to) {
            return None;
        }
        let id = AxonId::next();
        let source = self.neurons.get_mut(&request.from)?;
        let replaced = source.outbound.insert(
            request.channel.clone(),
            Link {
                id,
                target: request.to.clone(),
            },
        );
        let key = (request.from.clone(), request.channel.clone());
        if let Some(previous) = replaced {
            if let Some(receiver) = self.neurons.get_mut(&previous.target) {
                receiver.inbound.remove(&key);
            }
        }
        if let Some(receiver) = self.neurons.get_mut(&request.to) {
            receiver.inbound.insert(key, id);
        }
        debug!(
            axon = %id,
            from = %request.from,
            to = %request.to,
            channel = %request.channel,
            "axon created"
        );
        Some(Axon::new(brain.clone(), id, request))
    }

    /// Links `request` now when its target is live, otherwise parks it.
    ///
    /// A request already parked under the same key is answered with `None`.
    pub(crate) fn request(
        &mut self,
        brain: &Weak<BrainInner>,
        request: Request,
        waiter: Option<Waiter>,
        wakeups: &mut Wakeups,
    ) -> Option<Axon> {
        if let Some(axon) = self.link(brain, &request) {
            return Some(axon);
        }
        debug!(
            from = %request.from,
            to = %request.to,
            channel = %request.channel,
            "axon request parked"
        );
        if let Some(Some(previous)) = self.pending.insert(request, waiter) {
            wakeups.push((previous, None));
        }
        None
    }

    /// Links every request parked for the freshly created `group`.
    fn resolve_parked(&mut self, brain: &Weak<BrainInner>, group: &str, wakeups: &mut Wakeups) {
        let parked: Vec<Request> = self
            .pending
            .keys()
            .filter(|request| request.to == group)
            .cloned()
            .collect();
        for request in parked {
            let waiter = self.pending.remove(&request).flatten();
            let axon = self.link(brain, &request);
            trace!(
                from = %request.from,
                to = group,
                channel = %request.channel,
                "parked request resolved"
            );
            if let Some(waiter) = waiter {
                wakeups.push((waiter, axon));
            }
        }
    }

    /// Answers every parked request of `group` with `None`.
    pub(crate) fn cancel_requests(
        &mut self,
        group: &str,
        channel: Option<&str>,
        wakeups: &mut Wakeups,
    ) -> usize {
        let cancelled: Vec<Request> = self
            .pending
            .keys()
            .filter(|request| {
                request.from == group && channel.is_none_or(|channel| request.channel == channel)
            })
            .cloned()
            .collect();
        for request in &cancelled {
            debug!(
                from = %request.from,
                to = %request.to,
                channel = %request.channel,
                "axon request cancelled"
            );
            if let Some(Some(waiter)) = self.pending.remove(request) {
                wakeups.push((waiter, None));
            }
        }
        cancelled.len()
    }

    /// Removes the axon `source` holds under `channel`, if it is still `id`.
    ///
    /// Returns the removed link.
    pub(crate) fn cut(&mut self, source: &str, channel: &str, id: Option<AxonId>) -> Option<Link> {
        let sender = self.neurons.get_mut(source)?;
        if id.is_some_and(|id| sender.outbound.get(channel).is_none_or(|link| link.id != id)) {
            return None;
        }
        let link = sender.outbound.remove(channel)?;
        if let Some(receiver) = self.neurons.get_mut(&link.target) {
            receiver.inbound.remove(&(source.to_owned(), channel.to_owned()));
        }
        debug!(axon = %link.id, from = source, to = %link.target, channel, "axon destroyed");
        Some(link)
    }

    /// Tears a neuron down once its last dendrite is gone.
    ///
    /// Its own parked requests are cancelled, it leaves the directory, its
    /// outbound axons are dropped by their receivers, and every sender of an
    /// inbound axon parks a fresh request for the same channel.
    pub(crate) fn retire(&mut self, brain: &Weak<BrainInner>, group: &str, wakeups: &mut Wakeups) {
        self.cancel_requests(group, None, wakeups);
        let Some(neuron) = self.neurons.remove(group) else {
            return;
        };
        debug!(group, neuron = %neuron.id, "neuron destroyed");

        for (channel, link) in neuron.outbound {
            if let Some(receiver) = self.neurons.get_mut(&link.target) {
                receiver.inbound.remove(&(group.to_owned(), channel));
            }
        }

        for ((source, channel), id) in neuron.inbound {
            if self.cut(&source, &channel, Some(id)).is_some() {
                let request = Request {
                    from: source,
                    to: group.to_owned(),
                    channel,
                };
                self.request(brain, request, None, wakeups);
            }
        }
    }
}

/// Answers parked waiters. A waiter whose future was dropped is skipped.
pub(crate) fn wake(wakeups: Wakeups) {
    for (waiter, axon) in wakeups {
        drop(waiter.send(axon));
    }
}

#[derive(Debug, Default)]
pub(crate) struct BrainInner {
    pub(crate) state: RefCell<BrainState>,
}

/// The directory resolving group keys to live [`Neuron`]s.
///
/// `Brain` is a cheap handle; clones share the same directory.
///
/// ```
/// use backbone_axon::{Brain, Callbacks, SignalCallback};
/// use backbone_core::Component;
///
/// let brain = Brain::new();
/// let node = Component::root();
/// let dendrite = brain.join("chat", &node.as_node(), Callbacks::new());
/// assert_eq!(dendrite.group(), "chat");
/// assert!(brain.contains("chat"));
///
/// node.destroy();
/// assert!(!brain.contains("chat"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Brain {
    pub(crate) inner: Rc<BrainInner>,
}

impl Brain {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn downgrade(&self) -> Weak<BrainInner> {
        Rc::downgrade(&self.inner)
    }

    /// Adds `node` as a member of `group`.
    ///
    /// The group's neuron is created on first join, linking every request
    /// parked for it. The returned dendrite leaves the group by itself when
    /// `node` is destroyed.
    pub fn join(&self, group: &str, node: &NodeRef, callbacks: Callbacks) -> Dendrite {
        let weak = self.downgrade();
        let id = DendriteId::next();
        let mut wakeups = Wakeups::new();
        let neuron = {
            let mut state = self.inner.state.borrow_mut();
            let neuron = match state.neurons.get(group) {
                Some(neuron) => neuron.id,
                None => {
                    let neuron = NeuronState::new();
                    let neuron_id = neuron.id;
                    debug!(group, neuron = %neuron_id, "neuron created");
                    state.neurons.insert(group.to_owned(), neuron);
                    state.resolve_parked(&weak, group, &mut wakeups);
                    neuron_id
                }
            };
            let callbacks = callbacks
                .iter()
                .map(|(signal, callback)| (signal.to_owned(), callback.clone()))
                .collect();
            if let Some(entry) = state.neurons.get_mut(group) {
                entry.dendrites.insert(id, DendriteState {
                    node: node.uid(),
                    callbacks,
                });
            }
            neuron
        };
        wake(wakeups);

        trace!(group, dendrite = %id, node = %node.uid(), "dendrite joined");
        let dendrite = Dendrite::new(weak, group, neuron, id, node.uid());
        let leaving = dendrite.clone();
        node.on_destroy(Box::new(move || leaving.destroy()));
        dendrite
    }

    /// The live neuron of `group`.
    #[must_use]
    pub fn neuron(&self, group: &str) -> Option<Neuron> {
        let id = self.inner.state.borrow().neurons.get(group)?.id;
        Some(Neuron::new(self.downgrade(), group, id))
    }

    /// Returns `true` while `group` has members.
    #[must_use]
    pub fn contains(&self, group: &str) -> bool {
        self.inner.state.borrow().neurons.contains_key(group)
    }

    /// Number of live neurons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.borrow().neurons.len()
    }

    /// Returns `true` when no group is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Requests currently parked, ordered by requester, target, channel.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<Request> {
        self.inner.state.borrow().pending.keys().cloned().collect()
    }

    /// Drops every neuron and answers every parked request with `None`.
    ///
    /// Handles given out earlier become dead.
    pub fn reset(&self) {
        let state = self.inner.state.take();
        let wakeups: Wakeups = state
            .pending
            .into_values()
            .flatten()
            .map(|waiter| (waiter, None))
            .collect();
        wake(wakeups);
        debug!(neurons = state.neurons.len(), "brain reset");
        drop(state.neurons);
    }
}
