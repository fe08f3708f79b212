//! Listener registrations keyed by namespace token.
//!
//! A registration is the triple (token, node, handler). Registering the same
//! triple again only replaces its options. The table keeps a reverse index
//! from node to tokens so that a destroyed node can be dropped in one sweep.

use alloc::{rc::Rc, vec::Vec};
use core::future::Future;
use std::collections::{BTreeSet, HashMap};

use backbone_core::{
    Deferred, NodeId, NodeRef,
    handler::{identity, invoke},
    impl_debug,
};

use crate::{event::Event, namespace::Token};

/// What a handler hands back to the spine.
pub enum Completion {
    /// The handler finished synchronously.
    Done,
    /// The handler started work that settles later.
    Deferred(Deferred<()>),
}

impl_debug!(Completion);

impl Completion {
    /// Wraps a future as a deferred completion.
    pub fn deferred(future: impl Future<Output = anyhow::Result<()>> + 'static) -> Self {
        Self::Deferred(alloc::boxed::Box::pin(future))
    }
}

/// Conversion of handler return values into a [`Completion`].
pub trait IntoCompletion {
    /// Performs the conversion.
    ///
    /// # Errors
    ///
    /// Propagates the error the handler returned.
    fn into_completion(self) -> anyhow::Result<Completion>;
}

impl IntoCompletion for () {
    fn into_completion(self) -> anyhow::Result<Completion> {
        Ok(Completion::Done)
    }
}

impl IntoCompletion for Completion {
    fn into_completion(self) -> anyhow::Result<Completion> {
        Ok(self)
    }
}

impl<T: IntoCompletion> IntoCompletion for anyhow::Result<T> {
    fn into_completion(self) -> anyhow::Result<Completion> {
        self.and_then(IntoCompletion::into_completion)
    }
}

type HandlerFn = dyn Fn(&mut Event) -> anyhow::Result<Completion>;

/// An event handler with a stable identity.
///
/// Clones share the identity of the original, so a clone can be used to
/// remove a registration.
///
/// ```
/// use backbone_spine::{Completion, Handler};
///
/// let sync = Handler::new(|event| println!("{}", event.name()));
/// let fallible = Handler::new(|_| -> anyhow::Result<()> { Ok(()) });
/// let deferred = Handler::new(|_| Completion::deferred(async { Ok(()) }));
/// assert_ne!(sync, fallible);
/// assert_eq!(deferred, deferred.clone());
/// ```
#[derive(Clone)]
pub struct Handler(Rc<HandlerFn>);

impl_debug!(Handler);

impl Handler {
    /// Wraps a closure as a handler.
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(&mut Event) -> R + 'static,
        R: IntoCompletion,
    {
        Self(Rc::new(move |event: &mut Event| f(event).into_completion()))
    }

    pub(crate) fn call(&self, event: &mut Event) -> anyhow::Result<Completion> {
        (self.0)(event)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        identity(&self.0) == identity(&other.0)
    }
}

impl Eq for Handler {}

/// A registration setting: off, on, or decided per event.
#[derive(Clone, Default)]
pub enum Flag {
    /// Never applies.
    #[default]
    Off,
    /// Always applies.
    On,
    /// Applies when the predicate returns `true` for the event.
    When(Rc<dyn Fn(&Event) -> bool>),
}

impl_debug!(Flag);

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

impl Flag {
    /// Builds a predicate flag.
    pub fn when(predicate: impl Fn(&Event) -> bool + 'static) -> Self {
        Self::When(Rc::new(predicate))
    }

    /// Evaluates the flag for `event`. A panicking predicate counts as `false`.
    pub(crate) fn evaluate(&self, event: &Event, setting: &str) -> bool {
        match self {
            Self::Off => false,
            Self::On => true,
            Self::When(predicate) => match invoke(setting, || Ok(predicate(event))) {
                Ok(value) => value,
                Err(err) => {
                    tracing::error!(event = %event.name(), %err, "option predicate failed");
                    false
                }
            },
        }
    }
}

/// Per registration settings.
#[derive(Debug, Clone, Default)]
pub struct ListenerOptions {
    /// Stop bubbling after this handler ran.
    pub stop_propagation: Flag,
    /// Remove the registration after this handler ran.
    pub once: Flag,
}

impl ListenerOptions {
    /// Options with everything off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stop-propagation setting.
    #[must_use]
    pub fn with_stop_propagation(mut self, flag: impl Into<Flag>) -> Self {
        self.stop_propagation = flag.into();
        self
    }

    /// Sets the once setting.
    #[must_use]
    pub fn with_once(mut self, flag: impl Into<Flag>) -> Self {
        self.once = flag.into();
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Listener {
    pub(crate) handler: Handler,
    pub(crate) options: ListenerOptions,
}

#[derive(Debug)]
struct NodeListeners {
    node: NodeRef,
    listeners: Vec<Listener>,
}

/// Registrations grouped by token, then by node, in registration order.
#[derive(Debug, Default)]
pub struct ListenerTable {
    by_token: HashMap<Token, Vec<NodeListeners>>,
    by_node: HashMap<NodeId, BTreeSet<Token>>,
}

impl ListenerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `node` under `token`, replacing the options of
    /// an identical registration.
    pub fn register(
        &mut self,
        token: Token,
        node: &NodeRef,
        handler: Handler,
        options: ListenerOptions,
    ) {
        let uid = node.uid();
        let nodes = self.by_token.entry(token).or_default();
        let slot = match nodes.iter().position(|entry| entry.node.uid() == uid) {
            Some(index) => &mut nodes[index],
            None => {
                nodes.push(NodeListeners {
                    node: node.clone(),
                    listeners: Vec::new(),
                });
                let last = nodes.len() - 1;
                &mut nodes[last]
            }
        };
        match slot.listeners.iter_mut().find(|listener| listener.handler == handler) {
            Some(existing) => existing.options = options,
            None => slot.listeners.push(Listener { handler, options }),
        }
        self.by_node.entry(uid).or_default().insert(token);
    }

    /// Removes one registration. Returns `true` when it existed.
    pub fn unregister(&mut self, token: Token, uid: NodeId, handler: &Handler) -> bool {
        self.remove_where(token, uid, |listener| listener.handler == *handler) > 0
    }

    /// Removes every handler `uid` registered under `token`.
    pub fn unregister_token(&mut self, token: Token, uid: NodeId) -> usize {
        self.remove_where(token, uid, |_| true)
    }

    fn remove_where(
        &mut self,
        token: Token,
        uid: NodeId,
        matches: impl Fn(&Listener) -> bool,
    ) -> usize {
        let Some(nodes) = self.by_token.get_mut(&token) else {
            return 0;
        };
        let Some(index) = nodes.iter().position(|entry| entry.node.uid() == uid) else {
            return 0;
        };
        let listeners = &mut nodes[index].listeners;
        let before = listeners.len();
        listeners.retain(|listener| !matches(listener));
        let removed = before - listeners.len();
        if listeners.is_empty() {
            nodes.remove(index);
            if nodes.is_empty() {
                self.by_token.remove(&token);
            }
            if let Some(tokens) = self.by_node.get_mut(&uid) {
                tokens.remove(&token);
                if tokens.is_empty() {
                    self.by_node.remove(&uid);
                }
            }
        }
        removed
    }

    /// Drops every registration of `uid`, returning the tokens it touched.
    pub fn unregister_all(&mut self, uid: NodeId) -> Vec<Token> {
        let tokens: Vec<Token> = self
            .by_node
            .remove(&uid)
            .map(|tokens| tokens.into_iter().collect())
            .unwrap_or_default();
        for token in &tokens {
            if let Some(nodes) = self.by_token.get_mut(token) {
                nodes.retain(|entry| entry.node.uid() != uid);
                if nodes.is_empty() {
                    self.by_token.remove(token);
                }
            }
        }
        tokens
    }

    /// Returns `true` when some node still listens on `token`.
    #[must_use]
    pub fn is_used(&self, token: Token) -> bool {
        self.by_token.contains_key(&token)
    }

    /// Handlers `uid` registered under `token`, in registration order.
    pub(crate) fn handlers(&self, token: Token, uid: NodeId) -> Vec<Handler> {
        self.by_token
            .get(&token)
            .and_then(|nodes| nodes.iter().find(|entry| entry.node.uid() == uid))
            .map(|entry| entry.listeners.iter().map(|l| l.handler.clone()).collect())
            .unwrap_or_default()
    }

    /// Every node listening on `token` with its handlers, in registration order.
    pub(crate) fn nodes(&self, token: Token) -> Vec<(NodeRef, Vec<Handler>)> {
        self.by_token
            .get(&token)
            .map(|nodes| {
                nodes
                    .iter()
                    .map(|entry| {
                        let handlers = entry.listeners.iter().map(|l| l.handler.clone()).collect();
                        (entry.node.clone(), handlers)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Current options of a registration, `None` once it is gone.
    pub(crate) fn options(
        &self,
        token: Token,
        uid: NodeId,
        handler: &Handler,
    ) -> Option<ListenerOptions> {
        self.by_token
            .get(&token)?
            .iter()
            .find(|entry| entry.node.uid() == uid)?
            .listeners
            .iter()
            .find(|listener| listener.handler == *handler)
            .map(|listener| listener.options.clone())
    }

    /// Number of registrations held for `uid`.
    #[must_use]
    pub fn count(&self, uid: NodeId) -> usize {
        self.by_node.get(&uid).map_or(0, |tokens| {
            tokens
                .iter()
                .filter_map(|token| self.by_token.get(token))
                .flat_map(|nodes| nodes.iter().filter(|entry| entry.node.uid() == uid))
                .map(|entry| entry.listeners.len())
                .sum()
        })
    }

    /// Tokens `uid` is recorded against.
    #[must_use]
    pub fn tokens_of(&self, uid: NodeId) -> Vec<Token> {
        self.by_node
            .get(&uid)
            .map(|tokens| tokens.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// A batch of registrations for one node.
///
/// ```
/// use backbone_spine::{Handler, ListenerOptions, ListenerSet};
///
/// let set = ListenerSet::new()
///     .with("chat:opened", Handler::new(|_| {}))
///     .with_options("chat:closed", Handler::new(|_| {}), ListenerOptions::new().with_once(true));
/// assert_eq!(set.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ListenerSet {
    entries: Vec<(alloc::string::String, Handler, ListenerOptions)>,
}

impl ListenerSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a registration with default options.
    #[must_use]
    pub fn with(self, name: impl Into<alloc::string::String>, handler: Handler) -> Self {
        self.with_options(name, handler, ListenerOptions::default())
    }

    /// Adds a registration with explicit options.
    #[must_use]
    pub fn with_options(
        mut self,
        name: impl Into<alloc::string::String>,
        handler: Handler,
        options: ListenerOptions,
    ) -> Self {
        self.entries.push((name.into(), handler, options));
        self
    }

    /// Number of registrations in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the set holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(name, handler, options)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Handler, &ListenerOptions)> {
        self.entries
            .iter()
            .map(|(name, handler, options)| (name.as_str(), handler, options))
    }
}
