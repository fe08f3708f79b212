//! Emission: bubbling and global fan-out over the listener table.

use alloc::{
    boxed::Box,
    format,
    rc::{Rc, Weak},
    string::String,
    vec::Vec,
};
use core::cell::RefCell;
use std::collections::HashSet;

use backbone_core::{
    Deferred, Error, NodeId, NodeRef, Payload,
    handler::{invoke, settle},
};
use futures::future::{LocalBoxFuture, join_all, ready};
use futures::task::{LocalSpawn, LocalSpawnExt};
use tracing::{debug, error, warn};

use crate::{
    event::{EmitOptions, Event, Propagation},
    listener::{Completion, Handler, ListenerOptions, ListenerSet, ListenerTable},
    namespace::{EventName, NamespaceRegistry, Token},
};

#[derive(Debug, Default)]
struct SpineState {
    namespaces: NamespaceRegistry,
    listeners: ListenerTable,
    watched: HashSet<NodeId>,
}

impl SpineState {
    fn reclaim(&mut self, token: Token) {
        let Self {
            namespaces,
            listeners,
            ..
        } = self;
        namespaces.reclaim(token, |token| listeners.is_used(token));
    }
}

struct SpineInner {
    state: RefCell<SpineState>,
    spawner: Box<dyn LocalSpawn>,
}

backbone_core::impl_debug!(SpineInner);

/// The hierarchical event spine.
///
/// `Spine` is a cheap handle; clones share the same registry and listeners.
/// Handlers may capture a clone and emit further events while running.
#[derive(Debug, Clone)]
pub struct Spine {
    inner: Rc<SpineInner>,
}

/// Outcome of running every handler of one node, or of a whole global emission.
struct Level {
    pending: Vec<Deferred<()>>,
    stopped: bool,
}

impl Spine {
    /// Creates a spine. Deferred results of eager emissions are handed to `spawner`.
    pub fn new(spawner: impl LocalSpawn + 'static) -> Self {
        Self {
            inner: Rc::new(SpineInner {
                state: RefCell::new(SpineState::default()),
                spawner: Box::new(spawner),
            }),
        }
    }

    fn downgrade(&self) -> Weak<SpineInner> {
        Rc::downgrade(&self.inner)
    }

    /// Registers `handler` for `node` on `name`.
    ///
    /// Registering the same (name, node, handler) again replaces its options.
    /// The registration is dropped automatically when `node` is destroyed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEventName`] for a malformed name.
    pub fn on(
        &self,
        node: &NodeRef,
        name: &str,
        handler: Handler,
        options: ListenerOptions,
    ) -> Result<(), Error> {
        let name =
            EventName::parse(name).inspect_err(|err| warn!(%err, "listener not registered"))?;
        let uid = node.uid();
        let first_sighting = {
            let mut state = self.inner.state.borrow_mut();
            let token = state.namespaces.resolve_or_create(&name)[0];
            state.listeners.register(token, node, handler, options);
            state.watched.insert(uid)
        };
        if first_sighting {
            let spine = self.downgrade();
            node.on_destroy(Box::new(move || {
                if let Some(inner) = spine.upgrade() {
                    Self { inner }.forget(uid);
                }
            }));
        }
        Ok(())
    }

    fn forget(&self, uid: NodeId) {
        self.inner.state.borrow_mut().watched.remove(&uid);
        let removed = self.off_all(uid);
        debug!(node = %uid, removed, "node destroyed, listeners dropped");
    }

    /// Removes a registration, or every handler `uid` has on `name` when
    /// `handler` is `None`. Returns how many registrations were removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEventName`] for a malformed name.
    pub fn off(&self, uid: NodeId, name: &str, handler: Option<&Handler>) -> Result<usize, Error> {
        let name = EventName::parse(name).inspect_err(|err| warn!(%err, "listener not removed"))?;
        let mut state = self.inner.state.borrow_mut();
        let Some(token) = state.namespaces.lookup(&name) else {
            return Ok(0);
        };
        let removed = match handler {
            Some(handler) => usize::from(state.listeners.unregister(token, uid, handler)),
            None => state.listeners.unregister_token(token, uid),
        };
        if removed > 0 {
            state.reclaim(token);
        }
        Ok(removed)
    }

    /// Drops every registration of `uid`. Returns how many tokens it was listening on.
    pub fn off_all(&self, uid: NodeId) -> usize {
        let mut state = self.inner.state.borrow_mut();
        let tokens = state.listeners.unregister_all(uid);
        for token in &tokens {
            state.reclaim(*token);
        }
        tokens.len()
    }

    /// Registers a whole set for `node`, first dropping all of its
    /// registrations when `replace` is set.
    ///
    /// Every entry is attempted.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::InvalidEventName`] met.
    pub fn listen(&self, node: &NodeRef, set: &ListenerSet, replace: bool) -> Result<(), Error> {
        if replace {
            self.off_all(node.uid());
        }
        let mut first_error = None;
        for (name, handler, options) in set.iter() {
            if let Err(err) = self.on(node, name, handler.clone(), options.clone()) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Removes exactly the registrations of `set` for `uid`.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::InvalidEventName`] met.
    pub fn unlisten(&self, uid: NodeId, set: &ListenerSet) -> Result<usize, Error> {
        let mut removed = 0;
        let mut first_error = None;
        for (name, handler, _) in set.iter() {
            match self.off(uid, name, Some(handler)) {
                Ok(count) => removed += count,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(removed), Err)
    }

    /// Returns `true` when `uid` has at least one registration.
    #[must_use]
    pub fn has_listeners(&self, uid: NodeId) -> bool {
        self.listener_count(uid) > 0
    }

    /// Number of registrations held for `uid`.
    #[must_use]
    pub fn listener_count(&self, uid: NodeId) -> usize {
        self.inner.state.borrow().listeners.count(uid)
    }

    /// Tokens an emission of `name` would match right now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEventName`] for a malformed name.
    pub fn matching_tokens(&self, name: &str) -> Result<Vec<Token>, Error> {
        let name = EventName::parse(name)?;
        Ok(self.inner.state.borrow().namespaces.matching(&name))
    }

    /// Runs `f` against the namespace registry, for diagnostics.
    pub fn with_namespaces<R>(&self, f: impl FnOnce(&NamespaceRegistry) -> R) -> R {
        f(&self.inner.state.borrow().namespaces)
    }

    /// Drops every registration and namespace token.
    pub fn reset(&self) {
        let mut state = self.inner.state.borrow_mut();
        state.listeners = ListenerTable::new();
        state.namespaces.clear();
    }

    /// Emits `name` from `node`.
    ///
    /// An invalid name is logged and nothing is emitted. Eager emissions run
    /// to completion before this returns; their deferred handler results are
    /// spawned and the returned future is already complete. A non-eager
    /// emission runs synchronously until a node's handlers produce deferred
    /// results; the returned future settles those and carries on bubbling, so
    /// it must be polled for the emission to reach the remaining ancestors.
    pub fn emit(
        &self,
        node: &NodeRef,
        name: &str,
        payload: Payload,
        options: EmitOptions,
    ) -> LocalBoxFuture<'static, ()> {
        let name = match EventName::parse(name) {
            Ok(name) => name,
            Err(err) => {
                warn!(%err, "event not emitted");
                return Box::pin(ready(()));
            }
        };
        let tokens = self.inner.state.borrow().namespaces.matching(&name);
        let mut event = Event::new(node.clone(), name, tokens, payload, options);
        debug!(
            event = %event.name(),
            origin = %node.uid(),
            global = options.global,
            eager = options.eager,
            "emitting"
        );

        if options.global {
            let level = self.dispatch_global(&mut event);
            return self.conclude(&event, level.pending);
        }

        loop {
            let level = self.dispatch_node(&mut event);
            if !options.eager && !level.pending.is_empty() {
                let spine = self.clone();
                return Box::pin(async move { spine.bubble_lazily(event, level).await });
            }
            self.detach(&event, level.pending);
            if level.stopped || !event.climb() {
                return Box::pin(ready(()));
            }
        }
    }

    async fn bubble_lazily(self, mut event: Event, mut level: Level) {
        loop {
            settle_all(event.name(), level.pending).await;
            if level.stopped || !event.climb() {
                return;
            }
            level = self.dispatch_node(&mut event);
        }
    }

    fn conclude(&self, event: &Event, pending: Vec<Deferred<()>>) -> LocalBoxFuture<'static, ()> {
        if event.is_eager() || pending.is_empty() {
            self.detach(event, pending);
            return Box::pin(ready(()));
        }
        let name = String::from(event.name());
        Box::pin(async move { settle_all(&name, pending).await })
    }

    fn detach(&self, event: &Event, pending: Vec<Deferred<()>>) {
        for deferred in pending {
            let context = format!("handler for `{}`", event.name());
            let task = async move {
                if let Err(err) = settle(&context, deferred).await {
                    error!(%err, "deferred handler failed");
                }
            };
            if let Err(err) = self.inner.spawner.spawn_local(task) {
                error!(%err, event = %event.name(), "could not spawn deferred handler");
            }
        }
    }

    /// Runs every handler registered by the event's current caller node.
    fn dispatch_node(&self, event: &mut Event) -> Level {
        let node = event.caller().clone();
        let uid = node.uid();
        let mut level = Level {
            pending: Vec::new(),
            stopped: false,
        };
        let mut visited: Vec<Token> = Vec::new();
        while let Some(token) = event
            .tokens()
            .iter()
            .copied()
            .find(|token| !visited.contains(token))
        {
            visited.push(token);
            let (handlers, trigger) = {
                let state = self.inner.state.borrow();
                (
                    state.listeners.handlers(token, uid),
                    state.namespaces.path_of(token).unwrap_or_default(),
                )
            };
            for handler in handlers {
                if !event.tokens().contains(&token) {
                    break;
                }
                let Some(options) = self.options_of(token, uid, &handler) else {
                    continue;
                };
                event.begin_call(node.clone(), trigger.clone());
                let (deferred, stop) = self.call(event, token, &handler, &options);
                level.pending.extend(deferred);
                level.stopped |= stop;
            }
        }
        level
    }

    /// Runs every matching handler in the tree, ignoring positions.
    fn dispatch_global(&self, event: &mut Event) -> Level {
        let mut pending = Vec::new();
        for token in event.tokens().to_vec() {
            let (nodes, trigger) = {
                let state = self.inner.state.borrow();
                (
                    state.listeners.nodes(token),
                    state.namespaces.path_of(token).unwrap_or_default(),
                )
            };
            for (node, handlers) in nodes {
                let uid = node.uid();
                for handler in handlers {
                    let Some(options) = self.options_of(token, uid, &handler) else {
                        continue;
                    };
                    event.begin_call(node.clone(), trigger.clone());
                    let (deferred, _) = self.call(event, token, &handler, &options);
                    pending.extend(deferred);
                }
            }
        }
        Level {
            pending,
            stopped: false,
        }
    }

    fn options_of(&self, token: Token, uid: NodeId, handler: &Handler) -> Option<ListenerOptions> {
        self.inner.state.borrow().listeners.options(token, uid, handler)
    }

    /// Invokes one handler and applies its stop and once settings.
    fn call(
        &self,
        event: &mut Event,
        token: Token,
        handler: &Handler,
        options: &ListenerOptions,
    ) -> (Option<Deferred<()>>, bool) {
        let context = format!("handler for `{}`", event.name());
        let deferred = match invoke(&context, || handler.call(event)) {
            Ok(Completion::Done) => None,
            Ok(Completion::Deferred(deferred)) => Some(deferred),
            Err(err) => {
                error!(%err, node = %event.caller().uid(), "event handler failed");
                None
            }
        };

        if event.take_relabel() {
            let tokens = self.inner.state.borrow().namespaces.matching(event.event_name());
            event.set_tokens(tokens);
        }

        let stop = !event.is_global()
            && match event.propagation() {
                Propagation::Stop => true,
                Propagation::Continue => false,
                Propagation::Unset => {
                    options.stop_propagation.evaluate(event, "stop_propagation option")
                }
            };

        let once = event.once_requested() || options.once.evaluate(event, "once option");
        if once {
            let uid = event.caller().uid();
            let mut state = self.inner.state.borrow_mut();
            if state.listeners.unregister(token, uid, handler) {
                state.reclaim(token);
            }
        }
        (deferred, stop)
    }
}

/// Awaits every deferred result, logging the failures; one failure never
/// prevents the others from settling.
async fn settle_all(name: &str, pending: Vec<Deferred<()>>) {
    let context = format!("handler for `{name}`");
    let outcomes = join_all(pending.into_iter().map(|deferred| settle(&context, deferred))).await;
    for err in outcomes.into_iter().filter_map(Result::err) {
        error!(%err, "deferred handler failed");
    }
}
