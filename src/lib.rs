#![doc = include_str!("../README.md")]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::future_not_send)]

extern crate alloc;

pub mod log;


use futures::task::LocalSpawn;

#[doc(inline)]
pub use backbone_axon as axon;
#[doc(inline)]
pub use backbone_spine as spine;

#[doc(inline)]
pub use backbone_axon::{Axon, Brain, Callbacks, Dendrite, Neuron, Reply, SignalCallback};
#[doc(inline)]
pub use backbone_core::{Component, Error, Node, NodeId, NodeRef, Payload};
#[doc(inline)]
pub use backbone_spine::{
    Completion, EmitOptions, Event, Flag, Handler, ListenerOptions, ListenerSet, Spine,
};

pub mod prelude {
    //! Everything a host needs to wire a component tree to the backbone.
    //!
    //! ```rust
    //! use backbone::prelude::*;
    //! use futures::executor::LocalPool;
    //!
    //! let pool = LocalPool::new();
    //! let backbone = Backbone::new(pool.spawner());
    //! let root = Component::root();
    //! backbone
    //!     .spine()
    //!     .on(&root.as_node(), "ready", Handler::new(|_| {}), ListenerOptions::new())
    //!     .unwrap();
    //! ```
    pub use super::Backbone;
    pub use backbone_axon::{
        Axon, Brain, Callbacks, Dendrite, IntoReply, Neuron, Reply, SignalCallback,
    };
    pub use backbone_core::{Component, Error, Node, NodeId, NodeRef, Payload};
    pub use backbone_spine::{
        Completion, EmitOptions, Event, Flag, Handler, IntoCompletion, ListenerOptions,
        ListenerSet, Spine,
    };
}

/// One event spine and one brain, sharing nothing with other instances.
///
/// Hosts usually build one per application and hand clones of the parts to
/// whatever needs them. Both parts are cheap handles.
#[derive(Debug, Clone)]
pub struct Backbone {
    spine: Spine,
    brain: Brain,
}

impl Backbone {
    /// Creates an empty backbone. Deferred results of eager emissions run on `spawner`.
    pub fn new(spawner: impl LocalSpawn + 'static) -> Self {
        Self {
            spine: Spine::new(spawner),
            brain: Brain::new(),
        }
    }

    /// The event spine.
    #[must_use]
    pub const fn spine(&self) -> &Spine {
        &self.spine
    }

    /// The group directory.
    #[must_use]
    pub const fn brain(&self) -> &Brain {
        &self.brain
    }

    /// Drops every listener, namespace, group and parked request.
    ///
    /// Parked channel requests resolve to `None`.
    pub fn reset(&self) {
        self.spine.reset();
        self.brain.reset();
        tracing::debug!("backbone reset");
    }
}
