//! The node lifecycle contract.
//!
//! The backbone never owns the component tree. A host framework hands it
//! nodes through the [`Node`] trait: a stable identity, a parent link and a
//! single "about to be destroyed" subscription point. Everything the spine
//! and the brain do with the tree goes through these three methods.
//!
//! [`Component`] is a small in-memory implementation for hosts that do not
//! have a tree of their own, and for tests.

use alloc::{boxed::Box, rc::Rc, vec::Vec};
use core::cell::{Cell, RefCell};
use core::fmt::{self, Debug};

/// Stable identity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(u64);

impl NodeId {
    /// Wraps an identifier supplied by the host framework.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    crate::counter_id!(@next);

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Shared reference to a node of the host tree.
pub type NodeRef = Rc<dyn Node>;

/// A node of a live, mutating tree of stateful components.
pub trait Node: 'static {
    /// Stable identity, unique among live nodes.
    fn uid(&self) -> NodeId;

    /// The parent node, or `None` for a root.
    fn parent(&self) -> Option<NodeRef>;

    /// Subscribes `callback` to the node's destruction.
    ///
    /// Callbacks run once, in subscription order, right before the node goes
    /// away. Implementations should run the callback immediately when the
    /// node is already destroyed.
    fn on_destroy(&self, callback: Box<dyn FnOnce()>);
}

impl Debug for dyn Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Node").field(&self.uid()).finish()
    }
}

/// An in-memory tree node.
///
/// ```
/// use backbone_core::node::{Component, Node};
///
/// let root = Component::root();
/// let child = Component::child_of(&root);
/// assert_eq!(child.parent().map(|p| p.uid()), Some(root.uid()));
/// ```
pub struct Component {
    id: NodeId,
    parent: Option<NodeRef>,
    destroyed: Cell<bool>,
    on_destroy: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("parent", &self.parent.as_ref().map(|p| p.uid()))
            .field("destroyed", &self.destroyed.get())
            .finish_non_exhaustive()
    }
}

impl Component {
    fn with_parent(parent: Option<NodeRef>) -> Rc<Self> {
        Rc::new(Self {
            id: NodeId::next(),
            parent,
            destroyed: Cell::new(false),
            on_destroy: RefCell::new(Vec::new()),
        })
    }

    /// Creates a root node.
    #[must_use]
    pub fn root() -> Rc<Self> {
        Self::with_parent(None)
    }

    /// Creates a child of `parent`.
    #[must_use]
    pub fn child_of(parent: &Rc<Self>) -> Rc<Self> {
        let parent: NodeRef = parent.clone();
        Self::with_parent(Some(parent))
    }

    /// Creates a child of an arbitrary node.
    #[must_use]
    pub fn child_of_node(parent: NodeRef) -> Rc<Self> {
        Self::with_parent(Some(parent))
    }

    /// Returns this component as a shared node reference.
    #[must_use]
    pub fn as_node(self: &Rc<Self>) -> NodeRef {
        self.clone()
    }

    /// Signals destruction, running every subscribed callback once.
    ///
    /// Callbacks subscribed while destruction is running still run.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        tracing::trace!(node = %self.id, "destroying component");
        loop {
            let pending: Vec<_> = self.on_destroy.borrow_mut().drain(..).collect();
            if pending.is_empty() {
                break;
            }
            for callback in pending {
                callback();
            }
        }
    }

    /// Returns `true` once [`Component::destroy`] has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }
}

impl Node for Component {
    fn uid(&self) -> NodeId {
        self.id
    }

    fn parent(&self) -> Option<NodeRef> {
        self.parent.clone()
    }

    fn on_destroy(&self, callback: Box<dyn FnOnce()>) {
        if self.destroyed.get() {
            callback();
        } else {
            self.on_destroy.borrow_mut().push(callback);
        }
    }
}
