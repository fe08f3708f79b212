//! # Named groups and the channels between them
//!
//! Nodes join *groups* by key. All live members of a group form one
//! [`Neuron`]; each member's membership is a [`Dendrite`] carrying that
//! member's signal callbacks. A neuron can ask for an [`Axon`], a directed
//! channel to another group, and send *signals* over it to every member of
//! the receiving group.
//!
//! ```text
//!            Brain: "editor" ─▶ Neuron   "preview" ─▶ Neuron
//!                                 │  axon "render"       ▲
//!                                 └──────────────────────┘
//!   Dendrite(node 3) ┐                                   ┌ Dendrite(node 7)
//!   Dendrite(node 4) ┴─ members of "editor"  "preview" ──┴ Dendrite(node 9)
//! ```
//!
//! Groups come and go as their nodes mount and unmount, and the channels
//! follow:
//!
//! - Asking for a channel to a group with no members parks the request in
//!   the [`Brain`]; the channel is created the moment the group is joined.
//! - When a group's last member leaves, its neuron is torn down. Its own
//!   parked requests are cancelled, its outbound channels disappear, and
//!   every group that had a channel *into* it parks a fresh request, so the
//!   link comes back by itself when the group is joined again.
//!
//! ```
//! use backbone_axon::{Brain, Callbacks, SignalCallback};
//! use backbone_core::Component;
//! use futures::executor::block_on;
//! use serde_json::json;
//!
//! let brain = Brain::new();
//! let (editor, preview) = (Component::root(), Component::root());
//!
//! let source = brain.join("editor", &editor.as_node(), Callbacks::new());
//! let pending = source.request_channel("render", "preview");
//!
//! brain.join(
//!     "preview",
//!     &preview.as_node(),
//!     Callbacks::new().with("draw", SignalCallback::new(|data| json!({ "drawn": data }))),
//! );
//! let axon = block_on(pending).unwrap();
//! assert_eq!(axon.target_group(), "preview");
//!
//! let delivery = block_on(source.send_signal("render", "draw", json!(1))).unwrap();
//! assert_eq!(delivery[0].as_ref().unwrap(), &json!({ "drawn": 1 }));
//! ```

extern crate alloc;

mod axon;
mod brain;
mod dendrite;
mod neuron;
pub mod signal;

pub use axon::Axon;
pub use brain::{AxonId, Brain, DendriteId, NeuronId, Request};
pub use dendrite::Dendrite;
pub use neuron::Neuron;
pub use signal::{Callbacks, Delivery, IntoReply, Reply, SignalCallback};

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use backbone_core::{Component, Payload};
    use futures::executor::block_on;
    use serde_json::json;

    #[test]
    fn channel_heals_after_receiver_remounts() {
        let brain = Brain::new();
        let other = Component::root();
        let chat = Component::root();
        brain.join("chat", &chat.as_node(), Callbacks::new());
        let sender = brain.join("other", &other.as_node(), Callbacks::new());

        let first = block_on(sender.request_channel("ch", "chat")).unwrap();
        assert!(first.is_alive());

        chat.destroy();
        assert!(!brain.contains("chat"));
        assert!(!first.is_alive());
        assert_eq!(
            brain.pending_requests(),
            [Request {
                from: String::from("other"),
                to: String::from("chat"),
                channel: String::from("ch"),
            }]
        );

        let remounted = Component::root();
        brain.join(
            "chat",
            &remounted.as_node(),
            Callbacks::new().with("hello", SignalCallback::new(|_| json!("hi"))),
        );
        assert!(brain.pending_requests().is_empty());
        let delivery = block_on(sender.send_signal("ch", "hello", Payload::Null)).unwrap();
        assert_eq!(delivery[0].as_ref().unwrap(), &json!("hi"));
    }

    #[test]
    fn sender_teardown_drops_receiver_side_only() {
        let brain = Brain::new();
        let (a, b) = (Component::root(), Component::root());
        let sender = brain.join("a", &a.as_node(), Callbacks::new());
        brain.join("b", &b.as_node(), Callbacks::new());
        block_on(sender.request_channel("ch", "b")).unwrap();

        a.destroy();
        let receiver = brain.neuron("b").unwrap();
        assert!(receiver.inbound_channels().is_empty());
        assert!(brain.pending_requests().is_empty());
    }

    #[test]
    fn teardown_cancels_own_parked_requests() {
        let brain = Brain::new();
        let node = Component::root();
        let member = brain.join("waiting", &node.as_node(), Callbacks::new());
        let request = member.request_channel("ch", "never");

        node.destroy();
        assert_eq!(block_on(request), None);
        assert!(brain.pending_requests().is_empty());
    }

    #[test]
    fn channel_into_own_group_is_dropped_on_teardown() {
        let brain = Brain::new();
        let node = Component::root();
        let member = brain.join("loop", &node.as_node(), Callbacks::new());
        block_on(member.request_channel("self", "loop")).unwrap();

        node.destroy();
        assert!(brain.is_empty());
        assert!(brain.pending_requests().is_empty());
    }

    #[test]
    fn reset_forgets_everything() {
        let brain = Brain::new();
        let node = Component::root();
        let member = brain.join("a", &node.as_node(), Callbacks::new());
        let request = member.request_channel("ch", "b");

        brain.reset();
        assert!(brain.is_empty());
        assert!(!member.is_alive());
        assert_eq!(block_on(request), None);

        node.destroy();
        assert!(brain.is_empty());
    }
}
