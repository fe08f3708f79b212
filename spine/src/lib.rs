//! # The event spine
//!
//! Nodes of a component tree register handlers on colon separated event
//! names (`chat:message:sent`) and emit events that bubble from the emitting
//! node up through its ancestors, or reach every interested node at once.
//!
//! ```text
//!  emit("a:b") from N2            tokens: [a:b, *]
//!
//!   root ──▶ handlers on a:b, then on *        (third)
//!    ▲
//!   N1   ──▶ handlers on a:b, then on *        (second)
//!    ▲
//!   N2   ──▶ handlers on a:b, then on *        (first)
//! ```
//!
//! Handlers receive an [`Event`] and may stop propagation, ask to be removed
//! after this call, or relabel the in-flight event so later handlers see a
//! different name and payload.
//!
//! ## Pieces
//!
//! - [`NamespaceRegistry`] interns names into [`Token`]s and reclaims unused branches.
//! - [`ListenerTable`] maps tokens to (node, handler, options) registrations.
//! - [`Spine`] ties both together and runs emissions.

extern crate alloc;

pub mod event;
pub mod listener;
pub mod namespace;
mod spine;


pub use event::{EmitOptions, Event, Propagation};
pub use listener::{
    Completion, Flag, Handler, IntoCompletion, ListenerOptions, ListenerSet, ListenerTable,
};
pub use namespace::{EventName, NamespaceRegistry, Token};
pub use spine::Spine;
