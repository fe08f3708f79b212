//! Core contracts shared by the backbone crates.
//!
//! This crate defines what the spine and the brain need from the outside
//! world, and the vocabulary they share:
//!
//! - [`node`] - the node lifecycle contract and an in-memory [`Component`](node::Component) tree
//! - [`handler`] - invoking user callbacks with panic and error isolation
//! - [`Error`] - the error taxonomy
//! - [`Payload`] - the dynamic value carried by events and signals

extern crate alloc;

#[macro_use]
mod macros;

pub mod error;
pub mod handler;
pub mod node;

pub use error::{Error, InvalidName};
pub use handler::Deferred;
pub use node::{Component, Node, NodeId, NodeRef};

/// Data carried by events, signals and signal replies.
pub type Payload = serde_json::Value;
