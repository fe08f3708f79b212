//! Error taxonomy shared by the spine and the brain.
//!
//! None of these are fatal. Emission and channel plumbing log them and carry
//! on; registration functions also return them so callers can react.

use alloc::string::{String, ToString};
use core::any::Any;
use thiserror::Error;

/// Why an event name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidName {
    /// Nothing left after trimming.
    #[error("name is empty")]
    Empty,
    /// Two adjacent colons, or a leading or trailing colon.
    #[error("name contains an empty segment")]
    EmptySegment,
    /// Whitespace inside the name.
    #[error("name contains whitespace")]
    Whitespace,
    /// `*` used as a segment of a longer name.
    #[error("`*` is only valid as the whole name")]
    MisplacedWildcard,
}

/// Errors reported by the backbone.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A malformed namespace string.
    #[error("invalid event name `{name}`: {reason}")]
    InvalidEventName {
        /// The name as supplied.
        name: String,
        /// What is wrong with it.
        reason: InvalidName,
    },
    /// A registered handler or channel callback failed or panicked.
    #[error("{context} failed: {message}")]
    HandlerException {
        /// Where the failure happened, e.g. the event or signal name.
        context: String,
        /// Rendered failure.
        message: String,
    },
    /// A signal was sent on a channel key with no axon.
    #[error("group `{group}` has no channel `{channel}`")]
    ChannelUnavailable {
        /// Sending group.
        group: String,
        /// Requested channel key.
        channel: String,
    },
    /// An axon request could not be completed.
    #[error("channel request from `{from}` to `{to}` failed: {reason}")]
    RequestFailure {
        /// Requesting group.
        from: String,
        /// Target group.
        to: String,
        /// What went wrong.
        reason: String,
    },
}

impl Error {
    /// Builds an [`Error::InvalidEventName`].
    pub fn invalid_name(name: impl Into<String>, reason: InvalidName) -> Self {
        Self::InvalidEventName {
            name: name.into(),
            reason,
        }
    }

    /// Wraps a handler's returned error.
    pub fn handler(context: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::HandlerException {
            context: context.into(),
            message: alloc::format!("{err:#}"),
        }
    }

    /// Wraps a panic payload caught while running a handler.
    pub fn panicked(context: impl Into<String>, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string());
        Self::HandlerException {
            context: context.into(),
            message,
        }
    }
}
