//! Signal callbacks held by dendrites and what they answer.

use alloc::{boxed::Box, rc::Rc, string::String, vec::Vec};
use core::future::Future;

use backbone_core::{Deferred, Error, Payload, handler::identity, impl_debug};

/// Settled outcome of every dendrite a signal reached, in join order.
///
/// A dendrite without a callback for the signal contributes `Ok(Payload::Null)`.
pub type Delivery = Vec<Result<Payload, Error>>;

/// What a signal callback hands back.
pub enum Reply {
    /// An immediate value.
    Ready(Payload),
    /// A value that settles later.
    Deferred(Deferred<Payload>),
}

impl_debug!(Reply);

impl Reply {
    /// Wraps a future as a deferred reply.
    pub fn deferred(future: impl Future<Output = anyhow::Result<Payload>> + 'static) -> Self {
        Self::Deferred(Box::pin(future))
    }
}

/// Conversion of callback return values into a [`Reply`].
pub trait IntoReply {
    /// Performs the conversion.
    ///
    /// # Errors
    ///
    /// Propagates the error the callback returned.
    fn into_reply(self) -> anyhow::Result<Reply>;
}

impl IntoReply for () {
    fn into_reply(self) -> anyhow::Result<Reply> {
        Ok(Reply::Ready(Payload::Null))
    }
}

impl IntoReply for Payload {
    fn into_reply(self) -> anyhow::Result<Reply> {
        Ok(Reply::Ready(self))
    }
}

impl IntoReply for Reply {
    fn into_reply(self) -> anyhow::Result<Reply> {
        Ok(self)
    }
}

impl<T: IntoReply> IntoReply for anyhow::Result<T> {
    fn into_reply(self) -> anyhow::Result<Reply> {
        self.and_then(IntoReply::into_reply)
    }
}

type CallbackFn = dyn Fn(Payload) -> anyhow::Result<Reply>;

/// A callback run when a signal reaches a dendrite.
///
/// ```
/// use backbone_axon::{Reply, SignalCallback};
/// use serde_json::json;
///
/// let echo = SignalCallback::new(|data| data);
/// let silent = SignalCallback::new(|_| {});
/// let later = SignalCallback::new(|_| Reply::deferred(async { Ok(json!("done")) }));
/// assert_ne!(echo, silent);
/// assert_eq!(later, later.clone());
/// ```
#[derive(Clone)]
pub struct SignalCallback(Rc<CallbackFn>);

impl_debug!(SignalCallback);

impl SignalCallback {
    /// Wraps a closure as a signal callback.
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(Payload) -> R + 'static,
        R: IntoReply,
    {
        Self(Rc::new(move |data| f(data).into_reply()))
    }

    pub(crate) fn call(&self, data: Payload) -> anyhow::Result<Reply> {
        (self.0)(data)
    }
}

impl PartialEq for SignalCallback {
    fn eq(&self, other: &Self) -> bool {
        identity(&self.0) == identity(&other.0)
    }
}

impl Eq for SignalCallback {}

/// Signal callbacks keyed by signal name.
///
/// Later entries for the same signal replace earlier ones when applied to a
/// dendrite.
#[derive(Debug, Clone, Default)]
pub struct Callbacks {
    entries: Vec<(String, SignalCallback)>,
}

impl Callbacks {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a callback for `signal`.
    #[must_use]
    pub fn with(mut self, signal: impl Into<String>, callback: SignalCallback) -> Self {
        self.entries.push((signal.into(), callback));
        self
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the set holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(signal, callback)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SignalCallback)> {
        self.entries
            .iter()
            .map(|(signal, callback)| (signal.as_str(), callback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    #[test]
    fn return_values_become_replies() {
        let unit = SignalCallback::new(|_| {});
        assert!(matches!(unit.call(json!(1)).unwrap(), Reply::Ready(Payload::Null)));

        let echo = SignalCallback::new(|data| data);
        assert!(matches!(echo.call(json!(2)).unwrap(), Reply::Ready(value) if value == json!(2)));

        let failing =
            SignalCallback::new(|_| -> anyhow::Result<Payload> { anyhow::bail!("refused") });
        assert_eq!(failing.call(Payload::Null).unwrap_err().to_string(), "refused");
    }

    #[test]
    fn deferred_reply_settles_later() {
        let later = SignalCallback::new(|data: Payload| {
            Reply::deferred(async move { Ok(json!({ "got": data })) })
        });
        let Reply::Deferred(deferred) = later.call(json!(3)).unwrap() else {
            panic!("expected a deferred reply");
        };
        assert_eq!(block_on(deferred).unwrap(), json!({ "got": 3 }));
    }

    #[test]
    fn callbacks_keep_insertion_order() {
        let set = Callbacks::new()
            .with("open", SignalCallback::new(|_| {}))
            .with("close", SignalCallback::new(|_| {}));
        let names: Vec<_> = set.iter().map(|(signal, _)| signal).collect();
        assert_eq!(names, ["open", "close"]);
        assert_eq!(set.len(), 2);
    }
}
