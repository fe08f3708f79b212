//! Shared plumbing for user supplied callbacks.
//!
//! Event handlers and signal callbacks both may fail, panic, or hand back a
//! deferred result. This module gives them one way to be invoked and one
//! shape for what they return.

use alloc::rc::Rc;
use core::panic::AssertUnwindSafe;
use std::panic::catch_unwind;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::Error;

/// A deferred result produced by a callback, settled later on the same thread.
pub type Deferred<T> = LocalBoxFuture<'static, anyhow::Result<T>>;

/// Runs `f`, turning both a returned error and a panic into [`Error::HandlerException`].
///
/// # Errors
///
/// Returns [`Error::HandlerException`] when `f` fails or panics.
pub fn invoke<T>(context: &str, f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, Error> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Error::handler(context, &err)),
        Err(payload) => Err(Error::panicked(context, payload.as_ref())),
    }
}

/// Awaits a deferred result, catching a panic raised while polling it.
///
/// # Errors
///
/// Returns [`Error::HandlerException`] when the future resolves to an error or panics.
pub async fn settle<T>(context: &str, deferred: Deferred<T>) -> Result<T, Error> {
    match AssertUnwindSafe(deferred).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Error::handler(context, &err)),
        Err(payload) => Err(Error::panicked(context, payload.as_ref())),
    }
}

/// Address of the allocation behind an `Rc`, used as a comparable identity.
///
/// Metadata of unsized pointees is discarded so that two `Rc<dyn Trait>`
/// pointing at the same closure always compare equal.
#[must_use]
pub fn identity<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc).cast::<()>() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn invoke_catches_errors_and_panics() {
        assert_eq!(invoke("ok", || Ok(3)).ok(), Some(3));

        let err = invoke::<()>("failing", || Err(anyhow::anyhow!("nope"))).unwrap_err();
        assert_eq!(err.to_string(), "failing failed: nope");

        let err = invoke::<()>("panicking", || panic!("boom")).unwrap_err();
        assert_eq!(err.to_string(), "panicking failed: boom");
    }

    #[test]
    fn settle_catches_deferred_failures() {
        let ok: Deferred<u8> = Box::pin(async { Ok::<u8, anyhow::Error>(1) });
        assert_eq!(block_on(settle("ok", ok)).ok(), Some(1));

        let failing: Deferred<u8> = Box::pin(async { Err::<u8, _>(anyhow::anyhow!("later")) });
        let err = block_on(settle("deferred", failing)).unwrap_err();
        assert_eq!(err.to_string(), "deferred failed: later");
    }

    #[test]
    fn identity_follows_allocation() {
        let a: Rc<dyn Fn()> = Rc::new(|| {});
        let b = a.clone();
        let c: Rc<dyn Fn()> = Rc::new(|| {});
        assert_eq!(identity(&a), identity(&b));
        assert_ne!(identity(&a), identity(&c));
    }
}
