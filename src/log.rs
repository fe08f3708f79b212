//! Console logging for hosts that do not bring their own subscriber.
//!
//! The crates only emit `tracing` events. Call [`install`] once at startup
//! to print them; `RUST_LOG` overrides the default `info` filter, e.g.
//! `RUST_LOG=backbone_axon=debug` to follow channels being linked and cut.

use std::sync::Once;

use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "info";

static TRACING_INSTALLED: Once = Once::new();

/// Installs a console subscriber filtered by `RUST_LOG`, `info` when unset (idempotent).
pub fn install() {
    install_with(DEFAULT_FILTER);
}

/// Installs a console subscriber, using `default_filter` when `RUST_LOG` is unset (idempotent).
///
/// Only the first call in a process has an effect. If another subscriber
/// is already set globally, this one is not installed.
pub fn install_with(default_filter: &str) {
    TRACING_INSTALLED.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_filter))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let console = fmt::layer().with_target(true).with_filter(filter);

        if tracing_subscriber::registry().with(console).try_init().is_err() {
            eprintln!("backbone: a global tracing subscriber is already installed");
        }
    });
}
