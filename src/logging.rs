//! Tracing initialization.
//!
//! One compact `tracing-subscriber` layer on stderr with environment-based
//! filtering: `RUST_LOG` wins when set, otherwise the filter from the
//! configuration file applies. The monitor runs unattended for weeks, so
//! the default output leans terse; turn on `debug` (or `cryomon=trace`)
//! to watch the wire traffic.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// Idempotent: a second call (tests, embedding) leaves the existing
/// subscriber in place.
pub fn init(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let fmt_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
