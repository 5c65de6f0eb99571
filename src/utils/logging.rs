//! Structured logging via the `tracing` ecosystem.
//!
//! The library itself only emits events; embedding binaries call
//! [`init_logging`] once at startup. Filtering follows `RUST_LOG` when set.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a global subscriber writing compact output to stderr.
///
/// `default_directive` is used when `RUST_LOG` is absent, e.g. `"meshloc=info"`.
/// Calling this twice is a no-op rather than an error.
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init();
}
