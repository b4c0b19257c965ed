//! Logging initialisation
//!
//! The library only emits `tracing` events; binaries decide where they go.
//!
//! ```bash
//! RUST_LOG=debug stream-decoder clip.mp4                  # debug and above
//! RUST_LOG=stream_decoder::io=trace stream-decoder clip.mp4   # adapter reads and seeks
//! ```

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_level` when set.
pub fn init_logging(default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}
