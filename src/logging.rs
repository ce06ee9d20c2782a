//! Logging prelude: convenient re-exports of `tracing` macros
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("starting sync session");
//! warn!("state file malformed, starting fresh");
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Initialize the global tracing subscriber.
///
/// Logs at INFO and above by default; controlled by `RUST_LOG`:
///
/// ```bash
/// RUST_LOG=debug duosync push ~/docs
/// RUST_LOG=duosync::session=trace duosync serve
/// ```
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();
}

// vim: ts=4
