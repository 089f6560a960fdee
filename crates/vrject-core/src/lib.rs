//! Shared logic for vrject: head-tracking math, session state, runtime
//! parameters, configuration, error types.
//!
//! Everything in this crate is platform-neutral; the injected library and
//! the launcher build on top of it.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod frame;
pub mod input;
pub mod params;
pub mod session;
pub mod tracking;

pub use config::Config;
pub use error::{Error, Result};
pub use frame::{composite_mode, plan_frame, CompositeMode, FrameAction};
pub use params::StereoParams;
pub use session::{SessionEvent, SessionPhase, SessionTracker, Transition};
pub use tracking::YawTracker;

/// Initialize tracing with sensible defaults.
///
/// Log level is controlled by the `RUST_LOG` environment variable.
/// Defaults to `info` if not set.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
