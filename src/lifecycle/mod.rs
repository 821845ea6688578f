//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → shutdown_signal() resolves → server stops accepting
//!
//! Shutdown (shutdown.rs):
//!     Telemetry::shutdown() → Shutdown::trigger → heartbeat task exits
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownListener};
pub use signals::shutdown_signal;
