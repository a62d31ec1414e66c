//! Process-level reliability and observability.
//!
//! Log subscriber setup and shutdown signalling shared by the binaries.

pub mod graceful_shutdown;
pub mod tracing;

pub use graceful_shutdown::shutdown_signal;
pub use self::tracing::init_tracing;
