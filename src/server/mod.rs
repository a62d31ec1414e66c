//! Web server and API implementation.
//!
//! This module provides the HTTP surface of the inference container and the model
//! lifecycle behind it.

mod handlers;
mod metrics;
mod state;

pub use handlers::{create_router, invocations, metrics_handler, ping, root};
pub use metrics::{Outcome, ServiceMetrics};
pub use state::{Readiness, ServiceContext};
