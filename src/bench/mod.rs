//! Latency benchmark client for a deployed endpoint.

mod runner;
mod stats;
mod target;

pub use runner::{
    inline_payload, invoke_timed, run_benchmark, url_payload, BenchmarkReport, TimedResponse,
};
pub use stats::LatencySummary;
pub use target::{HttpTarget, InvocationTarget, SageMakerRuntimeTarget};
