//! The `parakeet_endpoint` core library.
//!
//! This crate serves a pretrained speech recognition model behind a SageMaker-style
//! real-time endpoint (`/ping`, `/invocations`), provisions that endpoint, and
//! benchmarks it.

pub mod asr;
pub mod bench;
pub mod config;
pub mod constants;
pub mod error;
pub mod provision;
pub mod reliability;
pub mod server;
