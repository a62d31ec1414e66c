//! Domain constants for the inference endpoint.
//!
//! This module contains compile-time constants used throughout the application.
//! These are separated from runtime configuration to provide clear distinction
//! between values that never change and those that can be configured.

/// Model identity constants.
pub mod model {
    /// Identifier of the hub model served by default.
    pub const DEFAULT_MODEL_ID: &str = "nvidia/parakeet-tdt-0.6b-v2";
}

/// HTTP surface constants.
pub mod http {
    /// Health check route polled by the hosting platform.
    pub const PING_ROUTE: &str = "/ping";

    /// Transcription route.
    pub const INVOCATIONS_ROUTE: &str = "/invocations";

    /// Informational root route.
    pub const ROOT_ROUTE: &str = "/";

    /// Counters route.
    pub const METRICS_ROUTE: &str = "/metrics";

    /// The only request media type accepted by the invocations route.
    pub const JSON_CONTENT_TYPE: &str = "application/json";

    /// Seconds a client should wait before retrying while the model loads.
    pub const RETRY_AFTER_SECS: u64 = 5;

    /// Environment variable the hosting platform uses to assign the port.
    pub const BIND_PORT_ENV: &str = "SAGEMAKER_BIND_TO_PORT";

    /// Port used when nothing else is configured.
    pub const DEFAULT_PORT: u16 = 8080;
}

/// Audio ingestion constants.
pub mod audio {
    /// Prefix identifying an RFC 2397 data URL.
    pub const DATA_URL_PREFIX: &str = "data:";

    /// Suffix given to per-request temporary audio files.
    pub const TEMP_FILE_SUFFIX: &str = ".wav";

    /// Prefix given to per-request temporary audio files.
    pub const TEMP_FILE_PREFIX: &str = "invocation-";
}

/// Warm-up constants.
pub mod warmup {
    /// Sample rate of the synthetic warm-up clip.
    pub const SAMPLE_RATE: u32 = 16000;

    /// Length of the synthetic warm-up clip in samples (one second).
    pub const NUM_SAMPLES: usize = 16000;
}

/// Cloud provisioning constants.
pub mod provision {
    /// Variant name of the single production variant.
    pub const VARIANT_NAME: &str = "primary";

    /// Timestamp layout used in generated resource names.
    pub const NAME_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

    /// Endpoint status reported once the endpoint serves traffic.
    pub const IN_SERVICE: &str = "InService";
}

