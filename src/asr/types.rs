//! Request, response and model output types for transcription.

use serde::{Deserialize, Serialize};

/// Raw shape of the `audio` request field before classification.
///
/// Clients send either a bare string or an object carrying `data` or `path`.
/// Anything else is kept verbatim so it can be rejected with a useful message.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawAudio {
    /// Data URL, bare base64, or container-local path.
    Text(String),
    /// Object form.
    Fields(AudioFields),
    /// Any other JSON value.
    Unsupported(serde_json::Value),
}

/// Object form of the `audio` field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioFields {
    /// Inline payload, data URL or base64. Takes precedence over `path`.
    #[serde(default)]
    pub data: Option<String>,

    /// Local path or `http(s)` URL.
    #[serde(default)]
    pub path: Option<String>,
}

/// Body of `POST /invocations`.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceRequest {
    /// The audio to transcribe.
    #[serde(default)]
    pub audio: Option<RawAudio>,

    /// Whether to return word level timestamps.
    #[serde(default)]
    pub timestamps: bool,

    /// Spoken language hint. Accepted for compatibility, not forwarded.
    #[serde(default)]
    pub language: Option<String>,
}

/// A word aligned to the audio timeline, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// Timestamp block of a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimestampSet {
    /// Word spans in transcript order.
    pub word: Vec<WordTimestamp>,
}

/// Successful body of `POST /invocations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    /// The transcript.
    pub text: String,

    /// Present only when timestamps were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<TimestampSet>,

    /// Seconds from request arrival to result assembly, millisecond precision.
    pub processing_time: f64,

    /// Identifier of the model that produced the transcript.
    pub model: String,
}

/// Options for a single model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscribeOptions {
    /// Ask the model for word level timestamps.
    pub word_timestamps: bool,
}

/// What a model backend returns for one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutput {
    /// The transcript.
    pub text: String,

    /// Word spans, when the backend produced any.
    pub words: Option<Vec<WordTimestamp>>,
}

/// Round a duration in seconds to millisecond precision.
pub fn round_to_millis(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}
