//! Speech recognition request handling.
//!
//! This module contains everything between an HTTP request body and the model:
//! audio ingestion, the model seams, the runtime-backed model, warm-up and the
//! per-request pipeline.

mod audio;
mod model;
mod pipeline;
mod remote;
pub mod types;
mod warmup;

pub use audio::{decode_base64, decode_data_url, encode_base64, AudioResolver, AudioSource};
pub use model::{ModelLoader, SpeechModel};
pub use pipeline::{write_temp_audio, InferencePipeline};
pub(crate) use pipeline::panic_message;
pub use remote::{parse_transcription, RuntimeModel, RuntimeModelLoader, RuntimeSettings};
pub use types::{
    InferenceRequest, InferenceResponse, ModelOutput, RawAudio, TimestampSet, TranscribeOptions,
    WordTimestamp,
};
pub use warmup::{silent_wav, warm_up};

#[cfg(test)]
pub(crate) use pipeline::tests::{Behavior, ScriptedModel};
