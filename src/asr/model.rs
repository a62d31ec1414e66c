//! Seams between the service and the speech model it wraps.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::asr::types::{ModelOutput, TranscribeOptions};
use crate::error::ModelError;

/// A loaded speech recognition model.
///
/// The model reads audio from a file path; callers own the file and keep it alive
/// for the duration of the call.
#[async_trait]
pub trait SpeechModel: Send + Sync {
    /// Transcribe one audio file.
    ///
    /// # Arguments
    /// * `audio_path` - Path to an audio file readable by the model
    /// * `options` - Per-call options
    ///
    /// # Returns
    /// The transcript and, when requested and available, word spans
    async fn transcribe(
        &self,
        audio_path: &Path,
        options: TranscribeOptions,
    ) -> Result<ModelOutput, ModelError>;
}

/// Produces a ready-to-use model. Called once per process.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the model, waiting for it to become available.
    async fn load(&self) -> Result<Arc<dyn SpeechModel>, ModelError>;
}
