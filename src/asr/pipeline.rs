//! Transcription request pipeline.
//!
//! Resolves the audio, stages it in a scoped temporary file, invokes the model once
//! and assembles the response. The temporary file is removed when it goes out of
//! scope, on success, on error and on panic.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tokio::sync::Semaphore;
use tracing::info;

use crate::asr::audio::{AudioResolver, AudioSource};
use crate::asr::model::SpeechModel;
use crate::asr::types::{round_to_millis, InferenceResponse, TimestampSet, TranscribeOptions};
use crate::constants::audio::{TEMP_FILE_PREFIX, TEMP_FILE_SUFFIX};
use crate::error::{AppError, ModelError, Result};

/// Write audio bytes to a fresh temporary file that is deleted on drop.
pub async fn write_temp_audio(bytes: &[u8], dir: Option<&Path>) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_FILE_PREFIX).suffix(TEMP_FILE_SUFFIX);
    let file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    tokio::fs::write(file.path(), bytes).await?;
    Ok(file)
}

/// Per-request transcription work, shared by all handlers.
pub struct InferencePipeline {
    resolver: AudioResolver,
    model_id: String,
    temp_dir: Option<PathBuf>,
    permits: Arc<Semaphore>,
}

impl InferencePipeline {
    /// Create a pipeline.
    ///
    /// # Arguments
    /// * `resolver` - Turns audio sources into bytes
    /// * `model_id` - Identifier echoed in every response
    /// * `temp_dir` - Where to stage audio files, system default when `None`
    /// * `max_concurrent_inferences` - Model calls allowed in flight at once
    pub fn new(
        resolver: AudioResolver,
        model_id: impl Into<String>,
        temp_dir: Option<PathBuf>,
        max_concurrent_inferences: usize,
    ) -> Self {
        Self {
            resolver,
            model_id: model_id.into(),
            temp_dir,
            permits: Arc::new(Semaphore::new(max_concurrent_inferences.max(1))),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_deref()
    }

    /// Transcribe one request.
    ///
    /// # Arguments
    /// * `model` - The loaded model
    /// * `source` - Classified audio source
    /// * `timestamps` - Whether word spans were requested
    /// * `started` - Request arrival, the origin of `processing_time`
    pub async fn run(
        &self,
        model: &dyn SpeechModel,
        source: &AudioSource,
        timestamps: bool,
        started: Instant,
    ) -> Result<InferenceResponse> {
        let audio = self.resolver.resolve(source).await?;
        let staged = write_temp_audio(&audio, self.temp_dir()).await?;

        info!("Transcribing audio file: {} bytes", audio.len());

        let options = TranscribeOptions {
            word_timestamps: timestamps,
        };
        let output = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| AppError::Internal("inference queue closed".to_string()))?;

            AssertUnwindSafe(model.transcribe(staged.path(), options))
                .catch_unwind()
                .await
                .map_err(|panic| ModelError::Panicked(panic_message(panic.as_ref())))??
        };
        drop(staged);

        let timestamps = timestamps.then(|| TimestampSet {
            word: output.words.unwrap_or_default(),
        });
        let processing_time = started.elapsed().as_secs_f64();

        info!("Transcription completed in {:.3}s", processing_time);

        Ok(InferenceResponse {
            text: output.text,
            timestamps,
            processing_time: round_to_millis(processing_time),
            model: self.model_id.clone(),
        })
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::asr::types::{ModelOutput, WordTimestamp};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// What the scripted model does when called.
    #[derive(Clone)]
    pub(crate) enum Behavior {
        Reply(ModelOutput),
        Fail,
        Panic,
    }

    /// Model double that records the paths it was handed.
    pub(crate) struct ScriptedModel {
        pub behavior: Behavior,
        pub seen: Mutex<Vec<(PathBuf, bool)>>,
    }

    impl ScriptedModel {
        pub fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(text: &str, words: Option<Vec<WordTimestamp>>) -> Self {
            Self::new(Behavior::Reply(ModelOutput {
                text: text.to_string(),
                words,
            }))
        }

        pub fn seen_paths(&self) -> Vec<PathBuf> {
            self.seen.lock().iter().map(|(p, _)| p.clone()).collect()
        }
    }

    #[async_trait]
    impl SpeechModel for ScriptedModel {
        async fn transcribe(
            &self,
            audio_path: &Path,
            _options: TranscribeOptions,
        ) -> std::result::Result<ModelOutput, ModelError> {
            self.seen
                .lock()
                .push((audio_path.to_path_buf(), audio_path.exists()));
            match &self.behavior {
                Behavior::Reply(output) => Ok(output.clone()),
                Behavior::Fail => Err(ModelError::InvalidOutput("scripted failure".to_string())),
                Behavior::Panic => panic!("scripted panic"),
            }
        }
    }

    fn pipeline() -> InferencePipeline {
        let resolver = AudioResolver::new(Duration::from_secs(5), 1 << 20).unwrap();
        InferencePipeline::new(resolver, "test/model", None, 1)
    }

    fn inline() -> AudioSource {
        AudioSource::InlineBase64("UklGRg==".to_string())
    }

    #[tokio::test]
    async fn test_run_without_timestamps() {
        let model = ScriptedModel::replying("hello", None);
        let response = pipeline()
            .run(&model, &inline(), false, Instant::now())
            .await
            .unwrap();

        assert_eq!(response.text, "hello");
        assert_eq!(response.model, "test/model");
        assert!(response.timestamps.is_none());
        assert!(response.processing_time >= 0.0);
    }

    #[tokio::test]
    async fn test_run_with_timestamps_defaults_to_empty() {
        let model = ScriptedModel::replying("hello", None);
        let response = pipeline()
            .run(&model, &inline(), true, Instant::now())
            .await
            .unwrap();
        assert_eq!(response.timestamps, Some(TimestampSet::default()));

        let words = vec![WordTimestamp {
            word: "hello".into(),
            start: 0.0,
            end: 0.3,
        }];
        let model = ScriptedModel::replying("hello", Some(words.clone()));
        let response = pipeline()
            .run(&model, &inline(), true, Instant::now())
            .await
            .unwrap();
        assert_eq!(response.timestamps.unwrap().word, words);
    }

    #[tokio::test]
    async fn test_temp_file_removed_after_success() {
        let model = ScriptedModel::replying("hello", None);
        pipeline()
            .run(&model, &inline(), false, Instant::now())
            .await
            .unwrap();

        let seen = model.seen.lock().clone();
        assert_eq!(seen.len(), 1);
        let (path, existed_during_call) = &seen[0];
        assert!(existed_during_call);
        assert!(path.extension().is_some_and(|ext| ext == "wav"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_temp_file_removed_after_failure() {
        let model = ScriptedModel::new(Behavior::Fail);
        let result = pipeline().run(&model, &inline(), false, Instant::now()).await;
        assert!(matches!(result, Err(AppError::Inference(_))));

        let paths = model.seen_paths();
        assert_eq!(paths.len(), 1);
        assert!(!paths[0].exists());
    }

    #[tokio::test]
    async fn test_panicking_model_becomes_error() {
        let model = ScriptedModel::new(Behavior::Panic);
        let result = pipeline().run(&model, &inline(), false, Instant::now()).await;
        match result {
            Err(AppError::Inference(ModelError::Panicked(message))) => {
                assert_eq!(message, "scripted panic");
            }
            other => panic!("expected panic error, got {:?}", other.map(|r| r.text)),
        }
        assert!(!model.seen_paths()[0].exists());
    }

    #[tokio::test]
    async fn test_undecodable_audio_never_reaches_model() {
        let model = ScriptedModel::replying("hello", None);
        let source = AudioSource::InlineBase64("***".to_string());
        let result = pipeline().run(&model, &source, false, Instant::now()).await;
        assert!(matches!(result, Err(AppError::AudioDecode(_))));
        assert!(model.seen_paths().is_empty());
    }

    #[tokio::test]
    async fn test_write_temp_audio_honours_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_temp_audio(b"RIFF", Some(dir.path())).await.unwrap();
        assert!(file.path().starts_with(dir.path()));
        assert_eq!(std::fs::read(file.path()).unwrap(), b"RIFF");
        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());
    }
}
