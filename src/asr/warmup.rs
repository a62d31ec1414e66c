//! Synthetic warm-up inference.
//!
//! The first real request should not pay for lazy initialization inside the model
//! runtime, so one second of silence is transcribed before the service reports ready.

use futures::FutureExt;
use std::io::Cursor;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{info, warn};

use crate::asr::model::SpeechModel;
use crate::asr::pipeline::{panic_message, write_temp_audio};
use crate::asr::types::TranscribeOptions;
use crate::constants::warmup::{NUM_SAMPLES, SAMPLE_RATE};
use crate::error::{AppError, ModelError, Result};

/// Encode one second of 16 kHz mono 16-bit silence as a WAV file.
pub fn silent_wav() -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + NUM_SAMPLES * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AppError::Internal(format!("warm-up WAV: {}", e)))?;
        for _ in 0..NUM_SAMPLES {
            writer
                .write_sample(0i16)
                .map_err(|e| AppError::Internal(format!("warm-up WAV: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| AppError::Internal(format!("warm-up WAV: {}", e)))?;
    }
    Ok(cursor.into_inner())
}

/// Run one throwaway transcription. Failures are logged and swallowed.
pub async fn warm_up(model: &dyn SpeechModel, temp_dir: Option<&std::path::Path>) {
    info!("Warming up model...");
    let start = Instant::now();

    let outcome = async {
        let clip = silent_wav()?;
        let file = write_temp_audio(&clip, temp_dir).await?;
        AssertUnwindSafe(model.transcribe(file.path(), TranscribeOptions::default()))
            .catch_unwind()
            .await
            .map_err(|panic| ModelError::Panicked(panic_message(panic.as_ref())))??;
        Ok::<_, AppError>(())
    }
    .await;

    match outcome {
        Ok(()) => info!(elapsed_ms = start.elapsed().as_millis() as u64, "Warmup complete"),
        Err(e) => warn!(error = %e, "Warmup failed (non-critical)"),
    }
}
