//! Speech model hosted by an external inference runtime.
//!
//! The runtime is a sidecar that pulls the model from the hub, places it on the best
//! available device and serves an OpenAI compatible transcription API. Loading means
//! waiting until the runtime lists the model; transcription uploads the audio file.

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::asr::model::{ModelLoader, SpeechModel};
use crate::asr::types::{ModelOutput, TranscribeOptions, WordTimestamp};
use crate::config::Config;
use crate::error::ModelError;

/// Upper bound for a single readiness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the inference runtime.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Base URL, without the `/v1` suffix.
    pub base_url: String,
    /// Model identifier the runtime serves.
    pub model_id: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Timeout for one transcription call.
    pub request_timeout: Duration,
    /// Readiness probes before giving up.
    pub load_attempts: u32,
    /// Fixed delay between probes.
    pub load_retry_delay: Duration,
}

impl RuntimeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.runtime_url.trim_end_matches('/').to_string(),
            model_id: config.model_id.clone(),
            api_key: config.runtime_api_key.clone(),
            request_timeout: config.runtime_timeout,
            load_attempts: config.load_attempts,
            load_retry_delay: config.load_retry_delay,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// A model served by the inference runtime.
pub struct RuntimeModel {
    http: reqwest::Client,
    settings: RuntimeSettings,
}

#[async_trait]
impl SpeechModel for RuntimeModel {
    async fn transcribe(
        &self,
        audio_path: &Path,
        options: TranscribeOptions,
    ) -> Result<ModelOutput, ModelError> {
        let audio = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let file_part = multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| ModelError::Request(format!("mime: {}", e)))?;

        let response_format = if options.word_timestamps {
            "verbose_json"
        } else {
            "json"
        };
        let mut form = multipart::Form::new()
            .text("model", self.settings.model_id.clone())
            .text("response_format", response_format)
            .part("file", file_part);
        if options.word_timestamps {
            form = form.text("timestamp_granularities[]", "word");
        }

        let mut request = self
            .http
            .post(self.settings.url("/v1/audio/transcriptions"))
            .multipart(form);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        debug!(model = %self.settings.model_id, response_format, "Sending audio to runtime");

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::Request(format!("body: {}", e)))?;

        if !status.is_success() {
            return Err(ModelError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        parse_transcription(&body, options)
    }
}

/// Loads a [`RuntimeModel`] once the runtime reports the model as served.
pub struct RuntimeModelLoader {
    settings: RuntimeSettings,
}

impl RuntimeModelLoader {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self { settings }
    }

    async fn probe(&self, http: &reqwest::Client) -> Result<(), ModelError> {
        let mut request = http
            .get(self.settings.url("/v1/models"))
            .timeout(PROBE_TIMEOUT);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let listing: ModelListing = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidOutput(format!("model listing: {}", e)))?;

        if listing.data.iter().any(|m| m.id == self.settings.model_id) {
            Ok(())
        } else {
            Err(ModelError::Unavailable(format!(
                "runtime does not list {} yet",
                self.settings.model_id
            )))
        }
    }
}

#[async_trait]
impl ModelLoader for RuntimeModelLoader {
    async fn load(&self) -> Result<Arc<dyn SpeechModel>, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(self.settings.request_timeout)
            .build()
            .map_err(|e| ModelError::Request(e.to_string()))?;

        info!(
            model = %self.settings.model_id,
            runtime = %self.settings.base_url,
            "Waiting for model runtime"
        );

        let attempts = self.settings.load_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.probe(&http).await {
                Ok(()) => {
                    info!(attempt, "Model runtime is serving {}", self.settings.model_id);
                    return Ok(Arc::new(RuntimeModel {
                        http,
                        settings: self.settings.clone(),
                    }));
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Model runtime not ready");
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.settings.load_retry_delay).await;
            }
        }

        Err(ModelError::Unavailable(format!(
            "gave up after {} attempts: {}",
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

#[derive(Debug, Deserialize)]
struct ModelListing {
    #[serde(default)]
    data: Vec<ListedModel>,
}

#[derive(Debug, Deserialize)]
struct ListedModel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RuntimeWord {
    #[serde(alias = "text")]
    word: String,
    start: f64,
    end: f64,
}

/// Interpret a runtime transcription body.
///
/// Accepted shapes: an object with `text` (word spans under `words`,
/// `timestamp.word` or `timestamps.word`), a JSON string, a list of hypotheses
/// (the first is used), or plain text.
pub fn parse_transcription(body: &str, options: TranscribeOptions) -> Result<ModelOutput, ModelError> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => parse_value(value, options),
        Err(_) => Ok(ModelOutput {
            text: body.trim().to_string(),
            words: None,
        }),
    }
}

fn parse_value(value: Value, options: TranscribeOptions) -> Result<ModelOutput, ModelError> {
    match value {
        Value::String(text) => Ok(ModelOutput { text, words: None }),
        Value::Array(mut hypotheses) => {
            if hypotheses.is_empty() {
                return Err(ModelError::InvalidOutput("empty hypothesis list".to_string()));
            }
            parse_value(hypotheses.swap_remove(0), options)
        }
        Value::Object(mut object) => {
            let text = match object.remove("text") {
                Some(Value::String(text)) => text,
                _ => {
                    return Err(ModelError::InvalidOutput(
                        "response has no 'text' field".to_string(),
                    ))
                }
            };

            let words = if options.word_timestamps {
                let spans = object
                    .remove("words")
                    .or_else(|| nested_words(&mut object, "timestamp"))
                    .or_else(|| nested_words(&mut object, "timestamps"));
                match spans {
                    Some(Value::Null) | None => None,
                    Some(spans) => Some(parse_words(spans)?),
                }
            } else {
                None
            };

            Ok(ModelOutput { text, words })
        }
        other => Err(ModelError::InvalidOutput(format!(
            "unexpected transcription payload: {}",
            other
        ))),
    }
}

fn nested_words(object: &mut serde_json::Map<String, Value>, key: &str) -> Option<Value> {
    object
        .get_mut(key)
        .and_then(Value::as_object_mut)
        .and_then(|inner| inner.remove("word"))
}

fn parse_words(spans: Value) -> Result<Vec<WordTimestamp>, ModelError> {
    let words: Vec<RuntimeWord> = serde_json::from_value(spans)
        .map_err(|e| ModelError::InvalidOutput(format!("word timestamps: {}", e)))?;
    Ok(words
        .into_iter()
        .map(|w| WordTimestamp {
            word: w.word,
            start: w.start,
            end: w.end,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State,
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use bytes::Bytes;
    use serde_json::json;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WITH_WORDS: TranscribeOptions = TranscribeOptions {
        word_timestamps: true,
    };

    #[derive(Clone, Default)]
    struct MockRuntime {
        probes: Arc<AtomicUsize>,
        ready_after: usize,
        bodies: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    async fn models(State(runtime): State<MockRuntime>) -> impl IntoResponse {
        let seen = runtime.probes.fetch_add(1, Ordering::SeqCst);
        if seen < runtime.ready_after {
            return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "loading"})));
        }
        (
            StatusCode::OK,
            Json(json!({"object": "list", "data": [{"id": "test/model"}]})),
        )
    }

    async fn transcriptions(State(runtime): State<MockRuntime>, body: Bytes) -> impl IntoResponse {
        let body = String::from_utf8_lossy(&body).into_owned();
        let wants_words = body.contains("verbose_json");
        runtime.bodies.lock().push(body);
        if wants_words {
            Json(json!({
                "text": "hello world",
                "words": [
                    {"word": "hello", "start": 0.0, "end": 0.4},
                    {"word": "world", "start": 0.5, "end": 0.9}
                ]
            }))
        } else {
            Json(json!({"text": "hello world"}))
        }
    }

    async fn spawn_runtime(runtime: MockRuntime) -> String {
        let app = Router::new()
            .route("/v1/models", get(models))
            .route("/v1/audio/transcriptions", post(transcriptions))
            .with_state(runtime);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn settings(base_url: String, attempts: u32) -> RuntimeSettings {
        RuntimeSettings {
            base_url,
            model_id: "test/model".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(5),
            load_attempts: attempts,
            load_retry_delay: Duration::from_millis(10),
        }
    }

    fn audio_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(b"RIFF....WAVE").unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_waits_for_runtime() {
        let runtime = MockRuntime {
            ready_after: 2,
            ..Default::default()
        };
        let base_url = spawn_runtime(runtime.clone()).await;

        let loader = RuntimeModelLoader::new(settings(base_url, 5));
        assert!(loader.load().await.is_ok());
        assert_eq!(runtime.probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_load_gives_up_after_attempts() {
        let runtime = MockRuntime {
            ready_after: 100,
            ..Default::default()
        };
        let base_url = spawn_runtime(runtime.clone()).await;

        let loader = RuntimeModelLoader::new(settings(base_url, 3));
        let result = loader.load().await;
        assert!(matches!(result, Err(ModelError::Unavailable(_))));
        assert_eq!(runtime.probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_load_requires_model_to_be_listed() {
        let base_url = spawn_runtime(MockRuntime::default()).await;
        let mut other = settings(base_url, 1);
        other.model_id = "other/model".to_string();

        let result = RuntimeModelLoader::new(other).load().await;
        assert!(matches!(result, Err(ModelError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_transcribe_round_trip() {
        let runtime = MockRuntime::default();
        let base_url = spawn_runtime(runtime.clone()).await;
        let model = RuntimeModelLoader::new(settings(base_url, 1)).load().await.unwrap();
        let file = audio_file();

        let plain = model
            .transcribe(file.path(), TranscribeOptions::default())
            .await
            .unwrap();
        assert_eq!(plain.text, "hello world");
        assert!(plain.words.is_none());

        let timed = model.transcribe(file.path(), WITH_WORDS).await.unwrap();
        let words = timed.words.unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[1].word, "world");
        assert_eq!(words[1].start, 0.5);

        let bodies = runtime.bodies.lock();
        assert!(bodies[0].contains("test/model"));
        assert!(!bodies[0].contains("timestamp_granularities"));
        assert!(bodies[1].contains("timestamp_granularities[]"));
        assert!(bodies[1].contains("RIFF....WAVE"));
    }

    #[tokio::test]
    async fn test_transcribe_surfaces_upstream_errors() {
        let app = Router::new()
            .route(
                "/v1/models",
                get(|| async { Json(json!({"data": [{"id": "test/model"}]})) }),
            )
            .route(
                "/v1/audio/transcriptions",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "decoder crashed") }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let model = RuntimeModelLoader::new(settings(format!("http://{}", addr), 1))
            .load()
            .await
            .unwrap();
        let file = audio_file();
        match model.transcribe(file.path(), TranscribeOptions::default()).await {
            Err(ModelError::Upstream { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "decoder crashed");
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_tolerates_result_shapes() {
        let plain = parse_transcription("  just text \n", WITH_WORDS).unwrap();
        assert_eq!(plain.text, "just text");

        let string = parse_transcription(r#""quoted""#, WITH_WORDS).unwrap();
        assert_eq!(string.text, "quoted");
        assert!(string.words.is_none());

        let hypotheses = parse_transcription(r#"[{"text": "first"}, {"text": "second"}]"#, WITH_WORDS)
            .unwrap();
        assert_eq!(hypotheses.text, "first");
    }

    #[test]
    fn test_parse_nested_word_timestamps() {
        let body = json!({
            "text": "hi there",
            "timestamp": {"word": [{"text": "hi", "start": 0.1, "end": 0.2}]}
        })
        .to_string();
        let output = parse_transcription(&body, WITH_WORDS).unwrap();
        assert_eq!(
            output.words.unwrap(),
            vec![WordTimestamp {
                word: "hi".into(),
                start: 0.1,
                end: 0.2
            }]
        );

        let without = parse_transcription(&body, TranscribeOptions::default()).unwrap();
        assert!(without.words.is_none());
    }

    #[test]
    fn test_parse_rejects_missing_text() {
        assert!(matches!(
            parse_transcription(r#"{"segments": []}"#, WITH_WORDS),
            Err(ModelError::InvalidOutput(_))
        ));
        assert!(matches!(
            parse_transcription("[]", WITH_WORDS),
            Err(ModelError::InvalidOutput(_))
        ));
    }
}
