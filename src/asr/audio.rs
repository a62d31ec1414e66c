//! Audio ingestion.
//!
//! The `audio` request field comes in several shapes. It is classified once, at the
//! request boundary, into an [`AudioSource`], and then resolved to raw bytes by an
//! [`AudioResolver`]. Every failure here is reported as a client error.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::asr::types::RawAudio;
use crate::constants::audio::DATA_URL_PREFIX;
use crate::error::{AppError, Result};

/// Lenient standard-alphabet engine: padding is optional on input.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Where the audio for a request lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Payload of a `data:` URL, still base64 encoded.
    DataUrl(String),
    /// Bare base64 text.
    InlineBase64(String),
    /// File inside the container.
    LocalPath(PathBuf),
    /// `http://` or `https://` URL to download.
    RemoteUrl(String),
}

impl AudioSource {
    /// Classify the raw request field.
    ///
    /// Returns [`AppError::MissingAudio`] for absent or empty input.
    pub fn from_raw(raw: Option<&RawAudio>) -> Result<Self> {
        match raw {
            None => Err(AppError::MissingAudio),
            Some(RawAudio::Text(text)) => Self::from_text(text),
            Some(RawAudio::Fields(fields)) => {
                if let Some(data) = fields.data.as_deref() {
                    Ok(Self::from_inline(data))
                } else if let Some(path) = fields.path.as_deref().filter(|p| !p.is_empty()) {
                    Ok(Self::from_path_field(path))
                } else {
                    Err(AppError::MissingAudio)
                }
            }
            Some(RawAudio::Unsupported(value)) => Err(AppError::InvalidInput(format!(
                "'audio' must be a string or an object with 'data' or 'path', got {}",
                json_kind(value)
            ))),
        }
    }

    /// Classify the bare string form.
    fn from_text(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(AppError::MissingAudio);
        }
        if text.starts_with(DATA_URL_PREFIX) {
            return Ok(Self::from_inline(text));
        }
        if text.contains('/') || text.contains('\\') {
            // '/' is also a base64 symbol, so only a string that names no file and
            // decodes to a recognizable audio container is taken as inline data.
            if !Path::new(text).exists() && is_encoded_audio(text) {
                return Ok(Self::InlineBase64(text.to_string()));
            }
            return Ok(Self::LocalPath(PathBuf::from(text)));
        }
        Ok(Self::InlineBase64(text.to_string()))
    }

    /// Classify an inline payload: a data URL or bare base64, never a path.
    fn from_inline(data: &str) -> Self {
        if data.starts_with(DATA_URL_PREFIX) {
            Self::DataUrl(data.to_string())
        } else {
            Self::InlineBase64(data.to_string())
        }
    }

    fn from_path_field(path: &str) -> Self {
        if path.starts_with("http://") || path.starts_with("https://") {
            Self::RemoteUrl(path.to_string())
        } else {
            Self::LocalPath(PathBuf::from(path))
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUrl(_) => "data_url",
            Self::InlineBase64(_) => "base64",
            Self::LocalPath(_) => "local_path",
            Self::RemoteUrl(_) => "remote_url",
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

fn is_encoded_audio(text: &str) -> bool {
    let trimmed = text.trim_end_matches('=');
    let alphabet_only = trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b.is_ascii_whitespace());
    if trimmed.len() % 4 == 1 || !alphabet_only {
        return false;
    }
    decode_base64(text)
        .map(|bytes| has_audio_signature(&bytes))
        .unwrap_or(false)
}

/// Magic bytes of the containers the model runtime accepts.
fn has_audio_signature(bytes: &[u8]) -> bool {
    match bytes {
        [b'R', b'I', b'F', b'F', ..]
        | [b'f', b'L', b'a', b'C', ..]
        | [b'O', b'g', b'g', b'S', ..]
        | [b'I', b'D', b'3', ..]
        | [0x1a, 0x45, 0xdf, 0xa3, ..] => true,
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => true,
        // MPEG audio frame sync
        [0xff, second, ..] => second & 0xe0 == 0xe0,
        _ => false,
    }
}

/// Decode base64 text, ignoring ASCII whitespace and tolerating missing padding.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    LENIENT_BASE64
        .decode(compact.as_bytes())
        .map_err(|e| AppError::AudioDecode(format!("invalid base64: {}", e)))
}

/// Decode the payload of a `data:` URL: everything after the first comma.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let (_, payload) = url
        .split_once(',')
        .ok_or_else(|| AppError::AudioDecode("data URL has no payload".to_string()))?;
    decode_base64(payload)
}

/// Encode bytes as standard padded base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Turns an [`AudioSource`] into bytes.
#[derive(Clone)]
pub struct AudioResolver {
    http: reqwest::Client,
    max_audio_bytes: usize,
}

impl AudioResolver {
    /// Create a resolver.
    ///
    /// # Arguments
    /// * `fetch_timeout` - Upper bound for downloading a remote URL
    /// * `max_audio_bytes` - Largest accepted payload after decoding
    pub fn new(fetch_timeout: Duration, max_audio_bytes: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            max_audio_bytes,
        })
    }

    /// Produce the raw audio bytes for a source.
    pub async fn resolve(&self, source: &AudioSource) -> Result<Bytes> {
        let bytes = match source {
            AudioSource::DataUrl(url) => Bytes::from(decode_data_url(url)?),
            AudioSource::InlineBase64(text) => Bytes::from(decode_base64(text)?),
            AudioSource::LocalPath(path) => self.read_local(path).await?,
            AudioSource::RemoteUrl(url) => self.fetch_remote(url).await?,
        };

        if bytes.is_empty() {
            return Err(AppError::AudioDecode("audio payload is empty".to_string()));
        }
        if bytes.len() > self.max_audio_bytes {
            return Err(AppError::AudioDecode(format!(
                "audio payload is {} bytes, limit is {}",
                bytes.len(),
                self.max_audio_bytes
            )));
        }

        debug!(kind = source.kind(), bytes = bytes.len(), "Resolved audio");
        Ok(bytes)
    }

    async fn read_local(&self, path: &Path) -> Result<Bytes> {
        tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| AppError::AudioDecode(format!("cannot read {}: {}", path.display(), e)))
    }

    async fn fetch_remote(&self, url: &str) -> Result<Bytes> {
        info!(url, "Fetching remote audio");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::AudioDecode(format!("cannot fetch {}: {}", url, e)))?;

        if let Some(length) = response.content_length() {
            if length as usize > self.max_audio_bytes {
                return Err(AppError::AudioDecode(format!(
                    "remote audio is {} bytes, limit is {}",
                    length, self.max_audio_bytes
                )));
            }
        }

        // Chunked responses carry no length, so the limit is enforced while reading
        let mut body = BytesMut::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk =
                chunk.map_err(|e| AppError::AudioDecode(format!("cannot fetch {}: {}", url, e)))?;
            if body.len() + chunk.len() > self.max_audio_bytes {
                return Err(AppError::AudioDecode(format!(
                    "remote audio exceeds the {} byte limit",
                    self.max_audio_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::types::AudioFields;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use std::io::Write;

    fn text(s: &str) -> RawAudio {
        RawAudio::Text(s.to_string())
    }

    fn fields(data: Option<&str>, path: Option<&str>) -> RawAudio {
        RawAudio::Fields(AudioFields {
            data: data.map(str::to_string),
            path: path.map(str::to_string),
        })
    }

    fn resolver() -> AudioResolver {
        AudioResolver::new(Duration::from_secs(5), 1024).unwrap()
    }

    #[test]
    fn test_classify_strings() {
        assert_eq!(
            AudioSource::from_raw(Some(&text("data:audio/wav;base64,AAAA"))).unwrap(),
            AudioSource::DataUrl("data:audio/wav;base64,AAAA".into())
        );
        assert_eq!(
            AudioSource::from_raw(Some(&text("UklGRg=="))).unwrap(),
            AudioSource::InlineBase64("UklGRg==".into())
        );
        assert_eq!(
            AudioSource::from_raw(Some(&text("/opt/ml/audio/clip.wav"))).unwrap(),
            AudioSource::LocalPath("/opt/ml/audio/clip.wav".into())
        );
        assert_eq!(
            AudioSource::from_raw(Some(&text("C:\\audio\\clip.wav"))).unwrap(),
            AudioSource::LocalPath("C:\\audio\\clip.wav".into())
        );
    }

    #[test]
    fn test_base64_with_slash_is_not_a_path() {
        let encoded = encode_base64(b"RIFF\xff\xff\xff\xfe");
        assert!(encoded.contains('/'));
        assert_eq!(
            AudioSource::from_raw(Some(&text(&encoded))).unwrap(),
            AudioSource::InlineBase64(encoded)
        );
    }

    #[test]
    fn test_missing_path_in_base64_alphabet_stays_a_path() {
        assert_eq!(
            AudioSource::from_raw(Some(&text("/opt/ml/data"))).unwrap(),
            AudioSource::LocalPath("/opt/ml/data".into())
        );
        assert_eq!(
            AudioSource::from_raw(Some(&text("audio/clip"))).unwrap(),
            AudioSource::LocalPath("audio/clip".into())
        );
    }

    #[test]
    fn test_audio_signatures() {
        assert!(has_audio_signature(b"RIFF\x24\x00\x00\x00WAVE"));
        assert!(has_audio_signature(b"fLaC\x00"));
        assert!(has_audio_signature(b"\x00\x00\x00\x20ftypM4A "));
        assert!(has_audio_signature(&[0xff, 0xfb, 0x90]));
        assert!(!has_audio_signature(&[0xfe, 0x8b, 0x5a]));
        assert!(!has_audio_signature(b""));
    }

    #[test]
    fn test_classify_objects() {
        assert_eq!(
            AudioSource::from_raw(Some(&fields(Some("AAAA"), Some("/ignored.wav")))).unwrap(),
            AudioSource::InlineBase64("AAAA".into())
        );
        assert_eq!(
            AudioSource::from_raw(Some(&fields(Some("data:audio/wav;base64,AAAA"), None)))
                .unwrap(),
            AudioSource::DataUrl("data:audio/wav;base64,AAAA".into())
        );
        assert_eq!(
            AudioSource::from_raw(Some(&fields(None, Some("https://example.com/a.wav")))).unwrap(),
            AudioSource::RemoteUrl("https://example.com/a.wav".into())
        );
        assert_eq!(
            AudioSource::from_raw(Some(&fields(None, Some("clip.wav")))).unwrap(),
            AudioSource::LocalPath("clip.wav".into())
        );
    }

    #[test]
    fn test_missing_and_unsupported() {
        assert!(matches!(AudioSource::from_raw(None), Err(AppError::MissingAudio)));
        assert!(matches!(
            AudioSource::from_raw(Some(&text(""))),
            Err(AppError::MissingAudio)
        ));
        assert!(matches!(
            AudioSource::from_raw(Some(&fields(None, None))),
            Err(AppError::MissingAudio)
        ));
        assert!(matches!(
            AudioSource::from_raw(Some(&RawAudio::Unsupported(serde_json::json!(3)))),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_base64_round_trip() {
        let payloads: [&[u8]; 4] = [b"", b"R", b"RIFF\x00\x01\x02", &[0u8, 255, 128, 7, 9]];
        for bytes in payloads {
            let encoded = encode_base64(bytes);
            assert_eq!(decode_base64(&encoded).unwrap(), bytes);
            let url = format!("data:audio/wav;base64,{}", encoded);
            assert_eq!(decode_data_url(&url).unwrap(), bytes);
        }
    }

    #[test]
    fn test_decode_is_lenient_about_whitespace_and_padding() {
        assert_eq!(decode_base64("UklG\nRg").unwrap(), b"RIFF");
        assert_eq!(decode_base64(" AAAA ").unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_base64("not*base64!"), Err(AppError::AudioDecode(_))));
        assert!(matches!(
            decode_data_url("data:audio/wav;base64"),
            Err(AppError::AudioDecode(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"RIFFdata").unwrap();

        let source = AudioSource::LocalPath(file.path().to_path_buf());
        let bytes = resolver().resolve(&source).await.unwrap();
        assert_eq!(&bytes[..], b"RIFFdata");
    }

    #[tokio::test]
    async fn test_resolve_missing_file_is_client_error() {
        let source = AudioSource::LocalPath("/definitely/not/here.wav".into());
        assert!(matches!(
            resolver().resolve(&source).await,
            Err(AppError::AudioDecode(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_enforces_limits() {
        let empty = AudioSource::InlineBase64(String::new());
        assert!(matches!(resolver().resolve(&empty).await, Err(AppError::AudioDecode(_))));

        let big = AudioSource::InlineBase64(encode_base64(&vec![1u8; 2048]));
        assert!(matches!(resolver().resolve(&big).await, Err(AppError::AudioDecode(_))));
    }

    #[tokio::test]
    async fn test_resolve_remote_url() {
        let app = Router::new()
            .route("/clip.wav", get(|| async { "RIFFremote" }))
            .route("/gone.wav", get(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/chunked.wav",
                get(|| async {
                    let chunks = (0..4).map(|_| Ok::<_, std::io::Error>(Bytes::from(vec![7u8; 512])));
                    Body::from_stream(futures::stream::iter(chunks))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let ok = AudioSource::RemoteUrl(format!("http://{}/clip.wav", addr));
        assert_eq!(&resolver().resolve(&ok).await.unwrap()[..], b"RIFFremote");

        let missing = AudioSource::RemoteUrl(format!("http://{}/gone.wav", addr));
        assert!(matches!(
            resolver().resolve(&missing).await,
            Err(AppError::AudioDecode(_))
        ));

        let chunked = AudioSource::RemoteUrl(format!("http://{}/chunked.wav", addr));
        match resolver().resolve(&chunked).await {
            Err(AppError::AudioDecode(message)) => assert!(message.contains("limit")),
            other => panic!("expected a size error, got {:?}", other.map(|b| b.len())),
        }
    }
}
