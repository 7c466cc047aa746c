//! Timed transcription of the narration through a Whisper-compatible API.

use std::path::Path;

use serde::Deserialize;

use crate::config::TranscriptionConfig;
use crate::error::CollaboratorError;
use crate::timeline::RecognizedSegment;

const SERVICE: &str = "transcription";

#[derive(Debug, Deserialize)]
struct WhisperVerboseJson {
    segments: Option<Vec<WhisperSegment>>, // Only present with verbose_json
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

/// OpenAI-compatible transcription endpoint returning timed segments.
pub struct WhisperApi {
    client: reqwest::Client,
    api_key: String,
    config: TranscriptionConfig,
}

impl WhisperApi {
    pub fn new(api_key: impl Into<String>, config: TranscriptionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            config,
        }
    }

    /// Transcribe the narration file into ordered recognition segments.
    pub async fn transcribe(&self, audio: &Path) -> Result<Vec<RecognizedSegment>, CollaboratorError> {
        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|source| CollaboratorError::Io {
                service: SERVICE,
                source,
            })?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(
                audio
                    .file_name()
                    .and_then(|s| s.to_str())
                    .unwrap_or("narration.mp3")
                    .to_string(),
            )
            .mime_str(mime_for(audio))
            .map_err(|source| CollaboratorError::Request {
                service: SERVICE,
                source,
            })?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json".to_string())
            .text("language", self.config.language.clone())
            .text("timestamp_granularities[]", "segment".to_string());

        log::info!("Transcribing {} with {}", audio.display(), self.config.model);
        let resp = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|source| CollaboratorError::Request {
                service: SERVICE,
                source,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            log::error!("{SERVICE} API returned {status}");
            return Err(CollaboratorError::Api {
                service: SERVICE,
                status,
                body,
            });
        }

        let json: WhisperVerboseJson = resp.json().await.map_err(|source| CollaboratorError::Request {
            service: SERVICE,
            source,
        })?;
        let segments = json.segments.ok_or_else(|| CollaboratorError::Unexpected {
            service: SERVICE,
            detail: "no segments in response (verbose_json not honored?)".to_string(),
        })?;

        Ok(into_recognized(segments))
    }
}

fn into_recognized(segments: Vec<WhisperSegment>) -> Vec<RecognizedSegment> {
    segments
        .into_iter()
        .map(|s| RecognizedSegment::new(s.start, s.end, s.text.trim()))
        .collect()
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        _ => "audio/mpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verbose_json_segments() {
        let raw = r#"{
            "text": "Hi there friend",
            "segments": [
                {"id": 0, "start": 0.0, "end": 2.0, "text": " Hi"},
                {"id": 1, "start": 2.0, "end": 4.5, "text": " there friend "}
            ]
        }"#;
        let parsed: WhisperVerboseJson = serde_json::from_str(raw).unwrap();
        let segments = into_recognized(parsed.segments.unwrap());
        assert_eq!(
            segments,
            vec![
                RecognizedSegment::new(0.0, 2.0, "Hi"),
                RecognizedSegment::new(2.0, 4.5, "there friend"),
            ]
        );
    }

    #[test]
    fn missing_segments_field_parses_as_none() {
        let parsed: WhisperVerboseJson = serde_json::from_str(r#"{"text": "x"}"#).unwrap();
        assert!(parsed.segments.is_none());
    }

    #[test]
    fn mime_by_extension() {
        assert_eq!(mime_for(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(mime_for(Path::new("a.wav")), "audio/wav");
    }
}
