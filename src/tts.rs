//! Narration synthesis with the edge-tts engine.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::config::VoiceConfig;
use crate::error::CollaboratorError;

const ENGINE: &str = "edge-tts";

/// Narration synthesis through the `edge-tts` command-line engine.
pub struct EdgeTts {
    program: String,
    voice: VoiceConfig,
}

impl EdgeTts {
    pub fn new(program: impl Into<String>, voice: VoiceConfig) -> Self {
        Self {
            program: program.into(),
            voice,
        }
    }

    /// Arguments for one synthesis call. Signed values use the `--opt=value`
    /// form so a leading `-` is not read as a flag.
    pub fn args(&self, text: &str, output: &Path) -> Vec<String> {
        vec![
            "--voice".to_string(),
            self.voice.voice.clone(),
            format!("--rate={}", self.voice.rate),
            format!("--volume={}", self.voice.volume),
            format!("--pitch={}", self.voice.pitch),
            "--text".to_string(),
            text.to_string(),
            "--write-media".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }

    /// Synthesize `text` into `output`. The whole pipeline waits here until
    /// the engine finishes.
    pub async fn synthesize(&self, text: &str, output: &Path) -> Result<PathBuf, CollaboratorError> {
        let preview: String = text.chars().take(50).collect();
        log::info!("Synthesizing narration with {}: {}...", self.voice.voice, preview);

        let out = Command::new(&self.program)
            .args(self.args(text, output))
            .output()
            .await
            .map_err(|source| CollaboratorError::Io {
                service: ENGINE,
                source,
            })?;

        if !out.status.success() {
            log::error!("{ENGINE} exited with {}", out.status);
            return Err(CollaboratorError::Engine {
                engine: ENGINE,
                detail: format!(
                    "exited with {}: {}",
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            });
        }
        if !output.exists() {
            return Err(CollaboratorError::Engine {
                engine: ENGINE,
                detail: format!("no audio written to {}", output.display()),
            });
        }

        log::info!("Narration written to {}", output.display());
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_voice_parameters_are_attached() {
        let tts = EdgeTts::new("edge-tts", VoiceConfig::default());
        let args = tts.args("Hello.", Path::new("/w/narration.mp3"));
        assert!(args.contains(&"--rate=+35%".to_string()));
        assert!(args.contains(&"--volume=+10%".to_string()));
        assert!(args.contains(&"--pitch=+20Hz".to_string()));
        assert_eq!(args.last().unwrap(), "/w/narration.mp3");
    }

    #[tokio::test]
    async fn missing_engine_is_a_collaborator_error() {
        let tts = EdgeTts::new("no-such-tts-engine-binary", VoiceConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let err = tts
            .synthesize("hi", &dir.path().join("n.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Io { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_engine_is_reported_with_status() {
        let tts = EdgeTts::new("false", VoiceConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("n.mp3");
        let err = tts.synthesize("hi", &output).await.unwrap_err();
        match err {
            CollaboratorError::Engine { engine, detail } => {
                assert_eq!(engine, "edge-tts");
                assert!(detail.starts_with("exited with"));
            }
            other => panic!("expected an engine failure, got {other:?}"),
        }
        assert!(!output.exists());
    }
}
