//! Runtime settings and rendering defaults.

use std::env;
use std::path::PathBuf;

use crate::error::{PipelineError, Result};

/// Output frame geometry shared by every rendering stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
        }
    }
}

impl Canvas {
    pub fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Bounds used when merging recognition segments into subtitle intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingConfig {
    pub min_interval: f64,
    pub max_interval: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_interval: 3.0,
            max_interval: 5.0,
        }
    }
}

/// Look of one subtitle layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleStyle {
    /// Maximum characters per line handed to the line wrapper
    pub line_budget: usize,
    /// Font size is `frame width / font_divisor`
    pub font_divisor: u32,
    pub line_spacing: u32,
    pub border_width: u32,
    pub border_color: String,
    pub font_color: String,
}

impl SubtitleStyle {
    pub fn primary() -> Self {
        Self {
            line_budget: 20,
            font_divisor: 10,
            line_spacing: 110,
            border_width: 4,
            border_color: "black@0.6".to_string(),
            font_color: "white".to_string(),
        }
    }

    pub fn secondary() -> Self {
        Self {
            line_budget: 40,
            font_divisor: 50,
            line_spacing: 40,
            border_width: 3,
            border_color: "black@0.6".to_string(),
            font_color: "white".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    pub codec: String,
    pub preset: String,
    pub crf: u32,
    pub pix_fmt: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            crf: 23,
            pix_fmt: "yuv420p".to_string(),
        }
    }
}

/// Everything the segment renderer needs besides the per-segment content.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    pub canvas: Canvas,
    pub primary: SubtitleStyle,
    pub secondary: SubtitleStyle,
    /// Distance between the last secondary line and the bottom edge
    pub bottom_margin: u32,
    pub zoom_step: f64,
    pub zoompan_frames: u32,
    pub gray_layer: String,
    pub brightness: f64,
    pub contrast: f64,
    pub font_file: Option<PathBuf>,
    pub encoder: EncoderConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            canvas: Canvas::default(),
            primary: SubtitleStyle::primary(),
            secondary: SubtitleStyle::secondary(),
            bottom_margin: 100,
            zoom_step: 0.001,
            zoompan_frames: 150,
            gray_layer: "gray@0.35".to_string(),
            brightness: -0.08,
            contrast: 1.05,
            font_file: None,
            encoder: EncoderConfig::default(),
        }
    }
}

/// Optional trailing clip with static centered text on a solid background.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleCard {
    pub text: String,
    pub duration: f64,
    pub background: String,
    pub font_size: u32,
    pub border_width: u32,
}

impl TitleCard {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            duration: 0.5,
            background: "black".to_string(),
            font_size: 100,
            border_width: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixConfig {
    pub narration_gain: f64,
    pub music_gain: f64,
    pub audio_codec: String,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            narration_gain: 1.0,
            music_gain: 0.1,
            audio_codec: "aac".to_string(),
        }
    }
}

/// Voice parameters passed to the speech-synthesis engine.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub voice: String,
    pub rate: String,
    pub volume: String,
    pub pitch: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: "en-US-ChristopherNeural".to_string(),
            rate: "+35%".to_string(),
            volume: "+10%".to_string(),
            pitch: "+20Hz".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionConfig {
    pub model: String,
    pub language: String,
    pub endpoint: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            language: "en".to_string(),
            endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
        }
    }
}

/// Identifiers for the spreadsheet and drive collaborators.
#[derive(Debug, Clone, Default)]
pub struct GoogleConfig {
    pub access_token: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
    pub picture_folder_id: Option<String>,
    pub music_folder_id: Option<String>,
    pub video_folder_id: Option<String>,
}

/// Full runtime configuration, loaded from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub google: GoogleConfig,
    pub openai_api_key: Option<String>,
    pub ffmpeg_path: String,
    pub edge_tts_path: String,
    pub timing: TimingConfig,
    pub layout: LayoutConfig,
    pub title_card: Option<TitleCard>,
    pub mix: MixConfig,
    pub voice: VoiceConfig,
    pub transcription: TranscriptionConfig,
    /// Keep a random sample of this many downloaded images
    pub image_sample: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            google: GoogleConfig {
                sheet_name: "txt".to_string(),
                ..GoogleConfig::default()
            },
            openai_api_key: None,
            ffmpeg_path: "ffmpeg".to_string(),
            edge_tts_path: "edge-tts".to_string(),
            timing: TimingConfig::default(),
            layout: LayoutConfig::default(),
            title_card: None,
            mix: MixConfig::default(),
            voice: VoiceConfig::default(),
            transcription: TranscriptionConfig::default(),
            image_sample: None,
        }
    }
}

impl Settings {
    /// Read settings from process environment. A `.env` file in the working
    /// directory is loaded first if it exists.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }

        let mut settings = Settings::default();
        settings.google.access_token = env_opt("GOOGLE_ACCESS_TOKEN");
        settings.google.spreadsheet_id = env_opt("SPREADSHEET_ID");
        if let Some(name) = env_opt("SHEET_NAME") {
            settings.google.sheet_name = name;
        }
        settings.google.picture_folder_id = env_opt("PICTURE_FOLDER_ID");
        settings.google.music_folder_id = env_opt("BGM_FOLDER_ID");
        settings.google.video_folder_id = env_opt("VIDEO_FOLDER_ID");
        settings.openai_api_key = env_opt("OPENAI_API_KEY");
        if let Some(path) = env_opt("FFMPEG_PATH") {
            settings.ffmpeg_path = path;
        }
        if let Some(path) = env_opt("EDGE_TTS_PATH") {
            settings.edge_tts_path = path;
        }
        settings.layout.font_file = env_opt("FONT_FILE").map(PathBuf::from);
        settings.title_card = env_opt("TITLE_CARD_TEXT").map(TitleCard::new);
        settings
    }

    pub fn openai_api_key(&self) -> Result<&str> {
        required(&self.openai_api_key, "OPENAI_API_KEY")
    }
}

/// Return the value of a required setting or a missing-input error naming it.
pub fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| PipelineError::MissingInput(format!("{name} is not set")))
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_vertical_layout() {
        let layout = LayoutConfig::default();
        assert_eq!(layout.canvas.size(), "1080x1920");
        assert_eq!(layout.primary.line_budget, 20);
        assert_eq!(layout.secondary.line_budget, 40);
        assert!(layout.primary.line_budget < layout.secondary.line_budget);
    }

    #[test]
    fn required_reports_missing_name() {
        let err = required(&None, "SPREADSHEET_ID").unwrap_err();
        assert!(err.to_string().contains("SPREADSHEET_ID"));
        assert_eq!(required(&Some("x".into()), "X").unwrap(), "x");
    }
}
