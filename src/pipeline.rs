//! Stage-by-stage orchestration of one run.
//!
//! Stages run strictly in sequence. The only await that blocks on an
//! external engine for long is narration synthesis; everything after it
//! depends on the narration file.

use std::path::{Path, PathBuf};

use indicatif::ProgressBar;

use crate::allocate::{allocate_sentences, SentenceGroup};
use crate::assemble::Assembler;
use crate::config::{required, Settings, TimingConfig, TitleCard};
use crate::drive::DriveClient;
use crate::error::{PipelineError, Result};
use crate::ffmpeg::Ffmpeg;
use crate::image_norm::normalize_in_place;
use crate::render::{plan_segments, SegmentRenderer};
use crate::session::WorkSession;
use crate::sheets::{SheetRow, SheetsClient};
use crate::timeline::{segment_intervals, Interval, RecognizedSegment};
use crate::transcribe::WhisperApi;
use crate::tts::EdgeTts;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Intervals and their sentence groups for one narration.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub intervals: Vec<Interval>,
    pub groups: Vec<SentenceGroup>,
}

impl Timeline {
    /// Length of the video the segments will add up to, title card included.
    pub fn video_duration(&self, title: Option<&TitleCard>) -> f64 {
        let body: f64 = self.intervals.iter().map(Interval::duration).sum();
        body + title.map_or(0.0, |t| t.duration)
    }
}

/// Segment the recognition output and spread the secondary text over it.
pub fn build_timeline(
    segments: &[RecognizedSegment],
    secondary_text: &str,
    timing: &TimingConfig,
) -> Result<Timeline> {
    if segments.is_empty() {
        return Err(PipelineError::MissingInput(
            "transcription returned no segments".to_string(),
        ));
    }
    let intervals = segment_intervals(segments, timing)?;
    if intervals.is_empty() {
        return Err(PipelineError::MissingInput(
            "transcription produced no subtitle text".to_string(),
        ));
    }

    log::info!("Generated {} interval(s):", intervals.len());
    for interval in &intervals {
        log::info!(
            "  {:.1}s - {:.1}s : {}",
            interval.start,
            interval.end,
            interval.text
        );
    }

    let groups = allocate_sentences(secondary_text, intervals.len())?;
    for (i, group) in groups.iter().enumerate() {
        log::debug!("  group {}: {}", i + 1, group.text());
    }
    Ok(Timeline { intervals, groups })
}

/// Inputs for a run that does not touch the spreadsheet or drive.
#[derive(Debug, Clone)]
pub struct LocalInputs {
    pub primary_text: PathBuf,
    pub secondary_text: PathBuf,
    pub images_dir: PathBuf,
    pub music: PathBuf,
    pub output: PathBuf,
}

/// Outcome of a spreadsheet-driven run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub session_id: String,
    pub row_number: usize,
    pub video_id: String,
    pub duration: f64,
}

struct Media<'a> {
    primary_text: &'a str,
    secondary_text: &'a str,
    images: &'a [PathBuf],
    music: &'a Path,
}

pub struct Pipeline {
    settings: Settings,
    ffmpeg: Ffmpeg,
    progress: ProgressBar,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Self {
        let ffmpeg = Ffmpeg::new(settings.ffmpeg_path.clone());
        Self {
            settings,
            ffmpeg,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report stage changes on `progress` as well as the log.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn finish(&self, message: String) {
        self.progress.finish_with_message(message);
    }

    fn stage(&self, message: &str) {
        log::info!("=== {} ===", message);
        self.progress.set_message(message.to_string());
    }

    fn sheets(&self) -> Result<SheetsClient> {
        let google = &self.settings.google;
        Ok(SheetsClient::new(
            required(&google.access_token, "GOOGLE_ACCESS_TOKEN")?,
            required(&google.spreadsheet_id, "SPREADSHEET_ID")?,
            &google.sheet_name,
        ))
    }

    fn drive(&self) -> Result<DriveClient> {
        let token = required(&self.settings.google.access_token, "GOOGLE_ACCESS_TOKEN")?;
        Ok(DriveClient::new(token))
    }

    /// Rows still waiting for a video.
    pub async fn scan(&self) -> Result<Vec<SheetRow>> {
        Ok(self.sheets()?.scan_unprocessed().await?)
    }

    /// Full run for one session: fetch, render, upload, write back.
    /// `keep_output` receives a copy of the final video before the working
    /// directory is removed.
    pub async fn run(&self, session_id: &str, keep_output: Option<&Path>) -> Result<RunReport> {
        let google = &self.settings.google;
        let picture_folder = required(&google.picture_folder_id, "PICTURE_FOLDER_ID")?;
        let music_folder = required(&google.music_folder_id, "BGM_FOLDER_ID")?;
        let video_folder = required(&google.video_folder_id, "VIDEO_FOLDER_ID")?;
        let sheets = self.sheets()?;
        let drive = self.drive()?;
        self.ffmpeg.ensure_available()?;

        let session = WorkSession::create(session_id)?;

        self.stage("Fetching texts");
        let row = sheets.fetch_row(session_id).await?;
        let (primary_text, secondary_text) = match (&row.primary_text, &row.secondary_text) {
            (Some(p), Some(s)) => (p.as_str(), s.as_str()),
            _ => return Err(PipelineError::MissingInput("row text disappeared".to_string())),
        };

        self.stage("Downloading assets");
        let music = drive
            .pick_music(music_folder, &row.music_genre, session.path())
            .await?;
        let image_dir = session.subdir("images")?;
        let images = drive
            .download_images(picture_folder, &image_dir, self.settings.image_sample)
            .await?;
        self.normalize_images(&images)?;

        let media = Media {
            primary_text,
            secondary_text,
            images: &images,
            music: &music,
        };
        let (video, duration) = self.produce(&session, &media).await?;
        if let Some(dest) = keep_output {
            copy_out(&video, dest)?;
        }

        self.stage("Uploading video");
        let video_id = drive.upload(&video, video_folder, session_id).await?;

        self.stage("Updating sheet");
        sheets.write_video_reference(&row, &video_id).await?;

        Ok(RunReport {
            session_id: session_id.to_string(),
            row_number: row.row_number,
            video_id,
            duration,
        })
    }

    /// Run from local files and write the video to `inputs.output`.
    pub async fn render_local(&self, inputs: &LocalInputs) -> Result<f64> {
        let primary_text = read_text(&inputs.primary_text)?;
        let secondary_text = read_text(&inputs.secondary_text)?;
        if !inputs.music.is_file() {
            return Err(PipelineError::MissingInput(format!(
                "music file not found: {}",
                inputs.music.display()
            )));
        }
        self.ffmpeg.ensure_available()?;

        let session = WorkSession::create("local")?;

        self.stage("Preparing images");
        let image_dir = session.subdir("images")?;
        let mut images = Vec::new();
        for source in list_images(&inputs.images_dir)? {
            let name = source.file_name().map(PathBuf::from).unwrap_or_default();
            let copy = image_dir.join(name);
            std::fs::copy(&source, &copy)?;
            images.push(copy);
        }
        self.normalize_images(&images)?;

        let media = Media {
            primary_text: &primary_text,
            secondary_text: &secondary_text,
            images: &images,
            music: &inputs.music,
        };
        let (video, duration) = self.produce(&session, &media).await?;
        copy_out(&video, &inputs.output)?;
        Ok(duration)
    }

    fn normalize_images(&self, images: &[PathBuf]) -> Result<()> {
        let canvas = &self.settings.layout.canvas;
        for image in images {
            normalize_in_place(image, canvas.width, canvas.height)?;
        }
        Ok(())
    }

    /// Narration, transcription, rendering and assembly. Returns the final
    /// video inside the session and its expected duration.
    async fn produce(&self, session: &WorkSession, media: &Media<'_>) -> Result<(PathBuf, f64)> {
        self.stage("Synthesizing narration");
        let tts = EdgeTts::new(self.settings.edge_tts_path.clone(), self.settings.voice.clone());
        let narration = tts
            .synthesize(media.primary_text, &session.file("narration.mp3"))
            .await?;

        self.stage("Transcribing narration");
        let whisper = WhisperApi::new(
            self.settings.openai_api_key()?,
            self.settings.transcription.clone(),
        );
        let segments = whisper.transcribe(&narration).await?;
        let timeline = build_timeline(&segments, media.secondary_text, &self.settings.timing)?;

        self.stage("Rendering segments");
        let layout = &self.settings.layout;
        let plans = plan_segments(&timeline.intervals, &timeline.groups, media.images, layout)?;
        let renderer = SegmentRenderer::new(&self.ffmpeg, layout, session);
        let rendered = renderer.render_all(&plans)?;

        self.stage("Assembling video");
        let title = self.settings.title_card.as_ref();
        let assembler = Assembler::new(&self.ffmpeg, layout, &self.settings.mix, session);
        let video = assembler.assemble(&rendered, title, &narration, media.music)?;

        Ok((video, timeline.video_duration(title)))
    }
}

fn read_text(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::MissingInput(format!("cannot read {}: {}", path.display(), e))
    })?;
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(PipelineError::MissingInput(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(text)
}

/// Image files directly inside `dir`, sorted by name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| PipelineError::MissingInput(format!("cannot read {}: {}", dir.display(), e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    if images.is_empty() {
        return Err(PipelineError::MissingInput(format!(
            "no images in {}",
            dir.display()
        )));
    }
    images.sort();
    Ok(images)
}

fn copy_out(video: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(video, dest)?;
    log::info!("Copied final video to {}", dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_transcription_is_missing_input() {
        let err = build_timeline(&[], "一。", &TimingConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }

    #[test]
    fn timeline_has_one_group_per_interval() {
        let segments = vec![
            RecognizedSegment::new(0.0, 3.2, "One two three."),
            RecognizedSegment::new(3.2, 6.5, "Four five six."),
            RecognizedSegment::new(6.5, 7.0, "Seven."),
        ];
        let timeline =
            build_timeline(&segments, "一。二。三。四。五。", &TimingConfig::default()).unwrap();
        assert_eq!(timeline.intervals.len(), 3);
        assert_eq!(timeline.groups.len(), 3);
        assert_eq!(timeline.groups[0].len(), 2);
        assert!((timeline.video_duration(None) - 7.0).abs() < 1e-9);
        let card = TitleCard::new("fin");
        assert!((timeline.video_duration(Some(&card)) - 7.5).abs() < 1e-9);
    }

    #[test]
    fn list_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PNG", "a.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let images = list_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG"]);
    }

    #[test]
    fn list_images_requires_some() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            list_images(dir.path()),
            Err(PipelineError::MissingInput(_))
        ));
    }

    #[test]
    fn local_run_reports_missing_text() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = LocalInputs {
            primary_text: dir.path().join("missing.txt"),
            secondary_text: dir.path().join("missing_ja.txt"),
            images_dir: dir.path().to_path_buf(),
            music: dir.path().join("bgm.mp3"),
            output: dir.path().join("out.mp4"),
        };
        let pipeline = Pipeline::new(Settings::default());
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let err = rt.block_on(pipeline.render_local(&inputs)).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }
}
