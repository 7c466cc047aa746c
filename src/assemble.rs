//! Concatenating rendered segments and mixing narration with music.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{LayoutConfig, MixConfig, TitleCard};
use crate::error::Result;
use crate::ffmpeg::{self, Ffmpeg};
use crate::render::{path_arg, RenderedSegment};
use crate::session::WorkSession;

/// Filter graph mixing input 1 (narration) and input 2 (music) into
/// `[aout]`. The mix lasts as long as the longer input and does not
/// renormalize when the shorter one ends.
pub fn mix_filter(mix: &MixConfig) -> String {
    format!(
        "[1:a]volume={}[nar];[2:a]volume={}[bgm];[nar][bgm]amix=inputs=2:duration=longest:dropout_transition=0[aout]",
        mix.narration_gain, mix.music_gain
    )
}

/// Combined length of the clips that go into the concatenation.
pub fn total_duration(segments: &[RenderedSegment]) -> f64 {
    segments.iter().map(|s| s.duration).sum()
}

pub struct Assembler<'a> {
    ffmpeg: &'a Ffmpeg,
    layout: &'a LayoutConfig,
    mix: &'a MixConfig,
    session: &'a WorkSession,
}

impl<'a> Assembler<'a> {
    pub fn new(
        ffmpeg: &'a Ffmpeg,
        layout: &'a LayoutConfig,
        mix: &'a MixConfig,
        session: &'a WorkSession,
    ) -> Self {
        Self {
            ffmpeg,
            layout,
            mix,
            session,
        }
    }

    /// Build the trailing title card: a blank clip, then the text overlay.
    pub fn title_card(&self, card: &TitleCard, index: usize) -> Result<RenderedSegment> {
        let canvas = &self.layout.canvas;
        let duration = ffmpeg::seconds(card.duration);
        let encoder = &self.layout.encoder;

        let blank = self.session.file("title_blank.mp4");
        self.ffmpeg.run(
            "title card background",
            [
                "-y".to_string(),
                "-f".into(),
                "lavfi".into(),
                "-i".into(),
                format!("color=c={}:s={}:d={}", card.background, canvas.size(), duration),
                "-vf".into(),
                format!("fps={},format={}", canvas.fps, encoder.pix_fmt),
                "-c:v".into(),
                encoder.codec.clone(),
                path_arg(&blank),
            ],
        )?;

        let textfile = self.session.file("title_card.txt");
        fs::write(&textfile, &card.text)?;
        let mut vf = format!(
            "drawtext=textfile='{}':expansion=none:fontcolor=white:fontsize={}:borderw={}:bordercolor=black:x=(w-tw)/2:y=(h-th)/2",
            ffmpeg::escape_filter_path(&textfile),
            card.font_size,
            card.border_width
        );
        if let Some(font) = &self.layout.font_file {
            vf.push_str(&format!(":fontfile='{}'", ffmpeg::escape_filter_path(font)));
        }

        let clip = self.session.file("title_card.mp4");
        self.ffmpeg.run(
            "title card text",
            [
                "-y".to_string(),
                "-i".into(),
                path_arg(&blank),
                "-vf".into(),
                vf,
                "-t".into(),
                duration,
                "-c:v".into(),
                encoder.codec.clone(),
                "-pix_fmt".into(),
                encoder.pix_fmt.clone(),
                path_arg(&clip),
            ],
        )?;

        Ok(RenderedSegment {
            index,
            path: clip,
            duration: card.duration,
        })
    }

    /// Write the concat manifest listing `clips` in order.
    pub fn write_manifest(&self, clips: &[RenderedSegment]) -> Result<PathBuf> {
        let paths: Vec<&Path> = clips.iter().map(|c| c.path.as_path()).collect();
        let manifest = self.session.file("concat.txt");
        fs::write(&manifest, ffmpeg::concat_manifest(&paths))?;
        Ok(manifest)
    }

    /// Concatenate `segments` (plus the optional title card), mix the
    /// narration with the music and mux the result into the final video.
    /// The video stream is copied; output stops at the shorter of the
    /// video and the mixed audio.
    pub fn assemble(
        &self,
        segments: &[RenderedSegment],
        title: Option<&TitleCard>,
        narration: &Path,
        music: &Path,
    ) -> Result<PathBuf> {
        let mut clips = segments.to_vec();
        if let Some(card) = title {
            log::info!("Appending title card ({}s)", card.duration);
            clips.push(self.title_card(card, segments.len())?);
        }
        let manifest = self.write_manifest(&clips)?;
        log::info!(
            "Concatenating {} clips ({:.2}s of video)",
            clips.len(),
            total_duration(&clips)
        );

        let output = self.session.file("final_video.mp4");
        self.ffmpeg.run(
            "concatenation and audio mix",
            [
                "-y".to_string(),
                "-f".into(),
                "concat".into(),
                "-safe".into(),
                "0".into(),
                "-i".into(),
                path_arg(&manifest),
                "-i".into(),
                path_arg(narration),
                "-i".into(),
                path_arg(music),
                "-filter_complex".into(),
                mix_filter(self.mix),
                "-map".into(),
                "0:v".into(),
                "-map".into(),
                "[aout]".into(),
                "-c:v".into(),
                "copy".into(),
                "-c:a".into(),
                self.mix.audio_codec.clone(),
                "-shortest".into(),
                path_arg(&output),
            ],
        )?;
        log::info!("Final video written to {}", output.display());
        Ok(output)
    }
}
