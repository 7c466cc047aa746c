//! Two-pass rendering of one video clip per subtitle interval.
//!
//! Pass one puts the background still in slow zoom motion and draws the
//! primary subtitle block over the untouched picture. Pass two takes that
//! clip, lays a translucent gray layer and a fixed darkening over the whole
//! frame, then draws the secondary subtitle block against the bottom edge.
//! Both passes are cut to the interval's exact duration.

use std::fs;
use std::path::{Path, PathBuf};

use crate::allocate::SentenceGroup;
use crate::config::{LayoutConfig, SubtitleStyle};
use crate::error::{PipelineError, Result};
use crate::ffmpeg::{self, Ffmpeg};
use crate::session::WorkSession;
use crate::timeline::Interval;
use crate::wrap::wrap_lines;

/// Everything needed to render one segment, resolved before any encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlan {
    pub index: usize,
    pub duration: f64,
    pub image: PathBuf,
    pub primary_lines: Vec<String>,
    pub secondary_lines: Vec<String>,
}

/// A finished segment clip.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSegment {
    pub index: usize,
    pub path: PathBuf,
    pub duration: f64,
}

/// Pair every interval with a background image (cycling through `images`)
/// and its wrapped primary and secondary lines.
pub fn plan_segments(
    intervals: &[Interval],
    groups: &[SentenceGroup],
    images: &[PathBuf],
    layout: &LayoutConfig,
) -> Result<Vec<SegmentPlan>> {
    if images.is_empty() {
        return Err(PipelineError::MissingInput(
            "no background images to render with".to_string(),
        ));
    }

    let plans = intervals
        .iter()
        .enumerate()
        .map(|(i, interval)| {
            let secondary = groups.get(i).map(SentenceGroup::text).unwrap_or_default();
            SegmentPlan {
                index: i,
                duration: interval.duration(),
                image: images[i % images.len()].clone(),
                primary_lines: wrap_lines(&interval.text, layout.primary.line_budget),
                secondary_lines: wrap_lines(&secondary, layout.secondary.line_budget),
            }
        })
        .collect();
    Ok(plans)
}

/// Top y of each line when the block is centered on the frame's middle.
pub fn centered_line_positions(lines: usize, spacing: u32, frame_height: u32) -> Vec<i64> {
    if lines == 0 {
        return Vec::new();
    }
    let block = (lines as i64 - 1) * spacing as i64;
    let start = frame_height as i64 / 2 - block / 2;
    (0..lines as i64).map(|j| start + j * spacing as i64).collect()
}

/// Top y of each line when the block's last line sits `margin` above the
/// bottom edge and the block grows upward.
pub fn bottom_line_positions(lines: usize, spacing: u32, frame_height: u32, margin: u32) -> Vec<i64> {
    if lines == 0 {
        return Vec::new();
    }
    let bottom = frame_height as i64 - margin as i64;
    let start = bottom - (lines as i64 - 1) * spacing as i64;
    (0..lines as i64).map(|j| start + j * spacing as i64).collect()
}

pub fn zoom_filter(layout: &LayoutConfig) -> String {
    format!(
        "zoompan=z='zoom+{}':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d={}:s={}:fps={}",
        layout.zoom_step,
        layout.zoompan_frames,
        layout.canvas.size(),
        layout.canvas.fps
    )
}

/// One `drawtext` filter reading its text from `textfile`, horizontally
/// centered at `y`.
pub fn drawtext_filter(
    textfile: &Path,
    y: i64,
    style: &SubtitleStyle,
    font_file: Option<&Path>,
) -> String {
    let mut filter = format!(
        "drawtext=textfile='{}':expansion=none:fontcolor={}:fontsize=w/{}:borderw={}:bordercolor={}:x=(w-tw)/2:y={}",
        ffmpeg::escape_filter_path(textfile),
        style.font_color,
        style.font_divisor,
        style.border_width,
        style.border_color,
        y
    );
    if let Some(font) = font_file {
        filter.push_str(&format!(":fontfile='{}'", ffmpeg::escape_filter_path(font)));
    }
    filter
}

/// Filter for pass one: zoom motion plus the centered primary block.
pub fn primary_filter(layout: &LayoutConfig, textfiles: &[PathBuf]) -> String {
    let ys = centered_line_positions(
        textfiles.len(),
        layout.primary.line_spacing,
        layout.canvas.height,
    );
    let mut parts = vec![zoom_filter(layout)];
    for (file, y) in textfiles.iter().zip(ys) {
        parts.push(drawtext_filter(
            file,
            y,
            &layout.primary,
            layout.font_file.as_deref(),
        ));
    }
    parts.join(",")
}

/// Filter graph for pass two, labelled `[v]`: gray layer, grading and the
/// bottom-anchored secondary block.
pub fn secondary_filter(layout: &LayoutConfig, textfiles: &[PathBuf]) -> String {
    let canvas = &layout.canvas;
    let mut chain = vec![
        "[0:v][gray]overlay=0:0:shortest=1".to_string(),
        format!("eq=brightness={}:contrast={}", layout.brightness, layout.contrast),
    ];
    let ys = bottom_line_positions(
        textfiles.len(),
        layout.secondary.line_spacing,
        canvas.height,
        layout.bottom_margin,
    );
    for (file, y) in textfiles.iter().zip(ys) {
        chain.push(drawtext_filter(
            file,
            y,
            &layout.secondary,
            layout.font_file.as_deref(),
        ));
    }
    format!(
        "color=c={}:s={}:r={}[gray];{}[v]",
        layout.gray_layer,
        canvas.size(),
        canvas.fps,
        chain.join(",")
    )
}

pub struct SegmentRenderer<'a> {
    ffmpeg: &'a Ffmpeg,
    layout: &'a LayoutConfig,
    session: &'a WorkSession,
}

impl<'a> SegmentRenderer<'a> {
    pub fn new(ffmpeg: &'a Ffmpeg, layout: &'a LayoutConfig, session: &'a WorkSession) -> Self {
        Self {
            ffmpeg,
            layout,
            session,
        }
    }

    /// Render every plan in order. The first failure aborts the loop.
    pub fn render_all(&self, plans: &[SegmentPlan]) -> Result<Vec<RenderedSegment>> {
        let mut rendered = Vec::with_capacity(plans.len());
        for plan in plans {
            log::info!(
                "Rendering segment {}/{} ({:.2}s)",
                plan.index + 1,
                plans.len(),
                plan.duration
            );
            rendered.push(self.render(plan)?);
        }
        Ok(rendered)
    }

    pub fn render(&self, plan: &SegmentPlan) -> Result<RenderedSegment> {
        let duration = ffmpeg::seconds(plan.duration);
        let encoder = self.encoder_args();

        // Pass one
        let primary_files = self.write_lines(plan.index, "primary", &plan.primary_lines)?;
        let primary_clip = self.session.file(&format!("primary_{:02}.mp4", plan.index));
        let vf = primary_filter(self.layout, &primary_files);
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-loop".into(),
            "1".into(),
            "-i".into(),
            path_arg(&plan.image),
            "-t".into(),
            duration.clone(),
            "-vf".into(),
            vf,
        ];
        args.extend(encoder.iter().cloned());
        args.push(path_arg(&primary_clip));
        self.ffmpeg
            .run(&format!("segment {} primary pass", plan.index), &args)?;

        // Pass two
        let secondary_files = self.write_lines(plan.index, "secondary", &plan.secondary_lines)?;
        let final_clip = self.session.file(&format!("segment_{:02}.mp4", plan.index));
        let graph = secondary_filter(self.layout, &secondary_files);
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-i".into(),
            path_arg(&primary_clip),
            "-filter_complex".into(),
            graph,
            "-map".into(),
            "[v]".into(),
        ];
        args.extend(encoder);
        args.extend(["-t".into(), duration, path_arg(&final_clip)]);
        self.ffmpeg
            .run(&format!("segment {} secondary pass", plan.index), &args)?;

        Ok(RenderedSegment {
            index: plan.index,
            path: final_clip,
            duration: plan.duration,
        })
    }

    fn encoder_args(&self) -> Vec<String> {
        let enc = &self.layout.encoder;
        vec![
            "-c:v".into(),
            enc.codec.clone(),
            "-pix_fmt".into(),
            enc.pix_fmt.clone(),
            "-preset".into(),
            enc.preset.clone(),
            "-crf".into(),
            enc.crf.to_string(),
        ]
    }

    /// One text file per subtitle line, read back by `drawtext`.
    fn write_lines(&self, index: usize, layer: &str, lines: &[String]) -> Result<Vec<PathBuf>> {
        let dir = self.session.subdir("subtitles")?;
        lines
            .iter()
            .enumerate()
            .map(|(j, line)| -> Result<PathBuf> {
                let path = dir.join(format!("seg_{index:02}_{layer}_{j:02}.txt"));
                fs::write(&path, line)?;
                Ok(path)
            })
            .collect()
    }
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(start: f64, end: f64, text: &str) -> Interval {
        Interval {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn primary_block_is_centered() {
        assert_eq!(centered_line_positions(1, 110, 1920), vec![960]);
        assert_eq!(centered_line_positions(3, 110, 1920), vec![850, 960, 1070]);
        assert_eq!(centered_line_positions(2, 110, 1920), vec![905, 1015]);
        assert!(centered_line_positions(0, 110, 1920).is_empty());
    }

    #[test]
    fn secondary_block_grows_upward_from_bottom() {
        assert_eq!(bottom_line_positions(1, 40, 1920, 100), vec![1820]);
        assert_eq!(bottom_line_positions(3, 40, 1920, 100), vec![1740, 1780, 1820]);
    }

    #[test]
    fn plan_cycles_images_and_wraps_both_layers() {
        let intervals = vec![
            interval(0.0, 3.5, "the quick brown fox jumps"),
            interval(3.5, 7.0, "over"),
            interval(7.0, 8.0, "the dog"),
        ];
        let groups = vec![
            SentenceGroup {
                sentences: vec!["一。".into(), "二。".into()],
            },
            SentenceGroup::default(),
        ];
        let images = vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")];
        let plans = plan_segments(&intervals, &groups, &images, &LayoutConfig::default()).unwrap();

        assert_eq!(plans.len(), 3);
        assert_eq!(plans[2].image, PathBuf::from("a.jpg"));
        assert_eq!(plans[0].primary_lines, vec!["the quick brown fox", "jumps"]);
        assert_eq!(plans[0].secondary_lines, vec!["一。二。"]);
        assert!(plans[1].secondary_lines.is_empty());
        // Missing group falls back to no secondary text
        assert!(plans[2].secondary_lines.is_empty());
        assert_eq!(plans[1].duration, 3.5);
    }

    #[test]
    fn plan_requires_images() {
        let err = plan_segments(&[interval(0.0, 3.0, "x")], &[], &[], &LayoutConfig::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }

    #[test]
    fn primary_filter_draws_each_line() {
        let layout = LayoutConfig::default();
        let files = vec![PathBuf::from("/w/l0.txt"), PathBuf::from("/w/l1.txt")];
        let f = primary_filter(&layout, &files);
        assert!(f.starts_with("zoompan=z='zoom+0.001'"));
        assert!(f.contains("s=1080x1920:fps=30"));
        assert_eq!(f.matches("drawtext=").count(), 2);
        assert!(f.contains("textfile='/w/l0.txt'"));
        assert!(f.contains("fontsize=w/10"));
        assert!(f.contains("y=905"));
        assert!(!f.contains("fontfile"));
    }

    #[test]
    fn secondary_filter_layers_gray_before_text() {
        let mut layout = LayoutConfig::default();
        layout.font_file = Some(PathBuf::from("/fonts/mincho.ttf"));
        let f = secondary_filter(&layout, &[PathBuf::from("/w/j0.txt")]);
        assert!(f.starts_with("color=c=gray@0.35:s=1080x1920:r=30[gray];[0:v][gray]overlay"));
        let eq = f.find("eq=brightness=-0.08:contrast=1.05").unwrap();
        let text = f.find("drawtext=").unwrap();
        assert!(eq < text);
        assert!(f.contains("fontsize=w/50"));
        assert!(f.contains("y=1820"));
        assert!(f.contains(":fontfile='/fonts/mincho.ttf'"));
        assert!(f.ends_with("[v]"));
    }

    #[test]
    fn secondary_filter_without_text_still_grades() {
        let f = secondary_filter(&LayoutConfig::default(), &[]);
        assert!(f.ends_with("eq=brightness=-0.08:contrast=1.05[v]"));
    }
}
