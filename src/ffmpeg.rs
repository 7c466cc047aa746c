//! Thin wrapper around the ffmpeg command-line tool.

use std::ffi::OsStr;
use std::fmt::Write as _;
use std::path::Path;
use std::process::Command;

use crate::error::ToolError;

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: String,
}

impl Ffmpeg {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Check that the binary can be launched.
    pub fn ensure_available(&self) -> Result<(), ToolError> {
        self.run("version check", ["-version"]).map(|_| ())
    }

    /// Run ffmpeg with `args`, capturing its output. A non-zero exit is
    /// returned as [`ToolError::Failed`] with the full stderr text.
    pub fn run<I, S>(&self, stage: &str, args: I) -> Result<String, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        log::debug!("{}: {:?}", stage, cmd);

        let output = cmd.output().map_err(|source| ToolError::Spawn {
            program: self.program.clone(),
            stage: stage.to_string(),
            source,
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            log::error!("{} exited with {}", stage, output.status);
            return Err(ToolError::Failed {
                stage: stage.to_string(),
                status: output.status,
                stderr,
            });
        }
        Ok(stderr)
    }
}

/// Escape a path for use as a quoted filter option value, as in
/// `fontfile='<escaped>'`. An apostrophe closes the quote, is escaped, and
/// reopens it.
pub fn escape_filter_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    s.replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "'\\''")
}

/// Quote a path for a concat demuxer manifest line.
pub fn quote_concat_path(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', "'\\''"))
}

/// Render clip paths as a concat demuxer manifest.
pub fn concat_manifest<P: AsRef<Path>>(clips: &[P]) -> String {
    let mut out = String::new();
    for clip in clips {
        let _ = writeln!(out, "file {}", quote_concat_path(clip.as_ref()));
    }
    out
}

/// Format seconds for ffmpeg duration options without losing precision.
pub fn seconds(value: f64) -> String {
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn filter_path_escaping() {
        let p = PathBuf::from("C:\\Windows\\Fonts\\yumin.ttf");
        assert_eq!(escape_filter_path(&p), "C\\:\\\\Windows\\\\Fonts\\\\yumin.ttf");

        let p = PathBuf::from("/home/o'brien/fonts/a.ttf");
        let escaped = escape_filter_path(&p);
        assert_eq!(escaped, "/home/o'\\''brien/fonts/a.ttf");
        let filter = format!("fontfile='{escaped}'");
        assert_eq!(filter, "fontfile='/home/o'\\''brien/fonts/a.ttf'");
    }

    #[test]
    fn manifest_lists_clips_in_order() {
        let clips = [PathBuf::from("/tmp/s/segment_00.mp4"), PathBuf::from("/tmp/s/it's.mp4")];
        assert_eq!(
            concat_manifest(&clips),
            "file '/tmp/s/segment_00.mp4'\nfile '/tmp/s/it'\\''s.mp4'\n"
        );
    }

    #[test]
    fn seconds_formatting() {
        assert_eq!(seconds(4.5), "4.5");
        assert_eq!(seconds(3.0), "3");
        assert_eq!(seconds(0.0), "0");
        assert_eq!(seconds(2.123456), "2.123456");
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let ff = Ffmpeg::new("definitely-not-a-real-ffmpeg-binary");
        assert!(matches!(ff.ensure_available(), Err(ToolError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_carries_stderr() {
        let sh = Ffmpeg::new("sh");
        let err = sh
            .run("segment 0 primary pass", ["-c", "echo boom >&2; exit 3"])
            .unwrap_err();
        let message = err.to_string();
        match err {
            ToolError::Failed { stage, status, stderr } => {
                assert_eq!(stage, "segment 0 primary pass");
                assert_eq!(status.code(), Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("expected a failed run, got {other:?}"),
        }
        assert!(message.starts_with("segment 0 primary pass failed"));
        assert!(message.contains("boom"));
    }
}
