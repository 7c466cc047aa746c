//! Narrated vertical videos with bilingual burned-in subtitles.
//!
//! A narration text is synthesized to speech and transcribed back into timed
//! segments. Those are merged into subtitle intervals, a second-language
//! text is spread across the intervals, and every interval is rendered as a
//! zooming still with both subtitle layers. The clips are concatenated and
//! mixed with the narration and background music.

pub mod allocate;
pub mod assemble;
pub mod config;
pub mod drive;
pub mod error;
pub mod ffmpeg;
pub mod image_norm;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod sheets;
pub mod timeline;
pub mod transcribe;
pub mod tts;
pub mod wrap;

pub use config::Settings;
pub use error::{PipelineError, Result};
pub use pipeline::{LocalInputs, Pipeline, RunReport};
