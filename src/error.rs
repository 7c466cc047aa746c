//! Error types for the reel pipeline.
//!
//! Every failure is terminal for the current run. Components return the
//! narrow error of their concern and the pipeline folds them into
//! [`PipelineError`], which the binary reports after the working area has
//! been released.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Malformed recognition data handed to the segmenter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    /// A segment carries a non-finite or negative timestamp
    #[error("segment {index} has an invalid timestamp ({start}..{end})")]
    InvalidTimestamp { index: usize, start: f64, end: f64 },

    /// A segment ends before it starts
    #[error("segment {index} ends before it starts ({start}..{end})")]
    Inverted { index: usize, start: f64, end: f64 },

    /// A segment ends earlier than the segment before it
    #[error("segment {index} ends at {end}, before the previous end {previous_end}")]
    NotMonotonic {
        index: usize,
        end: f64,
        previous_end: f64,
    },

    /// Trailing text could not be given a positive duration
    #[error("trailing text has no time left to occupy: {text:?}")]
    Degenerate { text: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("cannot allocate sentences across zero intervals")]
    NoIntervals,
}

/// Failure of the external encoding tool.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to launch {program} for {stage}: {source}")]
    Spawn {
        program: String,
        stage: String,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit; `stderr` holds the tool's full diagnostic output
    #[error("{stage} failed ({status}):\n{stderr}")]
    Failed {
        stage: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Errors reported by the network/engine collaborators.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("request to {service} failed: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} responded with {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("unexpected {service} response: {detail}")]
    Unexpected { service: &'static str, detail: String },

    #[error("{engine} failed: {detail}")]
    Engine { engine: &'static str, detail: String },

    #[error("I/O error while talking to {service}: {source}")]
    Io {
        service: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error for one pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Required text or asset absent
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("image error on {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
