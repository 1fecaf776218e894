//! ffprobe invocation and output parsing.
//!
//! Runs `ffprobe -v quiet -print_format json -show_streams -show_format
//! [extra args] <path>` and keeps the parsed JSON mostly verbatim: streams
//! and chapters stay raw objects so profile snippets can reach every field
//! the probe reports.

use serde_json::{Map, Value as Json};
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe exited non-zero.
    #[error("ProbeFailed: ffprobe exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    /// ffprobe could not be started or read.
    #[error("ProbeFailed: {0}")]
    Io(#[from] std::io::Error),

    /// ffprobe produced output that is not the expected JSON.
    #[error("ProbeFailed: failed to parse ffprobe output: {0}")]
    Parse(String),

    /// The file probed fine but is not usable media (no finite duration).
    #[error("NotAMedia: '{0}' has no finite duration")]
    NotAMedia(String),
}

/// Parsed probe output: streams, container format and chapters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeData {
    pub streams: Vec<Json>,
    pub format: Map<String, Json>,
    pub chapters: Vec<Json>,
}

impl ProbeData {
    /// Container duration in seconds, when present and finite.
    ///
    /// ffprobe reports `duration` as a string; a numeric value is accepted
    /// as well.
    pub fn duration(&self) -> Option<f64> {
        let duration = match self.format.get("duration")? {
            Json::Number(n) => n.as_f64()?,
            Json::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        duration.is_finite().then_some(duration)
    }
}

/// Probe a media file, appending any extra ffprobe arguments
/// (e.g. `-show_chapters`).
pub async fn probe(path: &Path, extra_args: &[&str]) -> Result<ProbeData, ProbeError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .args(extra_args)
        .arg(path)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::Failed {
            status: output.status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&stdout)
}

/// Parse ffprobe JSON output into a [`ProbeData`].
pub fn parse_probe_output(json_str: &str) -> Result<ProbeData, ProbeError> {
    let value: Json =
        serde_json::from_str(json_str).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let Json::Object(mut map) = value else {
        return Err(ProbeError::Parse("top-level value is not an object".to_string()));
    };

    let streams = match map.remove("streams") {
        Some(Json::Array(streams)) => streams,
        _ => Vec::new(),
    };
    let format = match map.remove("format") {
        Some(Json::Object(format)) => format,
        _ => Map::new(),
    };
    let chapters = match map.remove("chapters") {
        Some(Json::Array(chapters)) => chapters,
        _ => Vec::new(),
    };

    Ok(ProbeData { streams, format, chapters })
}
