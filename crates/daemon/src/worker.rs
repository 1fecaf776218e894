//! Worker: turns a resolved plan into one ffmpeg invocation and surfaces
//! its lifecycle as observer events.
//!
//! A worker is single-use. It assembles the command line (input options,
//! input, then each output's stream options, global options and path),
//! creates output directories, spawns the transcoder and drains stderr,
//! classifying lines into progress events, noise and log lines.

use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::listeners::WorkerObserver;
use crate::media::{InputMedia, OutputMedia};

/// Error type for worker execution.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A worker may be executed at most once.
    #[error("AlreadyExecuted: a worker may only be executed once")]
    AlreadyExecuted,

    /// The transcoder reported failure; the job fails, the process lives.
    #[error("TranscodeFailed: {0}")]
    TranscodeFailed(String),

    /// Spawning or reading the subprocess failed.
    #[error("FileSystemError: {0}")]
    Io(#[from] std::io::Error),
}

/// A progress sample parsed from the transcoder's stderr.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Frames encoded so far.
    pub frames: u64,
    /// Instantaneous encoder FPS.
    pub current_fps: f64,
    /// Timemark as printed by the transcoder, e.g. `00:01:02.03`.
    pub timemark: String,
    /// Percent of the input duration covered; 0 when the duration is
    /// unknown.
    pub percent: f64,
    /// Encoder speed multiplier when reported.
    pub speed: Option<f64>,
}

fn progress_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^frame=\s*(\d+)").expect("static regex"))
}

fn fps_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"fps=\s*([\d.]+)").expect("static regex"))
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"time=\s*(\S+)").expect("static regex"))
}

fn speed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"speed=\s*([\d.]+)x").expect("static regex"))
}

/// Parse `HH:MM:SS.cc` into seconds.
pub(crate) fn parse_timemark(timemark: &str) -> Option<f64> {
    let mut parts = timemark.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parse a transcoder progress line (`frame= ...`).
pub(crate) fn parse_progress_line(line: &str, duration: Option<f64>) -> Option<Progress> {
    let frames: u64 = progress_re().captures(line)?.get(1)?.as_str().parse().ok()?;
    let current_fps = fps_re()
        .captures(line)
        .and_then(|c| c.get(1)?.as_str().parse().ok())
        .unwrap_or(0.0);
    let timemark = time_re()
        .captures(line)
        .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
        .unwrap_or_default();
    let speed = speed_re()
        .captures(line)
        .and_then(|c| c.get(1)?.as_str().parse().ok());

    let percent = match (parse_timemark(&timemark), duration) {
        (Some(at), Some(total)) if total > 0.0 => (at / total * 100.0).clamp(0.0, 100.0),
        _ => 0.0,
    };

    Some(Progress { frames, current_fps, timemark, percent, speed })
}

/// Prompt noise the transcoder prints on an interactive stderr.
pub(crate) fn is_prompt_noise(line: &str) -> bool {
    line.contains("Press ")
}

/// Single-use driver for one transcode.
pub struct Worker {
    input: Arc<InputMedia>,
    outputs: Vec<OutputMedia>,
    input_root: PathBuf,
    output_root: PathBuf,
    observers: Vec<Box<dyn WorkerObserver>>,
    stderr_tail: Vec<String>,
    executed: bool,
}

impl Worker {
    /// Worker without observers; callers attach what they need.
    pub fn new(
        input: Arc<InputMedia>,
        outputs: Vec<OutputMedia>,
        input_root: PathBuf,
        output_root: PathBuf,
    ) -> Self {
        Self {
            input,
            outputs,
            input_root,
            output_root,
            observers: Vec::new(),
            stderr_tail: Vec::new(),
            executed: false,
        }
    }

    /// Attach an observer; observers are notified in attachment order.
    pub fn attach(&mut self, observer: Box<dyn WorkerObserver>) {
        self.observers.push(observer);
    }

    /// Absolute paths of the planned outputs.
    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.outputs
            .iter()
            .map(|o| o.path.absolute(&self.output_root))
            .collect()
    }

    /// Assemble the full transcoder argument list.
    ///
    /// Order: input options, `-i` input, then per output (in builder
    /// order) every stream's options, the output's global options, and the
    /// output path.
    pub fn command_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".to_string()];

        for param in &self.input.params {
            args.extend(param.split_whitespace().map(str::to_string));
        }
        args.push("-i".to_string());
        args.push(
            self.input
                .path
                .absolute(&self.input_root)
                .to_string_lossy()
                .into_owned(),
        );

        for output in &self.outputs {
            for stream in &output.streams {
                for param in &stream.params {
                    args.extend(param.split_whitespace().map(str::to_string));
                }
            }
            for param in &output.params {
                args.extend(param.split_whitespace().map(str::to_string));
            }
            args.push(
                output
                    .path
                    .absolute(&self.output_root)
                    .to_string_lossy()
                    .into_owned(),
            );
        }

        args
    }

    /// Printable command line, for logs and the start event.
    pub fn command_line(&self) -> String {
        let mut line = String::from("ffmpeg");
        for arg in self.command_args() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }

    fn emit(&mut self, mut f: impl FnMut(&mut dyn WorkerObserver)) {
        for observer in &mut self.observers {
            f(observer.as_mut());
        }
    }

    fn handle_line(&mut self, line: &str) {
        let duration = self.input.duration();
        if let Some(progress) = parse_progress_line(line, duration) {
            self.emit(|o| o.on_progress(&progress));
            return;
        }
        if is_prompt_noise(line) {
            return;
        }
        self.stderr_tail.push(line.to_string());
        self.emit(|o| o.on_line(line));
    }

    /// Error message from the collected stderr, trimmed of trailing blank
    /// lines.
    fn failure_message(&self) -> String {
        let mut lines: Vec<&str> = self.stderr_tail.iter().map(String::as_str).collect();
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }

    /// Interrupt the transcoder so it can clean up its own temp state.
    fn interrupt(child: &Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGINT);
            }
        }
        #[cfg(not(unix))]
        let _ = child;
    }

    /// Run the transcode to completion.
    pub async fn execute(&mut self) -> Result<(), WorkerError> {
        if self.executed {
            return Err(WorkerError::AlreadyExecuted);
        }
        self.executed = true;

        for path in self.output_paths() {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let args = self.command_args();
        let command_line = self.command_line();
        debug!(command = %command_line, "starting transcode");
        self.emit(|o| o.on_start(&command_line));

        let spawned = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to start transcoder: {}", e);
                self.emit(|o| o.on_failed(&message));
                return Err(WorkerError::Io(e));
            }
        };

        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("transcoder stderr not captured"))?;

        // Drain stderr, splitting on both \n and \r so in-place progress
        // updates arrive as they happen.
        let mut pending: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match stderr.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    for &byte in &chunk[..n] {
                        if byte == b'\n' || byte == b'\r' {
                            if !pending.is_empty() {
                                let line = String::from_utf8_lossy(&pending).into_owned();
                                self.handle_line(&line);
                                pending.clear();
                            }
                        } else {
                            pending.push(byte);
                        }
                    }
                }
                Err(e) => {
                    Self::interrupt(&child);
                    let message = format!("failed to read transcoder output: {}", e);
                    self.emit(|o| o.on_failed(&message));
                    return Err(WorkerError::Io(e));
                }
            }
        }
        if !pending.is_empty() {
            let line = String::from_utf8_lossy(&pending).into_owned();
            self.handle_line(&line);
        }

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => {
                Self::interrupt(&child);
                let message = format!("failed to wait for transcoder: {}", e);
                self.emit(|o| o.on_failed(&message));
                return Err(WorkerError::Io(e));
            }
        };

        if status.success() {
            self.emit(|o| o.on_end());
            Ok(())
        } else {
            // No interrupt here: the child has already exited and its pid
            // is gone.
            let message = self.failure_message();
            self.emit(|o| o.on_failed(&message));
            Err(WorkerError::TranscodeFailed(message))
        }
    }
}
