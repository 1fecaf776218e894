//! Logging observer: buffers the command line and stderr, and writes the
//! per-run log file.

use chrono::Local;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::WorkerObserver;

/// Buffers a transcode's command line and stderr lines.
///
/// On success the buffer is written to
/// `<output_dir>/<input_stem>.<YYYYMMDD-HHmmssSSS>.log` when the profile
/// asks for logs; on failure it is written unconditionally and the path is
/// reported at error level.
pub struct LoggingListener {
    write_log: bool,
    log_dir: PathBuf,
    input_stem: String,
    buffer: Vec<String>,
}

impl LoggingListener {
    pub fn new(write_log: bool, log_dir: PathBuf, input_stem: String) -> Self {
        Self {
            write_log,
            log_dir,
            input_stem,
            buffer: Vec::new(),
        }
    }

    fn log_path(&self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d-%H%M%S%3f");
        self.log_dir
            .join(format!("{}.{}.log", self.input_stem, stamp))
    }

    fn write(&self) -> Option<PathBuf> {
        let path = self.log_path();
        let mut content = self.buffer.join("\n");
        content.push('\n');
        match fs::write(&path, content) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(path = %path.display(), "FileSystemError: failed to write log: {}", e);
                None
            }
        }
    }
}

impl WorkerObserver for LoggingListener {
    fn on_start(&mut self, command_line: &str) {
        self.buffer.push(command_line.to_string());
    }

    fn on_line(&mut self, line: &str) {
        self.buffer.push(line.to_string());
    }

    fn on_end(&mut self) {
        if self.write_log {
            if let Some(path) = self.write() {
                info!(path = %path.display(), "transcode log written");
            }
        }
    }

    fn on_failed(&mut self, _message: &str) {
        if let Some(path) = self.write() {
            error!(path = %path.display(), "transcode failed; log written");
        }
    }
}
