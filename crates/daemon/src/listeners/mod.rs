//! Worker lifecycle observers.
//!
//! A worker owns a fixed, ordered list of observers; there is no dynamic
//! subscription. The three defaults are logging (stderr capture + log
//! file), progress reporting and post-processing side effects.

pub mod logging;
pub mod post;
pub mod progress;

pub use logging::LoggingListener;
pub use post::PostListener;
pub use progress::ProgressListener;

use crate::worker::Progress;

/// Observer over a single transcode's lifecycle.
///
/// `on_start` precedes all `on_line`/`on_progress` calls, which precede
/// exactly one of `on_end` or `on_failed`.
pub trait WorkerObserver: Send {
    fn on_start(&mut self, command_line: &str) {
        let _ = command_line;
    }

    fn on_line(&mut self, line: &str) {
        let _ = line;
    }

    fn on_progress(&mut self, progress: &Progress) {
        let _ = progress;
    }

    fn on_end(&mut self) {}

    fn on_failed(&mut self, message: &str) {
        let _ = message;
    }
}
