//! Post-processing observer: exclude-list bookkeeping, ownership fixes and
//! cleanup of partial outputs.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::WorkerObserver;

/// Name of the append-only record of processed inputs, kept in the output
/// directory.
pub const EXCLUDE_LIST_NAME: &str = "exclude.list";

/// Side effects after a transcode ends.
///
/// On success: reassign ownership of the outputs (and their directories up
/// to, but not including, the output root) when `UID`/`GID` are set,
/// append the input's relative path to the exclude list, and optionally
/// unlink the input. On failure: best-effort removal of every planned
/// output.
pub struct PostListener {
    input_abs: PathBuf,
    /// Input path relative to the input root; this is the exclude-list
    /// line format.
    input_rel: String,
    output_paths: Vec<PathBuf>,
    output_root: PathBuf,
    delete_input: bool,
}

impl PostListener {
    pub fn new(
        input_abs: PathBuf,
        input_rel: String,
        output_paths: Vec<PathBuf>,
        output_root: PathBuf,
        delete_input: bool,
    ) -> Self {
        Self {
            input_abs,
            input_rel,
            output_paths,
            output_root,
            delete_input,
        }
    }

    fn append_exclude_entry(&self) {
        let path = self.output_root.join(EXCLUDE_LIST_NAME);
        let result = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{}", self.input_rel));
        if let Err(e) = result {
            warn!(path = %path.display(), "FileSystemError: failed to append exclude entry: {}", e);
        }
    }

    /// Reassign ownership of an output and its ancestor directories when
    /// the environment provides a target `UID`/`GID`.
    #[cfg(unix)]
    fn fix_ownership(&self, output: &Path) {
        use std::os::unix::fs::MetadataExt;

        let (Some(uid), Some(gid)) = (env_id("UID"), env_id("GID")) else {
            return;
        };

        let mut targets: Vec<&Path> = vec![output];
        targets.extend(
            output
                .ancestors()
                .skip(1)
                .take_while(|p| *p != self.output_root && p.starts_with(&self.output_root)),
        );

        for path in targets {
            let Ok(metadata) = std::fs::metadata(path) else {
                continue;
            };
            if metadata.uid() == uid && metadata.gid() == gid {
                continue;
            }
            if let Err(e) = std::os::unix::fs::chown(path, Some(uid), Some(gid)) {
                warn!(path = %path.display(), "FileSystemError: chown failed: {}", e);
            }
        }
    }

    #[cfg(not(unix))]
    fn fix_ownership(&self, _output: &Path) {}
}

#[cfg(unix)]
fn env_id(name: &str) -> Option<u32> {
    std::env::var(name).ok()?.trim().parse().ok()
}

impl WorkerObserver for PostListener {
    fn on_end(&mut self) {
        for output in &self.output_paths {
            self.fix_ownership(output);
        }

        self.append_exclude_entry();

        if self.delete_input {
            match std::fs::remove_file(&self.input_abs) {
                Ok(()) => debug!(input = %self.input_abs.display(), "input deleted after process"),
                Err(e) => warn!(
                    input = %self.input_abs.display(),
                    "FileSystemError: failed to delete input: {}", e
                ),
            }
        }
    }

    fn on_failed(&mut self, _message: &str) {
        for output in &self.output_paths {
            match std::fs::remove_file(output) {
                Ok(()) => debug!(output = %output.display(), "partial output removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    output = %output.display(),
                    "FileSystemError: failed to remove partial output: {}", e
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn listener(dir: &TempDir, outputs: Vec<PathBuf>, delete_input: bool) -> PostListener {
        PostListener::new(
            dir.path().join("in/sub/film.mp4"),
            "sub/film.mp4".to_string(),
            outputs,
            dir.path().join("out"),
            delete_input,
        )
    }

    #[test]
    fn test_success_appends_relative_path_to_exclude_list() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("out")).unwrap();
        let mut listener = listener(&dir, vec![], false);

        listener.on_end();

        let content = fs::read_to_string(dir.path().join("out/exclude.list")).unwrap();
        assert_eq!(content, "sub/film.mp4\n");
    }

    #[test]
    fn test_exclude_entries_accumulate() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::write(dir.path().join("out/exclude.list"), "earlier/other.mkv\n").unwrap();
        let mut listener = listener(&dir, vec![], false);

        listener.on_end();

        let content = fs::read_to_string(dir.path().join("out/exclude.list")).unwrap();
        assert_eq!(content, "earlier/other.mkv\nsub/film.mp4\n");
    }

    #[test]
    fn test_success_deletes_input_when_configured() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::create_dir_all(dir.path().join("in/sub")).unwrap();
        let input = dir.path().join("in/sub/film.mp4");
        fs::write(&input, b"data").unwrap();

        let mut listener = listener(&dir, vec![], true);
        listener.on_end();

        assert!(!input.exists());
    }

    #[test]
    fn test_success_keeps_input_by_default() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::create_dir_all(dir.path().join("in/sub")).unwrap();
        let input = dir.path().join("in/sub/film.mp4");
        fs::write(&input, b"data").unwrap();

        let mut listener = listener(&dir, vec![], false);
        listener.on_end();

        assert!(input.exists());
    }

    #[test]
    fn test_failure_removes_existing_outputs() {
        let dir = TempDir::new().unwrap();
        let out_dir = dir.path().join("out/sub");
        fs::create_dir_all(&out_dir).unwrap();
        let existing = out_dir.join("film.mkv");
        fs::write(&existing, b"partial").unwrap();
        let missing = out_dir.join("film.eng.srt");

        let mut listener = listener(&dir, vec![existing.clone(), missing.clone()], false);
        listener.on_failed("Conversion failed!");

        // Planned outputs are gone; the missing one never caused an error.
        assert!(!existing.exists());
        assert!(!missing.exists());
    }

    #[test]
    fn test_failure_does_not_touch_exclude_list() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("out")).unwrap();
        let mut listener = listener(&dir, vec![], false);

        listener.on_failed("Conversion failed!");

        assert!(!dir.path().join("out/exclude.list").exists());
    }
}
