//! Async filter chain deciding which discovered files are worth
//! scheduling.
//!
//! Filters run in order and short-circuit on the first rejection:
//! exclude-list lookup, extension matching, then a probe.

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::listeners::post::EXCLUDE_LIST_NAME;
use crate::probe::{probe, ProbeError};

/// One stage of the filter chain.
#[async_trait]
pub trait FileFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(())` passes the file on; `Err(reason)` rejects it.
    async fn check(&self, file: &Path) -> Result<(), String>;
}

/// Ordered, short-circuiting chain of filters.
pub struct FilterChain {
    filters: Vec<Box<dyn FileFilter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn FileFilter>>) -> Self {
        Self { filters }
    }

    /// An empty chain that passes everything.
    pub fn pass_all() -> Self {
        Self { filters: Vec::new() }
    }

    pub async fn check(&self, file: &Path) -> Result<(), String> {
        for filter in &self.filters {
            filter.check(file).await?;
        }
        Ok(())
    }
}

/// Rejects inputs recorded in `<output_dir>/exclude.list`.
///
/// Entries are newline-delimited paths relative to the input root. A
/// missing exclude list passes everything; the file is re-read per check
/// so concurrent appends are picked up.
pub struct ExcludeListFilter {
    exclude_list: PathBuf,
    input_root: PathBuf,
}

impl ExcludeListFilter {
    pub fn new(output_root: &Path, input_root: PathBuf) -> Self {
        Self {
            exclude_list: output_root.join(EXCLUDE_LIST_NAME),
            input_root,
        }
    }
}

#[async_trait]
impl FileFilter for ExcludeListFilter {
    fn name(&self) -> &'static str {
        "exclude-list"
    }

    async fn check(&self, file: &Path) -> Result<(), String> {
        let content = match tokio::fs::read_to_string(&self.exclude_list).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(format!("FileSystemError: {}", e)),
        };

        let relative = file.strip_prefix(&self.input_root).unwrap_or(file);
        let relative = relative.to_string_lossy();
        if content.lines().any(|line| line == relative) {
            Err("already processed (exclude.list)".to_string())
        } else {
            Ok(())
        }
    }
}

/// Accepts files by extension, using the profile's include/exclude
/// regexes.
///
/// When both are set the union applies: a file passes when include
/// matches *or* exclude does not match.
pub struct ExtensionFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl ExtensionFilter {
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            include: include.map(Regex::new).transpose()?,
            exclude: exclude.map(Regex::new).transpose()?,
        })
    }
}

#[async_trait]
impl FileFilter for ExtensionFilter {
    fn name(&self) -> &'static str {
        "extension"
    }

    async fn check(&self, file: &Path) -> Result<(), String> {
        let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("");
        let pass = match (&self.include, &self.exclude) {
            (Some(include), Some(exclude)) => include.is_match(ext) || !exclude.is_match(ext),
            (Some(include), None) => include.is_match(ext),
            (None, Some(exclude)) => !exclude.is_match(ext),
            (None, None) => true,
        };
        if pass {
            Ok(())
        } else {
            Err(format!("extension '{}' not accepted", ext))
        }
    }
}

/// Accepts files the probe recognizes as media with a finite duration.
pub struct ProbeFilter;

#[async_trait]
impl FileFilter for ProbeFilter {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn check(&self, file: &Path) -> Result<(), String> {
        let data = probe(file, &["-show_chapters"])
            .await
            .map_err(|e| e.to_string())?;
        if data.duration().is_some() {
            Ok(())
        } else {
            Err(ProbeError::NotAMedia(file.display().to_string()).to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_exclude_list_missing_passes() {
        let dir = TempDir::new().unwrap();
        let filter = ExcludeListFilter::new(dir.path(), dir.path().join("in"));
        assert!(filter.check(&dir.path().join("in/film.mp4")).await.is_ok());
    }

    #[tokio::test]
    async fn test_exclude_list_rejects_listed_relative_path() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("exclude.list"), "subdir/film.mp4\n").unwrap();
        let filter = ExcludeListFilter::new(dir.path(), dir.path().join("in"));

        let listed = dir.path().join("in/subdir/film.mp4");
        assert!(filter.check(&listed).await.is_err());

        let other = dir.path().join("in/subdir/other.mp4");
        assert!(filter.check(&other).await.is_ok());
    }

    #[tokio::test]
    async fn test_exclude_list_rereads_per_check() {
        let dir = TempDir::new().unwrap();
        let filter = ExcludeListFilter::new(dir.path(), dir.path().join("in"));
        let file = dir.path().join("in/film.mp4");

        assert!(filter.check(&file).await.is_ok());
        fs::write(dir.path().join("exclude.list"), "film.mp4\n").unwrap();
        assert!(filter.check(&file).await.is_err());
    }

    #[tokio::test]
    async fn test_extension_include_only() {
        let filter = ExtensionFilter::new(Some("mkv|mp4"), None).unwrap();
        assert!(filter.check(Path::new("a/film.mkv")).await.is_ok());
        assert!(filter.check(Path::new("a/film.mp4")).await.is_ok());
        assert!(filter.check(Path::new("a/film.srt")).await.is_err());
        assert!(filter.check(Path::new("a/noext")).await.is_err());
    }

    #[tokio::test]
    async fn test_extension_exclude_only() {
        let filter = ExtensionFilter::new(None, Some("part|tmp")).unwrap();
        assert!(filter.check(Path::new("film.mkv")).await.is_ok());
        assert!(filter.check(Path::new("film.part")).await.is_err());
    }

    #[tokio::test]
    async fn test_extension_both_is_permissive_union() {
        // include OR not-exclude: a file passes when include matches even
        // though exclude also matches, and when neither matches.
        let filter = ExtensionFilter::new(Some("mkv"), Some("mkv|part")).unwrap();
        assert!(filter.check(Path::new("film.mkv")).await.is_ok());
        assert!(filter.check(Path::new("film.avi")).await.is_ok());
        assert!(filter.check(Path::new("film.part")).await.is_err());
    }

    #[tokio::test]
    async fn test_chain_short_circuits() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("exclude.list"), "film.mkv\n").unwrap();
        let chain = FilterChain::new(vec![
            Box::new(ExcludeListFilter::new(dir.path(), dir.path().join("in"))),
            Box::new(ExtensionFilter::new(Some("mkv"), None).unwrap()),
        ]);

        // Rejected by the exclude list before the extension filter runs.
        let err = chain.check(&dir.path().join("in/film.mkv")).await.unwrap_err();
        assert!(err.contains("exclude.list"));

        assert!(chain.check(&dir.path().join("in/other.mkv")).await.is_ok());
        assert!(chain.check(&dir.path().join("in/other.txt")).await.is_err());
    }

    #[tokio::test]
    async fn test_pass_all_chain() {
        assert!(FilterChain::pass_all()
            .check(Path::new("anything.xyz"))
            .await
            .is_ok());
    }
}
