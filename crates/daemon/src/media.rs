//! Media model: paths, input/output media, streams and chapters.
//!
//! Inputs are built from probe metadata and keep the raw probe objects
//! around so profile snippets can navigate passthrough fields the probe
//! reports (dispositions, tags, frame rates). Outputs are built by the
//! mapping builder and consumed once by a worker.

use serde_json::{Map, Value as Json};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::probe::ProbeData;

/// A media file location split into parent/filename/extension, kept
/// relative to a base directory and resolved absolutely only at the
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPath {
    /// Directory part, relative to the base.
    pub parent: PathBuf,
    /// Filename stem, without extension.
    pub filename: String,
    /// Extension without the leading dot; may be empty.
    pub extension: String,
}

impl MediaPath {
    pub fn new(parent: impl Into<PathBuf>, filename: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            filename: filename.into(),
            extension: extension.into(),
        }
    }

    /// Split a file into a relative MediaPath against a base directory.
    ///
    /// A file outside the base keeps its own path unchanged.
    pub fn from_base(base: &Path, file: &Path) -> Self {
        let rel = file.strip_prefix(base).unwrap_or(file);
        let parent = rel.parent().map(Path::to_path_buf).unwrap_or_default();
        let filename = rel
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let extension = rel
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        Self { parent, filename, extension }
    }

    /// Derive `parent/filename.<suffix>.<extension>`.
    pub fn sibling(&self, suffix: &str, extension: &str) -> Self {
        Self {
            parent: self.parent.clone(),
            filename: format!("{}.{}", self.filename, suffix),
            extension: extension.to_string(),
        }
    }

    /// Filename with extension.
    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            self.filename.clone()
        } else {
            format!("{}.{}", self.filename, self.extension)
        }
    }

    /// Path relative to the base directory.
    pub fn relative(&self) -> PathBuf {
        self.parent.join(self.file_name())
    }

    /// Resolve against a base directory.
    pub fn absolute(&self, base: &Path) -> PathBuf {
        base.join(self.relative())
    }

    /// Context snapshot: `{parent, filename, extension}`.
    pub fn to_value(&self) -> Json {
        serde_json::json!({
            "parent": self.parent.to_string_lossy(),
            "filename": self.filename,
            "extension": self.extension,
        })
    }
}

/// Parse a rational string such as `"1/1000"` or `"24000/1001"`.
///
/// Returns `None` for malformed input or a zero denominator.
pub fn parse_rational(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => s.trim().parse().ok(),
    }
}

fn field_as_f64(map: &Map<String, Json>, key: &str) -> Option<f64> {
    match map.get(key)? {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One stream of an input file, as reported by the probe.
///
/// The full probe object is kept verbatim; typed accessors cover the
/// fields the engine itself needs, everything else stays reachable from
/// snippets.
#[derive(Debug, Clone, PartialEq)]
pub struct InputStream {
    raw: Map<String, Json>,
}

impl InputStream {
    pub fn new(raw: Json) -> Self {
        let raw = match raw {
            Json::Object(map) => map,
            _ => Map::new(),
        };
        Self { raw }
    }

    /// Stable stream index from the probe.
    pub fn index(&self) -> u32 {
        self.raw
            .get("index")
            .and_then(Json::as_u64)
            .unwrap_or(0) as u32
    }

    pub fn codec_type(&self) -> &str {
        self.raw
            .get("codec_type")
            .and_then(Json::as_str)
            .unwrap_or("")
    }

    pub fn codec_name(&self) -> &str {
        self.raw
            .get("codec_name")
            .and_then(Json::as_str)
            .unwrap_or("")
    }

    /// Average frame rate as a float, parsed from the probe's rational.
    pub fn avg_frame_rate(&self) -> Option<f64> {
        self.raw
            .get("avg_frame_rate")
            .and_then(Json::as_str)
            .and_then(parse_rational)
            .filter(|r| r.is_finite() && *r > 0.0)
    }

    /// Context snapshot: the raw probe object.
    pub fn to_value(&self) -> Json {
        Json::Object(self.raw.clone())
    }
}

/// A chapter of an input file.
///
/// `number` is injected by the builder (1-based); the rest is the probe's
/// chapter object.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub number: u32,
    raw: Map<String, Json>,
}

impl Chapter {
    pub fn new(number: u32, raw: Json) -> Self {
        let raw = match raw {
            Json::Object(map) => map,
            _ => Map::new(),
        };
        Self { number, raw }
    }

    pub fn time_base(&self) -> Option<&str> {
        self.raw.get("time_base").and_then(Json::as_str)
    }

    pub fn start_time(&self) -> Option<f64> {
        field_as_f64(&self.raw, "start_time")
    }

    pub fn end_time(&self) -> Option<f64> {
        field_as_f64(&self.raw, "end_time")
    }

    pub fn end(&self) -> Option<f64> {
        field_as_f64(&self.raw, "end")
    }

    /// Context snapshot: the raw chapter object with `number` injected.
    pub fn to_value(&self) -> Json {
        let mut map = self.raw.clone();
        map.insert("number".to_string(), Json::from(self.number));
        Json::Object(map)
    }
}

/// An input file with its probe metadata, ready for mapping.
#[derive(Debug, Clone)]
pub struct InputMedia {
    /// 0 for the primary input.
    pub id: u32,
    pub path: MediaPath,
    /// Input options; snippet strings until the input parameter resolver
    /// rewrites them once, right after construction.
    pub params: Vec<String>,
    pub streams: Vec<Arc<InputStream>>,
    /// Container metadata, including the optional `duration`.
    pub format: Map<String, Json>,
    pub chapters: Vec<Chapter>,
}

impl InputMedia {
    /// Build an input from probe data. Chapters are numbered 1-based in
    /// probe order; the chapter builder renumbers after normalization.
    pub fn from_probe(id: u32, path: MediaPath, params: Vec<String>, probe: ProbeData) -> Self {
        let streams = probe
            .streams
            .into_iter()
            .map(|raw| Arc::new(InputStream::new(raw)))
            .collect();
        let chapters = probe
            .chapters
            .into_iter()
            .enumerate()
            .map(|(i, raw)| Chapter::new(i as u32 + 1, raw))
            .collect();
        Self {
            id,
            path,
            params,
            streams,
            format: probe.format,
            chapters,
        }
    }

    /// Container duration in seconds, when the probe reported one.
    pub fn duration(&self) -> Option<f64> {
        field_as_f64(&self.format, "duration").filter(|d| d.is_finite())
    }

    pub fn first_video_stream(&self) -> Option<&Arc<InputStream>> {
        self.streams.iter().find(|s| s.codec_type() == "video")
    }

    /// Context snapshot: `{id, path, params, format, streams, chapters}`.
    pub fn to_value(&self) -> Json {
        serde_json::json!({
            "id": self.id,
            "path": self.path.to_value(),
            "params": self.params,
            "format": Json::Object(self.format.clone()),
            "streams": self.streams.iter().map(|s| s.to_value()).collect::<Vec<_>>(),
            "chapters": self.chapters.iter().map(|c| c.to_value()).collect::<Vec<_>>(),
        })
    }
}

/// One stream of a planned output file.
#[derive(Debug, Clone)]
pub struct OutputStream {
    /// Sequential per-output index, starting at 0.
    pub index: u32,
    /// Back-reference to the input stream this output stream maps.
    pub source: Arc<InputStream>,
    pub params: Vec<String>,
}

impl OutputStream {
    /// Context snapshot for the `outputStream` slot.
    pub fn to_value(&self) -> Json {
        serde_json::json!({ "index": self.index })
    }
}

/// A planned output file: where it goes and which streams it carries.
#[derive(Debug, Clone)]
pub struct OutputMedia {
    /// Sequential plan-wide id, starting at 0.
    pub id: u32,
    pub source: Arc<InputMedia>,
    pub path: MediaPath,
    /// Output-level command-line tokens (snippets until post-resolution).
    pub params: Vec<String>,
    pub streams: Vec<OutputStream>,
    /// Set when this output was expanded from a chapter.
    pub chapter: Option<Chapter>,
}

impl OutputMedia {
    /// Context snapshot for the `output` slot.
    pub fn to_value(&self) -> Json {
        serde_json::json!({
            "id": self.id,
            "path": self.path.to_value(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_media_path_from_base() {
        let path = MediaPath::from_base(Path::new("/media/in"), Path::new("/media/in/sub/film.mp4"));
        assert_eq!(path.parent, PathBuf::from("sub"));
        assert_eq!(path.filename, "film");
        assert_eq!(path.extension, "mp4");
        assert_eq!(path.relative(), PathBuf::from("sub/film.mp4"));
        assert_eq!(
            path.absolute(Path::new("/media/out")),
            PathBuf::from("/media/out/sub/film.mp4")
        );
    }

    #[test]
    fn test_media_path_at_root() {
        let path = MediaPath::from_base(Path::new("/media/in"), Path::new("/media/in/film.mp4"));
        assert_eq!(path.parent, PathBuf::new());
        assert_eq!(path.relative(), PathBuf::from("film.mp4"));
    }

    #[test]
    fn test_media_path_sibling() {
        let path = MediaPath::new("sub", "film", "mp4");
        let sibling = path.sibling("eng", "srt");
        assert_eq!(sibling.file_name(), "film.eng.srt");
        assert_eq!(sibling.parent, PathBuf::from("sub"));
    }

    #[test]
    fn test_media_path_without_extension() {
        let path = MediaPath::new("", "film", "");
        assert_eq!(path.file_name(), "film");
    }

    #[test]
    fn test_parse_rational() {
        assert_eq!(parse_rational("1/1000"), Some(0.001));
        assert_eq!(parse_rational("24000/1001"), Some(24000.0 / 1001.0));
        assert_eq!(parse_rational("25"), Some(25.0));
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("garbage"), None);
    }

    #[test]
    fn test_input_stream_accessors() {
        let stream = InputStream::new(json!({
            "index": 2,
            "codec_type": "audio",
            "codec_name": "aac",
            "avg_frame_rate": "0/0",
            "tags": {"language": "eng"}
        }));
        assert_eq!(stream.index(), 2);
        assert_eq!(stream.codec_type(), "audio");
        assert_eq!(stream.codec_name(), "aac");
        assert_eq!(stream.avg_frame_rate(), None);
    }

    #[test]
    fn test_avg_frame_rate_parsing() {
        let stream = InputStream::new(json!({
            "index": 0,
            "codec_type": "video",
            "avg_frame_rate": "24000/1001"
        }));
        let rate = stream.avg_frame_rate().unwrap();
        assert!((rate - 23.976).abs() < 0.001);
    }

    #[test]
    fn test_chapter_accessors() {
        let chapter = Chapter::new(
            1,
            json!({
                "time_base": "1/1000",
                "start": 0,
                "start_time": "0.000000",
                "end": 300000,
                "end_time": "300.000000"
            }),
        );
        assert_eq!(chapter.time_base(), Some("1/1000"));
        assert_eq!(chapter.start_time(), Some(0.0));
        assert_eq!(chapter.end_time(), Some(300.0));
        assert_eq!(chapter.end(), Some(300000.0));
        assert_eq!(chapter.to_value()["number"], json!(1));
    }

    #[test]
    fn test_input_media_duration_accepts_probe_strings() {
        let probe = ProbeData {
            streams: vec![],
            format: match json!({"duration": "7200.5"}) {
                Json::Object(map) => map,
                _ => unreachable!(),
            },
            chapters: vec![],
        };
        let input = InputMedia::from_probe(0, MediaPath::new("", "film", "mp4"), vec![], probe);
        assert_eq!(input.duration(), Some(7200.5));
    }

    #[test]
    fn test_input_media_snapshot_shape() {
        let probe = ProbeData {
            streams: vec![
                json!({"index": 0, "codec_type": "video"}),
                json!({"index": 1, "codec_type": "audio"}),
            ],
            format: Map::new(),
            chapters: vec![json!({"start_time": "0.0", "end_time": "10.0"})],
        };
        let input = InputMedia::from_probe(0, MediaPath::new("", "film", "mp4"), vec![], probe);
        let value = input.to_value();
        assert_eq!(value["id"], json!(0));
        assert_eq!(value["path"]["filename"], json!("film"));
        assert_eq!(value["streams"].as_array().unwrap().len(), 2);
        assert_eq!(value["chapters"][0]["number"], json!(1));
    }
}
