//! Profile structures and loading logic.
//!
//! Profiles are loaded once at startup from a YAML or JSON document and are
//! immutable afterwards. Snippet-valued fields (`params`, `when`, `output`)
//! are kept as raw strings here; the engine resolves them per file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for profile loading and validation.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// IO error reading the profile file.
    #[error("Failed to read profile file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("Failed to parse profile: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("Failed to parse profile: {0}")]
    Json(#[from] serde_json::Error),

    /// The file extension is not a supported profile format.
    #[error("Unsupported profile format: {0}")]
    UnsupportedFormat(String),

    /// Structural validation failure. Fatal at startup.
    #[error("InvalidProfile: {0}")]
    InvalidProfile(String),
}

/// A snippet-valued field that accepts either a single string or a sequence.
///
/// A sequence is resolved as if its elements were joined with a single
/// space; empty elements are discarded by the predicate compiler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SnippetSeq {
    One(String),
    Many(Vec<String>),
}

impl SnippetSeq {
    /// View the field as a slice of snippet strings.
    pub fn as_slice(&self) -> &[String] {
        match self {
            SnippetSeq::One(s) => std::slice::from_ref(s),
            SnippetSeq::Many(v) => v.as_slice(),
        }
    }

    /// True when no snippet strings are present at all.
    pub fn is_empty(&self) -> bool {
        match self {
            SnippetSeq::One(s) => s.is_empty(),
            SnippetSeq::Many(v) => v.iter().all(|s| s.is_empty()),
        }
    }
}

impl Default for SnippetSeq {
    fn default() -> Self {
        SnippetSeq::Many(Vec::new())
    }
}

/// Raw `on` field: a single selector word or a list of codec types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StreamSelectorSpec {
    One(String),
    Many(Vec<String>),
}

/// Interpreted stream selector.
///
/// `None` maps the whole input, `Chapters` expands one output per chapter,
/// `All` matches every stream, `Types` matches streams whose `codec_type`
/// appears in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSelector {
    None,
    Chapters,
    All,
    Types(Vec<String>),
}

impl StreamSelector {
    /// Interpret a raw `on` value; an absent field selects the whole input.
    pub fn from_spec(spec: Option<&StreamSelectorSpec>) -> Self {
        match spec {
            None => StreamSelector::None,
            Some(StreamSelectorSpec::One(word)) => match word.as_str() {
                "none" | "" => StreamSelector::None,
                "chapters" => StreamSelector::Chapters,
                "all" => StreamSelector::All,
                other => StreamSelector::Types(vec![other.to_string()]),
            },
            Some(StreamSelectorSpec::Many(types)) => StreamSelector::Types(types.clone()),
        }
    }

    /// True when a stream of the given codec type is selected.
    pub fn matches_codec_type(&self, codec_type: &str) -> bool {
        match self {
            StreamSelector::None | StreamSelector::Chapters => false,
            StreamSelector::All => true,
            StreamSelector::Types(types) => types.iter().any(|t| t == codec_type),
        }
    }
}

/// Input side of a profile: where files come from and how they are accepted.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    /// Directory to watch. The CLI value overrides this when present.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Regex over the (dot-stripped) extension; matching files are accepted.
    #[serde(default)]
    pub include: Option<String>,
    /// Regex over the extension; non-matching files are accepted.
    #[serde(default)]
    pub exclude: Option<String>,
    /// Snippets resolved once per input and passed as input options.
    #[serde(default)]
    pub params: SnippetSeq,
    /// Unlink the input file after a successful transcode.
    #[serde(default)]
    pub delete_after_process: bool,
}

fn default_extension() -> String {
    "mkv".to_string()
}

/// Output side of a profile: destination directory and the mapping list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    /// Destination directory. The CLI value overrides this when present.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Extension applied when a mapping has no `format` override.
    #[serde(default = "default_extension")]
    pub default_extension: String,
    /// Write the transcoder log next to the outputs on success.
    #[serde(default)]
    pub write_log: bool,
    /// Ordered mapping rules, each producing zero or more outputs.
    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            default_extension: default_extension(),
            write_log: false,
            mappings: Vec::new(),
        }
    }
}

/// A single profile rule producing zero or more output files from one input.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    #[serde(default)]
    pub id: String,
    /// Skipped mappings are pruned before any work.
    #[serde(default)]
    pub skip: bool,
    /// Stream selector; absent means the whole input.
    #[serde(default)]
    pub on: Option<StreamSelectorSpec>,
    /// Predicate snippet(s); absent means always.
    #[serde(default)]
    pub when: Option<SnippetSeq>,
    /// Output-level parameter snippets.
    #[serde(default)]
    pub params: SnippetSeq,
    /// Snippet resolving to the output filename stem.
    #[serde(default)]
    pub output: String,
    /// Extension override; absent falls back per builder strategy.
    #[serde(default)]
    pub format: Option<String>,
    /// Codec-type ordering for output streams; unlisted types go last.
    #[serde(default)]
    pub order: Option<Vec<String>>,
    /// Sub-rules contributing parameters to the output or to streams.
    #[serde(default)]
    pub options: Vec<MappingOption>,
}

/// A sub-rule inside a mapping.
///
/// Options without `on` contribute to the output's global parameters;
/// options with `on` contribute to (or exclude, or duplicate) matching
/// streams.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MappingOption {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub on: Option<StreamSelectorSpec>,
    #[serde(default)]
    pub when: Option<SnippetSeq>,
    #[serde(default)]
    pub params: SnippetSeq,
    /// Append an extra output stream carrying only this option's params.
    #[serde(default)]
    pub duplicate: bool,
    /// Omit matching streams from the output entirely.
    #[serde(default)]
    pub exclude: bool,
}

impl MappingOption {
    /// Interpreted stream selector for this option.
    pub fn selector(&self) -> StreamSelector {
        StreamSelector::from_spec(self.on.as_ref())
    }

    /// True when this option targets specific streams rather than the
    /// whole output.
    pub fn is_stream_option(&self) -> bool {
        !matches!(self.selector(), StreamSelector::None)
    }
}

impl Mapping {
    /// Interpreted stream selector for this mapping.
    pub fn selector(&self) -> StreamSelector {
        StreamSelector::from_spec(self.on.as_ref())
    }

    /// Retained (non-skipped) options.
    pub fn active_options(&self) -> impl Iterator<Item = &MappingOption> {
        self.options.iter().filter(|o| !o.skip)
    }
}

/// Main profile structure. Loaded once at startup; immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Profile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Profile {
    /// Load a profile from a YAML (`.yaml`/`.yml`) or JSON (`.json`) file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
            "json" => Ok(serde_json::from_str(&content)?),
            other => Err(ProfileError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Apply the command-line directory overrides.
    ///
    /// The CLI input/output directories always win over the values carried
    /// in the profile document.
    pub fn apply_cli_paths(&mut self, input_dir: Option<PathBuf>, output_dir: Option<PathBuf>) {
        if let Some(dir) = input_dir {
            self.input.directory = Some(dir);
        }
        if let Some(dir) = output_dir {
            self.output.directory = Some(dir);
        }
    }

    /// Mappings surviving the skip-pruning pass, in declaration order.
    pub fn active_mappings(&self) -> impl Iterator<Item = &Mapping> {
        self.output.mappings.iter().filter(|m| !m.skip)
    }
}
