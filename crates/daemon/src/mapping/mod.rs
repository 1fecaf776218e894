//! Mapping builder: expands a profile's mapping rules into a plan of
//! output media for one input.
//!
//! Each mapping dispatches to one of three strategies by its `on` field:
//! the whole input (single), one output per chapter (chapters), or one
//! output per matching stream (many). The builder produces outputs whose
//! params still contain snippets; the post resolver substitutes them once
//! the full plan is known.

mod chapters;
mod many;
mod post;
mod single;

pub use post::resolve_outputs;

use regex::Regex;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::SnippetContext;
use crate::media::{InputMedia, OutputMedia};
use crate::snippet::{SnippetError, SnippetResolver};
use transmux_profile::{Profile, StreamSelector};

/// Error type for plan construction.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The profile cannot produce a plan; fatal for the profile.
    #[error("InvalidProfile: {0}")]
    InvalidProfile(String),

    /// A snippet failed to resolve for this input; fails the job only.
    #[error(transparent)]
    Snippet(#[from] SnippetError),
}

/// Builds the ordered output list for one input under one profile.
pub struct MappingBuilder<'a> {
    resolver: &'a SnippetResolver,
    profile: &'a Profile,
    input: &'a Arc<InputMedia>,
}

impl<'a> MappingBuilder<'a> {
    pub fn new(
        resolver: &'a SnippetResolver,
        profile: &'a Profile,
        input: &'a Arc<InputMedia>,
    ) -> Self {
        Self { resolver, profile, input }
    }

    /// Expand every active mapping, in declaration order.
    ///
    /// Returned outputs have contiguous ids starting at 0 and at least one
    /// stream each; their params are still unresolved snippets.
    pub fn build(&self) -> Result<Vec<OutputMedia>, MappingError> {
        let active: Vec<_> = self.profile.active_mappings().collect();
        if active.is_empty() {
            return Err(MappingError::InvalidProfile(
                "no mappings remain after pruning skipped entries".to_string(),
            ));
        }
        for mapping in &active {
            if mapping.output.is_empty() {
                return Err(MappingError::InvalidProfile(format!(
                    "mapping '{}' has an empty output",
                    mapping.id
                )));
            }
        }

        let ctx = SnippetContext::new(self.profile, self.input);
        let mut outputs = Vec::new();

        for mapping in active {
            match mapping.selector() {
                StreamSelector::None => {
                    single::build(self, mapping, &ctx, &mut outputs)?;
                }
                StreamSelector::Chapters => {
                    chapters::build(self, mapping, &ctx, &mut outputs)?;
                }
                StreamSelector::All | StreamSelector::Types(_) => {
                    many::build(self, mapping, &ctx, &mut outputs)?;
                }
            }
        }

        Ok(outputs)
    }
}

/// Codec-name patterns mapped to output extensions, first match wins.
fn codec_extension_table() -> &'static [(Regex, &'static str)] {
    static TABLE: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    TABLE
        .get_or_init(|| {
            [("subrip", "srt")]
                .into_iter()
                .map(|(pattern, ext)| {
                    (
                        Regex::new(pattern).expect("codec pattern is statically well-formed"),
                        ext,
                    )
                })
                .collect()
        })
        .as_slice()
}

/// Default output extension for a codec when a mapping has no `format`.
///
/// Falls back to the codec name itself when no pattern matches.
pub(crate) fn codec_extension(codec: &str) -> String {
    let matches: Vec<&str> = codec_extension_table()
        .iter()
        .filter(|(pattern, _)| pattern.is_match(codec))
        .map(|(_, ext)| *ext)
        .collect();

    match matches.as_slice() {
        [] => {
            debug!(codec, "no extension mapping for codec; using codec name");
            codec.to_string()
        }
        [only] => only.to_string(),
        all => {
            warn!(codec, matches = ?all, "multiple extension mappings match codec");
            all[0].to_string()
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scenario_default_copy_of_two_stream_file() {
        let profile = profile_from_yaml(
            r#"
id: p
input: {include: "mp4"}
output:
  mappings:
    - {id: m1, output: "{fn}", format: mkv}
"#,
        );
        let input = input_media(
            vec![
                json!({"index": 0, "codec_type": "video"}),
                json!({"index": 1, "codec_type": "audio"}),
            ],
            json!({}),
            vec![],
        );

        let outputs = build_plan(&profile, &input);
        assert_eq!(outputs.len(), 1);

        let output = &outputs[0];
        assert_eq!(output.id, 0);
        assert_eq!(output.path.file_name(), "film.mkv");
        assert_eq!(output.streams.len(), 2);
        assert_eq!(output.streams[0].params, vec!["-map 0:0", "-c:0 copy"]);
        assert_eq!(output.streams[1].params, vec!["-map 0:1", "-c:1 copy"]);
    }

    #[test]
    fn test_scenario_conditional_mapping_skipped() {
        let profile = profile_from_yaml(
            r#"
id: p
input: {include: "mp4"}
output:
  mappings:
    - {id: m1, output: "{fn}", when: "input.format.duration > 3600"}
"#,
        );
        let input = input_media(
            vec![json!({"index": 0, "codec_type": "video"})],
            json!({"duration": "1200"}),
            vec![],
        );

        let outputs = build_plan(&profile, &input);
        assert!(outputs.is_empty());
    }

    #[test]
    fn test_no_mappings_is_invalid_profile() {
        let profile = profile_from_yaml(
            r#"
id: p
input: {include: "mp4"}
output:
  mappings:
    - {id: m1, skip: true, output: "{fn}"}
"#,
        );
        let input = input_media(vec![json!({"index": 0, "codec_type": "video"})], json!({}), vec![]);
        let resolver = SnippetResolver::new();
        let err = MappingBuilder::new(&resolver, &profile, &input)
            .build()
            .unwrap_err();
        assert!(matches!(err, MappingError::InvalidProfile(_)));
    }

    #[test]
    fn test_empty_output_is_invalid_profile() {
        let profile = profile_from_yaml(
            r#"
id: p
input: {include: "mp4"}
output:
  mappings:
    - {id: m1}
"#,
        );
        let input = input_media(vec![json!({"index": 0, "codec_type": "video"})], json!({}), vec![]);
        let resolver = SnippetResolver::new();
        let err = MappingBuilder::new(&resolver, &profile, &input)
            .build()
            .unwrap_err();
        match err {
            MappingError::InvalidProfile(message) => assert!(message.contains("m1")),
            other => panic!("Expected InvalidProfile, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_ids_are_contiguous_across_mappings() {
        let profile = profile_from_yaml(
            r#"
id: p
input: {include: "mp4"}
output:
  mappings:
    - {id: full, output: "{fn}"}
    - {id: audio, on: audio, output: "{fn}.{lng}", params: "-c:a copy"}
"#,
        );
        let input = input_media(
            vec![
                json!({"index": 0, "codec_type": "video"}),
                json!({"index": 1, "codec_type": "audio", "codec_name": "aac", "tags": {"language": "eng"}}),
                json!({"index": 2, "codec_type": "audio", "codec_name": "aac", "tags": {"language": "fra"}}),
            ],
            json!({}),
            vec![],
        );

        let outputs = build_plan(&profile, &input);
        let ids: Vec<u32> = outputs.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        for output in &outputs {
            assert!(!output.streams.is_empty());
            let indices: Vec<u32> = output.streams.iter().map(|s| s.index).collect();
            let expected: Vec<u32> = (0..output.streams.len() as u32).collect();
            assert_eq!(indices, expected);
        }
    }

    #[test]
    fn test_codec_extension_lookup() {
        assert_eq!(codec_extension("subrip"), "srt");
        assert_eq!(codec_extension("aac"), "aac");
        assert_eq!(codec_extension("hdmv_pgs_subtitle"), "hdmv_pgs_subtitle");
    }
}
