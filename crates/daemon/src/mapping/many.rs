//! Per-stream mapping strategy: one output per matching input stream.

use super::{codec_extension, MappingBuilder, MappingError};
use crate::context::SnippetContext;
use crate::media::{MediaPath, OutputMedia, OutputStream};
use crate::predicate::Predicate;
use std::sync::Arc;
use tracing::warn;
use transmux_profile::Mapping;

pub(super) fn build(
    builder: &MappingBuilder<'_>,
    mapping: &Mapping,
    ctx: &SnippetContext,
    outputs: &mut Vec<OutputMedia>,
) -> Result<(), MappingError> {
    if !mapping.options.is_empty() {
        warn!(
            mapping = %mapping.id,
            "options are ignored on per-stream mappings"
        );
    }

    let selector = mapping.selector();
    let when = Predicate::compile(mapping.when.as_ref());

    for stream in &builder.input.streams {
        if !selector.matches_codec_type(stream.codec_type()) {
            continue;
        }
        let stream_ctx = ctx.with_stream(stream.to_value());
        if !when.eval(builder.resolver, &stream_ctx)? {
            continue;
        }

        let filename = builder
            .resolver
            .resolve_to_string(&mapping.output, &stream_ctx)?;
        let extension = mapping
            .format
            .clone()
            .unwrap_or_else(|| codec_extension(stream.codec_name()));

        let mut params = vec!["-map {iid}".to_string()];
        params.extend(mapping.params.as_slice().iter().cloned());

        outputs.push(OutputMedia {
            id: outputs.len() as u32,
            source: Arc::clone(builder.input),
            path: MediaPath::new(builder.input.path.parent.clone(), filename, extension),
            params: Vec::new(),
            streams: vec![OutputStream {
                index: 0,
                source: Arc::clone(stream),
                params,
            }],
            chapter: None,
        });
    }

    Ok(())
}
