//! Whole-input mapping strategy: one output carrying every selected
//! stream of the input.

use super::{MappingBuilder, MappingError};
use crate::context::SnippetContext;
use crate::media::{InputStream, MediaPath, OutputMedia, OutputStream};
use crate::predicate::Predicate;
use std::sync::Arc;
use transmux_profile::Mapping;

pub(super) fn build(
    builder: &MappingBuilder<'_>,
    mapping: &Mapping,
    ctx: &SnippetContext,
    outputs: &mut Vec<OutputMedia>,
) -> Result<(), MappingError> {
    if !Predicate::compile(mapping.when.as_ref()).eval(builder.resolver, ctx)? {
        return Ok(());
    }

    // Global params: the mapping's own, then each whole-output option
    // whose predicate holds.
    let mut global_params: Vec<String> = mapping.params.as_slice().to_vec();
    for option in mapping.active_options().filter(|o| !o.is_stream_option()) {
        if Predicate::compile(option.when.as_ref()).eval(builder.resolver, ctx)? {
            global_params.extend(option.params.as_slice().iter().cloned());
        }
    }

    let stream_options: Vec<_> = mapping
        .active_options()
        .filter(|o| o.is_stream_option())
        .collect();

    let mut streams: Vec<OutputStream> = Vec::new();
    for stream in ordered_streams(&builder.input.streams, mapping.order.as_deref()) {
        let stream_ctx = ctx.with_stream(stream.to_value());

        let mut matched = Vec::new();
        for option in &stream_options {
            if option.selector().matches_codec_type(stream.codec_type())
                && Predicate::compile(option.when.as_ref()).eval(builder.resolver, &stream_ctx)?
            {
                matched.push(*option);
            }
        }

        if matched.iter().any(|o| o.exclude) {
            continue;
        }

        let mut accumulated: Vec<String> = Vec::new();
        for option in &matched {
            if option.duplicate {
                // A duplicated stream carries the option's params only.
                streams.push(OutputStream {
                    index: streams.len() as u32,
                    source: Arc::clone(stream),
                    params: option.params.as_slice().to_vec(),
                });
            } else {
                accumulated.extend(option.params.as_slice().iter().cloned());
            }
        }

        let mut params = vec!["-map {iid}".to_string()];
        if matched.is_empty() {
            // Copy by default when nothing else claimed the stream.
            params.push("-c:{oid} copy".to_string());
        } else {
            params.extend(accumulated);
        }
        streams.push(OutputStream {
            index: streams.len() as u32,
            source: Arc::clone(stream),
            params,
        });
    }

    if streams.is_empty() {
        return Ok(());
    }

    let filename = builder.resolver.resolve_to_string(&mapping.output, ctx)?;
    let extension = mapping
        .format
        .clone()
        .unwrap_or_else(|| builder.profile.output.default_extension.clone());

    outputs.push(OutputMedia {
        id: outputs.len() as u32,
        source: Arc::clone(builder.input),
        path: MediaPath::new(builder.input.path.parent.clone(), filename, extension),
        params: global_params,
        streams,
        chapter: None,
    });
    Ok(())
}

/// Order input streams by a codec-type list; unlisted types keep their
/// relative order after every listed type.
fn ordered_streams<'s>(
    streams: &'s [Arc<InputStream>],
    order: Option<&[String]>,
) -> Vec<&'s Arc<InputStream>> {
    let mut refs: Vec<&Arc<InputStream>> = streams.iter().collect();
    if let Some(order) = order {
        refs.sort_by_key(|s| {
            order
                .iter()
                .position(|t| t == s.codec_type())
                .unwrap_or(order.len())
        });
    }
    refs
}
