//! Post resolver: the second pass that substitutes snippets inside
//! already-built output parameter lists.
//!
//! Each output's params resolve against `{profile, input, output}` (plus
//! the chapter the output was expanded from, when any); each output
//! stream's params additionally bind `stream` to the source input stream
//! and `outputStream` to the stream itself. After this pass no parameter
//! may contain an unresolved brace token.

use crate::context::SnippetContext;
use crate::media::OutputMedia;
use crate::snippet::{SnippetError, SnippetResolver};

/// Resolve every parameter of every output in place.
pub fn resolve_outputs(
    resolver: &SnippetResolver,
    base_ctx: &SnippetContext,
    outputs: &mut [OutputMedia],
) -> Result<(), SnippetError> {
    for output in outputs.iter_mut() {
        let output_ctx = {
            let ctx = base_ctx.with_output(output);
            match &output.chapter {
                Some(chapter) => ctx.with_chapter(chapter),
                None => ctx,
            }
        };

        for param in &mut output.params {
            *param = resolver.resolve_to_string(param, &output_ctx)?;
        }

        for stream in &mut output.streams {
            let stream_ctx = output_ctx
                .with_stream(stream.source.to_value())
                .with_output_stream(stream);
            for param in &mut stream.params {
                *param = resolver.resolve_to_string(param, &stream_ctx)?;
            }
        }
    }
    Ok(())
}
