//! Chapter mapping strategy: one output per chapter of the input.

use super::{post, single, MappingBuilder, MappingError};
use crate::context::SnippetContext;
use crate::media::{parse_rational, Chapter, OutputMedia};
use serde_json::json;
use tracing::warn;
use transmux_profile::Mapping;

/// Tolerance when comparing the last chapter's end against the container
/// duration; probe values are decimal strings.
const DURATION_EPSILON: f64 = 0.001;

pub(super) fn build(
    builder: &MappingBuilder<'_>,
    mapping: &Mapping,
    ctx: &SnippetContext,
    outputs: &mut Vec<OutputMedia>,
) -> Result<(), MappingError> {
    if builder.input.chapters.is_empty() {
        warn!(
            mapping = %mapping.id,
            input = %builder.input.path.relative().display(),
            "chapter mapping on an input without chapters; skipping"
        );
        return Ok(());
    }

    let chapters = normalize_chapters(&builder.input.chapters, builder.input.duration());

    for chapter in &chapters {
        let chapter_ctx = ctx.with_chapter(chapter);
        let first_new = outputs.len();
        single::build(builder, mapping, &chapter_ctx, outputs)?;

        // Chapter-dependent snippets inside the new outputs' params must
        // see the chapter binding; resolve them now, before the context
        // narrows to the next chapter.
        for output in &mut outputs[first_new..] {
            output.chapter = Some(chapter.clone());
        }
        post::resolve_outputs(builder.resolver, &chapter_ctx, &mut outputs[first_new..])
            .map_err(MappingError::Snippet)?;
    }

    Ok(())
}

/// Re-number chapters 1-based and append a synthetic tail chapter when the
/// last chapter ends before the container does.
fn normalize_chapters(chapters: &[Chapter], duration: Option<f64>) -> Vec<Chapter> {
    let mut normalized: Vec<Chapter> = chapters.to_vec();

    if let (Some(last), Some(duration)) = (normalized.last(), duration) {
        let covered = last
            .end_time()
            .map(|end| (end - duration).abs() <= DURATION_EPSILON)
            .unwrap_or(false);
        if !covered {
            let time_base = last.time_base().unwrap_or("1/1000").to_string();
            // end is expressed in the chapter time base.
            let end = parse_rational(&time_base)
                .filter(|scale| *scale != 0.0)
                .map(|scale| duration / scale);
            let raw = json!({
                "time_base": time_base,
                "start": last.end(),
                "start_time": last.end_time(),
                "end": end,
                "end_time": duration,
            });
            normalized.push(Chapter::new(0, raw));
        }
    }

    for (i, chapter) in normalized.iter_mut().enumerate() {
        chapter.number = i as u32 + 1;
    }
    normalized
}
