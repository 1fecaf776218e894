//! Snippet evaluation context.
//!
//! A context is the set of bindings visible to a snippet: `profile` and
//! `input` are always populated, the remaining slots narrow in as mapping
//! proceeds (per output, per stream, per chapter). Slots are held as JSON
//! snapshots so the expression language can navigate them dynamically;
//! absent slots and absent members both evaluate to undefined.

use serde_json::Value as Json;

use crate::media::{Chapter, InputMedia, OutputMedia, OutputStream};
use crate::snippet::expr::{Scope, Value};
use transmux_profile::Profile;

/// Bindings visible to a snippet during evaluation.
#[derive(Debug, Clone, Default)]
pub struct SnippetContext {
    profile: Option<Json>,
    input: Option<Json>,
    output: Option<Json>,
    stream: Option<Json>,
    output_stream: Option<Json>,
    chapter: Option<Json>,
}

impl SnippetContext {
    /// Context with no slots populated; every identifier is undefined.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Root context for mapping one input under one profile.
    pub fn new(profile: &Profile, input: &InputMedia) -> Self {
        Self {
            profile: serde_json::to_value(profile).ok(),
            input: Some(input.to_value()),
            ..Self::default()
        }
    }

    /// Narrow with an output binding.
    pub fn with_output(&self, output: &OutputMedia) -> Self {
        let mut ctx = self.clone();
        ctx.output = Some(output.to_value());
        ctx
    }

    /// Narrow with an input stream binding.
    pub fn with_stream(&self, stream: Json) -> Self {
        let mut ctx = self.clone();
        ctx.stream = Some(stream);
        ctx
    }

    /// Narrow with an output stream binding.
    pub fn with_output_stream(&self, output_stream: &OutputStream) -> Self {
        let mut ctx = self.clone();
        ctx.output_stream = Some(output_stream.to_value());
        ctx
    }

    /// Narrow with a chapter binding.
    pub fn with_chapter(&self, chapter: &Chapter) -> Self {
        let mut ctx = self.clone();
        ctx.chapter = Some(chapter.to_value());
        ctx
    }

    /// Set a slot by name from a raw JSON value. Test and tooling hook;
    /// unknown slot names are ignored.
    pub fn with_slot(mut self, name: &str, value: Json) -> Self {
        match name {
            "profile" => self.profile = Some(value),
            "input" => self.input = Some(value),
            "output" => self.output = Some(value),
            "stream" => self.stream = Some(value),
            "outputStream" => self.output_stream = Some(value),
            "chapter" => self.chapter = Some(value),
            _ => {}
        }
        self
    }

    fn slot(&self, name: &str) -> Option<&Json> {
        match name {
            "profile" => self.profile.as_ref(),
            "input" => self.input.as_ref(),
            "output" => self.output.as_ref(),
            "stream" => self.stream.as_ref(),
            "outputStream" => self.output_stream.as_ref(),
            "chapter" => self.chapter.as_ref(),
            _ => None,
        }
    }
}

impl Scope for SnippetContext {
    fn lookup(&self, name: &str) -> Value {
        self.slot(name)
            .cloned()
            .map(Value::Json)
            .unwrap_or(Value::Undefined)
    }
}
