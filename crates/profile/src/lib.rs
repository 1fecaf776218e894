//! Transcoding profile model for transmux.
//!
//! A profile is a declarative description of how input files map to output
//! files: which directory to watch, which extensions to accept, and an
//! ordered list of mappings that fan an input out into one or more outputs.

pub mod profile;
pub mod validate;

pub use profile::{
    InputConfig, Mapping, MappingOption, OutputConfig, Profile, ProfileError, SnippetSeq,
    StreamSelector, StreamSelectorSpec,
};
pub use validate::validate_profile;
