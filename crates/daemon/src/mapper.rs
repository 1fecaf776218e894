//! Profile mapper: probe a file and expand the profile into a plan.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::context::SnippetContext;
use crate::mapping::{resolve_outputs, MappingBuilder, MappingError};
use crate::media::{InputMedia, MediaPath, OutputMedia};
use crate::probe::{probe, ProbeData, ProbeError};
use crate::snippet::{SnippetError, SnippetResolver};
use transmux_profile::Profile;

/// Error type for plan construction on one file.
#[derive(Debug, Error)]
pub enum MapperError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Snippet(#[from] SnippetError),

    /// The profile produced no outputs for this input.
    #[error("No output: skip")]
    NoOutput,
}

/// A fully expanded, parameter-resolved set of outputs ready for a
/// worker.
#[derive(Debug)]
pub struct Plan {
    pub input: Arc<InputMedia>,
    pub outputs: Vec<OutputMedia>,
}

/// Expands a profile against freshly probed inputs.
pub struct ProfileMapper {
    profile: Arc<Profile>,
    resolver: SnippetResolver,
    input_root: PathBuf,
}

impl ProfileMapper {
    pub fn new(profile: Arc<Profile>, input_root: PathBuf) -> Self {
        Self {
            profile,
            resolver: SnippetResolver::new(),
            input_root,
        }
    }

    /// Probe a file and build its plan.
    ///
    /// The file is probed here even when a filter probed it earlier: it
    /// may have spent a long time in the queue, and the plan must be built
    /// from fresh metadata.
    pub async fn plan(&self, file: &Path) -> Result<Plan, MapperError> {
        let probe_data = probe(file, &["-show_chapters"]).await?;
        self.plan_from_probe(file, probe_data)
    }

    /// Build a plan from already-probed metadata.
    pub fn plan_from_probe(&self, file: &Path, probe_data: ProbeData) -> Result<Plan, MapperError> {
        let path = MediaPath::from_base(&self.input_root, file);
        let params = self.profile.input.params.as_slice().to_vec();
        let mut input = InputMedia::from_probe(0, path, params, probe_data);

        // Input params are resolved exactly once, before mapping.
        if !input.params.is_empty() {
            let ctx = SnippetContext::new(&self.profile, &input);
            input.params = input
                .params
                .iter()
                .map(|p| self.resolver.resolve_to_string(p, &ctx))
                .collect::<Result<_, _>>()?;
        }

        let input = Arc::new(input);
        let ctx = SnippetContext::new(&self.profile, &input);
        let mut outputs = MappingBuilder::new(&self.resolver, &self.profile, &input).build()?;
        resolve_outputs(&self.resolver, &ctx, &mut outputs)?;

        if outputs.is_empty() {
            return Err(MapperError::NoOutput);
        }
        debug!(
            input = %input.path.relative().display(),
            outputs = outputs.len(),
            "plan built"
        );
        Ok(Plan { input, outputs })
    }
}
