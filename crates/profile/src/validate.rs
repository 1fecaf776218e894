//! Structural profile validation.
//!
//! Malformed profiles are rejected here, before any filesystem work starts.

use crate::profile::{Profile, ProfileError, StreamSelector};
use regex::Regex;

const CODEC_TYPES: &[&str] = &["video", "audio", "subtitle", "attachment", "data"];

/// Validate a loaded profile.
///
/// Checks performed:
/// - at least one of `input.include` / `input.exclude` is set, and both
///   compile as regexes when present;
/// - at least one mapping survives skip-pruning;
/// - every retained mapping has a non-empty `output`;
/// - `order` lists and typed selectors only name known codec types.
pub fn validate_profile(profile: &Profile) -> Result<(), ProfileError> {
    if profile.input.include.is_none() && profile.input.exclude.is_none() {
        return Err(ProfileError::InvalidProfile(
            "input requires at least one of 'include' or 'exclude'".to_string(),
        ));
    }

    for (field, pattern) in [
        ("input.include", profile.input.include.as_deref()),
        ("input.exclude", profile.input.exclude.as_deref()),
    ] {
        if let Some(pattern) = pattern {
            Regex::new(pattern).map_err(|e| {
                ProfileError::InvalidProfile(format!("{} is not a valid regex: {}", field, e))
            })?;
        }
    }

    let mut retained = 0usize;
    for mapping in profile.active_mappings() {
        retained += 1;

        if mapping.output.is_empty() {
            return Err(ProfileError::InvalidProfile(format!(
                "mapping '{}' has an empty output",
                mapping.id
            )));
        }

        if let StreamSelector::Types(types) = mapping.selector() {
            check_codec_types(&mapping.id, &types)?;
        }
        if let Some(order) = &mapping.order {
            check_codec_types(&mapping.id, order)?;
        }
        for option in mapping.active_options() {
            if let StreamSelector::Types(types) = option.selector() {
                check_codec_types(&mapping.id, &types)?;
            }
        }
    }

    if retained == 0 {
        return Err(ProfileError::InvalidProfile(
            "output.mappings is empty after pruning skipped entries".to_string(),
        ));
    }

    Ok(())
}

fn check_codec_types(mapping_id: &str, types: &[String]) -> Result<(), ProfileError> {
    for t in types {
        if !CODEC_TYPES.contains(&t.as_str()) {
            return Err(ProfileError::InvalidProfile(format!(
                "mapping '{}' names unknown codec type '{}'",
                mapping_id, t
            )));
        }
    }
    Ok(())
}
