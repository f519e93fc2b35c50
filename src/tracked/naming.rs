//! Prefix naming for skills materialized from tracked repos.
//!
//! A repo whose root is a skill becomes `_<repo>`; a skill at
//! `<nested>/<leaf>` inside it becomes `_<repo>__<nested>__<leaf>`. The
//! marker keeps remote provenance visible and cannot collide with locally
//! authored names that avoid a leading `_`.

use crate::error::{Result, SksError};
use crate::security::validate_path_component;

pub const PREFIX: char = '_';
pub const SEPARATOR: &str = "__";

/// A tracked skill name split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedName<'a> {
    pub repo_id: &'a str,
    pub nested: Vec<&'a str>,
}

/// Check that `part` can be joined with `__` and split back unambiguously.
fn validate_part(part: &str, what: &str) -> Result<()> {
    validate_path_component(part)?;
    if part.contains(SEPARATOR) || part.starts_with(PREFIX) || part.ends_with(PREFIX) {
        return Err(SksError::ValidationFailed(format!(
            "{what} {part:?} must not start or end with '{PREFIX}' or contain '{SEPARATOR}'"
        )));
    }
    Ok(())
}

pub fn validate_repo_id(repo_id: &str) -> Result<()> {
    validate_part(repo_id, "repo id")
}

/// Skill name for the directory at `nested` (relative path components)
/// inside repo `repo_id`. An empty `nested` is the repo root.
pub fn tracked_skill_name(repo_id: &str, nested: &[&str]) -> Result<String> {
    validate_repo_id(repo_id)?;
    let mut name = format!("{PREFIX}{repo_id}");
    for part in nested {
        validate_part(part, "nested path component")?;
        name.push_str(SEPARATOR);
        name.push_str(part);
    }
    validate_path_component(&name)?;
    Ok(name)
}

/// Split a name produced by [`tracked_skill_name`]. Returns `None` for names
/// without the marker or with empty parts.
#[must_use]
pub fn parse_tracked_name(name: &str) -> Option<TrackedName<'_>> {
    let rest = name.strip_prefix(PREFIX)?;
    let mut parts = rest.split(SEPARATOR);
    let repo_id = parts.next().filter(|id| !id.is_empty())?;
    let nested: Vec<&str> = parts.collect();
    if nested.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(TrackedName { repo_id, nested })
}

/// Whether `name` was materialized from `repo_id`.
#[must_use]
pub fn belongs_to(name: &str, repo_id: &str) -> bool {
    parse_tracked_name(name).is_some_and(|parsed| parsed.repo_id == repo_id)
}

/// Derive a repo id from a clone URL: last path segment without `.git`,
/// with characters outside `[A-Za-z0-9.-]` mapped to `-`.
#[must_use]
pub fn repo_id_from_url(url: &str) -> Option<String> {
    let last = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()?
        .trim_end_matches(".git");
    let id: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let id = id.trim_matches(|c| c == '-' || c == '.').to_string();
    (!id.is_empty()).then_some(id)
}
