//! Path safety policy: name validation and symlink containment.

pub mod path_policy;

pub use path_policy::{
    LinkDestination, PathPolicyViolation, classify_link, paths_overlap, resolve_existing,
    validate_path_component,
};
