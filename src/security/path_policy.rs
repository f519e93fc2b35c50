//! Path validation for names and link destinations.
//!
//! Skill names, target names and tracked repo ids all become single path
//! components, so they share one validator. Link containment checks decide
//! whether a symlink is one of ours (points into the source tree) or foreign.

use std::path::{Component, Path, PathBuf};

use crate::error::SksError;
use crate::utils::fs::resolve_link_dest;

/// Errors specific to path policy violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPolicyViolation {
    /// Name is `.` or `..`
    TraversalAttempt,
    /// Name component contains invalid characters
    InvalidComponent { component: String, reason: String },
}

impl std::fmt::Display for PathPolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TraversalAttempt => write!(f, "path contains traversal sequences"),
            Self::InvalidComponent { component, reason } => {
                write!(f, "invalid path component {component:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for PathPolicyViolation {}

impl From<PathPolicyViolation> for SksError {
    fn from(violation: PathPolicyViolation) -> Self {
        Self::ValidationFailed(violation.to_string())
    }
}

/// Validate a name that will be used as a single directory entry.
///
/// Rejects empty names, `.`/`..`, separators, NUL bytes and hidden names
/// (a leading `.` is reserved for staging entries).
///
/// ```rust
/// use sks::security::path_policy::validate_path_component;
///
/// assert!(validate_path_component("my-skill").is_ok());
/// assert!(validate_path_component("..").is_err());
/// assert!(validate_path_component("foo/bar").is_err());
/// ```
pub fn validate_path_component(component: &str) -> std::result::Result<(), PathPolicyViolation> {
    let invalid = |reason: &str| PathPolicyViolation::InvalidComponent {
        component: component.to_string(),
        reason: reason.to_string(),
    };

    if component.is_empty() {
        return Err(invalid("empty component"));
    }
    if component.contains('\0') {
        return Err(invalid("contains null byte"));
    }
    if component == ".." || component == "." {
        return Err(PathPolicyViolation::TraversalAttempt);
    }
    if component.contains('/') || component.contains('\\') {
        return Err(invalid("contains directory separator"));
    }
    if component.starts_with('.') {
        return Err(invalid("hidden names are reserved"));
    }
    if component.len() > 255 {
        return Err(invalid("longer than 255 bytes"));
    }
    Ok(())
}

/// Normalize a path by removing `.` and resolving `..` lexically.
///
/// This does NOT resolve symlinks or check the filesystem.
///
/// ```rust
/// use std::path::{Path, PathBuf};
/// use sks::security::path_policy::normalize_path;
///
/// assert_eq!(normalize_path(Path::new("/foo/./bar/../baz")), PathBuf::from("/foo/baz"));
/// ```
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                let last = normalized.components().next_back();
                match last {
                    None | Some(Component::RootDir | Component::Prefix(_)) => {}
                    _ => {
                        normalized.pop();
                    }
                }
            }
            Component::CurDir => {}
            _ => normalized.push(component),
        }
    }

    normalized
}

/// Check if a path is lexically contained within a root directory.
#[must_use]
pub fn is_under_root(path: &Path, root: &Path) -> bool {
    normalize_path(path).starts_with(normalize_path(root))
}

/// Canonicalize the longest existing prefix of `path` and append the
/// missing tail lexically, so paths that do not exist yet still compare
/// against their real parents.
#[must_use]
pub fn resolve_existing(path: &Path) -> PathBuf {
    let normalized = normalize_path(path);
    for ancestor in normalized.ancestors() {
        let Ok(canonical) = ancestor.canonicalize() else {
            continue;
        };
        return match normalized.strip_prefix(ancestor) {
            Ok(rest) if !rest.as_os_str().is_empty() => canonical.join(rest),
            _ => canonical,
        };
    }
    normalized
}

/// Either path contains the other (equal paths overlap).
#[must_use]
pub fn paths_overlap(a: &Path, b: &Path) -> bool {
    is_under_root(a, b) || is_under_root(b, a)
}

/// Where a symlink points, as seen from the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkDestination {
    /// The link resolves to `root` itself.
    Root,
    /// The link resolves to the direct child `name` of `root`.
    Child(String),
    /// The link resolves somewhere deeper inside `root`.
    Nested(PathBuf),
    /// The link points outside `root`.
    Outside(PathBuf),
}

impl LinkDestination {
    #[must_use]
    pub const fn is_inside(&self) -> bool {
        !matches!(self, Self::Outside(_))
    }
}

/// Classify a link's destination relative to `root`.
///
/// Works for broken links: when the destination cannot be canonicalized the
/// lexically normalized path is compared against both the given and the
/// canonical root.
#[must_use]
pub fn classify_link(link: &Path, dest: &Path, root: &Path) -> LinkDestination {
    let resolved = resolve_link_dest(link, dest);
    let canonical_root = root.canonicalize().unwrap_or_else(|_| normalize_path(root));

    let candidates = [
        (resolved.canonicalize().ok(), canonical_root.clone()),
        (Some(normalize_path(&resolved)), canonical_root),
        (Some(normalize_path(&resolved)), normalize_path(root)),
    ];

    for (candidate, base) in candidates {
        let Some(candidate) = candidate else {
            continue;
        };
        if let Ok(rel) = candidate.strip_prefix(&base) {
            let parts: Vec<_> = rel.components().collect();
            return match parts.as_slice() {
                [] => LinkDestination::Root,
                [Component::Normal(name)] => {
                    LinkDestination::Child(name.to_string_lossy().into_owned())
                }
                _ => LinkDestination::Nested(rel.to_path_buf()),
            };
        }
    }
    LinkDestination::Outside(normalize_path(&resolved))
}
