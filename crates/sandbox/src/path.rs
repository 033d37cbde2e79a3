//! Path confinement to an agent workspace.
//!
//! Paths handed to the sandbox are always relative to the workspace root.
//! They are normalized lexically first, then the nearest existing ancestor is
//! canonicalized so that symlinks pointing outside the root are caught even
//! when the leaf does not exist yet (e.g., for writes).

use std::path::{Component, Path, PathBuf};

use switchyard_core::error::SandboxError;

/// Resolve `relative` inside `root`.
///
/// Checks:
/// 1. The path is relative and contains no NUL bytes
/// 2. `..` components never climb above the root
/// 3. The nearest existing ancestor, with symlinks resolved, is still inside the root
///
/// Returns `root` joined with the normalized path. An empty path or `.`
/// resolves to the root itself.
pub fn resolve_in_workspace(root: &Path, relative: &str) -> Result<PathBuf, SandboxError> {
    if relative.contains('\0') {
        return Err(SandboxError::InvalidPath(relative.escape_default().to_string()));
    }

    let raw = relative.trim().replace('\\', "/");
    let input = Path::new(&raw);
    if input.is_absolute() || raw.starts_with('/') {
        return Err(SandboxError::PathEscape(relative.into()));
    }

    let mut normalized = PathBuf::new();
    for component in input.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(SandboxError::PathEscape(relative.into()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SandboxError::PathEscape(relative.into()));
            }
        }
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|_| SandboxError::NotFound(root.display().to_string()))?;

    let candidate = root.join(&normalized);
    let existing = nearest_existing(&candidate, root);
    let canonical = existing.canonicalize()?;
    if !canonical.starts_with(&canonical_root) {
        return Err(SandboxError::PathEscape(relative.into()));
    }

    Ok(candidate)
}

/// Walk up from `path` until something exists on disk, stopping at `root`.
fn nearest_existing<'a>(path: &'a Path, root: &'a Path) -> &'a Path {
    let mut current = path;
    while current != root && std::fs::symlink_metadata(current).is_err() {
        match current.parent() {
            Some(parent) => current = parent,
            None => return root,
        }
    }
    current
}
