// src/archive/secure_path.rs

//! Destination path resolution for archive entries
//!
//! Every entry name is resolved against the extraction directory before
//! anything touches the filesystem. Names that are absolute or that would
//! climb out of the directory are rejected.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Resolve an in-archive name to a destination under `base`
pub fn resolve(base: &Path, entry_name: &str) -> Result<PathBuf> {
    let entry = Path::new(entry_name);
    if entry.has_root() {
        return Err(Error::PathTraversal(entry_name.to_string()));
    }

    if climbs_out(entry) {
        return Err(Error::PathTraversal(entry_name.to_string()));
    }

    let base = std::path::absolute(base).map_err(|e| {
        Error::IoError(format!("Failed to resolve {}: {}", base.display(), e))
    })?;
    let base = clean(&base);

    // Root the name so no `..` can survive cleaning, then rebase it
    let rooted = clean(&Path::new("/").join(entry));
    let relative = rooted.strip_prefix("/").unwrap_or(&rooted);
    let destination = clean(&base.join(relative));

    if !destination.starts_with(&base) {
        return Err(Error::PathTraversal(entry_name.to_string()));
    }

    Ok(destination)
}

/// Whether walking the name component by component ever goes above its start
///
/// Independent of the base, so `..` is caught even when the base is `/`.
fn climbs_out(entry: &Path) -> bool {
    let mut depth: usize = 0;
    for component in entry.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(up) => depth = up,
                None => return true,
            },
            Component::Normal(_) => depth += 1,
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

/// Lexically normalize a path: drop `.`, fold `..` into its parent
///
/// Never consults the filesystem, so symlinks are not resolved.
pub fn clean(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}
