// src/lifecycle/remove.rs

use super::{Progress, Stage, list};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::package::PackageIdentity;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of a removal
#[derive(Debug)]
pub struct RemoveReport {
    pub identity: PackageIdentity,
    pub deleted: Vec<PathBuf>,
    /// Files that could not be deleted, with the reason
    pub failed: Vec<(PathBuf, String)>,
    pub pruned_dirs: Vec<PathBuf>,
}

/// Find the installed package `name` refers to
///
/// `name` is either a bare package name or a full canonical name. A bare
/// name that matches several installed versions is ambiguous.
pub fn find_installed(config: &Config, name: &str) -> Result<PackageIdentity> {
    let mut matches: Vec<PackageIdentity> = list(config)?
        .into_iter()
        .filter(|id| id.name == name || id.canonical_name() == name)
        .collect();

    match matches.len() {
        0 => Err(Error::NotFoundError(format!(
            "Could not find an installed package with name {}",
            name
        ))),
        1 => Ok(matches.remove(0)),
        _ => {
            let candidates: Vec<String> = matches.iter().map(|id| id.canonical_name()).collect();
            Err(Error::ConflictError(format!(
                "{} matches several installed packages: {}",
                name,
                candidates.join(", ")
            )))
        }
    }
}

/// Delete every file of an installed package, its database entry, and the
/// directories left empty under the prefix
///
/// A file that cannot be deleted is logged and reported; removal continues.
pub fn remove(config: &Config, name: &str) -> Result<RemoveReport> {
    config.validate()?;

    let identity = find_installed(config, name)?;
    let mut progress = Progress::new(&identity);
    let db_entry = config.db_entry(&identity);
    let manifest = Manifest::read_from(&db_entry)?;

    info!("Deleting files of {}", identity);
    let mut deleted = Vec::new();
    let mut failed = Vec::new();
    for entry in &manifest.entries {
        let path = config.root.join(&entry.path);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                deleted.push(path);
            }
            Err(e) => {
                warn!("Error deleting {}: {}", path.display(), e);
                failed.push((path, e.to_string()));
            }
        }
    }

    fs::remove_dir_all(&db_entry).map_err(|e| {
        Error::IoError(format!(
            "Could not delete package entry {}: {}",
            db_entry.display(),
            e
        ))
    })?;

    let pruned_dirs = prune_empty_dirs(&config.live_prefix())?;
    progress.advance(Stage::Removed)?;

    Ok(RemoveReport {
        identity,
        deleted,
        failed,
        pruned_dirs,
    })
}

/// Remove empty directories below `top`, children before parents
///
/// `top` itself is kept. A directory counts as empty only once all of its
/// subdirectories have been pruned. Symlinks are never followed.
pub fn prune_empty_dirs(top: &Path) -> Result<Vec<PathBuf>> {
    let mut pruned = Vec::new();
    if top.is_dir() {
        prune_children(top, &mut pruned)?;
    }
    if !pruned.is_empty() {
        info!("Removed {} empty directories", pruned.len());
    }
    Ok(pruned)
}

/// Returns whether `dir` ended up empty
fn prune_children(dir: &Path, pruned: &mut Vec<PathBuf>) -> Result<bool> {
    let mut empty = true;

    for entry in fs::read_dir(dir)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", dir.display(), e)))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            empty = false;
            continue;
        }

        let path = entry.path();
        if !prune_children(&path, pruned)? {
            empty = false;
            continue;
        }
        match fs::remove_dir(&path) {
            Ok(()) => {
                debug!("Removed empty directory {}", path.display());
                pruned.push(path);
            }
            Err(e) => {
                warn!("Could not remove {}: {}", path.display(), e);
                empty = false;
            }
        }
    }

    Ok(empty)
}
