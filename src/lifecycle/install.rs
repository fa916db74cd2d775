// src/lifecycle/install.rs

use super::{Progress, Stage};
use crate::archive::secure_path::clean;
use crate::archive::{self, split_archive_name};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::manifest::{MANIFEST_FILE_NAME, Manifest, VerificationFailure};
use crate::package::PackageIdentity;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

/// Outcome of an install
#[derive(Debug)]
pub struct InstallReport {
    pub identity: PackageIdentity,
    pub manifest: Manifest,
    /// Files deleted because their live hash did not match the manifest
    pub removed_files: Vec<VerificationFailure>,
    pub stages: Vec<Stage>,
}

/// Install a distributable archive under `config.root`
///
/// The identity comes from the archive's file name. After extraction the
/// embedded manifest moves into the package database and every listed file
/// is re-hashed; files that do not match are deleted and reported, which
/// leaves the package recorded but degraded rather than failing the install.
pub fn install(config: &Config, archive_path: &Path) -> Result<InstallReport> {
    config.validate()?;

    if !archive_path.is_file() {
        return Err(Error::NotFoundError(format!(
            "Could not find archive {}",
            archive_path.display()
        )));
    }
    let identity = identity_from_archive(archive_path)?;
    let mut progress = Progress::new(&identity);
    progress.advance(Stage::Archived)?;

    let db_entry = config.db_entry(&identity);
    if db_entry.exists() {
        info!("{} is already installed, reinstalling", identity);
    }

    // Nothing is extracted unless the archive carries its manifest
    let embedded = config.prefix_relative().join(MANIFEST_FILE_NAME);
    let carries_manifest = archive::entry_names(archive_path)?
        .iter()
        .any(|name| clean(Path::new(name)) == embedded);
    if !carries_manifest {
        return Err(Error::ParseError(format!(
            "{} carries no {}",
            archive_path.display(),
            embedded.display()
        )));
    }

    info!("Installing {} into {}", identity, config.root.display());
    archive::extract(archive_path, &config.root)?;

    let live_manifest = config.live_prefix().join(MANIFEST_FILE_NAME);
    if !live_manifest.is_file() {
        return Err(Error::ParseError(format!(
            "{} was not extracted to {}",
            MANIFEST_FILE_NAME,
            live_manifest.display()
        )));
    }
    fs::create_dir_all(&db_entry).map_err(|e| {
        Error::IoError(format!("Failed to create {}: {}", db_entry.display(), e))
    })?;
    move_file(&live_manifest, &db_entry.join(MANIFEST_FILE_NAME))?;

    let manifest = Manifest::read_from(&db_entry)?;

    info!("Verifying integrity of {} files", manifest.len());
    let removed_files = manifest.verify_all(&config.root);
    for failure in &removed_files {
        warn!("Hash not correct, deleting file {}", failure.location.display());
        match fs::remove_file(&failure.location) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not delete {}: {}", failure.location.display(), e),
        }
    }

    progress.advance(Stage::Installed)?;
    Ok(InstallReport {
        identity,
        manifest,
        removed_files,
        stages: progress.into_stages(),
    })
}

/// `htop-3.0.5-1.tar.xz` names htop 3.0.5 release 1
fn identity_from_archive(archive_path: &Path) -> Result<PackageIdentity> {
    let file_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (stem, _, _) = split_archive_name(&file_name).ok_or_else(|| {
        Error::InvalidIdentity(format!(
            "{} is not named name-version-release.<archival>.<compression>",
            file_name
        ))
    })?;
    PackageIdentity::parse(stem)
}

/// Rename, falling back to copy and delete across filesystems
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|e| {
        Error::IoError(format!(
            "Failed to move {} to {}: {}",
            from.display(),
            to.display(),
            e
        ))
    })?;
    fs::remove_file(from)
        .map_err(|e| Error::IoError(format!("Failed to remove {}: {}", from.display(), e)))
}
