// src/lifecycle/mod.rs

//! Package lifecycle: build, install, remove, list
//!
//! Every operation takes the resolved [`Config`] explicitly and runs its
//! stages strictly in order. A fatal error ends the invocation; there is no
//! checkpointing across runs. Recoverable outcomes (files deleted by the
//! install integrity check, files that could not be removed) are returned
//! in the operation's report and logged at `warn`.

mod build;
mod install;
mod remove;

pub use build::{BuildReport, build, fetch_source, source_checksum};
pub use install::{InstallReport, install};
pub use remove::{RemoveReport, find_installed, prune_empty_dirs, remove};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::package::PackageIdentity;
use std::fmt;
use std::fs;
use tracing::{debug, info, warn};

/// Lifecycle states, in the only order they can be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Fetched,
    Verified,
    Unpacked,
    BuiltInSitu,
    Staged,
    Archived,
    Installed,
    Removed,
}

impl Stage {
    pub fn as_str(&self) -> &str {
        match self {
            Stage::Fetched => "fetched",
            Stage::Verified => "verified",
            Stage::Unpacked => "unpacked",
            Stage::BuiltInSitu => "built",
            Stage::Staged => "staged",
            Stage::Archived => "archived",
            Stage::Installed => "installed",
            Stage::Removed => "removed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages one invocation has passed through
#[derive(Debug)]
pub(crate) struct Progress {
    package: String,
    reached: Vec<Stage>,
}

impl Progress {
    pub(crate) fn new(identity: &PackageIdentity) -> Self {
        Self {
            package: identity.canonical_name(),
            reached: Vec::new(),
        }
    }

    pub(crate) fn advance(&mut self, stage: Stage) -> Result<()> {
        if let Some(last) = self.reached.last() {
            if stage <= *last {
                return Err(Error::InvalidTransition(format!(
                    "{}: cannot move from {} back to {}",
                    self.package, last, stage
                )));
            }
        }
        info!("{}: {}", self.package, stage);
        self.reached.push(stage);
        Ok(())
    }

    pub(crate) fn into_stages(self) -> Vec<Stage> {
        self.reached
    }
}

/// Installed packages, sorted, read from the database directory names
///
/// Entries whose name is not a canonical identity are skipped with a warning.
pub fn list(config: &Config) -> Result<Vec<PackageIdentity>> {
    let db_dir = &config.db_dir;
    if !db_dir.exists() {
        debug!("No package database at {}", db_dir.display());
        return Ok(Vec::new());
    }

    let mut installed = Vec::new();
    for entry in fs::read_dir(db_dir)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", db_dir.display(), e)))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match PackageIdentity::parse(&name) {
            Ok(identity) => installed.push(identity),
            Err(e) => warn!("Ignoring database entry {}: {}", name, e),
        }
    }

    installed.sort();
    Ok(installed)
}
