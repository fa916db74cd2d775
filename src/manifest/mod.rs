// src/manifest/mod.rs

//! Manifest of the files a package installs
//!
//! A manifest is taken once, at build time, by walking the staged install
//! tree. It travels inside the distributable archive as `<prefix>/files.xml`
//! and is moved into the package database on install. Entry paths are
//! relative to the filesystem root of the installation, so they include the
//! prefix (`usr/local/bin/htop`).

mod file_type;
mod xml;

pub use file_type::{FileType, classify};

use crate::error::{Error, Result};
use crate::hash::{self, Verification};
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File name of a serialized manifest
pub const MANIFEST_FILE_NAME: &str = "files.xml";

/// One installed regular file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Root-relative path, never starting with `/`
    pub path: String,
    pub file_type: FileType,
    pub uid: u32,
    pub gid: u32,
    /// Permission bits as zero-padded octal, e.g. `0755`
    pub mode: String,
    /// Lower-case hex SHA-256 of the contents when the manifest was taken
    pub hash: String,
}

/// Why a manifested file failed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Mismatch { expected: String, actual: String },
    Unreadable(String),
}

/// A manifested file that no longer matches its record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationFailure {
    pub entry: ManifestEntry,
    /// Where the file was looked for
    pub location: PathBuf,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Snapshot every regular file under `install_root`
    ///
    /// `prefix` is the installation prefix (e.g. `/usr/local`); it selects
    /// the classification base and the location of the manifest's own file,
    /// which is never recorded. Symlinks are not followed or recorded.
    /// Files under a pkg-config directory have the literal `install_root`
    /// string removed from their contents before hashing.
    pub fn build(install_root: &Path, prefix: &Path) -> Result<Self> {
        info!(
            "Creating manifest of {} (prefix {})",
            install_root.display(),
            prefix.display()
        );

        let prefix_rel = prefix.strip_prefix("/").unwrap_or(prefix);
        let own_file = prefix_rel.join(MANIFEST_FILE_NAME);
        let root_str = install_root.to_string_lossy();
        let root_str = root_str.trim_end_matches('/');

        let mut entries = Vec::new();

        for entry in WalkDir::new(install_root)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                Error::IoError(format!("Failed to walk {}: {}", install_root.display(), e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(install_root)
                .map_err(|e| Error::IoError(format!("Unexpected walk path: {}", e)))?;
            if relative == own_file {
                continue;
            }

            let classified = relative.strip_prefix(prefix_rel).unwrap_or(relative);

            if file_type::is_pkgconfig(classified) && !root_str.is_empty() {
                scrub_root_path(entry.path(), root_str.as_bytes())?;
            }

            let metadata = fs::metadata(entry.path()).map_err(|e| {
                Error::IoError(format!("Failed to stat {}: {}", entry.path().display(), e))
            })?;

            let path = relative.to_string_lossy().into_owned();
            let file_type = classify(classified);
            debug!("{} [{}]", path, file_type);

            entries.push(ManifestEntry {
                path,
                file_type,
                uid: metadata.uid(),
                gid: metadata.gid(),
                mode: format!("{:04o}", metadata.permissions().mode() & 0o777),
                hash: hash::digest_hex(entry.path())?,
            });
        }

        info!("Manifest lists {} files", entries.len());
        Ok(Self { entries })
    }

    pub fn to_xml(&self) -> Result<String> {
        xml::to_xml(self)
    }

    pub fn from_xml(content: &str) -> Result<Self> {
        xml::from_xml(content)
    }

    /// Write `files.xml` into `dir`, returning its path
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .map_err(|e| Error::IoError(format!("Failed to create {}: {}", dir.display(), e)))?;

        let path = dir.join(MANIFEST_FILE_NAME);
        fs::write(&path, self.to_xml()?)
            .map_err(|e| Error::IoError(format!("Failed to write {}: {}", path.display(), e)))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;

        debug!("Wrote manifest {}", path.display());
        Ok(path)
    }

    /// Read `files.xml` from `dir`
    pub fn read_from(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE_NAME);
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFoundError(format!("No manifest at {}", path.display()))
            } else {
                Error::IoError(format!("Failed to read {}: {}", path.display(), e))
            }
        })?;
        Self::from_xml(&content)
    }

    /// Recompute each entry's hash under `root` and report the ones that differ
    ///
    /// A missing or unreadable file is a failure, never an error: the whole
    /// set is always checked.
    pub fn verify_all(&self, root: &Path) -> Vec<VerificationFailure> {
        let mut failures = Vec::new();

        for entry in &self.entries {
            let location = root.join(&entry.path);
            let reason = match hash::verify(&location, &entry.hash) {
                Ok(Verification::Match) => continue,
                Ok(Verification::Mismatch { expected, actual }) => {
                    FailureReason::Mismatch { expected, actual }
                }
                Err(e) => FailureReason::Unreadable(e.to_string()),
            };
            warn!("Integrity check failed for {}: {:?}", location.display(), reason);
            failures.push(VerificationFailure {
                entry: entry.clone(),
                location,
                reason,
            });
        }

        failures
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Remove every occurrence of `needle` from a file, keeping its mode
fn scrub_root_path(path: &Path, needle: &[u8]) -> Result<()> {
    let content = fs::read(path)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;

    let Some(rewritten) = remove_all(&content, needle) else {
        return Ok(());
    };

    debug!("Scrubbed staging path from {}", path.display());
    fs::write(path, rewritten)
        .map_err(|e| Error::IoError(format!("Failed to rewrite {}: {}", path.display(), e)))
}

/// `None` when `needle` does not occur
fn remove_all(haystack: &[u8], needle: &[u8]) -> Option<Vec<u8>> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }

    let mut out = Vec::with_capacity(haystack.len());
    let mut found = false;
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            found = true;
            i += needle.len();
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }

    found.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::Permissions;
    use tempfile::TempDir;

    fn stage(root: &Path) {
        let bin = root.join("usr/local/bin");
        let doc = root.join("usr/local/share/doc/tool");
        let pc = root.join("usr/local/lib/pkgconfig");
        fs::create_dir_all(&bin).unwrap();
        fs::create_dir_all(&doc).unwrap();
        fs::create_dir_all(&pc).unwrap();

        fs::write(bin.join("tool"), "#!/bin/sh\necho tool\n").unwrap();
        fs::set_permissions(bin.join("tool"), Permissions::from_mode(0o755)).unwrap();
        fs::write(doc.join("readme"), "readme").unwrap();
        fs::set_permissions(doc.join("readme"), Permissions::from_mode(0o644)).unwrap();
        fs::write(
            pc.join("tool.pc"),
            format!("prefix={}/usr/local\nlibdir=${{prefix}}/lib\n", root.display()),
        )
        .unwrap();
    }

    #[test]
    fn test_build_records_regular_files() {
        let dir = TempDir::new().unwrap();
        stage(dir.path());
        std::os::unix::fs::symlink("tool", dir.path().join("usr/local/bin/tool-link")).unwrap();

        let manifest = Manifest::build(dir.path(), Path::new("/usr/local")).unwrap();
        let paths: Vec<&str> = manifest.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "usr/local/bin/tool",
                "usr/local/lib/pkgconfig/tool.pc",
                "usr/local/share/doc/tool/readme",
            ]
        );

        let tool = &manifest.entries[0];
        assert_eq!(tool.file_type, FileType::Executable);
        assert_eq!(tool.mode, "0755");
        assert_eq!(tool.hash, hash::digest_hex(&dir.path().join(&tool.path)).unwrap());
        assert_eq!(manifest.entries[1].file_type, FileType::Data);
        assert_eq!(manifest.entries[2].file_type, FileType::Doc);
        assert_eq!(manifest.entries[2].mode, "0644");
    }

    #[test]
    fn test_pkgconfig_files_lose_the_staging_root() {
        let dir = TempDir::new().unwrap();
        stage(dir.path());

        let manifest = Manifest::build(dir.path(), Path::new("/usr/local")).unwrap();
        let pc = dir.path().join("usr/local/lib/pkgconfig/tool.pc");
        assert_eq!(
            fs::read_to_string(&pc).unwrap(),
            "prefix=/usr/local\nlibdir=${prefix}/lib\n"
        );
        let entry = manifest.entries.iter().find(|e| e.path.ends_with("tool.pc")).unwrap();
        assert_eq!(entry.hash, hash::digest_hex(&pc).unwrap());
    }

    #[test]
    fn test_build_is_idempotent() {
        let dir = TempDir::new().unwrap();
        stage(dir.path());

        let first = Manifest::build(dir.path(), Path::new("/usr/local")).unwrap();
        let second = Manifest::build(dir.path(), Path::new("/usr/local")).unwrap();
        assert_eq!(first.to_xml().unwrap(), second.to_xml().unwrap());
    }

    #[test]
    fn test_own_file_is_not_listed() {
        let dir = TempDir::new().unwrap();
        stage(dir.path());

        let first = Manifest::build(dir.path(), Path::new("/usr/local")).unwrap();
        first.write_to(&dir.path().join("usr/local")).unwrap();
        let second = Manifest::build(dir.path(), Path::new("/usr/local")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        stage(dir.path());

        let manifest = Manifest::build(dir.path(), Path::new("/usr/local")).unwrap();
        let db = dir.path().join("db/tool-1.0-1");
        let written = manifest.write_to(&db).unwrap();
        assert_eq!(written, db.join(MANIFEST_FILE_NAME));
        assert_eq!(Manifest::read_from(&db).unwrap(), manifest);
    }

    #[test]
    fn test_read_from_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Manifest::read_from(&dir.path().join("nope")),
            Err(Error::NotFoundError(_))
        ));
    }

    #[test]
    fn test_verify_all_reports_only_changed_files() {
        let dir = TempDir::new().unwrap();
        stage(dir.path());
        let manifest = Manifest::build(dir.path(), Path::new("/usr/local")).unwrap();

        fs::write(dir.path().join("usr/local/share/doc/tool/readme"), "tampered").unwrap();
        fs::remove_file(dir.path().join("usr/local/lib/pkgconfig/tool.pc")).unwrap();

        let failures = manifest.verify_all(dir.path());
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().any(|f| f.entry.path == "usr/local/share/doc/tool/readme"
            && matches!(f.reason, FailureReason::Mismatch { .. })));
        assert!(failures.iter().any(|f| f.entry.path.ends_with("tool.pc")
            && matches!(f.reason, FailureReason::Unreadable(_))));
    }

    #[test]
    fn test_remove_all() {
        assert_eq!(remove_all(b"a/stage/b/stage", b"/stage"), Some(b"a/b".to_vec()));
        assert_eq!(remove_all(b"nothing here", b"/stage"), None);
        assert_eq!(remove_all(b"x", b""), None);
    }
}
