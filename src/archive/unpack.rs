// src/archive/unpack.rs

//! Secure extraction into a directory tree

use super::codec;
use super::secure_path;
use super::{ArchiveKind, CompressionKind, peek, split_archive_name};
use crate::error::{Error, Result};
use std::fs::{self, DirBuilder, File, OpenOptions, Permissions};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Mode for parent directories the archive does not describe itself
const PARENT_DIR_MODE: u32 = 0o755;

/// Unix file type bits, used to spot symlinks in zip entries
const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// What an archive entry materializes as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Directory,
    File,
    Link,
    Other,
}

/// Extract an archive into `destination`
///
/// The compression layer and container are identified from content. Any
/// failing entry aborts the whole extraction; entries written before it are
/// left in place.
pub fn extract(archive_path: &Path, destination: &Path) -> Result<()> {
    info!("Extracting {} into {}", archive_path.display(), destination.display());

    let (archival, stream) = open_container(archive_path)?;

    fs::create_dir_all(destination).map_err(|e| {
        Error::IoError(format!("Failed to create {}: {}", destination.display(), e))
    })?;

    match archival {
        ArchiveKind::Tar => unpack_tar(stream, destination),
        ArchiveKind::Zip => unpack_zip(stream, destination),
    }
}

/// Names of every entry in an archive, in archive order, without writing anything
pub fn entry_names(archive_path: &Path) -> Result<Vec<String>> {
    let (archival, stream) = open_container(archive_path)?;

    match archival {
        ArchiveKind::Tar => {
            let mut archive = tar::Archive::new(stream);
            let mut names = Vec::new();
            for entry in archive
                .entries()
                .map_err(|e| Error::IoError(format!("Failed to read archive entries: {}", e)))?
            {
                let entry = entry
                    .map_err(|e| Error::IoError(format!("Failed to read archive entry: {}", e)))?;
                let name = entry
                    .path()
                    .map_err(|e| Error::IoError(format!("Failed to get entry path: {}", e)))?;
                names.push(name.to_string_lossy().into_owned());
            }
            Ok(names)
        }
        ArchiveKind::Zip => {
            let archive = open_zip(stream)?;
            Ok(archive.file_names().map(str::to_string).collect())
        }
    }
}

/// Identify compression and container, returning the decoded container stream
fn open_container(archive_path: &Path) -> Result<(ArchiveKind, Box<dyn Read>)> {
    let file = File::open(archive_path).map_err(|e| {
        Error::IoError(format!("Failed to open archive {}: {}", archive_path.display(), e))
    })?;
    let file_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name_hint = split_archive_name(&file_name);

    let (head, raw) = peek(Box::new(BufReader::new(file)))?;

    let (head, stream) = if ArchiveKind::detect(&head).is_some() {
        (head, raw)
    } else {
        let compression = CompressionKind::detect(&head)
            .or_else(|| name_hint.and_then(|(_, _, compression)| compression))
            .ok_or_else(|| {
                Error::UnsupportedFormat(format!("cannot identify {}", archive_path.display()))
            })?;
        debug!("Detected {} compression", compression);
        peek(codec::decoder(compression, raw)?)?
    };

    let archival = ArchiveKind::detect(&head)
        .or_else(|| name_hint.map(|(_, archival, _)| archival))
        .ok_or_else(|| {
            Error::UnsupportedFormat(format!(
                "no tar or zip container in {}",
                archive_path.display()
            ))
        })?;
    debug!("Detected {} container", archival);

    Ok((archival, stream))
}

/// The zip central directory sits at the end, so spool to a seekable file
fn open_zip(mut reader: Box<dyn Read>) -> Result<zip::ZipArchive<File>> {
    let mut spool = tempfile::tempfile()?;
    io::copy(&mut reader, &mut spool)?;
    spool.seek(SeekFrom::Start(0))?;

    zip::ZipArchive::new(spool)
        .map_err(|e| Error::IoError(format!("Failed to open zip archive: {}", e)))
}

fn unpack_tar(reader: Box<dyn Read>, destination: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    let mut count = 0usize;

    for entry in archive
        .entries()
        .map_err(|e| Error::IoError(format!("Failed to read archive entries: {}", e)))?
    {
        let mut entry =
            entry.map_err(|e| Error::IoError(format!("Failed to read archive entry: {}", e)))?;

        let name = entry
            .path()
            .map_err(|e| Error::IoError(format!("Failed to get entry path: {}", e)))?
            .to_string_lossy()
            .into_owned();

        let entry_type = entry.header().entry_type();
        let kind = if entry_type.is_dir() {
            EntryKind::Directory
        } else if entry_type.is_symlink() || entry_type.is_hard_link() {
            EntryKind::Link
        } else if entry_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        let mode = entry
            .header()
            .mode()
            .map_err(|e| Error::IoError(format!("Failed to get mode of {}: {}", name, e)))?;

        unpack_entry(destination, &name, kind, mode, &mut entry)?;
        count += 1;
    }

    debug!("Processed {} tar entries", count);
    Ok(())
}

fn unpack_zip(reader: Box<dyn Read>, destination: &Path) -> Result<()> {
    let mut archive = open_zip(reader)?;

    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| Error::IoError(format!("Failed to read zip entry: {}", e)))?;

        let name = file.name().to_string();
        let unix_mode = file.unix_mode();
        let kind = if file.is_dir() {
            EntryKind::Directory
        } else if unix_mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            EntryKind::Link
        } else {
            EntryKind::File
        };
        let mode = unix_mode.unwrap_or(match kind {
            EntryKind::Directory => 0o755,
            _ => 0o644,
        });

        unpack_entry(destination, &name, kind, mode, &mut file)?;
    }

    debug!("Processed {} zip entries", archive.len());
    Ok(())
}

/// Materialize one entry under `destination`
fn unpack_entry(
    destination: &Path,
    name: &str,
    kind: EntryKind,
    mode: u32,
    contents: &mut dyn Read,
) -> Result<()> {
    // Rejection happens before any write for this entry
    let target = secure_path::resolve(destination, name)?;
    let mode = mode & 0o7777;

    if let Some(parent) = target.parent() {
        create_dir_with_mode(parent, PARENT_DIR_MODE)?;
    }

    match kind {
        EntryKind::Directory => {
            debug!("dir  {}", target.display());
            create_dir_with_mode(&target, mode)
        }
        EntryKind::Link => {
            debug!("Skipping link entry {}", name);
            Ok(())
        }
        EntryKind::Other => {
            debug!("Skipping special entry {}", name);
            Ok(())
        }
        EntryKind::File => {
            debug!("file {} ({:04o})", target.display(), mode);
            write_file(&target, mode, contents)
        }
    }
}

fn create_dir_with_mode(path: &Path, mode: u32) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(path)
        .map_err(|e| Error::IoError(format!("Failed to create directory {}: {}", path.display(), e)))
}

fn write_file(target: &Path, mode: u32, contents: &mut dyn Read) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| Error::IoError(format!("No parent directory for {}", target.display())))?;
    let _writable = WritableDir::acquire(parent)?;

    // Replace rather than overwrite in place: the old file may be read-only
    match fs::remove_file(target) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(Error::IoError(format!(
                "Failed to replace {}: {}",
                target.display(),
                e
            )));
        }
    }

    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(target)
        .map_err(|e| Error::IoError(format!("Failed to create {}: {}", target.display(), e)))?;

    io::copy(contents, &mut out)
        .map_err(|e| Error::IoError(format!("Failed to write {}: {}", target.display(), e)))?;

    // The umask may have trimmed the requested bits
    fs::set_permissions(target, Permissions::from_mode(mode))
        .map_err(|e| Error::IoError(format!("Failed to chmod {}: {}", target.display(), e)))?;

    Ok(())
}

/// Grants owner write on a directory for as long as it lives
struct WritableDir {
    path: PathBuf,
    original: Option<Permissions>,
}

impl WritableDir {
    fn acquire(path: &Path) -> Result<Self> {
        let permissions = fs::metadata(path)
            .map_err(|e| Error::IoError(format!("Failed to stat {}: {}", path.display(), e)))?
            .permissions();

        let mut original = None;
        if permissions.mode() & 0o200 == 0 {
            fs::set_permissions(path, Permissions::from_mode(permissions.mode() | 0o200)).map_err(
                |e| Error::IoError(format!("Failed to chmod parent {}: {}", path.display(), e)),
            )?;
            original = Some(permissions);
        }

        Ok(Self {
            path: path.to_path_buf(),
            original,
        })
    }
}

impl Drop for WritableDir {
    fn drop(&mut self) {
        if let Some(permissions) = self.original.take() {
            let _ = fs::set_permissions(&self.path, permissions);
        }
    }
}
