// src/archive/pack.rs

//! Archive creation

use super::codec::Encoder;
use super::{ArchiveKind, CompressionKind};
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Create an archive at `destination` from `(source, name-in-archive)` pairs
///
/// Directories are added recursively. An existing destination is never
/// overwritten, and a partially written one is removed on failure.
pub fn create(
    members: &[(PathBuf, String)],
    destination: &Path,
    archival: ArchiveKind,
    compression: CompressionKind,
) -> Result<()> {
    info!(
        "Creating {} archive {} ({} members)",
        archival,
        destination.display(),
        members.len()
    );

    if destination.exists() {
        return Err(Error::ConflictError(format!(
            "{} already exists",
            destination.display()
        )));
    }
    if let Some((source, _)) = members.iter().find(|(source, _)| !source.exists()) {
        return Err(Error::NotFoundError(format!(
            "archive member {} does not exist",
            source.display()
        )));
    }

    let file = File::create_new(destination).map_err(|e| {
        Error::IoError(format!("Failed to create {}: {}", destination.display(), e))
    })?;

    let result = write_archive(file, members, archival, compression);
    if result.is_err() {
        if let Err(e) = fs::remove_file(destination) {
            warn!("Failed to remove partial archive {}: {}", destination.display(), e);
        }
    }
    result
}

fn write_archive(
    file: File,
    members: &[(PathBuf, String)],
    archival: ArchiveKind,
    compression: CompressionKind,
) -> Result<()> {
    let encoder = Encoder::new(compression, io::BufWriter::new(file))?;

    let encoder = match archival {
        ArchiveKind::Tar => write_tar(encoder, members)?,
        ArchiveKind::Zip => write_zip(encoder, members)?,
    };

    let mut out = encoder
        .finish()
        .map_err(|e| Error::IoError(format!("Failed to finish compression: {}", e)))?;
    out.flush()?;
    Ok(())
}

fn write_tar<W: Write>(encoder: Encoder<W>, members: &[(PathBuf, String)]) -> Result<Encoder<W>> {
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    for (source, name) in members {
        debug!("tar <- {} as {}", source.display(), name);
        let appended = if source.is_dir() {
            builder.append_dir_all(name, source)
        } else {
            builder.append_path_with_name(source, name)
        };
        appended.map_err(|e| {
            Error::IoError(format!("Failed to add {} to archive: {}", source.display(), e))
        })?;
    }

    builder
        .into_inner()
        .map_err(|e| Error::IoError(format!("Failed to finish tar stream: {}", e)))
}

fn write_zip<W: Write>(
    mut encoder: Encoder<W>,
    members: &[(PathBuf, String)],
) -> Result<Encoder<W>> {
    // ZipWriter needs to seek back for local headers
    let spool = tempfile::tempfile()?;
    let mut zip = zip::ZipWriter::new(spool);

    for (source, name) in members {
        if source.is_dir() {
            for entry in WalkDir::new(source).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    Error::IoError(format!("Failed to walk {}: {}", source.display(), e))
                })?;
                let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
                let entry_name = if relative.as_os_str().is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", name.trim_end_matches('/'), relative.display())
                };
                add_zip_entry(&mut zip, entry.path(), &entry_name)?;
            }
        } else {
            add_zip_entry(&mut zip, source, name)?;
        }
    }

    let mut spool = zip
        .finish()
        .map_err(|e| Error::IoError(format!("Failed to finish zip archive: {}", e)))?;
    spool.seek(SeekFrom::Start(0))?;
    io::copy(&mut spool, &mut encoder)?;
    Ok(encoder)
}

fn add_zip_entry(zip: &mut zip::ZipWriter<File>, source: &Path, name: &str) -> Result<()> {
    let metadata = fs::symlink_metadata(source)?;
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(metadata.permissions().mode() & 0o7777);

    if metadata.is_dir() {
        debug!("zip <- dir {}", name);
        zip.add_directory(name.trim_end_matches('/'), options)
            .map_err(|e| Error::IoError(format!("Failed to add directory {}: {}", name, e)))?;
    } else if metadata.is_file() {
        debug!("zip <- {} as {}", source.display(), name);
        zip.start_file(name, options)
            .map_err(|e| Error::IoError(format!("Failed to add {}: {}", name, e)))?;
        let mut input = File::open(source)?;
        io::copy(&mut input, zip)?;
    } else {
        debug!("Skipping non-regular file {}", source.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::extract;
    use std::fs::Permissions;
    use tempfile::TempDir;

    fn staged_tree(root: &Path) -> Vec<(PathBuf, String)> {
        let bin = root.join("usr/local/bin");
        let doc = root.join("usr/local/share/doc/tool");
        fs::create_dir_all(&bin).unwrap();
        fs::create_dir_all(&doc).unwrap();
        fs::write(bin.join("tool"), "#!/bin/sh\n").unwrap();
        fs::set_permissions(bin.join("tool"), Permissions::from_mode(0o755)).unwrap();
        fs::write(doc.join("readme"), "docs").unwrap();
        fs::set_permissions(doc.join("readme"), Permissions::from_mode(0o644)).unwrap();

        vec![
            (bin.join("tool"), "usr/local/bin/tool".to_string()),
            (doc.join("readme"), "usr/local/share/doc/tool/readme".to_string()),
        ]
    }

    fn assert_restored(dest: &Path) {
        let tool = dest.join("usr/local/bin/tool");
        assert_eq!(fs::read_to_string(&tool).unwrap(), "#!/bin/sh\n");
        assert_eq!(fs::metadata(&tool).unwrap().permissions().mode() & 0o777, 0o755);
        let readme = dest.join("usr/local/share/doc/tool/readme");
        assert_eq!(fs::read_to_string(&readme).unwrap(), "docs");
        assert_eq!(fs::metadata(&readme).unwrap().permissions().mode() & 0o777, 0o644);
    }

    #[test]
    fn test_tar_archive_extracts_back() {
        let work = TempDir::new().unwrap();
        let members = staged_tree(&work.path().join("stage"));
        let archive = work.path().join("tool-1.0-1.tar.xz");

        create(&members, &archive, ArchiveKind::Tar, CompressionKind::Xz).unwrap();
        let dest = work.path().join("root");
        extract(&archive, &dest).unwrap();
        assert_restored(&dest);
    }

    #[test]
    fn test_zip_archive_extracts_back() {
        let work = TempDir::new().unwrap();
        let members = staged_tree(&work.path().join("stage"));
        let archive = work.path().join("tool-1.0-1.zip.zst");

        create(&members, &archive, ArchiveKind::Zip, CompressionKind::Zstd).unwrap();
        let dest = work.path().join("root");
        extract(&archive, &dest).unwrap();
        assert_restored(&dest);
    }

    #[test]
    fn test_brotli_relies_on_name_hint() {
        let work = TempDir::new().unwrap();
        let members = staged_tree(&work.path().join("stage"));
        let archive = work.path().join("tool-1.0-1.tar.br");

        create(&members, &archive, ArchiveKind::Tar, CompressionKind::Brotli).unwrap();
        let dest = work.path().join("root");
        extract(&archive, &dest).unwrap();
        assert_restored(&dest);
    }

    #[test]
    fn test_directory_members_are_added_recursively() {
        let work = TempDir::new().unwrap();
        staged_tree(&work.path().join("stage"));
        let members = vec![(work.path().join("stage/usr"), "usr".to_string())];
        let archive = work.path().join("tree.zip.gz");

        create(&members, &archive, ArchiveKind::Zip, CompressionKind::Gzip).unwrap();
        let dest = work.path().join("root");
        extract(&archive, &dest).unwrap();
        assert_restored(&dest);
    }

    #[test]
    fn test_existing_destination_is_not_overwritten() {
        let work = TempDir::new().unwrap();
        let members = staged_tree(&work.path().join("stage"));
        let archive = work.path().join("taken.tar.gz");
        fs::write(&archive, "keep me").unwrap();

        let err = create(&members, &archive, ArchiveKind::Tar, CompressionKind::Gzip).unwrap_err();
        assert!(matches!(err, Error::ConflictError(_)));
        assert_eq!(fs::read_to_string(&archive).unwrap(), "keep me");
    }

    #[test]
    fn test_missing_member_leaves_no_archive() {
        let work = TempDir::new().unwrap();
        let members = vec![(work.path().join("absent"), "absent".to_string())];
        let archive = work.path().join("broken.tar.gz");

        let err = create(&members, &archive, ArchiveKind::Tar, CompressionKind::Gzip).unwrap_err();
        assert!(matches!(err, Error::NotFoundError(_)));
        assert!(!archive.exists());
    }

    #[test]
    fn test_lzip_output_is_unsupported_and_cleaned_up() {
        let work = TempDir::new().unwrap();
        let members = staged_tree(&work.path().join("stage"));
        let archive = work.path().join("tool.tar.lzip");

        let err = create(&members, &archive, ArchiveKind::Tar, CompressionKind::Lzip).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert!(!archive.exists());
    }
}
