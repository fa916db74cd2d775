// src/lifecycle/build.rs

use super::{Progress, Stage};
use crate::archive::{self, archive_file_name};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::SourceFetcher;
use crate::hash::{self, Verification};
use crate::manifest::{MANIFEST_FILE_NAME, Manifest};
use crate::package::{PackageDescription, PackageIdentity, SourceSpec};
use crate::shell::{BuildEnvironment, Step, StepRunner};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of a successful build
#[derive(Debug)]
pub struct BuildReport {
    pub identity: PackageIdentity,
    /// The distributable archive
    pub archive: PathBuf,
    pub manifest: Manifest,
    pub stages: Vec<Stage>,
}

/// Fetch, verify, unpack, build, snapshot and archive one package
pub fn build(
    config: &Config,
    description: &PackageDescription,
    fetcher: &dyn SourceFetcher,
    runner: &dyn StepRunner,
) -> Result<BuildReport> {
    config.validate()?;
    description.validate()?;
    let identity = description.identity()?;
    let canonical = identity.canonical_name();
    let mut progress = Progress::new(&identity);

    let source = &description.source;
    let artifact = config.download_dir.join(source.file_name());
    fetch_source(fetcher, source, &artifact)?;
    progress.advance(Stage::Fetched)?;

    match hash::verify(&artifact, &source.sha256)? {
        Verification::Match => info!("Integrity OK"),
        Verification::Mismatch { expected, actual } => {
            return Err(Error::ChecksumMismatch {
                path: artifact.display().to_string(),
                expected,
                actual,
            });
        }
    }
    progress.advance(Stage::Verified)?;

    let unpack_dir = config.build_dir.join(&canonical);
    let pkg_build_dir = unpack(source, &artifact, &unpack_dir)?;
    progress.advance(Stage::Unpacked)?;

    reset_dir(&config.install_dir)?;
    fs::create_dir_all(config.staged_prefix())?;

    let env = BuildEnvironment::new(config, &identity, &pkg_build_dir);
    runner.run(Step::Setup, &description.setup, &pkg_build_dir, &env)?;
    runner.run(Step::Build, &description.build, &pkg_build_dir, &env)?;
    runner.run(Step::Install, &description.install, &pkg_build_dir, &env)?;
    progress.advance(Stage::BuiltInSitu)?;

    let manifest = Manifest::build(&config.install_dir, &config.prefix)?;
    if manifest.is_empty() {
        warn!(
            "{}: install step left no files under {}",
            canonical,
            config.install_dir.display()
        );
    }
    let manifest_file = manifest.write_to(&config.staged_prefix())?;
    progress.advance(Stage::Staged)?;

    fs::create_dir_all(&config.output_dir).map_err(|e| {
        Error::IoError(format!(
            "Failed to create output directory {}: {}",
            config.output_dir.display(),
            e
        ))
    })?;
    let archive_path = config.output_dir.join(archive_file_name(
        &canonical,
        config.archival,
        config.compression,
    ));

    let mut members: Vec<(PathBuf, String)> = manifest
        .entries
        .iter()
        .map(|entry| (config.install_dir.join(&entry.path), entry.path.clone()))
        .collect();
    members.push((
        manifest_file,
        config
            .prefix_relative()
            .join(MANIFEST_FILE_NAME)
            .to_string_lossy()
            .into_owned(),
    ));

    info!("Packaging {}", archive_path.display());
    archive::create(&members, &archive_path, config.archival, config.compression)?;
    progress.advance(Stage::Archived)?;

    info!("Cleanup...");
    remove_quietly(&unpack_dir);
    remove_quietly(&config.install_dir);

    Ok(BuildReport {
        identity,
        archive: archive_path,
        manifest,
        stages: progress.into_stages(),
    })
}

/// Make `dest` hold the source artifact
///
/// An existing file is reused only when it matches the expected hash;
/// anything else is fetched again. Returns whether the cache was used.
pub fn fetch_source(fetcher: &dyn SourceFetcher, source: &SourceSpec, dest: &Path) -> Result<bool> {
    if dest.is_file() {
        match hash::verify(dest, &source.sha256) {
            Ok(Verification::Match) => {
                info!("Using cached {}", dest.display());
                return Ok(true);
            }
            Ok(Verification::Mismatch { .. }) => {
                info!("Cached {} is stale, fetching again", dest.display());
            }
            Err(e) => warn!("Cannot check cached {}: {}", dest.display(), e),
        }
    }

    fetcher.fetch(&source.uri, dest)?;
    info!("File downloaded in {}", dest.display());
    Ok(false)
}

/// Fetch `uri` into the download cache and return its SHA-256
pub fn source_checksum(config: &Config, fetcher: &dyn SourceFetcher, uri: &str) -> Result<String> {
    let source = SourceSpec {
        uri: uri.to_string(),
        sha256: String::new(),
        decompressed: false,
    };
    let dest = config.download_dir.join(source.file_name());
    fetcher.fetch(uri, &dest)?;
    hash::digest_hex(&dest)
}

/// Lay the verified artifact out under `unpack_dir`, returning the build directory
fn unpack(source: &SourceSpec, artifact: &Path, unpack_dir: &Path) -> Result<PathBuf> {
    reset_dir(unpack_dir)?;

    if source.decompressed {
        fs::create_dir_all(unpack_dir)?;
        let target = unpack_dir.join(source.file_name());
        fs::copy(artifact, &target).map_err(|e| {
            Error::IoError(format!(
                "Failed to copy {} to {}: {}",
                artifact.display(),
                target.display(),
                e
            ))
        })?;
        return Ok(unpack_dir.to_path_buf());
    }

    archive::extract(artifact, unpack_dir)?;
    info!("Tarball unpacked in {}", unpack_dir.display());
    single_top_level(unpack_dir)
}

/// The one directory a source tarball is expected to contain
fn single_top_level(unpack_dir: &Path) -> Result<PathBuf> {
    let mut entries = fs::read_dir(unpack_dir)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", unpack_dir.display(), e)))?
        .collect::<std::io::Result<Vec<_>>>()?;

    if entries.len() == 1 && entries[0].file_type()?.is_dir() {
        if let Some(only) = entries.pop() {
            return Ok(only.path());
        }
    }

    warn!(
        "Expected a single top-level directory in {}, found {} entries; building in place",
        unpack_dir.display(),
        entries.len()
    );
    Ok(unpack_dir.to_path_buf())
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        debug!("Clearing stale {}", dir.display());
        fs::remove_dir_all(dir)
            .map_err(|e| Error::IoError(format!("Failed to clear {}: {}", dir.display(), e)))?;
    }
    Ok(())
}

fn remove_quietly(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        warn!("Could not remove {}: {}", dir.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use tempfile::TempDir;

    /// Copies a fixed file and counts calls
    struct StaticFetcher {
        content: Vec<u8>,
        calls: Cell<usize>,
    }

    impl SourceFetcher for StaticFetcher {
        fn fetch(&self, _uri: &str, dest: &Path) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            fs::create_dir_all(dest.parent().unwrap())?;
            fs::write(dest, &self.content)?;
            Ok(())
        }
    }

    /// Records which steps were asked to run
    #[derive(Default)]
    struct RecordingRunner {
        steps: RefCell<Vec<Step>>,
    }

    impl StepRunner for RecordingRunner {
        fn run(
            &self,
            step: Step,
            _commands: &[String],
            _dir: &Path,
            _env: &BuildEnvironment,
        ) -> Result<()> {
            self.steps.borrow_mut().push(step);
            Ok(())
        }
    }

    fn description_with(sha256: &str, install: &str) -> PackageDescription {
        PackageDescription::from_yaml(&format!(
            "name: tool\nversion: '1.0'\nrelease: 1\n\
             source:\n  uri: https://example.org/tool.sh\n  sha256: {}\n  decompressed: true\n\
             setup:\n  - touch setup_ran\ninstall:\n  - {}\n",
            sha256, install
        ))
        .unwrap()
    }

    fn sandbox(dir: &Path) -> Config {
        Config {
            build_dir: dir.join("build"),
            install_dir: dir.join("stage"),
            download_dir: dir.join("downloads"),
            output_dir: dir.join("out"),
            ..Config::default()
        }
    }

    #[test]
    fn test_unknown_macro_stops_build_before_any_step() {
        let dir = TempDir::new().unwrap();
        let fetcher = StaticFetcher {
            content: b"#!/bin/sh\n".to_vec(),
            calls: Cell::new(0),
        };
        let sha = hash::to_hex(&hash::digest(&b"#!/bin/sh\n"[..]).unwrap());
        let runner = RecordingRunner::default();

        let result = build(
            &sandbox(dir.path()),
            &description_with(&sha, "$cmake"),
            &fetcher,
            &runner,
        );

        assert!(matches!(result, Err(Error::ParseError(_))));
        assert!(runner.steps.borrow().is_empty());
        assert_eq!(fetcher.calls.get(), 0);
    }

    #[test]
    fn test_unwritable_compression_stops_build_before_any_step() {
        let dir = TempDir::new().unwrap();
        let fetcher = StaticFetcher {
            content: b"#!/bin/sh\n".to_vec(),
            calls: Cell::new(0),
        };
        let sha = hash::to_hex(&hash::digest(&b"#!/bin/sh\n"[..]).unwrap());
        let runner = RecordingRunner::default();
        let config = Config {
            compression: crate::archive::CompressionKind::Lzip,
            ..sandbox(dir.path())
        };

        let result = build(&config, &description_with(&sha, "true"), &fetcher, &runner);

        assert!(matches!(result, Err(Error::ConfigError(_))));
        assert!(runner.steps.borrow().is_empty());
    }

    #[test]
    fn test_steps_run_in_order() {
        let dir = TempDir::new().unwrap();
        let fetcher = StaticFetcher {
            content: b"#!/bin/sh\n".to_vec(),
            calls: Cell::new(0),
        };
        let sha = hash::to_hex(&hash::digest(&b"#!/bin/sh\n"[..]).unwrap());
        let runner = RecordingRunner::default();

        let report = build(
            &sandbox(dir.path()),
            &description_with(&sha, "true"),
            &fetcher,
            &runner,
        )
        .unwrap();

        assert_eq!(*runner.steps.borrow(), vec![Step::Setup, Step::Build, Step::Install]);
        assert!(report.manifest.is_empty());
        assert!(report.archive.is_file());
    }

    fn spec_for(content: &[u8]) -> SourceSpec {
        SourceSpec {
            uri: "https://example.org/tool-1.0.tar.gz".to_string(),
            sha256: hash::to_hex(&hash::digest(content).unwrap()),
            decompressed: false,
        }
    }

    #[test]
    fn test_valid_cache_skips_fetch() {
        let dir = TempDir::new().unwrap();
        let fetcher = StaticFetcher {
            content: b"upstream".to_vec(),
            calls: Cell::new(0),
        };
        let dest = dir.path().join("tool-1.0.tar.gz");
        let source = spec_for(b"upstream");

        assert!(!fetch_source(&fetcher, &source, &dest).unwrap());
        assert!(fetch_source(&fetcher, &source, &dest).unwrap());
        assert_eq!(fetcher.calls.get(), 1);
    }

    #[test]
    fn test_stale_cache_is_refetched() {
        let dir = TempDir::new().unwrap();
        let fetcher = StaticFetcher {
            content: b"upstream".to_vec(),
            calls: Cell::new(0),
        };
        let dest = dir.path().join("tool-1.0.tar.gz");
        fs::write(&dest, b"truncated").unwrap();

        assert!(!fetch_source(&fetcher, &spec_for(b"upstream"), &dest).unwrap());
        assert_eq!(fs::read(&dest).unwrap(), b"upstream");
    }

    #[test]
    fn test_single_top_level() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("tool-1.0/src")).unwrap();
        assert_eq!(single_top_level(dir.path()).unwrap(), dir.path().join("tool-1.0"));

        fs::write(dir.path().join("README"), "").unwrap();
        assert_eq!(single_top_level(dir.path()).unwrap(), dir.path());
    }

    #[test]
    fn test_decompressed_source_is_copied() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("tool.sh");
        fs::write(&artifact, "#!/bin/sh\n").unwrap();
        let source = SourceSpec {
            uri: "https://example.org/tool.sh".to_string(),
            sha256: String::new(),
            decompressed: true,
        };

        let unpack_dir = dir.path().join("build/tool-1.0-1");
        let build_dir = unpack(&source, &artifact, &unpack_dir).unwrap();
        assert_eq!(build_dir, unpack_dir);
        assert_eq!(fs::read_to_string(unpack_dir.join("tool.sh")).unwrap(), "#!/bin/sh\n");
    }
}
