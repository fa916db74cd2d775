// src/config.rs

//! Layered configuration
//!
//! Resolution order: built-in defaults, then the YAML config file
//! (`--config PATH`, else `~/.mypkg.yaml` when present), then `MYPKG_*`
//! environment variables. Command-line flags are applied last by the caller.
//! The resolved [`Config`] is passed explicitly to every lifecycle operation.

use crate::archive::{ArchiveKind, CompressionKind};
use crate::error::{Error, Result};
use crate::package::PackageIdentity;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the per-user config file in the home directory
pub const CONFIG_FILE_NAME: &str = ".mypkg.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Where sources are unpacked and built
    pub build_dir: PathBuf,
    /// Staging root that `make install DESTDIR=...` writes into
    pub install_dir: PathBuf,
    /// Package database: one directory per installed package
    pub db_dir: PathBuf,
    /// Installation prefix, e.g. `/usr/local`
    pub prefix: PathBuf,
    /// Filesystem root packages are installed under
    pub root: PathBuf,
    /// Cache of fetched source artifacts
    pub download_dir: PathBuf,
    /// Where built archives are written
    pub output_dir: PathBuf,
    /// Extra `KEY=VALUE` pairs exported to build steps
    pub environment: Vec<String>,
    pub archival: ArchiveKind,
    pub compression: CompressionKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("/tmp/mypkg/build"),
            install_dir: PathBuf::from("/tmp/mypkg/install"),
            db_dir: PathBuf::from("/var/lib/mypkg"),
            prefix: PathBuf::from("/usr/local"),
            root: PathBuf::from("/"),
            download_dir: PathBuf::from("/tmp/mypkg/downloads"),
            output_dir: PathBuf::from("."),
            environment: Vec::new(),
            archival: ArchiveKind::Tar,
            compression: CompressionKind::Xz,
        }
    }
}

impl Config {
    /// Resolve defaults, config file and environment
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::ConfigError(format!(
                        "config file {} does not exist",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => dirs::home_dir()
                .map(|home| home.join(CONFIG_FILE_NAME))
                .filter(|path| path.exists()),
        };

        let mut config = match path {
            Some(path) => {
                debug!("Using config file: {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("read config {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&raw)
            .map_err(|e| Error::ConfigError(format!("parse config {}: {}", path.display(), e)))
    }

    pub fn from_yaml(raw: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // An empty file deserializes as null
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Overlay `MYPKG_*` values from the environment (or any other lookup)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let paths: [(&str, &mut PathBuf); 7] = [
            ("MYPKG_BUILD_DIR", &mut self.build_dir),
            ("MYPKG_INSTALL_DIR", &mut self.install_dir),
            ("MYPKG_DB_DIR", &mut self.db_dir),
            ("MYPKG_PREFIX", &mut self.prefix),
            ("MYPKG_ROOT", &mut self.root),
            ("MYPKG_DOWNLOAD_DIR", &mut self.download_dir),
            ("MYPKG_OUTPUT_DIR", &mut self.output_dir),
        ];
        for (key, field) in paths {
            if let Some(value) = lookup(key) {
                *field = PathBuf::from(value);
            }
        }

        if let Some(value) = lookup("MYPKG_ENVIRONMENT") {
            self.environment = value
                .split(',')
                .map(|entry| entry.trim())
                .filter(|entry| !entry.is_empty())
                .map(|entry| entry.to_string())
                .collect();
        }
        if let Some(value) = lookup("MYPKG_ARCHIVAL") {
            self.archival = value
                .parse()
                .map_err(|e| Error::ConfigError(format!("invalid MYPKG_ARCHIVAL {}: {}", value, e)))?;
        }
        if let Some(value) = lookup("MYPKG_COMPRESSION") {
            self.compression = value.parse().map_err(|e| {
                Error::ConfigError(format!("invalid MYPKG_COMPRESSION {}: {}", value, e))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.prefix.is_absolute() {
            return Err(Error::ConfigError(format!(
                "prefix must be absolute, got {}",
                self.prefix.display()
            )));
        }
        if !self.root.is_absolute() {
            return Err(Error::ConfigError(format!(
                "root must be absolute, got {}",
                self.root.display()
            )));
        }
        if !self.compression.can_encode() {
            return Err(Error::ConfigError(format!(
                "compression {} can be read but not written",
                self.compression
            )));
        }
        for entry in &self.environment {
            match entry.split_once('=') {
                Some((key, _)) if !key.is_empty() => {}
                _ => {
                    return Err(Error::ConfigError(format!(
                        "environment entry {:?} is not KEY=VALUE",
                        entry
                    )));
                }
            }
        }
        Ok(())
    }

    /// The prefix without its leading `/`, e.g. `usr/local`
    pub fn prefix_relative(&self) -> &Path {
        self.prefix.strip_prefix("/").unwrap_or(&self.prefix)
    }

    /// The prefix as seen under `root`
    pub fn live_prefix(&self) -> PathBuf {
        self.root.join(self.prefix_relative())
    }

    /// The prefix as seen under the staging root
    pub fn staged_prefix(&self) -> PathBuf {
        self.install_dir.join(self.prefix_relative())
    }

    /// Database directory of an installed package
    pub fn db_entry(&self, identity: &PackageIdentity) -> PathBuf {
        self.db_dir.join(identity.canonical_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_legacy_keys() {
        let config = Config::from_yaml(
            "buildDir: /var/tmp/build\ninstallDir: /var/tmp/install\ndbDir: /var/db/mypkg\nprefix: /opt\nenvironment:\n  - CFLAGS=-O2\n",
        )
        .unwrap();
        assert_eq!(config.build_dir, PathBuf::from("/var/tmp/build"));
        assert_eq!(config.install_dir, PathBuf::from("/var/tmp/install"));
        assert_eq!(config.db_dir, PathBuf::from("/var/db/mypkg"));
        assert_eq!(config.prefix, PathBuf::from("/opt"));
        assert_eq!(config.environment, vec!["CFLAGS=-O2"]);
        assert_eq!(config.root, PathBuf::from("/"));
        assert_eq!(config.compression, CompressionKind::Xz);
    }

    #[test]
    fn test_kinds_by_extension_name() {
        let config = Config::from_yaml("archival: zip\ncompression: zst\n").unwrap();
        assert_eq!(config.archival, ArchiveKind::Zip);
        assert_eq!(config.compression, CompressionKind::Zstd);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(Config::from_yaml("installDBDir: /x\n").is_err());
    }

    #[test]
    fn test_empty_file_means_defaults() {
        assert_eq!(Config::from_yaml("\n").unwrap(), Config::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MYPKG_DB_DIR", "/srv/db"),
            ("MYPKG_ENVIRONMENT", "CC=clang, NBJOBS=8,"),
            ("MYPKG_COMPRESSION", "gzip"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.db_dir, PathBuf::from("/srv/db"));
        assert_eq!(config.environment, vec!["CC=clang", "NBJOBS=8"]);
        assert_eq!(config.compression, CompressionKind::Gzip);
        assert_eq!(config.prefix, PathBuf::from("/usr/local"));
    }

    #[test]
    fn test_bad_env_kind_is_a_config_error() {
        let mut config = Config::default();
        let result = config.apply_env_overrides(|key| {
            (key == "MYPKG_ARCHIVAL").then(|| "rar".to_string())
        });
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = Config::load(Some(&dir.path().join("nope.yaml")));
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_explicit_file_is_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mypkg.yaml");
        fs::write(&path, "prefix: /opt/tools\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.prefix, PathBuf::from("/opt/tools"));
    }

    #[test]
    fn test_validate() {
        Config::default().validate().unwrap();

        let relative = Config {
            prefix: PathBuf::from("usr/local"),
            ..Config::default()
        };
        assert!(matches!(relative.validate(), Err(Error::ConfigError(_))));

        let bad_env = Config {
            environment: vec!["JUSTAKEY".to_string()],
            ..Config::default()
        };
        assert!(matches!(bad_env.validate(), Err(Error::ConfigError(_))));

        let lzip = Config {
            compression: CompressionKind::Lzip,
            ..Config::default()
        };
        assert!(matches!(lzip.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_derived_paths() {
        let config = Config {
            root: PathBuf::from("/mnt/sysroot"),
            install_dir: PathBuf::from("/tmp/stage"),
            db_dir: PathBuf::from("/var/db"),
            ..Config::default()
        };
        assert_eq!(config.prefix_relative(), Path::new("usr/local"));
        assert_eq!(config.live_prefix(), PathBuf::from("/mnt/sysroot/usr/local"));
        assert_eq!(config.staged_prefix(), PathBuf::from("/tmp/stage/usr/local"));
        let id = PackageIdentity::new("htop", "3.0.5", "1").unwrap();
        assert_eq!(config.db_entry(&id), PathBuf::from("/var/db/htop-3.0.5-1"));
    }
}
