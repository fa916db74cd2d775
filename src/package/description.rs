// src/package/description.rs

//! Declarative package descriptions
//!
//! ```yaml
//! name     : htop
//! version  : 3.0.5
//! release  : 1
//! homePage : https://htop.dev/
//! licence  : GPL-2.0-or-later
//! source   :
//!   uri: https://github.com/htop-dev/htop/archive/3.0.5.tar.gz
//!   sha256: 4c2629bd50895bd24082ba2f81f8c972348aa2298cc6edc6a21a7fa18b73990c
//! setup    :
//!   - ./autogen.sh
//!   - $configure
//! build    :
//!   - $make
//! install  :
//!   - $make_install
//! ```

use super::PackageIdentity;
use crate::error::{Error, Result};
use crate::shell::expand_macros;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Where the upstream source comes from and what it must hash to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceSpec {
    pub uri: String,
    pub sha256: String,
    /// The artifact is used as-is instead of being unpacked
    #[serde(default)]
    pub decompressed: bool,
}

impl SourceSpec {
    /// Last path segment of the uri, without any query string
    pub fn file_name(&self) -> String {
        let without_query = self.uri.split(['?', '#']).next().unwrap_or_default();
        without_query
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or("source")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDescription {
    #[serde(deserialize_with = "scalar_string")]
    pub name: String,
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(deserialize_with = "scalar_string")]
    pub release: String,
    pub source: SourceSpec,
    #[serde(default)]
    pub licence: String,
    #[serde(default)]
    pub home_page: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub setup: Vec<String>,
    #[serde(default)]
    pub build: Vec<String>,
    #[serde(default)]
    pub install: Vec<String>,
}

/// Accept bare YAML numbers (`release: 1`) where a string is expected
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string, found {:?}",
            other
        ))),
    }
}

impl PackageDescription {
    /// Load a description file, apply `MYPKG_PKG_*` overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        info!("Using package description file: {}", path.display());

        let raw = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFoundError(format!("description file {}", path.display()))
            } else {
                Error::IoError(format!("Failed to read {}: {}", path.display(), e))
            }
        })?;

        let mut description = Self::from_yaml(&raw)?;
        description.apply_overrides(|key| std::env::var(key).ok());
        description.validate()?;
        Ok(description)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|e| Error::ParseError(format!("Invalid package description: {}", e)))
    }

    /// Overlay values from the environment (or any other lookup)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut String); 4] = [
            ("MYPKG_PKG_VERSION", &mut self.version),
            ("MYPKG_PKG_RELEASE", &mut self.release),
            ("MYPKG_PKG_SOURCE_URI", &mut self.source.uri),
            ("MYPKG_PKG_SOURCE_SHA256", &mut self.source.sha256),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key) {
                debug!("{} overrides description value", key);
                *field = value;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.identity()?;

        if self.source.uri.trim().is_empty() {
            return Err(Error::ParseError(format!("{}: source.uri is empty", self.name)));
        }
        let sha = self.source.sha256.trim();
        if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::ParseError(format!(
                "{}: source.sha256 must be 64 hex characters",
                self.name
            )));
        }

        for commands in [&self.setup, &self.build, &self.install] {
            expand_macros(commands)?;
        }
        Ok(())
    }

    pub fn identity(&self) -> Result<PackageIdentity> {
        PackageIdentity::new(&self.name, &self.version, &self.release)
    }
}

/// Starter description printed by `mypkg fetch`
pub fn scaffold(name: &str, version: &str, release: &str, uri: &str, sha256: &str) -> String {
    format!(
        "---
name     : {name}
version  : {version}
release  : {release}
source   :
  uri: {uri}
  sha256: {sha256}
setup    :
  - $configure
build    :
  - $make
install  :
  - $make_install
"
    )
}
