// src/package/identity.rs

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Separator between the parts of a canonical name
pub const SEPARATOR: char = '-';

/// The (name, version, release) triple naming one package instance
///
/// None of the parts may contain [`SEPARATOR`], so a canonical name always
/// splits back into exactly three parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageIdentity {
    pub name: String,
    pub version: String,
    pub release: String,
}

impl PackageIdentity {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        release: impl Into<String>,
    ) -> Result<Self> {
        let identity = Self {
            name: name.into(),
            version: version.into(),
            release: release.into(),
        };
        validate_part("name", &identity.name)?;
        validate_part("version", &identity.version)?;
        validate_part("release", &identity.release)?;
        Ok(identity)
    }

    /// `name-version-release`, used for database entries and archive names
    pub fn canonical_name(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.name,
            self.version,
            self.release,
            sep = SEPARATOR
        )
    }

    /// Recover an identity from its canonical name
    pub fn parse(canonical: &str) -> Result<Self> {
        let parts: Vec<&str> = canonical.split(SEPARATOR).collect();
        match parts.as_slice() {
            [name, version, release] => Self::new(*name, *version, *release),
            _ => Err(Error::InvalidIdentity(format!(
                "{:?} is not of the form name-version-release",
                canonical
            ))),
        }
    }
}

fn validate_part(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidIdentity(format!("{} is empty", field)));
    }
    if value.contains(SEPARATOR) {
        return Err(Error::InvalidIdentity(format!(
            "{} {:?} contains '{}'",
            field, value, SEPARATOR
        )));
    }
    if value == "." || value == ".." || value.contains('/') || value.chars().any(char::is_whitespace) {
        return Err(Error::InvalidIdentity(format!(
            "{} {:?} is not usable as a file name",
            field, value
        )));
    }
    Ok(())
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

impl FromStr for PackageIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
