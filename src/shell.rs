// src/shell.rs

//! Build-step execution
//!
//! Each lifecycle step (setup, build, install) runs as one `/bin/sh -c`
//! session with `set -xe`, so the first failing command ends the step.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::package::PackageIdentity;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Commands a single `$macro` line expands to
pub const MACROS: &[(&str, &str)] = &[
    ("$configure", "./configure ${CONF_OPTS}"),
    ("$make", "make -j${NBJOBS-1} ${MAKE_OPTS}"),
    (
        "$make_install",
        "make install DESTDIR=${INSTALL_DIR-${prefix}} ${MAKE_INSTALL_OPTS}",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Setup,
    Build,
    Install,
}

impl Step {
    pub fn as_str(&self) -> &str {
        match self {
            Step::Setup => "setup",
            Step::Build => "build",
            Step::Install => "install",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variables every build step sees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvironment {
    pub prefix: PathBuf,
    pub build_dir: PathBuf,
    pub install_dir: PathBuf,
    pub pkg_name: String,
    pub pkg_build_dir: PathBuf,
    /// Caller-declared `KEY=VALUE` pairs, split
    pub extra: Vec<(String, String)>,
}

impl BuildEnvironment {
    pub fn new(config: &Config, identity: &PackageIdentity, pkg_build_dir: &Path) -> Self {
        let extra = config
            .environment
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        Self {
            prefix: config.prefix.clone(),
            build_dir: config.build_dir.clone(),
            install_dir: config.install_dir.clone(),
            pkg_name: identity.canonical_name(),
            pkg_build_dir: pkg_build_dir.to_path_buf(),
            extra,
        }
    }

    /// `FULL_INSTALL_DIR`: the prefix as laid out under the staging root
    pub fn full_install_dir(&self) -> PathBuf {
        self.install_dir
            .join(self.prefix.strip_prefix("/").unwrap_or(&self.prefix))
    }

    /// Fixed variables first, then the extras in declaration order
    pub fn vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("PREFIX".to_string(), self.prefix.display().to_string()),
            ("BUILD_DIR".to_string(), self.build_dir.display().to_string()),
            ("INSTALL_DIR".to_string(), self.install_dir.display().to_string()),
            (
                "FULL_INSTALL_DIR".to_string(),
                self.full_install_dir().display().to_string(),
            ),
            ("PKG_NAME".to_string(), self.pkg_name.clone()),
            (
                "PKG_BUILD_DIR".to_string(),
                self.pkg_build_dir.display().to_string(),
            ),
        ];
        vars.extend(self.extra.iter().cloned());
        vars
    }
}

/// Expand `$macro` lines; any other line is passed through unchanged
///
/// A line that is a single lower-case `$word` is a macro reference and must
/// name a known macro. Lines like `$CC -o x x.c` are ordinary commands.
pub fn expand_macros(commands: &[String]) -> Result<Vec<String>> {
    commands
        .iter()
        .map(|command| {
            let trimmed = command.trim();
            if !is_macro_reference(trimmed) {
                return Ok(command.clone());
            }
            MACROS
                .iter()
                .find(|(name, _)| *name == trimmed)
                .map(|(_, expansion)| expansion.to_string())
                .ok_or_else(|| Error::ParseError(format!("unknown macro {}", trimmed)))
        })
        .collect()
}

fn is_macro_reference(line: &str) -> bool {
    line.strip_prefix('$').is_some_and(|word| {
        !word.is_empty() && word.chars().all(|c| c.is_ascii_lowercase() || c == '_')
    })
}

/// Runs the command list of one lifecycle step
pub trait StepRunner {
    fn run(&self, step: Step, commands: &[String], dir: &Path, env: &BuildEnvironment)
    -> Result<()>;
}

/// Runs steps through a POSIX shell
pub struct ShellRunner {
    shell: PathBuf,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl StepRunner for ShellRunner {
    fn run(
        &self,
        step: Step,
        commands: &[String],
        dir: &Path,
        env: &BuildEnvironment,
    ) -> Result<()> {
        if commands.is_empty() {
            debug!("No {} commands", step);
            return Ok(());
        }

        let expanded = expand_macros(commands)?;
        let script = format!("set -xe\n{}\n", expanded.join("\n"));
        info!("Running {} step in {}", step, dir.display());
        debug!("{} script:\n{}", step, script);

        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(&script)
            .current_dir(dir)
            .envs(env.vars())
            .status()
            .map_err(|e| Error::BuildStepFailed {
                step: step.to_string(),
                status: format!("could not start {}: {}", self.shell.display(), e),
            })?;

        if !status.success() {
            return Err(Error::BuildStepFailed {
                step: step.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}
