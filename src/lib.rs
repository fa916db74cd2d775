// src/lib.rs

//! mypkg
//!
//! Source-based package manager: builds a package from a declarative
//! description, archives the result together with a manifest of its files,
//! and installs and removes it on a single host.
//!
//! # Architecture
//!
//! - Manifest-first: every installed package is a `files.xml` record in the
//!   package database, with one SHA-256 hash per file
//! - Secure extraction: every archive entry is resolved inside the target
//!   directory before anything is written
//! - Self-healing installs: files whose hash does not match after
//!   extraction are deleted and reported
//! - No global state: a resolved [`config::Config`] is passed to every
//!   operation

pub mod archive;
pub mod build_info;
pub mod config;
mod error;
pub mod fetch;
pub mod hash;
pub mod lifecycle;
pub mod manifest;
pub mod package;
pub mod shell;

pub use error::{Error, ErrorKind, Result};
