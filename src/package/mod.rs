// src/package/mod.rs

//! Package identity and descriptions

mod description;
mod identity;

pub use description::{PackageDescription, SourceSpec, scaffold};
pub use identity::{PackageIdentity, SEPARATOR};
