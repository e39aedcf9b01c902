// src/lib.rs

//! mixpkg: build recipes into package archives
//!
//! A recipe names a package, its sources with their checksums, and the shell
//! hooks that build it. The pipeline runs in a fixed order:
//!
//! - Load: parse and validate the recipe (TOML or PKGBUILD-style)
//! - Download: fetch or copy each source, verify signatures and checksums,
//!   and unpack archives
//! - Build: run the `prepare`, `build` and `check` hooks
//! - Package: run the `package` hook, write `.MANIFEST` and create
//!   `<name>.tar.xz` beside the package directory
//!
//! See [`recipe::Kitchen`] for the entry points.

pub mod compression;
pub mod config;
mod error;
pub mod hash;
pub mod manifest;
pub mod recipe;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use hash::HashAlgorithm;
pub use manifest::Manifest;
pub use recipe::{load_recipe, BuildDirs, Kitchen, PackageMode, Recipe};
