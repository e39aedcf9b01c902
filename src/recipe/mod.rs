// src/recipe/mod.rs

//! Recipe system for building packages from source
//!
//! Recipes define how to build a package from source, including:
//! - Package identity and metadata
//! - Source files, their checksums and detached signatures
//! - Dependency relations recorded in the package manifest
//! - Build stage hooks (prepare, build, check, package)
//!
//! # Culinary Terminology
//!
//! - **Recipe**: The build specification (like a recipe card)
//! - **Kitchen**: Runs a recipe through the pipeline
//! - **Ingredients**: Source files, fetched into the source directory
//! - **Prep**: Acquire, verify and extract sources
//! - **Cook**: Run the prepare, build and check stages
//! - **Plate**: Run the package stage and produce the archive
//!
//! Recipes are written either as TOML (`*.toml`) or as PKGBUILD-style shell
//! files. See [`format`] for the TOML layout and [`pkgbuild`] for the subset
//! of PKGBUILD syntax that is understood.

pub mod format;
pub mod kitchen;
pub mod parser;
pub mod pkgbuild;
pub mod source;

pub use format::{Dependencies, Recipe, RecipeFile, Stage, StageHook, StageHooks, SKIP_MARKER};
pub use kitchen::{BuildDirs, Kitchen, PackageMode};
pub use parser::{load_recipe, parse_recipe, recipe_warnings, validate_recipe, RecipeSyntax};
pub use source::{resolve_sources, SourceEntry, SourceOrigin};
