// src/recipe/parser.rs

//! Recipe loading and validation
//!
//! Loading never executes recipe code. TOML recipes are deserialized and
//! PKGBUILD files are scanned statically; both produce a [`RecipeFile`] that is
//! validated into a [`Recipe`] before anything else touches the filesystem.

use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use crate::recipe::format::{NumberField, Recipe, RecipeFile};
use crate::recipe::pkgbuild::parse_pkgbuild;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Syntax of a recipe file, chosen by file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeSyntax {
    /// `*.toml`
    Toml,
    /// Anything else is treated as a PKGBUILD-style shell file
    Pkgbuild,
}

impl RecipeSyntax {
    /// Pick the syntax for a recipe path
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Pkgbuild,
        }
    }
}

/// Load, parse and validate a recipe file
///
/// Non-fatal findings are logged as warnings.
pub fn load_recipe(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let syntax = RecipeSyntax::detect(path);
    debug!("Loading {:?} recipe from {}", syntax, path.display());

    let raw = match syntax {
        RecipeSyntax::Toml => parse_recipe(&content, path)?,
        RecipeSyntax::Pkgbuild => parse_pkgbuild(&content, path)?,
    };

    let base_dir = recipe_base_dir(path)?;
    let recipe = validate_recipe(raw, base_dir)?;

    for warning in recipe_warnings(&recipe) {
        warn!("{}: {}", path.display(), warning);
    }

    Ok(recipe)
}

/// Parse a TOML recipe into its raw form
pub fn parse_recipe(content: &str, path: &Path) -> Result<RecipeFile> {
    toml::from_str(content).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Absolute directory containing the recipe
///
/// Symlinks are not resolved: a linked recipe builds from the directory it
/// was named in.
fn recipe_base_dir(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    Ok(absolute
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/")))
}

/// Validate a raw recipe
///
/// Fields are checked in a fixed order (name, version, release, epoch, arch)
/// and the first violation is reported.
pub fn validate_recipe(raw: RecipeFile, base_dir: PathBuf) -> Result<Recipe> {
    let RecipeFile {
        package,
        depends,
        source,
        stages,
    } = raw;

    let name = required_text(package.name, "name")?;
    let version = required_text(package.version, "version")?;
    if let Some(c) = version.chars().find(|c| c.is_whitespace() || *c == '-' || *c == ':') {
        return Err(Error::RecipeInvalid(format!(
            "version '{}' contains invalid character '{}'",
            version, c
        )));
    }

    let release = match package.release {
        None => return Err(Error::RecipeInvalid("release is missing".to_string())),
        Some(field) => match parse_number(&field) {
            Some(n) if n > 0 => n,
            _ => {
                return Err(Error::RecipeInvalid(format!(
                    "release must be a positive integer, got '{}'",
                    field
                )));
            }
        },
    };

    let epoch = match package.epoch {
        None => 0,
        Some(field) => parse_number(&field).ok_or_else(|| {
            Error::RecipeInvalid(format!(
                "epoch must be a non-negative integer, got '{}'",
                field
            ))
        })?,
    };

    let mut seen = BTreeSet::new();
    let arch: Vec<String> = package
        .arch
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .filter(|a| seen.insert(a.clone()))
        .collect();
    if arch.is_empty() {
        return Err(Error::RecipeInvalid(
            "arch must list at least one architecture".to_string(),
        ));
    }

    let mut checksums = BTreeMap::new();
    for algorithm in HashAlgorithm::ALL {
        if let Some(table) = source.checksum_table(algorithm) {
            checksums.insert(algorithm, table.clone());
        }
    }
    let active_checksum = checksums
        .iter()
        .filter(|(_, table)| !table.is_empty())
        .map(|(algorithm, _)| *algorithm)
        .max();

    Ok(Recipe {
        name,
        version,
        release,
        epoch,
        description: package.description.filter(|d| !d.trim().is_empty()),
        url: package.url.filter(|u| !u.trim().is_empty()),
        license: package.license,
        groups: package.groups,
        arch,
        backup: package.backup,
        depends,
        sources: source.files,
        checksums,
        active_checksum,
        noextract: source.noextract.into_iter().collect(),
        install: package.install,
        changelog: package.changelog,
        stages,
        base_dir,
    })
}

fn required_text(value: Option<String>, field: &str) -> Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::RecipeInvalid(format!("{} is missing", field))),
    }
}

fn parse_number(field: &NumberField) -> Option<u32> {
    match field {
        NumberField::Integer(n) => u32::try_from(*n).ok(),
        NumberField::Text(s) => s.trim().parse().ok(),
        NumberField::Other(_) => None,
    }
}

/// Collect non-fatal problems with a validated recipe
pub fn recipe_warnings(recipe: &Recipe) -> Vec<String> {
    let mut warnings = Vec::new();

    if recipe.description.is_none() {
        warnings.push("Missing package description".to_string());
    }
    if recipe.license.is_empty() {
        warnings.push("Missing package license".to_string());
    }

    match recipe.active_checksum {
        None if !recipe.sources.is_empty() => {
            warnings.push("No checksums declared; sources will not be verified".to_string());
        }
        None => {}
        Some(algorithm) => {
            let declared = recipe.checksums.get(&algorithm).map_or(0, Vec::len);
            if declared != recipe.sources.len() {
                warnings.push(format!(
                    "{} has {} entries for {} sources",
                    algorithm.table_key(),
                    declared,
                    recipe.sources.len()
                ));
            }
        }
    }

    warnings
}
