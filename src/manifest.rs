// src/manifest.rs
//! Package manifest (.MANIFEST)
//!
//! The manifest is a flat TOML document describing the declared metadata of
//! a package. It is derived from the recipe alone, so building the same
//! recipe twice yields the same manifest no matter what the build produced.
//!
//! ```toml
//! name = "foo"
//! version = "1.0"
//! release = "1"
//! epoch = "0"
//! description = "An example"
//! url = ""
//! arch = ["x86_64"]
//! license = ["MIT"]
//! groups = []
//! backup = []
//! depends = ["glibc"]
//! makedepends = []
//! checkdepends = []
//! optdepends = []
//! conflicts = []
//! provides = []
//! replaces = []
//! ```

use crate::recipe::Recipe;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// File name of the manifest inside the package directory
pub const MANIFEST_FILENAME: &str = ".MANIFEST";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize manifest: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Package manifest
///
/// Field order is the serialization order. Numbers are kept as strings so
/// every scalar in the file is quoted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub release: String,
    pub epoch: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub arch: Vec<String>,
    #[serde(default)]
    pub license: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub backup: Vec<String>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub makedepends: Vec<String>,
    #[serde(default)]
    pub checkdepends: Vec<String>,
    #[serde(default)]
    pub optdepends: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub replaces: Vec<String>,
}

impl Manifest {
    /// Derive the manifest from a recipe
    pub fn from_recipe(recipe: &Recipe) -> Self {
        let deps = &recipe.depends;
        Self {
            name: recipe.name.clone(),
            version: recipe.version.clone(),
            release: recipe.release.to_string(),
            epoch: recipe.epoch.to_string(),
            description: recipe.description.clone().unwrap_or_default(),
            url: recipe.url.clone().unwrap_or_default(),
            arch: recipe.arch.clone(),
            license: recipe.license.clone(),
            groups: recipe.groups.clone(),
            backup: recipe.backup.clone(),
            depends: deps.depends.clone(),
            makedepends: deps.makedepends.clone(),
            checkdepends: deps.checkdepends.clone(),
            optdepends: deps.optdepends.clone(),
            conflicts: deps.conflicts.clone(),
            provides: deps.provides.clone(),
            replaces: deps.replaces.clone(),
        }
    }

    /// Load manifest from a file path
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse manifest from a TOML string
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the identity fields
    pub fn validate(&self) -> Result<(), ManifestError> {
        for (field, value) in [
            ("name", &self.name),
            ("version", &self.version),
            ("release", &self.release),
        ] {
            if value.is_empty() {
                return Err(ManifestError::MissingField(field.to_string()));
            }
        }
        Ok(())
    }

    /// Serialize to TOML, one `key = value` per line
    pub fn to_toml(&self) -> Result<String, ManifestError> {
        Ok(toml::to_string(self)?)
    }

    /// Write the manifest to a file
    pub fn write_to(&self, path: &Path) -> Result<(), ManifestError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}
