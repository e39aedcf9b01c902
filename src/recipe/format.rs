// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Two layers live here. [`RecipeFile`] is the recipe exactly as written, with
//! every field optional so that both loaders (TOML and PKGBUILD) can fill it
//! in. [`Recipe`] is the validated model handed to the rest of the pipeline;
//! it is built once per invocation and never mutated afterwards.
//!
//! # Example Recipe
//!
//! ```toml
//! [package]
//! name = "hello"
//! version = "2.12"
//! release = 1
//! arch = ["x86_64"]
//! license = ["GPL-3.0-or-later"]
//!
//! [depends]
//! depends = ["glibc"]
//!
//! [source]
//! files = ["https://ftp.gnu.org/gnu/hello/hello-2.12.tar.gz"]
//! sha256sums = ["cf04af86dc085268c5f4470fbae49b18afbc221b78096aab842d934a76bad0ab"]
//!
//! [stages]
//! build = "cd hello-2.12 && ./configure --prefix=/usr && make"
//! package = { script = "package.sh" }
//! ```

use crate::error::Result;
use crate::hash::HashAlgorithm;
use crate::recipe::source::{resolve_sources, SourceEntry};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Checksum table value meaning "do not verify this source"
pub const SKIP_MARKER: &str = "SKIP";

/// A recipe as written on disk, before validation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecipeFile {
    /// Package identity and descriptive metadata
    pub package: PackageSection,

    /// Dependency relations
    pub depends: Dependencies,

    /// Sources, checksum tables and extraction exemptions
    pub source: SourceSection,

    /// Build stage hooks
    pub stages: StageHooks,
}

/// Package metadata section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackageSection {
    pub name: Option<String>,
    pub version: Option<String>,
    /// Release number; accepted as an integer or a numeric string
    pub release: Option<NumberField>,
    /// Epoch; defaults to 0
    pub epoch: Option<NumberField>,
    pub description: Option<String>,
    /// Upstream URL
    pub url: Option<String>,
    pub license: Vec<String>,
    pub groups: Vec<String>,
    /// Target architectures
    pub arch: Vec<String>,
    /// Files preserved across upgrades, relative to the install root
    pub backup: Vec<String>,
    /// Install script, relative to the recipe directory
    pub install: Option<PathBuf>,
    /// Changelog, relative to the recipe directory
    pub changelog: Option<PathBuf>,
}

/// A numeric recipe field that may be written with or without quotes
///
/// Any other TOML value is kept as `Other` so validation can reject it as an
/// invalid recipe rather than a syntax error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumberField {
    Integer(i64),
    Text(String),
    Other(toml::Value),
}

impl fmt::Display for NumberField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
            Self::Other(value) => write!(f, "{}", value),
        }
    }
}

/// Dependency relation lists
///
/// Order is preserved and duplicates are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Dependencies {
    /// Run-time dependencies
    pub depends: Vec<String>,
    /// Build-time dependencies
    pub makedepends: Vec<String>,
    /// Dependencies of the check stage
    pub checkdepends: Vec<String>,
    /// Optional dependencies
    pub optdepends: Vec<String>,
    pub conflicts: Vec<String>,
    pub provides: Vec<String>,
    pub replaces: Vec<String>,
}

/// Source section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    /// Source specifiers, optionally in `name::origin` form
    pub files: Vec<String>,
    /// Destination filenames exempt from extraction
    pub noextract: Vec<String>,
    pub md5sums: Option<Vec<String>>,
    pub sha1sums: Option<Vec<String>>,
    pub sha224sums: Option<Vec<String>>,
    pub sha256sums: Option<Vec<String>>,
    pub sha384sums: Option<Vec<String>>,
    pub sha512sums: Option<Vec<String>>,
    pub b2sums: Option<Vec<String>>,
}

impl SourceSection {
    /// Get the digest table declared for an algorithm
    pub fn checksum_table(&self, algorithm: HashAlgorithm) -> Option<&Vec<String>> {
        match algorithm {
            HashAlgorithm::Md5 => self.md5sums.as_ref(),
            HashAlgorithm::Sha1 => self.sha1sums.as_ref(),
            HashAlgorithm::Sha224 => self.sha224sums.as_ref(),
            HashAlgorithm::Sha256 => self.sha256sums.as_ref(),
            HashAlgorithm::Sha384 => self.sha384sums.as_ref(),
            HashAlgorithm::Sha512 => self.sha512sums.as_ref(),
            HashAlgorithm::Blake2 => self.b2sums.as_ref(),
        }
    }

    /// Get a mutable slot for an algorithm's digest table
    pub fn checksum_table_mut(&mut self, algorithm: HashAlgorithm) -> &mut Option<Vec<String>> {
        match algorithm {
            HashAlgorithm::Md5 => &mut self.md5sums,
            HashAlgorithm::Sha1 => &mut self.sha1sums,
            HashAlgorithm::Sha224 => &mut self.sha224sums,
            HashAlgorithm::Sha256 => &mut self.sha256sums,
            HashAlgorithm::Sha384 => &mut self.sha384sums,
            HashAlgorithm::Sha512 => &mut self.sha512sums,
            HashAlgorithm::Blake2 => &mut self.b2sums,
        }
    }
}

/// The named build stages, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Prepare,
    Build,
    Check,
    Package,
}

impl Stage {
    /// Get the stage name as a string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Build => "build",
            Self::Check => "check",
            Self::Package => "package",
        }
    }

    /// Whether a recipe must declare this stage for it to run
    pub const fn is_mandatory(&self) -> bool {
        matches!(self, Self::Build | Self::Package)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A build stage hook
///
/// Hooks are always run as separate processes. The only channels between
/// the pipeline and a hook are its working directory, its environment and
/// its exit status.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StageHook {
    /// Shell command line, run with `<shell> -c`
    Command(String),

    /// Executable file, relative to the recipe directory
    Script {
        script: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },

    /// Shell function defined in a file that is sourced first
    Function { source: PathBuf, function: String },
}

/// Stage hooks declared by a recipe
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StageHooks {
    pub prepare: Option<StageHook>,
    pub build: Option<StageHook>,
    pub check: Option<StageHook>,
    pub package: Option<StageHook>,
}

impl StageHooks {
    /// Get the hook declared for a stage
    pub fn get(&self, stage: Stage) -> Option<&StageHook> {
        match stage {
            Stage::Prepare => self.prepare.as_ref(),
            Stage::Build => self.build.as_ref(),
            Stage::Check => self.check.as_ref(),
            Stage::Package => self.package.as_ref(),
        }
    }
}

/// A validated recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub name: String,
    pub version: String,
    /// Positive release number
    pub release: u32,
    pub epoch: u32,
    pub description: Option<String>,
    pub url: Option<String>,
    pub license: Vec<String>,
    pub groups: Vec<String>,
    /// Non-empty, duplicate-free, in declaration order
    pub arch: Vec<String>,
    pub backup: Vec<String>,
    pub depends: Dependencies,
    /// Raw source specifiers
    pub sources: Vec<String>,
    /// Declared digest tables, aligned with `sources`
    pub checksums: BTreeMap<HashAlgorithm, Vec<String>>,
    /// Strongest algorithm with a non-empty table, if any
    pub active_checksum: Option<HashAlgorithm>,
    pub noextract: BTreeSet<String>,
    pub install: Option<PathBuf>,
    pub changelog: Option<PathBuf>,
    pub stages: StageHooks,
    /// Absolute directory containing the recipe file
    pub base_dir: PathBuf,
}

impl Recipe {
    /// Resolve the source list into source entries
    pub fn source_entries(&self) -> Result<Vec<SourceEntry>> {
        resolve_sources(&self.sources, &self.base_dir)
    }

    /// Get the declared digest for the source at `index` under the active algorithm
    pub fn expected_digest(&self, index: usize) -> Option<&str> {
        let algorithm = self.active_checksum?;
        self.checksums
            .get(&algorithm)
            .and_then(|table| table.get(index))
            .map(String::as_str)
    }

    /// Whether a destination filename is exempt from extraction
    pub fn is_noextract(&self, filename: &str) -> bool {
        self.noextract.contains(filename)
    }

    /// Full version string: `[epoch:]version-release`
    pub fn full_version(&self) -> String {
        if self.epoch > 0 {
            format!("{}:{}-{}", self.epoch, self.version, self.release)
        } else {
            format!("{}-{}", self.version, self.release)
        }
    }

    /// File name of the package archive
    pub fn archive_filename(&self) -> String {
        format!("{}.tar.xz", self.name)
    }

    /// Name the install script gets inside the package directory
    pub fn install_filename(&self) -> String {
        format!(".{}.install", self.name)
    }

    /// Name the changelog gets inside the package directory
    pub fn changelog_filename(&self) -> String {
        format!(".{}.changelog", self.name)
    }
}
