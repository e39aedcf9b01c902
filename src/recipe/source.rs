// src/recipe/source.rs

//! Source entry resolution
//!
//! Each declared source is either `origin` or `name::origin`. The origin is a
//! URL with a recognized scheme or a local path; the destination filename is
//! the rename if one is given, otherwise the last path component of the
//! origin. Resolution is pure: nothing here touches the network or the
//! filesystem.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Schemes fetched as remote origins
pub const REMOTE_SCHEMES: [&str; 4] = ["http", "https", "ftp", "file"];

/// Rename delimiter in a source specifier
pub const RENAME_DELIMITER: &str = "::";

/// Where a source comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    /// URL with one of [`REMOTE_SCHEMES`]
    Remote(Url),
    /// Absolute local path
    Local(PathBuf),
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "{}", url),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A resolved source entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Position in the recipe's source list
    pub index: usize,
    /// Specifier as written in the recipe
    pub spec: String,
    /// File name inside the source directory
    pub filename: String,
    pub origin: SourceOrigin,
}

impl SourceEntry {
    /// Destination path inside a source directory
    pub fn destination(&self, srcdir: &Path) -> PathBuf {
        srcdir.join(&self.filename)
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.origin, SourceOrigin::Remote(_))
    }
}

/// Resolve every source specifier against the recipe directory
pub fn resolve_sources(specs: &[String], base_dir: &Path) -> Result<Vec<SourceEntry>> {
    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| resolve_source(index, spec, base_dir))
        .collect()
}

/// Resolve a single source specifier
pub fn resolve_source(index: usize, spec: &str, base_dir: &Path) -> Result<SourceEntry> {
    let (rename, origin_text) = match spec.rfind(RENAME_DELIMITER) {
        Some(pos) => (
            Some(&spec[..pos]),
            &spec[pos + RENAME_DELIMITER.len()..],
        ),
        None => (None, spec),
    };

    let origin = if has_remote_scheme(origin_text) {
        let url = Url::parse(origin_text).map_err(|e| {
            Error::RecipeInvalid(format!("source {} has an invalid URL: {}", index, e))
        })?;
        SourceOrigin::Remote(url)
    } else {
        let path = Path::new(origin_text);
        if path.is_absolute() {
            SourceOrigin::Local(path.to_path_buf())
        } else {
            SourceOrigin::Local(base_dir.join(path))
        }
    };

    let filename = match rename {
        Some(name) => basename(name),
        None => match &origin {
            SourceOrigin::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .map(str::to_string),
            SourceOrigin::Local(path) => path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string),
        },
    };

    let filename = filename
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .ok_or_else(|| {
            Error::RecipeInvalid(format!(
                "cannot derive a file name for source {} ({})",
                index, spec
            ))
        })?;

    Ok(SourceEntry {
        index,
        spec: spec.to_string(),
        filename,
        origin,
    })
}

/// Whether a specifier names a remote origin
pub fn has_remote_scheme(origin: &str) -> bool {
    origin
        .split_once("://")
        .is_some_and(|(scheme, _)| REMOTE_SCHEMES.iter().any(|s| scheme.eq_ignore_ascii_case(s)))
}

fn basename(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}
