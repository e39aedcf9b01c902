// src/recipe/kitchen/package.rs

//! Packaging: turn a populated package directory into an archive
//!
//! The package hook runs first, then the recipe's install script and
//! changelog are copied in, the manifest is written, and the whole directory
//! is archived next to it as `<name>.tar.xz`.

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::manifest::{Manifest, MANIFEST_FILENAME};
use crate::recipe::format::{Recipe, Stage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::archive::{create_archive, source_date_epoch};
use super::stages::{BuildContext, StageRunner};

/// Run the package stage and produce the archive
///
/// Returns the absolute path of the archive.
pub fn package_recipe(
    recipe: &Recipe,
    context: &BuildContext,
    config: &PipelineConfig,
) -> Result<PathBuf> {
    let pkgdir = &context.pkgdir;
    fs::create_dir_all(&context.srcdir)?;
    fs::create_dir_all(pkgdir)?;

    StageRunner::new(config, context).run_declared(recipe, Stage::Package)?;

    if let Some(install) = &recipe.install {
        copy_auxiliary(recipe, install, &pkgdir.join(recipe.install_filename()))?;
    }
    if let Some(changelog) = &recipe.changelog {
        copy_auxiliary(recipe, changelog, &pkgdir.join(recipe.changelog_filename()))?;
    }

    let manifest_path = pkgdir.join(MANIFEST_FILENAME);
    Manifest::from_recipe(recipe)
        .write_to(&manifest_path)
        .map_err(|e| Error::ArchiveCreationFailed {
            path: manifest_path.clone(),
            reason: e.to_string(),
        })?;
    info!("Generated {}", MANIFEST_FILENAME);

    let archive = archive_path(recipe, pkgdir)?;
    create_archive(pkgdir, &archive, source_date_epoch())?;

    info!("Finished making {} {}", recipe.name, recipe.full_version());
    Ok(archive)
}

/// Archive location: beside the package directory
pub fn archive_path(recipe: &Recipe, pkgdir: &Path) -> Result<PathBuf> {
    let parent = pkgdir
        .parent()
        .ok_or_else(|| Error::ArchiveCreationFailed {
            path: pkgdir.to_path_buf(),
            reason: "package directory has no parent".to_string(),
        })?;
    Ok(parent.join(recipe.archive_filename()))
}

fn copy_auxiliary(recipe: &Recipe, relative: &Path, dest: &Path) -> Result<()> {
    let source = recipe.base_dir.join(relative);
    if !source.is_file() {
        return Err(Error::SourceNotFound(source));
    }
    fs::copy(&source, dest)?;
    info!("Copied {} to {}", relative.display(), dest.display());
    Ok(())
}
