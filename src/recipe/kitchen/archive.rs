// src/recipe/kitchen/archive.rs

//! Archive handling for the Kitchen
//!
//! Sources are probed by content, never by file name: a plain tar is
//! recognized by its `ustar` magic and a compressed file only counts as an
//! archive when its decompressed stream is a tar. Package archives are
//! xz-compressed tarballs with root ownership and sorted entries.

use crate::compression::{create_decoder, CompressionFormat};
use crate::error::{Error, Result};
use crate::recipe::format::Recipe;
use crate::recipe::source::SourceEntry;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;
use xz2::write::XzEncoder;

/// Size of a tar header block
const TAR_BLOCK: usize = 512;

/// Offset and value of the POSIX/GNU tar magic
const USTAR_OFFSET: usize = 257;
const USTAR_MAGIC: &[u8] = b"ustar";

/// xz preset used for package archives
const XZ_LEVEL: u32 = 6;

fn extraction_failed(path: &Path, reason: impl ToString) -> Error {
    Error::ExtractionFailed {
        file: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        reason: reason.to_string(),
    }
}

/// Read up to `limit` bytes from a reader
fn read_prefix<R: Read>(reader: R, limit: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(limit);
    reader.take(limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

fn is_tar_header(block: &[u8]) -> bool {
    block.len() >= USTAR_OFFSET + USTAR_MAGIC.len()
        && &block[USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len()] == USTAR_MAGIC
}

/// Probe a file for a recognized archive
///
/// Returns the compression wrapping the tar stream, or `None` when the file
/// is not an archive. A compressed stream that cannot be decoded is reported
/// as an extraction failure.
pub fn probe_archive(path: &Path) -> Result<Option<CompressionFormat>> {
    if !path.is_file() {
        return Ok(None);
    }

    let format = CompressionFormat::sniff_file(path)?;
    let file = BufReader::new(File::open(path)?);

    let block = match format {
        CompressionFormat::None => read_prefix(file, TAR_BLOCK)?,
        _ => {
            let decoder = create_decoder(file, format).map_err(|e| extraction_failed(path, e))?;
            read_prefix(decoder, TAR_BLOCK).map_err(|e| {
                extraction_failed(path, format!("corrupt {} stream: {}", format, e))
            })?
        }
    };

    Ok(is_tar_header(&block).then_some(format))
}

/// Extract a tar stream into `dest`, replacing existing files
pub fn extract_archive(path: &Path, format: CompressionFormat, dest: &Path) -> Result<()> {
    let file = BufReader::new(File::open(path)?);
    let decoder = create_decoder(file, format).map_err(|e| extraction_failed(path, e))?;

    let mut archive = tar::Archive::new(decoder);
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);
    archive
        .unpack(dest)
        .map_err(|e| extraction_failed(path, e))?;

    Ok(())
}

/// Extract every source archive not exempted by the recipe
pub fn extract_sources(recipe: &Recipe, entries: &[SourceEntry], srcdir: &Path) -> Result<()> {
    for entry in entries {
        if recipe.is_noextract(&entry.filename) {
            debug!("Not extracting {} (noextract)", entry.filename);
            continue;
        }

        let path = entry.destination(srcdir);
        match probe_archive(&path)? {
            Some(format) => {
                info!("Extracting {} with {}", entry.filename, format);
                extract_archive(&path, format, srcdir)?;
            }
            None => debug!("{} is not an archive", entry.filename),
        }
    }

    Ok(())
}

/// Timestamp from `SOURCE_DATE_EPOCH`, if set and valid
pub fn source_date_epoch() -> Option<u64> {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Archive the contents of `root` as a `.tar.xz` at `output`
///
/// Entry paths are relative to `root` and sorted. Owners are normalized to
/// root, and every mtime is replaced by `mtime` when given. The archive is
/// written to a temporary file next to `output` and renamed into place.
pub fn create_archive(root: &Path, output: &Path, mtime: Option<u64>) -> Result<()> {
    let failed = |reason: String| Error::ArchiveCreationFailed {
        path: output.to_path_buf(),
        reason,
    };

    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = NamedTempFile::new_in(parent)
        .map_err(|e| failed(format!("cannot create temporary file: {e}")))?;

    let encoder = XzEncoder::new(temp, XZ_LEVEL);
    let mut builder = tar::Builder::new(encoder);
    let mut count = 0usize;

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| failed(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| failed(e.to_string()))?;
        append_entry(&mut builder, entry.path(), relative, mtime)
            .map_err(|e| failed(format!("{}: {e}", relative.display())))?;
        count += 1;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| failed(e.to_string()))?;
    let temp = encoder.finish().map_err(|e| failed(e.to_string()))?;
    temp.persist(output)
        .map_err(|e| failed(e.error.to_string()))?;

    info!("Created {} ({} entries)", output.display(), count);
    Ok(())
}

fn append_entry<W: io::Write>(
    builder: &mut tar::Builder<W>,
    path: &Path,
    relative: &Path,
    mtime: Option<u64>,
) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    let file_type = metadata.file_type();

    let mut header = tar::Header::new_gnu();
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;
    header.set_mtime(mtime.unwrap_or_else(|| metadata.mtime().max(0) as u64));

    if file_type.is_dir() {
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(metadata.permissions().mode() & 0o7777);
        header.set_size(0);
        builder.append_data(&mut header, relative, io::empty())
    } else if file_type.is_symlink() {
        let target = fs::read_link(path)?;
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_mode(0o777);
        header.set_size(0);
        builder.append_link(&mut header, relative, target)
    } else if file_type.is_file() {
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(metadata.permissions().mode() & 0o7777);
        header.set_size(metadata.len());
        builder.append_data(&mut header, relative, File::open(path)?)
    } else {
        debug!("Skipping special file {}", path.display());
        Ok(())
    }
}
