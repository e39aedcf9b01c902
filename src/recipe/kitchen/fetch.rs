// src/recipe/kitchen/fetch.rs

//! Source acquisition
//!
//! Every source ends up as `<srcdir>/<filename>`. A destination that already
//! exists is never fetched again, so a run that failed half way can simply be
//! repeated. Remote origins go through a [`Fetcher`]; local origins are
//! copied.

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::recipe::source::{SourceEntry, SourceOrigin};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};
use url::Url;
use walkdir::WalkDir;

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Retrieves remote origins
pub trait Fetcher {
    /// Fetch `url` so that `dest` exists afterwards with the full content
    fn fetch(&self, url: &Url, dest: &Path) -> Result<()>;
}

/// Fetcher backed by reqwest for HTTP(S) and curl for FTP
pub struct NetworkFetcher {
    client: Client,
    curl: String,
}

impl NetworkFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("mixpkg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            curl: config.curl.clone(),
        })
    }

    fn fetch_http(&self, url: &Url, dest: &Path) -> Result<()> {
        let failed = |reason: String| Error::FetchFailed {
            url: url.to_string(),
            reason,
        };

        let mut response = self
            .client
            .get(url.as_str())
            .send()
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        let part = partial_path(dest);
        let mut file = File::create(&part)?;
        let progress = response.content_length().map(|len| progress_bar(len, dest));

        let mut downloaded: u64 = 0;
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let bytes_read = match response.read(&mut buffer) {
                Ok(n) => n,
                Err(e) => {
                    drop(file);
                    let _ = fs::remove_file(&part);
                    return Err(failed(format!("failed to read response: {e}")));
                }
            };
            if bytes_read == 0 {
                break;
            }
            file.write_all(&buffer[..bytes_read])?;
            downloaded += bytes_read as u64;
            if let Some(pb) = &progress {
                pb.set_position(downloaded);
            }
        }
        file.sync_all()?;
        drop(file);

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        fs::rename(&part, dest)?;
        info!("Downloaded {} bytes to {}", downloaded, dest.display());
        Ok(())
    }

    fn fetch_ftp(&self, url: &Url, dest: &Path) -> Result<()> {
        let part = partial_path(dest);
        debug!("Running {} for {}", self.curl, url);

        let output = Command::new(&self.curl)
            .args(["-fsSL", "--output"])
            .arg(&part)
            .arg(url.as_str())
            .output()
            .map_err(|e| Error::FetchFailed {
                url: url.to_string(),
                reason: format!("failed to run {}: {e}", self.curl),
            })?;

        if !output.status.success() {
            let _ = fs::remove_file(&part);
            return Err(Error::FetchFailed {
                url: url.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        fs::rename(&part, dest)?;
        Ok(())
    }
}

impl Fetcher for NetworkFetcher {
    fn fetch(&self, url: &Url, dest: &Path) -> Result<()> {
        info!("Downloading {}", url);
        match url.scheme() {
            "http" | "https" => self.fetch_http(url, dest),
            "ftp" => self.fetch_ftp(url, dest),
            "file" => fetch_file_url(url, dest),
            scheme => Err(Error::FetchFailed {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", scheme),
            }),
        }
    }
}

/// Copy the target of a `file://` URL
pub fn fetch_file_url(url: &Url, dest: &Path) -> Result<()> {
    let path = url.to_file_path().map_err(|()| Error::FetchFailed {
        url: url.to_string(),
        reason: "not a local file URL".to_string(),
    })?;
    if !path.exists() {
        return Err(Error::FetchFailed {
            url: url.to_string(),
            reason: "no such file".to_string(),
        });
    }
    copy_local(&path, dest)
}

/// Acquire every source into `srcdir`, in order
///
/// Returns the destination paths, aligned with `entries`.
pub fn acquire_sources(
    entries: &[SourceEntry],
    srcdir: &Path,
    fetcher: &dyn Fetcher,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(srcdir)?;

    let mut destinations = Vec::with_capacity(entries.len());
    for entry in entries {
        let dest = entry.destination(srcdir);

        if dest.exists() {
            info!("Found {}, skipping", entry.filename);
        } else {
            match &entry.origin {
                SourceOrigin::Remote(url) => fetcher.fetch(url, &dest)?,
                SourceOrigin::Local(path) => {
                    if !path.exists() {
                        return Err(Error::SourceNotFound(path.clone()));
                    }
                    info!("Copying {}", entry.filename);
                    copy_local(path, &dest)?;
                }
            }
        }

        destinations.push(dest);
    }

    Ok(destinations)
}

/// Copy a local file or directory tree
fn copy_local(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        fs::copy(from, to)?;
        return Ok(());
    }

    for entry in WalkDir::new(from).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// Temporary download path next to the destination
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn progress_bar(len: u64, dest: &Path) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(
        dest.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    pb
}
