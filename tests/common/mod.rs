// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use mixpkg::hash::{hash_bytes, HashAlgorithm};
use mixpkg::recipe::kitchen::{BuiltinDigester, Digester, Fetcher, SignatureVerifier};
use mixpkg::recipe::BuildDirs;
use mixpkg::{Error, Kitchen, PipelineConfig, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;

/// Scratch layout: `recipe/` holds the recipe and local sources,
/// `work/src` and `work/pkg` are the pipeline directories.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("recipe")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn recipe_dir(&self) -> PathBuf {
        self.root().join("recipe")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root().join("work")
    }

    pub fn srcdir(&self) -> PathBuf {
        self.work_dir().join("src")
    }

    pub fn pkgdir(&self) -> PathBuf {
        self.work_dir().join("pkg")
    }

    pub fn dirs(&self) -> BuildDirs {
        BuildDirs::new(self.srcdir(), self.pkgdir())
    }

    /// Write a file under the recipe directory and return its path
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.recipe_dir().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn archive(&self) -> PathBuf {
        self.work_dir().join("foo.tar.xz")
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha256, data)
}

/// Configuration that packages in-process
pub fn in_process_config() -> PipelineConfig {
    PipelineConfig {
        privilege_wrapper: Vec::new(),
        ..PipelineConfig::default()
    }
}

pub fn kitchen() -> Kitchen {
    Kitchen::new(in_process_config()).unwrap()
}

/// Read a `.tar.xz` archive into path -> contents (directories map to empty)
pub fn archive_entries(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let file = fs::File::open(path).unwrap();
    let mut archive = tar::Archive::new(xz2::read::XzDecoder::new(file));
    let mut entries = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry
            .path()
            .unwrap()
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        entries.insert(name, data);
    }
    entries
}

/// Fetcher that writes a fixed payload and counts calls
#[derive(Clone)]
pub struct CountingFetcher {
    pub payload: Vec<u8>,
    pub calls: Arc<AtomicUsize>,
}

impl CountingFetcher {
    pub fn new(payload: &[u8]) -> Self {
        Self {
            payload: payload.to_vec(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for CountingFetcher {
    fn fetch(&self, _url: &Url, dest: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        fs::write(dest, &self.payload)?;
        Ok(())
    }
}

/// Digester that records which files were hashed
#[derive(Clone, Default)]
pub struct CountingDigester {
    pub calls: Arc<AtomicUsize>,
}

impl CountingDigester {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Digester for CountingDigester {
    fn digest(&self, algorithm: HashAlgorithm, path: &Path) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        BuiltinDigester.digest(algorithm, path)
    }
}

/// Signature verifier with a fixed verdict that counts calls
#[derive(Clone)]
pub struct StubVerifier {
    pub accept: bool,
    pub calls: Arc<AtomicUsize>,
}

impl StubVerifier {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            accept: false,
            ..Self::accepting()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SignatureVerifier for StubVerifier {
    fn verify(&self, _file: &Path, signature: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.accept {
            Ok(())
        } else {
            Err(Error::SignatureFailed {
                file: signature
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                reason: "BAD signature".to_string(),
            })
        }
    }
}
