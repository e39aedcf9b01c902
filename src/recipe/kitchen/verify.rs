// src/recipe/kitchen/verify.rs

//! Source verification
//!
//! Runs once all sources are in the source directory. For each entry, a
//! detached signature (recognized by file name suffix) is checked against the
//! file it signs, then the file's digest is compared with the recipe's active
//! checksum table.

use crate::config::SignatureConfig;
use crate::error::{Error, Result};
use crate::hash::{digests_match, hash_file, HashAlgorithm};
use crate::recipe::format::{Recipe, SKIP_MARKER};
use crate::recipe::source::SourceEntry;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

use super::signature::SignatureVerifier;

/// Produces hex digests of files
pub trait Digester {
    fn digest(&self, algorithm: HashAlgorithm, path: &Path) -> Result<String>;
}

/// In-process hashing with the RustCrypto implementations
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinDigester;

impl Digester for BuiltinDigester {
    fn digest(&self, algorithm: HashAlgorithm, path: &Path) -> Result<String> {
        Ok(hash_file(algorithm, path)?)
    }
}

/// Runs a configured program per algorithm, falling back to built-in hashing
///
/// The file path is appended to the command and the first word of its
/// standard output is taken as the digest, which matches the output of
/// `sha256sum` and friends.
#[derive(Debug, Default)]
pub struct CommandDigester {
    commands: BTreeMap<HashAlgorithm, Vec<String>>,
}

impl CommandDigester {
    pub fn new(commands: BTreeMap<HashAlgorithm, Vec<String>>) -> Self {
        Self { commands }
    }
}

impl Digester for CommandDigester {
    fn digest(&self, algorithm: HashAlgorithm, path: &Path) -> Result<String> {
        let Some((program, args)) = self
            .commands
            .get(&algorithm)
            .and_then(|argv| argv.split_first())
        else {
            return BuiltinDigester.digest(algorithm, path);
        };

        debug!("Computing {} of {} with {}", algorithm, path.display(), program);
        let output = Command::new(program).args(args).arg(path).output()?;

        if !output.status.success() {
            return Err(io::Error::other(format!(
                "{} exited with {} for {}",
                program,
                output.status,
                path.display()
            ))
            .into());
        }

        String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| {
                io::Error::other(format!("{} produced no digest for {}", program, path.display()))
                    .into()
            })
    }
}

/// Signature checking half of the chain
pub struct SignatureCheck<'a> {
    pub config: &'a SignatureConfig,
    pub verifier: &'a dyn SignatureVerifier,
}

/// The verification chain over a recipe's sources
pub struct VerificationChain<'a> {
    pub digester: &'a dyn Digester,
    /// `None` when signature checking is disabled
    pub signatures: Option<SignatureCheck<'a>>,
}

impl VerificationChain<'_> {
    /// Verify every acquired source
    pub fn verify_sources(
        &self,
        recipe: &Recipe,
        entries: &[SourceEntry],
        srcdir: &Path,
    ) -> Result<()> {
        match recipe.active_checksum {
            Some(algorithm) => info!("Validating source files with {}sums", algorithm),
            None if !entries.is_empty() => {
                warn!("No checksums declared, source integrity is not verified")
            }
            None => {}
        }

        for entry in entries {
            if let Some(check) = &self.signatures {
                self.verify_signature(check, entry, srcdir)?;
            }
            if let Some(algorithm) = recipe.active_checksum {
                self.verify_checksum(recipe, algorithm, entry, srcdir)?;
            }
        }

        Ok(())
    }

    fn verify_signature(
        &self,
        check: &SignatureCheck<'_>,
        entry: &SourceEntry,
        srcdir: &Path,
    ) -> Result<()> {
        let Some(target) = check.config.signed_target(&entry.filename) else {
            return Ok(());
        };

        let file = srcdir.join(target);
        if !file.exists() {
            return Err(Error::SignatureFailed {
                file: entry.filename.clone(),
                reason: format!("signed file {} is not among the sources", target),
            });
        }

        check.verifier.verify(&file, &entry.destination(srcdir))
    }

    fn verify_checksum(
        &self,
        recipe: &Recipe,
        algorithm: HashAlgorithm,
        entry: &SourceEntry,
        srcdir: &Path,
    ) -> Result<()> {
        let expected = match recipe.expected_digest(entry.index) {
            Some(SKIP_MARKER) => {
                debug!("{} ... Skipped", entry.filename);
                return Ok(());
            }
            Some(expected) => expected,
            None => {
                return Err(Error::ChecksumMismatch {
                    file: entry.filename.clone(),
                    algorithm: algorithm.to_string(),
                    expected: "(none declared)".to_string(),
                    actual: self.digester.digest(algorithm, &entry.destination(srcdir))?,
                });
            }
        };

        let actual = self.digester.digest(algorithm, &entry.destination(srcdir))?;
        if !digests_match(expected, &actual) {
            return Err(Error::ChecksumMismatch {
                file: entry.filename.clone(),
                algorithm: algorithm.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }

        debug!("{} ... Passed", entry.filename);
        Ok(())
    }
}
