// src/recipe/kitchen/signature.rs

//! Detached signature verification
//!
//! Two backends are available. [`GpgCommand`] runs an external verifier
//! (`gpg --batch --verify <sig> <file>` by default) and trusts whatever keyring
//! that program uses. [`KeyringVerifier`] checks signatures in-process with
//! sequoia-openpgp against a directory of armored `*.asc` certificates.

use crate::config::{SignatureBackend, SignatureConfig};
use crate::error::{Error, Result};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use sequoia_openpgp as openpgp;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Verifies a file against its detached signature
pub trait SignatureVerifier {
    fn verify(&self, file: &Path, signature: &Path) -> Result<()>;
}

/// Build the verifier selected by configuration
pub fn verifier_from_config(config: &SignatureConfig) -> Result<Box<dyn SignatureVerifier>> {
    match config.backend {
        SignatureBackend::Command => Ok(Box::new(GpgCommand::new(
            config.program.clone(),
            config.args.clone(),
        ))),
        SignatureBackend::Keyring => {
            let dir = config.keyring.as_deref().ok_or_else(|| {
                Error::Config("signature.keyring is required for the keyring backend".to_string())
            })?;
            Ok(Box::new(KeyringVerifier::open(dir)?))
        }
    }
}

fn signature_name(signature: &Path) -> String {
    signature
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| signature.display().to_string())
}

/// External verifier program
pub struct GpgCommand {
    program: String,
    args: Vec<String>,
}

impl GpgCommand {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }
}

impl SignatureVerifier for GpgCommand {
    fn verify(&self, file: &Path, signature: &Path) -> Result<()> {
        debug!("Running {} {:?} on {}", self.program, self.args, signature.display());

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(signature)
            .arg(file)
            .output()
            .map_err(|e| Error::SignatureFailed {
                file: signature_name(signature),
                reason: format!("failed to run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} exited with {}", self.program, output.status));
            return Err(Error::SignatureFailed {
                file: signature_name(signature),
                reason,
            });
        }

        info!("Verified signature {}", signature_name(signature));
        Ok(())
    }
}

/// In-process verifier backed by a directory of certificates
pub struct KeyringVerifier {
    certs: Vec<openpgp::Cert>,
    policy: StandardPolicy<'static>,
}

impl KeyringVerifier {
    /// Load every `*.asc` certificate in `keyring_dir`
    pub fn open(keyring_dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = fs::read_dir(keyring_dir)
            .map_err(|e| {
                Error::Config(format!(
                    "cannot read keyring {}: {}",
                    keyring_dir.display(),
                    e
                ))
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("asc"))
            .collect();
        paths.sort();

        let mut certs = Vec::with_capacity(paths.len());
        for path in &paths {
            let cert = openpgp::Cert::from_file(path).map_err(|e| {
                Error::Config(format!("failed to parse key {}: {}", path.display(), e))
            })?;
            debug!("Loaded key {} from {}", cert.fingerprint(), path.display());
            certs.push(cert);
        }

        if certs.is_empty() {
            return Err(Error::Config(format!(
                "keyring {} contains no *.asc keys",
                keyring_dir.display()
            )));
        }

        info!("Loaded {} key(s) from {}", certs.len(), keyring_dir.display());
        Ok(Self {
            certs,
            policy: StandardPolicy::new(),
        })
    }
}

impl SignatureVerifier for KeyringVerifier {
    fn verify(&self, file: &Path, signature: &Path) -> Result<()> {
        let failed = |reason: String| Error::SignatureFailed {
            file: signature_name(signature),
            reason,
        };

        let message_data = fs::read(file)?;
        let signature_data = fs::read(signature)?;

        let signature_pile = openpgp::PacketPile::from_bytes(&signature_data)
            .map_err(|e| failed(format!("failed to parse signature: {}", e)))?;

        for packet in signature_pile.descendants() {
            let openpgp::Packet::Signature(sig) = packet else {
                continue;
            };
            for cert in &self.certs {
                for key in cert.keys().with_policy(&self.policy, None) {
                    if key.for_signing() && sig.verify_message(key.key(), &message_data).is_ok() {
                        info!(
                            "Verified signature {} with key {}",
                            signature_name(signature),
                            cert.fingerprint()
                        );
                        return Ok(());
                    }
                }
            }
        }

        Err(failed("no valid signature from a trusted key".to_string()))
    }
}
