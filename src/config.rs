// src/config.rs

//! Pipeline configuration
//!
//! Configuration is read from the first of these that exists:
//!
//! 1. the `--config <file>` command-line option
//! 2. the file named by `$MIXPKG_CONFIG`
//! 3. `<config dir>/mixpkg/config.toml` (e.g. `~/.config/mixpkg/config.toml`)
//!
//! and falls back to built-in defaults otherwise. An explicitly named file
//! that cannot be read is an error; a missing default file is not.
//!
//! ```toml
//! shell = "sh"
//! privilege_wrapper = ["fakeroot", "--"]
//!
//! [signature]
//! backend = "keyring"
//! keyring = "/etc/mixpkg/keys"
//!
//! [checksum.commands]
//! sha256 = ["sha256sum"]
//!
//! [fetch]
//! timeout_secs = 600
//! ```

use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "MIXPKG_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Shell used for command hooks (`<shell> -c <command>`)
    pub shell: String,

    /// Shell used for function hooks; must understand `source`
    pub function_shell: String,

    /// Command prefix used by `compile` to re-enter the packager.
    /// Empty means the packager runs in-process.
    pub privilege_wrapper: Vec<String>,

    pub signature: SignatureConfig,
    pub checksum: ChecksumConfig,
    pub fetch: FetchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            function_shell: "bash".to_string(),
            privilege_wrapper: vec!["fakeroot".to_string(), "--".to_string()],
            signature: SignatureConfig::default(),
            checksum: ChecksumConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

/// Signature verification backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureBackend {
    /// Run an external verifier (`gpg --batch --verify`)
    #[default]
    Command,
    /// Verify in-process against a directory of armored certificates
    Keyring,
}

/// Detached signature settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignatureConfig {
    /// Set to false to skip signature verification entirely
    pub enabled: bool,
    /// File name suffixes marking a source as a detached signature
    pub suffixes: Vec<String>,
    pub backend: SignatureBackend,
    /// Verifier program for the command backend
    pub program: String,
    /// Arguments placed before `<signature> <file>`
    pub args: Vec<String>,
    /// Directory of `*.asc` certificates for the keyring backend
    pub keyring: Option<PathBuf>,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            suffixes: vec![".sig".to_string()],
            backend: SignatureBackend::Command,
            program: "gpg".to_string(),
            args: vec!["--batch".to_string(), "--verify".to_string()],
            keyring: None,
        }
    }
}

impl SignatureConfig {
    /// If `filename` is a detached signature, return the name of the signed file
    pub fn signed_target<'a>(&self, filename: &'a str) -> Option<&'a str> {
        self.suffixes
            .iter()
            .filter(|suffix| !suffix.is_empty())
            .find_map(|suffix| filename.strip_suffix(suffix.as_str()))
            .filter(|target| !target.is_empty())
    }
}

/// Checksum settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChecksumConfig {
    /// External digest commands keyed by algorithm name (`sha256`, `b2`...).
    /// The file path is appended and the first word of stdout is the digest.
    pub commands: BTreeMap<String, Vec<String>>,
}

impl ChecksumConfig {
    /// Parse the command table into algorithm keys
    pub fn resolved_commands(&self) -> Result<BTreeMap<HashAlgorithm, Vec<String>>> {
        let mut resolved = BTreeMap::new();
        for (key, argv) in &self.commands {
            let algorithm: HashAlgorithm = key
                .parse()
                .map_err(|e| Error::Config(format!("checksum.commands: {}", e)))?;
            if argv.is_empty() {
                return Err(Error::Config(format!(
                    "checksum.commands.{} must name a program",
                    key
                )));
            }
            resolved.insert(algorithm, argv.clone());
        }
        Ok(resolved)
    }
}

/// Source download settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Per-request timeout for HTTP downloads
    pub timeout_secs: u64,
    /// Program used for ftp:// origins
    pub curl: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            curl: "curl".to_string(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PipelineConfig {
    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content).map_err(|e| match e {
            Error::Config(message) => Error::Config(format!("{}: {}", path.display(), message)),
            other => other,
        })
    }

    /// Location of the per-user configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mixpkg").join("config.toml"))
    }

    /// Load configuration following the lookup order
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            debug!("Using configuration from {}", path.display());
            return Self::from_file(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            let path = PathBuf::from(path);
            debug!("Using configuration from ${} ({})", CONFIG_ENV, path.display());
            return Self::from_file(&path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => {
                debug!("Using configuration from {}", path.display());
                Self::from_file(&path)
            }
            _ => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Check settings that deserialization alone cannot
    pub fn validate(&self) -> Result<()> {
        if self.shell.trim().is_empty() {
            return Err(Error::Config("shell must not be empty".to_string()));
        }
        if self.function_shell.trim().is_empty() {
            return Err(Error::Config("function_shell must not be empty".to_string()));
        }
        if self.signature.enabled
            && self.signature.backend == SignatureBackend::Keyring
            && self.signature.keyring.is_none()
        {
            return Err(Error::Config(
                "signature.keyring is required for the keyring backend".to_string(),
            ));
        }
        self.checksum.resolved_commands()?;
        Ok(())
    }
}
