// src/recipe/kitchen/mod.rs

//! Kitchen: runs a recipe through the build pipeline
//!
//! The pipeline is split into the same ranges the command line exposes:
//!
//! 1. **Prep** ([`Kitchen::download`]): resolve, acquire, verify and extract
//!    sources into the source directory
//! 2. **Cook** ([`Kitchen::build`]): run `prepare`, `build` and `check`
//! 3. **Plate** ([`Kitchen::package`]): run `package`, write the manifest and
//!    create the archive
//!
//! [`Kitchen::compile`] runs all three. Every step is fail-fast and nothing is
//! cleaned up on failure, so a rerun picks up whatever was already fetched.

pub mod archive;
pub mod fetch;
pub mod package;
pub mod signature;
pub mod stages;
pub mod verify;

pub use fetch::{acquire_sources, Fetcher, NetworkFetcher};
pub use signature::{verifier_from_config, GpgCommand, KeyringVerifier, SignatureVerifier};
pub use stages::{BuildContext, StageRunner};
pub use verify::{BuiltinDigester, CommandDigester, Digester, SignatureCheck, VerificationChain};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::recipe::format::Recipe;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};

/// Source and package directories for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDirs {
    pub srcdir: PathBuf,
    pub pkgdir: PathBuf,
}

impl BuildDirs {
    pub fn new(srcdir: impl Into<PathBuf>, pkgdir: impl Into<PathBuf>) -> Self {
        Self {
            srcdir: srcdir.into(),
            pkgdir: pkgdir.into(),
        }
    }
}

/// How `compile` enters the packager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageMode {
    /// Run the packager in this process
    InProcess,
    /// Run a separate process (typically `fakeroot -- mixpkg package ...`)
    Relaunch(Vec<OsString>),
}

/// The Kitchen: where recipes are cooked
pub struct Kitchen {
    config: PipelineConfig,
    fetcher: Option<Box<dyn Fetcher>>,
    digester: Box<dyn Digester>,
    verifier: Option<Box<dyn SignatureVerifier>>,
}

impl Kitchen {
    /// Create a new Kitchen with the given configuration
    ///
    /// The network fetcher and the signature verifier are created on first
    /// use, so actions that never download do not need them to be usable.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let commands = config.checksum.resolved_commands()?;
        let digester: Box<dyn Digester> = if commands.is_empty() {
            Box::new(BuiltinDigester)
        } else {
            Box::new(CommandDigester::new(commands))
        };

        Ok(Self {
            config,
            fetcher: None,
            digester,
            verifier: None,
        })
    }

    /// Create a Kitchen with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(PipelineConfig::default())
    }

    /// Use a specific fetcher for remote sources
    pub fn with_fetcher(mut self, fetcher: Box<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Use a specific digester for checksums
    pub fn with_digester(mut self, digester: Box<dyn Digester>) -> Self {
        self.digester = digester;
        self
    }

    /// Use a specific signature verifier
    pub fn with_signature_verifier(mut self, verifier: Box<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Render the manifest a recipe would produce
    pub fn dump(&self, recipe: &Recipe) -> Result<String> {
        Manifest::from_recipe(recipe)
            .to_toml()
            .map_err(|e| Error::RecipeInvalid(e.to_string()))
    }

    /// Prep: acquire, verify and extract every source
    pub fn download(&self, recipe: &Recipe, dirs: &BuildDirs) -> Result<()> {
        info!("Retrieving sources for {} {}", recipe.name, recipe.full_version());
        let entries = recipe.source_entries()?;

        let network;
        let fetcher: &dyn Fetcher = match &self.fetcher {
            Some(fetcher) => fetcher.as_ref(),
            None => {
                network = NetworkFetcher::new(&self.config.fetch)?;
                &network
            }
        };
        acquire_sources(&entries, &dirs.srcdir, fetcher)?;

        let signed = entries
            .iter()
            .any(|entry| self.config.signature.signed_target(&entry.filename).is_some());

        let configured;
        let signatures = if !self.config.signature.enabled {
            debug!("Signature verification disabled");
            None
        } else if !signed {
            debug!("No signature files among the sources");
            None
        } else {
            let verifier: &dyn SignatureVerifier = match &self.verifier {
                Some(verifier) => verifier.as_ref(),
                None => {
                    configured = verifier_from_config(&self.config.signature)?;
                    configured.as_ref()
                }
            };
            Some(SignatureCheck {
                config: &self.config.signature,
                verifier,
            })
        };

        let chain = VerificationChain {
            digester: self.digester.as_ref(),
            signatures,
        };
        chain.verify_sources(recipe, &entries, &dirs.srcdir)?;

        archive::extract_sources(recipe, &entries, &dirs.srcdir)?;
        info!("Sources are ready in {}", dirs.srcdir.display());
        Ok(())
    }

    /// Cook: run prepare, build and check
    pub fn build(&self, recipe: &Recipe, dirs: &BuildDirs) -> Result<()> {
        if recipe.stages.build.is_none() {
            return Err(Error::StageMissing("build"));
        }

        fs::create_dir_all(&dirs.srcdir)?;
        fs::create_dir_all(&dirs.pkgdir)?;

        let context = BuildContext::new(recipe, &dirs.srcdir, &dirs.pkgdir)?;
        info!("Building {} {}", recipe.name, recipe.full_version());
        StageRunner::new(&self.config, &context).run_build_stages(recipe)
    }

    /// Plate: run package and produce the archive
    ///
    /// Returns the absolute archive path.
    pub fn package(&self, recipe: &Recipe, dirs: &BuildDirs) -> Result<PathBuf> {
        let context = BuildContext::new(recipe, &dirs.srcdir, &dirs.pkgdir)?;
        info!("Packaging {} {}", recipe.name, recipe.full_version());
        package::package_recipe(recipe, &context, &self.config)
    }

    /// Run the whole pipeline
    pub fn compile(&self, recipe: &Recipe, dirs: &BuildDirs, mode: &PackageMode) -> Result<PathBuf> {
        self.download(recipe, dirs)?;
        self.build(recipe, dirs)?;

        match mode {
            PackageMode::InProcess => self.package(recipe, dirs),
            PackageMode::Relaunch(argv) => {
                let pkgdir = std::path::absolute(&dirs.pkgdir)?;
                let archive = package::archive_path(recipe, &pkgdir)?;
                relaunch_packager(argv)?;
                if !archive.is_file() {
                    return Err(Error::ArchiveCreationFailed {
                        path: archive,
                        reason: "packager finished without producing the archive".to_string(),
                    });
                }
                Ok(archive)
            }
        }
    }
}

fn relaunch_packager(argv: &[OsString]) -> Result<()> {
    let failed = |reason: String| Error::StageFailed {
        stage: "package",
        reason,
    };

    let (program, args) = argv
        .split_first()
        .ok_or_else(|| failed("empty packager command".to_string()))?;

    info!("Entering packager: {:?}", argv);
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| failed(format!("failed to start {}: {}", program.to_string_lossy(), e)))?;

    if !status.success() {
        return Err(failed(format!("packager exited with {}", status)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::parser::load_recipe;
    use tempfile::TempDir;

    struct NoNetwork;

    impl Fetcher for NoNetwork {
        fn fetch(&self, url: &url::Url, _dest: &std::path::Path) -> Result<()> {
            Err(Error::FetchFailed {
                url: url.to_string(),
                reason: "network disabled in tests".to_string(),
            })
        }
    }

    fn write_recipe(dir: &TempDir, body: &str) -> Recipe {
        let path = dir.path().join("foo.toml");
        fs::write(&path, body).unwrap();
        load_recipe(&path).unwrap()
    }

    #[test]
    fn test_dump() {
        let dir = TempDir::new().unwrap();
        let recipe = write_recipe(
            &dir,
            "[package]\nname = \"foo\"\nversion = \"1.0\"\nrelease = 1\narch = [\"any\"]\n",
        );
        let kitchen = Kitchen::with_defaults().unwrap();
        let text = kitchen.dump(&recipe).unwrap();
        assert!(text.starts_with("name = \"foo\"\n"));
    }

    #[test]
    fn test_download_fetch_failure() {
        let dir = TempDir::new().unwrap();
        let recipe = write_recipe(
            &dir,
            "[package]\nname = \"foo\"\nversion = \"1.0\"\nrelease = 1\narch = [\"any\"]\n\
             [source]\nfiles = [\"https://example.invalid/foo.tar.gz\"]\n",
        );
        let kitchen = Kitchen::with_defaults()
            .unwrap()
            .with_fetcher(Box::new(NoNetwork));
        let dirs = BuildDirs::new(dir.path().join("src"), dir.path().join("pkg"));
        assert!(matches!(
            kitchen.download(&recipe, &dirs),
            Err(Error::FetchFailed { .. })
        ));
    }

    #[test]
    fn test_compile_in_process() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data.txt"), "payload").unwrap();
        let recipe = write_recipe(
            &dir,
            "[package]\nname = \"foo\"\nversion = \"1.0\"\nrelease = 1\narch = [\"any\"]\n\
             [source]\nfiles = [\"data.txt\"]\n\
             [stages]\nbuild = \"cp data.txt \\\"$pkgdir/\\\"\"\npackage = \"true\"\n",
        );
        let kitchen = Kitchen::with_defaults()
            .unwrap()
            .with_fetcher(Box::new(NoNetwork));
        let dirs = BuildDirs::new(dir.path().join("src"), dir.path().join("pkg"));

        let archive = kitchen
            .compile(&recipe, &dirs, &PackageMode::InProcess)
            .unwrap();
        assert_eq!(archive, dir.path().join("foo.tar.xz"));
        assert!(dir.path().join("pkg/data.txt").is_file());
    }

    #[test]
    fn test_keyring_only_opened_for_signed_sources() {
        use crate::config::SignatureBackend;

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data.txt"), "payload").unwrap();
        fs::write(dir.path().join("data.txt.sig"), "sig").unwrap();
        let unsigned = write_recipe(
            &dir,
            "[package]\nname = \"foo\"\nversion = \"1.0\"\nrelease = 1\narch = [\"any\"]\n\
             [source]\nfiles = [\"data.txt\"]\n",
        );

        let mut config = PipelineConfig::default();
        config.signature.backend = SignatureBackend::Keyring;
        config.signature.keyring = Some(dir.path().join("no-such-keyring"));
        let kitchen = Kitchen::new(config).unwrap().with_fetcher(Box::new(NoNetwork));
        let dirs = BuildDirs::new(dir.path().join("src"), dir.path().join("pkg"));

        kitchen.download(&unsigned, &dirs).unwrap();

        let signed = write_recipe(
            &dir,
            "[package]\nname = \"foo\"\nversion = \"1.0\"\nrelease = 1\narch = [\"any\"]\n\
             [source]\nfiles = [\"data.txt\", \"data.txt.sig\"]\n",
        );
        assert!(matches!(
            kitchen.download(&signed, &dirs),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_relaunch_failure() {
        let result = relaunch_packager(&[OsString::from("false")]);
        assert!(matches!(result, Err(Error::StageFailed { stage: "package", .. })));
    }
}
