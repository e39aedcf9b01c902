// src/recipe/kitchen/stages.rs

//! Stage execution
//!
//! Every hook runs as a child process with the source directory as its
//! working directory and the build context exported in its environment.
//! Standard streams are inherited so build output reaches the terminal
//! unchanged. A hook succeeds exactly when it exits with status zero.

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::recipe::format::{Recipe, Stage, StageHook};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use tracing::{debug, info};

/// Script run by the function shell: source the recipe, then call one function
const FUNCTION_RUNNER: &str = r#"set -e; source "$0"; "$1""#;

/// Directories and identity exported to stage hooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    /// Absolute source directory; working directory for build stages
    pub srcdir: PathBuf,
    /// Absolute package directory
    pub pkgdir: PathBuf,
    /// Absolute recipe directory
    pub startdir: PathBuf,
    pub pkgname: String,
    pub pkgver: String,
    pub pkgrel: String,
    pub epoch: String,
}

impl BuildContext {
    /// Build the context for a recipe run
    ///
    /// Relative directories are made absolute against the current directory.
    pub fn new(recipe: &Recipe, srcdir: &Path, pkgdir: &Path) -> Result<Self> {
        Ok(Self {
            srcdir: std::path::absolute(srcdir)?,
            pkgdir: std::path::absolute(pkgdir)?,
            startdir: recipe.base_dir.clone(),
            pkgname: recipe.name.clone(),
            pkgver: recipe.version.clone(),
            pkgrel: recipe.release.to_string(),
            epoch: recipe.epoch.to_string(),
        })
    }

    /// Environment bindings passed to every hook
    pub fn env(&self) -> Vec<(&'static str, OsString)> {
        vec![
            ("srcdir", self.srcdir.clone().into_os_string()),
            ("pkgdir", self.pkgdir.clone().into_os_string()),
            ("startdir", self.startdir.clone().into_os_string()),
            ("pkgname", OsString::from(&self.pkgname)),
            ("pkgver", OsString::from(&self.pkgver)),
            ("pkgrel", OsString::from(&self.pkgrel)),
            ("epoch", OsString::from(&self.epoch)),
        ]
    }
}

/// Runs stage hooks for one build context
pub struct StageRunner<'a> {
    config: &'a PipelineConfig,
    context: &'a BuildContext,
}

impl<'a> StageRunner<'a> {
    pub fn new(config: &'a PipelineConfig, context: &'a BuildContext) -> Self {
        Self { config, context }
    }

    /// Build the child process for a hook
    pub fn command(&self, hook: &StageHook) -> Command {
        let startdir = &self.context.startdir;
        let mut command = match hook {
            StageHook::Command(line) => {
                let mut command = Command::new(&self.config.shell);
                command.arg("-c").arg(line);
                command
            }
            StageHook::Script { script, args } => {
                let mut command = Command::new(startdir.join(script));
                command.args(args);
                command
            }
            StageHook::Function { source, function } => {
                let mut command = Command::new(&self.config.function_shell);
                command
                    .arg("-c")
                    .arg(FUNCTION_RUNNER)
                    .arg(startdir.join(source))
                    .arg(function);
                command
            }
        };

        command
            .current_dir(&self.context.srcdir)
            .envs(self.context.env());
        command
    }

    /// Run one stage hook to completion
    pub fn run(&self, stage: Stage, hook: &StageHook) -> Result<()> {
        info!("Starting {}()", stage);
        let mut command = self.command(hook);
        debug!("Running {:?}", command);

        let status = command.status().map_err(|e| Error::StageFailed {
            stage: stage.as_str(),
            reason: format!("failed to start: {}", e),
        })?;

        if !status.success() {
            return Err(Error::StageFailed {
                stage: stage.as_str(),
                reason: describe_status(status),
            });
        }

        debug!("{}() finished", stage);
        Ok(())
    }

    /// Run a declared hook, or fail if the stage is mandatory
    pub fn run_declared(&self, recipe: &Recipe, stage: Stage) -> Result<()> {
        match recipe.stages.get(stage) {
            Some(hook) => self.run(stage, hook),
            None if stage.is_mandatory() => Err(Error::StageMissing(stage.as_str())),
            None => {
                debug!("No {}() declared, skipping", stage);
                Ok(())
            }
        }
    }

    /// Run prepare, build and check in order
    ///
    /// Nothing runs when `build` is missing, since the check happens first.
    pub fn run_build_stages(&self, recipe: &Recipe) -> Result<()> {
        if recipe.stages.build.is_none() {
            return Err(Error::StageMissing(Stage::Build.as_str()));
        }

        for stage in [Stage::Prepare, Stage::Build, Stage::Check] {
            self.run_declared(recipe, stage)?;
        }
        Ok(())
    }
}

fn describe_status(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exited with status {}", code),
        (None, Some(signal)) => format!("killed by signal {}", signal),
        (None, None) => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::format::{Dependencies, StageHooks};
    use std::collections::{BTreeMap, BTreeSet};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        recipe: Recipe,
        context: BuildContext,
    }

    fn fixture(stages: StageHooks) -> Fixture {
        let dir = TempDir::new().unwrap();
        let startdir = dir.path().join("recipe");
        let srcdir = dir.path().join("src");
        let pkgdir = dir.path().join("pkg");
        for d in [&startdir, &srcdir, &pkgdir] {
            fs::create_dir_all(d).unwrap();
        }

        let recipe = Recipe {
            name: "foo".to_string(),
            version: "1.0".to_string(),
            release: 3,
            epoch: 1,
            description: None,
            url: None,
            license: Vec::new(),
            groups: Vec::new(),
            arch: vec!["any".to_string()],
            backup: Vec::new(),
            depends: Dependencies::default(),
            sources: Vec::new(),
            checksums: BTreeMap::new(),
            active_checksum: None,
            noextract: BTreeSet::new(),
            install: None,
            changelog: None,
            stages,
            base_dir: startdir,
        };
        let context = BuildContext::new(&recipe, &srcdir, &pkgdir).unwrap();
        Fixture {
            _dir: dir,
            recipe,
            context,
        }
    }

    fn command(line: &str) -> Option<StageHook> {
        Some(StageHook::Command(line.to_string()))
    }

    #[test]
    fn test_stage_order_and_cwd() {
        let f = fixture(StageHooks {
            prepare: command("pwd > \"$pkgdir/order\""),
            build: command("echo build >> \"$pkgdir/order\""),
            check: command("echo check >> \"$pkgdir/order\""),
            package: None,
        });
        let config = PipelineConfig::default();
        StageRunner::new(&config, &f.context)
            .run_build_stages(&f.recipe)
            .unwrap();

        let order = fs::read_to_string(f.context.pkgdir.join("order")).unwrap();
        let lines: Vec<&str> = order.lines().collect();
        let srcdir = fs::canonicalize(&f.context.srcdir).unwrap();
        assert_eq!(lines[0], srcdir.to_string_lossy());
        assert_eq!(&lines[1..], &["build", "check"]);
    }

    #[test]
    fn test_environment() {
        let f = fixture(StageHooks {
            build: command("echo \"$pkgname $pkgver $pkgrel $epoch $startdir\" > \"$pkgdir/env\""),
            ..StageHooks::default()
        });
        let config = PipelineConfig::default();
        StageRunner::new(&config, &f.context)
            .run_build_stages(&f.recipe)
            .unwrap();

        let env = fs::read_to_string(f.context.pkgdir.join("env")).unwrap();
        assert_eq!(
            env.trim(),
            format!("foo 1.0 3 1 {}", f.recipe.base_dir.display())
        );
    }

    #[test]
    fn test_missing_build_runs_nothing() {
        let f = fixture(StageHooks {
            prepare: command("touch \"$pkgdir/prepared\""),
            ..StageHooks::default()
        });
        let config = PipelineConfig::default();
        let result = StageRunner::new(&config, &f.context).run_build_stages(&f.recipe);

        assert!(matches!(result, Err(Error::StageMissing("build"))));
        assert!(!f.context.pkgdir.join("prepared").exists());
    }

    #[test]
    fn test_check_failure_is_fatal() {
        let f = fixture(StageHooks {
            build: command("true"),
            check: command("exit 4"),
            ..StageHooks::default()
        });
        let config = PipelineConfig::default();
        match StageRunner::new(&config, &f.context).run_build_stages(&f.recipe) {
            Err(Error::StageFailed { stage, reason }) => {
                assert_eq!(stage, "check");
                assert!(reason.contains('4'));
            }
            other => panic!("expected StageFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_script_hook() {
        use std::os::unix::fs::PermissionsExt;

        let f = fixture(StageHooks::default());
        let script = f.recipe.base_dir.join("build.sh");
        fs::write(&script, "#!/bin/sh\necho \"$1\" > \"$pkgdir/arg\"\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let config = PipelineConfig::default();
        let hook = StageHook::Script {
            script: PathBuf::from("build.sh"),
            args: vec!["hello".to_string()],
        };
        StageRunner::new(&config, &f.context)
            .run(Stage::Build, &hook)
            .unwrap();
        assert_eq!(
            fs::read_to_string(f.context.pkgdir.join("arg")).unwrap().trim(),
            "hello"
        );
    }

    #[test]
    fn test_unspawnable_hook() {
        let f = fixture(StageHooks::default());
        let config = PipelineConfig::default();
        let hook = StageHook::Script {
            script: PathBuf::from("does-not-exist.sh"),
            args: Vec::new(),
        };
        assert!(matches!(
            StageRunner::new(&config, &f.context).run(Stage::Prepare, &hook),
            Err(Error::StageFailed { stage: "prepare", .. })
        ));
    }

    #[test]
    fn test_function_command_line() {
        let f = fixture(StageHooks::default());
        let config = PipelineConfig::default();
        let hook = StageHook::Function {
            source: PathBuf::from("PKGBUILD"),
            function: "build".to_string(),
        };
        let command = StageRunner::new(&config, &f.context).command(&hook);

        assert_eq!(command.get_program(), "bash");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args.len(), 4);
        assert_eq!(args[0], "-c");
        assert_eq!(args[2], f.recipe.base_dir.join("PKGBUILD").as_os_str());
        assert_eq!(args[3], "build");
    }
}
