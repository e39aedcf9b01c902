// src/commands/pipeline.rs
//! Pipeline actions: dump, download, build, package and compile

use crate::cli::{Action, Cli};
use anyhow::{Context, Result};
use mixpkg::config::PipelineConfig;
use mixpkg::recipe::{load_recipe, BuildDirs, Kitchen, PackageMode};
use std::ffi::OsString;
use tracing::{debug, info};

/// Run the action selected on the command line
pub fn run(cli: &Cli) -> Result<()> {
    // The recipe is loaded before anything touches the filesystem
    let recipe = load_recipe(&cli.recipe)
        .with_context(|| format!("Failed to load recipe: {}", cli.recipe.display()))?;

    let mut config = PipelineConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if cli.nogpg {
        config.signature.enabled = false;
    }

    let kitchen = Kitchen::new(config)?;
    let dirs = BuildDirs::new(&cli.srcdir, &cli.pkgdir);

    match cli.action {
        Action::Dump => {
            let manifest = kitchen.dump(&recipe)?;
            print!("{}", manifest);
        }
        Action::Download => {
            kitchen
                .download(&recipe, &dirs)
                .with_context(|| format!("Failed to download sources for {}", recipe.name))?;
        }
        Action::Build => {
            kitchen
                .build(&recipe, &dirs)
                .with_context(|| format!("Failed to build {}", recipe.name))?;
        }
        Action::Package => {
            let archive = kitchen
                .package(&recipe, &dirs)
                .with_context(|| format!("Failed to package {}", recipe.name))?;
            println!("{}", archive.display());
        }
        Action::Compile => {
            let mode = package_mode(cli, &kitchen.config().privilege_wrapper)?;
            let archive = kitchen
                .compile(&recipe, &dirs, &mode)
                .with_context(|| format!("Failed to compile {}", recipe.name))?;
            // A relaunched packager prints the archive path itself
            if mode == PackageMode::InProcess {
                println!("{}", archive.display());
            }
            info!("Package ready: {}", archive.display());
        }
    }

    Ok(())
}

fn package_mode(cli: &Cli, wrapper: &[String]) -> Result<PackageMode> {
    let Some((program, wrapper_args)) = wrapper.split_first() else {
        debug!("No privilege wrapper configured, packaging in-process");
        return Ok(PackageMode::InProcess);
    };

    let program = which::which(program).with_context(|| {
        format!(
            "Privilege wrapper '{}' not found in PATH (set privilege_wrapper = [] to package in-process)",
            program
        )
    })?;
    let exe = std::env::current_exe().context("Failed to locate the mixpkg executable")?;

    let mut argv = vec![program.into_os_string()];
    argv.extend(wrapper_args.iter().map(OsString::from));
    argv.push(exe.into_os_string());
    argv.extend(packager_command(cli));
    Ok(PackageMode::Relaunch(argv))
}

/// Arguments that re-enter this program as `package` with the same inputs
pub fn packager_command(cli: &Cli) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "package".into(),
        "-p".into(),
        cli.recipe.clone().into_os_string(),
        "-s".into(),
        cli.srcdir.clone().into_os_string(),
        "-d".into(),
        cli.pkgdir.clone().into_os_string(),
    ];
    if cli.nogpg {
        args.push("--nogpg".into());
    }
    if let Some(config) = &cli.config {
        args.push("--config".into());
        args.push(config.clone().into_os_string());
    }
    if cli.quiet {
        args.push("--quiet".into());
    }
    for _ in 0..cli.verbose {
        args.push("--verbose".into());
    }
    args
}
