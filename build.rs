// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("mixpkg")
        .version(env!("CARGO_PKG_VERSION"))
        .author("mix Contributors")
        .about("Build recipes into versioned, manifested package archives")
        .arg(
            Arg::new("action")
                .required(true)
                .value_parser(["dump", "download", "build", "package", "compile"])
                .help("Pipeline range to run"),
        )
        .arg(
            Arg::new("recipe")
                .short('p')
                .long("recipe")
                .value_name("RECIPE")
                .required(true)
                .help("Recipe file (TOML or PKGBUILD)"),
        )
        .arg(
            Arg::new("srcdir")
                .short('s')
                .long("srcdir")
                .value_name("DIR")
                .required(true)
                .help("Source directory"),
        )
        .arg(
            Arg::new("pkgdir")
                .short('d')
                .long("pkgdir")
                .value_name("DIR")
                .required(true)
                .help("Package directory; the archive is written beside it"),
        )
        .arg(
            Arg::new("nogpg")
                .long("nogpg")
                .action(ArgAction::SetTrue)
                .help("Skip detached signature verification"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Configuration file (overrides $MIXPKG_CONFIG)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase log verbosity (-v debug, -vv trace)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Only log warnings and errors"),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = match env::var("OUT_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=OUT_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = out_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    if let Err(e) = fs::write(man_dir.join("mixpkg.1"), buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
