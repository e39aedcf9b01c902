// tests/pipeline.rs

//! End-to-end pipeline tests against the library API.

mod common;

use common::{
    archive_entries, kitchen, sha256_hex, CountingDigester, CountingFetcher, StubVerifier, Workspace,
};
use mixpkg::manifest::{Manifest, MANIFEST_FILENAME};
use mixpkg::{load_recipe, Error, Kitchen, PackageMode};
use std::fs;

const PAYLOAD: &str = "hello from foo\n";

fn foo_recipe(ws: &Workspace, sha256: &str) -> std::path::PathBuf {
    ws.write("data.txt", PAYLOAD);
    ws.write(
        "foo.toml",
        &format!(
            r#"
[package]
name = "foo"
version = "1.0"
release = 1
arch = ["x86_64"]
description = "Test package"
license = ["MIT"]

[source]
files = ["data.txt"]
sha256sums = ["{sha256}"]

[stages]
build = 'touch "$srcdir/built" && cp data.txt "$pkgdir/data.txt"'
package = "true"
"#
        ),
    )
}

#[test]
fn test_compile_produces_archive() {
    let ws = Workspace::new();
    let recipe_path = foo_recipe(&ws, &sha256_hex(PAYLOAD.as_bytes()));
    let recipe = load_recipe(&recipe_path).unwrap();

    let archive = kitchen()
        .compile(&recipe, &ws.dirs(), &PackageMode::InProcess)
        .unwrap();
    assert_eq!(archive, ws.archive());

    let entries = archive_entries(&archive);
    assert_eq!(entries["data.txt"], PAYLOAD.as_bytes());

    let manifest_text = String::from_utf8(entries[MANIFEST_FILENAME].clone()).unwrap();
    assert!(manifest_text.contains("name = \"foo\""));
    assert!(manifest_text.contains("version = \"1.0\""));
    assert!(manifest_text.contains("release = \"1\""));

    let manifest = Manifest::parse(&manifest_text).unwrap();
    assert_eq!(manifest, Manifest::from_recipe(&recipe));
}

#[test]
fn test_checksum_mismatch_stops_before_build() {
    let ws = Workspace::new();
    let recipe_path = foo_recipe(&ws, &"0".repeat(64));
    let recipe = load_recipe(&recipe_path).unwrap();

    let result = kitchen().compile(&recipe, &ws.dirs(), &PackageMode::InProcess);
    match result {
        Err(Error::ChecksumMismatch { file, .. }) => assert_eq!(file, "data.txt"),
        other => panic!("expected ChecksumMismatch, got {:?}", other),
    }
    assert!(!ws.srcdir().join("built").exists());
    assert!(!ws.archive().exists());
}

#[test]
fn test_empty_arch_rejected_at_load() {
    let ws = Workspace::new();
    let path = ws.write(
        "foo.toml",
        r#"
[package]
name = "foo"
version = "1.0"
release = 1
arch = []

[stages]
build = "true"
package = "true"
"#,
    );

    assert!(matches!(load_recipe(&path), Err(Error::RecipeInvalid(_))));
    assert!(!ws.work_dir().exists());
}

#[test]
fn test_download_is_idempotent() {
    let ws = Workspace::new();
    let payload = b"remote payload";
    let path = ws.write(
        "foo.toml",
        &format!(
            r#"
[package]
name = "foo"
version = "1.0"
release = 1
arch = ["any"]

[source]
files = ["foo-1.0.txt::https://example.org/download?id=1"]
sha256sums = ["{}"]
"#,
            sha256_hex(payload)
        ),
    );
    let recipe = load_recipe(&path).unwrap();
    let fetcher = CountingFetcher::new(payload);
    let kitchen = kitchen().with_fetcher(Box::new(fetcher.clone()));

    kitchen.download(&recipe, &ws.dirs()).unwrap();
    kitchen.download(&recipe, &ws.dirs()).unwrap();

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(fs::read(ws.srcdir().join("foo-1.0.txt")).unwrap(), payload);
}

#[test]
fn test_skip_entries_are_not_hashed() {
    let ws = Workspace::new();
    ws.write("a.txt", "a");
    ws.write("b.txt", "b");
    let path = ws.write(
        "foo.toml",
        &format!(
            r#"
[package]
name = "foo"
version = "1.0"
release = 1
arch = ["any"]

[source]
files = ["a.txt", "b.txt"]
sha256sums = ["SKIP", "{}"]
"#,
            sha256_hex(b"b")
        ),
    );
    let recipe = load_recipe(&path).unwrap();
    let digester = CountingDigester::default();
    let kitchen = kitchen().with_digester(Box::new(digester.clone()));

    kitchen.download(&recipe, &ws.dirs()).unwrap();
    assert_eq!(digester.calls(), 1);
}

#[test]
fn test_missing_local_source() {
    let ws = Workspace::new();
    let path = ws.write(
        "foo.toml",
        r#"
[package]
name = "foo"
version = "1.0"
release = 1
arch = ["any"]

[source]
files = ["absent.patch"]
"#,
    );
    let recipe = load_recipe(&path).unwrap();
    assert!(matches!(
        kitchen().download(&recipe, &ws.dirs()),
        Err(Error::SourceNotFound(_))
    ));
}

#[test]
fn test_missing_build_hook() {
    let ws = Workspace::new();
    let path = ws.write(
        "foo.toml",
        r#"
[package]
name = "foo"
version = "1.0"
release = 1
arch = ["any"]

[stages]
prepare = 'touch "$srcdir/prepared"'
package = "true"
"#,
    );
    let recipe = load_recipe(&path).unwrap();
    assert!(matches!(
        kitchen().build(&recipe, &ws.dirs()),
        Err(Error::StageMissing("build"))
    ));
    assert!(!ws.srcdir().join("prepared").exists());
}

#[test]
fn test_failing_check_stops_pipeline() {
    let ws = Workspace::new();
    let path = ws.write(
        "foo.toml",
        r#"
[package]
name = "foo"
version = "1.0"
release = 1
arch = ["any"]

[stages]
build = "true"
check = "exit 3"
package = "true"
"#,
    );
    let recipe = load_recipe(&path).unwrap();
    let result = kitchen().compile(&recipe, &ws.dirs(), &PackageMode::InProcess);
    assert!(matches!(result, Err(Error::StageFailed { stage: "check", .. })));
    assert!(!ws.archive().exists());
}

#[test]
fn test_gzip_source_is_extracted() {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let ws = Workspace::new();
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(PAYLOAD.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "foo-1.0/README", PAYLOAD.as_bytes())
        .unwrap();
    let tarball = builder.into_inner().unwrap().finish().unwrap();
    fs::write(ws.recipe_dir().join("foo-1.0.tar.gz"), &tarball).unwrap();

    let path = ws.write(
        "foo.toml",
        &format!(
            r#"
[package]
name = "foo"
version = "1.0"
release = 1
arch = ["any"]

[source]
files = ["foo-1.0.tar.gz"]
sha256sums = ["{}"]
"#,
            sha256_hex(&tarball)
        ),
    );
    let recipe = load_recipe(&path).unwrap();
    kitchen().download(&recipe, &ws.dirs()).unwrap();

    assert_eq!(
        fs::read_to_string(ws.srcdir().join("foo-1.0/README")).unwrap(),
        PAYLOAD
    );
}

#[test]
fn test_pkgbuild_compile() {
    let ws = Workspace::new();
    ws.write("data.txt", PAYLOAD);
    ws.write("foo.install", "post_install() { :; }\n");
    let path = ws.write(
        "PKGBUILD",
        &format!(
            r#"# Maintainer: nobody
pkgname=foo
pkgver=1.0
pkgrel=2
pkgdesc="Test package"
arch=('x86_64')
license=('MIT')
depends=('glibc' 'zlib>=1.2')
install=foo.install
source=("data.txt")
sha256sums=('{}')

build() {{
    cp data.txt data.out
}}

package() {{
    mkdir -p "$pkgdir/usr/share/foo"
    cp data.out "$pkgdir/usr/share/foo/data.txt"
}}
"#,
            sha256_hex(PAYLOAD.as_bytes())
        ),
    );
    let recipe = load_recipe(&path).unwrap();
    assert_eq!(recipe.release, 2);
    assert_eq!(recipe.depends.depends, vec!["glibc", "zlib>=1.2"]);

    let archive = kitchen()
        .compile(&recipe, &ws.dirs(), &PackageMode::InProcess)
        .unwrap();
    let entries = archive_entries(&archive);
    assert_eq!(entries["usr/share/foo/data.txt"], PAYLOAD.as_bytes());
    assert!(entries.contains_key(".foo.install"));
    assert!(entries.contains_key(MANIFEST_FILENAME));
}

#[test]
fn test_dump_matches_packaged_manifest() {
    let ws = Workspace::new();
    let recipe_path = foo_recipe(&ws, &sha256_hex(PAYLOAD.as_bytes()));
    let recipe = load_recipe(&recipe_path).unwrap();
    let kitchen = kitchen();

    let dumped = kitchen.dump(&recipe).unwrap();
    kitchen
        .compile(&recipe, &ws.dirs(), &PackageMode::InProcess)
        .unwrap();
    let written = fs::read_to_string(ws.pkgdir().join(MANIFEST_FILENAME)).unwrap();
    assert_eq!(dumped, written);
}

#[test]
fn test_symlinked_pkgbuild_builds_from_link_directory() {
    let ws = Workspace::new();
    ws.write("data.txt", PAYLOAD);

    let real = ws.root().join("real");
    fs::create_dir(&real).unwrap();
    fs::write(
        real.join("foo.pkgbuild"),
        format!(
            r#"pkgname=foo
pkgver=1.0
pkgrel=1
arch=('any')
source=("data.txt")
sha256sums=('{}')

build() {{
    cp data.txt "$pkgdir/data.txt"
}}

package() {{
    test -f "$startdir/PKGBUILD"
}}
"#,
            sha256_hex(PAYLOAD.as_bytes())
        ),
    )
    .unwrap();
    let link = ws.recipe_dir().join("PKGBUILD");
    std::os::unix::fs::symlink(real.join("foo.pkgbuild"), &link).unwrap();

    let recipe = load_recipe(&link).unwrap();
    assert_eq!(recipe.base_dir, ws.recipe_dir());

    let archive = kitchen()
        .compile(&recipe, &ws.dirs(), &PackageMode::InProcess)
        .unwrap();
    assert_eq!(archive_entries(&archive)["data.txt"], PAYLOAD.as_bytes());
}

/// Recipe with a gzip tarball and its detached signature; no checksums
fn signed_recipe(ws: &Workspace) -> mixpkg::Recipe {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(PAYLOAD.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "foo-1.0/README", PAYLOAD.as_bytes())
        .unwrap();
    let tarball = builder.into_inner().unwrap().finish().unwrap();
    fs::write(ws.recipe_dir().join("foo-1.0.tar.gz"), &tarball).unwrap();
    ws.write("foo-1.0.tar.gz.sig", "signature bytes");

    let path = ws.write(
        "foo.toml",
        r#"
[package]
name = "foo"
version = "1.0"
release = 1
arch = ["any"]

[source]
files = ["foo-1.0.tar.gz", "foo-1.0.tar.gz.sig"]

[stages]
build = 'touch "$srcdir/built"'
package = "true"
"#,
    );
    load_recipe(&path).unwrap()
}

#[test]
fn test_bad_signature_stops_before_extraction() {
    let ws = Workspace::new();
    let recipe = signed_recipe(&ws);
    let verifier = StubVerifier::rejecting();
    let kitchen = kitchen().with_signature_verifier(Box::new(verifier.clone()));

    match kitchen.compile(&recipe, &ws.dirs(), &PackageMode::InProcess) {
        Err(Error::SignatureFailed { file, .. }) => assert_eq!(file, "foo-1.0.tar.gz.sig"),
        other => panic!("expected SignatureFailed, got {:?}", other),
    }
    assert_eq!(verifier.calls(), 1);
    assert!(!ws.srcdir().join("foo-1.0").exists());
    assert!(!ws.srcdir().join("built").exists());
    assert!(!ws.archive().exists());
}

#[test]
fn test_good_signature_allows_extraction() {
    let ws = Workspace::new();
    let recipe = signed_recipe(&ws);
    let verifier = StubVerifier::accepting();
    let kitchen = kitchen().with_signature_verifier(Box::new(verifier.clone()));

    kitchen.download(&recipe, &ws.dirs()).unwrap();
    assert_eq!(verifier.calls(), 1);
    assert_eq!(
        fs::read_to_string(ws.srcdir().join("foo-1.0/README")).unwrap(),
        PAYLOAD
    );
}

#[test]
fn test_disabled_signatures_are_not_checked() {
    let ws = Workspace::new();
    let recipe = signed_recipe(&ws);
    let mut config = common::in_process_config();
    config.signature.enabled = false;
    let verifier = StubVerifier::rejecting();
    let kitchen = Kitchen::new(config)
        .unwrap()
        .with_signature_verifier(Box::new(verifier.clone()));

    kitchen.download(&recipe, &ws.dirs()).unwrap();
    assert_eq!(verifier.calls(), 0);
    assert!(ws.srcdir().join("foo-1.0/README").is_file());
}
