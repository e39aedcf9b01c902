// src/recipe/pkgbuild.rs

//! PKGBUILD recipe scanner
//!
//! PKGBUILDs are Bash scripts with specific variables and functions:
//!
//! ```bash
//! pkgname=nano
//! pkgver=8.5
//! pkgrel=2
//! pkgdesc="A small and friendly text editor"
//! arch=('x86_64')
//! license=('GPL')
//! depends=('ncurses')
//! source=("https://nano-editor.org/dist/v8/nano-$pkgver.tar.xz")
//! sha256sums=('abc123...')
//!
//! build() {
//!     cd "$pkgname-$pkgver"
//!     ./configure --prefix=/usr
//!     make
//! }
//!
//! package() {
//!     cd "$pkgname-$pkgver"
//!     make DESTDIR="$pkgdir" install
//! }
//! ```
//!
//! The file is never executed at load time. Top-level assignments are read
//! statically, `$var` and `${var}` references to earlier scalar assignments are
//! expanded outside single quotes, and each declared stage function becomes a
//! hook that sources this same file when the stage runs.
//!
//! # Limitations
//!
//! - Command substitution and parameter operators (`${pkgver%.*}`) are kept verbatim
//! - Split packages (`pkgname=(...)`) are not supported
//! - Architecture-specific arrays (`source_x86_64`) are ignored

use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use crate::recipe::format::{NumberField, RecipeFile, Stage, StageHook};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

static ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)(\+?)=(.*)$").expect("valid assignment regex")
});

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:function\s+)?([A-Za-z_][A-Za-z0-9_-]*)\s*\(\s*\)\s*(.*)$")
        .expect("valid function regex")
});

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("valid reference regex")
});

#[derive(Error, Debug)]
pub enum PkgbuildError {
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

/// A top-level assignment value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Scalar(String),
    Array(Vec<String>),
}

impl Value {
    fn into_list(self) -> Vec<String> {
        match self {
            Self::Scalar(s) if s.is_empty() => Vec::new(),
            Self::Scalar(s) => vec![s],
            Self::Array(items) => items,
        }
    }

    fn into_scalar(self) -> String {
        match self {
            Self::Scalar(s) => s,
            Self::Array(items) => items.into_iter().next().unwrap_or_default(),
        }
    }
}

/// Everything a static scan of a PKGBUILD yields
#[derive(Debug, Default)]
pub struct PkgbuildScan {
    /// Top-level assignments, last one wins
    pub variables: HashMap<String, Value>,
    /// Names of declared shell functions
    pub functions: BTreeSet<String>,
}

/// Parse a PKGBUILD into the raw recipe form
pub fn parse_pkgbuild(content: &str, path: &Path) -> Result<RecipeFile> {
    let scan = scan_pkgbuild(content).map_err(|e| match e {
        PkgbuildError::Unsupported(message) => Error::RecipeInvalid(message),
        PkgbuildError::Syntax { .. } => Error::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
    })?;

    debug!(
        "Scanned {}: {} variables, functions {:?}",
        path.display(),
        scan.variables.len(),
        scan.functions
    );

    let hook_source = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| path.to_path_buf());

    Ok(into_recipe_file(scan, &hook_source))
}

fn take_scalar(vars: &mut HashMap<String, Value>, key: &str) -> Option<String> {
    vars.remove(key).map(Value::into_scalar)
}

fn take_list(vars: &mut HashMap<String, Value>, key: &str) -> Vec<String> {
    vars.remove(key).map(Value::into_list).unwrap_or_default()
}

fn into_recipe_file(mut scan: PkgbuildScan, hook_source: &Path) -> RecipeFile {
    let vars = &mut scan.variables;
    let mut file = RecipeFile::default();

    let package = &mut file.package;
    package.name = take_scalar(vars, "pkgname");
    package.version = take_scalar(vars, "pkgver");
    package.release = take_scalar(vars, "pkgrel").map(NumberField::Text);
    package.epoch = take_scalar(vars, "epoch").map(NumberField::Text);
    package.description = take_scalar(vars, "pkgdesc");
    package.url = take_scalar(vars, "url");
    package.license = take_list(vars, "license");
    package.groups = take_list(vars, "groups");
    package.arch = take_list(vars, "arch");
    package.backup = take_list(vars, "backup");
    package.install = take_scalar(vars, "install")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);
    package.changelog = take_scalar(vars, "changelog")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    let depends = &mut file.depends;
    depends.depends = take_list(vars, "depends");
    depends.makedepends = take_list(vars, "makedepends");
    depends.checkdepends = take_list(vars, "checkdepends");
    depends.optdepends = take_list(vars, "optdepends");
    depends.conflicts = take_list(vars, "conflicts");
    depends.provides = take_list(vars, "provides");
    depends.replaces = take_list(vars, "replaces");

    file.source.files = take_list(vars, "source");
    file.source.noextract = take_list(vars, "noextract");
    for algorithm in HashAlgorithm::ALL {
        if let Some(value) = vars.remove(algorithm.table_key()) {
            *file.source.checksum_table_mut(algorithm) = Some(value.into_list());
        }
    }

    for stage in [Stage::Prepare, Stage::Build, Stage::Check, Stage::Package] {
        if !scan.functions.contains(stage.as_str()) {
            continue;
        }
        let hook = Some(StageHook::Function {
            source: hook_source.to_path_buf(),
            function: stage.as_str().to_string(),
        });
        match stage {
            Stage::Prepare => file.stages.prepare = hook,
            Stage::Build => file.stages.build = hook,
            Stage::Check => file.stages.check = hook,
            Stage::Package => file.stages.package = hook,
        }
    }

    file
}

/// Statically scan PKGBUILD content
pub fn scan_pkgbuild(content: &str) -> std::result::Result<PkgbuildScan, PkgbuildError> {
    let lines: Vec<&str> = content.lines().collect();
    let mut scan = PkgbuildScan::default();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();
        i += 1;

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(caps) = FUNCTION_RE.captures(line) {
            let name = caps[1].to_string();
            let start = i;
            let mut depth = brace_delta(&caps[2]);
            let mut opened = depth > 0 || caps[2].contains('{');

            while i < lines.len() && (!opened || depth > 0) {
                let delta = brace_delta(lines[i]);
                if !opened && lines[i].contains('{') {
                    opened = true;
                }
                depth += delta;
                i += 1;
            }
            if depth > 0 {
                return Err(PkgbuildError::Syntax {
                    line: start,
                    message: format!("unterminated function {}()", name),
                });
            }
            scan.functions.insert(name);
            continue;
        }

        let Some(caps) = ASSIGNMENT_RE.captures(line) else {
            continue;
        };
        let name = caps[1].to_string();
        let append = &caps[2] == "+";
        let rest = caps[3].trim_start();

        let value = if let Some(array_text) = rest.strip_prefix('(') {
            let start = i;
            let mut text = array_text.to_string();
            loop {
                if let Some(end) = find_unquoted(&text, ')') {
                    text.truncate(end);
                    break;
                }
                if i >= lines.len() {
                    return Err(PkgbuildError::Syntax {
                        line: start,
                        message: format!("unterminated array {}", name),
                    });
                }
                text.push('\n');
                text.push_str(lines[i]);
                i += 1;
            }
            Value::Array(split_words(&text, &scan.variables))
        } else {
            Value::Scalar(split_words(rest, &scan.variables).join(" "))
        };

        if name == "pkgname" && matches!(value, Value::Array(_)) {
            return Err(PkgbuildError::Unsupported(
                "split packages (pkgname=(...)) are not supported".to_string(),
            ));
        }

        let value = match (append, scan.variables.remove(&name)) {
            (true, Some(previous)) => {
                let mut items = previous.into_list();
                items.extend(value.into_list());
                Value::Array(items)
            }
            _ => value,
        };
        scan.variables.insert(name, value);
    }

    Ok(scan)
}

/// Net change in brace depth for a line, ignoring quoted text and comments
fn brace_delta(line: &str) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut word_start = true;

    for c in line.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => {}
            (_, '\\') => escaped = true,
            (Some('"'), '"') => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '#') if word_start => break,
            (None, '{') => depth += 1,
            (None, '}') => depth -= 1,
            (None, _) => {}
        }
        word_start = quote.is_none() && (c.is_whitespace() || c == ';');
    }

    depth
}

/// Byte offset of the first `target` outside quotes and comments
fn find_unquoted(text: &str, target: char) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut in_comment = false;
    let mut word_start = true;

    for (idx, c) in text.char_indices() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
                word_start = true;
            }
            continue;
        }
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => {}
            (_, '\\') => escaped = true,
            (Some('"'), '"') => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '#') if word_start => in_comment = true,
            (None, c) if c == target => return Some(idx),
            (None, _) => {}
        }
        word_start = quote.is_none() && c.is_whitespace();
    }

    None
}

/// Split shell words, removing quotes and expanding known variables
///
/// Single-quoted text is literal. Unquoted `#` at the start of a word begins
/// a comment that runs to the end of the line.
fn split_words(text: &str, vars: &HashMap<String, Value>) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_word = true;
                let mut segment = String::new();
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => {
                            if let Some(next) = chars.next() {
                                if !matches!(next, '"' | '\\' | '$' | '`') {
                                    segment.push('\\');
                                }
                                segment.push(next);
                            }
                        }
                        _ => segment.push(q),
                    }
                }
                current.push_str(&expand(&segment, vars));
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    if next != '\n' {
                        current.push(next);
                    }
                }
            }
            '#' if !in_word => {
                for q in chars.by_ref() {
                    if q == '\n' {
                        break;
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            _ => {
                in_word = true;
                let mut segment = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || matches!(next, '\'' | '"' | '\\') {
                        break;
                    }
                    segment.push(next);
                    chars.next();
                }
                current.push_str(&expand(&segment, vars));
            }
        }
    }

    if in_word {
        words.push(current);
    }

    words
}

/// Expand `$var` and `${var}` references to known scalar variables
///
/// Unknown references are left as written.
fn expand(text: &str, vars: &HashMap<String, Value>) -> String {
    REFERENCE_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            match vars.get(name) {
                Some(Value::Scalar(value)) => value.clone(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}
