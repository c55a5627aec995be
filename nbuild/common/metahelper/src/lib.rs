//! The external per-package metadata helper: a `Command`-shaped interface
//! plus the line-oriented grammar its output is parsed with, grounded in
//! how `alchemist::ebuild::metadata` shells out to evaluate one ebuild and
//! turns its output into `BashVars`.
//!
//! Only the trait and the grammar matter here — the actual `xbps-src
//! dbulk-dump` helper is an external tool this crate never invokes in
//! tests, only through [`ExternalMetaHelper`] at runtime.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};

/// Runs the per-package metadata helper against one package name in a
/// checkout, for one target architecture.
pub trait MetaHelper: Send + Sync {
    /// Returns the helper's raw stdout. Implementations should fold a
    /// non-zero exit status into `Err` carrying the helper's stderr.
    fn dump(&self, arch: &str, name: &str, checkout_dir: &Path) -> Result<String>;
}

/// Shells out to `xbps-src dbulk-dump <name>` with the target arch set in
/// the environment, run inside the checkout directory.
pub struct ExternalMetaHelper {
    program: String,
}

impl ExternalMetaHelper {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ExternalMetaHelper {
    fn default() -> Self {
        Self::new("xbps-src")
    }
}

impl MetaHelper for ExternalMetaHelper {
    #[tracing::instrument(skip(self))]
    fn dump(&self, arch: &str, name: &str, checkout_dir: &Path) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("dbulk-dump")
            .arg(name)
            .env("XBPS_TARGET_ARCH", arch)
            .current_dir(checkout_dir)
            .output()
            .with_context(|| format!("failed to spawn {} for {name}", self.program))?;

        if !output.status.success() {
            bail!(
                "{} dbulk-dump {name} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Normalizes a dependency expression into a canonical package name, the
/// external-helper half of the virtual/atom resolution chain
/// (`xbps-uhelper getpkgname` / `getpkgdepname`).
pub trait NameNormalizer: Send + Sync {
    /// Strips a version constraint (e.g. `foo>=1.2`) down to its plain
    /// dependency name.
    fn getpkgdepname(&self, token: &str) -> Result<String>;
    /// Resolves a package name to the canonical name providing it.
    fn getpkgname(&self, token: &str) -> Result<String>;
}

/// Shells out to `xbps-uhelper` for both normalization operations.
pub struct ExternalNameNormalizer {
    program: String,
}

impl ExternalNameNormalizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, subcommand: &str, token: &str) -> Result<String> {
        let output = Command::new(&self.program)
            .arg(subcommand)
            .arg(token)
            .output()
            .with_context(|| format!("failed to spawn {} {subcommand} {token}", self.program))?;
        if !output.status.success() {
            bail!(
                "{} {subcommand} {token} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for ExternalNameNormalizer {
    fn default() -> Self {
        Self::new("xbps-uhelper")
    }
}

impl NameNormalizer for ExternalNameNormalizer {
    fn getpkgdepname(&self, token: &str) -> Result<String> {
        self.run("getpkgdepname", token)
    }

    fn getpkgname(&self, token: &str) -> Result<String> {
        self.run("getpkgname", token)
    }
}

/// The relevant keys of a parsed helper dump, before version composition.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct PackageMetadata {
    pub pkgname: String,
    pub version: String,
    pub revision: String,
    pub host_depends: Vec<String>,
    pub make_depends: Vec<String>,
    pub depends: Vec<String>,
}

impl PackageMetadata {
    /// The composed `"${version}_${revision}"` string the graph manager
    /// stores as `Package::version`.
    pub fn composed_version(&self) -> String {
        format!("{}_{}", self.version, self.revision)
    }

    /// Parses one helper invocation's stdout per the grammar: a line
    /// containing `:` starts a key (text after the colon is its initial
    /// value, if any); a following line with no `:` is appended,
    /// space-separated, to the current key. Unrecognized keys are kept in
    /// the raw map but dropped from the typed struct.
    pub fn from_dump(raw: &str) -> Result<Self> {
        let fields = parse_dump_output(raw);

        let depends_list = |key: &str| -> Vec<String> {
            fields
                .get(key)
                .map(|v| v.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default()
        };

        let pkgname = fields
            .get("pkgname")
            .cloned()
            .context("helper output missing pkgname")?;

        Ok(Self {
            pkgname,
            version: fields.get("version").cloned().unwrap_or_default(),
            revision: fields.get("revision").cloned().unwrap_or_default(),
            host_depends: depends_list("hostmakedepends"),
            make_depends: depends_list("makedepends"),
            depends: depends_list("depends"),
        })
    }
}

/// Parses the helper's line-oriented grammar into a raw key/value map,
/// keeping every key it sees (not just the ones [`PackageMetadata`] cares
/// about), so callers needing other fields can still reach them.
pub fn parse_dump_output(raw: &str) -> HashMap<String, String> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut current_key: Option<String> = None;

    for line in raw.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_string();
            let value = value.trim();
            let entry = fields.entry(key.clone()).or_default();
            if !value.is_empty() {
                if !entry.is_empty() {
                    entry.push(' ');
                }
                entry.push_str(value);
            }
            current_key = Some(key);
        } else if let Some(key) = &current_key {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let entry = fields.entry(key.clone()).or_default();
            if !entry.is_empty() {
                entry.push(' ');
            }
            entry.push_str(trimmed);
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_simple_and_continuation_lines() {
        let raw = "pkgname: hello\nversion: 1.2.3\nrevision: 1\ndepends: libc\n openssl\n";
        let fields = parse_dump_output(raw);
        assert_eq!(fields.get("pkgname").unwrap(), "hello");
        assert_eq!(fields.get("depends").unwrap(), "libc openssl");
    }

    #[test]
    fn empty_value_line_still_opens_key_for_continuations() {
        let raw = "makedepends:\n cmake\n ninja\n";
        let fields = parse_dump_output(raw);
        assert_eq!(fields.get("makedepends").unwrap(), "cmake ninja");
    }

    #[test]
    fn from_dump_splits_whitespace_lists_and_composes_version() {
        let raw = "pkgname: hello\nversion: 1.2.3\nrevision: 4\nhostmakedepends: pkg-config\nmakedepends: cmake ninja\ndepends: libc\n openssl\n";
        let metadata = PackageMetadata::from_dump(raw).unwrap();
        assert_eq!(metadata.pkgname, "hello");
        assert_eq!(metadata.host_depends, vec!["pkg-config"]);
        assert_eq!(metadata.make_depends, vec!["cmake", "ninja"]);
        assert_eq!(metadata.depends, vec!["libc", "openssl"]);
        assert_eq!(metadata.composed_version(), "1.2.3_4");
    }

    #[test]
    fn from_dump_requires_pkgname() {
        let raw = "version: 1.2.3\nrevision: 1\n";
        assert!(PackageMetadata::from_dump(raw).is_err());
    }

    struct StaticHelper(&'static str);
    impl MetaHelper for StaticHelper {
        fn dump(&self, _arch: &str, _name: &str, _checkout_dir: &Path) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn trait_object_usable_behind_dyn() {
        let helper: Box<dyn MetaHelper> = Box::new(StaticHelper("pkgname: x\nversion: 1\nrevision: 1\n"));
        let raw = helper.dump("x86_64", "x", Path::new("/tmp")).unwrap();
        let metadata = PackageMetadata::from_dump(&raw).unwrap();
        assert_eq!(metadata.pkgname, "x");
    }
}
