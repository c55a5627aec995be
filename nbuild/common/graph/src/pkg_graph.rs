//! One architecture pair's live package graph: an [`nbuild_types::Atom`]
//! plus the two locks spec section 3/5 require (`Pkgs` for the package
//! map, `Aux` for `virtual`/`bad`) and the base path of the checkout it
//! was imported from.
//!
//! Lock order is Pkgs-then-Aux, never reversed; every method here either
//! takes one lock or takes Pkgs before Aux.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use nbuild_importer::ImportTarget;
use nbuild_types::{Atom, Package, SpecTuple};

struct PkgsState {
    rev: String,
    pkgs: HashMap<String, Package>,
}

#[derive(Default)]
struct AuxState {
    virtual_packages: HashMap<String, String>,
    bad: HashMap<String, String>,
}

pub struct PkgGraph {
    spec: SpecTuple,
    base_path: PathBuf,
    pkgs: Mutex<PkgsState>,
    aux: Mutex<AuxState>,
}

impl PkgGraph {
    pub fn new(spec: SpecTuple, base_path: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            base_path: base_path.into(),
            pkgs: Mutex::new(PkgsState {
                rev: String::new(),
                pkgs: HashMap::new(),
            }),
            aux: Mutex::new(AuxState::default()),
        }
    }

    pub fn spec(&self) -> &SpecTuple {
        &self.spec
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn rev(&self) -> String {
        self.pkgs.lock().unwrap().rev.clone()
    }

    pub fn set_rev(&self, rev: impl Into<String>) {
        self.pkgs.lock().unwrap().rev = rev.into();
    }

    /// Overwrites this graph's live state from a persisted or freshly
    /// bootstrapped [`Atom`]. Acquires Pkgs then Aux.
    pub fn hydrate(&self, atom: Atom) {
        {
            let mut pkgs = self.pkgs.lock().unwrap();
            pkgs.rev = atom.rev;
            pkgs.pkgs = atom.pkgs;
        }
        {
            let mut aux = self.aux.lock().unwrap();
            aux.virtual_packages = atom.virtual_packages;
            aux.bad = atom.bad;
        }
    }

    /// A serializable snapshot of the current state, for persistence and
    /// for the Dispatch Finder's per-spec atomic scan.
    pub fn to_atom(&self) -> Atom {
        let pkgs = self.pkgs.lock().unwrap();
        let aux = self.aux.lock().unwrap();
        Atom {
            spec: self.spec.clone(),
            rev: pkgs.rev.clone(),
            pkgs: pkgs.pkgs.clone(),
            virtual_packages: aux.virtual_packages.clone(),
            bad: aux.bad.clone(),
        }
    }

    pub fn get_pkg(&self, name: &str) -> Option<Package> {
        self.pkgs.lock().unwrap().pkgs.get(name).cloned()
    }

    /// The `dirty && !failed` packages in this graph (`GetDirty`/the
    /// Dispatch Finder's input set).
    pub fn dirty_pkgs(&self) -> Vec<Package> {
        self.pkgs
            .lock()
            .unwrap()
            .pkgs
            .values()
            .filter(|p| p.dirty && !p.failed)
            .cloned()
            .collect()
    }

    /// Clears `dirty` on `name` if present; a no-op (not an error) if the
    /// package has since disappeared, since `Clean` works off a snapshot
    /// that may race a concurrent import.
    pub fn clear_dirty(&self, name: &str) {
        if let Some(pkg) = self.pkgs.lock().unwrap().pkgs.get_mut(name) {
            pkg.dirty = false;
        }
    }

    pub fn fail(&self, name: &str) -> Result<(), UnknownPackage> {
        self.set_failed(name, true)
    }

    pub fn unfail(&self, name: &str) -> Result<(), UnknownPackage> {
        self.set_failed(name, false)
    }

    fn set_failed(&self, name: &str, failed: bool) -> Result<(), UnknownPackage> {
        let mut pkgs = self.pkgs.lock().unwrap();
        match pkgs.pkgs.get_mut(name) {
            Some(pkg) => {
                pkg.failed = failed;
                Ok(())
            }
            None => Err(UnknownPackage(name.to_string())),
        }
    }

    /// Reads `etc/defaults.virtual` out of the checkout and replaces the
    /// `virtual` map (spec C.2's supplemented bootstrap step). Lines are
    /// `alias target`; blank lines and `#`-comments are skipped.
    pub fn load_virtual(&self) -> std::io::Result<()> {
        let path = self.base_path.join("etc/defaults.virtual");
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };
        let parsed = parse_virtual_defaults(&contents);
        self.aux.lock().unwrap().virtual_packages = parsed;
        Ok(())
    }

    pub fn virtual_packages(&self) -> HashMap<String, String> {
        self.aux.lock().unwrap().virtual_packages.clone()
    }
}

fn parse_virtual_defaults(contents: &str) -> HashMap<String, String> {
    let mut virtual_packages = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        if let (Some(alias), Some(target)) = (fields.next(), fields.next()) {
            virtual_packages.insert(alias.to_string(), target.to_string());
        }
    }
    virtual_packages
}

#[derive(Debug, thiserror::Error)]
#[error("unknown package {0:?}")]
pub struct UnknownPackage(pub String);

impl ImportTarget for PkgGraph {
    fn upsert(&self, pkg: Package) {
        let name = pkg.name.clone();
        {
            self.pkgs.lock().unwrap().pkgs.insert(name.clone(), pkg);
        }
        self.aux.lock().unwrap().bad.remove(&name);
    }

    fn remove(&self, name: &str) {
        self.pkgs.lock().unwrap().pkgs.remove(name);
    }

    fn record_bad(&self, name: &str, message: String) {
        self.pkgs.lock().unwrap().pkgs.remove(name);
        self.aux
            .lock()
            .unwrap()
            .bad
            .insert(name.to_string(), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec() -> SpecTuple {
        SpecTuple::new("x86_64", "x86_64")
    }

    #[test]
    fn hydrate_then_to_atom_round_trips() {
        let graph = PkgGraph::new(spec(), "/tmp/checkout");
        let mut atom = Atom::new(spec());
        atom.rev = "abc123".to_string();
        atom.pkgs.insert(
            "a".to_string(),
            Package {
                name: "a".to_string(),
                dirty: true,
                ..Default::default()
            },
        );
        graph.hydrate(atom.clone());
        assert_eq!(graph.to_atom(), atom);
    }

    #[test]
    fn upsert_clears_stale_bad_entry() {
        let graph = PkgGraph::new(spec(), "/tmp/checkout");
        graph.record_bad("a", "boom".to_string());
        assert_eq!(graph.to_atom().bad.get("a").unwrap(), "boom");

        graph.upsert(Package {
            name: "a".to_string(),
            dirty: true,
            ..Default::default()
        });
        let atom = graph.to_atom();
        assert!(atom.bad.is_empty());
        assert!(atom.pkgs.contains_key("a"));
    }

    #[test]
    fn fail_and_unfail_round_trip() {
        let graph = PkgGraph::new(spec(), "/tmp/checkout");
        graph.upsert(Package {
            name: "a".to_string(),
            dirty: true,
            ..Default::default()
        });
        graph.fail("a").unwrap();
        assert!(graph.get_pkg("a").unwrap().failed);
        graph.unfail("a").unwrap();
        assert!(!graph.get_pkg("a").unwrap().failed);
        assert!(graph.fail("missing").is_err());
    }

    #[test]
    fn clear_dirty_on_missing_package_is_not_an_error() {
        let graph = PkgGraph::new(spec(), "/tmp/checkout");
        graph.clear_dirty("nope");
    }

    #[test]
    fn parses_virtual_defaults_skipping_comments_and_blanks() {
        let parsed = parse_virtual_defaults(
            "# comment\n\nc-runtime glibc\nservicedir runit\n  \n# trailing\n",
        );
        assert_eq!(parsed.get("c-runtime").unwrap(), "glibc");
        assert_eq!(parsed.get("servicedir").unwrap(), "runit");
        assert_eq!(parsed.len(), 2);
    }
}
