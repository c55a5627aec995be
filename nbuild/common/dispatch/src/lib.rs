//! The Dispatch Finder: pure functions over a snapshot of every known
//! atom, deciding which packages are immediately buildable.
//!
//! Takes a `HashMap<SpecTuple, Atom>` rather than touching any locks
//! itself — `nbuild-graph::Manager` is responsible for taking that
//! snapshot atomically per spec before calling in here.

use std::collections::HashMap;

use nbuild_types::{Atom, Package, SpecTuple};

/// Returns whether `p`, living in `spec`'s atom, currently satisfies the
/// dispatchability invariant: every host dependency resolves clean in the
/// host atom `(spec.host, spec.host)`, and every make/plain dependency
/// resolves clean within `spec`'s own atom.
///
/// A missing atom or a missing referent logs a warning and yields `false`
/// rather than erroring — this is read-only analysis over a possibly
/// incomplete snapshot, never a hard failure.
pub fn is_dispatchable(spec: &SpecTuple, p: &Package, atoms: &HashMap<SpecTuple, Atom>) -> bool {
    let host_spec = spec.host_spec();
    let host_atom = atoms.get(&host_spec);

    // Non-native graphs can never dispatch without their host atom, even
    // for a package with no host dependencies of its own.
    if !spec.native() && host_atom.is_none() {
        tracing::warn!(%spec, %host_spec, pkg = %p.name, "host atom missing, dispatch disabled");
        return false;
    }

    if !p.host_depends.is_empty() {
        let Some(host_atom) = host_atom else {
            tracing::warn!(%spec, %host_spec, pkg = %p.name, "host atom missing, dispatch disabled");
            return false;
        };
        for dep in &p.host_depends {
            if !dep_is_clean(host_atom, dep, spec, &p.name, "host") {
                return false;
            }
        }
    }

    let Some(target_atom) = atoms.get(spec) else {
        tracing::warn!(%spec, pkg = %p.name, "spec's own atom missing, dispatch disabled");
        return false;
    };
    for dep in p.make_depends.iter().chain(p.depends.iter()) {
        if !dep_is_clean(target_atom, dep, spec, &p.name, "target") {
            return false;
        }
    }

    true
}

fn dep_is_clean(atom: &Atom, dep: &str, spec: &SpecTuple, pkg: &str, kind: &str) -> bool {
    match atom.pkgs.get(dep) {
        None => {
            tracing::warn!(%spec, pkg, dep, kind, "dependency does not resolve");
            false
        }
        Some(dep_pkg) => !dep_pkg.dirty && !dep_pkg.failed,
    }
}

/// For every spec in `atoms`, the list of packages in that spec's atom
/// that are `dirty && !failed && is_dispatchable`. Each spec's scan reads
/// a single already-taken snapshot, so it is atomic with respect to that
/// spec; no cross-spec atomicity is implied or required.
pub fn immediately_dispatchable(
    atoms: &HashMap<SpecTuple, Atom>,
) -> HashMap<SpecTuple, Vec<Package>> {
    let mut result = HashMap::new();
    for (spec, atom) in atoms {
        let dispatchable: Vec<Package> = atom
            .pkgs
            .values()
            .filter(|p| p.dirty && !p.failed && is_dispatchable(spec, p, atoms))
            .cloned()
            .collect();
        result.insert(spec.clone(), dispatchable);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pkg(name: &str, dirty: bool, failed: bool, depends: &[&str]) -> Package {
        Package {
            name: name.to_string(),
            version: "1.0_1".to_string(),
            revision: "1".to_string(),
            dirty,
            failed,
            depends: depends.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn chain_a_to_b_to_c_dispatchable_only_at_the_leaf() {
        let spec = SpecTuple::new("x86_64", "x86_64");
        let mut atom = Atom::new(spec.clone());
        atom.pkgs.insert("a".into(), pkg("a", true, false, &["b"]));
        atom.pkgs.insert("b".into(), pkg("b", true, false, &["c"]));
        atom.pkgs.insert("c".into(), pkg("c", true, false, &[]));

        let atoms = HashMap::from([(spec.clone(), atom)]);
        let dispatchable = immediately_dispatchable(&atoms);
        let names: Vec<&str> = dispatchable[&spec].iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["c"]);
    }

    #[test]
    fn clean_dependency_unblocks_dependent() {
        let spec = SpecTuple::new("x86_64", "x86_64");
        let mut atom = Atom::new(spec.clone());
        atom.pkgs.insert("a".into(), pkg("a", true, false, &["b"]));
        atom.pkgs.insert("b".into(), pkg("b", false, false, &[]));

        let atoms = HashMap::from([(spec.clone(), atom)]);
        let dispatchable = immediately_dispatchable(&atoms);
        let names: Vec<&str> = dispatchable[&spec].iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn failed_package_removed_from_dispatchable_and_blocks_dependents() {
        let spec = SpecTuple::new("x86_64", "x86_64");
        let mut atom = Atom::new(spec.clone());
        atom.pkgs.insert("a".into(), pkg("a", true, false, &["b"]));
        atom.pkgs.insert("b".into(), pkg("b", true, true, &[]));

        let atoms = HashMap::from([(spec.clone(), atom)]);
        let dispatchable = immediately_dispatchable(&atoms);
        assert!(dispatchable[&spec].is_empty());
    }

    #[test]
    fn missing_host_atom_disables_dispatch_for_non_native_spec() {
        let spec = SpecTuple::new("x86_64", "armv7l");
        let mut atom = Atom::new(spec.clone());
        atom.pkgs
            .insert("cross-gcc-user".into(), {
                let mut p = pkg("cross-gcc-user", true, false, &[]);
                p.host_depends.insert("cross-gcc".to_string());
                p
            });

        let atoms = HashMap::from([(spec.clone(), atom)]);
        assert!(immediately_dispatchable(&atoms)[&spec].is_empty());
    }

    #[test]
    fn missing_host_atom_disables_dispatch_even_without_host_depends() {
        let spec = SpecTuple::new("x86_64", "armv7l");
        let mut atom = Atom::new(spec.clone());
        atom.pkgs.insert("a".into(), pkg("a", true, false, &[]));

        let atoms = HashMap::from([(spec.clone(), atom)]);
        assert!(immediately_dispatchable(&atoms)[&spec].is_empty());
    }

    #[test]
    fn host_depends_resolve_against_host_atom() {
        let spec = SpecTuple::new("x86_64", "armv7l");
        let host_spec = spec.host_spec();

        let mut host_atom = Atom::new(host_spec.clone());
        host_atom
            .pkgs
            .insert("cross-gcc".into(), pkg("cross-gcc", false, false, &[]));

        let mut target_atom = Atom::new(spec.clone());
        target_atom.pkgs.insert("cross-gcc-user".into(), {
            let mut p = pkg("cross-gcc-user", true, false, &[]);
            p.host_depends.insert("cross-gcc".to_string());
            p
        });

        let atoms = HashMap::from([(spec.clone(), target_atom), (host_spec, host_atom)]);
        let names: Vec<&str> = immediately_dispatchable(&atoms)[&spec]
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["cross-gcc-user"]);
    }

    #[test]
    fn zero_dependency_package_is_dispatchable_when_dirty() {
        let spec = SpecTuple::new("x86_64", "x86_64");
        let mut atom = Atom::new(spec.clone());
        atom.pkgs.insert("a".into(), pkg("a", true, false, &[]));
        let atoms = HashMap::from([(spec.clone(), atom)]);
        assert_eq!(immediately_dispatchable(&atoms)[&spec].len(), 1);
    }
}
