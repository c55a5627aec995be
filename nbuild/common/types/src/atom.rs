use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Package, SpecTuple};

/// The serializable per-spec graph state: a snapshot of everything the
/// [`crate`] data model calls a "package graph" minus its locks and live
/// handles (those live on `PkgGraph` in `nbuild-graph`, wrapping an `Atom`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub spec: SpecTuple,
    /// The source-tree revision this atom's package set was imported at.
    #[serde(default)]
    pub rev: String,
    #[serde(default)]
    pub pkgs: HashMap<String, Package>,
    /// Abstract capability name (e.g. `c-runtime`) to concrete provider
    /// package, as read from the tree's defaults file.
    #[serde(rename = "virtual", default)]
    pub virtual_packages: HashMap<String, String>,
    /// Diagnostic map of packages that failed metadata extraction at
    /// import time; such packages have no entry in `pkgs`.
    #[serde(default)]
    pub bad: HashMap<String, String>,
}

impl Atom {
    pub fn new(spec: SpecTuple) -> Self {
        Self {
            spec,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_round_trip_is_identity() {
        let mut atom = Atom::new(SpecTuple::new("x86_64", "x86_64"));
        atom.rev = "deadbeef".to_string();
        atom.pkgs.insert(
            "a".to_string(),
            Package {
                name: "a".to_string(),
                version: "1.0_1".to_string(),
                revision: "1".to_string(),
                dirty: true,
                ..Default::default()
            },
        );
        atom.virtual_packages
            .insert("c-runtime".to_string(), "glibc".to_string());
        atom.bad.insert("broken".to_string(), "oops".to_string());

        let bytes = serde_json::to_vec(&atom).unwrap();
        let round_tripped: Atom = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(atom, round_tripped);
    }
}
