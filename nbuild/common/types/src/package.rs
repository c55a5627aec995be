use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A package graph node.
///
/// Identity within an [`super::Atom`] is `name`. Dependency sets are keyed by
/// already-resolved canonical package names; `version` is a single opaque
/// string, conventionally `"{version}_{revision}"`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub revision: String,
    #[serde(default)]
    pub dirty: bool,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub host_depends: BTreeSet<String>,
    #[serde(default)]
    pub make_depends: BTreeSet<String>,
    #[serde(default)]
    pub depends: BTreeSet<String>,
    #[serde(default)]
    pub subpackages: BTreeSet<String>,
}

impl Package {
    /// The `pkgname-version_revision` string an [`super::IndexedPackage`]
    /// entry is compared against during `Clean`.
    pub fn indexed_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}
