use serde::{Deserialize, Serialize};

/// A single package entry as published by a binary repository index.
///
/// `version` here already includes the distribution's conventional
/// `pkgname-version_revision` prefix, exactly as emitted by the index, so it
/// can be compared directly against [`crate::Package::indexed_name`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IndexedPackage {
    pub name: String,
    pub version: String,
}
