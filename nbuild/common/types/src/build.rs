use serde::{Deserialize, Serialize};

use crate::SpecTuple;

/// A single dispatchable unit of work handed to a [`crate::CapacityProvider`]
/// by the scheduler (the provider trait itself lives in `nbuild-capacity`;
/// this type is the shared vocabulary both crates speak).
///
/// Equality is component-wise, matching the invariant that a build present
/// in `ListBuilds()` must be recognized as already in flight during
/// `Reconstruct`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Build {
    pub spec: SpecTuple,
    pub pkg: String,
    pub rev: String,
}

impl Build {
    pub fn new(spec: SpecTuple, pkg: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            spec,
            pkg: pkg.into(),
            rev: rev.into(),
        }
    }
}
